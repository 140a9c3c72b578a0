// src/anomaly.rs
//
// Scripted anomaly intervals and the realtime resolver.
//
// The script is an ordered list. When several intervals cover the same frame
// only the first one in script order is reported; later overlapping entries
// are suppressed for that frame. `resolve_all` exposes every match for callers
// that want to display more than one.

use crate::types::{AnomalyInterval, FrameIndex, Region};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Why a script entry cannot become an [`AnomalyInterval`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptIssue {
    #[error("'start_frame' is missing or not a non-negative integer")]
    InvalidStart,
    #[error("'end_frame' is missing or not a non-negative integer")]
    InvalidEnd,
    #[error("'end_frame' {end} precedes 'start_frame' {start}")]
    Inverted { start: u64, end: u64 },
    #[error("'roi' must be four integers [x1, y1, x2, y2]")]
    InvalidRoi,
    #[error("'roi' [{x1}, {y1}, {x2}, {y2}] has no area")]
    DegenerateRoi { x1: i32, y1: i32, x2: i32, y2: i32 },
}

/// One entry of the anomaly script as written on disk.
///
/// Fields are kept loosely typed so a single bad entry degrades to a warning
/// instead of failing the whole file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptEntry {
    #[serde(default)]
    pub start_frame: Option<Value>,
    #[serde(default)]
    pub end_frame: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub roi: Option<Value>,
}

impl ScriptEntry {
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("No message")
    }

    pub fn start(&self) -> Option<u64> {
        self.start_frame.as_ref().and_then(Value::as_u64)
    }

    pub fn end(&self) -> Option<u64> {
        self.end_frame.as_ref().and_then(Value::as_u64)
    }

    pub fn validate(&self) -> std::result::Result<AnomalyInterval, ScriptIssue> {
        let start = self.start().ok_or(ScriptIssue::InvalidStart)?;
        let end = self.end().ok_or(ScriptIssue::InvalidEnd)?;
        if end < start {
            return Err(ScriptIssue::Inverted { start, end });
        }

        let coords: Vec<i32> = match &self.roi {
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|v| v.as_i64().and_then(|n| i32::try_from(n).ok()))
                .collect::<Option<Vec<_>>>()
                .ok_or(ScriptIssue::InvalidRoi)?,
            _ => return Err(ScriptIssue::InvalidRoi),
        };
        let [x1, y1, x2, y2] = <[i32; 4]>::try_from(coords).map_err(|_| ScriptIssue::InvalidRoi)?;
        if x1 >= x2 || y1 >= y2 {
            return Err(ScriptIssue::DegenerateRoi { x1, y1, x2, y2 });
        }

        Ok(AnomalyInterval {
            start_frame: start,
            end_frame: end,
            message: self.message().to_string(),
            region: Region { x1, y1, x2, y2 },
        })
    }
}

/// Read the raw script entries without validating them.
pub fn load_entries(path: impl AsRef<Path>) -> Result<Vec<ScriptEntry>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read anomaly script {}", path.display()))?;
    // An empty file is an empty script.
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<ScriptEntry> = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse anomaly script {}", path.display()))?;
    Ok(entries)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyScript {
    intervals: Vec<AnomalyInterval>,
}

impl AnomalyScript {
    pub fn new(intervals: Vec<AnomalyInterval>) -> Self {
        Self { intervals }
    }

    /// Build the script from raw entries, dropping malformed ones with a
    /// warning. Dropped entries are never active.
    pub fn from_entries(entries: &[ScriptEntry]) -> Self {
        let mut intervals = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            match entry.validate() {
                Ok(interval) => intervals.push(interval),
                Err(issue) => warn!(
                    entry = i + 1,
                    message = entry.message(),
                    "⚠️  Ignoring anomaly script entry: {}",
                    issue
                ),
            }
        }
        Self::new(intervals)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let entries = load_entries(path)?;
        let script = Self::from_entries(&entries);
        info!(
            "✓ Anomaly script loaded: {} of {} entries usable ({})",
            script.len(),
            entries.len(),
            path.display()
        );
        Ok(script)
    }

    /// First interval, in script order, covering `frame_index`.
    ///
    /// Frame ranges are not checked against the video length here; an
    /// interval past the end of the video simply never matches.
    pub fn resolve(&self, frame_index: FrameIndex) -> Option<&AnomalyInterval> {
        self.resolve_position(frame_index).map(|i| &self.intervals[i])
    }

    /// Script position of the interval [`resolve`](Self::resolve) returns.
    pub fn resolve_position(&self, frame_index: FrameIndex) -> Option<usize> {
        self.intervals.iter().position(|a| a.contains(frame_index))
    }

    /// Every interval covering `frame_index`, in script order.
    pub fn resolve_all(&self, frame_index: FrameIndex) -> Vec<&AnomalyInterval> {
        self.intervals
            .iter()
            .filter(|a| a.contains(frame_index))
            .collect()
    }

    pub fn intervals(&self) -> &[AnomalyInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}
