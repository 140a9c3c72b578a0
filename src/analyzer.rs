// src/analyzer.rs
//
// Offline check of the anomaly script against a concrete video. Unlike the
// realtime resolver this knows the video length, so it can tell the operator
// which entries will never show up.

use crate::anomaly::{ScriptEntry, ScriptIssue};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// Entry becomes active roughly this many seconds into the video.
    TriggersAt { seconds: f64 },
    /// Entry starts after the last frame.
    NeverTriggers { start: u64, total_frames: u64 },
    Invalid(ScriptIssue),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::TriggersAt { seconds } => write!(
                f,
                "should trigger at approximately {:.2} seconds into the video",
                seconds
            ),
            Finding::NeverTriggers {
                start,
                total_frames,
            } => write!(
                f,
                "will NEVER trigger: starts at frame {}, but the video only has {} frames",
                start, total_frames
            ),
            Finding::Invalid(issue) => write!(f, "invalid entry: {}", issue),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryReport {
    /// 1-based position in the script.
    pub index: usize,
    pub message: String,
    pub start_frame: Option<u64>,
    pub end_frame: Option<u64>,
    pub finding: Finding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptAudit {
    pub total_frames: u64,
    pub fps: f64,
    pub duration_secs: f64,
    pub entries: Vec<EntryReport>,
}

impl ScriptAudit {
    pub fn never_triggering(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.finding, Finding::NeverTriggers { .. }))
    }

    pub fn invalid(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.finding, Finding::Invalid(_)))
    }

    pub fn log(&self) {
        info!("\n✅ Video analysis:");
        info!("   - Total frames: {}", self.total_frames);
        info!("   - Duration: {:.2} seconds", self.duration_secs);
        info!("----------------------------------------");

        if self.entries.is_empty() {
            warn!("❌ The anomaly script is empty! No anomalies can be shown.");
            return;
        }

        for entry in &self.entries {
            let frame = |f: Option<u64>| f.map_or_else(|| "N/A".to_string(), |v| v.to_string());
            info!("\n   --- Anomaly #{} ---", entry.index);
            info!("   - Message: '{}'", entry.message);
            info!("   - Starts at frame: {}", frame(entry.start_frame));
            info!("   - Ends at frame: {}", frame(entry.end_frame));
            match &entry.finding {
                Finding::TriggersAt { .. } => info!("   - ✅ This anomaly {}", entry.finding),
                _ => warn!("   - ❌ This anomaly {}", entry.finding),
            }
        }

        let never = self.never_triggering().count();
        let invalid = self.invalid().count();
        info!(
            "\nAnalysis complete: {} entries, {} never trigger, {} invalid",
            self.entries.len(),
            never,
            invalid
        );
    }
}

/// Compare every raw script entry against a video of `total_frames` frames.
pub fn audit_script(entries: &[ScriptEntry], total_frames: u64, fps: f64) -> ScriptAudit {
    let seconds = |frame: u64| if fps > 0.0 { frame as f64 / fps } else { 0.0 };

    if entries.is_empty() {
        warn!("Anomaly script is empty");
    }

    let entries = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let finding = match entry.start() {
                None => Finding::Invalid(ScriptIssue::InvalidStart),
                Some(start) if start > total_frames => Finding::NeverTriggers {
                    start,
                    total_frames,
                },
                Some(start) => match entry.validate() {
                    Ok(_) => Finding::TriggersAt {
                        seconds: seconds(start),
                    },
                    Err(issue) => Finding::Invalid(issue),
                },
            };
            EntryReport {
                index: i + 1,
                message: entry.message().to_string(),
                start_frame: entry.start(),
                end_frame: entry.end(),
                finding,
            }
        })
        .collect();

    ScriptAudit {
        total_frames,
        fps,
        duration_secs: seconds(total_frames),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(yaml: &str) -> Vec<ScriptEntry> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_late_entry_never_triggers() {
        let script = entries(
            "- {start_frame: 900, end_frame: 950, message: late, roi: [0, 0, 10, 10]}",
        );
        let audit = audit_script(&script, 850, 30.0);
        assert_eq!(
            audit.entries[0].finding,
            Finding::NeverTriggers {
                start: 900,
                total_frames: 850
            }
        );
        assert_eq!(audit.never_triggering().count(), 1);
    }

    #[test]
    fn test_trigger_time_in_seconds() {
        let script = entries(
            "- {start_frame: 250, end_frame: 400, message: gap, roi: [810, 350, 980, 550]}",
        );
        let audit = audit_script(&script, 850, 25.0);
        assert_eq!(audit.entries[0].finding, Finding::TriggersAt { seconds: 10.0 });
        assert!((audit.duration_secs - 34.0).abs() < 1e-9);
        assert_eq!(audit.entries[0].message, "gap");
    }

    #[test]
    fn test_invalid_entries_reported() {
        let script = entries(
            r#"
- {end_frame: 10, message: no start, roi: [0, 0, 1, 1]}
- {start_frame: 20, end_frame: 10, roi: [0, 0, 1, 1]}
- {start_frame: 5, end_frame: 10, roi: [0, 0, 1]}
"#,
        );
        let audit = audit_script(&script, 100, 30.0);
        assert_eq!(
            audit.entries[0].finding,
            Finding::Invalid(ScriptIssue::InvalidStart)
        );
        assert_eq!(
            audit.entries[1].finding,
            Finding::Invalid(ScriptIssue::Inverted { start: 20, end: 10 })
        );
        assert_eq!(audit.entries[1].message, "No message");
        assert_eq!(
            audit.entries[2].finding,
            Finding::Invalid(ScriptIssue::InvalidRoi)
        );
        assert_eq!(audit.invalid().count(), 3);
    }

    #[test]
    fn test_empty_script_and_zero_fps() {
        let audit = audit_script(&[], 0, 0.0);
        assert!(audit.entries.is_empty());
        assert_eq!(audit.duration_secs, 0.0);
        audit.log();
    }

    #[test]
    fn test_finding_display() {
        let never = Finding::NeverTriggers {
            start: 900,
            total_frames: 850,
        };
        assert!(never.to_string().contains("NEVER"));
        assert!(Finding::Invalid(ScriptIssue::InvalidRoi)
            .to_string()
            .contains("roi"));
    }
}
