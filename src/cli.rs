// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Frame-synchronized assembly inspection dashboard.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Render the dashboard video (default).
    Run {
        /// Disable the live preview window.
        #[arg(long, default_value_t = false)]
        no_preview: bool,
    },
    /// Check the anomaly script against the input video.
    Analyze,
    /// Run the detector once on a still image and save the annotated result.
    DebugDetections {
        image: PathBuf,
        /// Confidence floor; keep it low to see everything the model finds.
        #[arg(long, default_value_t = 0.01)]
        confidence: f32,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Run { no_preview: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::parse_from(["assembly-dashboard"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.command(), Command::Run { no_preview: false });
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::parse_from(["assembly-dashboard", "run", "--no-preview", "--config", "x.yaml"]);
        assert_eq!(cli.command(), Command::Run { no_preview: true });
        assert_eq!(cli.config, PathBuf::from("x.yaml"));

        let cli = Cli::parse_from(["assembly-dashboard", "debug-detections", "assets/image.jpg"]);
        assert_eq!(
            cli.command(),
            Command::DebugDetections {
                image: PathBuf::from("assets/image.jpg"),
                confidence: 0.01
            }
        );

        let cli = Cli::parse_from(["assembly-dashboard", "analyze"]);
        assert_eq!(cli.command(), Command::Analyze);
    }
}
