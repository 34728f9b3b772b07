use crate::application::commands::DEFAULT_STARTUP_DELAY_SECS;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "calendar-autotag")]
#[command(about = "Tag calendar events with categories based on keywords in their titles")]
pub struct Cli {
    /// Directory holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan once after a short delay, then on the configured interval until Ctrl-C.
    /// SIGHUP reloads the configuration.
    Run {
        #[arg(long, default_value_t = DEFAULT_STARTUP_DELAY_SECS)]
        startup_delay_secs: u64,
    },
    /// Scan now with the current configuration
    Scan {
        /// Replace each matching event's categories with the matched one
        #[arg(long)]
        force: bool,
    },
    /// Show the outcome of the last scan
    Stats,
    /// Remove the configured categories from the registry
    Reset,
    /// Print the active configuration
    Config,
    Export {
        file: PathBuf,
    },
    Import {
        file: PathBuf,
    },
    AddCategory {
        keyword: String,
        /// Color as #RRGGBB
        color: String,
    },
    RemoveCategory {
        keyword: String,
    },
    SetColor {
        keyword: String,
        color: String,
    },
    Settings {
        #[arg(long)]
        days_back: Option<u32>,

        #[arg(long)]
        days_forward: Option<u32>,

        /// Minutes between scans; 0 disables periodic scanning
        #[arg(long)]
        interval: Option<u32>,

        #[arg(long)]
        full_width_colors: Option<bool>,
    },
    /// Register a calendar in the local store
    AddCalendar {
        id: String,
        name: String,

        #[arg(long)]
        read_only: bool,
    },
    /// Add an event to a calendar in the local store
    AddEvent {
        calendar: String,
        title: String,

        /// Start time (RFC 3339, e.g. "2026-03-20T15:00:00+01:00")
        #[arg(short, long)]
        start: String,

        #[arg(long, default_value_t = 60)]
        minutes: i64,

        #[arg(long)]
        id: Option<String>,

        /// Category already assigned to the event (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// List events of every calendar inside the scan window
    Events,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_workspace_and_settings() {
        let cli = Cli::parse_from([
            "calendar-autotag",
            "settings",
            "--interval",
            "0",
            "--full-width-colors",
            "false",
            "--workspace",
            "/tmp/autotag",
        ]);

        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/autotag")));
        match cli.command {
            Commands::Settings {
                interval,
                full_width_colors,
                days_back,
                ..
            } => {
                assert_eq!(interval, Some(0));
                assert_eq!(full_width_colors, Some(false));
                assert_eq!(days_back, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_negative_settings() {
        assert!(Cli::try_parse_from(["calendar-autotag", "settings", "--days-back", "-1"]).is_err());
        assert!(Cli::try_parse_from(["calendar-autotag", "settings", "--interval", "ten"]).is_err());
    }

    #[test]
    fn run_defaults_to_startup_delay() {
        let cli = Cli::parse_from(["calendar-autotag", "run"]);
        assert!(matches!(
            cli.command,
            Commands::Run {
                startup_delay_secs: DEFAULT_STARTUP_DELAY_SECS
            }
        ));
    }
}
