//! Command-line interface, clap-based.
//!
//! Phase commands (scrape/capture/validate) drive the engine against a
//! portal fixture; control commands (pause/resume/skip/stop) and the
//! read-only commands (status/report) operate on the persisted state
//! document alone.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// declabot — batch filing automation for a remote declarations portal.
#[derive(Debug, Parser)]
#[command(name = "declabot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "declabot.toml")]
    pub config: PathBuf,

    /// Enable verbose output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Collect baseline data for a batch of employer numbers.
    Scrape {
        /// Employer numbers (9 digits each).
        numbers: Vec<String>,

        /// File with one employer number per line.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Portal fixture to drive (JSON).
        #[arg(long)]
        fixture: PathBuf,
    },

    /// Submit a new filing for every eligible scraped record.
    Capture {
        /// Portal fixture to drive (JSON).
        #[arg(long)]
        fixture: PathBuf,
    },

    /// Submit captured filings for validation (and wage edits as needed).
    Validate {
        /// Portal fixture to drive (JSON).
        #[arg(long)]
        fixture: PathBuf,

        /// Validate everything on the review list, ignoring this run's
        /// capture history.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Append a manual record, bypassing extraction.
    Add {
        /// 9-digit employer number.
        number: String,

        /// Display name for the employer.
        name: String,

        /// Unit count to file (must be positive).
        #[arg(long)]
        count: u32,

        /// Aggregate amount to file (must be positive).
        #[arg(long)]
        amount: f64,
    },

    /// Edit a scraped or manual record; valid values clear its error flags.
    Edit {
        /// 9-digit employer number of the record to edit.
        number: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        count: Option<u32>,

        #[arg(long)]
        amount: Option<f64>,
    },

    /// Delete a record.
    Delete {
        /// 9-digit employer number of the record to delete.
        number: String,
    },

    /// Pause the engine; the current step finishes, nothing further runs.
    Pause,

    /// Clear a pause or intervention so ticking can continue.
    Resume,

    /// Skip the item the engine is halted on and clear the intervention.
    Skip,

    /// Reset to idle and clear all work queues.
    Stop,

    /// Show the persisted engine state.
    Status,

    /// Export the run report.
    Report {
        /// Write a delimited table to this path instead of JSON to stdout.
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Rehearse the full workflow against a built-in fixture, in memory.
    Demo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_scrape_with_numbers() {
        let cli = Cli::parse_from([
            "declabot",
            "scrape",
            "123456789",
            "987654321",
            "--fixture",
            "portal.json",
        ]);
        match cli.command {
            Command::Scrape {
                numbers,
                file,
                fixture,
            } => {
                assert_eq!(numbers, vec!["123456789", "987654321"]);
                assert!(file.is_none());
                assert_eq!(fixture, PathBuf::from("portal.json"));
            }
            _ => panic!("expected Scrape command"),
        }
    }

    #[test]
    fn cli_parses_validate_force() {
        let cli = Cli::parse_from(["declabot", "validate", "--fixture", "p.json", "--force"]);
        match cli.command {
            Command::Validate { force, .. } => assert!(force),
            _ => panic!("expected Validate command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["declabot", "--config", "other.toml", "--verbose", "status"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn cli_parses_report_csv() {
        let cli = Cli::parse_from(["declabot", "report", "--csv", "out.csv"]);
        match cli.command {
            Command::Report { csv } => assert_eq!(csv, Some(PathBuf::from("out.csv"))),
            _ => panic!("expected Report command"),
        }
    }

    #[test]
    fn cli_parses_add_with_values() {
        let cli = Cli::parse_from([
            "declabot",
            "add",
            "123456789",
            "Acme Ltd",
            "--count",
            "4",
            "--amount",
            "1600.50",
        ]);
        match cli.command {
            Command::Add {
                number,
                name,
                count,
                amount,
            } => {
                assert_eq!(number, "123456789");
                assert_eq!(name, "Acme Ltd");
                assert_eq!(count, 4);
                assert_eq!(amount, 1600.50);
            }
            _ => panic!("expected Add command"),
        }
    }

    #[test]
    fn cli_parses_partial_edit() {
        let cli = Cli::parse_from(["declabot", "edit", "123456789", "--amount", "1800"]);
        match cli.command {
            Command::Edit {
                number,
                name,
                count,
                amount,
            } => {
                assert_eq!(number, "123456789");
                assert!(name.is_none());
                assert!(count.is_none());
                assert_eq!(amount, Some(1800.0));
            }
            _ => panic!("expected Edit command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
