//! CLI command definitions and dispatch for the `recall` binary.
//!
//! Uses clap derive macros for argument parsing. Every command addresses one
//! user by id, except the admin-only bulk commands which take the calling
//! user's id via `--as`.

pub mod memory;
pub mod transfer;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Inspect and manage per-user conversational memory.
#[derive(Parser)]
#[command(name = "recall", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log only errors to stderr. Command results are still printed.
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (defaults to $RECALL_DATA_DIR, then ~/.recall).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export tracing spans to stdout via OpenTelemetry.
    #[arg(long, global = true, env = "RECALL_OTEL", hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a finished prompt/response exchange for a user.
    Record {
        /// User id.
        user: String,

        /// What the user said.
        #[arg(long, short = 'p')]
        prompt: String,

        /// What was answered.
        #[arg(long, short = 'r')]
        response: String,

        /// Display name of the user.
        #[arg(long)]
        username: Option<String>,
    },

    /// Show what is remembered about a user.
    #[command(alias = "show")]
    Summary {
        /// User id.
        user: String,
    },

    /// Print the memory block and recent messages used to build a prompt.
    Context {
        /// User id.
        user: String,
    },

    /// Delete everything remembered about a user.
    Forget {
        /// User id.
        user: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Export one user's memory as JSON.
    Export {
        /// User id.
        user: String,

        /// Write to this file instead of stdout.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Replace one user's memory with a JSON document.
    Import {
        /// User id.
        user: String,

        /// Document to import ("-" reads stdin).
        file: PathBuf,
    },

    /// Export every user's memory (admin only).
    #[command(name = "export-all")]
    ExportAll {
        /// Id of the admin running the export.
        #[arg(long = "as", value_name = "USER")]
        caller: String,

        /// Write to this file instead of stdout.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Import a whole-store JSON document (admin only).
    #[command(name = "import-all")]
    ImportAll {
        /// Id of the admin running the import.
        #[arg(long = "as", value_name = "USER")]
        caller: String,

        /// Document to import ("-" reads stdin).
        file: PathBuf,
    },

    /// Remove expired long-term notes from every user now.
    Prune,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record_with_globals() {
        let cli = Cli::try_parse_from([
            "recall", "record", "42", "-p", "hi", "-r", "meow", "--json", "-vv",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Record {
                user,
                prompt,
                response,
                username,
            } => {
                assert_eq!(user, "42");
                assert_eq!(prompt, "hi");
                assert_eq!(response, "meow");
                assert!(username.is_none());
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_parse_import_all_requires_caller() {
        assert!(Cli::try_parse_from(["recall", "import-all", "dump.json"]).is_err());

        let cli =
            Cli::try_parse_from(["recall", "import-all", "--as", "1001", "dump.json"]).unwrap();
        match cli.command {
            Commands::ImportAll { caller, file } => {
                assert_eq!(caller, "1001");
                assert_eq!(file, PathBuf::from("dump.json"));
            }
            _ => panic!("expected import-all"),
        }
    }

    #[test]
    fn test_parse_data_dir_override() {
        let cli =
            Cli::try_parse_from(["recall", "prune", "--data-dir", "/tmp/recall-test"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/recall-test")));
    }
}
