//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for query and status output.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table (default)
    #[default]
    Table,
    /// JSON (same as --json)
    Json,
}

pub mod commands;

/// jisaku - Personal kanji reference database
#[derive(Parser, Debug)]
#[command(name = "jisaku", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (default: ~/.jisaku)
    #[arg(long, global = true, env = "JISAKU_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format (table, json)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or upgrade the database and write default settings
    Init {
        /// Milliseconds to wait after a write before saving
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Print version information
    Version,

    /// Show schema version, saved image and table counts
    Status,

    /// Run a read-only SQL query
    Query {
        /// SQL statement
        sql: String,

        /// Positional parameter, as a JSON scalar (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Run a write statement and save
    Run {
        /// SQL statement (several with --batch)
        sql: String,

        /// Positional parameter, as a JSON scalar (repeatable)
        #[arg(short, long = "param", conflicts_with = "batch")]
        params: Vec<String>,

        /// Treat SQL as several semicolon-separated statements
        #[arg(long)]
        batch: bool,
    },

    /// Write the database to a file
    Export {
        /// Output file (default: kanji-dictionary-YYYY-MM-DD-HH-MM.db)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the database with an exported file
    Import {
        /// Database file (.db, .sqlite, .sqlite3)
        file: PathBuf,
    },

    /// Delete all kanji, components and vocabulary
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Interactive SQL shell with lifecycle-driven saves
    Shell {
        /// Keep the database in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
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
    fn test_parse_query_with_params() {
        let cli = Cli::parse_from([
            "jisaku", "query", "SELECT * FROM kanjis WHERE id = ?1", "-p", "3", "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Query { sql, params } => {
                assert!(sql.starts_with("SELECT"));
                assert_eq!(params, vec!["3"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_batch_conflicts_with_params() {
        let parsed = Cli::try_parse_from(["jisaku", "run", "DELETE FROM kanjis", "--batch", "-p", "1"]);
        assert!(parsed.is_err());
    }
}
