use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "teamsearch")]
#[command(about = "Hybrid ranked search over a team directory", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the team directory
    Query {
        /// Free-text query
        query: String,

        /// Results per page (or total with --top)
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Cursor returned by a previous page
        #[arg(long, conflicts_with = "top")]
        cursor: Option<String>,

        /// Keep only teams carrying this tag
        #[arg(short, long, conflicts_with = "top")]
        tag: Option<String>,

        /// Unpaged top-N search
        #[arg(long)]
        top: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Show the per-signal score breakdown
        #[arg(long)]
        explain: bool,
    },

    /// Embed the catalog and upsert it into the vector store
    Index {
        /// Repeat the run every N seconds
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Print identities and search documents without calling any provider
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file plus environment overrides)
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
