//! CLI parse: clap types for objstat. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Objstat CLI - size and deduplication statistics for a git object store
#[derive(Parser)]
#[command(name = "objstat")]
#[command(about = "Catalogue reachable git objects and report their size and deduplication")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Repository to analyse (working tree or git directory) [default: .]
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Catalog database path (overrides storage.catalog_path)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Suppress the progress meter and all logging
    #[arg(long, short)]
    pub quiet: bool,

    /// Log at debug level, including every catalogued tree and commit
    #[arg(long)]
    pub verbose: bool,

    #[command(flatten)]
    pub logging: LogArgs,
}

/// Logging overrides; each one beats the `[logging]` config section.
#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Logging")]
pub struct LogArgs {
    /// Minimum level: trace, debug, info, warn, error or off
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub level: Option<String>,

    /// Record format: text or json
    #[arg(long = "log-format", value_name = "FORMAT")]
    pub format: Option<String>,

    /// Where records go: stdout, stderr or file
    #[arg(long = "log-output", value_name = "TARGET")]
    pub output: Option<String>,

    /// Destination when --log-output is file
    #[arg(long = "log-file", value_name = "PATH")]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discard the catalog and rebuild it from every branch and tag
    Rebuild {
        /// Do not ask before discarding an existing catalog
        #[arg(long, short)]
        yes: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Catalogue one more object and everything below it
    Add {
        /// Object hash (hex)
        hash: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Lay out the blobs below a catalogued object and summarise deduplication
    Layout {
        /// Object hash (hex)
        hash: String,
        /// List every blob and tree, not just the summary
        #[arg(long)]
        details: bool,
        /// Count every object as new, ignoring the configured baseline
        #[arg(long, conflicts_with = "baseline_file")]
        no_baseline: bool,
        /// Use a file of hashes (one per line) as the baseline
        #[arg(long)]
        baseline_file: Option<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List the objects that reference a catalogued object
    Parents {
        /// Object hash (hex)
        hash: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Child counts of every tree and commit, smallest first
    Subtrees {
        /// Show only the N largest
        #[arg(long, conflicts_with_all = ["histogram", "min_children"])]
        top: Option<usize>,
        /// Count trees per number of children instead of listing them
        #[arg(long, conflicts_with = "min_children")]
        histogram: bool,
        /// List trees with at least N children, largest first
        #[arg(long, value_name = "N")]
        min_children: Option<u64>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the published catalog generation and its size
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the effective configuration
    Config {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
}
