//! CLI argument parsing and command definitions.

use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level arguments.
#[derive(Parser, Debug)]
#[command(name = "sonara", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "SONARA_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract image features into a resumable checkpoint.
    Extract(ExtractArgs),

    /// Build nearest-neighbour indices for feature spaces.
    Index(IndexArgs),

    /// Recommend items similar to an identifier.
    Recommend(RecommendArgs),

    /// Configuration operations.
    Config(ConfigCommand),

    /// Print version information.
    Version,
}

/// Arguments for `sonara extract`.
#[derive(Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// Extraction method: basic (alias traditional) or deep.
    #[arg(short, long)]
    pub method: Option<String>,

    /// Deep model name (ignored for basic extraction).
    #[arg(long)]
    pub model: Option<String>,

    /// Worker threads.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Rows per checkpointed batch.
    #[arg(short, long)]
    pub interval: Option<usize>,

    /// Stop after this many committed batches.
    #[arg(long)]
    pub max_batches: Option<usize>,
}

/// Arguments for `sonara index`.
#[derive(Args, Debug, Clone, Default)]
pub struct IndexArgs {
    /// Spaces to build (repeatable); defaults to the configured list.
    #[arg(short, long = "space")]
    pub spaces: Vec<String>,

    /// Trees per index.
    #[arg(short, long)]
    pub trees: Option<usize>,

    /// Deep model whose vectors feed the deep source.
    #[arg(long)]
    pub model: Option<String>,

    /// Rebuild even when the stored index is fresh.
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for `sonara recommend`.
#[derive(Args, Debug, Clone)]
pub struct RecommendArgs {
    /// Identifier of the query item.
    pub id: String,

    /// Number of neighbours per space.
    #[arg(short)]
    pub k: Option<usize>,

    /// Spaces to query (repeatable); defaults to the configured list.
    #[arg(short, long = "space")]
    pub spaces: Vec<String>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Print the effective configuration as TOML.
    Show,

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
