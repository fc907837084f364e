//! The Sonara CLI application.
//!
//! Owns the loaded configuration, sets up logging, and dispatches commands.
//! Extraction, index builds, and index loads are CPU- and disk-bound, so
//! they run on Tokio's blocking pool.

use crate::cli::{CliArgs, Command};
use crate::config::SonaraConfig;
use crate::{config_handlers, handlers};
use sonara_core::{Error, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SonaraCli
// ============================================================================

/// The CLI application.
pub struct SonaraCli {
    name: String,
    config: Arc<SonaraConfig>,
    version: String,
}

impl SonaraCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(name: impl Into<String>, args: &CliArgs) -> Result<Self> {
        let config = SonaraConfig::load(args.config.as_deref())?;
        Ok(Self::new(name, config))
    }

    /// Create with an already loaded configuration.
    pub fn new(name: impl Into<String>, config: SonaraConfig) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// The loaded configuration.
    pub fn config(&self) -> &SonaraConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` if set, otherwise defaults based on verbosity flags.
    /// Library crates that log through `log` are bridged into the same
    /// subscriber.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // Ignore error if a subscriber is already set (e.g. in tests).
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        match args.command {
            Some(Command::Version) => {
                println!("{} {}", self.name, self.version);
                Ok(())
            }
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            Some(Command::Extract(extract)) => {
                let config = Arc::clone(&self.config);
                let report = blocking(move || handlers::run_extract(&config, &extract)).await?;
                print!("{}", handlers::format_report(&report));
                Ok(())
            }
            Some(Command::Index(index)) => {
                let config = Arc::clone(&self.config);
                let summaries = blocking(move || handlers::run_index(&config, &index)).await?;
                for s in summaries {
                    let status = if s.built { "built" } else { "up to date" };
                    println!("{}: {} items x {} dims ({status})", s.space, s.items, s.dimension);
                }
                Ok(())
            }
            Some(Command::Recommend(recommend)) => {
                let config = Arc::clone(&self.config);
                let json = recommend.json;
                let set = blocking(move || handlers::run_recommend(&config, &recommend)).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&set)?);
                } else {
                    print!(
                        "{}",
                        handlers::format_recommendations(&set, &self.config.source.display_columns)
                    );
                }
                Ok(())
            }
            None => {
                println!("{} {} (use --help for usage)", self.name, self.version);
                Ok(())
            }
        }
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::operation(format!("Background task failed: {e}")))?
}

// ============================================================================
// Tests
// ============================================================================
