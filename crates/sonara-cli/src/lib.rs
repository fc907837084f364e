//! Command-line interface for Sonara.
//!
//! - [`cli`]: argument and subcommand definitions
//! - [`config`]: [`SonaraConfig`](config::SonaraConfig), loaded with `confyg`
//! - [`config_handlers`]: `sonara config {path,show,init}`
//! - [`handlers`]: `extract`, `index`, and `recommend`
//! - [`app`]: logging setup and command dispatch

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod handlers;

pub use app::SonaraCli;
pub use cli::CliArgs;
pub use config::SonaraConfig;
