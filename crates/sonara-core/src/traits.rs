//! Core traits for Sonara.
//!
//! The primary trait is [`ConfigProvider`], which abstracts where a
//! deployment keeps its source catalogue and generated artifacts so that
//! handlers can be written against any configuration type.

use std::path::PathBuf;

use crate::Result;

/// Trait for deployment-specific configuration.
///
/// # Bounds
///
/// - `Send + Sync`: Configuration must be shareable across worker threads
/// - `Clone`: Configuration can be duplicated for passing to subsystems
/// - `'static`: Configuration lifetime is not borrowed
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use sonara_core::traits::ConfigProvider;
/// use sonara_core::Result;
///
/// #[derive(Clone)]
/// struct LabConfig {
///     data_dir: PathBuf,
/// }
///
/// impl ConfigProvider for LabConfig {
///     fn project_name(&self) -> &str {
///         "listening-lab"
///     }
///
///     fn base_path(&self) -> Result<PathBuf> {
///         Ok(self.data_dir.clone())
///     }
///
///     fn source_path(&self) -> Result<PathBuf> {
///         Ok(self.data_dir.join("tracks.csv"))
///     }
///
///     fn artifact_dir(&self, kind: &str) -> Result<PathBuf> {
///         Ok(self.data_dir.join(kind))
///     }
/// }
/// ```
pub trait ConfigProvider: Send + Sync + Clone + 'static {
    /// The project name, used for env var prefixes and default paths.
    fn project_name(&self) -> &str;

    /// Base path for all project data.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be determined.
    fn base_path(&self) -> Result<PathBuf>;

    /// Path to the tabular source collection.
    fn source_path(&self) -> Result<PathBuf>;

    /// Directory for a kind of generated artifact.
    ///
    /// `kind` is a key such as `"checkpoints"` or `"indices"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is unknown or cannot be resolved.
    fn artifact_dir(&self, kind: &str) -> Result<PathBuf>;
}
