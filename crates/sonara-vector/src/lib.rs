//! Feature spaces, nearest-neighbour indices, and recommendations.
//!
//! # Modules
//!
//! - [`space`]: raw sources, standardisation, and named feature spaces
//! - [`ann`]: the random-projection forest
//! - [`persistence`]: index metadata sidecars and freshness checks
//! - [`manager`]: building, saving, and loading one index per space
//! - [`recommend`]: similar-item queries across spaces
//!
//! ```no_run
//! use sonara_core::{ItemCollection, LoadOptions};
//! use sonara_vector::{
//!     FeatureSpaceRegistry, IndexManager, IndexOptions, RecommendationService, SourceKind,
//!     SourceMatrix, SpaceName,
//! };
//!
//! # fn main() -> sonara_core::Result<()> {
//! let songs = ItemCollection::from_csv_path("songs.csv", &LoadOptions::default())?;
//! let audio = SourceMatrix::from_columns(SourceKind::Audio, &songs, &["energy", "valence"])?;
//!
//! let mut registry = FeatureSpaceRegistry::new();
//! registry.add_source(audio)?;
//! let space = registry.register(SpaceName::Audio)?;
//!
//! let manager = IndexManager::new("indices", IndexOptions::default());
//! let handle = manager.build_and_save(space)?.into_handle();
//!
//! let service = RecommendationService::new(songs).with_index(handle);
//! let set = service.recommend("some-id", 5, &[SpaceName::Audio])?;
//! # let _ = set;
//! # Ok(())
//! # }
//! ```

pub mod ann;
pub mod manager;
pub mod persistence;
pub mod recommend;
pub mod space;

pub use ann::{AnnIndex, Metric, Neighbor};
pub use manager::{BuildOutcome, IndexHandle, IndexManager, IndexOptions, Match};
pub use persistence::{IndexMetadata, is_index_fresh, load_metadata, save_metadata};
pub use recommend::{Recommendation, RecommendationService, RecommendationSet};
pub use space::{FeatureSpace, FeatureSpaceRegistry, Scaler, SourceKind, SourceMatrix, SpaceName};
