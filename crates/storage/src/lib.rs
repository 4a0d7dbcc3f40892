//! Site directory storage for plinth.
//!
//! This crate provides:
//! - Extraction of validated archives into sandboxed site directories
//! - Structure normalization so every site has a root entry point
//! - Ownership and permission policy for served files
//! - Move, removal and on-demand size accounting of site directories

pub mod backends;
pub mod error;
pub mod materialize;
pub mod normalize;
pub mod ownership;
pub mod traits;

pub use backends::filesystem::FilesystemSites;
pub use error::{StorageError, StorageResult};
pub use normalize::{Normalization, ROOT_ENTRY_NAMES};
pub use ownership::OwnershipPolicy;
pub use traits::{SiteStats, SiteStorage};

use plinth_core::config::SitesConfig;
use std::sync::Arc;

/// File name prefix of upload buffers in the scratch directory.
pub const SCRATCH_PREFIX: &str = "upload-";

/// Create site storage from configuration.
pub async fn from_config(config: &SitesConfig) -> StorageResult<Arc<dyn SiteStorage>> {
    config.validate().map_err(StorageError::Config)?;
    let ownership = OwnershipPolicy::from_config(config)?;
    let backend = FilesystemSites::new(&config.root, &config.scratch_dir, ownership).await?;
    Ok(Arc::new(backend))
}
