//! boss-ingest - upload large image volumes into a BossDB-style channel store
//!
//! Volumes are 3-D stacks in ZYX order, held in memory or stored as one image
//! file per depth slice. An upload session provisions the remote
//! collection → coordinate frame → experiment → channel hierarchy on demand and
//! then transfers the volume in bounded-size slabs, retrying failed writes.
//!
//! # Features
//!
//! - Idempotent, dependency-ordered provisioning of remote resources
//! - Slab-at-a-time transfer so volumes larger than memory can be uploaded
//! - Per-slab retry budget with fail-fast abort
//! - Lazy decoding of PNG/TIFF slice sequences
//! - Cancellation between slabs
//!
//! # Remote stores
//!
//! boss-ingest does not speak any wire protocol itself. Implement the
//! `RemoteStore` trait over your service client; `MemoryRemote` is provided
//! for tests and dry runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use boss_ingest::{MemoryRemote, UploadConfig, UploadSession};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = UploadConfig::new("bossdb://MyLab/Mouse42/em");
//! config.data_dir = Some("/data/mouse42/slices".into());
//! config.data_extension = ".tif".into();
//! config.voxel_size = [30.0, 4.0, 4.0];
//!
//! let outcome = UploadSession::new(Arc::new(MemoryRemote::new()), config)
//!     .upload_directory()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod layout;
pub mod provision;
pub mod remote;
pub mod resource;
pub mod session;
pub mod source;
pub mod types;
pub mod upload;
pub mod uri;

// Re-exports
pub use config::UploadConfig;
pub use error::{IngestError, Result};
pub use layout::{SlabRange, TransferPlan};
pub use provision::Provisioner;
pub use remote::{CutoutRequest, MemoryRemote, RemoteStore};
pub use resource::{Resource, ResourceHierarchy};
pub use session::{SessionOutcome, UploadReport, UploadSession};
pub use source::{
    FileSequenceSource, ImageSliceDecoder, InMemorySource, SliceDecoder, SliceInfo, SliceSequence,
    VolumeSource,
};
pub use types::{ChannelType, DataType, VolumeGeometry, Voxel};
pub use upload::{ChunkedUploader, ProgressSink, RetryState, UploadOptions, UploadStats};
pub use uri::BossUri;

/// Version of the boss-ingest implementation
pub const BOSS_INGEST_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!BOSS_INGEST_VERSION.is_empty());
    }
}
