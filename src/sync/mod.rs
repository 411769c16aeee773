//! Replication between environments
//!
//! # Components
//!
//! - [`engine`]: Sequences one run and owns handle lifetimes
//! - [`rows`]: Full-table snapshot and replacement with id remapping
//! - [`differ`]: Compares blob listings
//! - [`transfer`]: Bounded worker pool for blob downloads and uploads
//! - [`retry`]: Retry manager with exponential backoff for transient failures
//!
//! # Example
//!
//! ```ignore
//! use roster_sync::config::Config;
//! use roster_sync::sync::SyncEngine;
//!
//! let engine = SyncEngine::new(Config::from_file("roster-sync.yaml")?);
//! let result = engine.pull().await?;
//! println!("{}", result.summary());
//! ```

pub mod differ;
pub mod engine;
pub mod retry;
pub mod rows;
pub mod transfer;

// Re-export main types for convenience
pub use differ::{diff, BlobDiff};
pub use engine::SyncEngine;
pub use retry::RetryManager;
pub use rows::{replace_tables, snapshot_tables, TableSnapshot, UrlRewrite};
pub use transfer::{StageOutcome, TransferPool};

use tracing::debug;

/// Steps of a sync run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    ResolveSource,
    ReadRows,
    ReadBlobList,
    ReleaseSource,
    ResolveDest,
    DeleteDestRows,
    InsertMembers,
    InsertEvents,
    RemapAndInsertPoints,
    ListDestBlobs,
    DeleteExtraBlobs,
    DiffBlobs,
    ResolveSourceAgain,
    TransferBlobs,
    Done,
}

impl SyncPhase {
    /// Log entry into this phase
    pub fn enter(self) {
        debug!(phase = %self, "Entering sync phase");
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::ResolveSource => "resolve_source",
            SyncPhase::ReadRows => "read_rows",
            SyncPhase::ReadBlobList => "read_blob_list",
            SyncPhase::ReleaseSource => "release_source",
            SyncPhase::ResolveDest => "resolve_dest",
            SyncPhase::DeleteDestRows => "delete_dest_rows",
            SyncPhase::InsertMembers => "insert_members",
            SyncPhase::InsertEvents => "insert_events",
            SyncPhase::RemapAndInsertPoints => "remap_and_insert_points",
            SyncPhase::ListDestBlobs => "list_dest_blobs",
            SyncPhase::DeleteExtraBlobs => "delete_extra_blobs",
            SyncPhase::DiffBlobs => "diff_blobs",
            SyncPhase::ResolveSourceAgain => "resolve_source_again",
            SyncPhase::TransferBlobs => "transfer_blobs",
            SyncPhase::Done => "done",
        };
        f.write_str(name)
    }
}
