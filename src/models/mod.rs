//! Domain models for roster-sync
//!
//! Typed rows for the three replicated tables, storage listing entries,
//! environment tags and the run summary.

pub mod blob;
pub mod environment;
pub mod event;
pub mod member;
pub mod points;
pub mod result;

// Re-export commonly used types
pub use blob::{join_path, BlobObject, DownloadedBlob, DEFAULT_CONTENT_TYPE};
pub use environment::{Direction, Environment};
pub use event::{Event, EventKey};
pub use member::{normalize_netid, Member, MemberKey};
pub use points::PointsRecord;
pub use result::SyncResult;
