//! Sync run summary

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of one sync run
///
/// Returned even when sub-operations failed; `errors` lists every recoverable
/// failure in the order it was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Member rows written to the destination
    pub members: u64,
    /// Event rows written to the destination
    pub events: u64,
    /// Points rows written to the destination
    pub points: u64,
    /// Blobs transferred
    pub headshots: u64,
    /// Blobs left alone because they were unchanged
    pub skipped_headshots: u64,
    /// Destination blobs removed because the source no longer has them
    pub deleted_headshots: u64,
    /// Human-readable description of each recoverable failure
    pub errors: Vec<String>,
}

impl SyncResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a recoverable failure
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "Sync step failed");
        self.errors.push(message);
    }

    /// Append several recoverable failures
    pub fn extend_errors(&mut self, messages: impl IntoIterator<Item = String>) {
        for message in messages {
            self.record_error(message);
        }
    }

    /// Whether the run finished without any recorded failure
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line status message
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Synced {} members, {} events, {} points, {} headshots ({} unchanged, {} deleted)",
            self.members,
            self.events,
            self.points,
            self.headshots,
            self.skipped_headshots,
            self.deleted_headshots
        );
        if !self.errors.is_empty() {
            line.push_str(&format!(" with {} error(s)", self.errors.len()));
        }
        line
    }
}
