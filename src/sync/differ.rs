//! Blob listing comparison
//!
//! Decides which destination blobs to delete and which source blobs to copy.
//! Staleness is judged from modification time and size only; contents are
//! never hashed.

use std::collections::{HashMap, HashSet};

use crate::models::BlobObject;

/// Outcome of comparing a source and a destination listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobDiff {
    /// Source blobs to copy, in source listing order
    pub to_transfer: Vec<BlobObject>,
    /// Destination blobs the source no longer has, in destination listing order
    pub to_delete: Vec<BlobObject>,
    /// Source blobs already present and unchanged at the destination
    pub skipped: Vec<BlobObject>,
}

impl BlobDiff {
    /// Whether nothing needs to change at the destination
    pub fn is_empty(&self) -> bool {
        self.to_transfer.is_empty() && self.to_delete.is_empty()
    }
}

/// Compare two listings by name
pub fn diff(source: &[BlobObject], dest: &[BlobObject]) -> BlobDiff {
    let dest_by_name: HashMap<&str, &BlobObject> =
        dest.iter().map(|b| (b.name.as_str(), b)).collect();
    let source_names: HashSet<&str> = source.iter().map(|b| b.name.as_str()).collect();

    let mut result = BlobDiff::default();
    for blob in source {
        match dest_by_name.get(blob.name.as_str()) {
            Some(existing) if !is_stale(blob, existing) => result.skipped.push(blob.clone()),
            _ => result.to_transfer.push(blob.clone()),
        }
    }

    result.to_delete = dest
        .iter()
        .filter(|b| !source_names.contains(b.name.as_str()))
        .cloned()
        .collect();

    result
}

/// A destination copy is stale when the source is strictly newer or the sizes differ
fn is_stale(source: &BlobObject, dest: &BlobObject) -> bool {
    let newer = matches!(
        (source.last_modified, dest.last_modified),
        (Some(src), Some(dst)) if src > dst
    );
    newer || source.size != dest.size
}
