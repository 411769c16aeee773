//! Object storage backends for roster-sync
//!
//! Hosted environments use Supabase Storage; local environments keep their
//! blobs in a plain directory.

pub mod traits;

mod filesystem;
mod supabase;

pub use traits::BlobStore;

#[cfg(test)]
pub use traits::MockBlobStore;

pub use filesystem::FilesystemStore;
pub use supabase::SupabaseStorage;
