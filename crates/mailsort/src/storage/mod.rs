//! Attachment persistence.

pub mod filesystem;
pub mod space;

pub use filesystem::{file_stats, AttachmentStore};
pub use space::{FsSpaceProbe, SpaceProbe};
