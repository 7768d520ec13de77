pub mod archive_walker;

pub use archive_walker::{ArchiveEntry, ArchiveWalk, ArchiveWalker, NestedArchive, WalkStatistics};
