//! [`FileMode`], the core's type-tag vocabulary (§3).

use gitfs_git::EntryMode;

/// The type of a path in the filesystem (§3 DATA MODEL).
///
/// Symbolic links are not a first-class mutable entity (§1 Non-goals): a
/// path backed by a `gix` symlink entry is surfaced as [`FileMode::RegularFile`]
/// — its blob content is the link target — since there is no dedicated
/// symlink-creation operation in this crate's surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// A regular file.
    RegularFile,
    /// An executable file.
    ExecutableFile,
    /// A directory.
    Tree,
    /// A submodule reference (gitlink). Never descended into; any merge that
    /// touches one is an immediate conflict.
    Gitlink,
    /// No entry at this path.
    Missing,
}

impl FileMode {
    /// Is this a directory?
    #[must_use]
    pub fn is_tree(self) -> bool {
        matches!(self, Self::Tree)
    }

    /// Is this a regular or executable file?
    #[must_use]
    pub fn is_blob(self) -> bool {
        matches!(self, Self::RegularFile | Self::ExecutableFile)
    }

    /// Convert from the wire vocabulary used by `gitfs-git`'s tree entries.
    /// There is no `Missing` on the wire — absence is the absence of an entry.
    #[must_use]
    pub fn from_entry_mode(mode: EntryMode) -> Self {
        match mode {
            EntryMode::Blob => Self::RegularFile,
            EntryMode::BlobExecutable => Self::ExecutableFile,
            EntryMode::Tree => Self::Tree,
            EntryMode::Commit => Self::Gitlink,
            EntryMode::Link => Self::RegularFile,
        }
    }

    /// Convert to the wire vocabulary. Panics on `Missing`, which callers
    /// must never attempt to serialize — `DirCache` only ever holds concrete
    /// entries.
    #[must_use]
    pub fn to_entry_mode(self) -> EntryMode {
        match self {
            Self::RegularFile => EntryMode::Blob,
            Self::ExecutableFile => EntryMode::BlobExecutable,
            Self::Tree => EntryMode::Tree,
            Self::Gitlink => EntryMode::Commit,
            Self::Missing => unreachable!("Missing has no wire representation"),
        }
    }
}
