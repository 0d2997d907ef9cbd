//! [`FsError`], the single error type for the staging engine and merger (§7).

use thiserror::Error;

/// Errors returned by staging-engine and merge-engine operations.
///
/// The propagation policy (§7): the staging engine never retries and surfaces
/// every one of these directly; the object-store adapter is responsible for
/// its own retry/validation and raises [`FsError::Io`] on terminal failure.
#[derive(Debug, Error)]
pub enum FsError {
    /// Operation attempted after [`close`](crate::Filesystem::close). Never
    /// recovered locally — the filesystem instance is permanently dead.
    #[error("filesystem is closed")]
    ClosedFilesystem,

    /// Path resolution failed for a read/delete/move source.
    #[error("no such file or directory: {path}")]
    NoSuchFile {
        /// The path that could not be resolved.
        path: String,
    },

    /// Creation asked for non-replacement but the target already exists.
    #[error("file already exists: {path}")]
    FileAlreadyExists {
        /// The path that already existed.
        path: String,
    },

    /// Attempted to replace or delete a non-empty directory.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The non-empty directory.
        path: String,
    },

    /// An iterator was opened on, or an operation expected, a directory but
    /// found something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
    },

    /// The target (or an ancestor) has an open handle that forbids mutation
    /// (I7/I8), or a move target lies inside its own source.
    #[error("access denied: {path}: {reason}")]
    AccessDenied {
        /// The path the caller tried to mutate.
        path: String,
        /// Why the mutation was refused.
        reason: String,
    },

    /// Propagated from the object store.
    #[error("I/O error: {0}")]
    Io(#[from] gitfs_git::StoreError),

    /// A queried attribute name was not in the recognized set.
    #[error("unsupported operation: {what}")]
    UnsupportedOperation {
        /// Description of what was requested.
        what: String,
    },

    /// An internal invariant was violated — a bug, not a retryable failure.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of the invariant that was found broken.
        message: String,
    },
}
