//! `gitfs`: an in-memory, POSIX-style filesystem layered over a
//! content-addressed git object store.
//!
//! Two subsystems make up the crate:
//!
//! - the **staging engine** ([`Filesystem`]), which tracks per-path
//!   insertions, deletions, open memory channels, and open directory
//!   iterators against a directory-cache view of a base tree; and
//! - the **three-way merge engine** ([`merge::three_way_merge`]), a
//!   lockstep tree walk that resolves trivial cases directly and falls back
//!   to a textual merge (or a recorded conflict) where both sides touched
//!   the same path.
//!
//! The object store itself — reading and writing blobs, trees, commits, and
//! refs — is abstracted by [`gitfs_git::ObjectStore`] and is not this
//! crate's concern.

pub mod channel;
pub mod config;
pub mod dircache;
pub mod dirstream;
pub mod error;
pub mod merge;
pub mod mode;
pub mod path;
pub mod staging;
pub mod state;
pub mod testing;

pub use channel::ByteChannelHandle;
pub use config::FsConfig;
pub use error::FsError;
pub use merge::{three_way_merge, Conflict, MergeOutcome};
pub use mode::FileMode;
pub use staging::{DirEntry, DirFilter, DirectoryStream, Filesystem, OpenOptions};
pub use state::FsState;

pub use gitfs_git::{GitOid, Identity, ObjectStore, RefName};
