//! [`FsState`], the observable filesystem lifecycle tag (§6).

/// A coordination hint for orchestration layered above the core.
///
/// The core never transitions this tag itself — it exposes a getter/setter
/// pair ([`Filesystem::state`](crate::Filesystem::state) and
/// [`Filesystem::set_state`](crate::Filesystem::set_state)) so surrounding
/// orchestration can read and drive it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FsState {
    /// No orchestrated operation in progress.
    #[default]
    Normal,
    /// A checkout is in progress.
    CheckingOut,
    /// A commit is in progress.
    Committing,
    /// A merge is in progress.
    Merging,
    /// A merge left unresolved conflicts.
    MergingConflict,
    /// A cherry-pick is in progress.
    CherryPicking,
    /// A cherry-pick left unresolved conflicts.
    CherryPickingConflict,
    /// A reset is in progress.
    Resetting,
    /// A stash is being created.
    CreatingStash,
    /// A stash is being applied.
    ApplyingStash,
}
