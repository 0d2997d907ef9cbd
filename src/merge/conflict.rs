//! The conflict record produced by an unresolved merge position (§4.4 case 6,
//! §7 conflict accounting).

use gitfs_git::GitOid;

use crate::mode::FileMode;

/// One side's view of a path at a merge position: absent, or present with a
/// type and object id.
pub type Side = Option<(FileMode, GitOid)>;

/// A single unresolved merge position.
///
/// Produced whenever the decision ladder cannot reconcile a path across
/// base/ours/theirs — a type mismatch, divergent mode changes, or a textual
/// merge that left its own markers in the blob. The path is still staged
/// with a best-effort value (so the resulting tree is well-formed); the
/// conflict record is the caller's signal to resolve it before committing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    /// The path this conflict occurred at.
    pub path: String,
    /// The base side, if present.
    pub base: Side,
    /// Our side, if present.
    pub ours: Side,
    /// Their side, if present.
    pub theirs: Side,
}
