//! The three-way merge engine (§4.4): a lockstep walk of base/ours/theirs
//! trees, resolving trivial cases directly and falling back to a textual
//! merge (or a recorded conflict) when both sides touched the same path.

mod conflict;
mod textual;

use std::collections::BTreeSet;

use gitfs_git::{EntryMode, GitOid, ObjectStore, TreeEntry};

pub use conflict::Conflict;

use crate::error::FsError;
use crate::mode::FileMode;
use crate::path;
use crate::staging::Filesystem;

/// The result of a complete three-way merge.
pub enum MergeOutcome {
    /// Every position resolved; the new tree id is already staged.
    Clean(GitOid),
    /// One or more positions could not be reconciled. Each conflicting path
    /// is still staged with a best-effort value.
    Conflicts(Vec<Conflict>),
}

/// Merge `theirs_tree` into `fs`, whose current base tree is treated as
/// "ours", against `base_tree` as the common ancestor.
///
/// On success, `fs`'s base tree already reflects the merge result (clean or
/// not) — call [`Filesystem::write_and_update_tree`] to obtain its id, or
/// rely on the `GitOid` returned in [`MergeOutcome::Clean`].
///
/// This function never drives `fs`'s [`FsState`](crate::state::FsState) tag —
/// orchestration above the core is responsible for setting `Merging` before
/// the call and `Normal`/`MergingConflict` after, matching the outcome.
///
/// # Errors
/// Propagates [`FsError::Io`] from any tree/blob read or write.
pub fn three_way_merge(
    fs: &mut Filesystem,
    base_tree: Option<GitOid>,
    theirs_tree: Option<GitOid>,
) -> Result<MergeOutcome, FsError> {
    let store = fs.store_arc();
    let ours_tree = fs.base_tree_oid();
    let mut conflicts = Vec::new();

    walk_level(fs, store.as_ref(), base_tree, ours_tree, theirs_tree, "", &mut conflicts)?;

    if conflicts.is_empty() {
        let written = fs.write_and_update_tree()?;
        let tree_id = written.or(ours_tree).unwrap_or(GitOid::ZERO);
        Ok(MergeOutcome::Clean(tree_id))
    } else {
        Ok(MergeOutcome::Conflicts(conflicts))
    }
}

fn read_tree_opt(store: &dyn ObjectStore, tree: Option<GitOid>) -> Result<Vec<TreeEntry>, FsError> {
    match tree {
        Some(id) if !id.is_zero() => Ok(store.read_tree(id)?),
        _ => Ok(Vec::new()),
    }
}

fn walk_level(
    fs: &mut Filesystem,
    store: &dyn ObjectStore,
    base: Option<GitOid>,
    ours: Option<GitOid>,
    theirs: Option<GitOid>,
    dir: &str,
    conflicts: &mut Vec<Conflict>,
) -> Result<(), FsError> {
    let base_entries = read_tree_opt(store, base)?;
    let our_entries = read_tree_opt(store, ours)?;
    let their_entries = read_tree_opt(store, theirs)?;

    let mut names: BTreeSet<&str> = BTreeSet::new();
    names.extend(base_entries.iter().map(|e| e.name.as_str()));
    names.extend(our_entries.iter().map(|e| e.name.as_str()));
    names.extend(their_entries.iter().map(|e| e.name.as_str()));

    for name in names {
        let path = path::join(dir, name);
        let b = base_entries.iter().find(|e| e.name == name);
        let o = our_entries.iter().find(|e| e.name == name);
        let t = their_entries.iter().find(|e| e.name == name);
        resolve_position(fs, store, &path, b, o, t, conflicts)?;
    }
    Ok(())
}

fn mode_oid(entry: Option<&TreeEntry>) -> Option<(EntryMode, GitOid)> {
    entry.map(|e| (e.mode, e.oid))
}

fn to_side(mode_oid: Option<(EntryMode, GitOid)>) -> conflict::Side {
    mode_oid.map(|(mode, oid)| (FileMode::from_entry_mode(mode), oid))
}

fn reconcile_modes(our_mode: EntryMode, base_mode: Option<EntryMode>, their_mode: EntryMode) -> Option<EntryMode> {
    if our_mode == their_mode {
        return Some(our_mode);
    }
    if Some(our_mode) == base_mode {
        return Some(their_mode);
    }
    if Some(their_mode) == base_mode {
        return Some(our_mode);
    }
    None
}

fn apply_side(fs: &mut Filesystem, path: &str, side: Option<&TreeEntry>) -> Result<(), FsError> {
    match side {
        None => fs.merge_remove(path),
        Some(e) if e.mode == EntryMode::Tree => fs.merge_adopt_subtree(path, e.oid),
        Some(e) => fs.merge_adopt_blob(path, FileMode::from_entry_mode(e.mode), e.oid),
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_position(
    fs: &mut Filesystem,
    store: &dyn ObjectStore,
    path: &str,
    b: Option<&TreeEntry>,
    o: Option<&TreeEntry>,
    t: Option<&TreeEntry>,
    conflicts: &mut Vec<Conflict>,
) -> Result<(), FsError> {
    let base_mo = mode_oid(b);
    let our_mo = mode_oid(o);
    let their_mo = mode_oid(t);

    // Case 1: ours unchanged relative to base — adopt theirs.
    if our_mo == base_mo {
        return apply_side(fs, path, t);
    }
    // Case 2: theirs unchanged relative to base — ours already reflects it.
    if their_mo == base_mo {
        return Ok(());
    }

    match (o, t) {
        (Some(oe), Some(te)) if oe.oid == te.oid => {
            // Case 3: identical ids on both sides, only modes disagree.
            match reconcile_modes(oe.mode, b.map(|e| e.mode), te.mode) {
                Some(mode) => fs.merge_adopt_blob(path, FileMode::from_entry_mode(mode), oe.oid),
                None => {
                    conflicts.push(Conflict {
                        path: path.to_owned(),
                        base: to_side(base_mo),
                        ours: to_side(our_mo),
                        theirs: to_side(their_mo),
                    });
                    apply_side(fs, path, o)
                }
            }
        }
        (Some(oe), Some(te)) if oe.mode != EntryMode::Tree && te.mode != EntryMode::Tree => {
            if oe.mode == EntryMode::Commit || te.mode == EntryMode::Commit {
                conflicts.push(Conflict {
                    path: path.to_owned(),
                    base: to_side(base_mo),
                    ours: to_side(our_mo),
                    theirs: to_side(their_mo),
                });
                return apply_side(fs, path, o);
            }
            // Case 4: both sides are blobs with different content — merge textually.
            let base_bytes = match b {
                Some(be) if be.mode != EntryMode::Tree => store.read_blob(be.oid)?,
                _ => Vec::new(),
            };
            let our_bytes = store.read_blob(oe.oid)?;
            let their_bytes = store.read_blob(te.oid)?;
            let merged = textual::merge_blobs(&base_bytes, &our_bytes, &their_bytes, &fs.config().conflict_markers);
            let blob_oid = store.insert_blob(&merged.content)?;
            let reconciled_mode = reconcile_modes(oe.mode, b.map(|e| e.mode), te.mode);
            let mode = reconciled_mode.unwrap_or(oe.mode);
            fs.merge_adopt_blob(path, FileMode::from_entry_mode(mode), blob_oid)?;
            if merged.has_conflicts || reconciled_mode.is_none() {
                conflicts.push(Conflict {
                    path: path.to_owned(),
                    base: to_side(base_mo),
                    ours: to_side(our_mo),
                    theirs: to_side(their_mo),
                });
            }
            Ok(())
        }
        (Some(oe), Some(te)) if oe.mode == EntryMode::Tree && te.mode == EntryMode::Tree => {
            // Case 5: both sides are trees — descend.
            let base_sub = match b {
                Some(be) if be.mode == EntryMode::Tree => Some(be.oid),
                _ => None,
            };
            fs.merge_ensure_directory(path)?;
            walk_level(fs, store, base_sub, Some(oe.oid), Some(te.oid), path, conflicts)
        }
        _ => {
            // Case 6: irreconcilable shapes — keep ours, record a conflict.
            conflicts.push(Conflict {
                path: path.to_owned(),
                base: to_side(base_mo),
                ours: to_side(our_mo),
                theirs: to_side(their_mo),
            });
            apply_side(fs, path, o)
        }
    }
}
