//! The [`ObjectStore`] trait — the single interface the `gitfs` core programs
//! against.

use crate::error::StoreError;
use crate::types::{CommitInfo, GitOid, Identity, RefName, StoreAttributes, TreeEntry};

/// An append-only content-addressed object store, backed by a git repository.
///
/// `gitfs`'s staging engine and merge engine read blobs/trees, insert new
/// ones, and advance a single branch reference through this trait. The trait
/// is object-safe so callers can hold a `&dyn ObjectStore` or `Box<dyn
/// ObjectStore>` without a generic parameter threading through every type.
pub trait ObjectStore: Send + Sync {
    /// Read the full contents of a blob.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `id` does not name a blob.
    fn read_blob(&self, id: GitOid) -> Result<Vec<u8>, StoreError>;

    /// Read the size of a blob without materializing its content.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `id` does not name a blob.
    fn read_blob_size(&self, id: GitOid) -> Result<u64, StoreError>;

    /// Look up a single named entry within a tree, without reading the whole
    /// tree into memory.
    ///
    /// Returns `Ok(None)` if `name` is not an entry of the tree at `tree_id`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `tree_id` does not name a tree.
    fn walk_tree(&self, tree_id: GitOid, name: &str) -> Result<Option<TreeEntry>, StoreError>;

    /// Read all entries of a tree.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `id` does not name a tree.
    fn read_tree(&self, id: GitOid) -> Result<Vec<TreeEntry>, StoreError>;

    /// Read a commit's tree and parent OIDs.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `id` does not name a commit.
    fn read_commit(&self, id: GitOid) -> Result<CommitInfo, StoreError>;

    /// Convenience wrapper over [`read_commit`](Self::read_commit) returning
    /// only the parent list, used by `writeAndUpdateCommit`'s amend path.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `id` does not name a commit.
    fn read_commit_parents(&self, id: GitOid) -> Result<Vec<GitOid>, StoreError> {
        Ok(self.read_commit(id)?.parents)
    }

    /// Insert a new blob, returning its OID.
    ///
    /// # Errors
    /// Returns [`StoreError::BackendError`] if the write fails.
    fn insert_blob(&self, data: &[u8]) -> Result<GitOid, StoreError>;

    /// Insert a new tree from a pre-sorted entry list, returning its OID.
    ///
    /// Entries must already be sorted by `name` (git tree sort order); the
    /// staging engine's [`DirCache`](../gitfs/dircache/struct.DirCache.html)
    /// maintains this order itself.
    ///
    /// # Errors
    /// Returns [`StoreError::BackendError`] if the write fails.
    fn insert_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, StoreError>;

    /// Create a commit object pointing at `tree` with the given `parents`,
    /// identities, and message. Does not move any reference.
    ///
    /// # Errors
    /// Returns [`StoreError::BackendError`] if the write fails.
    fn insert_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        author: &Identity,
        committer: &Identity,
        message: &str,
    ) -> Result<GitOid, StoreError>;

    /// Flush any buffered but unwritten objects to the backing store.
    ///
    /// # Errors
    /// Returns [`StoreError::IoError`] if the flush fails.
    fn flush(&self) -> Result<(), StoreError>;

    /// Read the current value of a reference, or `None` if it does not exist.
    ///
    /// # Errors
    /// Returns [`StoreError::BackendError`] on a malformed ref.
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, StoreError>;

    /// Atomically update a reference to `new_value`, writing a reflog entry.
    ///
    /// If `expected_old` is `Some`, the update is rejected with
    /// [`StoreError::RefConflict`] unless the ref's current value equals it
    /// (compare-and-swap). If `force` is `true`, the CAS check and any
    /// fast-forward check are bypassed.
    ///
    /// # Errors
    /// Returns [`StoreError::RefConflict`] on a CAS mismatch, or
    /// [`StoreError::BackendError`] on a backend failure.
    fn update_ref(
        &self,
        name: &RefName,
        expected_old: Option<GitOid>,
        new_value: GitOid,
        force: bool,
        reflog_message: &str,
    ) -> Result<(), StoreError>;

    /// Point `name` at `tree` via a fresh root commit (no parents).
    ///
    /// Convenience wrapper used when a filesystem is first materialized with
    /// no base commit.
    ///
    /// # Errors
    /// Propagates errors from [`insert_commit`](Self::insert_commit) and
    /// [`update_ref`](Self::update_ref).
    fn init_branch_head(
        &self,
        name: &RefName,
        tree: GitOid,
        author: &Identity,
        committer: &Identity,
        message: &str,
    ) -> Result<GitOid, StoreError> {
        let commit = self.insert_commit(tree, &[], author, committer, message)?;
        self.update_ref(name, None, commit, false, "commit (initial)")?;
        Ok(commit)
    }

    /// Advance `name` from `parent` to a new commit over `tree`.
    ///
    /// # Errors
    /// Returns [`StoreError::RefConflict`] if `name` no longer points at
    /// `parent`; propagates errors from [`insert_commit`](Self::insert_commit).
    fn commit_branch_head(
        &self,
        name: &RefName,
        parent: GitOid,
        tree: GitOid,
        author: &Identity,
        committer: &Identity,
        message: &str,
    ) -> Result<GitOid, StoreError> {
        let commit = self.insert_commit(tree, &[parent], author, committer, message)?;
        self.update_ref(name, Some(parent), commit, false, "commit")?;
        Ok(commit)
    }

    /// Replace the commit at `old_head` with a new commit over `tree`,
    /// reusing `old_head`'s parent set.
    ///
    /// # Errors
    /// Propagates errors from [`read_commit_parents`](Self::read_commit_parents),
    /// [`insert_commit`](Self::insert_commit), and [`update_ref`](Self::update_ref).
    fn amend_branch_head(
        &self,
        name: &RefName,
        old_head: GitOid,
        tree: GitOid,
        author: &Identity,
        committer: &Identity,
        message: &str,
    ) -> Result<GitOid, StoreError> {
        let parents = self.read_commit_parents(old_head)?;
        let commit = self.insert_commit(tree, &parents, author, committer, message)?;
        self.update_ref(name, Some(old_head), commit, true, "commit (amend)")?;
        Ok(commit)
    }

    /// Force `name` to point directly at `new_commit`, with no regard for its
    /// current value.
    ///
    /// # Errors
    /// Propagates errors from [`update_ref`](Self::update_ref).
    fn reset_branch_head(&self, name: &RefName, new_commit: GitOid) -> Result<(), StoreError> {
        self.update_ref(name, None, new_commit, true, "reset")
    }

    /// Query total/usable/unallocated byte counts of the filesystem backing
    /// this store, for the filesystem's file-store attribute surface (§6).
    ///
    /// # Errors
    /// Returns [`StoreError::IoError`] if the underlying statfs call fails.
    fn store_attributes(&self) -> Result<StoreAttributes, StoreError>;
}
