//! The gix-backed implementation of [`ObjectStore`].

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::store::ObjectStore;
use crate::types::{CommitInfo, GitOid, Identity, RefName, StoreAttributes, TreeEntry};

/// An [`ObjectStore`] implementation backed by [gix](https://github.com/GitoxideLabs/gitoxide).
///
/// Construct via [`GixStore::open`] or [`GixStore::open_at`].
pub struct GixStore {
    pub(crate) repo: gix::Repository,
    #[allow(dead_code)]
    pub(crate) workdir: Option<PathBuf>,
}

impl GixStore {
    /// Open the git repository at or above `path`.
    ///
    /// # Errors
    /// Returns [`StoreError::BackendError`] if no repository can be found or
    /// opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let repo =
            gix::open(path).map_err(|e| StoreError::BackendError { message: e.to_string() })?;
        let workdir = repo.workdir().map(std::path::Path::to_path_buf);
        Ok(Self { repo, workdir })
    }

    /// Open a git repository at exactly `path` (no parent discovery).
    ///
    /// # Errors
    /// Returns [`StoreError::BackendError`] if `path` is not a repository.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let repo = gix::open_opts(path, gix::open::Options::isolated())
            .map_err(|e| StoreError::BackendError { message: e.to_string() })?;
        let workdir = repo.workdir().map(std::path::Path::to_path_buf);
        Ok(Self { repo, workdir })
    }

    /// The directory gix treats as the repository's `.git` (or bare root),
    /// used to statfs the backing filesystem.
    fn stat_dir(&self) -> PathBuf {
        self.workdir
            .clone()
            .unwrap_or_else(|| self.repo.git_dir().to_path_buf())
    }
}

impl ObjectStore for GixStore {
    fn read_blob(&self, id: GitOid) -> Result<Vec<u8>, StoreError> {
        crate::objects_impl::read_blob(self, id)
    }

    fn read_blob_size(&self, id: GitOid) -> Result<u64, StoreError> {
        crate::objects_impl::read_blob_size(self, id)
    }

    fn walk_tree(&self, tree_id: GitOid, name: &str) -> Result<Option<TreeEntry>, StoreError> {
        crate::objects_impl::walk_tree(self, tree_id, name)
    }

    fn read_tree(&self, id: GitOid) -> Result<Vec<TreeEntry>, StoreError> {
        crate::objects_impl::read_tree(self, id)
    }

    fn read_commit(&self, id: GitOid) -> Result<CommitInfo, StoreError> {
        crate::objects_impl::read_commit(self, id)
    }

    fn insert_blob(&self, data: &[u8]) -> Result<GitOid, StoreError> {
        crate::objects_impl::insert_blob(self, data)
    }

    fn insert_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, StoreError> {
        crate::objects_impl::insert_tree(self, entries)
    }

    fn insert_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        author: &Identity,
        committer: &Identity,
        message: &str,
    ) -> Result<GitOid, StoreError> {
        crate::objects_impl::insert_commit(self, tree, parents, author, committer, message)
    }

    fn flush(&self) -> Result<(), StoreError> {
        // gix writes loose objects eagerly; nothing to flush beyond that.
        Ok(())
    }

    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, StoreError> {
        crate::refs_impl::read_ref(self, name)
    }

    fn update_ref(
        &self,
        name: &RefName,
        expected_old: Option<GitOid>,
        new_value: GitOid,
        force: bool,
        reflog_message: &str,
    ) -> Result<(), StoreError> {
        crate::refs_impl::update_ref(self, name, expected_old, new_value, force, reflog_message)
    }

    fn store_attributes(&self) -> Result<StoreAttributes, StoreError> {
        let dir = self.stat_dir();
        let total = fs2::total_space(&dir)?;
        let usable = fs2::available_space(&dir)?;
        let unallocated = fs2::free_space(&dir)?;
        Ok(StoreAttributes {
            total_space: total,
            usable_space: usable,
            unallocated_space: unallocated,
        })
    }
}
