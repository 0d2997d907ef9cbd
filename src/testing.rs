//! An in-memory [`ObjectStore`] double used by this crate's own tests and by
//! downstream integration tests. Not gated behind a feature flag: it has no
//! runtime cost for consumers who never construct it.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use gitfs_git::{CommitInfo, EntryMode, GitOid, Identity, ObjectStore, RefName, StoreAttributes, StoreError, TreeEntry};

/// A content-addressed, process-local object store backed by `HashMap`s.
///
/// Object ids are derived from content via [`std::hash::Hash`], not SHA-1 —
/// adequate for exercising the staging and merge engines without a real
/// repository, but not a substitute for [`gitfs_git::GixStore`].
#[derive(Default)]
pub struct InMemoryStore {
    blobs: Mutex<HashMap<GitOid, Vec<u8>>>,
    trees: Mutex<HashMap<GitOid, Vec<TreeEntry>>>,
    commits: Mutex<HashMap<GitOid, CommitInfo>>,
    refs: Mutex<HashMap<String, GitOid>>,
}

fn digest(parts: &[&[u8]]) -> GitOid {
    let mut bytes = [0u8; 20];
    for (slot, salt) in bytes.chunks_mut(8).zip(0u64..) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        salt.hash(&mut hasher);
        for part in parts {
            part.hash(&mut hasher);
        }
        let digest = hasher.finish().to_be_bytes();
        let n = slot.len();
        slot.copy_from_slice(&digest[..n]);
    }
    GitOid::from_bytes(bytes)
}

fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for entry in entries {
        bytes.extend_from_slice(entry.name.as_bytes());
        bytes.push(0);
        bytes.push(match entry.mode {
            EntryMode::Blob => 0,
            EntryMode::BlobExecutable => 1,
            EntryMode::Tree => 2,
            EntryMode::Link => 3,
            EntryMode::Commit => 4,
        });
        bytes.extend_from_slice(entry.oid.as_bytes());
    }
    bytes
}

impl InMemoryStore {
    /// Seed `name` to point at `target`, bypassing CAS (test setup helper).
    pub fn seed_ref(&self, name: &RefName, target: GitOid) {
        self.refs.lock().expect("refs lock poisoned").insert(name.as_str().to_owned(), target);
    }
}

impl ObjectStore for InMemoryStore {
    fn read_blob(&self, id: GitOid) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .expect("blobs lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { message: format!("blob {id}") })
    }

    fn read_blob_size(&self, id: GitOid) -> Result<u64, StoreError> {
        self.read_blob(id).map(|b| b.len() as u64)
    }

    fn walk_tree(&self, tree_id: GitOid, name: &str) -> Result<Option<TreeEntry>, StoreError> {
        Ok(self.read_tree(tree_id)?.into_iter().find(|e| e.name == name))
    }

    fn read_tree(&self, id: GitOid) -> Result<Vec<TreeEntry>, StoreError> {
        self.trees
            .lock()
            .expect("trees lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { message: format!("tree {id}") })
    }

    fn read_commit(&self, id: GitOid) -> Result<CommitInfo, StoreError> {
        self.commits
            .lock()
            .expect("commits lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { message: format!("commit {id}") })
    }

    fn insert_blob(&self, data: &[u8]) -> Result<GitOid, StoreError> {
        let id = digest(&[b"blob", data]);
        self.blobs.lock().expect("blobs lock poisoned").insert(id, data.to_vec());
        Ok(id)
    }

    fn insert_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, StoreError> {
        let encoded = encode_tree(entries);
        let id = digest(&[b"tree", &encoded]);
        self.trees.lock().expect("trees lock poisoned").insert(id, entries.to_vec());
        Ok(id)
    }

    fn insert_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        author: &Identity,
        committer: &Identity,
        message: &str,
    ) -> Result<GitOid, StoreError> {
        let mut parent_bytes = Vec::new();
        for parent in parents {
            parent_bytes.extend_from_slice(parent.as_bytes());
        }
        let id = digest(&[
            b"commit",
            tree.as_bytes(),
            &parent_bytes,
            author.name.as_bytes(),
            committer.name.as_bytes(),
            message.as_bytes(),
        ]);
        self.commits.lock().expect("commits lock poisoned").insert(
            id,
            CommitInfo {
                tree_oid: tree,
                parents: parents.to_vec(),
            },
        );
        Ok(id)
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, StoreError> {
        Ok(self.refs.lock().expect("refs lock poisoned").get(name.as_str()).copied())
    }

    fn update_ref(
        &self,
        name: &RefName,
        expected_old: Option<GitOid>,
        new_value: GitOid,
        force: bool,
        _reflog_message: &str,
    ) -> Result<(), StoreError> {
        let mut refs = self.refs.lock().expect("refs lock poisoned");
        let current = refs.get(name.as_str()).copied();
        if !force && current != expected_old {
            return Err(StoreError::RefConflict {
                ref_name: name.as_str().to_owned(),
                message: "compare-and-swap mismatch".to_owned(),
            });
        }
        refs.insert(name.as_str().to_owned(), new_value);
        Ok(())
    }

    fn store_attributes(&self) -> Result<StoreAttributes, StoreError> {
        Ok(StoreAttributes {
            total_space: 1_000_000_000,
            usable_space: 500_000_000,
            unallocated_space: 500_000_000,
        })
    }
}
