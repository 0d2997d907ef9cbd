//! The directory-cache view (§4.1): a flat, sorted index standing in for a
//! base tree while it is being edited.

use gitfs_git::{EntryMode, GitOid, ObjectStore, TreeEntry};

use crate::error::FsError;
use crate::mode::FileMode;
use crate::path;

/// A single cached entry: a path, its type, and the object it resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    /// The full path (never the root).
    pub path: String,
    /// The entry's type. Never [`FileMode::Missing`].
    pub mode: FileMode,
    /// The blob, tree, or gitlink id this entry resolves to.
    pub oid: GitOid,
}

/// A flat, path-sorted view of a tree, built once per base tree and mutated
/// through [`builder`](DirCache::builder)/[`editor`](DirCache::editor) as
/// edits are flushed (§4.1, §4.3).
#[derive(Clone, Debug, Default)]
pub struct DirCache {
    entries: Vec<CacheEntry>,
}

impl DirCache {
    /// Build a cache by recursively walking `tree_id`.
    ///
    /// # Errors
    /// Propagates [`FsError::Io`] if the object store fails to read a tree.
    pub fn for_tree(store: &dyn ObjectStore, tree_id: GitOid) -> Result<Self, FsError> {
        let mut entries = Vec::new();
        collect(store, tree_id, "", &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Self { entries })
    }

    /// An empty cache, as if built from an empty tree.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a single path's mode and object id.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<(FileMode, GitOid)> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|idx| (self.entries[idx].mode, self.entries[idx].oid))
    }

    /// Does a regular/executable file exist at `path`?
    #[must_use]
    pub fn file_exists(&self, path: &str) -> bool {
        matches!(self.lookup(path), Some((mode, _)) if mode.is_blob())
    }

    /// Does any entry exist strictly under `path` (making `path` a
    /// non-trivial directory)?
    #[must_use]
    pub fn is_non_trivial_directory(&self, path: &str) -> bool {
        let prefix = path::within_prefix(path);
        let idx = self.entries.partition_point(|e| e.path.as_str() < prefix.as_str());
        idx < self.entries.len() && self.entries[idx].path.starts_with(&prefix)
    }

    /// All entries whose path lies strictly within `prefix`, in sorted order.
    #[must_use]
    pub fn entries_within(&self, prefix: &str) -> Vec<&CacheEntry> {
        let scan_prefix = path::within_prefix(prefix);
        let start = self
            .entries
            .partition_point(|e| e.path.as_str() < scan_prefix.as_str());
        self.entries[start..]
            .iter()
            .take_while(|e| e.path.starts_with(&scan_prefix))
            .collect()
    }

    /// Number of entries strictly within `prefix` — used to seed
    /// `deletedDirs` counters.
    #[must_use]
    pub fn count_within(&self, prefix: &str) -> usize {
        self.entries_within(prefix).len()
    }

    /// Start an additive mutation batch.
    #[must_use]
    pub fn builder(&self) -> CacheBuilder<'_> {
        CacheBuilder {
            cache: self,
            upserts: Vec::new(),
        }
    }

    /// Start a deletive mutation batch.
    #[must_use]
    pub fn editor(&self) -> CacheEditor<'_> {
        CacheEditor {
            cache: self,
            removals: Vec::new(),
        }
    }

    /// Remove every entry strictly within `prefix` (used when staging a
    /// directory deletion directly, bypassing per-file editor removals).
    pub fn delete_directory(&mut self, prefix: &str) {
        let scan_prefix = path::within_prefix(prefix);
        self.entries.retain(|e| !e.path.starts_with(&scan_prefix));
    }

    /// Discard all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The immediate children of `dir`: one entry per distinct next path
    /// segment, synthesizing [`FileMode::Tree`] for names that only exist as
    /// a prefix of deeper entries (used by `newDirectoryStream`, which yields
    /// a `readdir`-style listing rather than a recursive walk).
    #[must_use]
    pub fn immediate_children(&self, dir: &str) -> Vec<(String, FileMode)> {
        let within = self.entries_within(dir);
        let scan_prefix = path::within_prefix(dir);
        let mut out = Vec::new();
        let mut i = 0;
        while i < within.len() {
            let rel = &within[i].path[scan_prefix.len()..];
            let name = rel.split('/').next().unwrap_or(rel);
            if rel.contains('/') {
                out.push((name.to_owned(), FileMode::Tree));
                while i < within.len() && within[i].path[scan_prefix.len()..].starts_with(name) && within[i].path.as_bytes().get(scan_prefix.len() + name.len()) == Some(&b'/') {
                    i += 1;
                }
            } else {
                out.push((name.to_owned(), within[i].mode));
                i += 1;
            }
        }
        out
    }

    /// Serialize the cache into nested tree objects, returning the root tree
    /// id. Identical cache content always yields an identical id.
    ///
    /// # Errors
    /// Propagates [`FsError::Io`] if the object store fails to write a tree.
    pub fn write_tree(&self, store: &dyn ObjectStore) -> Result<GitOid, FsError> {
        build_subtree(&self.entries, 0, store)
    }
}

fn collect(
    store: &dyn ObjectStore,
    tree_id: GitOid,
    prefix: &str,
    out: &mut Vec<CacheEntry>,
) -> Result<(), FsError> {
    for entry in store.read_tree(tree_id)? {
        let full_path = path::join(prefix, &entry.name);
        if entry.mode == EntryMode::Tree {
            collect(store, entry.oid, &full_path, out)?;
        } else {
            out.push(CacheEntry {
                path: full_path,
                mode: FileMode::from_entry_mode(entry.mode),
                oid: entry.oid,
            });
        }
    }
    Ok(())
}

/// Build the tree rooted at `depth` path segments deep, given `entries`
/// already restricted (by the caller) to that subtree and sorted by full path.
fn build_subtree(
    entries: &[CacheEntry],
    depth: usize,
    store: &dyn ObjectStore,
) -> Result<GitOid, FsError> {
    let mut children: Vec<TreeEntry> = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let segment = nth_segment(&entries[i].path, depth);
        let is_leaf = segment_count(&entries[i].path) == depth + 1;
        let start = i;
        while i < entries.len() && nth_segment(&entries[i].path, depth) == segment {
            i += 1;
        }
        if is_leaf {
            let e = &entries[start];
            children.push(TreeEntry {
                name: segment.to_owned(),
                mode: e.mode.to_entry_mode(),
                oid: e.oid,
            });
        } else {
            let sub_oid = build_subtree(&entries[start..i], depth + 1, store)?;
            children.push(TreeEntry {
                name: segment.to_owned(),
                mode: EntryMode::Tree,
                oid: sub_oid,
            });
        }
    }
    // Git's canonical tree sort order treats directory names as if suffixed
    // with '/', so "foo.txt" sorts before "foo/" even though 'o' < '.' fails
    // a plain byte comparison.
    children.sort_by(|a, b| git_tree_name_key(a).cmp(&git_tree_name_key(b)));
    Ok(store.insert_tree(&children)?)
}

fn git_tree_name_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.as_bytes().to_vec();
    if entry.mode == EntryMode::Tree {
        key.push(b'/');
    }
    key
}

fn segment_count(path: &str) -> usize {
    path.split('/').count()
}

fn nth_segment(path: &str, n: usize) -> &str {
    path.split('/').nth(n).unwrap_or("")
}

/// An additive mutation batch over a [`DirCache`] (§4.3 `flushInsertions`).
pub struct CacheBuilder<'a> {
    cache: &'a DirCache,
    upserts: Vec<CacheEntry>,
}

impl CacheBuilder<'_> {
    /// Stage an upsert of `path` to the given mode and object id.
    pub fn upsert(&mut self, path: String, mode: FileMode, oid: GitOid) {
        self.upserts.push(CacheEntry { path, mode, oid });
    }

    /// Apply the batch, returning the new cache.
    #[must_use]
    pub fn finish(self) -> DirCache {
        let mut entries = self.cache.entries.clone();
        for upsert in self.upserts {
            match entries.binary_search_by(|e| e.path.as_str().cmp(upsert.path.as_str())) {
                Ok(idx) => entries[idx] = upsert,
                Err(idx) => entries.insert(idx, upsert),
            }
        }
        DirCache { entries }
    }
}

/// A deletive mutation batch over a [`DirCache`] (§4.3 `flushDeletions`).
pub struct CacheEditor<'a> {
    cache: &'a DirCache,
    removals: Vec<String>,
}

impl CacheEditor<'_> {
    /// Stage the removal of `path`.
    pub fn remove(&mut self, path: String) {
        self.removals.push(path);
    }

    /// Apply the batch, returning the new cache.
    #[must_use]
    pub fn finish(self) -> DirCache {
        let mut entries = self.cache.entries.clone();
        entries.retain(|e| !self.removals.contains(&e.path));
        DirCache { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitfs_git::StoreError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        trees: Mutex<HashMap<GitOid, Vec<TreeEntry>>>,
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

    fn content_oid(entries: &[TreeEntry]) -> GitOid {
        use std::hash::{Hash, Hasher};
        let encoded = encode_tree(entries);
        let mut bytes = [0u8; 20];
        for (slot, salt) in bytes.chunks_mut(8).zip(0u64..) {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            salt.hash(&mut hasher);
            encoded.hash(&mut hasher);
            let digest = hasher.finish().to_be_bytes();
            let n = slot.len();
            slot.copy_from_slice(&digest[..n]);
        }
        GitOid::from_bytes(bytes)
    }

    impl ObjectStore for FakeStore {
        fn read_blob(&self, _id: GitOid) -> Result<Vec<u8>, StoreError> {
            unimplemented!()
        }
        fn read_blob_size(&self, _id: GitOid) -> Result<u64, StoreError> {
            unimplemented!()
        }
        fn walk_tree(&self, _tree_id: GitOid, _name: &str) -> Result<Option<TreeEntry>, StoreError> {
            unimplemented!()
        }
        fn read_tree(&self, id: GitOid) -> Result<Vec<TreeEntry>, StoreError> {
            Ok(self.trees.lock().unwrap().get(&id).cloned().unwrap_or_default())
        }
        fn read_commit(&self, _id: GitOid) -> Result<gitfs_git::CommitInfo, StoreError> {
            unimplemented!()
        }
        fn insert_blob(&self, _data: &[u8]) -> Result<GitOid, StoreError> {
            unimplemented!()
        }
        fn insert_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, StoreError> {
            let oid = content_oid(entries);
            self.trees.lock().unwrap().insert(oid, entries.to_vec());
            Ok(oid)
        }
        fn insert_commit(
            &self,
            _tree: GitOid,
            _parents: &[GitOid],
            _author: &gitfs_git::Identity,
            _committer: &gitfs_git::Identity,
            _message: &str,
        ) -> Result<GitOid, StoreError> {
            unimplemented!()
        }
        fn flush(&self) -> Result<(), StoreError> {
            Ok(())
        }
        fn read_ref(&self, _name: &gitfs_git::RefName) -> Result<Option<GitOid>, StoreError> {
            unimplemented!()
        }
        fn update_ref(
            &self,
            _name: &gitfs_git::RefName,
            _expected_old: Option<GitOid>,
            _new_value: GitOid,
            _force: bool,
            _reflog_message: &str,
        ) -> Result<(), StoreError> {
            unimplemented!()
        }
        fn store_attributes(&self) -> Result<gitfs_git::StoreAttributes, StoreError> {
            unimplemented!()
        }
    }

    fn oid(byte: u8) -> GitOid {
        let mut bytes = [0u8; 20];
        bytes[0] = byte;
        GitOid::from_bytes(bytes)
    }

    fn cache_with(entries: &[(&str, FileMode)]) -> DirCache {
        DirCache {
            entries: entries
                .iter()
                .map(|(p, m)| CacheEntry {
                    path: (*p).to_owned(),
                    mode: *m,
                    oid: oid(1),
                })
                .collect(),
        }
    }

    #[test]
    fn lookup_found_and_missing() {
        let cache = cache_with(&[("a.txt", FileMode::RegularFile)]);
        assert!(cache.lookup("a.txt").is_some());
        assert!(cache.lookup("b.txt").is_none());
    }

    #[test]
    fn file_exists_requires_blob_mode() {
        let cache = cache_with(&[("dir/inner.txt", FileMode::RegularFile)]);
        assert!(!cache.file_exists("dir"));
        assert!(cache.file_exists("dir/inner.txt"));
    }

    #[test]
    fn is_non_trivial_directory() {
        let cache = cache_with(&[("a/b.txt", FileMode::RegularFile), ("ab.txt", FileMode::RegularFile)]);
        assert!(cache.is_non_trivial_directory("a"));
        assert!(!cache.is_non_trivial_directory("ab"));
        assert!(!cache.is_non_trivial_directory("missing"));
    }

    #[test]
    fn is_non_trivial_directory_root() {
        let cache = cache_with(&[("a.txt", FileMode::RegularFile)]);
        assert!(cache.is_non_trivial_directory(""));
        assert!(!DirCache::empty().is_non_trivial_directory(""));
    }

    #[test]
    fn entries_within_excludes_siblings() {
        let cache = cache_with(&[
            ("a/x.txt", FileMode::RegularFile),
            ("a/y.txt", FileMode::RegularFile),
            ("ab/z.txt", FileMode::RegularFile),
        ]);
        let within = cache.entries_within("a");
        assert_eq!(within.len(), 2);
    }

    #[test]
    fn builder_upsert_preserves_sort() {
        let cache = cache_with(&[("b.txt", FileMode::RegularFile)]);
        let mut builder = cache.builder();
        builder.upsert("a.txt".to_owned(), FileMode::RegularFile, oid(2));
        let next = builder.finish();
        assert_eq!(next.lookup("a.txt").unwrap().1, oid(2));
        assert!(next.lookup("b.txt").is_some());
    }

    #[test]
    fn editor_remove() {
        let cache = cache_with(&[("a.txt", FileMode::RegularFile), ("b.txt", FileMode::RegularFile)]);
        let mut editor = cache.editor();
        editor.remove("a.txt".to_owned());
        let next = editor.finish();
        assert!(next.lookup("a.txt").is_none());
        assert!(next.lookup("b.txt").is_some());
    }

    #[test]
    fn delete_directory_removes_subtree() {
        let mut cache = cache_with(&[
            ("src/a.txt", FileMode::RegularFile),
            ("src/sub/b.txt", FileMode::RegularFile),
            ("other.txt", FileMode::RegularFile),
        ]);
        cache.delete_directory("src");
        assert!(cache.lookup("src/a.txt").is_none());
        assert!(cache.lookup("src/sub/b.txt").is_none());
        assert!(cache.lookup("other.txt").is_some());
    }

    #[test]
    fn write_tree_roundtrips_through_for_tree() {
        let store = FakeStore::default();
        let mut cache = DirCache::empty();
        let mut builder = cache.builder();
        builder.upsert("dir/a.txt".to_owned(), FileMode::RegularFile, oid(3));
        builder.upsert("top.txt".to_owned(), FileMode::RegularFile, oid(4));
        cache = builder.finish();

        let tree_id = cache.write_tree(&store).unwrap();
        let reloaded = DirCache::for_tree(&store, tree_id).unwrap();
        assert_eq!(reloaded.lookup("dir/a.txt").unwrap().1, oid(3));
        assert_eq!(reloaded.lookup("top.txt").unwrap().1, oid(4));
    }

    #[test]
    fn write_tree_is_deterministic() {
        let store = FakeStore::default();
        let mut cache = DirCache::empty();
        let mut builder = cache.builder();
        builder.upsert("a.txt".to_owned(), FileMode::RegularFile, oid(5));
        cache = builder.finish();
        let first = cache.write_tree(&store).unwrap();
        let second = cache.write_tree(&store).unwrap();
        assert_eq!(first, second);
    }
}
