//! The staging engine (§4.2, §4.3): the `Filesystem` aggregate and its public
//! operations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gitfs_git::{GitOid, Identity, ObjectStore, RefName};
use tracing::{debug, trace};

use crate::channel::{ByteChannelHandle, Channel};
use crate::config::FsConfig;
use crate::dircache::DirCache;
use crate::dirstream::DirStreamRegistry;
use crate::error::FsError;
use crate::mode::FileMode;
use crate::path;
use crate::state::FsState;

/// The set of options a caller may request of [`Filesystem::new_byte_channel`]
/// (§6 Open-option set).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub create_new: bool,
    pub append: bool,
    pub truncate: bool,
}

impl OpenOptions {
    /// An options set with every flag cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn read(mut self, value: bool) -> Self {
        self.read = value;
        self
    }

    #[must_use]
    pub fn write(mut self, value: bool) -> Self {
        self.write = value;
        self
    }

    #[must_use]
    pub fn create(mut self, value: bool) -> Self {
        self.create = value;
        self
    }

    #[must_use]
    pub fn create_new(mut self, value: bool) -> Self {
        self.create_new = value;
        self
    }

    #[must_use]
    pub fn append(mut self, value: bool) -> Self {
        self.append = value;
        self
    }

    #[must_use]
    pub fn truncate(mut self, value: bool) -> Self {
        self.truncate = value;
        self
    }

    fn wants_mutation(self) -> bool {
        self.write || self.create || self.create_new || self.append || self.truncate
    }
}

/// A single directory entry as returned by a directory stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// The entry's basename (not a full path).
    pub name: String,
    /// The entry's type.
    pub mode: FileMode,
}

/// A filter predicate applied by [`Filesystem::new_directory_stream`].
pub type DirFilter = Box<dyn Fn(&str) -> bool>;

/// A snapshot iterator over a directory's immediate children (§4.2
/// `newDirectoryStream`).
///
/// Registered in the owning filesystem's directory-stream registry on
/// creation; call [`Filesystem::close_directory_stream`] to deregister (I8).
/// Dropping without closing leaves the registration in place until the
/// filesystem itself is closed — the same tradeoff the memory channel
/// handles make to avoid a back-reference into the filesystem from `Drop`.
pub struct DirectoryStream {
    pub(crate) dir_path: String,
    entries: std::vec::IntoIter<DirEntry>,
    closed: bool,
}

impl Iterator for DirectoryStream {
    type Item = DirEntry;
    fn next(&mut self) -> Option<DirEntry> {
        self.entries.next()
    }
}

/// The staged overlays (§3, §4.3). Each field is `None` when no edit of that
/// kind is pending (I1 is then syntactically true).
#[derive(Default)]
struct Overlays {
    insertions: Option<HashMap<String, (FileMode, GitOid)>>,
    inserted_dirs: Option<HashSet<String>>,
    deletions: Option<HashSet<String>>,
    deleted_dirs: Option<HashMap<String, usize>>,
}

/// The in-memory, POSIX-style filesystem layered over a content-addressed
/// object store (§3 Filesystem instance).
///
/// All public methods take `&mut self` — Rust's exclusive-borrow rule is the
/// mapping for the single filesystem-wide lock described in §5; callers who
/// need to share one filesystem across threads wrap it in their own `Mutex`.
/// The memory channel's *buffer lock* (§5) remains a real `std::sync::Mutex`
/// owned by each [`Channel`](crate::channel::Channel), since live
/// [`ByteChannelHandle`]s can outlive any single call into `Filesystem`.
pub struct Filesystem {
    store: Arc<dyn ObjectStore>,
    repo_label: String,
    branch_ref: Option<RefName>,
    base_commit: Option<GitOid>,
    base_tree: Option<GitOid>,
    cache: Option<DirCache>,
    channels: HashMap<String, Arc<Channel>>,
    dir_streams: DirStreamRegistry,
    closed: bool,
    overlays: Overlays,
    state: FsState,
    config: FsConfig,
}

impl Filesystem {
    /// Open a filesystem rooted at the tip of `branch_ref`, or detached at
    /// the empty tree if the ref does not yet exist.
    ///
    /// # Errors
    /// Propagates [`FsError::Io`] if the ref or its commit cannot be read.
    pub fn open(
        store: Arc<dyn ObjectStore>,
        repo_label: impl Into<String>,
        branch_ref: Option<RefName>,
        config: FsConfig,
    ) -> Result<Self, FsError> {
        let (base_commit, base_tree) = match &branch_ref {
            Some(name) => match store.read_ref(name)? {
                Some(commit_id) => {
                    let info = store.read_commit(commit_id)?;
                    (Some(commit_id), Some(info.tree_oid))
                }
                None => (None, None),
            },
            None => (None, None),
        };
        let state = config.initial_state;
        Ok(Self {
            store,
            repo_label: repo_label.into(),
            branch_ref,
            base_commit,
            base_tree,
            cache: None,
            channels: HashMap::new(),
            dir_streams: DirStreamRegistry::default(),
            closed: false,
            overlays: Overlays::default(),
            state,
            config,
        })
    }

    /// Open a filesystem directly at `tree_id`, detached from any branch.
    #[must_use]
    pub fn open_detached_at_tree(store: Arc<dyn ObjectStore>, repo_label: impl Into<String>, tree_id: GitOid, config: FsConfig) -> Self {
        let state = config.initial_state;
        Self {
            store,
            repo_label: repo_label.into(),
            branch_ref: None,
            base_commit: None,
            base_tree: Some(tree_id),
            cache: None,
            channels: HashMap::new(),
            dir_streams: DirStreamRegistry::default(),
            closed: false,
            overlays: Overlays::default(),
            state,
            config,
        }
    }

    // -----------------------------------------------------------------
    // Observable state
    // -----------------------------------------------------------------

    /// The current lifecycle tag. The core never transitions this itself.
    #[must_use]
    pub fn state(&self) -> FsState {
        self.state
    }

    /// Drive the lifecycle tag from outside orchestration.
    pub fn set_state(&mut self, state: FsState) {
        self.state = state;
    }

    /// `"attached"` if rooted at a branch ref, `"detached"` otherwise (§6).
    #[must_use]
    pub fn store_type(&self) -> &'static str {
        if self.branch_ref.is_some() {
            "attached"
        } else {
            "detached"
        }
    }

    /// `"<repo-dir>:<branch-or-empty>:<base-commit-hex-or-empty>:<base-tree-hex-or-empty>"` (§6).
    #[must_use]
    pub fn store_name(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.repo_label,
            self.branch_ref.as_ref().map(RefName::as_str).unwrap_or(""),
            self.base_commit.map(|c| c.to_string()).unwrap_or_default(),
            self.base_tree.map(|t| t.to_string()).unwrap_or_default(),
        )
    }

    /// Query a file-store attribute by name (§6): `totalSpace`, `usableSpace`,
    /// or `unallocatedSpace`.
    ///
    /// # Errors
    /// Returns [`FsError::UnsupportedOperation`] for any other name, or
    /// [`FsError::Io`] if the underlying query fails.
    pub fn store_attribute(&self, name: &str) -> Result<u64, FsError> {
        let attrs = self.store.store_attributes()?;
        match name {
            "totalSpace" => Ok(attrs.total_space),
            "usableSpace" => Ok(attrs.usable_space),
            "unallocatedSpace" => Ok(attrs.unallocated_space),
            other => Err(FsError::UnsupportedOperation {
                what: format!("file-store attribute '{other}'"),
            }),
        }
    }

    /// The current base tree id, if any edits or reads have resolved one.
    #[must_use]
    pub fn base_tree_oid(&self) -> Option<GitOid> {
        self.base_tree
    }

    /// The current base commit id, if rooted at a branch with history.
    #[must_use]
    pub fn base_commit_oid(&self) -> Option<GitOid> {
        self.base_commit
    }

    pub(crate) fn store_arc(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub(crate) fn config(&self) -> &FsConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<(), FsError> {
        if self.closed {
            return Err(FsError::ClosedFilesystem);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Cache lifecycle (§9 base-tree-vs-cache duality)
    // -----------------------------------------------------------------

    fn ensure_cache(&mut self) -> Result<(), FsError> {
        if self.cache.is_none() {
            let built = match self.base_tree {
                Some(tree) if !tree.is_zero() => DirCache::for_tree(self.store.as_ref(), tree)?,
                _ => DirCache::empty(),
            };
            self.cache = Some(built);
        }
        Ok(())
    }

    /// Resolve a path by walking the base tree directly, without allocating
    /// the cache. Used by read-only lookups before the first mutation.
    fn resolve_in_base_tree(&self, path: &str) -> Result<Option<(FileMode, GitOid)>, FsError> {
        let Some(tree) = self.base_tree else {
            return Ok(None);
        };
        if tree.is_zero() || path::is_root(path) {
            return Ok(None);
        }
        let mut current = tree;
        let segments: Vec<&str> = path.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            let Some(entry) = self.store.walk_tree(current, segment)? else {
                return Ok(None);
            };
            if i + 1 == segments.len() {
                return Ok(Some((FileMode::from_entry_mode(entry.mode), entry.oid)));
            }
            if entry.mode != gitfs_git::EntryMode::Tree {
                return Ok(None);
            }
            current = entry.oid;
        }
        Ok(None)
    }

    // -----------------------------------------------------------------
    // Overlay mechanics (§4.3)
    // -----------------------------------------------------------------

    fn stage_file_insertion(&mut self, path: &str, mode: FileMode, oid: GitOid) -> Result<(), FsError> {
        self.flush_deletions()?;
        self.ensure_cache()?;
        self.overlays
            .insertions
            .get_or_insert_with(HashMap::new)
            .insert(path.to_owned(), (mode, oid));
        let inserted_dirs = self.overlays.inserted_dirs.get_or_insert_with(HashSet::new);
        for ancestor in path::ancestors(path) {
            if !inserted_dirs.insert(ancestor.to_owned()) {
                break;
            }
        }
        Ok(())
    }

    fn stage_file_deletion(&mut self, path: &str) -> Result<(), FsError> {
        self.flush_insertions()?;
        self.ensure_cache()?;
        self.overlays
            .deletions
            .get_or_insert_with(HashSet::new)
            .insert(path.to_owned());
        let cache = self.cache.as_ref().expect("cache initialized above");
        let mut seeds = Vec::new();
        for ancestor in path::ancestors(path) {
            seeds.push((ancestor.to_owned(), cache.count_within(ancestor)));
        }
        let deleted_dirs = self.overlays.deleted_dirs.get_or_insert_with(HashMap::new);
        for (ancestor, seed) in seeds {
            let current = *deleted_dirs.entry(ancestor.clone()).or_insert(seed);
            let next = current.checked_sub(1).ok_or_else(|| FsError::IllegalState {
                message: format!("deletedDirs underflow at '{ancestor}'"),
            })?;
            deleted_dirs.insert(ancestor, next);
        }
        Ok(())
    }

    fn flush_insertions(&mut self) -> Result<(), FsError> {
        if let Some(insertions) = self.overlays.insertions.take() {
            self.ensure_cache()?;
            let cache = self.cache.as_mut().expect("cache initialized above");
            let mut builder = cache.builder();
            for (path, (mode, oid)) in insertions {
                builder.upsert(path, mode, oid);
            }
            *cache = builder.finish();
            self.overlays.inserted_dirs = None;
        }
        Ok(())
    }

    fn flush_deletions(&mut self) -> Result<(), FsError> {
        if let Some(deletions) = self.overlays.deletions.take() {
            self.ensure_cache()?;
            let cache = self.cache.as_mut().expect("cache initialized above");
            let mut editor = cache.editor();
            for path in deletions {
                editor.remove(path);
            }
            *cache = editor.finish();
            self.overlays.deleted_dirs = None;
        }
        Ok(())
    }

    fn flush_staged_changes(&mut self) -> Result<(), FsError> {
        self.flush_insertions()?;
        self.flush_deletions()?;
        Ok(())
    }

    fn gc_channel(&mut self, path: &str) {
        if let Some(channel) = self.channels.get(path) {
            if channel.attached_count() == 0 && !channel.is_modified() {
                self.channels.remove(path);
            }
        }
    }

    fn resolve_source_mode_oid(&self, path: &str) -> Result<(FileMode, GitOid), FsError> {
        if let Some(insertions) = &self.overlays.insertions {
            if let Some(&(mode, oid)) = insertions.get(path) {
                return Ok((mode, oid));
            }
        }
        if let Some(cache) = &self.cache {
            if let Some((mode, oid)) = cache.lookup(path) {
                return Ok((mode, oid));
            }
        } else if let Some(found) = self.resolve_in_base_tree(path)? {
            return Ok(found);
        }
        Err(FsError::NoSuchFile { path: path.to_owned() })
    }

    // -----------------------------------------------------------------
    // Public queries (§4.2)
    // -----------------------------------------------------------------

    /// Is `path` a regular or executable file?
    ///
    /// # Errors
    /// Propagates [`FsError::Io`] from a base-tree walk.
    pub fn is_regular_file(&self, path: &str) -> Result<bool, FsError> {
        if path::is_root(path) {
            return Ok(false);
        }
        if let Some(deletions) = &self.overlays.deletions {
            if deletions.contains(path) {
                return Ok(false);
            }
        }
        if let Some(insertions) = &self.overlays.insertions {
            if insertions.contains_key(path) {
                return Ok(true);
            }
        }
        if let Some(cache) = &self.cache {
            Ok(cache.file_exists(path))
        } else {
            Ok(matches!(self.resolve_in_base_tree(path)?, Some((mode, _)) if mode.is_blob()))
        }
    }

    /// Is `path` a directory (possibly the root)?
    ///
    /// # Errors
    /// Propagates [`FsError::Io`] from a base-tree walk.
    pub fn is_directory(&self, path: &str) -> Result<bool, FsError> {
        if path::is_root(path) {
            return Ok(true);
        }
        if let Some(deleted_dirs) = &self.overlays.deleted_dirs {
            if deleted_dirs.get(path) == Some(&0) {
                return Ok(false);
            }
        }
        if let Some(inserted_dirs) = &self.overlays.inserted_dirs {
            if inserted_dirs.contains(path) {
                return Ok(true);
            }
        }
        if let Some(cache) = &self.cache {
            Ok(cache.is_non_trivial_directory(path))
        } else {
            Ok(matches!(self.resolve_in_base_tree(path)?, Some((mode, _)) if mode.is_tree()))
        }
    }

    /// The object id of the regular/executable file at `path`.
    ///
    /// # Errors
    /// Returns [`FsError::NoSuchFile`] if `path` does not name a file.
    pub fn get_file_blob_id(&self, path: &str) -> Result<GitOid, FsError> {
        if let Some(insertions) = &self.overlays.insertions {
            if let Some(&(_, oid)) = insertions.get(path) {
                return Ok(oid);
            }
        }
        if self.is_directory(path)? {
            return Err(FsError::NoSuchFile { path: path.to_owned() });
        }
        self.resolve_source_mode_oid(path).map(|(_, oid)| oid)
    }

    /// The current size of the file at `path`, or zero for a directory.
    ///
    /// # Errors
    /// Returns [`FsError::NoSuchFile`] if `path` does not exist.
    pub fn get_file_size(&self, path: &str) -> Result<u64, FsError> {
        if path::is_root(path) {
            return Ok(0);
        }
        if self.is_directory(path)? {
            return Ok(0);
        }
        if let Some(channel) = self.channels.get(path) {
            return Ok(channel.len());
        }
        let oid = self.get_file_blob_id(path)?;
        Ok(self.store.read_blob_size(oid)?)
    }

    // -----------------------------------------------------------------
    // newByteChannel (§4.2)
    // -----------------------------------------------------------------

    /// Open (and optionally create) a byte-addressable channel at `path`.
    ///
    /// # Errors
    /// See §7 for the full taxonomy; most commonly [`FsError::NoSuchFile`],
    /// [`FsError::FileAlreadyExists`], or [`FsError::AccessDenied`].
    pub fn new_byte_channel(&mut self, path: &str, options: OpenOptions) -> Result<ByteChannelHandle, FsError> {
        self.ensure_open()?;
        if path::is_root(path) {
            return Err(FsError::AccessDenied {
                path: path.to_owned(),
                reason: "cannot open the root as a file".to_owned(),
            });
        }
        if options.wants_mutation() && self.dir_streams.blocks_mutation(path) {
            return Err(FsError::AccessDenied {
                path: path.to_owned(),
                reason: "an ancestor directory has an open iterator".to_owned(),
            });
        }

        let read_only = !options.wants_mutation();
        if read_only && self.cache.is_none() && !self.channels.contains_key(path) {
            let Some((mode, oid)) = self.resolve_in_base_tree(path)? else {
                return Err(FsError::NoSuchFile { path: path.to_owned() });
            };
            if mode.is_tree() {
                return Err(FsError::AccessDenied {
                    path: path.to_owned(),
                    reason: "cannot open a directory".to_owned(),
                });
            }
            let bytes = self.store.read_blob(oid)?;
            let channel = Channel::new(bytes);
            self.channels.insert(path.to_owned(), channel.clone());
            trace!(path, "new_byte_channel: read-only fast path");
            return Ok(ByteChannelHandle::new(channel, false));
        }

        self.gc_channel(path);
        if let Some(existing) = self.channels.get(path) {
            if options.create_new {
                return Err(FsError::FileAlreadyExists { path: path.to_owned() });
            }
            return Ok(ByteChannelHandle::new(existing.clone(), options.append));
        }

        if self.is_directory(path)? {
            return Err(FsError::AccessDenied {
                path: path.to_owned(),
                reason: "cannot open a directory".to_owned(),
            });
        }

        if !self.is_regular_file(path)? {
            if !options.create && !options.create_new {
                return Err(FsError::NoSuchFile { path: path.to_owned() });
            }
            self.stage_file_insertion(path, FileMode::RegularFile, GitOid::ZERO)?;
            let channel = Channel::new(Vec::new());
            self.channels.insert(path.to_owned(), channel.clone());
            debug!(path, "new_byte_channel: created");
            return Ok(ByteChannelHandle::new(channel, options.append));
        }

        if options.create_new {
            return Err(FsError::FileAlreadyExists { path: path.to_owned() });
        }

        let oid = self.get_file_blob_id(path)?;
        let bytes = if options.truncate { Vec::new() } else { self.store.read_blob(oid)? };
        let channel = Channel::new(bytes);
        if options.truncate {
            channel.mark_modified();
        }
        self.channels.insert(path.to_owned(), channel.clone());
        debug!(path, "new_byte_channel: opened existing");
        Ok(ByteChannelHandle::new(channel, options.append))
    }

    // -----------------------------------------------------------------
    // delete / copy / move (§4.2)
    // -----------------------------------------------------------------

    /// Remove the regular file at `path`.
    ///
    /// # Errors
    /// [`FsError::DirectoryNotEmpty`] if `path` is a directory,
    /// [`FsError::NoSuchFile`] if absent, [`FsError::AccessDenied`] if an
    /// open channel or directory stream forbids the mutation.
    pub fn delete(&mut self, path: &str) -> Result<(), FsError> {
        self.ensure_open()?;
        if path::is_root(path) {
            return Err(FsError::AccessDenied {
                path: path.to_owned(),
                reason: "cannot delete the root".to_owned(),
            });
        }
        if self.dir_streams.blocks_mutation(path) {
            return Err(FsError::AccessDenied {
                path: path.to_owned(),
                reason: "an ancestor directory has an open iterator".to_owned(),
            });
        }
        if self.is_directory(path)? {
            return Err(FsError::DirectoryNotEmpty { path: path.to_owned() });
        }
        if !self.is_regular_file(path)? {
            return Err(FsError::NoSuchFile { path: path.to_owned() });
        }
        self.gc_channel(path);
        if let Some(channel) = self.channels.get(path) {
            if channel.attached_count() > 0 {
                return Err(FsError::AccessDenied {
                    path: path.to_owned(),
                    reason: "file has an open channel".to_owned(),
                });
            }
            self.channels.remove(path);
        }
        self.stage_file_deletion(path)?;
        debug!(path, "delete");
        Ok(())
    }

    /// Copy `source` to `target`.
    ///
    /// # Errors
    /// [`FsError::NoSuchFile`] if `source` is missing,
    /// [`FsError::FileAlreadyExists`] if `target` exists and
    /// `replace_existing` is false, [`FsError::DirectoryNotEmpty`] if
    /// `target` is an existing directory.
    pub fn copy(&mut self, source: &str, target: &str, replace_existing: bool) -> Result<(), FsError> {
        self.ensure_open()?;
        if source == target {
            return Ok(());
        }
        if !self.is_regular_file(source)? {
            return Err(FsError::NoSuchFile { path: source.to_owned() });
        }
        if self.dir_streams.blocks_mutation(target) {
            return Err(FsError::AccessDenied {
                path: target.to_owned(),
                reason: "an ancestor directory has an open iterator".to_owned(),
            });
        }
        if self.is_directory(target)? {
            return Err(FsError::DirectoryNotEmpty { path: target.to_owned() });
        }
        if self.is_regular_file(target)? && !replace_existing {
            return Err(FsError::FileAlreadyExists { path: target.to_owned() });
        }
        self.gc_channel(target);
        if let Some(existing) = self.channels.get(target) {
            if existing.attached_count() > 0 {
                return Err(FsError::AccessDenied {
                    path: target.to_owned(),
                    reason: "target has an open channel".to_owned(),
                });
            }
        }
        self.channels.remove(target);

        if let Some(source_channel) = self.channels.get(source).cloned() {
            let bytes = source_channel.snapshot();
            let new_channel = Channel::new(bytes);
            if source_channel.is_modified() {
                new_channel.mark_modified();
            }
            self.stage_file_insertion(target, FileMode::RegularFile, GitOid::ZERO)?;
            self.channels.insert(target.to_owned(), new_channel);
        } else {
            let (mode, oid) = self.resolve_source_mode_oid(source)?;
            self.stage_file_insertion(target, mode, oid)?;
        }
        debug!(source, target, "copy");
        Ok(())
    }

    /// Move (rename) `source` to `target`. `source` may be a file or a
    /// directory.
    ///
    /// # Errors
    /// [`FsError::AccessDenied`] if `target` is inside `source`,
    /// [`FsError::NoSuchFile`] if `source` does not exist,
    /// [`FsError::DirectoryNotEmpty`]/[`FsError::FileAlreadyExists`] per the
    /// same rules as [`copy`](Self::copy).
    pub fn move_path(&mut self, source: &str, target: &str, replace_existing: bool) -> Result<(), FsError> {
        self.ensure_open()?;
        if source == target {
            return Ok(());
        }
        if path::is_strict_ancestor(source, target) {
            return Err(FsError::AccessDenied {
                path: target.to_owned(),
                reason: "move target lies inside move source".to_owned(),
            });
        }
        if self.dir_streams.blocks_mutation(source) || self.dir_streams.blocks_mutation(target) {
            return Err(FsError::AccessDenied {
                path: source.to_owned(),
                reason: "an ancestor directory has an open iterator".to_owned(),
            });
        }

        if self.is_regular_file(source)? {
            if self.is_directory(target)? {
                return Err(FsError::DirectoryNotEmpty { path: target.to_owned() });
            }
            if self.is_regular_file(target)? && !replace_existing {
                return Err(FsError::FileAlreadyExists { path: target.to_owned() });
            }
            self.gc_channel(target);
            if let Some(existing) = self.channels.get(target) {
                if existing.attached_count() > 0 {
                    return Err(FsError::AccessDenied {
                        path: target.to_owned(),
                        reason: "target has an open channel".to_owned(),
                    });
                }
            }
            self.channels.remove(target);
            if let Some(channel) = self.channels.remove(source) {
                self.stage_file_insertion(target, FileMode::RegularFile, GitOid::ZERO)?;
                self.channels.insert(target.to_owned(), channel);
            } else {
                let (mode, oid) = self.resolve_source_mode_oid(source)?;
                self.stage_file_insertion(target, mode, oid)?;
            }
            self.stage_file_deletion(source)?;
            debug!(source, target, "move (file)");
            return Ok(());
        }

        if self.is_directory(source)? {
            self.flush_staged_changes()?;
            self.ensure_cache()?;
            let cache = self.cache.as_ref().expect("cache initialized above");
            let entries: Vec<_> = cache.entries_within(source).into_iter().cloned().collect();
            for entry in &entries {
                let new_path = path::rebase(&entry.path, source, target).expect("entry is within source");
                if let Some(channel) = self.channels.remove(&entry.path) {
                    self.channels.insert(new_path.clone(), channel);
                }
                self.stage_file_insertion(&new_path, entry.mode, entry.oid)?;
            }
            for entry in &entries {
                self.stage_file_deletion(&entry.path)?;
            }
            debug!(source, target, "move (directory)");
            return Ok(());
        }

        Err(FsError::NoSuchFile { path: source.to_owned() })
    }

    // -----------------------------------------------------------------
    // newDirectoryStream (§4.2)
    // -----------------------------------------------------------------

    /// Open a snapshot iterator over `path`'s immediate children.
    ///
    /// # Errors
    /// Returns [`FsError::NotADirectory`] if `path` is not a directory.
    pub fn new_directory_stream(&mut self, path: &str, filter: Option<DirFilter>) -> Result<DirectoryStream, FsError> {
        self.ensure_open()?;
        if !self.is_directory(path)? {
            return Err(FsError::NotADirectory { path: path.to_owned() });
        }
        self.flush_staged_changes()?;
        self.ensure_cache()?;
        let cache = self.cache.as_ref().expect("cache initialized above");
        let mut entries: Vec<DirEntry> = cache
            .immediate_children(path)
            .into_iter()
            .map(|(name, mode)| DirEntry { name, mode })
            .collect();
        if let Some(filter) = filter {
            entries.retain(|e| filter(&e.name));
        }
        self.dir_streams.register(path);
        trace!(path, count = entries.len(), "new_directory_stream");
        Ok(DirectoryStream {
            dir_path: path.to_owned(),
            entries: entries.into_iter(),
            closed: false,
        })
    }

    /// Deregister `stream` from the directory-stream registry (I8). Idempotent.
    pub fn close_directory_stream(&mut self, stream: &mut DirectoryStream) {
        if !stream.closed {
            self.dir_streams.deregister(&stream.dir_path);
            stream.closed = true;
        }
    }

    // -----------------------------------------------------------------
    // Write-out (§4.2)
    // -----------------------------------------------------------------

    /// Flush staged edits and modified channels into a new tree, advancing
    /// the in-memory base tree. Returns `None` if nothing changed.
    ///
    /// # Errors
    /// Propagates [`FsError::Io`] from blob/tree writes.
    pub fn write_and_update_tree(&mut self) -> Result<Option<GitOid>, FsError> {
        self.ensure_open()?;
        if self.cache.is_none() && self.channels.is_empty() {
            return Ok(None);
        }
        self.flush_staged_changes()?;
        self.ensure_cache()?;

        let paths: Vec<String> = self.channels.keys().cloned().collect();
        for path in paths {
            let channel = self.channels.get(&path).expect("just listed").clone();
            if channel.is_modified() {
                let bytes = channel.snapshot();
                let oid = self.store.insert_blob(&bytes)?;
                let mode = self
                    .cache
                    .as_ref()
                    .expect("cache initialized above")
                    .lookup(&path)
                    .map_or(FileMode::RegularFile, |(mode, _)| mode);
                let cache = self.cache.as_mut().expect("cache initialized above");
                let mut builder = cache.builder();
                builder.upsert(path.clone(), mode, oid);
                *cache = builder.finish();
                channel.clear_modified();
            }
            if channel.attached_count() == 0 && !channel.is_modified() {
                self.channels.remove(&path);
            }
        }

        let tree_id = self.cache.as_ref().expect("cache initialized above").write_tree(self.store.as_ref())?;
        if Some(tree_id) == self.base_tree {
            trace!("write_and_update_tree: no-op");
            return Ok(None);
        }
        self.base_tree = Some(tree_id);
        debug!(tree = %tree_id, "write_and_update_tree");
        Ok(Some(tree_id))
    }

    /// [`write_and_update_tree`](Self::write_and_update_tree), then create a
    /// commit over the result and advance the branch reference. Returns
    /// `None` if there was nothing to commit.
    ///
    /// # Errors
    /// [`FsError::IllegalState`] if `amend` is set with no existing base
    /// commit; otherwise propagates [`FsError::Io`].
    pub fn write_and_update_commit(
        &mut self,
        author: &Identity,
        committer: &Identity,
        message: &str,
        amend: bool,
    ) -> Result<Option<GitOid>, FsError> {
        self.ensure_open()?;
        let Some(tree_id) = self.write_and_update_tree()? else {
            return Ok(None);
        };

        let parents = if amend {
            let base_commit = self.base_commit.ok_or_else(|| FsError::IllegalState {
                message: "amend requires an existing base commit".to_owned(),
            })?;
            self.store.read_commit_parents(base_commit)?
        } else {
            self.base_commit.into_iter().collect()
        };

        let commit_id = self.store.insert_commit(tree_id, &parents, author, committer, message)?;
        self.store.flush()?;

        if let Some(branch_ref) = self.branch_ref.clone() {
            match (amend, self.base_commit) {
                (true, Some(old_head)) => {
                    self.store.update_ref(&branch_ref, Some(old_head), commit_id, true, "commit (amend)")?;
                }
                (false, Some(old_head)) => {
                    self.store.update_ref(&branch_ref, Some(old_head), commit_id, false, "commit")?;
                }
                (false, None) => {
                    self.store.update_ref(&branch_ref, None, commit_id, false, "commit (initial)")?;
                }
                (true, None) => {
                    return Err(FsError::IllegalState {
                        message: "amend requires an existing base commit".to_owned(),
                    });
                }
            }
        }
        self.base_commit = Some(commit_id);
        debug!(commit = %commit_id, amend, "write_and_update_commit");
        Ok(Some(commit_id))
    }

    /// Idempotently close the filesystem: closes all channels regardless of
    /// modification, clears the directory-stream registry, drops the cache.
    /// All subsequent operations fail with [`FsError::ClosedFilesystem`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.channels.clear();
        self.dir_streams = DirStreamRegistry::default();
        self.cache = None;
        self.closed = true;
        debug!("close");
    }

    // -----------------------------------------------------------------
    // Low-level helpers used only by the merge engine — bypass per-edit
    // overlay bookkeeping since a merge applies many positions at once.
    // -----------------------------------------------------------------

    pub(crate) fn merge_remove(&mut self, path: &str) -> Result<(), FsError> {
        self.flush_staged_changes()?;
        self.ensure_cache()?;
        let cache = self.cache.as_mut().expect("cache initialized above");
        let mut editor = cache.editor();
        editor.remove(path.to_owned());
        *cache = editor.finish();
        self.cache.as_mut().expect("cache initialized above").delete_directory(path);
        self.channels.remove(path);
        Ok(())
    }

    pub(crate) fn merge_adopt_blob(&mut self, path: &str, mode: FileMode, oid: GitOid) -> Result<(), FsError> {
        self.merge_remove(path)?;
        let cache = self.cache.as_mut().expect("cache initialized above");
        let mut builder = cache.builder();
        builder.upsert(path.to_owned(), mode, oid);
        *cache = builder.finish();
        Ok(())
    }

    pub(crate) fn merge_adopt_subtree(&mut self, path: &str, tree_oid: GitOid) -> Result<(), FsError> {
        self.merge_remove(path)?;
        let sub = DirCache::for_tree(self.store.as_ref(), tree_oid)?;
        let leaves: Vec<_> = sub.entries_within("").into_iter().cloned().collect();
        let cache = self.cache.as_mut().expect("cache initialized above");
        let mut builder = cache.builder();
        for leaf in leaves {
            builder.upsert(path::join(path, &leaf.path), leaf.mode, leaf.oid);
        }
        *cache = builder.finish();
        Ok(())
    }

    pub(crate) fn merge_ensure_directory(&mut self, path: &str) -> Result<(), FsError> {
        self.ensure_cache()?;
        if self.cache.as_ref().expect("cache initialized above").lookup(path).is_some() {
            self.merge_remove(path)?;
        }
        Ok(())
    }
}
