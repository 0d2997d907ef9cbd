//! gix-backed object read/write operations.

use crate::error::StoreError;
use crate::gix_store::GixStore;
use crate::types::{CommitInfo, EntryMode, GitOid, Identity, TreeEntry};

/// Convert our `GitOid` to a `gix::ObjectId`.
fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

/// Convert a `gix::ObjectId` to our `GitOid`.
fn from_gix_oid(oid: gix::ObjectId) -> GitOid {
    let bytes: [u8; 20] = oid.as_bytes().try_into().expect("SHA1 is 20 bytes");
    GitOid::from_bytes(bytes)
}

/// Convert a gix `EntryMode` to our `EntryMode`.
fn from_gix_entry_mode(mode: gix::objs::tree::EntryMode) -> EntryMode {
    match mode.kind() {
        gix::objs::tree::EntryKind::Tree => EntryMode::Tree,
        gix::objs::tree::EntryKind::Blob => EntryMode::Blob,
        gix::objs::tree::EntryKind::BlobExecutable => EntryMode::BlobExecutable,
        gix::objs::tree::EntryKind::Link => EntryMode::Link,
        gix::objs::tree::EntryKind::Commit => EntryMode::Commit,
    }
}

/// Convert our `EntryMode` to a gix `EntryKind`.
fn to_gix_entry_kind(mode: EntryMode) -> gix::objs::tree::EntryKind {
    match mode {
        EntryMode::Blob => gix::objs::tree::EntryKind::Blob,
        EntryMode::BlobExecutable => gix::objs::tree::EntryKind::BlobExecutable,
        EntryMode::Tree => gix::objs::tree::EntryKind::Tree,
        EntryMode::Link => gix::objs::tree::EntryKind::Link,
        EntryMode::Commit => gix::objs::tree::EntryKind::Commit,
    }
}

pub fn read_blob(repo: &GixStore, oid: GitOid) -> Result<Vec<u8>, StoreError> {
    let gix_oid = to_gix_oid(oid);
    let mut blob = repo
        .repo
        .find_blob(gix_oid)
        .map_err(|e| StoreError::NotFound {
            message: format!("blob {oid}: {e}"),
        })?;
    Ok(blob.take_data())
}

pub fn read_blob_size(repo: &GixStore, oid: GitOid) -> Result<u64, StoreError> {
    let gix_oid = to_gix_oid(oid);
    let header = repo
        .repo
        .find_header(gix_oid)
        .map_err(|e| StoreError::NotFound {
            message: format!("blob {oid}: {e}"),
        })?;
    Ok(header.size())
}

pub fn read_tree(repo: &GixStore, oid: GitOid) -> Result<Vec<TreeEntry>, StoreError> {
    let gix_oid = to_gix_oid(oid);
    let tree = repo
        .repo
        .find_tree(gix_oid)
        .map_err(|e| StoreError::NotFound {
            message: format!("tree {oid}: {e}"),
        })?;

    let mut entries = Vec::new();
    for result in tree.iter() {
        let entry = result.map_err(|e| StoreError::BackendError {
            message: format!("failed to decode tree entry: {e}"),
        })?;
        let oid_bytes: [u8; 20] = entry
            .inner
            .oid
            .as_bytes()
            .try_into()
            .expect("SHA1 is 20 bytes");
        entries.push(TreeEntry {
            name: entry.inner.filename.to_string(),
            mode: from_gix_entry_mode(entry.inner.mode),
            oid: GitOid::from_bytes(oid_bytes),
        });
    }
    Ok(entries)
}

pub fn walk_tree(
    repo: &GixStore,
    tree_id: GitOid,
    name: &str,
) -> Result<Option<TreeEntry>, StoreError> {
    Ok(read_tree(repo, tree_id)?
        .into_iter()
        .find(|e| e.name == name))
}

pub fn read_commit(repo: &GixStore, oid: GitOid) -> Result<CommitInfo, StoreError> {
    let gix_oid = to_gix_oid(oid);
    let commit = repo
        .repo
        .find_commit(gix_oid)
        .map_err(|e| StoreError::NotFound {
            message: format!("commit {oid}: {e}"),
        })?;

    let decoded = commit.decode().map_err(|e| StoreError::BackendError {
        message: format!("failed to decode commit {oid}: {e}"),
    })?;

    let tree_oid = from_gix_oid(decoded.tree());
    let parents = decoded.parents().map(from_gix_oid).collect();

    Ok(CommitInfo { tree_oid, parents })
}

pub fn insert_blob(repo: &GixStore, data: &[u8]) -> Result<GitOid, StoreError> {
    let id = repo
        .repo
        .write_blob(data)
        .map_err(|e| StoreError::BackendError {
            message: format!("failed to write blob: {e}"),
        })?;
    Ok(from_gix_oid(id.detach()))
}

pub fn insert_tree(repo: &GixStore, entries: &[TreeEntry]) -> Result<GitOid, StoreError> {
    let tree = gix::objs::Tree {
        entries: entries
            .iter()
            .map(|e| gix::objs::tree::Entry {
                mode: to_gix_entry_kind(e.mode).into(),
                filename: e.name.as_str().into(),
                oid: to_gix_oid(e.oid),
            })
            .collect(),
    };
    let id = repo
        .repo
        .write_object(&tree)
        .map_err(|e| StoreError::BackendError {
            message: format!("failed to write tree: {e}"),
        })?;
    Ok(from_gix_oid(id.detach()))
}

pub fn insert_commit(
    repo: &GixStore,
    tree: GitOid,
    parents: &[GitOid],
    author: &Identity,
    committer: &Identity,
    message: &str,
) -> Result<GitOid, StoreError> {
    let tree_oid = to_gix_oid(tree);
    let parent_oids: Vec<gix::ObjectId> = parents.iter().map(|p| to_gix_oid(*p)).collect();

    let now = gix::date::Time::now_local_or_utc();
    let author_sig = gix::actor::Signature {
        name: author.name.as_str().into(),
        email: author.email.as_str().into(),
        time: now,
    };
    let committer_sig = gix::actor::Signature {
        name: committer.name.as_str().into(),
        email: committer.email.as_str().into(),
        time: now,
    };

    let commit = gix::objs::Commit {
        message: message.into(),
        tree: tree_oid,
        author: author_sig,
        committer: committer_sig,
        encoding: None,
        parents: parent_oids.into_iter().collect(),
        extra_headers: Vec::new(),
    };
    let id = repo
        .repo
        .write_object(&commit)
        .map_err(|e| StoreError::BackendError {
            message: format!("failed to write commit object: {e}"),
        })?;
    Ok(from_gix_oid(id.detach()))
}
