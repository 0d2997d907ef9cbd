use tempfile::TempDir;

use gitfs_git::{EntryMode, GitOid, GixStore, Identity, ObjectStore, RefName, TreeEntry};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn setup_repo() -> (TempDir, GixStore) {
    let dir = TempDir::new().unwrap();
    std::process::Command::new("git")
        .args(["init", dir.path().to_str().unwrap()])
        .output()
        .unwrap();
    std::process::Command::new("git")
        .args(["config", "user.email", "test@test.com"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    std::process::Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    let repo = GixStore::open(dir.path()).unwrap();
    (dir, repo)
}

fn identity() -> Identity {
    Identity::new("Test User", "test@test.com")
}

/// Create an initial commit with a single file so `refs/heads/main` exists.
/// Returns the commit OID and the tree OID.
fn setup_repo_with_commit() -> (TempDir, GixStore, GitOid, GitOid) {
    let (dir, repo) = setup_repo();
    let blob_oid = repo.insert_blob(b"hello world\n").unwrap();
    let tree_oid = repo
        .insert_tree(&[TreeEntry {
            name: "hello.txt".to_string(),
            mode: EntryMode::Blob,
            oid: blob_oid,
        }])
        .unwrap();
    let head_ref = RefName::new("refs/heads/main").unwrap();
    let commit_oid = repo
        .init_branch_head(&head_ref, tree_oid, &identity(), &identity(), "initial commit")
        .unwrap();
    (dir, repo, commit_oid, tree_oid)
}

// ===========================================================================
// 1. Object read/write
// ===========================================================================

#[test]
fn open_repo() {
    let (_dir, _repo) = setup_repo();
}

#[test]
fn blob_roundtrip() {
    let (_dir, repo) = setup_repo();
    let data = b"some blob content";
    let oid = repo.insert_blob(data).unwrap();
    let read_back = repo.read_blob(oid).unwrap();
    assert_eq!(read_back, data);
}

#[test]
fn blob_size() {
    let (_dir, repo) = setup_repo();
    let oid = repo.insert_blob(b"twelve bytes").unwrap();
    assert_eq!(repo.read_blob_size(oid).unwrap(), 12);
}

#[test]
fn tree_roundtrip() {
    let (_dir, repo) = setup_repo();
    let blob_oid = repo.insert_blob(b"content").unwrap();
    let entries = vec![TreeEntry {
        name: "file.txt".to_string(),
        mode: EntryMode::Blob,
        oid: blob_oid,
    }];
    let tree_oid = repo.insert_tree(&entries).unwrap();
    let read_back = repo.read_tree(tree_oid).unwrap();
    assert_eq!(read_back.len(), 1);
    assert_eq!(read_back[0].name, "file.txt");
    assert_eq!(read_back[0].mode, EntryMode::Blob);
    assert_eq!(read_back[0].oid, blob_oid);
}

#[test]
fn walk_tree_finds_entry() {
    let (_dir, repo) = setup_repo();
    let blob_oid = repo.insert_blob(b"content").unwrap();
    let tree_oid = repo
        .insert_tree(&[TreeEntry {
            name: "file.txt".to_string(),
            mode: EntryMode::Blob,
            oid: blob_oid,
        }])
        .unwrap();
    let found = repo.walk_tree(tree_oid, "file.txt").unwrap();
    assert_eq!(found.unwrap().oid, blob_oid);
    assert!(repo.walk_tree(tree_oid, "missing.txt").unwrap().is_none());
}

#[test]
fn commit_roundtrip() {
    let (_dir, repo, commit_oid, tree_oid) = setup_repo_with_commit();
    let info = repo.read_commit(commit_oid).unwrap();
    assert_eq!(info.tree_oid, tree_oid);
    assert!(info.parents.is_empty());
}

#[test]
fn write_tree_multiple_entries() {
    let (_dir, repo) = setup_repo();
    let b1 = repo.insert_blob(b"aaa").unwrap();
    let b2 = repo.insert_blob(b"bbb").unwrap();
    let entries = vec![
        TreeEntry {
            name: "a.txt".to_string(),
            mode: EntryMode::Blob,
            oid: b1,
        },
        TreeEntry {
            name: "b.txt".to_string(),
            mode: EntryMode::Blob,
            oid: b2,
        },
    ];
    let tree_oid = repo.insert_tree(&entries).unwrap();
    let read_back = repo.read_tree(tree_oid).unwrap();
    assert_eq!(read_back.len(), 2);
    let names: Vec<&str> = read_back.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"a.txt"));
    assert!(names.contains(&"b.txt"));
}

// ===========================================================================
// 2. Ref operations
// ===========================================================================

#[test]
fn write_read_ref_roundtrip() {
    let (_dir, repo, commit_oid, _) = setup_repo_with_commit();
    let refname = RefName::new("refs/heads/feature").unwrap();
    repo.update_ref(&refname, None, commit_oid, false, "create feature branch")
        .unwrap();
    let read_back = repo.read_ref(&refname).unwrap();
    assert_eq!(read_back, Some(commit_oid));
}

#[test]
fn read_ref_nonexistent() {
    let (_dir, repo) = setup_repo();
    let refname = RefName::new("refs/heads/nope").unwrap();
    let result = repo.read_ref(&refname).unwrap();
    assert_eq!(result, None);
}

#[test]
fn update_ref_cas_rejects_stale_expectation() {
    let (_dir, repo, commit_oid, _) = setup_repo_with_commit();
    let refname = RefName::new("refs/heads/cas-test").unwrap();
    repo.update_ref(&refname, None, commit_oid, false, "setup")
        .unwrap();

    let stale = GitOid::ZERO;
    let result = repo.update_ref(&refname, Some(stale), commit_oid, false, "should fail");
    assert!(result.is_err());
}

#[test]
fn reset_branch_head_forces_update() {
    let (_dir, repo, commit_oid, tree_oid) = setup_repo_with_commit();
    let refname = RefName::new("refs/heads/main").unwrap();
    let blob = repo.insert_blob(b"other").unwrap();
    let other_tree = repo
        .insert_tree(&[TreeEntry {
            name: "other.txt".to_string(),
            mode: EntryMode::Blob,
            oid: blob,
        }])
        .unwrap();
    let other_commit = repo
        .insert_commit(other_tree, &[], &identity(), &identity(), "unrelated")
        .unwrap();
    repo.reset_branch_head(&refname, other_commit).unwrap();
    assert_eq!(repo.read_ref(&refname).unwrap(), Some(other_commit));
    assert_ne!(other_commit, commit_oid);
    let _ = tree_oid;
}

// ===========================================================================
// 3. Branch-head convenience wrappers
// ===========================================================================

#[test]
fn commit_branch_head_advances_parent() {
    let (_dir, repo, first_commit, _) = setup_repo_with_commit();
    let refname = RefName::new("refs/heads/main").unwrap();
    let blob = repo.insert_blob(b"second").unwrap();
    let tree = repo
        .insert_tree(&[TreeEntry {
            name: "second.txt".to_string(),
            mode: EntryMode::Blob,
            oid: blob,
        }])
        .unwrap();
    let second_commit = repo
        .commit_branch_head(&refname, first_commit, tree, &identity(), &identity(), "second")
        .unwrap();
    let info = repo.read_commit(second_commit).unwrap();
    assert_eq!(info.parents, vec![first_commit]);
    assert_eq!(repo.read_ref(&refname).unwrap(), Some(second_commit));
}

#[test]
fn amend_branch_head_reuses_parents() {
    let (_dir, repo, first_commit, _) = setup_repo_with_commit();
    let refname = RefName::new("refs/heads/main").unwrap();
    let blob = repo.insert_blob(b"amended").unwrap();
    let tree = repo
        .insert_tree(&[TreeEntry {
            name: "hello.txt".to_string(),
            mode: EntryMode::Blob,
            oid: blob,
        }])
        .unwrap();
    let amended = repo
        .amend_branch_head(&refname, first_commit, tree, &identity(), &identity(), "amended")
        .unwrap();
    let info = repo.read_commit(amended).unwrap();
    assert!(info.parents.is_empty(), "amend should reuse the root commit's empty parent set");
    assert_eq!(repo.read_ref(&refname).unwrap(), Some(amended));
}

// ===========================================================================
// 4. Store attributes
// ===========================================================================

#[test]
fn store_attributes_reports_nonzero_total_space() {
    let (_dir, repo) = setup_repo();
    let attrs = repo.store_attributes().unwrap();
    assert!(attrs.total_space > 0);
}
