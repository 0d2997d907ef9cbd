//! Property tests (P1–P7). Gated behind `--features proptests` since they're
//! slower and more exploratory than the scenario suite.

#![cfg(feature = "proptests")]

use std::io::Write;
use std::sync::Arc;

use gitfs::testing::InMemoryStore;
use gitfs::{FsConfig, MergeOutcome, ObjectStore, OpenOptions};
use gitfs_git::Identity;
use proptest::prelude::*;

fn identity() -> Identity {
    Identity::new("Prop", "prop@example.com")
}

fn store() -> Arc<dyn ObjectStore> {
    Arc::new(InMemoryStore::default())
}

fn path_strategy() -> impl Strategy<Value = String> {
    "[a-c]/[a-c]\\.txt|[a-c]\\.txt"
}

fn content_strategy() -> impl Strategy<Value = String> {
    "[a-z]{0,8}"
}

#[derive(Clone, Debug)]
enum Op {
    Write(String, String),
    Delete(String),
    Copy(String, String, bool),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (path_strategy(), content_strategy()).prop_map(|(p, c)| Op::Write(p, c)),
        path_strategy().prop_map(Op::Delete),
        (path_strategy(), path_strategy(), any::<bool>()).prop_map(|(s, t, r)| Op::Copy(s, t, r)),
    ]
}

fn apply_op(fs: &mut gitfs::Filesystem, op: &Op) {
    match op {
        Op::Write(path, content) => {
            if let Ok(mut handle) = fs.new_byte_channel(path, OpenOptions::new().write(true).create(true)) {
                let _ = handle.write_all(content.as_bytes());
                handle.close();
            }
        }
        Op::Delete(path) => {
            let _ = fs.delete(path);
        }
        Op::Copy(source, target, replace) => {
            let _ = fs.copy(source, target, *replace);
        }
    }
}

proptest! {
    /// P2: a path is never simultaneously a directory and a regular file.
    #[test]
    fn directory_and_file_are_exclusive(ops in prop::collection::vec(op_strategy(), 0..20), probe in path_strategy()) {
        let mut fs = gitfs::Filesystem::open(store(), "repo", None, FsConfig::builder()).unwrap();
        for op in &ops {
            apply_op(&mut fs, op);
        }
        let is_dir = fs.is_directory(&probe).unwrap();
        let is_file = fs.is_regular_file(&probe).unwrap();
        prop_assert!(!(is_dir && is_file));
    }

    /// P3: a freshly created path's committed content matches what was written.
    #[test]
    fn create_then_commit_round_trips_content(content in content_strategy()) {
        let st = store();
        let mut fs = gitfs::Filesystem::open(st.clone(), "repo", None, FsConfig::builder()).unwrap();
        let mut handle = fs.new_byte_channel("p.txt", OpenOptions::new().write(true).create(true)).unwrap();
        handle.write_all(content.as_bytes()).unwrap();
        handle.close();
        fs.write_and_update_tree().unwrap();
        let blob_id = fs.get_file_blob_id("p.txt").unwrap();
        let bytes = st.read_blob(blob_id).unwrap();
        prop_assert_eq!(bytes, content.into_bytes());
    }

    /// P4/P5: a create-then-delete round trip (net no-op) followed by
    /// write_and_update_tree returns None and leaves the base tree unchanged.
    #[test]
    fn net_no_op_round_trip_returns_none(content in content_strategy()) {
        let st = store();
        let mut fs = gitfs::Filesystem::open(st, "repo", None, FsConfig::builder()).unwrap();
        let mut handle = fs.new_byte_channel("q.txt", OpenOptions::new().write(true).create(true)).unwrap();
        handle.write_all(content.as_bytes()).unwrap();
        handle.close();
        let first = fs.write_and_update_tree().unwrap();
        prop_assert!(first.is_some());
        let before = fs.base_tree_oid();

        fs.delete("q.txt").unwrap();
        let mut handle = fs.new_byte_channel("q.txt", OpenOptions::new().write(true).create(true)).unwrap();
        handle.write_all(content.as_bytes()).unwrap();
        handle.close();
        let second = fs.write_and_update_tree().unwrap();
        prop_assert_eq!(second, None);
        prop_assert_eq!(fs.base_tree_oid(), before);

        // P5: a repeated call with no intervening edits is also a no-op.
        let third = fs.write_and_update_tree().unwrap();
        prop_assert_eq!(third, None);
    }

    /// P5: closing twice behaves the same as closing once.
    #[test]
    fn double_close_is_idempotent(ops in prop::collection::vec(op_strategy(), 0..10)) {
        let mut fs = gitfs::Filesystem::open(store(), "repo", None, FsConfig::builder()).unwrap();
        for op in &ops {
            apply_op(&mut fs, op);
        }
        fs.close();
        fs.close();
        let err = fs.delete("anything").unwrap_err();
        prop_assert!(matches!(err, gitfs::FsError::ClosedFilesystem));
    }

    /// P6: if ours hasn't diverged from base, merging theirs in yields exactly theirs.
    #[test]
    fn merge_adopts_theirs_when_ours_unchanged(content_a in content_strategy(), content_b in content_strategy()) {
        let st = store();
        let mut base_fs = gitfs::Filesystem::open(st.clone(), "repo", None, FsConfig::builder()).unwrap();
        let mut handle = base_fs.new_byte_channel("f.txt", OpenOptions::new().write(true).create(true)).unwrap();
        handle.write_all(content_a.as_bytes()).unwrap();
        handle.close();
        let base_tree = base_fs.write_and_update_tree().unwrap().unwrap();

        let mut ours_fs = gitfs::Filesystem::open_detached_at_tree(st.clone(), "repo", base_tree, FsConfig::builder());

        let mut theirs_fs = gitfs::Filesystem::open_detached_at_tree(st.clone(), "repo", base_tree, FsConfig::builder());
        let mut handle = theirs_fs.new_byte_channel("f.txt", OpenOptions::new().write(true).create(true)).unwrap();
        handle.write_all(content_b.as_bytes()).unwrap();
        handle.close();
        let theirs_tree = theirs_fs.write_and_update_tree().unwrap().unwrap();

        let outcome = gitfs::three_way_merge(&mut ours_fs, Some(base_tree), Some(theirs_tree)).unwrap();
        let tree_id = match outcome {
            MergeOutcome::Clean(id) => id,
            MergeOutcome::Conflicts(c) => panic!("expected a clean merge, got: {c:?}"),
        };
        prop_assert_eq!(tree_id, theirs_tree);
    }

    /// P7: merging identical inputs twice produces identical results, including
    /// conflict ordering.
    #[test]
    fn merge_is_deterministic(content_a in content_strategy(), content_b in content_strategy(), content_c in content_strategy()) {
        let st = store();
        let mut base_fs = gitfs::Filesystem::open(st.clone(), "repo", None, FsConfig::builder()).unwrap();
        let mut handle = base_fs.new_byte_channel("f.txt", OpenOptions::new().write(true).create(true)).unwrap();
        handle.write_all(content_a.as_bytes()).unwrap();
        handle.close();
        let base_tree = base_fs.write_and_update_tree().unwrap().unwrap();

        let mut theirs_fs = gitfs::Filesystem::open_detached_at_tree(st.clone(), "repo", base_tree, FsConfig::builder());
        let mut handle = theirs_fs.new_byte_channel("f.txt", OpenOptions::new().write(true).create(true)).unwrap();
        handle.write_all(content_c.as_bytes()).unwrap();
        handle.close();
        let theirs_tree = theirs_fs.write_and_update_tree().unwrap().unwrap();

        let run = |st: Arc<dyn ObjectStore>| {
            let mut ours_fs = gitfs::Filesystem::open_detached_at_tree(st, "repo", base_tree, FsConfig::builder());
            let mut handle = ours_fs.new_byte_channel("f.txt", OpenOptions::new().write(true).create(true)).unwrap();
            handle.write_all(content_b.as_bytes()).unwrap();
            handle.close();
            ours_fs.write_and_update_tree().unwrap();
            gitfs::three_way_merge(&mut ours_fs, Some(base_tree), Some(theirs_tree)).unwrap()
        };

        let first = run(st.clone());
        let second = run(st);
        match (first, second) {
            (MergeOutcome::Clean(a), MergeOutcome::Clean(b)) => prop_assert_eq!(a, b),
            (MergeOutcome::Conflicts(a), MergeOutcome::Conflicts(b)) => {
                prop_assert_eq!(a.len(), b.len());
                for (x, y) in a.iter().zip(b.iter()) {
                    prop_assert_eq!(x, y);
                }
            }
            _ => prop_assert!(false, "merge outcome kind differs across identical runs"),
        }
    }

    /// P1: after any op sequence, the filesystem still answers basic queries
    /// without error and the root stays a directory, never a file (a cheap
    /// proxy for the full invariant set, which is exercised individually by
    /// the targeted unit and scenario suites).
    #[test]
    fn invariants_hold_after_arbitrary_ops(ops in prop::collection::vec(op_strategy(), 0..20)) {
        let mut fs = gitfs::Filesystem::open(store(), "repo", None, FsConfig::builder()).unwrap();
        for op in &ops {
            apply_op(&mut fs, op);
        }
        prop_assert!(fs.is_directory("").unwrap());
        prop_assert!(!fs.is_regular_file("").unwrap());
        let _ = fs.write_and_update_tree().unwrap();
    }
}
