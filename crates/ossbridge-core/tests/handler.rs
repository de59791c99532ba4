//! End-to-end handler behavior against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ossbridge_core::path;
use ossbridge_core::{Entry, FsError, FsHandler, MemoryStore};

async fn seeded() -> (FsHandler, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.insert("a/", b"".to_vec()).await;
    store.insert("a/b.txt", b"0123456789".to_vec()).await;
    store.insert("a/c/", b"".to_vec()).await;
    store.insert("a/c/d.txt", b"deep".to_vec()).await;
    (FsHandler::new(store.clone()), store)
}

#[tokio::test]
async fn listing_a_directory_shows_files_and_subdirs() {
    let (fs, _) = seeded().await;
    let children = fs.list("/a").await.unwrap();
    let names: Vec<_> = children.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["b.txt", "c"]);

    assert!(!children[0].is_dir);
    assert_eq!(children[0].size, 10);

    // subdirectory synthesized from the common prefix
    assert!(children[1].is_dir);
    assert!(!children[1].hidden);
}

#[tokio::test]
async fn listing_the_root_works_without_prior_state() {
    let (fs, _) = seeded().await;
    let children = fs.list("/").await.unwrap();
    let names: Vec<_> = children.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a"]);
}

#[tokio::test]
async fn listing_an_empty_prefix_yields_nothing() {
    let (fs, _) = seeded().await;
    assert!(fs.list("/nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn read_serves_ranged_slices_of_the_snapshot() {
    let (fs, _) = seeded().await;
    fs.list("/a").await.unwrap();
    let reader = fs.open_read("/a/b.txt").await.unwrap();
    assert_eq!(reader.len(), 10);
    assert_eq!(reader.read_at(0, 4), b"0123");
    assert_eq!(reader.read_at(8, 100), b"89");
    assert!(reader.read_at(10, 4).is_empty());
}

#[tokio::test]
async fn read_does_not_refresh_the_tree() {
    let (fs, _) = seeded().await;
    // never listed, so the path is not in the cache
    let err = fs.open_read("/a/b.txt").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
}

#[tokio::test]
async fn reading_a_directory_is_invalid() {
    let (fs, _) = seeded().await;
    fs.list("/a").await.unwrap();
    let err = fs.open_read("/a/c").await.unwrap_err();
    assert!(matches!(err, FsError::InvalidOperation(_)));
}

#[tokio::test]
async fn every_write_uploads_the_whole_buffer() {
    let (fs, store) = seeded().await;
    fs.list("/a").await.unwrap();
    let writer = fs.open_write("/a/new.txt").await.unwrap();

    writer.write_at(0, b"hello").await.unwrap();
    assert!(store.contains("a/new.txt").await);

    // out-of-order chunk grows the buffer with a zero gap
    writer.write_at(8, b"world").await.unwrap();
    assert_eq!(writer.len().await, 13);
    fs.close_write(writer.path()).await;

    // read back through the adapter sees the full buffer
    fs.list("/a").await.unwrap();
    let reader = fs.open_read("/a/new.txt").await.unwrap();
    assert_eq!(reader.read_at(0, 5), b"hello");
    assert_eq!(reader.read_at(5, 3), &[0, 0, 0]);
    assert_eq!(reader.read_at(8, 5), b"world");
}

#[tokio::test]
async fn write_offsets_past_the_size_cap_are_rejected() {
    let (fs, store) = seeded().await;
    fs.list("/a").await.unwrap();
    let writer = fs.open_write("/a/big.txt").await.unwrap();

    // offset + len would wrap
    let err = writer.write_at(u64::MAX, b"x").await.unwrap_err();
    assert!(matches!(err, FsError::InvalidOperation(_)));

    // in range for the address space but over the cap
    let err = writer.write_at(1 << 40, b"x").await.unwrap_err();
    assert!(matches!(err, FsError::InvalidOperation(_)));

    // nothing was uploaded
    assert!(!store.contains("a/big.txt").await);
    fs.close_write(writer.path()).await;
}

#[tokio::test]
async fn open_write_entry_survives_a_concurrent_refresh() {
    let (fs, _) = seeded().await;
    fs.list("/a").await.unwrap();
    let writer = fs.open_write("/a/pending.txt").await.unwrap();

    // a listing replaces the tree wholesale, but the open write stays
    fs.list("/a").await.unwrap();
    assert!(fs.stat("/a/pending.txt").await.is_ok());

    writer.write_at(0, b"x").await.unwrap();
    fs.close_write(writer.path()).await;

    // once closed the entry is only as durable as the backend listing,
    // which now includes the uploaded object
    fs.list("/a").await.unwrap();
    assert!(fs.stat("/a/pending.txt").await.is_ok());
}

#[tokio::test]
async fn writing_needs_a_resolvable_directory_parent() {
    let (fs, _) = seeded().await;

    // parent not in the cache yet
    let err = fs.open_write("/a/x.txt").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));

    fs.list("/a").await.unwrap();

    // parent resolves to a file
    let err = fs.open_write("/a/b.txt/child").await.unwrap_err();
    assert!(matches!(err, FsError::InvalidOperation(_)));

    // the path itself resolves to a directory
    let err = fs.open_write("/a/c").await.unwrap_err();
    assert!(matches!(err, FsError::InvalidOperation(_)));

    // the root sentinel always resolves
    fs.open_write("/top.txt").await.unwrap();
}

#[tokio::test]
async fn rename_copies_then_deletes() {
    let (fs, store) = seeded().await;
    fs.rename("/a/b.txt", "/a/renamed.txt").await.unwrap();

    let keys = store.keys().await;
    assert!(keys.contains(&"a/renamed.txt".to_string()));
    assert!(!keys.contains(&"a/b.txt".to_string()));
    assert_eq!(
        store.get_data("a/renamed.txt").await,
        Some(b"0123456789".to_vec())
    );
}

#[tokio::test]
async fn rename_onto_an_existing_name_fails_and_keeps_the_source() {
    let (fs, store) = seeded().await;
    store.insert("a/taken.txt", b"t".to_vec()).await;

    let err = fs.rename("/a/b.txt", "/a/taken.txt").await.unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));

    let keys = store.keys().await;
    assert!(keys.contains(&"a/b.txt".to_string()));
    assert_eq!(store.get_data("a/taken.txt").await, Some(b"t".to_vec()));
}

#[tokio::test]
async fn renaming_a_directory_moves_only_its_marker() {
    let (fs, store) = seeded().await;
    fs.rename("/a/c", "/a/moved").await.unwrap();

    let keys = store.keys().await;
    assert!(keys.contains(&"a/moved/".to_string()));
    assert!(!keys.contains(&"a/c/".to_string()));
    // content under the old prefix stays where it was
    assert!(keys.contains(&"a/c/d.txt".to_string()));
}

#[tokio::test]
async fn rename_of_a_missing_source_is_not_found() {
    let (fs, _) = seeded().await;
    let err = fs.rename("/a/nope", "/a/other").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
}

#[tokio::test]
async fn remove_deletes_only_the_exact_key() {
    let (fs, store) = seeded().await;
    fs.remove("/a/c").await.unwrap();

    let keys = store.keys().await;
    assert!(!keys.contains(&"a/c/".to_string()));
    assert!(keys.contains(&"a/c/d.txt".to_string()));
}

#[tokio::test]
async fn mkdir_writes_a_marker_object() {
    let (fs, store) = seeded().await;
    fs.mkdir("/a/fresh").await.unwrap();
    assert!(store.contains("a/fresh/").await);

    let entry = fs.stat("/a/fresh").await.unwrap();
    assert!(entry.is_dir);
    assert_eq!(entry.size, 0);

    let err = fs.mkdir("/a/fresh").await.unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));
}

#[tokio::test]
async fn mkdir_needs_a_resolvable_directory_parent() {
    let (fs, _) = seeded().await;

    // a file key never lists under its own prefix, so the parent refresh
    // comes back empty
    let err = fs.mkdir("/a/b.txt/sub").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));

    // an open write pins its file entry through the refresh, so the
    // parent resolves but is not a directory
    fs.list("/a").await.unwrap();
    let writer = fs.open_write("/a/pinned.txt").await.unwrap();
    let err = fs.mkdir("/a/pinned.txt/sub").await.unwrap_err();
    assert!(matches!(err, FsError::InvalidOperation(_)));
    fs.close_write(writer.path()).await;
}

#[tokio::test]
async fn stat_refreshes_the_parent_first() {
    let (fs, store) = seeded().await;
    // no listing has happened, stat still finds the file
    let entry = fs.stat("/a/b.txt").await.unwrap();
    assert_eq!(entry.size, 10);

    store.insert("a/late.txt", b"zz".to_vec()).await;
    assert_eq!(fs.stat("/a/late.txt").await.unwrap().size, 2);
}

#[tokio::test]
async fn setstat_is_a_checked_noop() {
    let (fs, _) = seeded().await;
    fs.setstat("/a/b.txt").await.unwrap();
    let err = fs.setstat("/a/nope").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
}

#[tokio::test]
async fn symlinks_resolve_exactly_one_hop() {
    let (fs, _) = seeded().await;
    fs.list("/a").await.unwrap();
    {
        let mut state = fs.tree().lock().await;
        state.insert(
            "/a/ln".to_string(),
            Arc::new(Entry::symlink("ln", "/a/b.txt", Utc::now())),
        );
        state.insert(
            "/a/ln2".to_string(),
            Arc::new(Entry::symlink("ln2", "/a/ln", Utc::now())),
        );
    }

    let reader = fs.open_read("/a/ln").await.unwrap();
    assert_eq!(reader.read_at(0, 10), b"0123456789");

    // a second hop is not followed
    let err = fs.open_read("/a/ln2").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
}

#[tokio::test]
async fn readlink_resolves_exactly_one_hop() {
    let (fs, _) = seeded().await;
    fs.list("/a").await.unwrap();
    {
        // registered as open writes so the parent refresh keeps them
        let mut state = fs.tree().lock().await;
        for (path, target) in [
            ("/a/ln", "/a/b.txt"),
            ("/a/ln2", "/a/ln"),
            ("/a/dangling", "/a/nope"),
        ] {
            let entry = Arc::new(Entry::symlink(path::file_name(path), target, Utc::now()));
            state.insert(path.to_string(), Arc::clone(&entry));
            state.begin_write(path.to_string(), entry);
        }
    }

    assert_eq!(fs.readlink("/a/ln").await.unwrap(), "/a/b.txt");

    // a plain file is not a link
    let err = fs.readlink("/a/b.txt").await.unwrap_err();
    assert!(matches!(err, FsError::InvalidOperation(_)));

    // a missing target and a second link both fail the hop
    let err = fs.readlink("/a/dangling").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
    let err = fs.readlink("/a/ln2").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
}

#[tokio::test]
async fn symlink_creation_is_unsupported() {
    let (fs, _) = seeded().await;
    let err = fs.symlink("/a/b.txt", "/a/ln").await.unwrap_err();
    assert!(matches!(err, FsError::Protocol(_)));
}

#[tokio::test]
async fn admin_listing_is_keyed_by_path() {
    let (fs, _) = seeded().await;
    let records = fs.list_files("/a", false, None).await.unwrap();

    let paths: Vec<_> = records.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["/a", "/a/b.txt", "/a/c"]);

    // the prefix's own marker is flagged so consumers can skip it
    assert!(records["/a"].hide);
    assert!(!records["/a/b.txt"].hide);
    // no share requested, no urls
    assert!(records["/a/b.txt"].url.is_none());
}

#[tokio::test]
async fn admin_listing_with_share_signs_files_only() {
    let (fs, _) = seeded().await;
    let records = fs
        .list_files("/a", false, Some(Duration::from_secs(600)))
        .await
        .unwrap();

    assert_eq!(
        records["/a/b.txt"].url.as_deref(),
        Some("memory://a/b.txt?expires=600")
    );
    assert_eq!(records["/a/c"].url.as_deref(), Some("-"));
}

#[tokio::test]
async fn admin_recursive_listing_surfaces_deep_keys() {
    let (fs, _) = seeded().await;
    let records = fs.list_files("/a", true, None).await.unwrap();
    assert!(records.contains_key("/a/c/d.txt"));
}

#[tokio::test]
async fn admin_delete_without_recursion_keeps_deep_keys() {
    let (fs, store) = seeded().await;
    let deleted = fs.delete_files("/a", false).await.unwrap();

    // marker, file and the synthesized subdirectory marker
    assert_eq!(deleted, 3);
    assert_eq!(store.keys().await, vec!["a/c/d.txt".to_string()]);
}

#[tokio::test]
async fn admin_recursive_delete_empties_the_prefix() {
    let (fs, store) = seeded().await;
    let deleted = fs.delete_files("/a", true).await.unwrap();
    assert_eq!(deleted, 4);
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn admin_copy_reports_each_pair() {
    let (fs, store) = seeded().await;
    let report = fs
        .copy_objects(&[
            ("/a/b.txt".to_string(), "/a/copy.txt".to_string()),
            ("/a/missing".to_string(), "/a/never".to_string()),
        ])
        .await;

    assert_eq!(report.successes.len(), 1);
    assert_eq!(report.successes[0].path, "/a/b.txt");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "/a/missing");
    assert!(report.errors[0].msg.is_some());
    assert!(store.contains("a/copy.txt").await);
    assert!(!store.contains("a/never").await);
}

#[tokio::test]
async fn share_url_refuses_directories() {
    let (fs, _) = seeded().await;
    let url = fs
        .signed_url("/a/b.txt", Duration::from_secs(1200))
        .await
        .unwrap();
    assert_eq!(url, "memory://a/b.txt?expires=1200");

    let err = fs
        .signed_url("/a/c", Duration::from_secs(1200))
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::InvalidOperation(_)));
}
