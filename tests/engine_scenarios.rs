//! End-to-end coverage of the object storage engine against a real
//! filesystem backend: a v1/v2 lifecycle with dedup, a mutable HEAD
//! staged across three revisions and committed, recovery from a
//! crash between the content move and inventory promotion, purge,
//! and rollback.

mod common;

use tempfile::tempdir;

use common::{engine, hashed_layout, logical, stage_file, stage_inventory, stage_revision_file};
use ocfl_core::init::init_repository;
use ocfl_core::storage::fs::FsStorage;
use ocfl_core::storage::Storage;
use ocfl_core::{Inventory, OcflError, SpecVersion, VersionNum};

/// Digest of the root inventory currently on disk, read through the engine rather than the
/// filesystem directly since `Inventory::storage_path` is storage-root-relative, not a local
/// filesystem path.
fn root_inventory_digest(engine: &ocfl_core::engine::ObjectStorageEngine, object_id: &str, inventory: &Inventory) -> ocfl_core::digest::HexDigest {
    let bytes = engine.get_inventory_bytes(object_id, None).unwrap();
    inventory.digest_algorithm.hash_hex(&mut bytes.as_slice()).unwrap()
}

#[test]
fn stores_v1_with_deduplicated_content_under_the_configured_layout() {
    let storage_root = tempdir().unwrap();
    let locks_dir = tempdir().unwrap();
    let layout = hashed_layout();

    init_repository(&FsStorage::new(storage_root.path()), SpecVersion::Ocfl1_1, Some(&layout)).unwrap();
    let engine = engine(storage_root.path(), locks_dir.path());

    let mut inventory = Inventory::builder("o1").build().unwrap();
    let staging = tempdir().unwrap();
    let content_dir = inventory.defaulted_content_dir().to_string();

    let contents = "the same bytes twice";
    let digest = inventory.digest_algorithm.hash_hex(&mut contents.as_bytes()).unwrap();
    std::fs::create_dir_all(staging.path().join(&content_dir)).unwrap();
    std::fs::write(staging.path().join(&content_dir).join("a.txt"), contents).unwrap();
    inventory.add_file_to_head(digest.clone(), logical("a.txt")).unwrap();
    inventory.add_file_to_head(digest.clone(), logical("b.txt")).unwrap();

    // Both logical paths point at the same digest; dedup collapses
    // them down to the one physical copy staged above.
    let removed = inventory.dedup_head();
    assert_eq!(1, removed.len());

    stage_inventory(staging.path(), &inventory);
    engine.store_new_version(&inventory, staging.path(), None, None).unwrap();

    let loaded = engine.load_inventory("o1").unwrap();
    let expected_root = layout.map_object_id("o1");
    assert!(loaded.object_root.ends_with(&expected_root));

    let v1 = loaded.get_version(VersionNum::new(1)).unwrap();
    assert_eq!(&digest, v1.lookup_digest(&logical("a.txt")).unwrap().as_ref());
    assert_eq!(&digest, v1.lookup_digest(&logical("b.txt")).unwrap().as_ref());

    let content_path = loaded
        .content_path_for_digest(&digest, Some(VersionNum::new(1)), None)
        .unwrap()
        .clone();
    assert!(loaded.contains_content_path(&content_path));
}

#[test]
fn stores_v2_overwriting_a_logical_path() {
    let storage_root = tempdir().unwrap();
    let locks_dir = tempdir().unwrap();
    let engine = engine(storage_root.path(), locks_dir.path());

    let mut v1 = Inventory::builder("o1").build().unwrap();
    let staging1 = tempdir().unwrap();
    stage_file(&mut v1, staging1.path(), "readme.txt", "version one");
    stage_inventory(staging1.path(), &v1);
    engine.store_new_version(&v1, staging1.path(), None, None).unwrap();

    let root_v1 = engine.load_inventory("o1").unwrap();
    let previous_digest = root_inventory_digest(&engine, "o1", &root_v1);

    let mut v2 = root_v1.as_ref().clone();
    v2.create_staging_head().unwrap();
    let staging2 = tempdir().unwrap();
    stage_file(&mut v2, staging2.path(), "readme.txt", "version two");
    stage_inventory(staging2.path(), &v2);
    engine.store_new_version(&v2, staging2.path(), Some(&previous_digest), None).unwrap();

    let loaded = engine.load_inventory("o1").unwrap();
    assert_eq!(VersionNum::new(2), loaded.head);
    let state = loaded.get_version(VersionNum::new(2)).unwrap();
    let digest = state.lookup_digest(&logical("readme.txt")).unwrap();

    let dst = tempdir().unwrap();
    engine.export_version("o1", VersionNum::new(2), dst.path()).unwrap();
    assert_eq!("version two", std::fs::read_to_string(dst.path().join("readme.txt")).unwrap());
    let _ = digest;
}

#[test]
fn mutable_head_stages_three_revisions_and_commits() {
    let storage_root = tempdir().unwrap();
    let locks_dir = tempdir().unwrap();
    let engine = engine(storage_root.path(), locks_dir.path());

    let mut v1 = Inventory::builder("mutable-object").build().unwrap();
    let staging1 = tempdir().unwrap();
    stage_file(&mut v1, staging1.path(), "a.txt", "original");
    stage_inventory(staging1.path(), &v1);
    engine.store_new_version(&v1, staging1.path(), None, None).unwrap();

    let root_inventory = engine.load_inventory("mutable-object").unwrap();

    let mut head = root_inventory.as_ref().clone();
    head.create_staging_head().unwrap();
    for (i, rev) in ["r1", "r2", "r3"].iter().enumerate() {
        let staging = tempdir().unwrap();
        let path = format!("revision-{}.txt", i + 1);
        stage_revision_file(&mut head, staging.path(), rev, &path, rev);
        stage_inventory(staging.path(), &head);
        engine.store_mutable_head_revision(&head, rev, staging.path()).unwrap();
    }

    // Content staged across the three revisions lives under the extension's content
    // directory, namespaced by revision; promoting rewrites the manifest to point at it
    // under the real `vN` it's about to become, and the commit staging directory mirrors
    // that same `content/<revision>/...` layout so the generic version-install move lands
    // it in the right place.
    head.promote_mutable_head();

    let commit_staging = tempdir().unwrap();
    let content_dir = head.defaulted_content_dir().to_string();
    for (i, rev) in ["r1", "r2", "r3"].iter().enumerate() {
        let path = format!("revision-{}.txt", i + 1);
        let dest = commit_staging.path().join(&content_dir).join(rev).join(&path);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(dest, rev).unwrap();
    }
    stage_inventory(commit_staging.path(), &head);

    engine.commit_mutable_head(&root_inventory, &head, commit_staging.path()).unwrap();

    let committed = engine.load_inventory("mutable-object").unwrap();
    assert_eq!(VersionNum::new(2), committed.head);

    // v1's own content is untouched and still passes fixity.
    let v1_dst = tempdir().unwrap();
    engine.export_version("mutable-object", VersionNum::new(1), v1_dst.path()).unwrap();
    assert_eq!("original", std::fs::read_to_string(v1_dst.path().join("a.txt")).unwrap());

    let v2_dst = tempdir().unwrap();
    engine.export_version("mutable-object", VersionNum::new(2), v2_dst.path()).unwrap();
    assert_eq!("r1", std::fs::read_to_string(v2_dst.path().join("revision-1.txt")).unwrap());
    assert_eq!("r3", std::fs::read_to_string(v2_dst.path().join("revision-3.txt")).unwrap());
}

#[test]
fn recovers_from_a_crash_between_the_content_move_and_promotion() {
    let storage_root = tempdir().unwrap();
    let locks_dir = tempdir().unwrap();
    let raw_storage = FsStorage::new(storage_root.path());
    let layout = hashed_layout();
    let root = layout.map_object_id("crash-me");

    let mut inventory = Inventory::builder("crash-me").build().unwrap();
    let staging = tempdir().unwrap();
    stage_file(&mut inventory, staging.path(), "file.txt", "before the crash");
    stage_inventory(staging.path(), &inventory);

    // Replicate everything a first-version commit does up to, but not
    // including, promoting the root inventory.
    raw_storage.create_directories(&root).unwrap();
    let namaste = SpecVersion::Ocfl1_1.object_namaste();
    raw_storage
        .write(
            &ocfl_core::paths::join(&root, namaste.filename),
            namaste.content.as_bytes(),
            Some("text/plain"),
            false,
        )
        .unwrap();
    raw_storage
        .move_directory_into(staging.path(), &ocfl_core::paths::join(&root, "v1"), false)
        .unwrap();

    let engine = engine(storage_root.path(), locks_dir.path());
    assert!(engine.contains_object("crash-me").unwrap());
    assert!(matches!(engine.load_inventory("crash-me"), Err(OcflError::Corrupt { .. })));

    let mut retry = Inventory::builder("crash-me").build().unwrap();
    let retry_staging = tempdir().unwrap();
    stage_file(&mut retry, retry_staging.path(), "file.txt", "before the crash");
    stage_inventory(retry_staging.path(), &retry);
    engine.store_new_version(&retry, retry_staging.path(), None, None).unwrap();

    let loaded = engine.load_inventory("crash-me").unwrap();
    assert_eq!(VersionNum::new(1), loaded.head);
    let dst = tempdir().unwrap();
    engine.export_version("crash-me", VersionNum::new(1), dst.path()).unwrap();
    assert_eq!("before the crash", std::fs::read_to_string(dst.path().join("file.txt")).unwrap());
}

#[test]
fn purge_object_removes_it_entirely() {
    let storage_root = tempdir().unwrap();
    let locks_dir = tempdir().unwrap();
    let engine = engine(storage_root.path(), locks_dir.path());

    let mut inventory = Inventory::builder("o1").build().unwrap();
    let staging = tempdir().unwrap();
    stage_file(&mut inventory, staging.path(), "a.txt", "data");
    stage_inventory(staging.path(), &inventory);
    engine.store_new_version(&inventory, staging.path(), None, None).unwrap();
    assert!(engine.contains_object("o1").unwrap());

    engine.purge_object("o1").unwrap();

    assert!(!engine.contains_object("o1").unwrap());
    assert!(matches!(engine.load_inventory("o1"), Err(OcflError::NotFound(_))));

    // Idempotent: purging again is a no-op, not an error.
    engine.purge_object("o1").unwrap();
}

#[test]
fn rolls_back_an_object_at_v4_to_v2() {
    let storage_root = tempdir().unwrap();
    let locks_dir = tempdir().unwrap();
    let engine = engine(storage_root.path(), locks_dir.path());

    let mut inventory = Inventory::builder("o2").build().unwrap();
    let staging = tempdir().unwrap();
    stage_file(&mut inventory, staging.path(), "v1.txt", "v1");
    stage_inventory(staging.path(), &inventory);
    engine.store_new_version(&inventory, staging.path(), None, None).unwrap();

    for n in 2..=4 {
        let previous = engine.load_inventory("o2").unwrap();
        let previous_digest = root_inventory_digest(&engine, "o2", &previous);

        let mut next = previous.as_ref().clone();
        next.create_staging_head().unwrap();
        let staging = tempdir().unwrap();
        stage_file(&mut next, staging.path(), &format!("v{}.txt", n), "contents");
        stage_inventory(staging.path(), &next);
        engine.store_new_version(&next, staging.path(), Some(&previous_digest), None).unwrap();
    }

    let at_v4 = engine.load_inventory("o2").unwrap();
    assert_eq!(VersionNum::new(4), at_v4.head);

    engine.rollback_to_version(&at_v4, VersionNum::new(2)).unwrap();

    let rolled_back = engine.load_inventory("o2").unwrap();
    assert_eq!(VersionNum::new(2), rolled_back.head);

    let dst = tempdir().unwrap();
    engine.export_version("o2", VersionNum::new(2), dst.path()).unwrap();
    assert!(dst.path().join("v1.txt").exists());
    assert!(dst.path().join("v2.txt").exists());
    assert!(!dst.path().join("v3.txt").exists());
}
