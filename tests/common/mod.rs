#![allow(dead_code)]

use std::convert::TryFrom;
use std::path::Path;

use ocfl_core::cache::NoopCache;
use ocfl_core::consts::INVENTORY_FILE;
use ocfl_core::engine::ObjectStorageEngine;
use ocfl_core::layout::{LayoutExtensionName, StorageLayout};
use ocfl_core::lock::FileLockManager;
use ocfl_core::storage::fs::FsStorage;
use ocfl_core::{Inventory, LogicalPath};

pub fn hashed_layout() -> StorageLayout {
    StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap()
}

/// Builds an engine backed by a brand new filesystem storage root and a
/// dedicated lock directory, both under `storage_root`/`locks_dir`.
pub fn engine(storage_root: &Path, locks_dir: &Path) -> ObjectStorageEngine {
    std::fs::create_dir_all(locks_dir).unwrap();
    ObjectStorageEngine::new(
        Box::new(FsStorage::new(storage_root)),
        hashed_layout(),
        Box::new(FileLockManager::new(locks_dir)),
        Box::new(NoopCache),
    )
}

pub fn logical(path: &str) -> LogicalPath {
    LogicalPath::try_from(path).unwrap()
}

/// Writes a single file under `staging_dir`'s content directory and
/// stages the corresponding manifest entry in `inventory`'s head version.
pub fn stage_file(inventory: &mut Inventory, staging_dir: &Path, logical_path: &str, contents: &str) {
    let content_dir = inventory.defaulted_content_dir().to_string();
    let dest = staging_dir.join(&content_dir).join(logical_path);
    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
    std::fs::write(&dest, contents).unwrap();

    let digest = inventory.digest_algorithm.hash_hex(&mut contents.as_bytes()).unwrap();
    inventory.add_file_to_head(digest, logical(logical_path)).unwrap();
}

/// Writes a single file under `staging_dir`'s content directory, namespaced by `revision`,
/// and stages the corresponding manifest entry as a mutable HEAD revision.
pub fn stage_revision_file(
    inventory: &mut Inventory,
    staging_dir: &Path,
    revision: &str,
    logical_path: &str,
    contents: &str,
) {
    let content_dir = inventory.defaulted_content_dir().to_string();
    let dest = staging_dir.join(&content_dir).join(revision).join(logical_path);
    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
    std::fs::write(&dest, contents).unwrap();

    let digest = inventory.digest_algorithm.hash_hex(&mut contents.as_bytes()).unwrap();
    inventory
        .add_file_to_mutable_head_revision(digest, logical(logical_path), revision)
        .unwrap();
}

/// Serializes `inventory` and its sidecar into `staging_dir`, as the
/// engine expects to find them alongside the staged content.
pub fn stage_inventory(staging_dir: &Path, inventory: &Inventory) {
    let bytes = serde_json::to_vec_pretty(inventory).unwrap();
    std::fs::write(staging_dir.join(INVENTORY_FILE), &bytes).unwrap();
    let digest = inventory.digest_algorithm.hash_hex(&mut bytes.as_slice()).unwrap();
    let sidecar = format!("{}.{}", INVENTORY_FILE, inventory.digest_algorithm);
    std::fs::write(staging_dir.join(sidecar), format!("{}  {}\n", digest, INVENTORY_FILE)).unwrap();
}
