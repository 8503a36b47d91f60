//! The object storage engine: the operations that create, read, and
//! mutate OCFL objects against a `Storage` backend. Everything here is
//! built on the capability traits (`Storage`, `ObjectLock`,
//! `InventoryCache`) so the same logic runs unchanged against the
//! filesystem or S3 backend.

use std::path::Path;
use std::rc::Rc;

use log::info;

use crate::cache::InventoryCache;
use crate::consts::{
    INVENTORY_FILE, MUTABLE_HEAD_EXT_DIR, MUTABLE_HEAD_REVISIONS_DIR, MUTABLE_HEAD_ROOT_INVENTORY_SIDECAR_PREFIX,
    OBJECT_NAMASTE_FILE_PREFIX,
};
use crate::db::ObjectDetailsStore;
use crate::digest::{DigestAlgorithm, FixityCheckStream, HexDigest};
use crate::error::{not_found, OcflError, Result};
use crate::inventory::Inventory;
use crate::layout::StorageLayout;
use crate::lock::ObjectLock;
use crate::paths;
use crate::retry;
use crate::storage::{Listing, Storage};
use crate::types::{ContentPath, InventoryPath, ObjectVersionDetails, SpecVersion, VersionNum, VersionRef};

/// Coordinates storage, locking, caching, and (optionally) an
/// object-details store behind the operations OCFL objects support.
pub struct ObjectStorageEngine {
    storage: Box<dyn Storage>,
    layout: StorageLayout,
    lock_manager: Box<dyn ObjectLock>,
    cache: Box<dyn InventoryCache>,
    details: Option<Box<dyn ObjectDetailsStore>>,
}

impl ObjectStorageEngine {
    pub fn new(
        storage: Box<dyn Storage>,
        layout: StorageLayout,
        lock_manager: Box<dyn ObjectLock>,
        cache: Box<dyn InventoryCache>,
    ) -> Self {
        Self {
            storage,
            layout,
            lock_manager,
            cache,
            details: None,
        }
    }

    pub fn with_details_store(mut self, details: Box<dyn ObjectDetailsStore>) -> Self {
        self.details = Some(details);
        self
    }

    fn object_root(&self, object_id: &str) -> String {
        self.layout.map_object_id(object_id)
    }

    /// True if an object root exists for `object_id` and carries an
    /// object namaste declaration.
    pub fn contains_object(&self, object_id: &str) -> Result<bool> {
        let root = self.object_root(object_id);
        for entry in self.storage.list_directory(&root)? {
            if let Listing::File(name) = &entry {
                if name.starts_with(OBJECT_NAMASTE_FILE_PREFIX) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Loads and parses an object's root inventory, consulting the
    /// cache first.
    pub fn load_inventory(&self, object_id: &str) -> Result<Rc<Inventory>> {
        if let Some(cached) = self.cache.get(object_id) {
            return Ok(cached);
        }

        let root = self.object_root(object_id);
        let inventory = self.read_inventory(&root, None).map_err(|e| match e {
            OcflError::NotFound(_) if self.contains_object(object_id).unwrap_or(false) => OcflError::Corrupt {
                object_id: object_id.to_string(),
                message: "Object root exists but its inventory was never promoted; a prior commit was likely interrupted"
                    .to_string(),
            },
            other => other,
        })?;

        if inventory.id != object_id {
            return Err(OcflError::Corrupt {
                object_id: object_id.to_string(),
                message: format!(
                    "Inventory id {} does not match expected id {}",
                    inventory.id, object_id
                ),
            });
        }

        let inventory = Rc::new(inventory);
        self.cache.put(object_id, inventory.clone());
        Ok(inventory)
    }

    /// Returns the raw bytes of an object's inventory, either the root
    /// inventory or a specific sealed version's own copy.
    pub fn get_inventory_bytes(&self, object_id: &str, version_num: Option<VersionNum>) -> Result<Vec<u8>> {
        let root = self.object_root(object_id);

        let path = match version_num {
            None => paths_join(&root, INVENTORY_FILE),
            Some(v) => paths_join(&paths_join(&root, &v.to_string()), INVENTORY_FILE),
        };

        let mut buf = Vec::new();
        self.storage.read(&path, &mut buf).map_err(|e| match e {
            OcflError::NotFound(_) => not_found(object_id, version_num),
            other => other,
        })?;
        Ok(buf)
    }

    /// Parses and fixity-checks an inventory (plus sidecar) at `dir`,
    /// which is either an object root (root inventory) or a version
    /// directory (that version's own copy).
    fn read_inventory(&self, object_root: &str, version_dir: Option<&str>) -> Result<Inventory> {
        let dir = version_dir.unwrap_or(object_root);
        let inventory_path = paths_join(dir, INVENTORY_FILE);

        let mut contents = Vec::new();
        self.storage.read(&inventory_path, &mut contents)?;

        let algorithm = peek_digest_algorithm(&contents)?;
        let expected = self.read_sidecar_digest(dir, algorithm)?;
        let actual = algorithm.hash_hex(&mut contents.as_slice())?;

        if actual != expected {
            return Err(OcflError::Corrupt {
                object_id: String::new(),
                message: format!(
                    "Inventory at {} does not match its sidecar digest",
                    inventory_path
                ),
            });
        }

        let mut inventory: Inventory = serde_json::from_slice(&contents)?;
        inventory.object_root = object_root.to_string();
        inventory.storage_path = object_root.to_string();
        Ok(inventory)
    }

    fn read_sidecar_digest(&self, dir: &str, algorithm: DigestAlgorithm) -> Result<HexDigest> {
        let sidecar_path = paths_join(dir, &format!("{}.{}", INVENTORY_FILE, algorithm));
        let contents = self.storage.read_to_string(&sidecar_path)?;
        let digest = contents.split_whitespace().next().ok_or_else(|| OcflError::Corrupt {
            object_id: String::new(),
            message: format!("Sidecar at {} is empty", sidecar_path),
        })?;
        Ok(HexDigest::from(digest))
    }

    /// Stores a new, immutable version. `staging_dir` is a local
    /// directory laid out as `<contentDirectory>/...` containing the
    /// new version's content; it is consumed (moved) on success.
    ///
    /// `expected_previous_digest` guards against a concurrent writer:
    /// it must match the current root inventory's digest, or the call
    /// fails `OutOfSync`. Pass `None` only for the first version.
    pub fn store_new_version(
        &self,
        new_inventory: &Inventory,
        staging_dir: &Path,
        expected_previous_digest: Option<&HexDigest>,
        upgrade_to: Option<SpecVersion>,
    ) -> Result<()> {
        let object_id = new_inventory.id.clone();
        let _guard = self.lock_manager.acquire(&object_id)?;
        let root = self.object_root(&object_id);

        if self.storage.directory_exists(&paths_join(&root, MUTABLE_HEAD_EXT_DIR))? {
            return Err(OcflError::StateError(format!(
                "Object {} has an active mutable HEAD; commit or purge it before storing a new version",
                object_id
            )));
        }

        self.install_version(&object_id, &root, new_inventory, staging_dir, expected_previous_digest, upgrade_to)
    }

    /// Moves staged content into place and promotes the inventory,
    /// with retry/backoff and rollback on failure. Shared by
    /// `store_new_version` and `commit_mutable_head`; the caller is
    /// responsible for holding the object lock and for checking
    /// whatever precondition governs which of those two callers it is.
    fn install_version(
        &self,
        object_id: &str,
        root: &str,
        new_inventory: &Inventory,
        staging_dir: &Path,
        expected_previous_digest: Option<&HexDigest>,
        upgrade_to: Option<SpecVersion>,
    ) -> Result<()> {
        let version_num = new_inventory.head;
        let is_first_version = version_num.number == 1;

        let version_dir = paths_join(root, &version_num.to_string());
        if self.storage.directory_exists(&version_dir)? {
            // The object lock serializes writers, so this can only mean a
            // previous attempt crashed here. For the first version that's
            // safely retryable: nothing else in the repository depends on
            // it yet until the root inventory is promoted below, so the
            // stale directory is discarded and recreated. Later versions
            // are left alone; retrying those stays `OutOfSync`.
            if is_first_version && !self.storage.file_exists(&paths_join(root, INVENTORY_FILE))? {
                self.storage.delete_directory(&version_dir)?;
            } else {
                return Err(OcflError::OutOfSync(format!(
                    "Version {} already exists for object {}",
                    version_num, object_id
                )));
            }
        }

        if is_first_version {
            self.storage.create_directories(root)?;
            let namaste = new_inventory_spec_version(new_inventory).object_namaste();
            self.storage
                .write(&paths_join(root, namaste.filename), namaste.content.as_bytes(), Some("text/plain"), false)?;
        }

        let move_result = self.storage.move_directory_into(staging_dir, &version_dir, false);
        if let Err(e) = move_result {
            return Err(match e {
                OcflError::AlreadyExists(_) => OcflError::OutOfSync(format!(
                    "A concurrent writer has already created version {} of object {}",
                    version_num, object_id
                )),
                other => other,
            });
        }

        let promote_result = self.promote_version(root, new_inventory, version_num, expected_previous_digest, is_first_version);

        if let Err(e) = promote_result {
            self.storage.delete_directory(&version_dir)?;
            if is_first_version {
                self.storage.delete_directory(root)?;
            } else if let Err(restore_err) = self.restore_root_from(root, version_num.previous()?) {
                return Err(OcflError::Corrupt {
                    object_id: object_id.to_string(),
                    message: format!(
                        "Failed to restore the root inventory after a failed commit: {}. Original error: {}",
                        restore_err, e
                    ),
                });
            }
            return Err(e);
        }

        if let Some(target) = upgrade_to {
            self.rewrite_root_namaste(root, target)?;
        }

        self.cache.invalidate(object_id);

        if let Some(details) = &self.details {
            self.record_details(details.as_ref(), new_inventory, version_num)?;
        }

        info!("Stored version {} of object {}", version_num, object_id);
        Ok(())
    }

    fn promote_version(
        &self,
        root: &str,
        inventory: &Inventory,
        version_num: VersionNum,
        expected_previous_digest: Option<&HexDigest>,
        is_first_version: bool,
    ) -> Result<()> {
        if !is_first_version {
            let expected = expected_previous_digest.ok_or_else(|| {
                OcflError::IllegalArgument(format!(
                    "An expected previous digest is required to commit version {} of object {}",
                    version_num, inventory.id
                ))
            })?;
            let current_digest = self.read_sidecar_digest(root, inventory.digest_algorithm)?;
            if &current_digest != expected {
                return Err(OcflError::OutOfSync(format!(
                    "The root inventory for object {} changed since it was last read",
                    inventory.id
                )));
            }
        }

        let version_dir = paths_join(root, &version_num.to_string());
        let sidecar_name = format!("{}.{}", INVENTORY_FILE, inventory.digest_algorithm);

        retry::with_backoff(&format!("promote inventory for {}", inventory.id), || {
            self.storage.copy_file_internal(&paths_join(&version_dir, INVENTORY_FILE), &paths_join(root, INVENTORY_FILE))?;
            self.storage
                .copy_file_internal(&paths_join(&version_dir, &sidecar_name), &paths_join(root, &sidecar_name))
        })
    }

    fn restore_root_from(&self, root: &str, version_num: VersionNum) -> Result<()> {
        let version_dir = paths_join(root, &version_num.to_string());
        let inventory = self.read_inventory(root, Some(version_dir.as_str()))?;
        let sidecar_name = format!("{}.{}", INVENTORY_FILE, inventory.digest_algorithm);

        self.storage
            .copy_file_internal(&paths_join(&version_dir, INVENTORY_FILE), &paths_join(root, INVENTORY_FILE))?;
        self.storage
            .copy_file_internal(&paths_join(&version_dir, &sidecar_name), &paths_join(root, &sidecar_name))
    }

    fn rewrite_root_namaste(&self, root: &str, target: SpecVersion) -> Result<()> {
        for candidate in [SpecVersion::Ocfl1_0, SpecVersion::Ocfl1_1] {
            if candidate != target {
                let _ = self.storage.delete_file(&paths_join(root, candidate.object_namaste().filename));
            }
        }
        let namaste = target.object_namaste();
        self.storage
            .write(&paths_join(root, namaste.filename), namaste.content.as_bytes(), Some("text/plain"), true)
    }

    fn record_details(&self, details: &dyn ObjectDetailsStore, inventory: &Inventory, version_num: VersionNum) -> Result<()> {
        let version = inventory.get_version(version_num)?;
        let row = ObjectVersionDetails {
            id: inventory.id.clone(),
            object_root: inventory.object_root.clone(),
            digest_algorithm: inventory.digest_algorithm,
            version_details: crate::types::VersionDetails::new(version_num, version),
        };

        let mut txn = details.begin()?;
        txn.record_version(&row)?;
        txn.commit()
    }

    /// Reconstructs a version's full logical state into `staging_dir`,
    /// verifying every file's fixity as it streams out.
    pub fn reconstruct_object_version(&self, inventory: &Inventory, version_num: VersionNum, staging_dir: &Path) -> Result<()> {
        let version = inventory.get_version(version_num)?;

        for (logical_path, digest) in version.state_iter() {
            let content_path = inventory.content_path_for_digest(digest, Some(version_num), Some(&**logical_path))?;
            let storage_path = paths_join(&inventory.object_root, content_path.as_str());

            let dest = staging_dir.join(logical_path.as_str());
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut raw = Vec::new();
            self.storage.read(&storage_path, &mut raw)?;

            let mut checked = FixityCheckStream::new(
                inventory.digest_algorithm,
                raw.as_slice(),
                inventory.id.clone(),
                logical_path.to_string(),
                (**digest).clone(),
            );

            let mut out = std::fs::File::create(&dest)?;
            std::io::copy(&mut checked, &mut out)?;
            checked.check_fixity()?;
        }

        Ok(())
    }

    /// Deletes an object entirely. A no-op if the object does not exist.
    pub fn purge_object(&self, object_id: &str) -> Result<()> {
        let _guard = self.lock_manager.acquire(object_id)?;
        let root = self.object_root(object_id);

        if !self.storage.directory_exists(&root)? {
            return Ok(());
        }

        self.storage.delete_directory(&root).map_err(|e| OcflError::Corrupt {
            object_id: object_id.to_string(),
            message: format!("Failed to fully delete object root: {}", e),
        })?;

        if let Some(parent) = parent_path(&root) {
            self.storage.delete_empty_dirs_up(parent)?;
        }

        self.cache.invalidate(object_id);
        if let Some(details) = &self.details {
            details.delete(object_id)?;
        }

        Ok(())
    }

    /// Deletes every version after `version_num`, making it the new
    /// head. The target version's own files are untouched. Refuses if
    /// the target version was recorded under a different digest
    /// algorithm than the current one, rather than silently re-digesting.
    pub fn rollback_to_version(&self, inventory: &Inventory, version_num: VersionNum) -> Result<()> {
        let _guard = self.lock_manager.acquire(&inventory.id)?;
        let root = &inventory.object_root;

        let target_version_dir = paths_join(root, &version_num.to_string());
        let target_inventory = self.read_inventory(root, Some(target_version_dir.as_str()))?;
        if target_inventory.digest_algorithm != inventory.digest_algorithm {
            return Err(OcflError::StateError(format!(
                "Cannot roll back object {} to version {}: it was recorded with digest algorithm {}, current is {}",
                inventory.id, version_num, target_inventory.digest_algorithm, inventory.digest_algorithm
            )));
        }

        let mut current = inventory.head;
        while current > version_num {
            let version_dir = paths_join(root, &current.to_string());
            self.storage.delete_directory(&version_dir).map_err(|e| OcflError::Corrupt {
                object_id: inventory.id.clone(),
                message: format!("Failed to remove version {} while rolling back: {}", current, e),
            })?;
            current = current.previous()?;
        }

        self.restore_root_from(root, version_num)?;
        self.cache.invalidate(&inventory.id);
        Ok(())
    }

    /// Stores a new mutable-HEAD revision. `staging_dir` contains the
    /// revision's own content under `<content_dir>/<revision>/...`,
    /// plus the updated `inventory.json`/sidecar at its root. Earlier
    /// revisions already under the extension are left alone; only this
    /// revision's content is moved in.
    pub fn store_mutable_head_revision(&self, inventory: &Inventory, revision: &str, staging_dir: &Path) -> Result<()> {
        let _guard = self.lock_manager.acquire(&inventory.id)?;
        let root = &inventory.object_root;
        let ext_dir = paths_join(root, MUTABLE_HEAD_EXT_DIR);
        let snapshot_name = format!("{}.{}", MUTABLE_HEAD_ROOT_INVENTORY_SIDECAR_PREFIX, inventory.digest_algorithm);

        if !self.storage.directory_exists(&ext_dir)? {
            let sidecar_name = format!("{}.{}", INVENTORY_FILE, inventory.digest_algorithm);
            self.storage.create_directories(&ext_dir)?;
            self.storage
                .copy_file_internal(&paths_join(root, &sidecar_name), &paths_join(&ext_dir, &snapshot_name))?;
        } else {
            let snapshot = self.storage.read_to_string(&paths_join(&ext_dir, &snapshot_name))?;
            let snapshot_digest = snapshot.split_whitespace().next().unwrap_or_default();
            let live = self.read_sidecar_digest(root, inventory.digest_algorithm)?;
            if snapshot_digest != live.as_ref() {
                return Err(OcflError::OutOfSync(format!(
                    "The root inventory for object {} changed while a mutable HEAD was active",
                    inventory.id
                )));
            }
        }

        let head_dir = paths_join(&ext_dir, "head");
        let revisions_dir = paths_join(root, MUTABLE_HEAD_REVISIONS_DIR);
        self.storage.create_directories(&revisions_dir)?;
        let marker_path = paths_join(&revisions_dir, revision);

        if let Err(e) = self.storage.write(&marker_path, revision.as_bytes(), None, false) {
            return Err(match e {
                OcflError::AlreadyExists(_) => OcflError::OutOfSync(format!(
                    "Revision {} was already recorded for object {}",
                    revision, inventory.id
                )),
                other => other,
            });
        }

        let result = self.install_head_revision_content(&head_dir, inventory, revision, staging_dir);
        if let Err(e) = result {
            let _ = self.storage.delete_file(&marker_path);
            return Err(e);
        }

        self.cache.invalidate(&inventory.id);
        Ok(())
    }

    /// Moves a staged revision's content into the mutable HEAD and
    /// deletes any files under its content tree no longer referenced
    /// by `inventory`'s manifest.
    ///
    /// The staging directory is expected to contain the revision's content under
    /// `<content_dir>/<revision>/...`, matching the path
    /// `Inventory::add_file_to_mutable_head_revision` records in the manifest. That
    /// subdirectory is moved in as a whole; earlier revisions already present under the
    /// extension live in sibling `<revision>` directories and are untouched.
    fn install_head_revision_content(
        &self,
        head_dir: &str,
        inventory: &Inventory,
        revision: &str,
        staging_dir: &Path,
    ) -> Result<()> {
        let content_dir = inventory.defaulted_content_dir();

        let staged_revision = staging_dir.join(content_dir).join(revision);
        if staged_revision.is_dir() {
            let dst = paths_join(&paths_join(head_dir, content_dir), revision);
            self.storage.move_directory_into(&staged_revision, &dst, false)?;
        }

        let inventory_dst = paths_join(head_dir, INVENTORY_FILE);
        self.storage
            .copy_file_into(&staging_dir.join(INVENTORY_FILE), &inventory_dst, Some("application/json"))?;

        let sidecar_name = format!("{}.{}", INVENTORY_FILE, inventory.digest_algorithm);
        self.storage.copy_file_into(
            &staging_dir.join(&sidecar_name),
            &paths_join(head_dir, &sidecar_name),
            Some("text/plain"),
        )?;

        self.delete_orphaned_head_content(head_dir, content_dir, inventory)
    }

    /// Deletes files under the mutable HEAD's content tree that the
    /// new manifest no longer references.
    fn delete_orphaned_head_content(&self, head_dir: &str, content_dir: &str, inventory: &Inventory) -> Result<()> {
        let content_root = paths_join(head_dir, content_dir);

        for entry in self.storage.list_recursive(&content_root)? {
            if let Listing::File(relative) = &entry {
                let content_path_str = format!("{}/head/{}/{}", MUTABLE_HEAD_EXT_DIR, content_dir, relative);
                let orphaned = match ContentPath::try_from(content_path_str.as_str()) {
                    Ok(content_path) => !inventory.contains_content_path(&content_path),
                    Err(_) => false,
                };
                if orphaned {
                    self.storage.delete_file(&paths_join(&content_root, relative))?;
                }
            }
        }

        Ok(())
    }

    /// Promotes the active mutable HEAD to a sealed `vN`, moving its
    /// content into place under the normal version directory.
    pub fn commit_mutable_head(&self, old_inventory: &Inventory, new_inventory: &Inventory, staging_dir: &Path) -> Result<()> {
        let object_id = old_inventory.id.clone();
        let _guard = self.lock_manager.acquire(&object_id)?;
        let root = &old_inventory.object_root;
        let ext_dir = paths_join(root, MUTABLE_HEAD_EXT_DIR);

        if !self.storage.directory_exists(&ext_dir)? {
            return Err(OcflError::StateError(format!(
                "Object {} does not have an active mutable HEAD to commit",
                object_id
            )));
        }

        let expected = self.read_sidecar_digest(root, old_inventory.digest_algorithm)?;
        self.install_version(&object_id, root, new_inventory, staging_dir, Some(&expected), None)?;

        self.storage.delete_directory(&ext_dir)?;
        self.cache.invalidate(&object_id);
        Ok(())
    }

    /// Discards the active mutable HEAD entirely, leaving the last
    /// sealed version as head. A no-op if there is none.
    pub fn purge_mutable_head(&self, object_id: &str) -> Result<()> {
        let _guard = self.lock_manager.acquire(object_id)?;
        let root = self.object_root(object_id);
        let ext_dir = paths_join(&root, MUTABLE_HEAD_EXT_DIR);

        if !self.storage.directory_exists(&ext_dir)? {
            return Ok(());
        }

        self.storage.delete_directory(&ext_dir).map_err(|e| OcflError::Corrupt {
            object_id: object_id.to_string(),
            message: format!("Failed to fully delete mutable HEAD: {}", e),
        })?;

        self.cache.invalidate(object_id);
        Ok(())
    }

    /// Exports a single sealed version's logical state to a local
    /// directory, verifying fixity as it streams.
    pub fn export_version(&self, object_id: &str, version_num: VersionNum, dst: &Path) -> Result<()> {
        let inventory = self.load_inventory(object_id)?;
        self.reconstruct_object_version(&inventory, version_num, dst)
    }

    /// Exports every sealed version's content directories and the root
    /// inventory, preserving the object's own on-disk layout.
    pub fn export_object(&self, object_id: &str, dst: &Path) -> Result<()> {
        let root = self.object_root(object_id);
        if !self.storage.directory_exists(&root)? {
            return Err(not_found(object_id, None));
        }
        self.storage.copy_directory_out_of(&root, dst)
    }

    /// Imports a complete, already-laid-out object directory tree from
    /// the local filesystem. `OutOfSync` if the object already exists.
    pub fn import_object(&self, object_id: &str, src: &Path) -> Result<()> {
        let _guard = self.lock_manager.acquire(object_id)?;
        let root = self.object_root(object_id);

        if self.storage.directory_exists(&root)? {
            return Err(OcflError::OutOfSync(format!(
                "Object {} already exists at {}",
                object_id, root
            )));
        }

        self.storage.move_directory_into(src, &root, false)?;
        self.cache.invalidate(object_id);
        Ok(())
    }

    /// Lazily, restartably lists every object id found in the storage
    /// root, parsing each object's root inventory to recover its id.
    pub fn list_object_ids<'a>(&'a self) -> Result<Box<dyn Iterator<Item = Result<String>> + 'a>> {
        let roots = self.storage.iterate_object_roots()?;
        let storage = self.storage.as_ref();

        Ok(Box::new(roots.map(move |root| {
            let root = root?;
            let mut contents = Vec::new();
            storage.read(&paths_join(&root, INVENTORY_FILE), &mut contents)?;
            let value: serde_json::Value = serde_json::from_slice(&contents)?;
            value
                .get("id")
                .and_then(|v| v.as_str())
                .map(|id| id.to_string())
                .ok_or_else(|| OcflError::Corrupt {
                    object_id: root.clone(),
                    message: "Inventory is missing its id field".to_string(),
                })
        })))
    }
}

fn paths_join(part1: &str, part2: &str) -> String {
    paths::join(part1, part2)
}

/// The parent of a `/`-joined storage path, or `None` if `path` has no
/// separator (an object root directly under the storage root).
fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn new_inventory_spec_version(inventory: &Inventory) -> SpecVersion {
    SpecVersion::try_from_inventory_type(&inventory.type_declaration).unwrap_or_default()
}

fn peek_digest_algorithm(contents: &[u8]) -> Result<DigestAlgorithm> {
    let value: serde_json::Value = serde_json::from_slice(contents)?;
    let name = value
        .get("digestAlgorithm")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OcflError::Corrupt {
            object_id: String::new(),
            message: "Inventory is missing its digestAlgorithm field".to_string(),
        })?;
    name.parse().map_err(|_| OcflError::Corrupt {
        object_id: String::new(),
        message: format!("Unknown digest algorithm: {}", name),
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::cache::NoopCache;
    use crate::layout::LayoutExtensionName;
    use crate::lock::FileLockManager;
    use crate::storage::fs::FsStorage;
    use crate::types::LogicalPath;

    fn engine(storage_root: &Path, locks_dir: &Path) -> ObjectStorageEngine {
        std::fs::create_dir_all(locks_dir).unwrap();
        ObjectStorageEngine::new(
            Box::new(FsStorage::new(storage_root)),
            StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap(),
            Box::new(FileLockManager::new(locks_dir)),
            Box::new(NoopCache),
        )
    }

    fn write_staged_v1(inventory: &mut Inventory, staging_dir: &Path, contents: &str) -> HexDigest {
        std::fs::create_dir_all(staging_dir.join("content")).unwrap();
        std::fs::write(staging_dir.join("content/file.txt"), contents).unwrap();
        let digest = inventory.digest_algorithm.hash_hex(&mut contents.as_bytes()).unwrap();
        inventory.add_file_to_head(digest.clone(), LogicalPath::try_from("file.txt").unwrap()).unwrap();
        digest
    }

    fn write_staged_inventory(staging_dir: &Path, inventory: &Inventory) {
        let bytes = serde_json::to_vec_pretty(inventory).unwrap();
        std::fs::write(staging_dir.join(INVENTORY_FILE), &bytes).unwrap();
        let digest = inventory.digest_algorithm.hash_hex(&mut bytes.as_slice()).unwrap();
        let sidecar = format!("{}.{}", INVENTORY_FILE, inventory.digest_algorithm);
        std::fs::write(staging_dir.join(sidecar), format!("{}  {}\n", digest, INVENTORY_FILE)).unwrap();
    }

    fn store_v1(engine: &ObjectStorageEngine, object_id: &str, contents: &str) -> Inventory {
        let mut inventory = Inventory::builder(object_id).build().unwrap();
        let staging = tempdir().unwrap();
        write_staged_v1(&mut inventory, staging.path(), contents);
        write_staged_inventory(staging.path(), &inventory);
        engine.store_new_version(&inventory, staging.path(), None, None).unwrap();
        engine.load_inventory(object_id).unwrap().as_ref().clone()
    }

    #[test]
    fn stores_first_version_and_loads_it_back() {
        let storage_root = tempdir().unwrap();
        let locks_dir = tempdir().unwrap();
        let engine = engine(storage_root.path(), locks_dir.path());

        store_v1(&engine, "test-object", "hello world");

        assert!(engine.contains_object("test-object").unwrap());
        let loaded = engine.load_inventory("test-object").unwrap();
        assert_eq!("test-object", loaded.id);
        assert_eq!(VersionNum::new(1), loaded.head);
    }

    #[test]
    fn contains_object_is_false_for_unknown_id() {
        let storage_root = tempdir().unwrap();
        let locks_dir = tempdir().unwrap();
        let engine = engine(storage_root.path(), locks_dir.path());

        assert!(!engine.contains_object("never-existed").unwrap());
    }

    #[test]
    fn reconstructs_version_with_fixity_check() {
        let storage_root = tempdir().unwrap();
        let locks_dir = tempdir().unwrap();
        let engine = engine(storage_root.path(), locks_dir.path());

        store_v1(&engine, "readable-object", "hello world");

        let inventory = engine.load_inventory("readable-object").unwrap();
        let dst = tempdir().unwrap();
        engine.export_version("readable-object", VersionNum::new(1), dst.path()).unwrap();

        let read_back = std::fs::read_to_string(dst.path().join("file.txt")).unwrap();
        assert_eq!("hello world", read_back);
        let _ = inventory;
    }

    #[test]
    fn second_version_requires_matching_previous_digest() {
        let storage_root = tempdir().unwrap();
        let locks_dir = tempdir().unwrap();
        let engine = engine(storage_root.path(), locks_dir.path());

        store_v1(&engine, "versioned-object", "v1 contents");
        let root_inventory = engine.load_inventory("versioned-object").unwrap();

        let mut v2 = root_inventory.as_ref().clone();
        v2.create_staging_head().unwrap();
        let staging = tempdir().unwrap();
        std::fs::create_dir_all(staging.path().join("content")).unwrap();
        std::fs::write(staging.path().join("content/other.txt"), "v2 contents").unwrap();
        let digest = v2.digest_algorithm.hash_hex(&mut "v2 contents".as_bytes()).unwrap();
        v2.add_file_to_head(digest, LogicalPath::try_from("other.txt").unwrap()).unwrap();
        write_staged_inventory(staging.path(), &v2);

        let stale_digest = HexDigest::from("0000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000");
        let result = engine.store_new_version(&v2, staging.path(), Some(&stale_digest), None);
        assert!(matches!(result, Err(OcflError::OutOfSync(_))));
    }

    #[test]
    fn purge_removes_object() {
        let storage_root = tempdir().unwrap();
        let locks_dir = tempdir().unwrap();
        let engine = engine(storage_root.path(), locks_dir.path());

        store_v1(&engine, "purge-me", "data");
        assert!(engine.contains_object("purge-me").unwrap());

        engine.purge_object("purge-me").unwrap();
        assert!(!engine.contains_object("purge-me").unwrap());
    }

    #[test]
    fn purge_missing_object_is_noop() {
        let storage_root = tempdir().unwrap();
        let locks_dir = tempdir().unwrap();
        let engine = engine(storage_root.path(), locks_dir.path());
        engine.purge_object("never-existed").unwrap();
    }

    #[test]
    fn list_object_ids_finds_stored_objects() {
        let storage_root = tempdir().unwrap();
        let locks_dir = tempdir().unwrap();
        let engine = engine(storage_root.path(), locks_dir.path());

        store_v1(&engine, "listed-one", "a");
        store_v1(&engine, "listed-two", "b");

        let mut ids: Vec<String> = engine.list_object_ids().unwrap().collect::<Result<Vec<_>>>().unwrap();
        ids.sort();
        assert_eq!(vec!["listed-one".to_string(), "listed-two".to_string()], ids);
    }

    #[test]
    fn purge_mutable_head_is_noop_without_one() {
        let storage_root = tempdir().unwrap();
        let locks_dir = tempdir().unwrap();
        let engine = engine(storage_root.path(), locks_dir.path());

        store_v1(&engine, "no-mutable-head", "data");
        engine.purge_mutable_head("no-mutable-head").unwrap();
        assert!(engine.contains_object("no-mutable-head").unwrap());
    }
}
