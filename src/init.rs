//! Storage root initialization and verification: the namaste
//! declaration, the OCFL spec text, and the optional layout extension
//! declaration/config a storage root carries at its top level.

use crate::consts::{EXTENSIONS_DIR, EXTENSIONS_CONFIG_FILE, INVENTORY_FILE, OCFL_LAYOUT_FILE, REPO_NAMASTE_FILE_PREFIX};
use crate::error::{OcflError, Result};
use crate::layout::{LayoutExtensionName, OcflLayout, StorageLayout};
use crate::specs;
use crate::storage::{Listing, Storage};
use crate::types::SpecVersion;

/// Initializes a brand new storage root. Fails if the root already
/// contains anything.
pub fn init_repository(storage: &dyn Storage, version: SpecVersion, layout: Option<&StorageLayout>) -> Result<()> {
    if !storage.list_directory("")?.is_empty() {
        return Err(OcflError::IllegalState(
            "Cannot initialize a new repository in a non-empty storage root".to_string(),
        ));
    }

    let namaste = version.root_namaste();
    storage.write(namaste.filename, namaste.content.as_bytes(), Some("text/plain"), false)?;
    storage.write(
        version.spec_filename(),
        specs::spec_text(version).as_bytes(),
        Some("text/plain"),
        false,
    )?;

    if let Some(layout) = layout {
        write_layout_declaration(storage, layout)?;
    }

    Ok(())
}

fn write_layout_declaration(storage: &dyn Storage, layout: &StorageLayout) -> Result<()> {
    let extension_name = layout.extension_name().to_string();

    let declaration = OcflLayout {
        extension: layout.extension_name(),
        description: format!("See specification document {}.md", extension_name),
    };
    storage.write(
        OCFL_LAYOUT_FILE,
        &serde_json::to_vec_pretty(&declaration)?,
        Some("application/json"),
        false,
    )?;

    let config_path = format!("{}/{}/{}", EXTENSIONS_DIR, extension_name, EXTENSIONS_CONFIG_FILE);
    storage.write(&config_path, &layout.serialize()?, Some("application/json"), false)?;

    storage.write(
        &format!("{}.md", extension_name),
        specs::extension_spec_text(layout.extension_name()).as_bytes(),
        Some("text/plain"),
        false,
    )?;

    Ok(())
}

/// Verifies an existing storage root: confirms a namaste declaration is
/// present and returns its spec version, and cross-checks the expected
/// layout against either the declared `ocfl_layout.json` or, failing
/// that, a probed object's own location.
pub fn verify_repository(storage: &dyn Storage, expected_layout: Option<&StorageLayout>) -> Result<SpecVersion> {
    let version = detect_root_version(storage)?;

    match read_layout_declaration(storage)? {
        Some(declared) => {
            if let Some(expected) = expected_layout {
                if declared != expected.extension_name() {
                    return Err(OcflError::InvalidConfiguration(format!(
                        "Storage root declares layout {} but {} was configured",
                        declared,
                        expected.extension_name()
                    )));
                }
            }
        }
        None => {
            if let Some(expected) = expected_layout {
                probe_layout_against_object(storage, expected)?;
            }
        }
    }

    Ok(version)
}

fn detect_root_version(storage: &dyn Storage) -> Result<SpecVersion> {
    for entry in storage.list_directory("")? {
        if let Listing::File(name) = &entry {
            if name.starts_with(REPO_NAMASTE_FILE_PREFIX) {
                for candidate in [SpecVersion::Ocfl1_0, SpecVersion::Ocfl1_1] {
                    if candidate.root_namaste().filename == name.as_ref() {
                        return Ok(candidate);
                    }
                }
                return Err(OcflError::Corrupt {
                    object_id: String::new(),
                    message: format!("Unsupported OCFL root declaration: {}", name),
                });
            }
        }
    }

    Err(OcflError::IllegalState(
        "Storage root does not contain an OCFL root declaration".to_string(),
    ))
}

fn read_layout_declaration(storage: &dyn Storage) -> Result<Option<LayoutExtensionName>> {
    if !storage.file_exists(OCFL_LAYOUT_FILE)? {
        return Ok(None);
    }

    let contents = storage.read_to_string(OCFL_LAYOUT_FILE)?;
    let declaration: OcflLayout = serde_json::from_str(&contents)?;
    Ok(Some(declaration.extension))
}

fn probe_layout_against_object(storage: &dyn Storage, expected: &StorageLayout) -> Result<()> {
    let mut roots = storage.iterate_object_roots()?;

    let root = match roots.next() {
        Some(root) => root?,
        None => return Ok(()),
    };

    let inventory_path = format!("{}/{}", root, INVENTORY_FILE);
    let contents = storage.read_to_string(&inventory_path)?;
    let inventory: serde_json::Value = serde_json::from_str(&contents)?;

    let id = inventory.get("id").and_then(|v| v.as_str()).ok_or_else(|| OcflError::Corrupt {
        object_id: root.clone(),
        message: "Inventory is missing its id field".to_string(),
    })?;

    let mapped = expected.map_object_id(id);
    if mapped != root {
        return Err(OcflError::InvalidConfiguration(format!(
            "Configured layout maps object {} to {}, but it was found at {}",
            id, mapped, root
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::storage::fs::FsStorage;

    fn layout() -> StorageLayout {
        StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap()
    }

    #[test]
    fn inits_empty_root() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());

        init_repository(&storage, SpecVersion::Ocfl1_1, Some(&layout())).unwrap();

        assert!(storage.file_exists("0=ocfl_1.1").unwrap());
        assert!(storage.file_exists(OCFL_LAYOUT_FILE).unwrap());
        assert!(storage
            .file_exists("extensions/0004-hashed-n-tuple-storage-layout/config.json")
            .unwrap());
    }

    #[test]
    fn rejects_non_empty_root() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        storage.write("somefile", b"hi", None, false).unwrap();

        let result = init_repository(&storage, SpecVersion::Ocfl1_1, None);
        assert!(result.is_err());
    }

    #[test]
    fn verifies_declared_layout_matches() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        init_repository(&storage, SpecVersion::Ocfl1_1, Some(&layout())).unwrap();

        let version = verify_repository(&storage, Some(&layout())).unwrap();
        assert_eq!(SpecVersion::Ocfl1_1, version);
    }

    #[test]
    fn verify_fails_on_layout_mismatch() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        init_repository(&storage, SpecVersion::Ocfl1_1, Some(&layout())).unwrap();

        let other = StorageLayout::new(LayoutExtensionName::FlatDirectLayout, None).unwrap();
        let result = verify_repository(&storage, Some(&other));
        assert!(result.is_err());
    }

    #[test]
    fn verify_fails_without_namaste() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());

        let result = verify_repository(&storage, None);
        assert!(result.is_err());
    }
}
