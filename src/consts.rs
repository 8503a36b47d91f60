// Namaste filenames are version-specific; see `SpecVersion::root_namaste`/
// `object_namaste` in types.rs. Only the prefixes, used to scan a directory
// for whichever declaration is present, are fixed across spec versions.
pub const REPO_NAMASTE_FILE_PREFIX: &str = "0=ocfl_";
pub const OBJECT_NAMASTE_FILE_PREFIX: &str = "0=ocfl_object_";
pub const INVENTORY_FILE: &str = "inventory.json";
pub const OCFL_LAYOUT_FILE: &str = "ocfl_layout.json";
pub const EXTENSIONS_DIR: &str = "extensions";
pub const EXTENSIONS_CONFIG_FILE: &str = "config.json";

pub const DEFAULT_CONTENT_DIR: &str = "content";

pub const MUTABLE_HEAD_EXT_DIR: &str = "extensions/0005-mutable-head";
pub const MUTABLE_HEAD_REVISIONS_DIR: &str = "extensions/0005-mutable-head/revisions";
pub const MUTABLE_HEAD_ROOT_INVENTORY_SIDECAR_PREFIX: &str = "root-inventory.json";

pub const FLAT_DIRECT_LAYOUT_EXTENSION: &str = "0002-flat-direct-storage-layout";
pub const HASHED_NTUPLE_OBJECT_ID_LAYOUT_EXTENSION: &str = "0003-hash-and-id-n-tuple-storage-layout";
pub const HASHED_NTUPLE_LAYOUT_EXTENSION: &str = "0004-hashed-n-tuple-storage-layout";
pub const MUTABLE_HEAD_EXTENSION: &str = "0005-mutable-head";
pub const FLAT_OMIT_PREFIX_LAYOUT_EXTENSION: &str = "0006-flat-omit-prefix-storage-layout";
pub const NTUPLE_OMIT_PREFIX_LAYOUT_EXTENSION: &str = "0007-n-tuple-omit-prefix-storage-layout";
pub const ROCFL_STAGING_EXTENSION: &str = "rocfl-staging";
pub const ROCFL_LOCKS_EXTENSION: &str = "rocfl-locks";

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    FLAT_DIRECT_LAYOUT_EXTENSION,
    HASHED_NTUPLE_OBJECT_ID_LAYOUT_EXTENSION,
    HASHED_NTUPLE_LAYOUT_EXTENSION,
    MUTABLE_HEAD_EXTENSION,
    FLAT_OMIT_PREFIX_LAYOUT_EXTENSION,
    NTUPLE_OMIT_PREFIX_LAYOUT_EXTENSION,
    ROCFL_STAGING_EXTENSION,
    ROCFL_LOCKS_EXTENSION,
];
