//! Caller-constructed configuration value types. Nothing in this module
//! reads a file or an environment variable: a loader outside this crate
//! is expected to build a `RepoConfig` from whatever source it likes
//! (TOML, JSON, CLI flags) and hand it to the engine's constructors.

use serde::{Deserialize, Serialize};

use crate::content_path::ConstraintProfile;
use crate::digest::DigestAlgorithm;
use crate::error::{OcflError, Result};
use crate::layout::LayoutExtensionName;

/// Describes how a repository's objects are stored and addressed.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    /// The layout extension used to map object IDs to object roots.
    pub layout: LayoutExtensionName,
    /// The digest algorithm new object versions are written with.
    #[serde(default = "default_digest_algorithm")]
    pub digest_algorithm: DigestAlgorithm,
    /// The OCFL content directory name used within each object, e.g. `content`.
    #[serde(default = "default_content_directory")]
    pub content_directory: String,
    /// Where the backend lives and how paths into it are constrained.
    pub storage: StorageConfig,
    /// A local directory used to stage files before they're promoted
    /// into the backend. Required for backends that cannot write
    /// atomically in place.
    pub staging_root: Option<String>,
}

fn default_digest_algorithm() -> DigestAlgorithm {
    DigestAlgorithm::Sha512
}

fn default_content_directory() -> String {
    "content".to_string()
}

/// Backend-specific settings. The variant in use determines which
/// `ConstraintProfile` the content-path mapper applies.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    FileSystem { storage_root: String },
    S3 {
        bucket: String,
        region: String,
        prefix: Option<String>,
        endpoint: Option<String>,
        profile: Option<String>,
    },
}

impl StorageConfig {
    pub fn constraint_profile(&self) -> ConstraintProfile {
        match self {
            StorageConfig::FileSystem { .. } => ConstraintProfile::Minimal,
            StorageConfig::S3 { .. } => ConstraintProfile::Cloud,
        }
    }
}

impl RepoConfig {
    pub fn new(layout: LayoutExtensionName, storage: StorageConfig) -> Self {
        Self {
            layout,
            digest_algorithm: default_digest_algorithm(),
            content_directory: default_content_directory(),
            storage,
            staging_root: None,
        }
    }

    /// Checks for combinations the engine cannot act on, mirroring the
    /// kind of mistakes a hand-written config file tends to contain.
    pub fn validate(&self) -> Result<()> {
        if self.content_directory.is_empty()
            || self.content_directory == "."
            || self.content_directory == ".."
            || self.content_directory.contains('/')
        {
            return Err(OcflError::InvalidConfiguration(format!(
                "Invalid content directory: {}",
                self.content_directory
            )));
        }

        if let StorageConfig::S3 { bucket, region, .. } = &self.storage {
            if bucket.is_empty() {
                return Err(OcflError::InvalidConfiguration(
                    "An S3 bucket must be specified".to_string(),
                ));
            }
            if region.is_empty() {
                return Err(OcflError::InvalidConfiguration(
                    "A region must be specified when using S3".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs_config() -> RepoConfig {
        RepoConfig::new(
            LayoutExtensionName::HashedNTupleLayout,
            StorageConfig::FileSystem {
                storage_root: "/var/ocfl/repo".to_string(),
            },
        )
    }

    #[test]
    fn defaults_are_applied() {
        let config = fs_config();
        assert_eq!(DigestAlgorithm::Sha512, config.digest_algorithm);
        assert_eq!("content", config.content_directory);
    }

    #[test]
    fn rejects_invalid_content_directory() {
        let mut config = fs_config();
        config.content_directory = "a/b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_s3_without_region() {
        let config = RepoConfig::new(
            LayoutExtensionName::HashedNTupleLayout,
            StorageConfig::S3 {
                bucket: "my-bucket".to_string(),
                region: String::new(),
                prefix: None,
                endpoint: None,
                profile: None,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn filesystem_uses_minimal_profile() {
        assert_eq!(ConstraintProfile::Minimal, fs_config().storage.constraint_profile());
    }
}
