//! Maps a logical path within an object version to the physical content
//! path it is stored at: sanitizes the logical path, composes it under
//! the version (or mutable-HEAD revision) directory and content
//! directory, then checks the result against the active storage
//! backend's path constraint profile.

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::consts::MUTABLE_HEAD_EXT_DIR;
use crate::error::{OcflError, Result};
use crate::types::{ContentPath, VersionNum};

/// Characters reserved on Windows file systems, percent-encoded when they
/// appear in a logical path segment so the resulting content path is
/// storable on any backend.
static WINDOWS_RESERVED: Lazy<AsciiSet> = Lazy::new(|| {
    CONTROLS
        .add(b'<')
        .add(b'>')
        .add(b':')
        .add(b'"')
        .add(b'|')
        .add(b'?')
        .add(b'*')
});

/// Extra restrictions a composed content path must satisfy, beyond the
/// baseline of no empty/`.`/`..` segments, chosen per storage backend.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConstraintProfile {
    /// Forbids a leading or trailing `/`, the characters `<>:"|?*`, and
    /// control characters. Intended for S3 and similar object stores.
    Cloud,
    /// Forbids only empty segments and `.`/`..`. Intended for a local
    /// filesystem backend, which already constrains the rest.
    Minimal,
}

/// Composes and validates content paths for a single object, given its
/// configured content directory and the constraint profile of the
/// backend it is stored on.
pub struct ContentPathMapper {
    content_directory: String,
    profile: ConstraintProfile,
}

impl ContentPathMapper {
    pub fn new(content_directory: impl Into<String>, profile: ConstraintProfile) -> Self {
        Self {
            content_directory: content_directory.into(),
            profile,
        }
    }

    /// Maps `logical_path` to its content path within sealed version `version_num`.
    pub fn map_version_path(&self, version_num: VersionNum, logical_path: &str) -> Result<ContentPath> {
        let sanitized = sanitize(logical_path)?;
        let composed = format!("{}/{}/{}", version_num, self.content_directory, sanitized);
        self.finish(composed)
    }

    /// Maps `logical_path` to its content path within mutable-HEAD revision
    /// `revision` (e.g. `r3`).
    pub fn map_mutable_head_path(&self, revision: &str, logical_path: &str) -> Result<ContentPath> {
        let sanitized = sanitize(logical_path)?;
        let composed = format!(
            "{}/head/{}/{}/{}",
            MUTABLE_HEAD_EXT_DIR, self.content_directory, revision, sanitized
        );
        self.finish(composed)
    }

    fn finish(&self, composed: String) -> Result<ContentPath> {
        self.check_profile(&composed)?;
        ContentPath::try_from(composed)
    }

    fn check_profile(&self, path: &str) -> Result<()> {
        match self.profile {
            ConstraintProfile::Cloud => {
                if path.starts_with('/') || path.ends_with('/') {
                    return Err(OcflError::PathConstraint(format!(
                        "Content path must not begin or end with '/'. Found: {}",
                        path
                    )));
                }
                if path
                    .chars()
                    .any(|c| matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') || c.is_control())
                {
                    return Err(OcflError::PathConstraint(format!(
                        "Content path contains a character forbidden by the cloud storage profile. Found: {}",
                        path
                    )));
                }
                Ok(())
            }
            ConstraintProfile::Minimal => {
                if path.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
                    return Err(OcflError::PathConstraint(format!(
                        "Content path must not contain empty, '.', or '..' segments. Found: {}",
                        path
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Percent-encodes Windows-reserved characters in each path segment, and
/// rejects empty segments, `.`, `..`, and any segment containing a
/// backslash.
fn sanitize(logical_path: &str) -> Result<String> {
    let mut parts = Vec::new();

    for part in logical_path.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(OcflError::PathConstraint(format!(
                "Logical path segments must not be empty, '.', or '..'. Found: {}",
                logical_path
            )));
        }

        if part.contains('\\') {
            return Err(OcflError::PathConstraint(format!(
                "Logical path segments must not contain a backslash. Found: {}",
                logical_path
            )));
        }

        parts.push(utf8_percent_encode(part, &WINDOWS_RESERVED).to_string());
    }

    Ok(parts.join("/"))
}
