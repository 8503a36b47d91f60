use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::{error, io};

#[cfg(feature = "s3")]
use rusoto_core::region::ParseRegionError;
#[cfg(feature = "s3")]
use rusoto_core::RusotoError;
use thiserror::Error;

use crate::types::VersionNum;

pub type Result<T, E = OcflError> = core::result::Result<T, E>;

/// The engine's error taxonomy. Every variant maps onto a distinct recovery
/// path a caller can reason about; see the component design notes for which
/// operations surface which variants.
#[derive(Error)]
pub enum OcflError {
    #[error("Object {object_id} is corrupt: {message}")]
    Corrupt { object_id: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// A concurrent writer was detected: a sidecar no longer matches what was
    /// expected, a destination already existed, or `previousDigest` didn't
    /// match the live root inventory. The operation was aborted before it
    /// did anything irreversible; the caller may retry.
    #[error("Out of sync: {0}")]
    OutOfSync(String),

    /// A stream's computed digest did not match the digest it was expected
    /// to produce. Never retried or masked by the engine itself.
    #[error("Fixity check failed for {path} in object {object_id}: expected {expected}, got {actual}")]
    FixityCheck {
        object_id: String,
        path: String,
        expected: String,
        actual: String,
    },

    /// The requested operation is not valid given the object's current
    /// state, e.g. storing a new immutable version while a mutable HEAD
    /// is active.
    #[error("Illegal state: {0}")]
    StateError(String),

    /// A logical or content path violated the active path constraint
    /// profile.
    #[error("Path constraint violation: {0}")]
    PathConstraint(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Failed to acquire lock for object {0} at {1}")]
    LockAcquire(String, String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("{0}")]
    General(String),

    #[error("File already exists at {0}. Use the force flag if you wish to overwrite.")]
    AlreadyExists(String),

    #[error("{0}")]
    Io(io::Error),

    #[error("{0}")]
    Wrapped(Box<dyn error::Error>),
}

/// Constructs an `OcflError::NotFound` error
pub fn not_found(object_id: &str, version_num: Option<VersionNum>) -> OcflError {
    match version_num {
        Some(version) => OcflError::NotFound(format!("Object {} version {}", object_id, version)),
        None => OcflError::NotFound(format!("Object {}", object_id)),
    }
}

/// Constructs an `OcflError::NotFound` error for a missing logical path
pub fn not_found_path(object_id: &str, version_num: VersionNum, path: &str) -> OcflError {
    OcflError::NotFound(format!(
        "Object {} version {} path {}",
        object_id, version_num, path
    ))
}

impl Debug for OcflError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<io::Error> for OcflError {
    fn from(e: io::Error) -> Self {
        OcflError::Io(e)
    }
}

impl From<globset::Error> for OcflError {
    fn from(e: globset::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

impl From<serde_json::Error> for OcflError {
    fn from(e: serde_json::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

impl From<walkdir::Error> for OcflError {
    fn from(e: walkdir::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

#[cfg(feature = "s3")]
impl From<ParseRegionError> for OcflError {
    fn from(e: ParseRegionError) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

#[cfg(feature = "s3")]
impl<T: error::Error + 'static> From<RusotoError<T>> for OcflError {
    fn from(e: RusotoError<T>) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

#[cfg(feature = "rusqlite")]
impl From<rusqlite::Error> for OcflError {
    fn from(e: rusqlite::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}
