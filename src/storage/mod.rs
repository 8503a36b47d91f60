//! Storage capability: a narrow, backend-agnostic interface over bytes
//! and directories. The object storage engine is built entirely on top
//! of this trait and never touches a filesystem or cloud SDK directly.
//!
//! Paths passed to and returned from this trait always use `/` as the
//! separator, regardless of the backend's native convention.

use std::borrow::Cow;
use std::io::Write;
use std::path::Path;

use crate::error::{OcflError, Result};

pub mod fs;
#[cfg(feature = "s3")]
pub mod s3;

/// A range of bytes, inclusive start, exclusive end.
pub type ByteRange = std::ops::Range<u64>;

pub trait Storage {
    /// Streams the file at `path` into `sink`. `NotFound` if absent.
    fn read(&self, path: &str, sink: &mut dyn Write) -> Result<()>;

    /// Reads the file at `path` into a `String`. `NotFound` if absent.
    fn read_to_string(&self, path: &str) -> Result<String> {
        let mut buf = Vec::new();
        self.read(path, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Streams a byte range of the file at `path` into `sink`. Backends
    /// that cannot do partial reads return `General`.
    fn read_range(&self, path: &str, range: ByteRange, sink: &mut dyn Write) -> Result<()> {
        let _ = (path, range, sink);
        Err(OcflError::General(
            "This storage backend does not support range reads".to_string(),
        ))
    }

    /// Writes `bytes` to `path`. `AlreadyExists` if the key is already
    /// present and `overwrite` is `false`.
    fn write(&self, path: &str, bytes: &[u8], media_type: Option<&str>, overwrite: bool) -> Result<()>;

    /// Writes the local file at `src` to `path`, consuming `src` where
    /// the backend can do so with a move instead of a copy.
    fn write_file(
        &self,
        path: &str,
        src: &Path,
        media_type: Option<&str>,
        overwrite: bool,
    ) -> Result<()>;

    /// Copies a file that already exists in this storage backend.
    fn copy_file_internal(&self, src: &str, dst: &str) -> Result<()>;

    /// Copies a local file into this storage backend.
    fn copy_file_into(&self, src: &Path, dst: &str, media_type: Option<&str>) -> Result<()>;

    /// Copies a directory tree out of this storage backend onto the
    /// local filesystem.
    fn copy_directory_out_of(&self, src: &str, dst: &Path) -> Result<()>;

    /// Moves a local directory tree into this storage backend.
    /// `AlreadyExists` if `dst` is already occupied and `overwrite` is
    /// `false`.
    fn move_directory_into(&self, src: &Path, dst: &str, overwrite: bool) -> Result<()>;

    /// Moves a directory tree that already exists in this storage
    /// backend to a new location within it.
    fn move_directory_internal(&self, src: &str, dst: &str) -> Result<()>;

    /// Lists the immediate children of `prefix`. Empty if `prefix` does
    /// not exist or has no children.
    fn list_directory(&self, prefix: &str) -> Result<Vec<Listing>>;

    /// Lists every leaf entry under `prefix`, recursively.
    fn list_recursive(&self, prefix: &str) -> Result<Vec<Listing>>;

    fn file_exists(&self, path: &str) -> Result<bool>;

    fn directory_exists(&self, path: &str) -> Result<bool>;

    fn delete_file(&self, path: &str) -> Result<()>;

    fn delete_files(&self, paths: &[&str]) -> Result<()> {
        for path in paths {
            self.delete_file(path)?;
        }
        Ok(())
    }

    fn delete_directory(&self, path: &str) -> Result<()>;

    /// Removes `path` and then each now-empty ancestor, stopping at the
    /// first non-empty one.
    fn delete_empty_dirs_up(&self, path: &str) -> Result<()>;

    /// Removes every empty directory found anywhere beneath `path`.
    fn delete_empty_dirs_down(&self, path: &str) -> Result<()>;

    /// Ensures `path` exists as a directory. A no-op on backends with
    /// no directory concept of their own.
    fn create_directories(&self, path: &str) -> Result<()>;

    /// Yields the root-relative path of every OCFL object root found by
    /// walking the storage root for `0=ocfl_object_*` marker files. The
    /// walk is depth-first and restartable: once a directory's own
    /// marker is found, its children are not descended into looking for
    /// further nested objects.
    fn iterate_object_roots<'a>(&'a self) -> Result<Box<dyn Iterator<Item = Result<String>> + 'a>>;
}

/// A single entry returned by a directory listing.
#[derive(Debug, Hash, Eq, PartialEq)]
pub enum Listing<'a> {
    File(Cow<'a, str>),
    Directory(Cow<'a, str>),
    Other(Cow<'a, str>),
}

impl<'a> Listing<'a> {
    pub fn file(path: &str) -> Listing {
        Listing::File(Cow::Borrowed(path))
    }

    pub fn dir(path: &str) -> Listing {
        Listing::Directory(Cow::Borrowed(path))
    }

    pub fn file_owned(path: String) -> Listing<'a> {
        Listing::File(Cow::Owned(path))
    }

    pub fn dir_owned(path: String) -> Listing<'a> {
        Listing::Directory(Cow::Owned(path))
    }

    pub fn path(&self) -> &str {
        match self {
            Listing::File(path) => path,
            Listing::Directory(path) => path,
            Listing::Other(path) => path,
        }
    }
}
