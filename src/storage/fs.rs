//! Local filesystem storage backend.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;
use walkdir::WalkDir;

use crate::consts::{EXTENSIONS_DIR, OBJECT_NAMASTE_FILE_PREFIX};
use crate::error::{OcflError, Result};
use crate::storage::{ByteRange, Listing, Storage};
use crate::util;

/// Storage rooted at a directory on the local filesystem.
pub struct FsStorage {
    storage_root: PathBuf,
}

impl FsStorage {
    pub fn new(storage_root: impl AsRef<Path>) -> Self {
        Self {
            storage_root: storage_root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.storage_root.join(path)
    }
}

impl Storage for FsStorage {
    fn read(&self, path: &str, sink: &mut dyn Write) -> Result<()> {
        let mut file = File::open(self.resolve(path)).map_err(|e| not_found_io(path, e))?;
        io::copy(&mut file, sink)?;
        Ok(())
    }

    fn read_range(&self, path: &str, range: ByteRange, sink: &mut dyn Write) -> Result<()> {
        use std::io::{Read, Seek, SeekFrom};

        let mut file = File::open(self.resolve(path)).map_err(|e| not_found_io(path, e))?;
        file.seek(SeekFrom::Start(range.start))?;
        let mut remaining = range.end.saturating_sub(range.start);
        let mut buf = [0u8; 8192];

        while remaining > 0 {
            let to_read = remaining.min(buf.len() as u64) as usize;
            let read = file.read(&mut buf[..to_read])?;
            if read == 0 {
                break;
            }
            sink.write_all(&buf[..read])?;
            remaining -= read as u64;
        }

        Ok(())
    }

    fn write(&self, path: &str, bytes: &[u8], _media_type: Option<&str>, overwrite: bool) -> Result<()> {
        let dest = self.resolve(path);

        if !overwrite && dest.exists() {
            return Err(OcflError::AlreadyExists(path.to_string()));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&dest, bytes)?;
        Ok(())
    }

    fn write_file(
        &self,
        path: &str,
        src: &Path,
        _media_type: Option<&str>,
        overwrite: bool,
    ) -> Result<()> {
        let dest = self.resolve(path);

        if !overwrite && dest.exists() {
            return Err(OcflError::AlreadyExists(path.to_string()));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        move_path(src, &dest, overwrite)
    }

    fn copy_file_internal(&self, src: &str, dst: &str) -> Result<()> {
        let dest = self.resolve(dst);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(self.resolve(src), &dest)?;
        Ok(())
    }

    fn copy_file_into(&self, src: &Path, dst: &str, _media_type: Option<&str>) -> Result<()> {
        let dest = self.resolve(dst);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, &dest)?;
        Ok(())
    }

    fn copy_directory_out_of(&self, src: &str, dst: &Path) -> Result<()> {
        let root = self.resolve(src);
        copy_dir_recursive(&root, dst)
    }

    fn move_directory_into(&self, src: &Path, dst: &str, overwrite: bool) -> Result<()> {
        let dest = self.resolve(dst);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        move_path(src, &dest, overwrite)
    }

    fn move_directory_internal(&self, src: &str, dst: &str) -> Result<()> {
        let dest = self.resolve(dst);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        move_path(&self.resolve(src), &dest, false)
    }

    fn list_directory(&self, prefix: &str) -> Result<Vec<Listing>> {
        self.list(prefix, false)
    }

    fn list_recursive(&self, prefix: &str) -> Result<Vec<Listing>> {
        self.list(prefix, true)
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path).is_file())
    }

    fn directory_exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path).is_dir())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        util::remove_file_ignore_not_found(self.resolve(path))?;
        Ok(())
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let dir = self.resolve(path);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    fn delete_empty_dirs_up(&self, path: &str) -> Result<()> {
        let dir = self.resolve(path);
        if dir.exists() {
            util::clean_dirs_up(dir)?;
        }
        Ok(())
    }

    fn delete_empty_dirs_down(&self, path: &str) -> Result<()> {
        let dir = self.resolve(path);
        if dir.exists() {
            util::clean_dirs_down(dir)?;
        }
        Ok(())
    }

    fn create_directories(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn iterate_object_roots<'a>(&'a self) -> Result<Box<dyn Iterator<Item = Result<String>> + 'a>> {
        Ok(Box::new(ObjectRootIter::new(&self.storage_root)?))
    }
}

impl FsStorage {
    /// Lists the contents of the specified directory. If `recursive` is `true`, then all
    /// leaf-nodes are returned. If the directory does not exist, or is empty, then an empty
    /// vector is returned. The returned paths are all relative the directory that was listed.
    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Listing>> {
        let mut listings = Vec::new();
        let root = self.resolve(path);

        if fs::metadata(&root).is_err() {
            return Ok(listings);
        }

        let mut walker = WalkDir::new(&root);
        if !recursive {
            walker = walker.max_depth(1);
        }

        for entry in walker {
            let entry = entry?;

            let relative = pathdiff_relative(entry.path(), &root);
            let relative = util::convert_backslash_to_forward(&relative).to_string();

            if entry.path() == root.as_path() {
                continue;
            }

            if entry.file_type().is_file() {
                listings.push(Listing::File(Cow::Owned(relative)));
            } else if entry.file_type().is_dir() {
                if !recursive || util::dir_is_empty(entry.path())? {
                    listings.push(Listing::Directory(Cow::Owned(relative)));
                }
            } else {
                listings.push(Listing::Other(Cow::Owned(relative)));
            }
        }

        Ok(listings)
    }
}

/// Depth-first, restartable walk over a storage root that yields every
/// OCFL object root it finds, identified by an `0=ocfl_object_*` marker
/// file. A directory is only descended into when it is not itself an
/// object root.
struct ObjectRootIter {
    root: PathBuf,
    dir_iters: Vec<fs::ReadDir>,
    current: Option<fs::ReadDir>,
}

impl ObjectRootIter {
    fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            dir_iters: vec![fs::read_dir(&root)?],
            root: root.as_ref().to_path_buf(),
            current: None,
        })
    }
}

impl Iterator for ObjectRootIter {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() && self.dir_iters.is_empty() {
                return None;
            } else if self.current.is_none() {
                self.current = self.dir_iters.pop();
            }

            let entry = self.current.as_mut().unwrap().next();

            match entry {
                None => {
                    self.current = None;
                }
                Some(Err(e)) => return Some(Err(e.into())),
                Some(Ok(entry)) => {
                    let ftype = match entry.file_type() {
                        Ok(ftype) => ftype,
                        Err(e) => return Some(Err(e.into())),
                    };

                    if !ftype.is_dir() {
                        continue;
                    }

                    let path = entry.path();

                    if path.file_name().unwrap_or_default() == EXTENSIONS_DIR {
                        continue;
                    }

                    match is_object_root(&path) {
                        Ok(true) => {
                            let relative = pathdiff_relative(&path, &self.root);
                            return Some(Ok(util::convert_backslash_to_forward(&relative).into_owned()));
                        }
                        Ok(false) => {
                            self.dir_iters.push(self.current.take().unwrap());
                            match fs::read_dir(&path) {
                                Ok(next) => self.current = Some(next),
                                Err(e) => return Some(Err(e.into())),
                            }
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }
}

fn is_object_root(path: impl AsRef<Path>) -> Result<bool> {
    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        if entry_path.is_file()
            && entry_path
                .file_name()
                .unwrap_or_default()
                .to_str()
                .map_or(false, |name| name.starts_with(OBJECT_NAMASTE_FILE_PREFIX))
        {
            return Ok(true);
        }
    }
    Ok(false)
}

fn not_found_io(path: &str, e: io::Error) -> OcflError {
    if e.kind() == io::ErrorKind::NotFound {
        OcflError::NotFound(path.to_string())
    } else {
        e.into()
    }
}

fn pathdiff_relative(path: &Path, base: &Path) -> String {
    pathdiff::diff_paths(path, base)
        .unwrap_or_else(|| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

/// Moves `src` to `dst`, falling back to a recursive copy-then-delete
/// only when the rename fails because `src` and `dst` are on different
/// volumes. `AlreadyExists` if `dst` is already occupied and `overwrite`
/// is `false` — the caller relies on this to detect a concurrent writer.
fn move_path(src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && dst.exists() {
        return Err(OcflError::AlreadyExists(dst.to_string_lossy().into_owned()));
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            if src.is_dir() {
                copy_dir_recursive(src, dst)?;
                fs::remove_dir_all(src)?;
            } else {
                fs::copy(src, dst)?;
                fs::remove_file(src)?;
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// `fs::rename` fails with this raw OS error when `src` and `dst` live
/// on different mounts/volumes; std has no stable `ErrorKind` for it.
#[cfg(unix)]
const EXDEV: i32 = 18;
#[cfg(windows)]
const EXDEV: i32 = 17;

fn is_cross_device_error(e: &io::Error) -> bool {
    #[cfg(any(unix, windows))]
    {
        e.raw_os_error() == Some(EXDEV)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = pathdiff::diff_paths(entry.path(), src).unwrap();
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }

    info!(
        "Copied {} to {}",
        src.to_string_lossy(),
        dst.to_string_lossy()
    );

    Ok(())
}
