//! This library is a storage-agnostic implementation of [OCFL
//! repositories](https://ocfl.io/).
//!
//! An [`ObjectStorageEngine`] is built from a [`Storage`] backend (the
//! filesystem or S3), a [`StorageLayout`], an [`ObjectLock`], and an
//! [`InventoryCache`]:
//!
//! ```no_run
//! use ocfl_core::cache::NoopCache;
//! use ocfl_core::engine::ObjectStorageEngine;
//! use ocfl_core::layout::{LayoutExtensionName, StorageLayout};
//! use ocfl_core::lock::FileLockManager;
//! use ocfl_core::storage::fs::FsStorage;
//!
//! let engine = ObjectStorageEngine::new(
//!     Box::new(FsStorage::new("/path/to/storage/root")),
//!     StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap(),
//!     Box::new(FileLockManager::new("/path/to/storage/root/extensions/0004-rocfl-locks")),
//!     Box::new(NoopCache),
//! );
//! ```

pub mod bimap;
pub mod cache;
pub mod config;
pub mod consts;
pub mod content_path;
pub mod db;
pub mod digest;
pub mod engine;
pub mod error;
pub mod init;
pub mod inventory;
pub mod layout;
pub mod lock;
pub mod paths;
pub mod retry;
pub mod specs;
pub mod storage;
pub mod types;
mod util;

pub use crate::cache::InventoryCache;
pub use crate::config::{RepoConfig, StorageConfig};
pub use crate::content_path::{ConstraintProfile, ContentPathMapper};
pub use crate::digest::DigestAlgorithm;
pub use crate::engine::ObjectStorageEngine;
pub use crate::error::{OcflError, Result};
pub use crate::inventory::{Inventory, InventoryBuilder, Version};
pub use crate::layout::{LayoutExtensionName, StorageLayout};
pub use crate::lock::ObjectLock;
pub use crate::storage::Storage;
pub use crate::types::*;
