//! Inventory caching. The engine consults a cache before parsing an
//! object's inventory off of storage, and invalidates the entry whenever
//! it detects the object may have changed underneath it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::inventory::Inventory;

/// A cache of parsed inventories, keyed by object id. Implementations
/// are free to evict entries at will; a cache miss just costs a re-parse.
pub trait InventoryCache {
    fn get(&self, object_id: &str) -> Option<Rc<Inventory>>;

    fn put(&self, object_id: &str, inventory: Rc<Inventory>);

    /// Drops the cached entry for `object_id`, if any. Called after an
    /// `OutOfSync` error, and after `purge_object`/`rollback_to_version`,
    /// since the cached inventory no longer reflects what's in storage.
    fn invalidate(&self, object_id: &str);
}

/// An `InventoryCache` that never caches anything. Every `get` misses,
/// so the engine always re-reads from storage. Useful as a default when
/// no cache is configured.
#[derive(Debug, Default)]
pub struct NoopCache;

impl InventoryCache for NoopCache {
    fn get(&self, _object_id: &str) -> Option<Rc<Inventory>> {
        None
    }

    fn put(&self, _object_id: &str, _inventory: Rc<Inventory>) {}

    fn invalidate(&self, _object_id: &str) {}
}

/// A simple in-memory cache with a fixed capacity, evicting the least
/// recently used entry once full.
///
/// `Inventory` holds `Rc`-based internal structures (see `PathBiMap`),
/// so it is neither `Send` nor `Sync`; this cache is interior-mutable
/// via `RefCell`, not `Mutex`, and is meant to be used from a single
/// thread, consistent with the rest of the engine's synchronous,
/// non-`Send` design.
pub struct LruInventoryCache {
    capacity: usize,
    entries: RefCell<HashMap<String, Rc<Inventory>>>,
    /// Tracks access order, oldest first, for eviction.
    order: RefCell<Vec<String>>,
}

impl LruInventoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RefCell::new(HashMap::with_capacity(capacity)),
            order: RefCell::new(Vec::with_capacity(capacity)),
        }
    }

    fn touch(&self, object_id: &str) {
        let mut order = self.order.borrow_mut();
        if let Some(pos) = order.iter().position(|id| id == object_id) {
            order.remove(pos);
        }
        order.push(object_id.to_string());
    }
}

impl InventoryCache for LruInventoryCache {
    fn get(&self, object_id: &str) -> Option<Rc<Inventory>> {
        let found = self.entries.borrow().get(object_id).cloned();
        if found.is_some() {
            self.touch(object_id);
        }
        found
    }

    fn put(&self, object_id: &str, inventory: Rc<Inventory>) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries.borrow_mut();

        if !entries.contains_key(object_id) && entries.len() >= self.capacity {
            let mut order = self.order.borrow_mut();
            if !order.is_empty() {
                let oldest = order.remove(0);
                entries.remove(&oldest);
            }
        }

        entries.insert(object_id.to_string(), inventory);
        drop(entries);
        self.touch(object_id);
    }

    fn invalidate(&self, object_id: &str) {
        self.entries.borrow_mut().remove(object_id);
        self.order.borrow_mut().retain(|id| id != object_id);
    }
}
