//! Fixed-capacity cache evicting the least-recently-accessed entry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

struct Entry<V> {
    value: V,
    last_access: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    clock: u64,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone())
        {
            self.entries.remove(&key);
        }
    }
}

/// A key→value cache holding at most `capacity` entries.
///
/// Both reads and writes count as access. Inserting a new key into a full
/// cache evicts exactly one entry, the least recently accessed. All
/// operations are internally synchronized; values are cloned out.
pub struct BoundedCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    /// Creates a cache. A zero capacity stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                clock: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Returns the value for `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let now = inner.tick();
        let entry = inner.entries.get_mut(key)?;
        entry.last_access = now;
        Some(entry.value.clone())
    }

    /// Inserts or replaces `key`, evicting the least-recently-used entry
    /// when a new key would exceed the capacity.
    pub fn put(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        let now = inner.tick();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            inner.evict_lru();
        }
        inner.entries.insert(
            key,
            Entry {
                value,
                last_access: now,
            },
        );
    }

    /// Returns the cached value or builds, caches and returns a new one.
    ///
    /// `build` runs outside the lock; when two callers race on the same key
    /// both build and the later insert wins.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(v) = self.get(&key) {
            return Ok(v);
        }
        let value = build()?;
        self.put(key, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}
