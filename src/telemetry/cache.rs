//! Bounded LRU cache for tracer and meter handles.
//!
//! Keyed by `"<name>:<version>"` (version defaults to `default`). Recency is
//! tracked with a monotonically increasing access stamp; the entry with the
//! smallest stamp is the least recently used.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Default number of cached handles.
pub const DEFAULT_HANDLE_CACHE_SIZE: usize = 100;

struct CachedHandle<H> {
    handle: H,
    last_used: u64,
}

struct Inner<H> {
    entries: HashMap<String, CachedHandle<H>>,
    access_counter: u64,
}

/// LRU cache of provider handles.
pub struct HandleCache<H: Clone> {
    inner: Mutex<Inner<H>>,
    capacity: usize,
}

impl<H: Clone> HandleCache<H> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity + 1),
                access_counter: 0,
            }),
            capacity,
        }
    }

    /// Composite cache key for a name and optional version.
    pub fn cache_key(name: &str, version: Option<&str>) -> String {
        format!("{}:{}", name, version.unwrap_or("default"))
    }

    /// Return the cached handle, creating it with `create` on a miss.
    ///
    /// A hit refreshes recency. A miss inserts the new handle and evicts the
    /// least recently used entry once capacity is exceeded.
    pub fn get_or_create<F>(&self, name: &str, version: Option<&str>, create: F) -> H
    where
        F: FnOnce(&str, Option<&str>) -> H,
    {
        let key = Self::cache_key(name, version);
        let mut inner = self.inner.lock();
        inner.access_counter += 1;
        let stamp = inner.access_counter;

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.last_used = stamp;
            return entry.handle.clone();
        }

        let handle = create(name, version);
        inner.entries.insert(key, CachedHandle { handle: handle.clone(), last_used: stamp });
        if inner.entries.len() > self.capacity {
            Self::evict_lru(&mut inner);
        }
        handle
    }

    /// Look up without creating. Refreshes recency on a hit.
    pub fn get(&self, name: &str, version: Option<&str>) -> Option<H> {
        let key = Self::cache_key(name, version);
        let mut inner = self.inner.lock();
        inner.access_counter += 1;
        let stamp = inner.access_counter;
        inner.entries.get_mut(&key).map(|entry| {
            entry.last_used = stamp;
            entry.handle.clone()
        })
    }

    pub fn contains(&self, name: &str, version: Option<&str>) -> bool {
        self.inner.lock().entries.contains_key(&Self::cache_key(name, version))
    }

    fn evict_lru(inner: &mut Inner<H>) {
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            inner.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}
