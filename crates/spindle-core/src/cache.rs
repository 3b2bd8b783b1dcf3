//! The per-event handler cache.
//!
//! The cache maps `mode → event → path → descriptor`. It is a memoize-on-first
//! use structure: entries are only ever added, never evicted or replaced, and
//! a populated `(mode, event)` entry is returned as-is on later registrations
//! without touching the filesystem again.
//!
//! Iteration order of every level depends on the configured [`CacheDriver`]:
//! insertion order for [`CacheDriver::Ordered`], key order for
//! [`CacheDriver::Sorted`].

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

use crate::artifact::BoxedCode;
use crate::emitter::Mode;
use crate::options::CacheDriver;

/// A resolved handler, ready to be invoked.
#[derive(Clone)]
pub struct HandlerDescriptor {
    /// File the handler was loaded from.
    pub path: PathBuf,
    /// Display name: the record's name field, or the path.
    pub name: String,
    /// Record payload. Never passed to the code.
    pub data: Option<Value>,
    /// The callable.
    pub code: BoxedCode,
    /// Event the handler is registered for.
    pub event: String,
    /// Subscription mode.
    pub mode: Mode,
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("data", &self.data)
            .field("event", &self.event)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A map whose implementation follows the configured driver.
#[derive(Debug, Clone)]
enum Table<K, V> {
    Ordered(IndexMap<K, V>),
    Sorted(BTreeMap<K, V>),
}

impl<K: Hash + Ord, V> Table<K, V> {
    fn new(driver: CacheDriver) -> Self {
        match driver {
            CacheDriver::Ordered => Self::Ordered(IndexMap::new()),
            CacheDriver::Sorted => Self::Sorted(BTreeMap::new()),
        }
    }

    fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Ord + Eq + ?Sized,
    {
        match self {
            Self::Ordered(map) => map.get(key),
            Self::Sorted(map) => map.get(key),
        }
    }

    fn get_or_insert_with(&mut self, key: K, f: impl FnOnce() -> V) -> &mut V {
        match self {
            Self::Ordered(map) => map.entry(key).or_insert_with(f),
            Self::Sorted(map) => map.entry(key).or_insert_with(f),
        }
    }

    /// Inserts `value` unless `key` is present. Returns whether it was inserted.
    fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        match self {
            Self::Ordered(map) => match map.entry(key) {
                indexmap::map::Entry::Occupied(_) => false,
                indexmap::map::Entry::Vacant(slot) => {
                    slot.insert(value);
                    true
                }
            },
            Self::Sorted(map) => match map.entry(key) {
                std::collections::btree_map::Entry::Occupied(_) => false,
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(value);
                    true
                }
            },
        }
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_> {
        match self {
            Self::Ordered(map) => Box::new(map.keys()),
            Self::Sorted(map) => Box::new(map.keys()),
        }
    }

    fn values(&self) -> Box<dyn Iterator<Item = &V> + '_> {
        match self {
            Self::Ordered(map) => Box::new(map.values()),
            Self::Sorted(map) => Box::new(map.values()),
        }
    }
}

type Handlers = Table<PathBuf, Arc<HandlerDescriptor>>;

/// Handler cache owned by one application.
#[derive(Debug)]
pub struct EventCache {
    driver: CacheDriver,
    on: Table<String, Handlers>,
    once: Table<String, Handlers>,
}

/// Cache handle shared between the application and its listeners.
pub type SharedCache = Arc<RwLock<EventCache>>;

impl Default for EventCache {
    fn default() -> Self {
        Self::new(CacheDriver::default())
    }
}

impl EventCache {
    /// Creates an empty cache backed by `driver`.
    pub fn new(driver: CacheDriver) -> Self {
        Self {
            driver,
            on: Table::new(driver),
            once: Table::new(driver),
        }
    }

    /// Wraps a new cache in a shared handle.
    pub fn shared(driver: CacheDriver) -> SharedCache {
        Arc::new(RwLock::new(Self::new(driver)))
    }

    fn events_for(&self, mode: Mode) -> &Table<String, Handlers> {
        match mode {
            Mode::On => &self.on,
            Mode::Once => &self.once,
        }
    }

    fn handlers_mut(&mut self, mode: Mode, event: &str) -> &mut Handlers {
        let driver = self.driver;
        let events = match mode {
            Mode::On => &mut self.on,
            Mode::Once => &mut self.once,
        };
        events.get_or_insert_with(event.to_string(), || Table::new(driver))
    }

    /// Whether `(mode, event)` has been populated.
    pub fn contains(&self, mode: Mode, event: &str) -> bool {
        self.events_for(mode).get(event).is_some()
    }

    /// Snapshot of the handlers for `(mode, event)`, in dispatch order.
    pub fn get(&self, mode: Mode, event: &str) -> Option<Vec<Arc<HandlerDescriptor>>> {
        self.events_for(mode)
            .get(event)
            .map(|handlers| handlers.values().cloned().collect())
    }

    /// Like [`get`](Self::get), checking `on` before `once`.
    pub fn get_any(&self, event: &str) -> Option<Vec<Arc<HandlerDescriptor>>> {
        self.get(Mode::On, event)
            .or_else(|| self.get(Mode::Once, event))
    }

    /// Cached event names for `mode`.
    pub fn events(&self, mode: Mode) -> Vec<String> {
        self.events_for(mode).keys().cloned().collect()
    }

    /// Returns the cached handlers for `(mode, event)`, building them first if
    /// the entry does not exist.
    ///
    /// `build` runs at most once per entry. Its descriptors are inserted in
    /// the order returned; an empty result still creates the entry.
    pub fn get_or_build<E>(
        &mut self,
        mode: Mode,
        event: &str,
        build: impl FnOnce() -> Result<Vec<HandlerDescriptor>, E>,
    ) -> Result<Vec<Arc<HandlerDescriptor>>, E> {
        if let Some(handlers) = self.get(mode, event) {
            trace!(%mode, event, handlers = handlers.len(), "Handler cache hit");
            return Ok(handlers);
        }

        let descriptors = build()?;
        let handlers = self.handlers_mut(mode, event);
        for descriptor in descriptors {
            handlers.insert_if_absent(descriptor.path.clone(), Arc::new(descriptor));
        }
        Ok(handlers.values().cloned().collect())
    }

    /// Inserts a descriptor under its own `(mode, event)`.
    ///
    /// Returns `false` and leaves the cache untouched if the path is already
    /// registered for that pair.
    pub fn insert(&mut self, descriptor: HandlerDescriptor) -> bool {
        let handlers = self.handlers_mut(descriptor.mode, &descriptor.event);
        handlers.insert_if_absent(descriptor.path.clone(), Arc::new(descriptor))
    }

    /// Inserts every descriptor. Returns how many were new.
    pub fn absorb(&mut self, descriptors: impl IntoIterator<Item = HandlerDescriptor>) -> usize {
        let mut inserted = 0;
        for descriptor in descriptors {
            if self.insert(descriptor) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Total number of cached descriptors.
    pub fn len(&self) -> usize {
        [&self.on, &self.once]
            .into_iter()
            .flat_map(|events| events.values())
            .map(|handlers| handlers.values().count())
            .sum()
    }

    /// Whether no descriptor is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::sync_code;
    use std::convert::Infallible;

    fn descriptor(path: &str, event: &str, mode: Mode) -> HandlerDescriptor {
        HandlerDescriptor {
            path: PathBuf::from(path),
            name: path.to_string(),
            data: None,
            code: sync_code(|_| Ok(())),
            event: event.to_string(),
            mode,
        }
    }

    fn paths(handlers: &[Arc<HandlerDescriptor>]) -> Vec<String> {
        handlers
            .iter()
            .map(|h| h.path.display().to_string())
            .collect()
    }

    #[test]
    fn test_get_or_build_runs_once() {
        let mut cache = EventCache::default();
        let mut builds = 0;

        let first = cache
            .get_or_build::<Infallible>(Mode::On, "ping", || {
                builds += 1;
                Ok(vec![
                    descriptor("b", "ping", Mode::On),
                    descriptor("a", "ping", Mode::On),
                ])
            })
            .unwrap();
        assert_eq!(paths(&first), ["b", "a"]);

        let second = cache
            .get_or_build::<Infallible>(Mode::On, "ping", || {
                builds += 1;
                Ok(Vec::new())
            })
            .unwrap();
        assert_eq!(paths(&second), ["b", "a"]);
        assert_eq!(builds, 1);
    }

    #[test]
    fn test_empty_build_still_memoizes() {
        let mut cache = EventCache::default();
        cache
            .get_or_build::<Infallible>(Mode::On, "idle", || Ok(Vec::new()))
            .unwrap();
        assert!(cache.contains(Mode::On, "idle"));
        assert_eq!(cache.get(Mode::On, "idle").unwrap().len(), 0);
    }

    #[test]
    fn test_build_error_leaves_no_entry() {
        let mut cache = EventCache::default();
        let result = cache.get_or_build(Mode::On, "ping", || Err("boom"));
        assert_eq!(result.unwrap_err(), "boom");
        assert!(!cache.contains(Mode::On, "ping"));
    }

    #[test]
    fn test_insert_is_once_per_path() {
        let mut cache = EventCache::default();
        assert!(cache.insert(descriptor("a", "ping", Mode::On)));
        assert!(!cache.insert(descriptor("a", "ping", Mode::On)));
        assert!(cache.insert(descriptor("a", "ping", Mode::Once)));
        assert!(cache.insert(descriptor("a", "pong", Mode::On)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_modes_are_separate() {
        let mut cache = EventCache::default();
        cache.insert(descriptor("a", "ready", Mode::Once));

        assert!(cache.get(Mode::On, "ready").is_none());
        assert_eq!(cache.get(Mode::Once, "ready").unwrap().len(), 1);
        assert_eq!(cache.get_any("ready").unwrap().len(), 1);
        assert_eq!(cache.events(Mode::Once), ["ready"]);
    }

    #[test]
    fn test_absorb_counts_new_entries() {
        let mut cache = EventCache::default();
        let inserted = cache.absorb([
            descriptor("a", "ping", Mode::On),
            descriptor("b", "ping", Mode::On),
            descriptor("a", "ping", Mode::On),
        ]);
        assert_eq!(inserted, 2);
    }

    #[test]
    fn test_sorted_driver_orders_by_path() {
        let mut cache = EventCache::new(CacheDriver::Sorted);
        cache.absorb([
            descriptor("c", "ping", Mode::On),
            descriptor("a", "ping", Mode::On),
            descriptor("b", "ping", Mode::On),
        ]);
        assert_eq!(paths(&cache.get(Mode::On, "ping").unwrap()), ["a", "b", "c"]);
    }
}
