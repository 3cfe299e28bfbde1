//!
//! The dispatch cache.
//!
//! Maps `(requesting class, method name)` to the resolved method record, or to an
//! explicit undefined entry. Two reverse indices make invalidation precise:
//!
//! - method serial -> every key that resolved to that method record,
//! - method name -> every class holding a cached resolution for that name.
//!
//! Mutators bump the generation before removing entries, and inserters re-check the
//! generation after inserting, so a resolution computed against a stale hierarchy
//! never survives the mutation that made it stale.
//!
//! Lock order is always `entries` before either index: an entry and its index keys
//! are added and removed together under the entry's shard lock.
//!

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use rom_core::{Interned, MethodSerial, ModuleId};

use crate::method::DynamicMethod;

/// A dispatch cache key.
pub type CacheKey = (ModuleId, Interned);

/// A cached resolution.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// The name resolves to this method record.
    Defined(Arc<DynamicMethod>),
    /// The name resolves to nothing (or to an undef marker).
    Undefined,
}

impl CacheEntry {
    pub fn method(&self) -> Option<&Arc<DynamicMethod>> {
        match self {
            Self::Defined(method) => Some(method),
            Self::Undefined => None,
        }
    }

    pub fn into_method(self) -> Option<Arc<DynamicMethod>> {
        match self {
            Self::Defined(method) => Some(method),
            Self::Undefined => None,
        }
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl From<Option<Arc<DynamicMethod>>> for CacheEntry {
    fn from(method: Option<Arc<DynamicMethod>>) -> Self {
        match method {
            Some(method) if !method.is_undefined() => Self::Defined(method),
            _ => Self::Undefined,
        }
    }
}

/// Counters describing the cache's behaviour so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// The process-wide (per runtime) method dispatch cache.
pub struct DispatchCache {
    enabled: bool,
    entries: DashMap<CacheKey, CacheEntry>,
    by_method: DashMap<MethodSerial, HashSet<CacheKey>>,
    by_name: DashMap<Interned, HashSet<ModuleId>>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl DispatchCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: DashMap::new(),
            by_method: DashMap::new(),
            by_name: DashMap::new(),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The current generation; read it before resolving and pass it to [`Self::insert`].
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Look up a cached resolution.
    pub fn get(&self, class: ModuleId, name: Interned) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }

        let found = self.entries.get(&(class, name)).map(|it| it.value().clone());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("dispatch cache hit for ({}, {:?})", class, name);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            log::trace!("dispatch cache miss for ({}, {:?})", class, name);
        }
        found
    }

    /// Record a resolution computed while the cache was at `generation`.
    pub fn insert(&self, class: ModuleId, name: Interned, entry: CacheEntry, generation: u64) {
        if !self.enabled {
            return;
        }

        let key = (class, name);
        let slot = self.entries.entry(key);
        if let Entry::Occupied(existing) = &slot {
            self.unindex(key, existing.get());
        }
        self.index(key, &entry);
        slot.insert(entry);

        if self.generation() != generation {
            self.evict(key);
        }
    }

    /// Drop the single entry for `(class, name)`.
    pub fn invalidate(&self, class: ModuleId, name: Interned) {
        self.bump();
        if self.evict((class, name)) {
            log::trace!("dispatch cache invalidated ({}, {:?})", class, name);
        }
    }

    /// Drop every entry that resolved to the method record with the given serial.
    pub fn invalidate_method(&self, serial: MethodSerial) {
        self.bump();
        let Some((_, keys)) = self.by_method.remove(&serial) else {
            return;
        };
        for key in keys {
            if self.evict(key) {
                log::trace!("dispatch cache invalidated {:?} (method {})", key, serial.0);
            }
        }
    }

    /// Drop every entry for `name` whose requesting class matches `affected`.
    pub fn invalidate_name(&self, name: Interned, affected: impl Fn(ModuleId) -> bool) {
        self.bump();
        let classes: Vec<ModuleId> = match self.by_name.get(&name) {
            Some(classes) => classes.iter().copied().filter(|it| affected(*it)).collect(),
            None => return,
        };
        for class in classes {
            if self.evict((class, name)) {
                log::trace!("dispatch cache invalidated ({}, {:?})", class, name);
            }
        }
    }

    /// Drop every entry whose requesting class matches `affected`.
    pub fn invalidate_classes(&self, affected: impl Fn(ModuleId) -> bool) {
        self.bump();
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            if affected(key.0) {
                self.unindex(*key, entry);
                false
            } else {
                true
            }
        });
        log::trace!(
            "dispatch cache invalidated {} entries by class",
            before.saturating_sub(self.entries.len())
        );
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.bump();
        self.entries.clear();
        self.by_method.clear();
        self.by_name.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    // Remove an entry along with its reverse index keys. Both happen under the
    // entry's shard lock, so a present entry is always indexed.
    fn evict(&self, key: CacheKey) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => {
                self.unindex(key, existing.get());
                existing.remove();
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    fn index(&self, key: CacheKey, entry: &CacheEntry) {
        if let CacheEntry::Defined(method) = entry {
            self.by_method.entry(method.serial()).or_default().insert(key);
        }
        self.by_name.entry(key.1).or_default().insert(key.0);
    }

    fn unindex(&self, key: CacheKey, entry: &CacheEntry) {
        if let CacheEntry::Defined(method) = entry {
            let serial = method.serial();
            if let Some(mut keys) = self.by_method.get_mut(&serial) {
                keys.remove(&key);
            }
            self.by_method.remove_if(&serial, |_, keys| keys.is_empty());
        }
        if let Some(mut classes) = self.by_name.get_mut(&key.1) {
            classes.remove(&key.0);
        }
        self.by_name.remove_if(&key.1, |_, classes| classes.is_empty());
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Callable;
    use rom_core::Visibility;

    fn method(serial: u64, name: u32) -> Arc<DynamicMethod> {
        Arc::new(DynamicMethod::new(
            MethodSerial(serial),
            Interned(name),
            Visibility::Public,
            ModuleId(0),
            Callable::ZSuper,
        ))
    }

    #[test]
    fn hits_and_misses_are_counted() {
        let cache = DispatchCache::new(true);
        let name = Interned(1);

        assert!(cache.get(ModuleId(3), name).is_none());
        let generation = cache.generation();
        cache.insert(ModuleId(3), name, CacheEntry::Undefined, generation);
        assert!(cache.get(ModuleId(3), name).is_some_and(|it| it.is_undefined()));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn replaced_methods_are_evicted_everywhere() {
        let cache = DispatchCache::new(true);
        let foo = method(7, 1);
        let generation = cache.generation();
        for class in 1..=3 {
            cache.insert(ModuleId(class), Interned(1), CacheEntry::Defined(foo.clone()), generation);
        }
        cache.insert(ModuleId(4), Interned(2), CacheEntry::Undefined, generation);

        cache.invalidate_method(foo.serial());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(ModuleId(4), Interned(2)).is_some());
    }

    #[test]
    fn name_invalidation_honors_the_filter() {
        let cache = DispatchCache::new(true);
        let generation = cache.generation();
        for class in 1..=4 {
            cache.insert(ModuleId(class), Interned(9), CacheEntry::Undefined, generation);
        }

        cache.invalidate_name(Interned(9), |class| class.0 % 2 == 0);
        assert!(cache.get(ModuleId(1), Interned(9)).is_some());
        assert!(cache.get(ModuleId(2), Interned(9)).is_none());
        assert!(cache.get(ModuleId(3), Interned(9)).is_some());
        assert!(cache.get(ModuleId(4), Interned(9)).is_none());
    }

    #[test]
    fn evicted_keys_leave_the_reverse_indices() {
        let cache = DispatchCache::new(true);
        let foo = method(7, 1);
        let generation = cache.generation();
        for class in 1..=3 {
            cache.insert(ModuleId(class), Interned(1), CacheEntry::Defined(foo.clone()), generation);
        }

        cache.invalidate(ModuleId(1), Interned(1));
        assert_eq!(cache.by_method.get(&foo.serial()).map(|keys| keys.len()), Some(2));
        assert!(cache.by_name.get(&Interned(1)).is_some_and(|classes| !classes.contains(&ModuleId(1))));

        cache.insert(ModuleId(2), Interned(1), CacheEntry::Undefined, cache.generation());
        assert_eq!(cache.by_method.get(&foo.serial()).map(|keys| keys.len()), Some(1));

        cache.invalidate_classes(|_| true);
        assert!(cache.is_empty());
        assert!(cache.by_method.is_empty());
        assert!(cache.by_name.is_empty());
    }

    #[test]
    fn stale_resolutions_are_not_kept() {
        let cache = DispatchCache::new(true);
        let generation = cache.generation();
        cache.invalidate(ModuleId(1), Interned(1));
        cache.insert(ModuleId(1), Interned(1), CacheEntry::Undefined, generation);
        assert!(cache.is_empty());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = DispatchCache::new(false);
        cache.insert(ModuleId(1), Interned(1), CacheEntry::Undefined, cache.generation());
        assert!(cache.get(ModuleId(1), Interned(1)).is_none());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
