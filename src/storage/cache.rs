//! Generic reference-counted resource cache.
//!
//! The cache bounds how many distinct keyed resources may be materialized at
//! once, deduplicates concurrent loads of the same key, and evicts a resource
//! only when its reference count reaches zero. It is parameterized by two
//! injected closures instead of subclass hooks: `load` materializes a
//! resource from backing storage and `evict` disposes of it (for pages:
//! flush-if-dirty). The pager composes this cache with its file I/O.
//!
//! A key is in exactly one of three states at any instant: absent, being
//! loaded, or cached with refcount >= 1. All three tracking structures are
//! guarded by a single mutex; the `load` call itself runs outside the lock so
//! slow I/O does not block unrelated keys.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::error::{StorageError, StorageResult};

/// Materialize a resource from backing storage.
pub type LoadFn<T> = Box<dyn Fn(u64) -> StorageResult<T> + Send + Sync>;

/// Dispose of a resource whose last reference was released.
pub type EvictFn<T> = Box<dyn Fn(&T) -> StorageResult<()> + Send + Sync>;

/// How many 1ms waits `get` tolerates while another caller loads the same
/// key before giving up with `Busy`.
const DEFAULT_WAIT_ATTEMPTS: u32 = 5000;

struct CacheState<T> {
    cached: HashMap<u64, T>,
    refs: HashMap<u64, usize>,
    loading: HashSet<u64>,
}

pub struct ResourceCache<T> {
    state: Mutex<CacheState<T>>,
    /// Maximum number of live entries; 0 means unbounded.
    max_resources: usize,
    max_wait_attempts: u32,
    load: LoadFn<T>,
    evict: EvictFn<T>,
}

impl<T: Clone> ResourceCache<T> {
    pub fn new(max_resources: usize, load: LoadFn<T>, evict: EvictFn<T>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                cached: HashMap::new(),
                refs: HashMap::new(),
                loading: HashSet::new(),
            }),
            max_resources,
            max_wait_attempts: DEFAULT_WAIT_ATTEMPTS,
            load,
            evict,
        }
    }

    /// Override how long `get` waits on a concurrent load of the same key
    /// before giving up with `Busy`.
    pub fn with_wait_attempts(mut self, attempts: u32) -> Self {
        self.max_wait_attempts = attempts;
        self
    }

    /// Fetch the resource for `key`, loading it if necessary.
    ///
    /// If another caller is currently loading the same key, waits in a
    /// bounded retry loop. Returns `CacheFull` when the cache is at capacity
    /// and the key is not resident.
    pub fn get(&self, key: u64) -> StorageResult<T> {
        let mut attempts = 0u32;
        loop {
            let mut state = self.state.lock();

            if state.loading.contains(&key) {
                drop(state);
                attempts += 1;
                if attempts > self.max_wait_attempts {
                    return Err(StorageError::Busy { key });
                }
                std::thread::sleep(Duration::from_millis(1));
                continue;
            }

            if let Some(value) = state.cached.get(&key) {
                let value = value.clone();
                if let Some(refc) = state.refs.get_mut(&key) {
                    *refc += 1;
                }
                return Ok(value);
            }

            // Loading slots count against capacity so concurrent loads
            // cannot overshoot the bound.
            let live = state.cached.len() + state.loading.len();
            if self.max_resources > 0 && live >= self.max_resources {
                return Err(StorageError::CacheFull {
                    capacity: self.max_resources,
                });
            }

            state.loading.insert(key);
            break;
        }

        let value = match (self.load)(key) {
            Ok(v) => v,
            Err(e) => {
                // Undo the reservation so the slot is reusable.
                self.state.lock().loading.remove(&key);
                return Err(e);
            }
        };

        let mut state = self.state.lock();
        state.loading.remove(&key);
        state.cached.insert(key, value.clone());
        state.refs.insert(key, 1);
        Ok(value)
    }

    /// Drop one reference to `key`. At zero references the evict hook runs
    /// and the entry is removed, freeing a capacity slot. Eviction happens
    /// before removal, never after.
    pub fn release(&self, key: u64) -> StorageResult<()> {
        let mut state = self.state.lock();
        let Some(refc) = state.refs.get_mut(&key) else {
            debug_assert!(false, "release of key {key} with no outstanding reference");
            return Ok(());
        };
        *refc -= 1;
        if *refc == 0 {
            // The entry goes away even when eviction fails; keeping it would
            // leave a cached-with-refcount-0 state a later get could
            // resurrect after its flush already failed.
            let evicted = match state.cached.get(&key) {
                Some(value) => (self.evict)(value),
                None => Ok(()),
            };
            state.refs.remove(&key);
            state.cached.remove(&key);
            evicted?;
        }
        Ok(())
    }

    /// Force-evict every cached entry. Used at shutdown; callers must
    /// quiesce concurrent `get`s first.
    pub fn close(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        let keys: Vec<u64> = state.cached.keys().copied().collect();
        let mut first_err = None;
        for key in keys {
            if let Some(value) = state.cached.get(&key) {
                if let Err(e) = (self.evict)(value) {
                    first_err.get_or_insert(e);
                }
            }
            state.refs.remove(&key);
            state.cached.remove(&key);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of currently materialized entries.
    pub fn len(&self) -> usize {
        self.state.lock().cached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_cache(
        max: usize,
        loads: Arc<AtomicUsize>,
        evicts: Arc<AtomicUsize>,
    ) -> ResourceCache<u64> {
        let l = loads.clone();
        let e = evicts.clone();
        ResourceCache::new(
            max,
            Box::new(move |key| {
                l.fetch_add(1, Ordering::SeqCst);
                Ok(key * 10)
            }),
            Box::new(move |_| {
                e.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
    }

    #[test]
    fn test_get_loads_once_per_residency() {
        let loads = Arc::new(AtomicUsize::new(0));
        let evicts = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(0, loads.clone(), evicts.clone());

        assert_eq!(cache.get(3).unwrap(), 30);
        assert_eq!(cache.get(3).unwrap(), 30);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // Two references outstanding; first release keeps the entry.
        cache.release(3).unwrap();
        assert_eq!(evicts.load(Ordering::SeqCst), 0);
        assert_eq!(cache.len(), 1);

        cache.release(3).unwrap();
        assert_eq!(evicts.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 0);

        // Re-fetch after full release loads again.
        assert_eq!(cache.get(3).unwrap(), 30);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_capacity_bound() {
        let loads = Arc::new(AtomicUsize::new(0));
        let evicts = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(2, loads, evicts);

        cache.get(1).unwrap();
        cache.get(2).unwrap();

        match cache.get(3) {
            Err(StorageError::CacheFull { capacity }) => assert_eq!(capacity, 2),
            other => panic!("expected CacheFull, got {:?}", other),
        }

        // Releasing frees a slot.
        cache.release(1).unwrap();
        cache.get(3).unwrap();
    }

    #[test]
    fn test_load_failure_unwinds_reservation() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let cache: ResourceCache<u64> = ResourceCache::new(
            1,
            Box::new(move |key| {
                if a.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StorageError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "transient",
                    )))
                } else {
                    Ok(key)
                }
            }),
            Box::new(|_| Ok(())),
        );

        assert!(cache.get(7).is_err());
        // The failed load must not leave a half-reserved slot behind.
        assert_eq!(cache.get(7).unwrap(), 7);
    }

    #[test]
    fn test_close_evicts_everything() {
        let loads = Arc::new(AtomicUsize::new(0));
        let evicts = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(0, loads, evicts.clone());

        cache.get(1).unwrap();
        cache.get(2).unwrap();
        cache.get(3).unwrap();

        cache.close().unwrap();
        assert_eq!(evicts.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_gives_up_busy_when_loader_stalls() {
        let cache: Arc<ResourceCache<u64>> = Arc::new(
            ResourceCache::new(
                0,
                Box::new(|key| {
                    // Stall well past the waiter's patience.
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(key)
                }),
                Box::new(|_| Ok(())),
            )
            .with_wait_attempts(5),
        );

        let loader = {
            let c = cache.clone();
            std::thread::spawn(move || c.get(9).unwrap())
        };
        // Let the loader take the loading marker before contending.
        std::thread::sleep(Duration::from_millis(20));

        match cache.get(9) {
            Err(StorageError::Busy { key }) => assert_eq!(key, 9),
            other => panic!("expected Busy, got {:?}", other),
        }

        // The stalled load itself still completes normally.
        assert_eq!(loader.join().unwrap(), 9);
        cache.release(9).unwrap();
    }

    #[test]
    fn test_failed_evict_still_removes_entry() {
        let loads = Arc::new(AtomicUsize::new(0));
        let evicts = Arc::new(AtomicUsize::new(0));
        let l = loads.clone();
        let e = evicts.clone();
        let cache: ResourceCache<u64> = ResourceCache::new(
            0,
            Box::new(move |key| {
                l.fetch_add(1, Ordering::SeqCst);
                Ok(key)
            }),
            Box::new(move |_| {
                if e.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StorageError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "flush failed",
                    )))
                } else {
                    Ok(())
                }
            }),
        );

        cache.get(4).unwrap();
        assert!(cache.release(4).is_err());

        // The entry must be gone: a later get loads fresh instead of
        // resurrecting a value whose flush just failed.
        assert!(cache.is_empty());
        assert_eq!(cache.get(4).unwrap(), 4);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        cache.release(4).unwrap();
    }

    #[test]
    fn test_concurrent_get_single_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let l = loads.clone();
        let cache: Arc<ResourceCache<u64>> = Arc::new(ResourceCache::new(
            0,
            Box::new(move |key| {
                l.fetch_add(1, Ordering::SeqCst);
                // Hold the loading marker long enough for other threads to
                // hit the wait path.
                std::thread::sleep(Duration::from_millis(10));
                Ok(key + 100)
            }),
            Box::new(|_| Ok(())),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = cache.clone();
            handles.push(std::thread::spawn(move || c.get(5).unwrap()));
        }
        for h in handles {
            assert_eq!(h.join().unwrap(), 105);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
