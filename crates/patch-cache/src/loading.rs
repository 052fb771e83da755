//! Loading cache with in-flight deduplication.
//!
//! Values are published as `Arc<V>` and never mutated afterwards. A miss
//! registers an in-flight slot for its key; concurrent callers for the same
//! key wait on that slot instead of loading again. Entries are evicted in
//! LRU order once their total weight exceeds the limit, and optionally
//! written through to a [`LayerStore`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::LayerConfig;
use crate::persist::{LayerStore, PersistentStore};
use crate::CacheError;

/// Approximate memory footprint of a cached value.
pub trait Weigh {
    fn weight(&self) -> u64;
}

/// Counters of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Computations run by the loader.
    pub loads: u64,
    pub load_failures: u64,
    pub evictions: u64,
}

type Outcome<V> = Result<Arc<V>, CacheError>;

/// A computation other callers can wait on.
struct Flight<V> {
    outcome: Mutex<Option<Outcome<V>>>,
    done: Condvar,
}

impl<V> Flight<V> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn finish(&self, outcome: Outcome<V>) {
        let mut slot = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome<V> {
        let mut slot = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

struct State<K: Hash + Eq, V> {
    entries: LruCache<K, (Arc<V>, u64)>,
    weight: u64,
    inflight: HashMap<K, Arc<Flight<V>>>,
}

impl<K: Hash + Eq, V> State<K, V> {
    /// Remove the in-flight slot for `key` if it still belongs to `flight`.
    /// A later caller may already have registered its own.
    fn land(&mut self, key: &K, flight: &Arc<Flight<V>>) {
        if self
            .inflight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            self.inflight.remove(key);
        }
    }
}

/// Removes the in-flight slot and wakes waiters even if the loader panics.
struct FlightGuard<'a, K: Hash + Eq + Clone, V> {
    cache: &'a LoadingCache<K, V>,
    key: &'a K,
    flight: Arc<Flight<V>>,
}

impl<K: Hash + Eq + Clone, V> Drop for FlightGuard<'_, K, V> {
    fn drop(&mut self) {
        self.cache.state().land(self.key, &self.flight);
        self.flight.finish(Err(CacheError::Worker(format!(
            "loader for cache {} did not complete",
            self.cache.name
        ))));
    }
}

/// A named, weight-bounded cache computing missing values with a loader.
pub struct LoadingCache<K: Hash + Eq, V> {
    name: &'static str,
    memory_limit: u64,
    state: Mutex<State<K, V>>,
    store: Option<LayerStore>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Clone + Serialize,
    V: Weigh + Serialize + DeserializeOwned,
{
    pub fn new(name: &'static str, memory_limit: u64) -> Self {
        Self {
            name,
            memory_limit,
            state: Mutex::new(State {
                entries: LruCache::unbounded(),
                weight: 0,
                inflight: HashMap::new(),
            }),
            store: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Write loaded values through to `store` and consult it on misses.
    pub fn with_store(mut self, store: LayerStore) -> Self {
        self.store = Some(store);
        self
    }

    /// A cache configured for one layer of the service. The layer persists
    /// only when asked to and a persistent store is available.
    pub fn for_layer(
        name: &'static str,
        version: u32,
        config: &LayerConfig,
        store: Option<&PersistentStore>,
    ) -> Result<Self, CacheError> {
        let cache = Self::new(name, config.memory_limit);
        match store {
            Some(store) if config.persist => Ok(cache.with_store(store.layer(name, version)?)),
            _ => Ok(cache),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the cached value for `key`, computing it with `loader` when
    /// absent. Concurrent calls for the same key share one computation;
    /// failures are reported to every waiting caller and are not cached.
    pub fn get<F>(&self, key: &K, loader: F) -> Result<Arc<V>, CacheError>
    where
        F: FnOnce(&K) -> Result<V, CacheError>,
    {
        let flight = {
            let mut state = self.state();
            if let Some((value, _)) = state.entries.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(value));
            }
            if let Some(flight) = state.inflight.get(key) {
                let flight = Arc::clone(flight);
                drop(state);
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache = self.name, "waiting on in-flight load");
                return flight.wait();
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            let flight = Arc::new(Flight::new());
            state.inflight.insert(key.clone(), Arc::clone(&flight));
            flight
        };
        let guard = FlightGuard {
            cache: self,
            key,
            flight,
        };

        let outcome = self.load(key, loader);
        {
            let mut state = self.state();
            if let Ok(value) = &outcome {
                self.publish(&mut state, key, Arc::clone(value));
            }
            state.land(key, &guard.flight);
        }
        guard.flight.finish(outcome.clone());
        outcome
    }

    /// Look up several keys, loading the missing ones one by one. A failure
    /// for one key does not affect the others.
    pub fn get_all<F>(&self, keys: &[K], mut loader: F) -> HashMap<K, Result<Arc<V>, CacheError>>
    where
        F: FnMut(&K) -> Result<V, CacheError>,
    {
        keys.iter()
            .map(|key| (key.clone(), self.get(key, &mut loader)))
            .collect()
    }

    /// The cached value, without loading.
    pub fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
        let mut state = self.state();
        state.entries.get(key).map(|(value, _)| Arc::clone(value))
    }

    pub fn invalidate(&self, key: &K) {
        let mut state = self.state();
        if let Some((_, weight)) = state.entries.pop(key) {
            state.weight -= weight;
        }
        drop(state);
        if let Some(store) = &self.store {
            store.remove(key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total weight of the entries held in memory.
    pub fn weight(&self) -> u64 {
        self.state().weight
    }

    fn load<F>(&self, key: &K, loader: F) -> Result<Arc<V>, CacheError>
    where
        F: FnOnce(&K) -> Result<V, CacheError>,
    {
        if let Some(value) = self.store.as_ref().and_then(|s| s.get::<K, V>(key)) {
            debug!(cache = self.name, "loaded entry from persistent store");
            return Ok(Arc::new(value));
        }

        self.loads.fetch_add(1, Ordering::Relaxed);
        match loader(key) {
            Ok(value) => {
                if let Some(store) = &self.store {
                    store.put(key, &value);
                }
                Ok(Arc::new(value))
            }
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                debug!(cache = self.name, error = %e, "load failed");
                Err(e)
            }
        }
    }

    fn publish(&self, state: &mut State<K, V>, key: &K, value: Arc<V>) {
        let weight = value.weight().max(1);
        if let Some((_, old)) = state.entries.put(key.clone(), (value, weight)) {
            state.weight -= old;
        }
        state.weight += weight;
        while state.weight > self.memory_limit && state.entries.len() > 1 {
            match state.entries.pop_lru() {
                Some((_, (_, evicted))) => {
                    state.weight -= evicted;
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }
}

impl<K: Hash + Eq, V> LoadingCache<K, V> {
    fn state(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Weigh> Weigh for Vec<T> {
    fn weight(&self) -> u64 {
        24 + self.iter().map(Weigh::weight).sum::<u64>()
    }
}
