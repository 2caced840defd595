//! Scope-partitioned key-value storage shared by the session caches.
//!
//! Every entry lives under a [`ScopedKey`]: the owning [`Scope`], the scope's
//! generation at insert time, and the cache-specific key. Invalidating a scope
//! bumps its generation, which makes all of its existing entries unreachable
//! at once without scanning the store; capacity eviction reclaims them later.
//!
//! Generations come from one store-wide counter and are never reused, so the
//! per-scope generation table can be bounded too: a scope whose generation was
//! evicted simply draws a fresh one and cannot see its older entries.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use gridfetch_core::Scope;
use quick_cache::sync::Cache;

/// Full key of a stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedKey<K> {
    pub scope: Scope,
    pub generation: u64,
    pub key: K,
}

/// Concurrent cache storage keyed by `(scope, key)`.
///
/// Used as `Arc<dyn CacheStore<K, V>>` so the result and distinct-value
/// caches can be handed any backing store.
pub trait CacheStore<K, V>: Send + Sync {
    /// Returns the live entry for `key` in `scope`.
    fn get(&self, scope: &Scope, key: &K) -> Option<V>;

    /// Stores `value` under the scope's current generation.
    fn insert(&self, scope: &Scope, key: K, value: V);

    /// Stores `value` only if the scope is still at `generation`.
    ///
    /// Returns `false` when the scope was invalidated in the meantime, so a
    /// computation that started before an invalidation is never cached after it.
    fn insert_at(&self, scope: &Scope, generation: u64, key: K, value: V) -> bool;

    fn remove(&self, scope: &Scope, key: &K);

    /// Makes every entry of `scope` unreachable.
    fn invalidate_scope(&self, scope: &Scope);

    /// Current generation of `scope`. Opaque; changes on every invalidation.
    fn generation(&self, scope: &Scope) -> u64;

    /// Number of stored entries, including unreachable ones not yet evicted.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// QuickCacheStore
// ---------------------------------------------------------------------------

/// [`CacheStore`] backed by a bounded `quick_cache` cache.
pub struct QuickCacheStore<K, V> {
    entries: Cache<ScopedKey<K>, V>,
    generations: Cache<Scope, u64>,
    next_generation: AtomicU64,
}

impl<K, V> QuickCacheStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a store holding at most `capacity` entries across all scopes,
    /// and tracking the generations of at most as many scopes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity.max(1)),
            generations: Cache::new(capacity.max(1)),
            next_generation: AtomicU64::new(0),
        }
    }

    fn fresh_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    fn scoped(&self, scope: &Scope, generation: u64, key: K) -> ScopedKey<K> {
        ScopedKey {
            scope: scope.clone(),
            generation,
            key,
        }
    }
}

impl<K, V> CacheStore<K, V> for QuickCacheStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, scope: &Scope, key: &K) -> Option<V> {
        let scoped = self.scoped(scope, self.generation(scope), key.clone());
        self.entries.get(&scoped)
    }

    fn insert(&self, scope: &Scope, key: K, value: V) {
        let scoped = self.scoped(scope, self.generation(scope), key);
        self.entries.insert(scoped, value);
    }

    fn insert_at(&self, scope: &Scope, generation: u64, key: K, value: V) -> bool {
        if self.generation(scope) != generation {
            return false;
        }
        self.entries
            .insert(self.scoped(scope, generation, key), value);
        true
    }

    fn remove(&self, scope: &Scope, key: &K) {
        let scoped = self.scoped(scope, self.generation(scope), key.clone());
        self.entries.remove(&scoped);
    }

    fn invalidate_scope(&self, scope: &Scope) {
        self.generations.insert(scope.clone(), self.fresh_generation());
    }

    fn generation(&self, scope: &Scope) -> u64 {
        if let Some(generation) = self.generations.get(scope) {
            return generation;
        }
        // Untracked or evicted: anything stored under an older generation of
        // this scope must stay unreachable.
        let generation = self.fresh_generation();
        self.generations.insert(scope.clone(), generation);
        generation
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
