//! In-Memory Key-Value Store
//!
//! Thread-safe LRU cache with TTL metadata and bounded active expiration.
//! Keys and values are opaque byte strings; nothing here assumes UTF-8.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use rand::Rng;

/// Default cap on the number of live entries
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Keys sampled per expiration batch
const SWEEP_SAMPLE: usize = 20;

/// Time budget for one expiration pass under the lock
const SWEEP_BUDGET: Duration = Duration::from_millis(25);

/// Entry in the store with value and optional expiration
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t < Instant::now())
    }
}

struct StoreInner {
    data: HashMap<Bytes, CacheEntry>,
    /// Recency order, most recently touched key at the front
    order: VecDeque<Bytes>,
    /// Keys carrying an expiration, sampled by the active sweeper
    with_ttl: HashSet<Bytes>,
    max_size: usize,
}

impl StoreInner {
    /// Remove a key from the map, the recency list, and the TTL set
    fn remove_entry(&mut self, key: &[u8]) -> bool {
        if self.data.remove(key).is_none() {
            return false;
        }
        if let Some(pos) = self.order.iter().position(|k| k.as_ref() == key) {
            self.order.remove(pos);
        }
        self.with_ttl.remove(key);
        true
    }

    fn touch(&mut self, key: &Bytes) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_front(key.clone());
    }

    fn set(&mut self, key: Bytes, value: Bytes, expires_at: Option<Instant>) {
        if let Some(entry) = self.data.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            self.touch(&key);

            if expires_at.is_some() {
                self.with_ttl.insert(key);
            } else {
                self.with_ttl.remove(&key);
            }
            return;
        }

        if expires_at.is_some() {
            self.with_ttl.insert(key.clone());
        }
        self.order.push_front(key.clone());
        self.data.insert(key, CacheEntry { value, expires_at });

        if self.order.len() > self.max_size {
            self.evict_lru();
        }
    }

    /// Remove the least recently used entry (back of the recency list)
    fn evict_lru(&mut self) {
        if let Some(victim) = self.order.pop_back() {
            self.data.remove(&victim);
            self.with_ttl.remove(&victim);
        }
    }
}

/// Thread-safe LRU cache with TTL support.
///
/// All operations acquire a single mutex for their duration; the handle is
/// cheap to clone and shared across connection tasks.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create a store with the default entry cap
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_SIZE)
    }

    /// Create a store holding at most `max_size` entries
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                data: HashMap::new(),
                order: VecDeque::new(),
                with_ttl: HashSet::new(),
                max_size,
            })),
        }
    }

    /// Store a key-value pair without expiration.
    ///
    /// An upsert over a TTL-bearing key clears the TTL: permanence is
    /// restored.
    pub fn set(&self, key: Bytes, value: Bytes) {
        let mut inner = self.inner.lock().unwrap();
        inner.set(key, value, None);
    }

    /// Store a key-value pair that expires after `ttl`
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();
        let expires_at = Instant::now() + ttl;
        inner.set(key, value, Some(expires_at));
    }

    /// Get a value by key, lazily expiring it if its TTL has passed.
    ///
    /// A hit moves the key to the front of the recency order.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let mut inner = self.inner.lock().unwrap();

        let (stored_key, expired) = match inner.data.get_key_value(key) {
            None => return None,
            Some((k, entry)) => (k.clone(), entry.is_expired()),
        };

        if expired {
            inner.remove_entry(&stored_key);
            return None;
        }

        inner.touch(&stored_key);
        Some(inner.data[&stored_key].value.clone())
    }

    /// Delete a key, returning whether it was present
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.remove_entry(key)
    }

    /// Point-in-time copy of all key-value pairs
    pub fn snapshot(&self) -> std::collections::HashMap<Bytes, Bytes> {
        let inner = self.inner.lock().unwrap();
        inner
            .data
            .iter()
            .map(|(k, entry)| (k.clone(), entry.value.clone()))
            .collect()
    }

    /// All keys in ascending byte order
    pub fn keys_sorted(&self) -> Vec<Bytes> {
        let inner = self.inner.lock().unwrap();
        let mut keys: Vec<Bytes> = inner.data.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total byte size of all keys and values
    pub fn total_bytes(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner
            .data
            .iter()
            .map(|(k, entry)| (k.len() + entry.value.len()) as u64)
            .sum()
    }

    /// One bounded active-expiration pass.
    ///
    /// Returns `None` when no keys carry a TTL, else the number of entries
    /// expired. Mirrors the Redis heuristic: sample up to 20 TTL keys at
    /// random, drop the expired ones, and repeat while more than a quarter
    /// of the sample was expired and the 25 ms budget holds. The lock is
    /// held for the whole pass and released on return.
    pub fn sweep_expired(&self) -> Option<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.with_ttl.is_empty() {
            return None;
        }

        let mut rng = rand::rng();
        let start = Instant::now();
        let mut total = 0;

        loop {
            let keys: Vec<Bytes> = inner.with_ttl.iter().cloned().collect();
            if keys.is_empty() {
                break;
            }

            let sample_size = keys.len().min(SWEEP_SAMPLE);
            let mut expired = 0;

            for _ in 0..sample_size {
                if start.elapsed() >= SWEEP_BUDGET {
                    break;
                }

                let key = &keys[rng.random_range(0..keys.len())];
                if inner.data.get(key).is_some_and(CacheEntry::is_expired) {
                    inner.remove_entry(key);
                    expired += 1;
                }
            }

            total += expired;

            let heavy = expired as f64 / sample_size as f64 > 0.25;
            if !(heavy && start.elapsed() <= SWEEP_BUDGET) {
                break;
            }
        }

        Some(total)
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let inner = self.inner.lock().unwrap();
        assert_eq!(inner.data.len(), inner.order.len());
        assert!(inner.order.len() <= inner.max_size);
        for key in &inner.order {
            assert!(inner.data.contains_key(key));
        }
        for key in &inner.with_ttl {
            assert!(inner.data[key].expires_at.is_some());
        }
        for (key, entry) in &inner.data {
            assert_eq!(entry.expires_at.is_some(), inner.with_ttl.contains(key));
        }
    }
}
