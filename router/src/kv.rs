// In-memory namespaced KV store
// Bounded-memory cache with TTL expiry, LRU eviction, and per-namespace
// key-count quotas. Holds cached quotes, rate-limit counters, circuit-breaker
// snapshots, and the ledger cursor.
//
// A single reader-writer lock guards the map, the recency list, and entry
// accounting; hit/miss/eviction counters and the byte gauge are atomics.
// Entries expire lazily on read and in a periodic background sweep.

use crate::errors::KvError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_MAX_BYTES: i64 = 512 * 1024 * 1024;
pub const DEFAULT_MAX_KEY_LENGTH: usize = 256;
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1024 * 1024;
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub const NS_QUOTES: &str = "quotes";
pub const NS_RATE_LIMITS: &str = "rate_limits";
pub const NS_CIRCUIT_BREAKER: &str = "circuit_breaker";
pub const NS_SYSTEM: &str = "system";

const LEDGER_INDEX_KEY: &str = "ledger_index";

/// Fixed per-namespace key-count quotas. Unknown namespaces are unlimited.
fn namespace_quota(namespace: &str) -> Option<i64> {
    match namespace {
        NS_QUOTES => Some(10_000),
        NS_RATE_LIMITS => Some(100_000),
        NS_CIRCUIT_BREAKER => Some(1_000),
        NS_SYSTEM => Some(128),
        _ => None,
    }
}

// Index-based doubly-linked recency list. Head is the most recently used
// entry; eviction pops the tail. Freed slots are recycled through a free
// list so long-lived stores do not grow the slab unboundedly.
const NIL: u32 = u32::MAX;

struct LruNode {
    prev: u32,
    next: u32,
    full_key: String,
}

struct LruList {
    nodes: Vec<LruNode>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
}

impl LruList {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    fn push_front(&mut self, full_key: String) -> u32 {
        let node = LruNode {
            prev: NIL,
            next: self.head,
            full_key,
        };
        let idx = match self.free.pop() {
            Some(i) => {
                self.nodes[i as usize] = node;
                i
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        };
        if self.head != NIL {
            self.nodes[self.head as usize].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
        idx
    }

    fn unlink(&mut self, idx: u32) {
        let (prev, next) = {
            let node = &self.nodes[idx as usize];
            (node.prev, node.next)
        };
        if prev != NIL {
            self.nodes[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn remove(&mut self, idx: u32) {
        self.unlink(idx);
        self.nodes[idx as usize].full_key.clear();
        self.free.push(idx);
    }

    fn move_to_front(&mut self, idx: u32) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        let node = &mut self.nodes[idx as usize];
        node.prev = NIL;
        node.next = self.head;
        let old_head = self.head;
        if old_head != NIL {
            self.nodes[old_head as usize].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn back(&self) -> Option<&str> {
        if self.tail == NIL {
            None
        } else {
            Some(&self.nodes[self.tail as usize].full_key)
        }
    }
}

struct Entry {
    namespace: String,
    key: String,
    value: Vec<u8>,
    expires_at: Option<Instant>,
    size: i64,
    lru: u32,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

struct KvInner {
    data: HashMap<String, Entry>,
    lru: LruList,
}

#[derive(Debug, Clone, Default)]
pub struct KvStats {
    pub total_keys: i64,
    pub current_bytes: i64,
    pub max_bytes: i64,
    pub evictions: u64,
    pub hits: u64,
    pub misses: u64,
    pub namespace_counts: HashMap<String, i64>,
}

pub struct MemoryStore {
    inner: RwLock<KvInner>,
    max_bytes: i64,
    max_key_length: usize,
    max_value_size: usize,
    current_bytes: AtomicI64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    stopped: AtomicBool,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_MAX_BYTES,
            DEFAULT_MAX_KEY_LENGTH,
            DEFAULT_MAX_VALUE_SIZE,
        )
    }

    pub fn with_config(max_bytes: i64, max_key_length: usize, max_value_size: usize) -> Self {
        Self {
            inner: RwLock::new(KvInner {
                data: HashMap::new(),
                lru: LruList::new(),
            }),
            max_bytes,
            max_key_length,
            max_value_size,
            current_bytes: AtomicI64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            cleanup_task: Mutex::new(None),
        }
    }

    /// Fetch a value. A hit refreshes the entry's recency; an expired entry
    /// is purged on discovery and reported as a miss.
    pub fn get(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        if namespace.is_empty() || key.is_empty() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let mut inner = self.write();
        let full_key = make_key(namespace, key);
        let now = Instant::now();

        let found = inner
            .data
            .get(&full_key)
            .map(|e| (e.is_expired(now), e.lru, e.value.clone()));

        match found {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some((true, _, _)) => {
                self.delete_entry_locked(&mut inner, &full_key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some((false, lru_idx, value)) => {
                inner.lru.move_to_front(lru_idx);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
        }
    }

    /// Insert or replace a value. Evicts from the LRU tail until the entry
    /// fits the byte budget; enforces the namespace key-count quota.
    pub fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        self.validate(namespace, key, value)?;

        let mut inner = self.write();
        self.check_namespace_quota(&inner, namespace)?;
        self.set_locked(&mut inner, namespace, key, value, ttl)
    }

    /// Remove an entry, erroring if it does not exist.
    pub fn delete(&self, namespace: &str, key: &str) -> Result<(), KvError> {
        if namespace.is_empty() || key.is_empty() {
            return Err(KvError::KeyEmpty);
        }

        let mut inner = self.write();
        let full_key = make_key(namespace, key);
        if !inner.data.contains_key(&full_key) {
            return Err(KvError::KeyNotFound);
        }
        self.delete_entry_locked(&mut inner, &full_key);
        Ok(())
    }

    /// Atomic read-modify-write of a partner's rate-limit counter. Resets to
    /// 1 when absent or expired, otherwise increments; returns the new count.
    pub fn increment_rate_limit(
        &self,
        partner_id: &str,
        ttl: Option<Duration>,
    ) -> Result<i64, KvError> {
        if partner_id.is_empty() {
            return Err(KvError::KeyEmpty);
        }

        let mut inner = self.write();
        let full_key = make_key(NS_RATE_LIMITS, partner_id);
        let now = Instant::now();

        let mut current: Option<Vec<u8>> = None;
        let mut purge_expired = false;
        if let Some(entry) = inner.data.get(&full_key) {
            if entry.is_expired(now) {
                purge_expired = true;
            } else {
                current = Some(entry.value.clone());
            }
        }
        if purge_expired {
            self.delete_entry_locked(&mut inner, &full_key);
        }

        let count = match current {
            None => 1,
            Some(value) => {
                let parsed: i64 = std::str::from_utf8(&value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(KvError::InvalidCounter)?;
                parsed + 1
            }
        };

        self.set_locked(
            &mut inner,
            NS_RATE_LIMITS,
            partner_id,
            count.to_string().as_bytes(),
            ttl,
        )?;
        Ok(count)
    }

    pub fn get_quote(&self, hash: &[u8; 32]) -> Option<Vec<u8>> {
        self.get(NS_QUOTES, &hex::encode(hash))
    }

    pub fn set_quote(&self, hash: &[u8; 32], route: &[u8], ttl: Duration) -> Result<(), KvError> {
        self.set(NS_QUOTES, &hex::encode(hash), route, Some(ttl))
    }

    pub fn set_ledger_index(&self, idx: u32) -> Result<(), KvError> {
        self.set(NS_SYSTEM, LEDGER_INDEX_KEY, idx.to_string().as_bytes(), None)
    }

    pub fn get_ledger_index(&self) -> Option<u32> {
        let value = self.get(NS_SYSTEM, LEDGER_INDEX_KEY)?;
        std::str::from_utf8(&value).ok()?.parse().ok()
    }

    /// Live (non-expired) keys in a namespace.
    pub fn keys(&self, namespace: &str) -> Vec<String> {
        let inner = self.read();
        let now = Instant::now();
        inner
            .data
            .values()
            .filter(|e| e.namespace == namespace && !e.is_expired(now))
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn stats(&self) -> KvStats {
        let inner = self.read();
        let now = Instant::now();

        let mut namespace_counts: HashMap<String, i64> = HashMap::new();
        let mut total_keys = 0i64;
        for entry in inner.data.values() {
            if !entry.is_expired(now) {
                *namespace_counts.entry(entry.namespace.clone()).or_insert(0) += 1;
                total_keys += 1;
            }
        }

        KvStats {
            total_keys,
            current_bytes: self.current_bytes.load(Ordering::Relaxed),
            max_bytes: self.max_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            namespace_counts,
        }
    }

    /// Start the periodic expiration sweep. The task holds only a weak
    /// reference, so dropping the store also ends the sweep.
    pub fn start_cleanup(self: &Arc<Self>) {
        let weak: Weak<MemoryStore> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(store) = weak.upgrade() else { break };
                if store.stopped.load(Ordering::Relaxed) {
                    break;
                }
                let purged = store.cleanup();
                if purged > 0 {
                    debug!(purged, "purged expired kv entries");
                }
            }
        });
        let mut guard = self.cleanup_task.lock().expect("cleanup handle lock");
        *guard = Some(handle);
    }

    /// Stop the background sweep. Safe to call repeatedly.
    pub fn close(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut guard = self.cleanup_task.lock().expect("cleanup handle lock");
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    /// One full expiration pass under the write lock; returns the number of
    /// entries purged.
    pub fn cleanup(&self) -> usize {
        let mut inner = self.write();
        let now = Instant::now();

        let expired: Vec<String> = inner
            .data
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        for full_key in &expired {
            self.delete_entry_locked(&mut inner, full_key);
        }
        expired.len()
    }

    fn validate(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), KvError> {
        if namespace.is_empty() {
            return Err(KvError::NamespaceEmpty);
        }
        if key.is_empty() {
            return Err(KvError::KeyEmpty);
        }
        if key.len() > self.max_key_length {
            return Err(KvError::KeyTooLong);
        }
        if value.len() > self.max_value_size {
            return Err(KvError::ValueTooLarge);
        }
        Ok(())
    }

    fn check_namespace_quota(&self, inner: &KvInner, namespace: &str) -> Result<(), KvError> {
        let Some(quota) = namespace_quota(namespace) else {
            return Ok(());
        };

        let now = Instant::now();
        let count = inner
            .data
            .values()
            .filter(|e| e.namespace == namespace && !e.is_expired(now))
            .count() as i64;

        if count >= quota {
            return Err(KvError::NamespaceQuota);
        }
        Ok(())
    }

    // Insert without validation or quota checks; callers hold the write lock.
    fn set_locked(
        &self,
        inner: &mut KvInner,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        let full_key = make_key(namespace, key);
        let entry_size = full_key.len() as i64 + value.len() as i64 + 64;

        if let Some(existing) = inner.data.remove(&full_key) {
            self.current_bytes.fetch_sub(existing.size, Ordering::Relaxed);
            inner.lru.remove(existing.lru);
        }

        while self.current_bytes.load(Ordering::Relaxed) + entry_size > self.max_bytes {
            if !self.evict_oldest(inner) {
                return Err(KvError::MemoryLimit);
            }
        }

        let expires_at = ttl.map(|d| Instant::now() + d);
        let lru = inner.lru.push_front(full_key.clone());
        inner.data.insert(
            full_key,
            Entry {
                namespace: namespace.to_string(),
                key: key.to_string(),
                value: value.to_vec(),
                expires_at,
                size: entry_size,
                lru,
            },
        );
        self.current_bytes.fetch_add(entry_size, Ordering::Relaxed);
        Ok(())
    }

    fn evict_oldest(&self, inner: &mut KvInner) -> bool {
        let Some(full_key) = inner.lru.back().map(str::to_string) else {
            return false;
        };
        if inner.data.contains_key(&full_key) {
            self.delete_entry_locked(inner, &full_key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn delete_entry_locked(&self, inner: &mut KvInner, full_key: &str) {
        if let Some(entry) = inner.data.remove(full_key) {
            inner.lru.remove(entry.lru);
            let after = self
                .current_bytes
                .fetch_sub(entry.size, Ordering::Relaxed)
                - entry.size;
            debug_assert!(after >= 0, "kv byte accounting went negative");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, KvInner> {
        self.inner.read().expect("kv lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, KvInner> {
        self.inner.write().expect("kv lock poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn make_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}
