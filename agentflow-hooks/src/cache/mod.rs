// ABOUTME: Cache storage capability with fingerprint keys, size estimation, and eviction policies
// ABOUTME: In-memory implementation plus the CachingHook that intercepts chain execution

pub mod hook;

pub use hook::{CacheHookConfig, CacheHookStats, CachingHook};

use crate::result::HookResult;
use crate::types::HookPoint;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Fixed bookkeeping cost added to every entry's estimated size.
const ENTRY_OVERHEAD_BYTES: usize = 64;

/// How `evict` orders its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Ascending by last access time.
    Lru,
    /// Ascending by access count.
    Lfu,
    /// Ascending by creation time.
    Fifo,
    /// Descending by size (largest evicted first).
    Size,
    /// Lazy: only expired entries are removed.
    Ttl,
}

/// One cached hook result with access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub result: HookResult,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    pub size_bytes: usize,
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn new(key: String, result: HookResult, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        let size_bytes = estimate_result_size(&result) + ENTRY_OVERHEAD_BYTES;
        Self {
            key,
            result,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            size_bytes,
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.created_at.elapsed() > ttl,
            None => false,
        }
    }

    fn mark_accessed(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }
}

/// Storage capability consumed by the caching hook.
pub trait CacheStorage: Send + Sync {
    /// Lookup; updates access bookkeeping and lazily drops expired entries.
    fn get(&self, key: &str) -> Option<HookResult>;

    fn put(&self, key: String, result: HookResult, ttl: Option<Duration>);

    fn remove(&self, key: &str) -> bool;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn total_bytes(&self) -> usize;

    /// Removes entries in policy order until total size is at most
    /// `target_bytes`. A no-op when already within the target. Returns the
    /// number of evicted entries.
    fn evict(&self, policy: EvictionPolicy, target_bytes: usize) -> usize;
}

/// Thread-safe in-memory cache storage keyed by string fingerprint.
#[derive(Default)]
pub struct InMemoryCacheStorage {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for InMemoryCacheStorage {
    fn get(&self, key: &str) -> Option<HookResult> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => {
                entry.mark_accessed();
                Some(entry.result.clone())
            }
            None => None,
        }
    }

    fn put(&self, key: String, result: HookResult, ttl: Option<Duration>) {
        let entry = CacheEntry::new(key.clone(), result, ttl);
        self.entries.lock().insert(key, entry);
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn total_bytes(&self) -> usize {
        self.entries.lock().values().map(|e| e.size_bytes).sum()
    }

    fn evict(&self, policy: EvictionPolicy, target_bytes: usize) -> usize {
        let mut entries = self.entries.lock();
        let mut total: usize = entries.values().map(|e| e.size_bytes).sum();
        if total <= target_bytes {
            return 0;
        }

        if policy == EvictionPolicy::Ttl {
            let expired: Vec<String> = entries
                .values()
                .filter(|e| e.is_expired())
                .map(|e| e.key.clone())
                .collect();
            let count = expired.len();
            for key in expired {
                entries.remove(&key);
            }
            debug!(evicted = count, "removed expired cache entries");
            return count;
        }

        let mut candidates: Vec<(String, Instant, Instant, u64, usize)> = entries
            .values()
            .map(|e| {
                (
                    e.key.clone(),
                    e.last_accessed,
                    e.created_at,
                    e.access_count,
                    e.size_bytes,
                )
            })
            .collect();

        match policy {
            EvictionPolicy::Lru => candidates.sort_by_key(|c| c.1),
            EvictionPolicy::Lfu => candidates.sort_by_key(|c| c.3),
            EvictionPolicy::Fifo => candidates.sort_by_key(|c| c.2),
            EvictionPolicy::Size => candidates.sort_by(|a, b| b.4.cmp(&a.4)),
            EvictionPolicy::Ttl => unreachable!("handled above"),
        }

        let mut evicted = 0;
        for (key, _, _, _, size) in candidates {
            if total <= target_bytes {
                break;
            }
            entries.remove(&key);
            total = total.saturating_sub(size);
            evicted += 1;
        }

        debug!(evicted, policy = ?policy, "cache eviction complete");
        evicted
    }
}

/// Canonical JSON rendering with object keys sorted, so logically equal
/// payloads fingerprint identically.
pub fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// 64-bit FNV-1a over the point's wire name, the canonical input payload,
/// and optionally the canonical metadata map, rendered as 16 hex digits.
pub fn fingerprint(
    point: HookPoint,
    input: &JsonValue,
    metadata: Option<&HashMap<String, JsonValue>>,
) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    let mut write = |bytes: &[u8]| {
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };

    write(point.as_str().as_bytes());
    write(canonical_json(input).as_bytes());
    if let Some(metadata) = metadata {
        let as_value = JsonValue::Object(
            metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        write(canonical_json(&as_value).as_bytes());
    }

    format!("{:016x}", hash)
}

/// Byte estimate of a JSON value for eviction decisions: null=4, bool=5,
/// number=20, string=len+2, containers recurse with per-element delimiter
/// overhead.
pub fn estimate_json_size(value: &JsonValue) -> usize {
    match value {
        JsonValue::Null => 4,
        JsonValue::Bool(_) => 5,
        JsonValue::Number(_) => 20,
        JsonValue::String(s) => s.len() + 2,
        JsonValue::Array(items) => {
            2 + items.iter().map(|v| estimate_json_size(v) + 1).sum::<usize>()
        }
        JsonValue::Object(map) => {
            2 + map
                .iter()
                .map(|(k, v)| k.len() + 3 + estimate_json_size(v) + 1)
                .sum::<usize>()
        }
    }
}

fn estimate_result_size(result: &HookResult) -> usize {
    let mut size = 1; // continue flag
    if let Some(data) = &result.modified_data {
        size += estimate_json_size(data);
    }
    if let Some(metrics) = &result.metrics {
        size += estimate_json_size(metrics);
    }
    if let Some(error) = &result.error_info {
        size += error.message.len() + error.error_type.len() + 16;
    }
    size
}
