//! Call-result caching
//!
//! Results are keyed by a sha256 over the identity and the canonical JSON
//! form of the arguments (object keys sorted recursively, so the key is
//! total and deterministic over JSON values). A memory LRU tier fronts an
//! optional disk mirror at `<cache_dir>/<key>.cache`; disk IO failures are
//! treated as misses and logged once per key. Under single-threaded use the
//! original runs at most once per `(identity, canonical args)` within the
//! ttl; concurrent first calls are not coalesced.

use super::context::{HijackContext, HijackResult};
use super::strategy::Priority;
use crate::error::Result;
use crate::function::NativeHandler;
use crate::identity::FunctionIdentity;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

/// One cached result
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: DateTime<Utc>,
}

/// Disk form at `<cache_dir>/<key>.cache`
#[derive(Serialize, Deserialize)]
struct DiskEntry {
    value: Value,
    created_at: DateTime<Utc>,
}

struct CacheState {
    entries: LruCache<String, CacheEntry, ahash::RandomState>,
    // Disk failures are logged once per offending key per process.
    reported_keys: HashSet<String>,
}

/// Caching interception strategy
pub struct CacheStrategy {
    ttl: Duration,
    dir: Option<PathBuf>,
    priority: Priority,
    state: Mutex<CacheState>,
}

impl CacheStrategy {
    /// Memory-only cache with the configured default capacity
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, crate::config::config().max_cache_entries)
    }

    /// Memory-only cache with an explicit capacity
    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            dir: None,
            priority: Priority::Normal,
            state: Mutex::new(CacheState {
                entries: LruCache::with_hasher(capacity, ahash::RandomState::new()),
                reported_keys: HashSet::new(),
            }),
        }
    }

    /// Mirror entries on disk under `dir`
    pub fn with_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Override the chain priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn priority(&self) -> Priority {
        self.priority
    }

    /// The configured ttl
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read-only probe: is a fresh value cached for this context?
    pub fn has_cached_value(&self, ctx: &HijackContext) -> bool {
        let key = cache_key(&ctx.identity, &ctx.args, &ctx.kwargs);
        {
            let state = self.state.lock();
            if let Some(entry) = state.entries.peek(&key) {
                if self.is_fresh(entry.created_at) {
                    return true;
                }
            }
        }
        self.read_disk(&key).is_some()
    }

    /// Number of live in-memory entries
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the memory tier is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all in-memory entries (disk files are left in place)
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub(crate) fn handle(
        &self,
        ctx: &HijackContext,
        original: &NativeHandler,
    ) -> Result<HijackResult> {
        let key = cache_key(&ctx.identity, &ctx.args, &ctx.kwargs);

        // Memory tier; expired entries are purged on read.
        {
            let mut state = self.state.lock();
            match state.entries.get(&key).cloned() {
                Some(entry) if self.is_fresh(entry.created_at) => {
                    return Ok(HijackResult::produced(entry.value)
                        .with_meta("cache_hit", Value::Bool(true))
                        .with_meta("cache_tier", Value::String("memory".into())));
                }
                Some(_) => {
                    state.entries.pop(&key);
                }
                None => {}
            }
        }

        // Disk tier; hits are promoted into memory.
        if let Some(entry) = self.read_disk(&key) {
            self.state.lock().entries.put(key.clone(), entry.clone());
            return Ok(HijackResult::produced(entry.value)
                .with_meta("cache_hit", Value::Bool(true))
                .with_meta("cache_tier", Value::String("disk".into())));
        }

        // Miss: run the original exactly once. A failure is the call
        // outcome, not a strategy fault, and is never cached.
        let value = match original(&ctx.call_args()) {
            Ok(value) => value,
            Err(record) => return Ok(HijackResult::failed(record)),
        };

        let entry = CacheEntry { value: value.clone(), created_at: Utc::now() };
        self.write_disk(&key, &entry);
        self.state.lock().entries.put(key, entry);

        Ok(HijackResult::produced(value).with_meta("cache_hit", Value::Bool(false)))
    }

    fn is_fresh(&self, created_at: DateTime<Utc>) -> bool {
        let age = Utc::now() - created_at;
        age < ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::MAX)
    }

    fn read_disk(&self, key: &str) -> Option<CacheEntry> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(format!("{key}.cache"));
        if !path.exists() {
            return None;
        }
        let parsed: std::io::Result<DiskEntry> = std::fs::read_to_string(&path)
            .and_then(|text| serde_json::from_str(&text).map_err(std::io::Error::other));
        match parsed {
            Ok(disk) if self.is_fresh(disk.created_at) => {
                Some(CacheEntry { value: disk.value, created_at: disk.created_at })
            }
            Ok(_) => {
                let _ = std::fs::remove_file(&path);
                None
            }
            Err(e) => {
                self.report_disk_error(key, &e.to_string());
                None
            }
        }
    }

    fn write_disk(&self, key: &str, entry: &CacheEntry) {
        let Some(dir) = self.dir.as_ref() else { return };
        let disk = DiskEntry { value: entry.value.clone(), created_at: entry.created_at };
        let outcome = std::fs::create_dir_all(dir)
            .and_then(|()| serde_json::to_string(&disk).map_err(std::io::Error::other))
            .and_then(|text| std::fs::write(dir.join(format!("{key}.cache")), text));
        if let Err(e) = outcome {
            self.report_disk_error(key, &e.to_string());
        }
    }

    fn report_disk_error(&self, key: &str, message: &str) {
        let mut state = self.state.lock();
        if state.reported_keys.insert(key.to_string()) {
            tracing::debug!(key, message, "cache disk IO failed; treating as miss");
        }
    }
}

/// Deterministic key over identity + canonical argument form
pub fn cache_key(
    identity: &FunctionIdentity,
    args: &[Value],
    kwargs: &serde_json::Map<String, Value>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.full_name().as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_json(&Value::Array(args.to_vec())).as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_json(&Value::Object(kwargs.clone())).as_bytes());
    hex::encode(hasher.finalize())
}

/// Render a value with object keys sorted recursively, so equal values
/// always produce equal text.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}
