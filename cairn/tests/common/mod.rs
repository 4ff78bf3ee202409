//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cairn::{CacheDriver, CacheEvent, CacheItem, CacheKey, DriverError, EventSink, Raw};
use cairn_core::DriverResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use smol_str::SmolStr;

/// Installs a fmt subscriber so test failures come with the cache's debug
/// logs. Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Event sink that records everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CacheEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(key, graced)` pairs of every hit event, in order.
    pub fn hits(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                CacheEvent::Hit { key, graced, .. } => Some((key.as_str().to_owned(), graced)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CacheEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Hand-rolled in-memory driver with an operation log and failure injection,
/// for asserting tier ordering and error policy.
pub struct MemoryDriver {
    name: SmolStr,
    entries: Mutex<HashMap<CacheKey, (Raw, Option<DateTime<Utc>>)>>,
    ops: Arc<Mutex<Vec<String>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryDriver {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_ops(name, Arc::new(Mutex::new(Vec::new())))
    }

    /// A driver appending `"{name}:{op}:{key}"` entries to a shared log.
    pub fn with_ops(name: &str, ops: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: SmolStr::new(name),
            entries: Mutex::new(HashMap::new()),
            ops,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// The raw stored payload, ignoring expiry.
    pub fn raw(&self, key: &CacheKey) -> Option<Raw> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(raw, _)| raw.clone())
    }

    fn log(&self, op: &str, key: &CacheKey) {
        self.ops
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.name, op, key));
    }
}

#[async_trait]
impl CacheDriver for MemoryDriver {
    async fn get(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        self.log("get", key);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DriverError::connection("injected read failure"));
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .filter(|(_, deadline)| deadline.map_or(true, |d| Utc::now() < d))
            .map(|(raw, _)| raw.clone()))
    }

    async fn set(&self, key: &CacheKey, value: Raw, ttl: Option<Duration>) -> DriverResult<bool> {
        self.log("set", key);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DriverError::connection("injected write failure"));
        }
        let deadline =
            ttl.map(|ttl| Utc::now() + chrono::Duration::from_std(ttl).unwrap());
        self.entries.lock().unwrap().insert(key.clone(), (value, deadline));
        Ok(true)
    }

    async fn delete(&self, key: &CacheKey) -> DriverResult<bool> {
        self.log("delete", key);
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn clear(&self) -> DriverResult<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Serializes an item envelope with explicit expiry offsets from now, for
/// preloading tiers with fresh or stale entries.
pub fn envelope_at<T: Serialize>(
    key: &str,
    value: T,
    logical_offset_ms: i64,
    physical_offset_ms: i64,
    early_offset_ms: Option<i64>,
) -> Raw {
    let now = Utc::now();
    CacheItem::new(
        CacheKey::new(key),
        value,
        now + chrono::Duration::milliseconds(logical_offset_ms),
        now + chrono::Duration::milliseconds(physical_offset_ms),
        early_offset_ms.map(|ms| now + chrono::Duration::milliseconds(ms)),
    )
    .to_bytes()
    .unwrap()
}

/// Decodes a stored envelope back into an item.
pub fn decode<T: serde::de::DeserializeOwned>(key: &str, raw: &Raw) -> CacheItem<T> {
    CacheItem::from_bytes(CacheKey::new(key), raw).unwrap()
}
