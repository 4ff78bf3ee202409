//! Cache events.
//!
//! Events are fire-and-forget notifications about cache activity, emitted
//! through an [`EventSink`]. Sinks must not block and must not fail the
//! operation that produced the event.

use bytes::Bytes;
use smol_str::SmolStr;

use crate::item::Raw;
use crate::key::CacheKey;

/// A cache lifecycle event.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A value was served from a tier or from a grace fallback.
    Hit {
        /// Key that was read.
        key: CacheKey,
        /// Serialized value as stored.
        value: Raw,
        /// Name of the stack or driver that served the value.
        store: SmolStr,
        /// Whether the value was logically expired and served under grace.
        graced: bool,
    },
    /// No servable value was found.
    Miss {
        /// Key that was read.
        key: CacheKey,
        /// Name of the stack or driver consulted.
        store: SmolStr,
    },
    /// A value was written through the stack.
    Written {
        /// Key that was written.
        key: CacheKey,
        /// Name of the stack or driver written to.
        store: SmolStr,
    },
    /// A value was deleted.
    Deleted {
        /// Key that was deleted.
        key: CacheKey,
        /// Name of the stack or driver deleted from.
        store: SmolStr,
    },
}

impl CacheEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hit { .. } => "cache.hit",
            Self::Miss { .. } => "cache.miss",
            Self::Written { .. } => "cache.written",
            Self::Deleted { .. } => "cache.deleted",
        }
    }

    /// The JSON-shaped payload of this event.
    ///
    /// For hits, `value` is the stored JSON envelope when it parses, and a
    /// null otherwise.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Hit {
                key,
                value,
                store,
                graced,
            } => serde_json::json!({
                "key": key.as_str(),
                "value": decode(value),
                "store": store.as_str(),
                "graced": graced,
            }),
            Self::Miss { key, store } => serde_json::json!({
                "key": key.as_str(),
                "store": store.as_str(),
            }),
            Self::Written { key, store } => serde_json::json!({
                "key": key.as_str(),
                "store": store.as_str(),
            }),
            Self::Deleted { key, store } => serde_json::json!({
                "key": key.as_str(),
                "store": store.as_str(),
            }),
        }
    }
}

fn decode(raw: &Bytes) -> serde_json::Value {
    serde_json::from_slice(raw).unwrap_or(serde_json::Value::Null)
}

/// Consumer of cache events.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Must be non-blocking.
    fn emit(&self, event: CacheEvent);

    /// Whether this sink wants events at all.
    ///
    /// Producers may skip building event payloads (which can involve
    /// serialization) when this returns `false`.
    fn enabled(&self) -> bool {
        true
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: CacheEvent) {}

    fn enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_payload_embeds_stored_json() {
        let event = CacheEvent::Hit {
            key: CacheKey::new("k"),
            value: Bytes::from_static(b"{\"value\":42}"),
            store: SmolStr::new("stack"),
            graced: true,
        };
        assert_eq!(event.name(), "cache.hit");
        let payload = event.to_json();
        assert_eq!(payload["key"], "k");
        assert_eq!(payload["graced"], true);
        assert_eq!(payload["value"]["value"], 42);
    }

    #[test]
    fn unparseable_hit_value_becomes_null() {
        let event = CacheEvent::Hit {
            key: CacheKey::new("k"),
            value: Bytes::from_static(b"\xff\xfe"),
            store: SmolStr::new("stack"),
            graced: false,
        };
        assert_eq!(event.to_json()["value"], serde_json::Value::Null);
    }
}
