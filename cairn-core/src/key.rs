//! Cache key type.
//!
//! Keys are opaque strings. [`CacheKey`] wraps [`SmolStr`] so short keys
//! (≤23 bytes) are stored inline without heap allocation and cloning is cheap.

use std::fmt;

use smol_str::SmolStr;

/// A key identifying a cached entry.
///
/// # Example
///
/// ```
/// use cairn_core::CacheKey;
///
/// let key = CacheKey::new("users:42");
/// assert_eq!(key.as_str(), "users:42");
/// assert_eq!(key.namespaced("tenant-a").as_str(), "tenant-a:users:42");
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CacheKey(SmolStr);

impl CacheKey {
    /// Creates a new key from any string-like value.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(SmolStr::new(key))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns a copy of this key prefixed with `{prefix}:`.
    pub fn namespaced(&self, prefix: &str) -> Self {
        Self(SmolStr::new(format!("{}:{}", prefix, self.0)))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(SmolStr::new(key))
    }
}

impl From<SmolStr> for CacheKey {
    fn from(key: SmolStr) -> Self {
        Self(key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_prefixes_key() {
        let key = CacheKey::new("k");
        assert_eq!(key.namespaced("ns").as_str(), "ns:k");
        // Nesting composes left-to-right.
        assert_eq!(key.namespaced("inner").namespaced("outer").as_str(), "outer:inner:k");
    }
}
