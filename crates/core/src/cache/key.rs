//! Deterministic cache key generation.
//!
//! A key is `{namespace}:{digest}` where the digest is a SHA-256 over the
//! ordered parameter renderings. Parameters pass through `serde_json::Value`,
//! whose maps keep keys sorted, so structurally equal parameters always render
//! to the same bytes.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

const PARAM_SEPARATOR: &str = "|";

/// A namespaced cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key in `namespace`.
    pub fn builder(namespace: impl Into<String>) -> CacheKeyBuilder {
        CacheKeyBuilder { namespace: namespace.into(), params: Vec::new() }
    }

    /// Wrap an already rendered key, e.g. one read back from persistence.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace part of the key.
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map(|(ns, _)| ns).unwrap_or(&self.0)
    }

    /// Whether this key belongs to `namespace`.
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.0.len() > namespace.len() && self.0.starts_with(namespace) && self.0[namespace.len()..].starts_with(':')
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates the ordered parameters of a [`CacheKey`].
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: String,
    params: Vec<String>,
}

impl CacheKeyBuilder {
    /// Append a parameter.
    ///
    /// Strings render as-is; every other value renders as compact JSON. A value
    /// that fails to serialize renders as `null`.
    pub fn param<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        let rendered = match serde_json::to_value(value) {
            Ok(serde_json::Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "cache key parameter failed to serialize");
                serde_json::Value::Null.to_string()
            }
        };
        self.params.push(rendered);
        self
    }

    pub fn build(self) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(self.params.join(PARAM_SEPARATOR).as_bytes());
        CacheKey(format!("{}:{}", self.namespace, hex::encode(hasher.finalize())))
    }
}
