//! Store contract — TTL-aware key-value persistence for cached values.
//!
//! [`Store`] is the object-safe, byte-oriented contract every backend
//! implements; [`StoreExt`] layers the typed codec on top via a blanket
//! impl, so `Arc<dyn Store>` gets the generic `get`/`set`/`add`/`replace`
//! methods for free. Backends translate their internal error vocabulary
//! into the canonical [`CacheError`] kinds so callers never match on
//! backend-specific strings.

use thiserror::Error;

use super::Ttl;
use super::codec::{CacheValue, CodecError};

/// Canonical cache error kinds.
///
/// Only [`Miss`](Self::Miss) and [`NotStored`](Self::NotStored) carry
/// contract-level meaning callers branch on; everything else degrades to
/// "serve without caching" somewhere up the stack.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key is absent (or expired). Expected and non-fatal.
    #[error("cache entry not found")]
    Miss,

    /// An `add` hit an existing key, or a `replace` found none.
    #[error("cache entry not stored")]
    NotStored,

    /// The backend does not implement this operation.
    #[error("operation not supported by this cache backend")]
    NotSupported,

    /// A value failed to encode or decode.
    #[error("cache codec error: {0}")]
    Codec(#[from] CodecError),

    /// Backend-specific failure (I/O, arithmetic, connectivity).
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// Returns `true` for the expected key-absent case.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    /// Returns `true` when an `add`/`replace` precondition failed.
    pub fn is_not_stored(&self) -> bool {
        matches!(self, Self::NotStored)
    }
}

/// TTL-aware key-value storage for serialized cache entries.
///
/// All operations are keyed by a string and synchronous; backends are
/// expected to be fast and local, or to bound their own latency. Every
/// method must be safe to call concurrently from multiple tasks.
///
/// The contract is byte-oriented so the trait stays object-safe; use the
/// blanket [`StoreExt`] methods for typed access.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recache::cache::{InMemoryStore, Store, StoreExt, Ttl};
///
/// let store = InMemoryStore::new(Duration::from_secs(60));
/// store.set("greeting", &String::from("hello"), Ttl::Forever).unwrap();
///
/// let back: String = store.get("greeting").unwrap();
/// assert_eq!(back, "hello");
///
/// store.delete("greeting").unwrap();
/// assert!(store.get_raw("greeting").unwrap_err().is_miss());
/// ```
pub trait Store: Send + Sync {
    /// Fetches the raw bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Miss`] if the key is absent or expired.
    fn get_raw(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    /// Unconditionally stores `value` under `key`. Upserts over any
    /// existing entry.
    fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError>;

    /// Stores `value` only if `key` has no live entry.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotStored`] if a live (unexpired) entry already exists.
    fn add_raw(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError>;

    /// Stores `value` only if `key` already has a live entry.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotStored`] if the key is absent or expired.
    fn replace_raw(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError>;

    /// Removes the entry under `key`. Absence is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically adds `delta` to the integer entry under `key` and returns
    /// the new value. The entry's remaining TTL is preserved.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Miss`] if the key is absent or expired.
    /// - [`CacheError::Backend`] if the stored value is not integer-shaped
    ///   or the arithmetic would overflow.
    fn increment(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    /// Atomically subtracts `delta` from the integer entry under `key` and
    /// returns the new value. Same error contract as
    /// [`increment`](Self::increment).
    fn decrement(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    /// Removes every entry unconditionally.
    fn flush(&self) -> Result<(), CacheError>;
}

/// Typed access layered over any [`Store`] via the value codec.
///
/// Implemented blanket-style for every `Store`, sized or not, so these
/// methods are available on `Arc<dyn Store>` without downcasting.
pub trait StoreExt: Store {
    /// Fetches and decodes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Miss`] if absent; [`CacheError::Codec`] if the stored
    /// bytes do not decode as `V`.
    fn get<V: CacheValue>(&self, key: &str) -> Result<V, CacheError> {
        let bytes = self.get_raw(key)?;
        Ok(V::decode(&bytes)?)
    }

    /// Encodes `value` and unconditionally stores it under `key`.
    fn set<V: CacheValue>(&self, key: &str, value: &V, ttl: Ttl) -> Result<(), CacheError> {
        self.set_raw(key, encode(value)?, ttl)
    }

    /// Encodes `value` and stores it only if `key` has no live entry.
    fn add<V: CacheValue>(&self, key: &str, value: &V, ttl: Ttl) -> Result<(), CacheError> {
        self.add_raw(key, encode(value)?, ttl)
    }

    /// Encodes `value` and stores it only if `key` already has a live entry.
    fn replace<V: CacheValue>(&self, key: &str, value: &V, ttl: Ttl) -> Result<(), CacheError> {
        self.replace_raw(key, encode(value)?, ttl)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

fn encode<V: CacheValue>(value: &V) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    value.encode_into(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::InMemoryStore;

    // Typed-layer behavior over a live backend; backend-specific semantics
    // are covered in the memory/expiring test modules.

    fn store() -> Arc<dyn Store> {
        Arc::new(InMemoryStore::new(Duration::from_secs(60)))
    }

    #[test]
    fn typed_methods_work_through_a_trait_object() {
        let store = store();
        store.set("count", &41_i64, Ttl::Forever).unwrap();
        assert_eq!(store.increment("count", 1).unwrap(), 42);
        let value: i64 = store.get("count").unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn typed_get_surfaces_codec_errors() {
        let store = store();
        store
            .set("text", &String::from("not a number"), Ttl::Forever)
            .unwrap();
        let err = store.get::<i64>("text").unwrap_err();
        assert!(matches!(err, CacheError::Codec(_)));
    }

    #[test]
    fn error_predicates() {
        assert!(CacheError::Miss.is_miss());
        assert!(!CacheError::Miss.is_not_stored());
        assert!(CacheError::NotStored.is_not_stored());
        assert!(!CacheError::Backend("boom".into()).is_miss());
    }

    #[test]
    fn errors_render_stable_messages() {
        assert_eq!(CacheError::Miss.to_string(), "cache entry not found");
        assert_eq!(CacheError::NotStored.to_string(), "cache entry not stored");
    }
}
