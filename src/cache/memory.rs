//! In-memory [`Store`] over the expiring map engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::Ttl;
use super::expiring::{ExpiringMap, MapError};
use super::store::{CacheError, Store};

/// Process-local cache store with TTL support.
///
/// A thin adapter over [`ExpiringMap`]: each operation delegates to the
/// map's primitive and translates the map's error vocabulary into the
/// canonical [`CacheError`] kinds, so callers never see engine-level
/// errors. Entry expiry is lazy unless a janitor is running.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recache::cache::{InMemoryStore, Store, StoreExt, Ttl};
///
/// let store = InMemoryStore::new(Duration::from_secs(300));
/// store.set("sessions", &3_i64, Ttl::Default).unwrap();
/// assert_eq!(store.increment("sessions", 1).unwrap(), 4);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    map: Arc<ExpiringMap>,
    janitor: Option<JoinHandle<()>>,
}

impl InMemoryStore {
    /// Creates a store whose [`Ttl::Default`] entries expire after
    /// `default_expiration`. Expired entries are collected lazily, on the
    /// access that observes them.
    pub fn new(default_expiration: Duration) -> Self {
        Self {
            map: Arc::new(ExpiringMap::new(Some(default_expiration))),
            janitor: None,
        }
    }

    /// Like [`new`](Self::new), but additionally runs a background janitor
    /// that purges expired entries every `cleanup_interval`, so dead slots
    /// are reclaimed even if nothing reads them.
    ///
    /// Must be called from within a Tokio runtime. The janitor stops when
    /// the store is dropped.
    pub fn with_janitor(default_expiration: Duration, cleanup_interval: Duration) -> Self {
        let map = Arc::new(ExpiringMap::new(Some(default_expiration)));
        let janitor = ExpiringMap::spawn_janitor(&map, cleanup_interval);
        Self {
            map,
            janitor: Some(janitor),
        }
    }

    /// Number of slots currently held, including expired ones not yet
    /// collected.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the store holds no slots.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Drop for InMemoryStore {
    fn drop(&mut self) {
        if let Some(janitor) = self.janitor.take() {
            janitor.abort();
        }
    }
}

fn backend(err: MapError) -> CacheError {
    CacheError::Backend(err.to_string())
}

impl Store for InMemoryStore {
    fn get_raw(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.map.get(key).ok_or(CacheError::Miss)
    }

    fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError> {
        self.map.set(key, value, ttl);
        Ok(())
    }

    fn add_raw(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError> {
        self.map.add(key, value, ttl).map_err(|err| match err {
            MapError::AlreadyExists => CacheError::NotStored,
            other => backend(other),
        })
    }

    fn replace_raw(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError> {
        self.map.replace(key, value, ttl).map_err(|err| match err {
            MapError::NotFound => CacheError::NotStored,
            other => backend(other),
        })
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.map.remove(key);
        Ok(())
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.map.increment(key, delta).map_err(|err| match err {
            MapError::NotFound => CacheError::Miss,
            other => backend(other),
        })
    }

    fn decrement(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.map.decrement(key, delta).map_err(|err| match err {
            MapError::NotFound => CacheError::Miss,
            other => backend(other),
        })
    }

    fn flush(&self) -> Result<(), CacheError> {
        self.map.clear();
        Ok(())
    }
}
