//! Transparent response caching — keys, stores, capture, and replay.
//!
//! The caching engine sits between the middleware chain and route
//! handlers. For each request it derives a deterministic key
//! ([`key`]), consults a TTL-aware [`Store`], and either replays the
//! captured response or lets the handler run while the interceptor
//! ([`writer`]) persists its output for next time. Values cross the store
//! boundary through an explicit codec ([`codec`]), and scratch buffers
//! come from a shared pool ([`pool`]).
//!
//! ## Core types
//!
//! - [`Store`] / [`StoreExt`] — the byte-oriented backend contract and its
//!   typed layer.
//! - [`InMemoryStore`] — bundled process-local backend over a sharded
//!   expiring map.
//! - [`CacheMiddleware`] — hit/miss orchestration around the rest of the
//!   chain.
//! - [`StoreMiddleware`] — exposes the store to handlers through the
//!   request context.
//! - [`Ttl`] — per-entry expiration policy.
//!
//! ## Planned Features
//!
//! - Redis-backed store adapter behind the same [`Store`] contract
//! - Entry compression for large captured bodies
//! - Stale-while-revalidate replay mode

use std::time::Duration;

pub mod codec;
pub mod expiring;
pub mod key;
pub mod memory;
pub mod middleware;
pub mod pool;
pub mod store;
pub mod writer;

pub use codec::{CacheValue, CodecError, Json};
pub use key::{JsonFieldKey, KeyStrategy, UrlKey};
pub use memory::InMemoryStore;
pub use middleware::{
    CacheMiddleware, Config, DEFAULT_EXPIRATION, Skipper, StoreMiddleware, shared_store,
};
pub use pool::{BufferPool, PooledBuf};
pub use store::{CacheError, Store, StoreExt};
pub use writer::{BufferedWriter, CachedResponse, CachedWriter, ResponseWriter};

/// How long a store entry stays valid.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recache::cache::Ttl;
///
/// let explicit = Ttl::After(Duration::from_secs(30));
/// let converted: Ttl = Duration::from_secs(30).into();
/// assert_eq!(explicit, converted);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expire after the store's configured default.
    Default,
    /// Never expire.
    Forever,
    /// Expire after the given duration.
    After(Duration),
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::After(duration)
    }
}
