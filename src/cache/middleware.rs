//! Caching middleware — store injection and transparent page caching.
//!
//! Two stages compose with the middleware chain:
//!
//! - [`StoreMiddleware`] attaches the active [`Store`] to the request
//!   context so handlers can reach it through [`shared_store`].
//! - [`CacheMiddleware`] performs the hit/miss orchestration: evaluate the
//!   skip predicate, derive the key, replay a stored response on hit, and
//!   on miss run the rest of the chain with the interceptor capturing its
//!   output.
//!
//! Cache stages receive their store explicitly at construction; nothing in
//! the caching path discovers state through the request context.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::http::Response;
use crate::middleware::{Middleware, Next};

use super::Ttl;
use super::key::{JsonFieldKey, KeyStrategy, PAGE_CACHE_PREFIX, UrlKey};
use super::pool::BufferPool;
use super::store::{Store, StoreExt};
use super::writer::{BufferedWriter, CachedResponse, CachedWriter, ResponseWriter};

/// TTL applied when a [`Config`] does not override it.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(5);

/// Per-request predicate deciding whether caching is bypassed entirely.
pub type Skipper = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Cache stage configuration.
///
/// Immutable once the stage is constructed. Defaults: entries expire after
/// [`DEFAULT_EXPIRATION`], no request is skipped, and stored headers are
/// not replayed on hits.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recache::cache::Config;
///
/// let config = Config::new()
///     .expire(Duration::from_secs(30))
///     .replay_headers(true)
///     .skip(|ctx| !ctx.request().method().is_safe());
/// ```
#[derive(Clone)]
pub struct Config {
    expire: Duration,
    skipper: Skipper,
    replay_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expire: DEFAULT_EXPIRATION,
            skipper: Arc::new(|_| false),
            replay_headers: false,
        }
    }
}

impl Config {
    /// Creates a configuration with the defaults described above.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long captured responses stay valid.
    #[must_use]
    pub fn expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    /// Sets the skip predicate. Requests it matches bypass lookup and
    /// capture completely.
    #[must_use]
    pub fn skip<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.skipper = Arc::new(skipper);
        self
    }

    /// Controls whether stored headers are applied to replayed responses.
    /// Off by default: a hit serves the captured status and body only.
    #[must_use]
    pub fn replay_headers(mut self, replay: bool) -> Self {
        self.replay_headers = replay;
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("expire", &self.expire)
            .field("replay_headers", &self.replay_headers)
            .finish_non_exhaustive()
    }
}

/// Middleware that exposes a [`Store`] to downstream handlers via the
/// request context.
///
/// Cache stages do not use this — they are handed their store directly.
/// Install it when handlers themselves need cache access (counters,
/// manual invalidation) without threading the store through application
/// state.
pub struct StoreMiddleware {
    store: Arc<dyn Store>,
}

impl StoreMiddleware {
    /// Creates the injection stage for `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl Middleware for StoreMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let store = self.store.clone();
        Box::pin(async move {
            let mut ctx = ctx;
            ctx.extensions_mut().insert::<Arc<dyn Store>>(store);
            next.run(ctx).await
        })
    }
}

/// Fetches the store previously attached by [`StoreMiddleware`], if any.
pub fn shared_store(ctx: &Context) -> Option<Arc<dyn Store>> {
    ctx.extensions().get::<Arc<dyn Store>>().cloned()
}

/// Transparent page-caching middleware.
///
/// On each request (unless skipped) it derives a key with its
/// [`KeyStrategy`] and looks the key up:
///
/// - **hit** — the stored response is replayed immediately; the rest of
///   the chain never runs.
/// - **miss** — the chain runs, and the produced response streams through
///   a [`CachedWriter`], which persists it if it qualifies (status 200,
///   all writes clean). The response reaching the client is rebuilt from
///   the same sink, so delivery is unchanged whether or not the capture
///   succeeded.
///
/// Any lookup failure — absent key, backend error, undecodable entry — is
/// treated as a miss. Serving fresh content always wins over caching.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use recache::cache::{CacheMiddleware, Config, InMemoryStore, Store};
///
/// let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(Duration::from_secs(60)));
///
/// // key on the URL
/// let pages = CacheMiddleware::page(store.clone(), Config::default());
///
/// // key on fields of a JSON request body
/// let queries = CacheMiddleware::json_post(
///     store,
///     Config::new().expire(Duration::from_secs(10)),
///     ["id", "page"],
/// );
/// ```
pub struct CacheMiddleware {
    store: Arc<dyn Store>,
    config: Config,
    strategy: Arc<dyn KeyStrategy>,
    pool: BufferPool,
}

impl CacheMiddleware {
    /// URL-keyed cache stage: identical targets share an entry.
    pub fn page(store: Arc<dyn Store>, config: Config) -> Self {
        Self::with_strategy(store, config, Arc::new(UrlKey::default()))
    }

    /// Body-keyed cache stage for JSON endpoints: requests with identical
    /// values at `fields` share an entry.
    pub fn json_post<I, S>(store: Arc<dyn Store>, config: Config, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_strategy(
            store,
            config,
            Arc::new(JsonFieldKey::new(PAGE_CACHE_PREFIX, fields)),
        )
    }

    /// Cache stage with a caller-supplied key strategy.
    pub fn with_strategy(
        store: Arc<dyn Store>,
        config: Config,
        strategy: Arc<dyn KeyStrategy>,
    ) -> Self {
        Self {
            store,
            config,
            strategy,
            pool: BufferPool::new(),
        }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let store = self.store.clone();
        let config = self.config.clone();
        let strategy = self.strategy.clone();
        let pool = self.pool.clone();

        Box::pin(async move {
            if (config.skipper)(&ctx) {
                return next.run(ctx).await;
            }

            let key = strategy.derive(ctx.request());
            match store.get::<CachedResponse>(&key) {
                Ok(entry) => {
                    tracing::debug!(%key, "cache hit");
                    return entry.into_response(config.replay_headers);
                }
                Err(err) if err.is_miss() => {
                    tracing::debug!(%key, "cache miss");
                }
                Err(err) => {
                    tracing::debug!(%key, error = %err, "cache lookup failed, treating as miss");
                }
            }

            let response = next.run(ctx).await;
            let (status, headers, body) = response.into_parts();

            let mut writer = CachedWriter::new(
                BufferedWriter::new(),
                store,
                key,
                Ttl::After(config.expire),
                pool,
            );
            *writer.headers_mut() = headers;
            writer.write_header(status);
            if let Err(err) = writer.write(&body) {
                tracing::warn!(error = %err, "response sink rejected body bytes");
            }
            writer.finish().into_response()
        })
    }
}
