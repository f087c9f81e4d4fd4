//! # recache
//!
//! Transparent response caching middleware for async HTTP/1.1 pipelines.
//!
//! A [`cache::CacheMiddleware`] sits in front of a handler, derives a cache
//! key from each request, and serves stored `200 OK` responses without
//! invoking the handler again. Misses pass through untouched; the response
//! is captured on its way back out. A broken cache backend never breaks a
//! request: lookups fall through to the handler and failed writes are only
//! logged.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use recache::cache::{CacheMiddleware, Config, InMemoryStore, Store, StoreMiddleware};
//! use recache::middleware::{LoggerMiddleware, Pipeline};
//! use recache::{Request, Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(std::time::Duration::from_secs(60)));
//!
//!     let pipeline = Pipeline::new()
//!         .wrap(LoggerMiddleware)
//!         .wrap(StoreMiddleware::new(store.clone()))
//!         .wrap(CacheMiddleware::page(store, Config::default()))
//!         .handle(|_ctx| async {
//!             Response::new(StatusCode::Ok).body("Hello, World!")
//!         });
//!
//!     let raw = b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n";
//!     let (request, _) = Request::parse(raw).unwrap();
//!     let response = pipeline.dispatch(request).await;
//!     assert_eq!(response.status(), StatusCode::Ok);
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheError, CacheMiddleware, Config, InMemoryStore, Store, StoreExt, Ttl};
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{Middleware, Next, Pipeline};
