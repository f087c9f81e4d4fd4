//! Response interception — capture successful responses as they are written.
//!
//! [`CachedWriter`] decorates any [`ResponseWriter`]. Every call forwards to
//! the wrapped writer first, so delivery to the client never waits on (or
//! fails because of) caching. Successfully forwarded bytes accumulate in a
//! pooled buffer, and when the interceptor is consumed with
//! [`CachedWriter::finish`] — and only if every forward succeeded and the
//! recorded status is `200 OK` — the whole capture is persisted as one
//! [`CachedResponse`] under the derived key. Chunked writes therefore
//! coalesce into a single store entry holding the complete body; a 200 with
//! an empty body is stored as an empty-body entry.
//!
//! A store or encoding failure at `finish` is reported through
//! `tracing::warn!` and otherwise ignored: caching is best-effort.
//!
//! [`BufferedWriter`] is the bundled terminal sink; it records status,
//! headers, and body, and converts back into a [`Response`] losslessly.

use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Ttl;
use super::codec::{self, CacheValue, CodecError};
use super::pool::{BufferPool, PooledBuf};
use super::store::Store;
use crate::http::{Headers, Response, StatusCode};

/// A captured response: status, headers, and the complete body.
///
/// Created by [`CachedWriter::finish`] for 200 responses and read back on
/// cache hits. Encodes through the structured codec path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl CachedResponse {
    /// Rebuilds a [`Response`] for replay. Stored headers are applied only
    /// when `replay_headers` is set; the body and status are always
    /// replayed verbatim.
    pub fn into_response(self, replay_headers: bool) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::Ok);
        let mut response = Response::new(status).body_bytes(self.body);
        if replay_headers {
            for (name, value) in self.headers.iter() {
                response.add_header(name, value);
            }
        }
        response
    }
}

impl CacheValue for CachedResponse {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        serde_json::to_writer(&mut *buf, self)?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The writer surface the interceptor decorates.
///
/// Mirrors the shape of a streaming response writer: headers are mutable
/// until the body starts, [`write_header`](Self::write_header) records the
/// status, and [`write`](Self::write) appends body bytes, reporting how
/// many were accepted.
pub trait ResponseWriter: Send {
    /// The response headers as currently set.
    fn headers(&self) -> &Headers;

    /// Mutable access to the response headers.
    fn headers_mut(&mut self) -> &mut Headers;

    /// Records the response status.
    fn write_header(&mut self, status: StatusCode);

    /// Appends body bytes, returning how many were written.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// The status recorded so far, if any.
    fn status(&self) -> Option<StatusCode>;
}

/// Terminal [`ResponseWriter`] that buffers everything in memory.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    status: Option<StatusCode>,
    headers: Headers,
    body: Vec<u8>,
}

impl BufferedWriter {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts the buffered state into a [`Response`]. An unset status
    /// defaults to `200 OK`, matching the implicit status of a handler
    /// that writes a body without setting one.
    pub fn into_response(self) -> Response {
        Response::from_parts(
            self.status.unwrap_or(StatusCode::Ok),
            self.headers,
            self.body,
        )
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

/// Decorator that captures a 200 response while forwarding it unchanged.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use recache::cache::{BufferPool, BufferedWriter, CachedWriter, InMemoryStore, ResponseWriter, Store, Ttl};
/// use recache::http::StatusCode;
///
/// let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(Duration::from_secs(60)));
/// let mut writer = CachedWriter::new(
///     BufferedWriter::new(),
///     store.clone(),
///     "page:/demo",
///     Ttl::Forever,
///     BufferPool::new(),
/// );
///
/// writer.write_header(StatusCode::Ok);
/// writer.write(b"hello").unwrap();
/// let sink = writer.finish();
///
/// assert!(store.get_raw("page:/demo").is_ok());
/// assert_eq!(sink.into_response().body_slice(), b"hello");
/// ```
pub struct CachedWriter<W> {
    inner: W,
    store: Arc<dyn Store>,
    key: String,
    expire: Ttl,
    pool: BufferPool,
    captured: PooledBuf,
    status: Option<StatusCode>,
    clean: bool,
}

impl<W: ResponseWriter> CachedWriter<W> {
    /// Wraps `inner`, capturing into `store` under `key` with the given
    /// TTL. `pool` supplies the capture and serialization buffers.
    pub fn new(
        inner: W,
        store: Arc<dyn Store>,
        key: impl Into<String>,
        expire: Ttl,
        pool: BufferPool,
    ) -> Self {
        let captured = pool.acquire();
        Self {
            inner,
            store,
            key: key.into(),
            expire,
            pool,
            captured,
            status: None,
            clean: true,
        }
    }

    /// Returns `true` once a status has been recorded.
    pub fn written(&self) -> bool {
        self.status.is_some()
    }

    /// Consumes the interceptor, persisting the capture if it qualifies,
    /// and returns the wrapped writer.
    ///
    /// The store write is attempted synchronously; by the time `finish`
    /// returns the entry is either persisted or the failure has been
    /// logged. Either way the wrapped writer comes back untouched.
    pub fn finish(self) -> W {
        if self.clean && self.status == Some(StatusCode::Ok) {
            let entry = CachedResponse {
                status: StatusCode::Ok.as_u16(),
                headers: self.inner.headers().clone(),
                body: self.captured.to_vec(),
            };
            match codec::serialize(&entry, &self.pool) {
                Ok(payload) => {
                    if let Err(err) = self.store.set_raw(&self.key, payload, self.expire) {
                        tracing::warn!(key = %self.key, error = %err, "failed to store captured response");
                    }
                }
                Err(err) => {
                    tracing::warn!(key = %self.key, error = %err, "failed to encode captured response");
                }
            }
        }
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for CachedWriter<W> {
    fn headers(&self) -> &Headers {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status = Some(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        // Forward before capturing; a capture problem must never delay or
        // break delivery.
        match self.inner.write(data) {
            Ok(written) => {
                self.captured.extend_from_slice(&data[..written]);
                Ok(written)
            }
            Err(err) => {
                self.clean = false;
                Err(err)
            }
        }
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::store::CacheError;
    use crate::cache::{InMemoryStore, StoreExt};

    fn memory_store() -> Arc<dyn Store> {
        Arc::new(InMemoryStore::new(Duration::from_secs(60)))
    }

    fn interceptor(store: Arc<dyn Store>) -> CachedWriter<BufferedWriter> {
        CachedWriter::new(
            BufferedWriter::new(),
            store,
            "test-key",
            Ttl::Forever,
            BufferPool::new(),
        )
    }

    /// Store stub whose writes always fail.
    struct BrokenStore;

    impl Store for BrokenStore {
        fn get_raw(&self, _key: &str) -> Result<Vec<u8>, CacheError> {
            Err(CacheError::Miss)
        }
        fn set_raw(&self, _key: &str, _value: Vec<u8>, _ttl: Ttl) -> Result<(), CacheError> {
            Err(CacheError::Backend("injected failure".into()))
        }
        fn add_raw(&self, _key: &str, _value: Vec<u8>, _ttl: Ttl) -> Result<(), CacheError> {
            Err(CacheError::Backend("injected failure".into()))
        }
        fn replace_raw(&self, _key: &str, _value: Vec<u8>, _ttl: Ttl) -> Result<(), CacheError> {
            Err(CacheError::Backend("injected failure".into()))
        }
        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }
        fn increment(&self, _key: &str, _delta: i64) -> Result<i64, CacheError> {
            Err(CacheError::NotSupported)
        }
        fn decrement(&self, _key: &str, _delta: i64) -> Result<i64, CacheError> {
            Err(CacheError::NotSupported)
        }
        fn flush(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    // ── buffered sink ────────────────────────────────────────────────────

    #[test]
    fn buffered_writer_round_trips_a_response() {
        let mut writer = BufferedWriter::new();
        writer.headers_mut().insert("Content-Type", "text/html");
        writer.write_header(StatusCode::Created);
        writer.write(b"created").unwrap();

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::Created);
        assert_eq!(response.headers().get("content-type"), Some("text/html"));
        assert_eq!(response.body_slice(), b"created");
    }

    #[test]
    fn buffered_writer_defaults_to_ok() {
        let mut writer = BufferedWriter::new();
        writer.write(b"implicit").unwrap();
        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::Ok);
    }

    // ── capture gating ───────────────────────────────────────────────────

    #[test]
    fn stores_a_200_response_at_finish() {
        let store = memory_store();
        let mut writer = interceptor(store.clone());
        writer.write_header(StatusCode::Ok);
        writer.write(b"ok").unwrap();
        assert!(writer.written());
        writer.finish();

        let entry: CachedResponse = store.get("test-key").unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body, b"ok");
    }

    #[test]
    fn chunked_writes_coalesce_into_one_entry() {
        let store = memory_store();
        let mut writer = interceptor(store.clone());
        writer.write_header(StatusCode::Ok);
        writer.write(b"chunk one, ").unwrap();
        writer.write(b"chunk two, ").unwrap();
        writer.write(b"chunk three").unwrap();
        let sink = writer.finish();

        let entry: CachedResponse = store.get("test-key").unwrap();
        assert_eq!(entry.body, b"chunk one, chunk two, chunk three");
        assert_eq!(sink.into_response().body_slice(), b"chunk one, chunk two, chunk three");
    }

    #[test]
    fn non_200_responses_are_not_stored() {
        let store = memory_store();
        let mut writer = interceptor(store.clone());
        writer.write_header(StatusCode::InternalServerError);
        writer.write(b"boom").unwrap();
        let sink = writer.finish();

        // delivered unchanged, never persisted
        assert_eq!(sink.into_response().body_slice(), b"boom");
        assert!(store.get_raw("test-key").unwrap_err().is_miss());
    }

    #[test]
    fn nothing_is_stored_without_a_status() {
        let store = memory_store();
        let mut writer = interceptor(store.clone());
        writer.write(b"body without header").unwrap();
        writer.finish();
        assert!(store.get_raw("test-key").unwrap_err().is_miss());
    }

    #[test]
    fn empty_200_body_is_stored_as_empty_entry() {
        let store = memory_store();
        let mut writer = interceptor(store.clone());
        writer.write_header(StatusCode::Ok);
        writer.write(b"").unwrap();
        writer.finish();

        let entry: CachedResponse = store.get("test-key").unwrap();
        assert!(entry.body.is_empty());
    }

    #[test]
    fn headers_are_captured_with_the_entry() {
        let store = memory_store();
        let mut writer = interceptor(store.clone());
        writer.headers_mut().insert("Content-Type", "application/json");
        writer.headers_mut().insert("X-Trace", "abc123");
        writer.write_header(StatusCode::Ok);
        writer.write(b"{}").unwrap();
        writer.finish();

        let entry: CachedResponse = store.get("test-key").unwrap();
        assert_eq!(entry.headers.get("content-type"), Some("application/json"));
        assert_eq!(entry.headers.get("x-trace"), Some("abc123"));
    }

    // ── failure isolation ────────────────────────────────────────────────

    #[test]
    fn store_failure_never_breaks_delivery() {
        let mut writer = CachedWriter::new(
            BufferedWriter::new(),
            Arc::new(BrokenStore),
            "test-key",
            Ttl::Forever,
            BufferPool::new(),
        );
        writer.write_header(StatusCode::Ok);
        let written = writer.write(b"still delivered").unwrap();
        assert_eq!(written, 15);

        let response = writer.finish().into_response();
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_slice(), b"still delivered");
    }

    // ── replay ───────────────────────────────────────────────────────────

    #[test]
    fn replay_without_headers_by_default_choice() {
        let entry = CachedResponse {
            status: 200,
            headers: {
                let mut h = Headers::new();
                h.insert("X-Cached-At", "yesterday");
                h
            },
            body: b"cached".to_vec(),
        };

        let bare = entry.clone().into_response(false);
        assert_eq!(bare.status(), StatusCode::Ok);
        assert_eq!(bare.body_slice(), b"cached");
        assert!(bare.headers().is_empty());

        let replayed = entry.into_response(true);
        assert_eq!(replayed.headers().get("x-cached-at"), Some("yesterday"));
    }

    #[test]
    fn replay_with_unknown_status_falls_back_to_ok() {
        let entry = CachedResponse {
            status: 299, // not a variant we model
            headers: Headers::new(),
            body: Vec::new(),
        };
        assert_eq!(entry.into_response(false).status(), StatusCode::Ok);
    }

    #[test]
    fn entry_round_trips_through_the_codec() {
        let entry = CachedResponse {
            status: 200,
            headers: {
                let mut h = Headers::new();
                h.insert("Content-Type", "text/plain");
                h
            },
            body: b"payload".to_vec(),
        };
        let mut buf = Vec::new();
        entry.encode_into(&mut buf).unwrap();
        assert_eq!(CachedResponse::decode(&buf).unwrap(), entry);
    }

    #[test]
    fn capture_buffers_return_to_the_pool() {
        let pool = BufferPool::new();
        let store = memory_store();
        let mut writer = CachedWriter::new(
            BufferedWriter::new(),
            store,
            "test-key",
            Ttl::Forever,
            pool.clone(),
        );
        writer.write_header(StatusCode::Ok);
        writer.write(b"pooled").unwrap();
        writer.finish();

        // capture buffer and serialization scratch both released
        assert_eq!(pool.idle_count(), 2);
    }
}
