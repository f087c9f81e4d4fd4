//! HTTP/1.1 response builder.
//!
//! Provides a fluent builder API for constructing responses in handlers,
//! plus structural accessors for middleware that inspects or rebuilds a
//! response on its way back up the chain.

use super::{Headers, StatusCode};

/// An HTTP/1.1 response as it travels through the middleware chain.
///
/// # Examples
///
/// ```
/// use recache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.body_slice(), br#"{"status":"ok"}"#);
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Reassembles a response from its parts, inverse of [`into_parts`](Self::into_parts).
    pub fn from_parts(status: StatusCode, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware pipelines that receive
    /// a `Response` from downstream and need to decorate it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body bytes.
    pub fn body_slice(&self) -> &[u8] {
        &self.body
    }

    /// Decomposes the response into `(status, headers, body)`.
    ///
    /// Middleware that needs to stream a finished response through a writer
    /// (rather than decorate it in place) takes it apart with this and puts
    /// it back together with [`from_parts`](Self::from_parts).
    pub fn into_parts(self) -> (StatusCode, Headers, Vec<u8>) {
        (self.status, self.headers, self.body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_status_header_and_body() {
        let r = Response::new(StatusCode::Created)
            .header("X-Request-Id", "abc-123")
            .body("Hello");

        assert_eq!(r.status(), StatusCode::Created);
        assert_eq!(r.headers().get("x-request-id"), Some("abc-123"));
        assert_eq!(r.body_slice(), b"Hello");
    }

    #[test]
    fn add_header_decorates_in_place() {
        let mut r = Response::new(StatusCode::Ok);
        r.add_header("X-Cache", "HIT");
        r.add_header("X-Cache", "STALE");
        let all: Vec<_> = r.headers().get_all("x-cache").collect();
        assert_eq!(all, vec!["HIT", "STALE"]);
    }

    #[test]
    fn body_bytes_accepts_raw_octets() {
        let r = Response::new(StatusCode::Ok).body_bytes(vec![0xde, 0xad]);
        assert_eq!(r.body_slice(), &[0xde, 0xad]);
    }

    #[test]
    fn parts_round_trip_is_lossless() {
        let original = Response::new(StatusCode::NotFound)
            .header("Content-Type", "text/plain")
            .body("gone");

        let (status, headers, body) = original.into_parts();
        let rebuilt = Response::from_parts(status, headers, body);

        assert_eq!(rebuilt.status(), StatusCode::NotFound);
        assert_eq!(rebuilt.headers().get("content-type"), Some("text/plain"));
        assert_eq!(rebuilt.body_slice(), b"gone");
    }

    #[test]
    fn default_is_empty_200() {
        let r = Response::default();
        assert_eq!(r.status(), StatusCode::Ok);
        assert!(r.body_slice().is_empty());
        assert!(r.headers().is_empty());
    }
}
