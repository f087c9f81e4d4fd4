//! Cache key derivation from request identity.
//!
//! Two interchangeable strategies implement [`KeyStrategy`]:
//!
//! - [`UrlKey`] keys purely on the request target (path + query),
//!   percent-escaped.
//! - [`JsonFieldKey`] keys on selected fields extracted from a JSON request
//!   body, joined in configuration order.
//!
//! Both bound key length: once the derived component exceeds
//! [`MAX_KEY_COMPONENT_LEN`] characters it is replaced by the hex SHA-1
//! digest of the raw request target, keeping keys within backend key-size
//! limits while staying deterministic. Derivation reads the request through
//! a shared reference, so the body downstream handlers see is untouched.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use sha1::{Digest, Sha1};

use super::pool::BufferPool;
use crate::http::Request;

/// Namespace prefix used by the bundled page-cache strategies.
pub const PAGE_CACHE_PREFIX: &str = "recache.page";

/// Longest escaped/joined component embedded verbatim in a key; anything
/// longer is replaced by a digest.
pub const MAX_KEY_COMPONENT_LEN: usize = 200;

/// Everything except RFC 3986 unreserved characters gets percent-escaped.
const URL_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Derives a deterministic cache key from a request.
///
/// Implementations must be pure with respect to the request: identical
/// requests produce identical keys for the lifetime of the process.
///
/// # Examples
///
/// ```
/// use recache::cache::key::{KeyStrategy, UrlKey};
/// use recache::http::Request;
///
/// let raw = b"GET /reports?week=34 HTTP/1.1\r\nHost: x\r\n\r\n";
/// let (request, _) = Request::parse(raw).unwrap();
///
/// let strategy = UrlKey::default();
/// let key = strategy.derive(&request);
/// assert!(key.starts_with("recache.page:"));
/// assert_eq!(key, strategy.derive(&request));
/// ```
pub trait KeyStrategy: Send + Sync {
    /// Produces the cache key for `request`.
    fn derive(&self, request: &Request) -> String;
}

/// Keys on the percent-escaped request target: `{prefix}:{escaped-target}`.
///
/// Targets whose escaped form exceeds [`MAX_KEY_COMPONENT_LEN`] fall back
/// to `{prefix}:{hex-sha1-of-target}`.
pub struct UrlKey {
    prefix: String,
    pool: BufferPool,
}

impl UrlKey {
    /// Creates a URL strategy under the given namespace prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pool: BufferPool::new(),
        }
    }
}

impl Default for UrlKey {
    fn default() -> Self {
        Self::new(PAGE_CACHE_PREFIX)
    }
}

impl KeyStrategy for UrlKey {
    fn derive(&self, request: &Request) -> String {
        let target = request.uri();
        let escaped = utf8_percent_encode(&target, URL_SAFE).to_string();
        let component = if escaped.len() > MAX_KEY_COMPONENT_LEN {
            digest_hex(target.as_bytes())
        } else {
            escaped
        };
        join(&self.pool, &[&self.prefix, ":", &component])
    }
}

/// Keys on fields extracted from a JSON request body:
/// `{prefix}:{target}?{values-joined-with-commas}`.
///
/// Field paths are dotted (`user.id`, `items.0`); missing fields and
/// unparsable bodies contribute empty strings, so derivation always
/// succeeds. A joined component longer than [`MAX_KEY_COMPONENT_LEN`] is
/// replaced by the hex SHA-1 digest of the request target.
pub struct JsonFieldKey {
    prefix: String,
    fields: Vec<String>,
    pool: BufferPool,
}

impl JsonFieldKey {
    /// Creates a body-field strategy for the given prefix and ordered field
    /// paths.
    pub fn new<I, S>(prefix: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            pool: BufferPool::new(),
        }
    }

    fn joined_field_values(&self, request: &Request) -> String {
        if self.fields.is_empty() {
            return String::new();
        }
        let root: Option<Value> = serde_json::from_slice(request.body()).ok();
        let values: Vec<String> = self
            .fields
            .iter()
            .map(|field| {
                root.as_ref()
                    .and_then(|root| lookup(root, field))
                    .unwrap_or_default()
            })
            .collect();
        values.join(",")
    }
}

impl KeyStrategy for JsonFieldKey {
    fn derive(&self, request: &Request) -> String {
        let target = request.uri();
        let joined = self.joined_field_values(request);
        let component = if joined.len() > MAX_KEY_COMPONENT_LEN {
            digest_hex(target.as_bytes())
        } else {
            joined
        };
        join(&self.pool, &[&self.prefix, ":", &target, "?", &component])
    }
}

/// Walks a dotted path through a JSON document. Object keys match by name,
/// array steps by decimal index.
fn lookup(root: &Value, path: &str) -> Option<String> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(text_of(current))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn join(pool: &BufferPool, parts: &[&str]) -> String {
    let mut buf = pool.acquire();
    for part in parts {
        buf.extend_from_slice(part.as_bytes());
    }
    String::from_utf8_lossy(&buf).into_owned()
}
