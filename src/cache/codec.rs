//! Value codec — converts storable values to and from their byte form.
//!
//! Stores deal exclusively in bytes; this module defines the closed set of
//! value kinds that can cross that boundary and how each is encoded:
//!
//! - **Raw bytes** (`Vec<u8>`, [`Bytes`], `String`) pass through unchanged.
//! - **Integers** of every width encode as base-10 decimal text, so
//!   increment/decrement arithmetic stays representable in byte- and
//!   string-oriented backends.
//! - **Structured values** wrap in [`Json`] and encode through `serde_json`.
//!
//! Dispatch is by trait implementation rather than runtime type inspection,
//! so a round-trip that cannot succeed fails to compile instead of failing
//! at decode time — and a decode into the wrong target type returns a
//! [`CodecError`] rather than corrupting the destination.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use super::pool::BufferPool;

/// Errors produced while encoding or decoding stored values.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not a decimal integer: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A value that can be persisted in a [`Store`](super::Store).
///
/// Implementations exist for raw byte containers, `String`, all primitive
/// integer widths, and — via the [`Json`] wrapper — any
/// `Serialize + DeserializeOwned` type.
///
/// # Examples
///
/// ```
/// use recache::cache::codec::CacheValue;
///
/// let mut buf = Vec::new();
/// 42_i64.encode_into(&mut buf).unwrap();
/// assert_eq!(buf, b"42");
/// assert_eq!(i64::decode(&buf).unwrap(), 42);
/// ```
pub trait CacheValue: Sized {
    /// Appends this value's byte encoding to `buf`.
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Reconstructs a value from its byte encoding.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

impl CacheValue for Vec<u8> {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        buf.extend_from_slice(self);
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

impl CacheValue for Bytes {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        buf.extend_from_slice(self);
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

impl CacheValue for String {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}

macro_rules! integer_cache_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheValue for $ty {
                fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
                    buf.extend_from_slice(self.to_string().as_bytes());
                    Ok(())
                }

                fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
                    Ok(std::str::from_utf8(bytes)?.parse::<$ty>()?)
                }
            }
        )*
    };
}

integer_cache_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Wrapper selecting the structured (JSON) encoding for an arbitrary
/// serde-compatible value.
///
/// # Examples
///
/// ```
/// use recache::cache::codec::{CacheValue, Json};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, PartialEq, Debug)]
/// struct Session {
///     user: String,
///     visits: u32,
/// }
///
/// let session = Json(Session { user: "ada".into(), visits: 3 });
/// let mut buf = Vec::new();
/// session.encode_into(&mut buf).unwrap();
///
/// let back = Json::<Session>::decode(&buf).unwrap().into_inner();
/// assert_eq!(back.visits, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwraps the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> CacheValue for Json<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        serde_json::to_writer(&mut *buf, &self.0)?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Json(serde_json::from_slice(bytes)?))
    }
}

/// Encodes `value` through a pooled scratch buffer and returns an owned,
/// exactly-sized copy of the encoding.
pub fn serialize<V: CacheValue>(value: &V, pool: &BufferPool) -> Result<Vec<u8>, CodecError> {
    let mut buf = pool.acquire();
    value.encode_into(&mut buf)?;
    Ok(buf.to_vec())
}

/// Decodes a value of type `V` from its byte encoding.
pub fn deserialize<V: CacheValue>(bytes: &[u8]) -> Result<V, CodecError> {
    V::decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn bytes_pass_through() {
        let value: Vec<u8> = b"\x00\x01binary\xff".to_vec();
        let mut buf = Vec::new();
        value.encode_into(&mut buf).unwrap();
        assert_eq!(buf, value);
        assert_eq!(Vec::<u8>::decode(&buf).unwrap(), value);
    }

    #[test]
    fn bytes_type_round_trip() {
        let value = Bytes::from_static(b"frozen");
        let mut buf = Vec::new();
        value.encode_into(&mut buf).unwrap();
        assert_eq!(Bytes::decode(&buf).unwrap(), value);
    }

    #[test]
    fn string_round_trip() {
        let value = String::from("héllo wörld");
        let mut buf = Vec::new();
        value.encode_into(&mut buf).unwrap();
        assert_eq!(String::decode(&buf).unwrap(), value);
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let err = String::decode(b"\xff\xfe").unwrap_err();
        assert!(matches!(err, CodecError::Utf8(_)));
    }

    #[test]
    fn integers_encode_as_decimal_text() {
        let mut buf = Vec::new();
        12345_u32.encode_into(&mut buf).unwrap();
        assert_eq!(buf, b"12345");

        buf.clear();
        (-987_i32).encode_into(&mut buf).unwrap();
        assert_eq!(buf, b"-987");
    }

    #[test]
    fn integer_round_trips_across_widths() {
        let mut buf = Vec::new();
        i64::MIN.encode_into(&mut buf).unwrap();
        assert_eq!(i64::decode(&buf).unwrap(), i64::MIN);

        buf.clear();
        u64::MAX.encode_into(&mut buf).unwrap();
        assert_eq!(u64::decode(&buf).unwrap(), u64::MAX);

        buf.clear();
        42_usize.encode_into(&mut buf).unwrap();
        assert_eq!(usize::decode(&buf).unwrap(), 42);
    }

    #[test]
    fn integer_decode_rejects_junk() {
        assert!(matches!(
            i64::decode(b"not-a-number").unwrap_err(),
            CodecError::ParseInt(_)
        ));
    }

    #[test]
    fn integer_decode_rejects_overflow() {
        // 300 fits in the source width but not the target width.
        assert!(matches!(
            i8::decode(b"300").unwrap_err(),
            CodecError::ParseInt(_)
        ));
        assert!(matches!(
            u8::decode(b"-1").unwrap_err(),
            CodecError::ParseInt(_)
        ));
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        name: String,
        count: u32,
        tags: Vec<String>,
    }

    #[test]
    fn structured_round_trip() {
        let value = Json(Payload {
            name: "widget".into(),
            count: 7,
            tags: vec!["a".into(), "b".into()],
        });
        let mut buf = Vec::new();
        value.encode_into(&mut buf).unwrap();

        let back = Json::<Payload>::decode(&buf).unwrap().into_inner();
        assert_eq!(back.name, "widget");
        assert_eq!(back.count, 7);
        assert_eq!(back.tags.len(), 2);
    }

    #[test]
    fn structured_decode_rejects_mismatched_shape() {
        let err = Json::<Payload>::decode(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn serialize_goes_through_the_pool() {
        let pool = BufferPool::new();
        let encoded = serialize(&99_i64, &pool).unwrap();
        assert_eq!(encoded, b"99");
        // scratch buffer went back to the free list
        assert_eq!(pool.idle_count(), 1);

        let decoded: i64 = deserialize(&encoded).unwrap();
        assert_eq!(decoded, 99);
    }
}
