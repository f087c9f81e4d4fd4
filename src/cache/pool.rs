//! Reusable byte-buffer pool for key construction and entry serialization.
//!
//! Cache key assembly and entry encoding both need short-lived scratch
//! buffers on every request. [`BufferPool`] keeps a bounded free list of
//! `Vec<u8>` allocations so the hot path reuses capacity instead of
//! allocating, and [`PooledBuf`] scopes each borrow: the buffer is cleared
//! on acquisition, cleared again on release, and returned to the pool on
//! every exit path because release happens in `Drop`. A buffer cannot be
//! read after release — the guard owns it.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Upper bound on buffers kept on the free list.
const MAX_IDLE: usize = 32;

/// Buffers that grew beyond this are dropped instead of retained, so one
/// oversized response does not pin its allocation for the process lifetime.
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// A concurrent-safe pool of reusable byte buffers.
///
/// Cloning a `BufferPool` is cheap and yields a handle to the same free
/// list, so the pool can be shared across middleware instances and the
/// futures they spawn.
///
/// # Examples
///
/// ```
/// use recache::cache::BufferPool;
///
/// let pool = BufferPool::new();
/// let mut buf = pool.acquire();
/// buf.extend_from_slice(b"scratch");
/// assert_eq!(&buf[..], b"scratch");
/// drop(buf); // returned to the pool, contents cleared
/// ```
#[derive(Clone, Debug, Default)]
pub struct BufferPool {
    idle: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows a buffer from the pool, allocating a fresh one if the free
    /// list is empty. The returned buffer is always empty.
    pub fn acquire(&self) -> PooledBuf {
        let mut buf = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        buf.clear();
        PooledBuf {
            buf,
            pool: self.clone(),
        }
    }

    /// Returns the number of buffers currently sitting on the free list.
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        if buf.capacity() == 0 || buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE {
            idle.push(buf);
        }
    }
}

/// A scoped borrow of a pool buffer.
///
/// Dereferences to `Vec<u8>` for direct use with anything that writes into
/// a byte vector. Dropping the guard clears the buffer and hands it back to
/// the originating pool.
#[derive(Debug)]
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl PooledBuf {
    /// Copies the buffer contents into an owned `Vec<u8>` sized exactly to
    /// the data, leaving the pooled capacity behind for reuse.
    pub fn to_vec(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_returns_empty_buffer() {
        let pool = BufferPool::new();
        let buf = pool.acquire();
        assert!(buf.is_empty());
    }

    #[test]
    fn released_buffer_is_reused() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.extend_from_slice(b"hello world, give me some capacity");
        let cap = buf.capacity();
        drop(buf);

        assert_eq!(pool.idle_count(), 1);
        let again = pool.acquire();
        assert!(again.is_empty());
        assert_eq!(again.capacity(), cap);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn contents_cleared_between_borrows() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.extend_from_slice(b"secret");
        drop(buf);

        let next = pool.acquire();
        assert!(next.is_empty());
    }

    #[test]
    fn zero_capacity_buffers_are_not_retained() {
        let pool = BufferPool::new();
        let buf = pool.acquire(); // never written to, capacity 0
        drop(buf);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn oversized_buffers_are_dropped() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.reserve(MAX_RETAINED_CAPACITY + 1);
        drop(buf);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn free_list_is_bounded() {
        let pool = BufferPool::new();
        let mut held = Vec::new();
        for _ in 0..(MAX_IDLE + 8) {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"x");
            held.push(buf);
        }
        drop(held);
        assert_eq!(pool.idle_count(), MAX_IDLE);
    }

    #[test]
    fn to_vec_copies_out() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.extend_from_slice(b"payload");
        let owned = buf.to_vec();
        drop(buf);
        assert_eq!(owned, b"payload");
    }

    #[test]
    fn concurrent_borrows_do_not_interfere() {
        let pool = BufferPool::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.acquire();
                        assert!(buf.is_empty());
                        buf.extend_from_slice(format!("thread-{i}").as_bytes());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.idle_count() <= MAX_IDLE);
    }
}
