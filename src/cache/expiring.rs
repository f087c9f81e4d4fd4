//! Expiring concurrent map — the engine under the in-memory store.
//!
//! [`ExpiringMap`] keys string names to byte values with an optional
//! per-entry deadline. Storage is a sharded [`DashMap`], so concurrent
//! access serializes per shard rather than globally. Expiry is lazy: the
//! access that observes a dead entry removes it. A background janitor task
//! ([`ExpiringMap::spawn_janitor`]) can purge expired slots that nothing
//! reads; it holds only a weak handle, so dropping the map shuts it down.
//!
//! The map has its own error vocabulary ([`MapError`]); the store adapter
//! translates it into the canonical cache errors.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::Ttl;

/// Errors reported by map primitives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("entry not found")]
    NotFound,

    #[error("entry already exists")]
    AlreadyExists,

    #[error("entry is not an integer")]
    NotAnInteger,

    #[error("integer overflow")]
    Overflow,
}

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// A concurrent map of string keys to byte values with per-entry TTLs.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recache::cache::Ttl;
/// use recache::cache::expiring::ExpiringMap;
///
/// let map = ExpiringMap::new(Some(Duration::from_secs(30)));
/// map.set("visits", b"1".to_vec(), Ttl::Default);
/// assert_eq!(map.get("visits"), Some(b"1".to_vec()));
/// assert_eq!(map.increment("visits", 4).unwrap(), 5);
/// ```
#[derive(Debug)]
pub struct ExpiringMap {
    slots: DashMap<String, Slot>,
    default_ttl: Option<Duration>,
}

impl ExpiringMap {
    /// Creates an empty map. `default_ttl` is the deadline applied to
    /// entries stored with [`Ttl::Default`]; `None` means such entries
    /// never expire.
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            slots: DashMap::new(),
            default_ttl,
        }
    }

    fn deadline(&self, ttl: Ttl) -> Option<Instant> {
        match ttl {
            Ttl::After(duration) => Some(Instant::now() + duration),
            Ttl::Default => self.default_ttl.map(|duration| Instant::now() + duration),
            Ttl::Forever => None,
        }
    }

    /// Returns a copy of the live value under `key`, removing and ignoring
    /// an expired one.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            let slot = self.slots.get(key)?;
            if !slot.is_expired(now) {
                return Some(slot.value.clone());
            }
            // Read guard must drop before we take the shard write lock.
        }
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));
        None
    }

    /// Unconditionally stores `value` under `key`.
    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) {
        let expires_at = self.deadline(ttl);
        self.slots.insert(key.to_owned(), Slot { value, expires_at });
    }

    /// Stores `value` only if no live entry exists under `key`. An expired
    /// entry counts as absent and is overwritten.
    pub fn add(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), MapError> {
        let expires_at = self.deadline(ttl);
        let now = Instant::now();
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Slot { value, expires_at });
                    Ok(())
                } else {
                    Err(MapError::AlreadyExists)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot { value, expires_at });
                Ok(())
            }
        }
    }

    /// Stores `value` only if a live entry exists under `key`. An expired
    /// entry counts as absent and is removed.
    pub fn replace(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), MapError> {
        let expires_at = self.deadline(ttl);
        let now = Instant::now();
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    Err(MapError::NotFound)
                } else {
                    occupied.insert(Slot { value, expires_at });
                    Ok(())
                }
            }
            Entry::Vacant(_) => Err(MapError::NotFound),
        }
    }

    /// Removes the entry under `key`. Returns `true` if a slot was present,
    /// live or not.
    pub fn remove(&self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Adds `delta` to the integer entry under `key`, returning the new
    /// value. The entry's deadline is left untouched, so arithmetic never
    /// extends a TTL.
    pub fn increment(&self, key: &str, delta: i64) -> Result<i64, MapError> {
        self.apply_delta(key, delta, i64::checked_add)
    }

    /// Subtracts `delta` from the integer entry under `key`, returning the
    /// new value. Deadline handling matches [`increment`](Self::increment).
    pub fn decrement(&self, key: &str, delta: i64) -> Result<i64, MapError> {
        self.apply_delta(key, delta, i64::checked_sub)
    }

    fn apply_delta(
        &self,
        key: &str,
        delta: i64,
        op: fn(i64, i64) -> Option<i64>,
    ) -> Result<i64, MapError> {
        let now = Instant::now();
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    return Err(MapError::NotFound);
                }
                let current: i64 = std::str::from_utf8(&occupied.get().value)
                    .map_err(|_| MapError::NotAnInteger)?
                    .parse()
                    .map_err(|_| MapError::NotAnInteger)?;
                let next = op(current, delta).ok_or(MapError::Overflow)?;
                occupied.get_mut().value = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Vacant(_) => Err(MapError::NotFound),
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of slots currently held, including expired ones that no
    /// access or purge has collected yet.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no slots are held.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Removes every expired slot and returns how many were collected.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        before - self.slots.len()
    }

    /// Spawns a background task that purges expired slots every `every`.
    ///
    /// The task holds a [`Weak`] handle and exits on the first tick after
    /// the last strong reference to the map is dropped. Must be called
    /// from within a Tokio runtime; `every` must be non-zero.
    pub fn spawn_janitor(this: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(this);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(map) => {
                        let purged = map.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "janitor collected expired cache entries");
                        }
                    }
                    None => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn ttl(ms: u64) -> Ttl {
        Ttl::After(Duration::from_millis(ms))
    }

    // ── basic operations ─────────────────────────────────────────────────

    #[test]
    fn set_then_get() {
        let map = ExpiringMap::new(None);
        map.set("k", b"v".to_vec(), Ttl::Forever);
        assert_eq!(map.get("k"), Some(b"v".to_vec()));
    }

    #[test]
    fn get_absent() {
        let map = ExpiringMap::new(None);
        assert_eq!(map.get("nope"), None);
    }

    #[test]
    fn set_overwrites() {
        let map = ExpiringMap::new(None);
        map.set("k", b"old".to_vec(), Ttl::Forever);
        map.set("k", b"new".to_vec(), Ttl::Forever);
        assert_eq!(map.get("k"), Some(b"new".to_vec()));
    }

    #[test]
    fn remove_reports_presence() {
        let map = ExpiringMap::new(None);
        map.set("k", b"v".to_vec(), Ttl::Forever);
        assert!(map.remove("k"));
        assert!(!map.remove("k"));
        assert_eq!(map.get("k"), None);
    }

    #[test]
    fn clear_empties_the_map() {
        let map = ExpiringMap::new(None);
        map.set("a", b"1".to_vec(), Ttl::Forever);
        map.set("b", b"2".to_vec(), Ttl::Forever);
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get("a"), None);
    }

    // ── expiry ───────────────────────────────────────────────────────────

    #[test]
    fn entries_expire_after_deadline() {
        let map = ExpiringMap::new(None);
        map.set("k", b"v".to_vec(), ttl(30));
        assert_eq!(map.get("k"), Some(b"v".to_vec()));
        sleep(Duration::from_millis(60));
        assert_eq!(map.get("k"), None);
        // the observing get removed the slot
        assert!(map.is_empty());
    }

    #[test]
    fn default_ttl_applies_to_default_entries() {
        let map = ExpiringMap::new(Some(Duration::from_millis(30)));
        map.set("short", b"v".to_vec(), Ttl::Default);
        map.set("long", b"v".to_vec(), Ttl::Forever);
        sleep(Duration::from_millis(60));
        assert_eq!(map.get("short"), None);
        assert_eq!(map.get("long"), Some(b"v".to_vec()));
    }

    #[test]
    fn no_default_means_default_entries_live_forever() {
        let map = ExpiringMap::new(None);
        map.set("k", b"v".to_vec(), Ttl::Default);
        sleep(Duration::from_millis(40));
        assert_eq!(map.get("k"), Some(b"v".to_vec()));
    }

    #[test]
    fn purge_collects_only_expired_slots() {
        let map = ExpiringMap::new(None);
        map.set("dead", b"v".to_vec(), ttl(20));
        map.set("alive", b"v".to_vec(), Ttl::Forever);
        sleep(Duration::from_millis(50));
        assert_eq!(map.len(), 2); // nothing observed the expiry yet
        assert_eq!(map.purge_expired(), 1);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("alive"), Some(b"v".to_vec()));
    }

    // ── add / replace preconditions ──────────────────────────────────────

    #[test]
    fn add_fails_on_live_entry() {
        let map = ExpiringMap::new(None);
        assert_eq!(map.add("k", b"first".to_vec(), Ttl::Forever), Ok(()));
        assert_eq!(
            map.add("k", b"second".to_vec(), Ttl::Forever),
            Err(MapError::AlreadyExists)
        );
        assert_eq!(map.get("k"), Some(b"first".to_vec()));
    }

    #[test]
    fn add_succeeds_over_expired_entry() {
        let map = ExpiringMap::new(None);
        map.set("k", b"old".to_vec(), ttl(20));
        sleep(Duration::from_millis(50));
        assert_eq!(map.add("k", b"new".to_vec(), Ttl::Forever), Ok(()));
        assert_eq!(map.get("k"), Some(b"new".to_vec()));
    }

    #[test]
    fn replace_fails_when_absent() {
        let map = ExpiringMap::new(None);
        assert_eq!(
            map.replace("k", b"v".to_vec(), Ttl::Forever),
            Err(MapError::NotFound)
        );
    }

    #[test]
    fn replace_fails_on_expired_entry() {
        let map = ExpiringMap::new(None);
        map.set("k", b"old".to_vec(), ttl(20));
        sleep(Duration::from_millis(50));
        assert_eq!(
            map.replace("k", b"new".to_vec(), Ttl::Forever),
            Err(MapError::NotFound)
        );
        assert_eq!(map.get("k"), None);
    }

    #[test]
    fn replace_swaps_live_entry() {
        let map = ExpiringMap::new(None);
        map.set("k", b"old".to_vec(), Ttl::Forever);
        assert_eq!(map.replace("k", b"new".to_vec(), Ttl::Forever), Ok(()));
        assert_eq!(map.get("k"), Some(b"new".to_vec()));
    }

    // ── arithmetic ───────────────────────────────────────────────────────

    #[test]
    fn increment_and_decrement() {
        let map = ExpiringMap::new(None);
        map.set("n", b"10".to_vec(), Ttl::Forever);
        assert_eq!(map.increment("n", 5), Ok(15));
        assert_eq!(map.decrement("n", 3), Ok(12));
        assert_eq!(map.get("n"), Some(b"12".to_vec()));
    }

    #[test]
    fn arithmetic_on_absent_key() {
        let map = ExpiringMap::new(None);
        assert_eq!(map.increment("n", 1), Err(MapError::NotFound));
        assert_eq!(map.decrement("n", 1), Err(MapError::NotFound));
    }

    #[test]
    fn arithmetic_on_non_integer_value() {
        let map = ExpiringMap::new(None);
        map.set("k", b"not a number".to_vec(), Ttl::Forever);
        assert_eq!(map.increment("k", 1), Err(MapError::NotAnInteger));
    }

    #[test]
    fn arithmetic_overflow_is_reported() {
        let map = ExpiringMap::new(None);
        map.set("n", i64::MAX.to_string().into_bytes(), Ttl::Forever);
        assert_eq!(map.increment("n", 1), Err(MapError::Overflow));
        // value untouched after a failed delta
        assert_eq!(map.get("n"), Some(i64::MAX.to_string().into_bytes()));

        map.set("m", i64::MIN.to_string().into_bytes(), Ttl::Forever);
        assert_eq!(map.decrement("m", 1), Err(MapError::Overflow));
    }

    #[test]
    fn arithmetic_preserves_the_deadline() {
        let map = ExpiringMap::new(None);
        map.set("n", b"1".to_vec(), ttl(100));
        sleep(Duration::from_millis(40));
        assert_eq!(map.increment("n", 1), Ok(2));
        // if the increment had reset the TTL the entry would still be
        // alive at t=140; the original deadline was t=100
        sleep(Duration::from_millis(100));
        assert_eq!(map.get("n"), None);
    }

    #[test]
    fn negative_values_round_trip_through_arithmetic() {
        let map = ExpiringMap::new(None);
        map.set("n", b"-5".to_vec(), Ttl::Forever);
        assert_eq!(map.increment("n", 3), Ok(-2));
        assert_eq!(map.decrement("n", 8), Ok(-10));
    }

    // ── janitor ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn janitor_purges_without_observers() {
        let map = Arc::new(ExpiringMap::new(None));
        map.set("a", b"1".to_vec(), ttl(25));
        map.set("b", b"2".to_vec(), ttl(25));
        let handle = ExpiringMap::spawn_janitor(&map, Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(map.len(), 0);

        drop(map);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("janitor should exit after the map is dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn janitor_leaves_live_entries_alone() {
        let map = Arc::new(ExpiringMap::new(None));
        map.set("keep", b"v".to_vec(), Ttl::Forever);
        let handle = ExpiringMap::spawn_janitor(&map, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(map.get("keep"), Some(b"v".to_vec()));

        handle.abort();
    }
}
