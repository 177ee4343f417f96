use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;

use crate::sync::Listener;

/// What a finished lookup produced.
pub(crate) type Outcome<V, E> = Result<Arc<V>, Arc<E>>;

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A single tracked key.
pub(crate) enum Entry<V, E> {
    /// A lookup is running.  Holds the signal its waiters block on.
    InFlight(Listener),
    /// The last lookup finished.
    Settled {
        outcome: Outcome<V, E>,
        /// `None` unless the lookup succeeded.  An entry without an expiry
        /// always reads as stale.
        expires_at: Option<Instant>,
    },
}

impl<V, E> Entry<V, E> {
    /// Returns `true` if the entry can be served without a new lookup.
    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        match self {
            Entry::Settled {
                expires_at: Some(at),
                ..
            } => *at > now,
            _ => false,
        }
    }

    /// The cached value, for settled successful entries.
    pub(crate) fn value(&self) -> Option<&Arc<V>> {
        match self {
            Entry::Settled {
                outcome: Ok(value), ..
            } => Some(value),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// EntryTable
// ---------------------------------------------------------------------------

/// Capacity-bounded map from key to [`Entry`].
///
/// Not synchronized; the cache keeps it behind a single `RwLock`.
pub(crate) struct EntryTable<V, E> {
    map: AHashMap<String, Entry<V, E>>,
    capacity: usize,
}

impl<V, E> EntryTable<V, E> {
    /// `capacity` is raised to 1 if zero.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        EntryTable {
            map: AHashMap::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Entry<V, E>> {
        self.map.get(key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Stores `entry` under `key`.
    ///
    /// Replacing an existing key never evicts.  Adding a new key to a full
    /// table first evicts exactly one entry, which is returned.
    pub(crate) fn insert(
        &mut self,
        key: &str,
        entry: Entry<V, E>,
        now: Instant,
    ) -> Option<(String, Entry<V, E>)> {
        if let Some(slot) = self.map.get_mut(key) {
            *slot = entry;
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict_one(now)
        } else {
            None
        };
        self.map.insert(key.to_owned(), entry);
        evicted
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Entry<V, E>> {
        self.map.remove(key)
    }

    /// Empties the table, handing back everything it held.
    pub(crate) fn drain(&mut self) -> Vec<(String, Entry<V, E>)> {
        self.map.drain().collect()
    }

    /// Removes one entry to make room for a new key.
    fn evict_one(&mut self, now: Instant) -> Option<(String, Entry<V, E>)> {
        let key = self.victim(now)?;
        self.map.remove_entry(&key)
    }

    /// Picks the entry to evict.
    ///
    /// 1. The first stale settled entry found (failed, or past its expiry).
    /// 2. Otherwise the settled entry expiring soonest, ties going to the
    ///    smallest key.
    /// 3. Only if every entry is in flight, the in-flight entry with the
    ///    smallest key.
    ///
    /// A placeholder has no expiry yet but is never treated as stale: evicting
    /// it would let the next caller for that key start a second lookup while
    /// the first one still runs.
    fn victim(&self, now: Instant) -> Option<String> {
        let mut soonest: Option<(Instant, &String)> = None;
        let mut in_flight: Option<&String> = None;

        for (key, entry) in &self.map {
            match entry {
                Entry::Settled {
                    expires_at: Some(at),
                    ..
                } if *at > now => {
                    if soonest.map_or(true, |best| (*at, key) < best) {
                        soonest = Some((*at, key));
                    }
                }
                Entry::Settled { .. } => return Some(key.clone()),
                Entry::InFlight(_) => {
                    if in_flight.map_or(true, |best| key < best) {
                        in_flight = Some(key);
                    }
                }
            }
        }

        soonest.map(|(_, key)| key).or(in_flight).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use super::*;
    use crate::sync::channel;

    type Table = EntryTable<&'static str, io::Error>;

    fn ok(value: &'static str, expires_at: Instant) -> Entry<&'static str, io::Error> {
        Entry::Settled {
            outcome: Ok(Arc::new(value)),
            expires_at: Some(expires_at),
        }
    }

    fn failed() -> Entry<&'static str, io::Error> {
        Entry::Settled {
            outcome: Err(Arc::new(io::Error::new(io::ErrorKind::Other, "down"))),
            expires_at: None,
        }
    }

    fn in_flight() -> Entry<&'static str, io::Error> {
        let (notifier, listener) = channel();
        // Firing state is irrelevant to the table.
        notifier.notify();
        Entry::InFlight(listener)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let table = Table::new(0);
        assert_eq!(table.capacity(), 1);
    }

    #[test]
    fn freshness() {
        let now = Instant::now();
        assert!(ok("v", now + secs(1)).is_fresh(now));
        assert!(!ok("v", now).is_fresh(now), "expiry equal to now is stale");
        assert!(!failed().is_fresh(now));
        assert!(!in_flight().is_fresh(now));
        assert_eq!(ok("v", now).value().map(|v| **v), Some("v"));
        assert!(failed().value().is_none());
    }

    #[test]
    fn updating_existing_key_never_evicts() {
        let now = Instant::now();
        let mut table = Table::new(2);
        assert!(table.insert("a", ok("1", now + secs(10)), now).is_none());
        assert!(table.insert("b", ok("2", now + secs(10)), now).is_none());
        assert!(table.insert("a", ok("3", now + secs(10)), now).is_none());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a").and_then(Entry::value).map(|v| **v), Some("3"));
    }

    #[test]
    fn new_key_at_capacity_evicts_exactly_one() {
        let now = Instant::now();
        let mut table = Table::new(3);
        for key in ["a", "b", "c"] {
            table.insert(key, ok(key, now + secs(10)), now);
        }
        let evicted = table.insert("d", ok("d", now + secs(10)), now);
        assert!(evicted.is_some());
        assert_eq!(table.len(), 3);
        assert!(table.contains("d"));
    }

    #[test]
    fn stale_entry_is_evicted_before_fresh_ones() {
        let now = Instant::now();
        let mut table = Table::new(4);
        table.insert("fresh-1", ok("1", now + secs(1)), now);
        table.insert("stale", ok("s", now - secs(1)), now);
        table.insert("fresh-2", ok("2", now + secs(2)), now);
        table.insert("fresh-3", ok("3", now + secs(3)), now);

        let (key, _) = table.insert("new", ok("n", now + secs(10)), now).unwrap();
        assert_eq!(key, "stale");
    }

    #[test]
    fn failed_entry_counts_as_stale() {
        let now = Instant::now();
        let mut table = Table::new(2);
        table.insert("good", ok("g", now + secs(1)), now);
        table.insert("bad", failed(), now);

        let (key, _) = table.insert("new", ok("n", now + secs(10)), now).unwrap();
        assert_eq!(key, "bad");
    }

    #[test]
    fn soonest_expiring_entry_is_evicted_when_nothing_is_stale() {
        let now = Instant::now();
        let mut table = Table::new(3);
        table.insert("late", ok("l", now + secs(30)), now);
        table.insert("soon", ok("s", now + secs(5)), now);
        table.insert("mid", ok("m", now + secs(10)), now);

        let (key, _) = table.insert("new", ok("n", now + secs(60)), now).unwrap();
        assert_eq!(key, "soon");
    }

    #[test]
    fn expiry_ties_go_to_smallest_key() {
        let now = Instant::now();
        let at = now + secs(5);
        let mut table = Table::new(3);
        table.insert("charlie", ok("c", at), now);
        table.insert("alpha", ok("a", at), now);
        table.insert("bravo", ok("b", at), now);

        let (key, _) = table.insert("delta", ok("d", at), now).unwrap();
        assert_eq!(key, "alpha");
    }

    #[test]
    fn in_flight_entries_are_evicted_last() {
        let now = Instant::now();
        let mut table = Table::new(2);
        table.insert("pending", in_flight(), now);
        table.insert("done", ok("d", now + secs(60)), now);

        let (key, _) = table.insert("new", in_flight(), now).unwrap();
        assert_eq!(key, "done");

        let (key, _) = table.insert("newer", in_flight(), now).unwrap();
        assert_eq!(key, "new", "all in flight: smallest key goes");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_and_drain() {
        let now = Instant::now();
        let mut table = Table::new(4);
        table.insert("a", ok("a", now + secs(1)), now);
        table.insert("b", ok("b", now + secs(1)), now);

        assert!(table.remove("missing").is_none());
        assert!(table.remove("a").is_some());
        assert_eq!(table.len(), 1);

        let drained = table.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(table.len(), 0);
        assert!(table.drain().is_empty());
    }
}
