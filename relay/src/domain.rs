use shared::{BoxError, Miss};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

// Roughly 30 years; stands in for deadlines that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A stored value together with the instant it stops being served
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { value, expires_at }
    }

    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// What a resolver produces on success
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved<V> {
    pub value: V,
    pub ttl: Duration,
}

impl<V> Resolved<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self { value, ttl }
    }
}

/// Outcome of a resolver call. `Err` means the miss fails and nothing is written.
pub type ResolverResult<V> = std::result::Result<Resolved<V>, BoxError>;

/// The keyed mapping both engines keep their entries in.
///
/// Entries are replaced whole on every write, so a reader never sees a value
/// paired with another write's expiry. Expired entries stay in place until
/// overwritten; there is no sweeping.
#[derive(Debug)]
pub struct Store<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> Store<K, V>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn write(&mut self, key: K, value: V, ttl: Duration) {
        self.entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Look up a live value, or say why there isn't one
    pub fn read(&self, key: &K) -> std::result::Result<&V, Miss> {
        match self.entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(&entry.value),
            Some(_) => Err(Miss::Expired),
            None => Err(Miss::Absent),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for Store<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}
