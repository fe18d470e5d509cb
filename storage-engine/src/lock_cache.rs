use async_trait::async_trait;
use parking_lot::Mutex;
use relay::domain::{Resolved, Store};
use relay::ports::{CacheStore, SharedResolver};
use shared::{Error, Result};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

/// Baseline cache: one mutex around the map.
/// The lock covers map access only and is never held while a resolver runs.
pub struct LockCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    store: Mutex<Store<K, V>>,
}

impl<K, V> LockCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::new()),
        }
    }
}

impl<K, V> Default for LockCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> CacheStore<K, V> for LockCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        self.store.lock().write(key, value, ttl);
        Ok(())
    }

    async fn get(&self, key: K, resolver: Option<SharedResolver<K, V>>) -> Result<V> {
        let probe = self.store.lock().read(&key).cloned();
        let miss = match probe {
            Ok(value) => return Ok(value),
            Err(miss) => miss,
        };

        let Some(resolver) = resolver else {
            return Err(Error::not_found(&key, miss));
        };

        tracing::debug!("Resolving {:?} after miss ({})", key, miss);
        let Resolved { value, ttl } = resolver.resolve(&key).await.map_err(Error::Resolver)?;

        self.store.lock().write(key, value.clone(), ttl);
        Ok(value)
    }
}

impl<K, V> Debug for LockCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCache")
            .field("entries", &self.store.lock().len())
            .finish()
    }
}
