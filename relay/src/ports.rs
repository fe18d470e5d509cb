#![deny(clippy::all)]

use crate::domain::ResolverResult;
use async_trait::async_trait;
use shared::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

// Ports are the seams between callers and the cache engines

/// Port for a TTL cache with load-through on miss.
///
/// Both engines implement this with the same observable contract: a live
/// entry is returned as-is; a miss without a resolver fails with
/// `Error::NotFound`; a miss with a resolver invokes it exactly once for this
/// call, stores the result and returns it, or fails with `Error::Resolver`
/// carrying the resolver's own error.
#[async_trait]
pub trait CacheStore<K, V>: Send + Sync + 'static {
    /// Install `value` under `key` until `ttl` has elapsed, replacing any prior entry
    async fn set(&self, key: K, value: V, ttl: Duration) -> Result<()>;

    async fn get(&self, key: K, resolver: Option<SharedResolver<K, V>>) -> Result<V>;
}

/// Capability invoked on a cache miss to produce the value and its TTL
#[async_trait]
pub trait Resolver<K, V>: Send + Sync + 'static {
    async fn resolve(&self, key: &K) -> ResolverResult<V>;
}

pub type SharedResolver<K, V> = Arc<dyn Resolver<K, V>>;

/// Adapter that lets an async closure act as a `Resolver`
pub struct FnResolver<F>(F);

#[async_trait]
impl<K, V, F, Fut> Resolver<K, V> for FnResolver<F>
where
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResolverResult<V>> + Send + 'static,
{
    async fn resolve(&self, key: &K) -> ResolverResult<V> {
        (self.0)(key.clone()).await
    }
}

/// Wrap an async closure into a shareable resolver
pub fn from_fn<K, V, F, Fut>(f: F) -> SharedResolver<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResolverResult<V>> + Send + 'static,
{
    Arc::new(FnResolver(f))
}
