pub mod actor_cache;
pub mod lock_cache;

pub use actor_cache::ActorCache;
pub use lock_cache::LockCache;

use relay::ports::CacheStore;
use shared::config::{Config, Engine};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Build the requested engine behind the common port.
/// The actor engine spawns its worker, so this must run inside a tokio runtime.
pub fn create_store<K, V>(engine: Engine, config: &Config) -> Arc<dyn CacheStore<K, V>>
where
    K: Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    match engine {
        Engine::Lock => Arc::new(LockCache::new()),
        Engine::Actor => Arc::new(ActorCache::from_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use relay::domain::Resolved;
    use relay::ports::{SharedResolver, from_fn};
    use shared::{BoxError, Error, Miss};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Observable result of one operation, comparable across engines
    #[derive(Debug, PartialEq, Eq)]
    enum Outcome {
        Value(String),
        NotFound(Miss),
        ResolverFailed(String),
    }

    impl From<shared::Result<String>> for Outcome {
        fn from(result: shared::Result<String>) -> Self {
            match result {
                Ok(value) => Outcome::Value(value),
                Err(Error::NotFound { miss, .. }) => Outcome::NotFound(miss),
                Err(Error::Resolver(err)) => Outcome::ResolverFailed(err.to_string()),
                Err(Error::Unavailable) => panic!("engine became unavailable"),
            }
        }
    }

    fn engines() -> Vec<(Engine, Arc<dyn CacheStore<u32, String>>)> {
        let config = Config::default();
        [Engine::Lock, Engine::Actor]
            .into_iter()
            .map(|engine| (engine, create_store(engine, &config)))
            .collect()
    }

    fn resolving(ttl: Duration) -> SharedResolver<u32, String> {
        from_fn(move |key: u32| async move {
            Ok::<_, BoxError>(Resolved::new(format!("resolved-{key}"), ttl))
        })
    }

    fn failing() -> SharedResolver<u32, String> {
        from_fn(|_key: u32| async move {
            Err::<Resolved<String>, _>(BoxError::from("backend down"))
        })
    }

    async fn run_script(cache: &dyn CacheStore<u32, String>) -> Vec<Outcome> {
        let ttl = Duration::from_secs(1);
        let mut outcomes = Vec::new();

        outcomes.push(cache.get(1, None).await.into());

        cache.set(1, "a".to_string(), ttl).await.unwrap();
        outcomes.push(cache.get(1, None).await.into());

        sleep(Duration::from_millis(1100)).await;
        outcomes.push(cache.get(1, None).await.into());

        outcomes.push(cache.get(2, Some(resolving(Duration::from_secs(60)))).await.into());
        outcomes.push(cache.get(2, None).await.into());

        outcomes.push(cache.get(3, Some(failing())).await.into());
        outcomes.push(cache.get(3, None).await.into());

        cache.set(1, "b".to_string(), ttl).await.unwrap();
        cache.set(1, "c".to_string(), ttl).await.unwrap();
        outcomes.push(cache.get(1, None).await.into());

        // A live entry wins over the resolver
        outcomes.push(cache.get(1, Some(failing())).await.into());

        outcomes.push(cache.get(4, Some(resolving(Duration::ZERO))).await.into());
        outcomes.push(cache.get(4, None).await.into());

        outcomes
    }

    #[tokio::test(start_paused = true)]
    async fn test_engines_are_observably_equivalent() {
        let expected = vec![
            Outcome::NotFound(Miss::Absent),
            Outcome::Value("a".to_string()),
            Outcome::NotFound(Miss::Expired),
            Outcome::Value("resolved-2".to_string()),
            Outcome::Value("resolved-2".to_string()),
            Outcome::ResolverFailed("backend down".to_string()),
            Outcome::NotFound(Miss::Absent),
            Outcome::Value("c".to_string()),
            Outcome::Value("c".to_string()),
            Outcome::Value("resolved-4".to_string()),
            Outcome::NotFound(Miss::Expired),
        ];

        for (engine, cache) in engines() {
            let outcomes = run_script(cache.as_ref()).await;
            assert_eq!(outcomes, expected, "engine {engine} diverged");
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct User {
        id: i64,
        last_login_attempt: DateTime<Utc>,
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_record_expires_after_ttl() {
        let config = Config::default();
        let user = User {
            id: 1,
            last_login_attempt: Utc::now(),
        };

        for engine in [Engine::Lock, Engine::Actor] {
            let cache: Arc<dyn CacheStore<i64, User>> = create_store(engine, &config);

            cache.set(user.id, user.clone(), Duration::from_secs(1)).await.unwrap();
            assert_eq!(cache.get(user.id, None).await.unwrap(), user);

            sleep(Duration::from_millis(1100)).await;

            let err = cache.get(user.id, None).await.unwrap_err();
            assert!(err.is_not_found(), "engine {engine} kept an expired entry");
        }
    }

    #[tokio::test]
    async fn test_concurrent_set_then_get() {
        let config = Config::default();

        for engine in [Engine::Lock, Engine::Actor] {
            let cache: Arc<dyn CacheStore<u32, String>> = create_store(engine, &config);
            let mut tasks = tokio::task::JoinSet::new();

            for id in 0..200u32 {
                let cache = Arc::clone(&cache);
                tasks.spawn(async move {
                    let value = format!("user-{id}");
                    cache.set(id, value.clone(), Duration::from_secs(60)).await?;
                    let got = cache.get(id, None).await?;
                    Ok::<_, Error>((value, got))
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let (value, got) = joined.unwrap().unwrap();
                assert_eq!(value, got, "engine {engine} returned a foreign value");
            }
        }
    }
}
