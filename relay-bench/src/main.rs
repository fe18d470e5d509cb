use chrono::{DateTime, Utc};
use rand::Rng;
use relay::domain::Resolved;
use relay::ports::{CacheStore, SharedResolver, from_fn};
use shared::BoxError;
use shared::config::{Config, Engine};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type BenchResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Clone, Debug, PartialEq)]
struct User {
    id: u64,
    last_login_attempt: DateTime<Utc>,
}

#[tokio::main]
async fn main() -> BenchResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    if config.engines.is_empty() {
        warn!("No engines selected, set RELAY_ENGINES to lock, actor or both");
        return Ok(());
    }

    info!(
        "Running {} keys per phase against {:?} (mailbox capacity {})",
        config.bench_keys, config.engines, config.mailbox_capacity
    );

    for &engine in &config.engines {
        let cache = storage_engine::create_store::<u64, User>(engine, &config);
        set_then_get(engine, cache, &config).await?;

        let cache = storage_engine::create_store::<u64, User>(engine, &config);
        load_through(engine, cache, &config).await?;
    }

    Ok(())
}

/// Every task writes its own user and reads it straight back
async fn set_then_get(
    engine: Engine,
    cache: Arc<dyn CacheStore<u64, User>>,
    config: &Config,
) -> BenchResult<()> {
    let started = Instant::now();
    let mut tasks = JoinSet::new();

    for id in 0..config.bench_keys as u64 {
        let cache = Arc::clone(&cache);
        let ttl = config.bench_ttl;
        tasks.spawn(async move {
            let user = User {
                id,
                last_login_attempt: Utc::now(),
            };
            cache.set(id, user.clone(), ttl).await?;
            let got = cache.get(id, None).await?;
            if got != user {
                return Err(format!("expected {user:?}, got {got:?}").into());
            }
            Ok::<_, BoxError>(())
        });
    }

    drain(&mut tasks).await?;
    report(engine, "set-then-get", config.bench_keys, started.elapsed());
    Ok(())
}

/// Every task misses on an empty cache and loads through a slow resolver
async fn load_through(
    engine: Engine,
    cache: Arc<dyn CacheStore<u64, User>>,
    config: &Config,
) -> BenchResult<()> {
    let resolver = slow_user_lookup(config.bench_resolver_delay, config.bench_ttl);
    let started = Instant::now();
    let mut tasks = JoinSet::new();

    for id in 0..config.bench_keys as u64 {
        let cache = Arc::clone(&cache);
        let resolver = Arc::clone(&resolver);
        tasks.spawn(async move {
            let got = cache.get(id, Some(resolver)).await?;
            if got.id != id {
                return Err(format!("resolved user {} for key {}", got.id, id).into());
            }
            Ok::<_, BoxError>(())
        });
    }

    drain(&mut tasks).await?;
    report(engine, "load-through", config.bench_keys, started.elapsed());
    Ok(())
}

fn slow_user_lookup(delay: Duration, ttl: Duration) -> SharedResolver<u64, User> {
    from_fn(move |id: u64| async move {
        // Up to 50% jitter so resolutions finish out of order
        let jitter_ms = rand::rng().random_range(0..=delay.as_millis() as u64 / 2);
        tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;
        Ok::<_, BoxError>(Resolved::new(
            User {
                id,
                last_login_attempt: Utc::now(),
            },
            ttl,
        ))
    })
}

async fn drain(tasks: &mut JoinSet<Result<(), BoxError>>) -> BenchResult<()> {
    while let Some(joined) = tasks.join_next().await {
        joined?.map_err(|e| e as Box<dyn std::error::Error>)?;
    }
    Ok(())
}

fn report(engine: Engine, phase: &str, ops: usize, elapsed: Duration) {
    let per_sec = ops as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        "[{}] {}: {} ops in {:?} ({:.0} ops/s)",
        engine, phase, ops, elapsed, per_sec
    );
}
