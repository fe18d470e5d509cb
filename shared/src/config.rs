use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Which cache engine to build
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Engine {
    Lock,  // mutex around the map
    Actor, // single worker owning the map
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lock" => Ok(Engine::Lock),
            "actor" => Ok(Engine::Actor),
            other => Err(format!("unknown engine '{other}'")),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Lock => f.write_str("lock"),
            Engine::Actor => f.write_str("actor"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub engines: Vec<Engine>,
    pub mailbox_capacity: usize,
    pub bench_keys: usize,
    pub bench_ttl: Duration,
    pub bench_resolver_delay: Duration,
}

impl Config {
    pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;
    const DEFAULT_BENCH_KEYS: usize = 10_000;
    const DEFAULT_BENCH_TTL_MS: u64 = 60_000;
    const DEFAULT_BENCH_RESOLVER_DELAY_MS: u64 = 5;

    pub fn from_env() -> Self {
        let engines = std::env::var("RELAY_ENGINES")
            .map(|raw| parse_engines(&raw))
            .unwrap_or_else(|_| vec![Engine::Lock, Engine::Actor]);
        let mailbox_capacity = std::env::var("RELAY_MAILBOX_CAPACITY")
            .unwrap_or_else(|_| Self::DEFAULT_MAILBOX_CAPACITY.to_string())
            .parse::<usize>()
            .unwrap_or(Self::DEFAULT_MAILBOX_CAPACITY)
            .max(1);
        let bench_keys = std::env::var("RELAY_BENCH_KEYS")
            .unwrap_or_else(|_| Self::DEFAULT_BENCH_KEYS.to_string())
            .parse::<usize>()
            .unwrap_or(Self::DEFAULT_BENCH_KEYS);
        let bench_ttl_ms = std::env::var("RELAY_BENCH_TTL_MS")
            .unwrap_or_else(|_| Self::DEFAULT_BENCH_TTL_MS.to_string())
            .parse::<u64>()
            .unwrap_or(Self::DEFAULT_BENCH_TTL_MS);
        let bench_resolver_delay_ms = std::env::var("RELAY_BENCH_RESOLVER_DELAY_MS")
            .unwrap_or_else(|_| Self::DEFAULT_BENCH_RESOLVER_DELAY_MS.to_string())
            .parse::<u64>()
            .unwrap_or(Self::DEFAULT_BENCH_RESOLVER_DELAY_MS);

        Self {
            engines,
            mailbox_capacity,
            bench_keys,
            bench_ttl: Duration::from_millis(bench_ttl_ms),
            bench_resolver_delay: Duration::from_millis(bench_resolver_delay_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engines: vec![Engine::Lock, Engine::Actor],
            mailbox_capacity: Self::DEFAULT_MAILBOX_CAPACITY,
            bench_keys: Self::DEFAULT_BENCH_KEYS,
            bench_ttl: Duration::from_millis(Self::DEFAULT_BENCH_TTL_MS),
            bench_resolver_delay: Duration::from_millis(Self::DEFAULT_BENCH_RESOLVER_DELAY_MS),
        }
    }
}

fn parse_engines(raw: &str) -> Vec<Engine> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| match name.parse::<Engine>() {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!("Skipping engine in RELAY_ENGINES: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_str() {
        assert_eq!("lock".parse::<Engine>(), Ok(Engine::Lock));
        assert_eq!(" Actor ".parse::<Engine>(), Ok(Engine::Actor));
        assert!("sharded".parse::<Engine>().is_err());
    }

    #[test]
    fn test_parse_engines_skips_unknown_names() {
        assert_eq!(
            parse_engines("actor, bogus,,lock"),
            vec![Engine::Actor, Engine::Lock]
        );
        assert!(parse_engines("").is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engines, vec![Engine::Lock, Engine::Actor]);
        assert_eq!(config.mailbox_capacity, Config::DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(config.bench_ttl, Duration::from_secs(60));
    }
}
