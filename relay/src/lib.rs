// relay/src/lib.rs
pub mod domain;
pub mod ports;

pub use domain::{CacheEntry, Resolved, ResolverResult, Store};
pub use ports::{CacheStore, Resolver, SharedResolver, from_fn};
