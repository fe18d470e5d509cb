use async_trait::async_trait;
use relay::domain::{Resolved, Store};
use relay::ports::{CacheStore, SharedResolver};
use shared::config::Config;
use shared::{BoxError, Error, Result};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

type Reply<V> = oneshot::Sender<Result<V>>;

/// Where a `Read` came from, which decides how a miss is answered
enum Origin<V> {
    /// Issued by a caller's `get`
    Caller,
    /// Relayed after a resolution was written; holds the resolved value
    Resolved(V),
    /// A resolution failed; the read only delivers the error
    Failed(BoxError),
}

/// Messages consumed by the worker, one at a time
enum Operation<K, V> {
    Write {
        key: K,
        value: V,
        ttl: Duration,
        relay: Option<Reply<V>>,
    },
    Read {
        key: K,
        reply: Reply<V>,
        resolver: Option<SharedResolver<K, V>>,
        origin: Origin<V>,
    },
}

/// Actor-style cache: the map is owned by a single worker task and every
/// read, write and resolution continuation passes through its mailbox in
/// order.
///
/// A miss that carries a resolver is handed to a detached task so a slow
/// resolver never stalls the worker. The task reports back through the same
/// mailbox: a failed resolution becomes a `Read` carrying the error, a
/// successful one becomes a `Write` whose relayed `Read` answers the caller.
/// Replies are only ever sent from the `Read` handler.
///
/// Handles are cheap to clone and share one worker. The worker stops when
/// `shutdown` is called or the last handle is dropped.
pub struct ActorCache<K, V>
where
    K: Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    requests: mpsc::Sender<Operation<K, V>>,
    shutdown: CancellationToken,
    _guard: Arc<DropGuard>,
}

impl<K, V> ActorCache<K, V>
where
    K: Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start a worker with the default mailbox size. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_capacity(Config::DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_capacity(config.mailbox_capacity)
    }

    pub fn with_capacity(mailbox_capacity: usize) -> Self {
        let (requests, mailbox) = mpsc::channel(mailbox_capacity.max(1));
        let shutdown = CancellationToken::new();

        let worker = Worker {
            store: Store::new(),
            mailbox,
            loopback: requests.clone(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            requests,
            _guard: Arc::new(shutdown.clone().drop_guard()),
            shutdown,
        }
    }

    /// Stop the worker and wait until it has let go of its mailbox.
    /// Every later call on any clone of this handle fails with `Error::Unavailable`.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.requests.closed().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn submit(&self, op: Operation<K, V>) -> Result<()> {
        self.requests.send(op).await.map_err(|_| Error::Unavailable)
    }
}

impl<K, V> Clone for ActorCache<K, V>
where
    K: Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            shutdown: self.shutdown.clone(),
            _guard: Arc::clone(&self._guard),
        }
    }
}

impl<K, V> Default for ActorCache<K, V>
where
    K: Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> CacheStore<K, V> for ActorCache<K, V>
where
    K: Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        self.submit(Operation::Write {
            key,
            value,
            ttl,
            relay: None,
        })
        .await
    }

    async fn get(&self, key: K, resolver: Option<SharedResolver<K, V>>) -> Result<V> {
        let (reply, response) = oneshot::channel();
        self.submit(Operation::Read {
            key,
            reply,
            resolver,
            origin: Origin::Caller,
        })
        .await?;

        // A dropped reply means the worker went away before answering
        response.await.map_err(|_| Error::Unavailable)?
    }
}

impl<K, V> Debug for ActorCache<K, V>
where
    K: Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorCache")
            .field("mailbox_capacity", &self.requests.max_capacity())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// Sole owner of the store
struct Worker<K, V> {
    store: Store<K, V>,
    mailbox: mpsc::Receiver<Operation<K, V>>,
    // Detached tasks post their continuations through clones of this
    loopback: mpsc::Sender<Operation<K, V>>,
    shutdown: CancellationToken,
}

impl<K, V> Worker<K, V>
where
    K: Debug + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn run(mut self) {
        debug!("Cache worker started");

        loop {
            let op = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                op = self.mailbox.recv() => match op {
                    Some(op) => op,
                    None => break,
                },
            };

            match op {
                Operation::Write {
                    key,
                    value,
                    ttl,
                    relay,
                } => self.handle_write(key, value, ttl, relay),
                Operation::Read {
                    key,
                    reply,
                    resolver,
                    origin,
                } => self.handle_read(key, reply, resolver, origin),
            }
        }

        debug!("Cache worker stopped with {} entries", self.store.len());
    }

    fn handle_write(&mut self, key: K, value: V, ttl: Duration, relay: Option<Reply<V>>) {
        match relay {
            None => self.store.write(key, value, ttl),
            Some(reply) => {
                self.store.write(key.clone(), value.clone(), ttl);
                self.post(Operation::Read {
                    key,
                    reply,
                    resolver: None,
                    origin: Origin::Resolved(value),
                });
            }
        }
    }

    fn handle_read(
        &self,
        key: K,
        reply: Reply<V>,
        resolver: Option<SharedResolver<K, V>>,
        origin: Origin<V>,
    ) {
        let fallback = match origin {
            Origin::Failed(err) => return respond(&key, reply, Err(Error::Resolver(err))),
            Origin::Resolved(value) => Some(value),
            Origin::Caller => None,
        };

        let miss = match self.store.read(&key) {
            Ok(value) => return respond(&key, reply, Ok(value.clone())),
            Err(miss) => miss,
        };

        // The resolved entry expired before its relay arrived; the caller still gets the resolution
        if let Some(value) = fallback {
            return respond(&key, reply, Ok(value));
        }

        match resolver {
            None => {
                let err = Error::not_found(&key, miss);
                respond(&key, reply, Err(err));
            }
            Some(resolver) => {
                debug!("Resolving {:?} after miss ({})", key, miss);
                self.resolve_detached(key, reply, resolver);
            }
        }
    }

    /// Run the resolver off the worker and feed its outcome back into the mailbox
    fn resolve_detached(&self, key: K, reply: Reply<V>, resolver: SharedResolver<K, V>) {
        let loopback = self.loopback.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => return,
                outcome = resolver.resolve(&key) => outcome,
            };

            let op = match outcome {
                Ok(Resolved { value, ttl }) => Operation::Write {
                    key,
                    value,
                    ttl,
                    relay: Some(reply),
                },
                Err(err) => {
                    debug!("Resolver failed for {:?}: {}", key, err);
                    Operation::Read {
                        key,
                        reply,
                        resolver: None,
                        origin: Origin::Failed(err),
                    }
                }
            };

            if loopback.send(op).await.is_err() {
                debug!("Cache worker gone, dropping resolution");
            }
        });
    }

    fn post(&self, op: Operation<K, V>) {
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            if loopback.send(op).await.is_err() {
                debug!("Cache worker gone, dropping relayed read");
            }
        });
    }
}

fn respond<K: Debug, V>(key: &K, reply: Reply<V>, result: Result<V>) {
    if reply.send(result).is_err() {
        trace!("Caller for {:?} stopped waiting, reply dropped", key);
    }
}
