use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::KvStore;
use super::LockOptions;
use super::Locker;
use super::WatchEvent;
use super::WatchEventType;
use super::WatchStream;
use crate::KvError;
use crate::KvResult;

/// In-process [`KvStore`].
///
/// Clones share the same data, watchers and locks, so several datastores built
/// on clones of one `MemKvStore` behave like processes sharing a cluster.
/// Lock expiry is evaluated lazily against `tokio::time`.
#[derive(Clone)]
pub struct MemKvStore {
    inner: Arc<MemKvInner>,
}

struct MemKvInner {
    prefix: String,
    data: DashMap<String, Bytes>,
    /// Watchers grouped by key
    watchers: DashMap<String, Vec<mpsc::Sender<WatchEvent>>>,
    locks: Mutex<HashMap<String, LockEntry>>,
    /// Woken whenever a lock is released or expires
    released: Notify,
    next_token: AtomicU64,
}

#[derive(Debug)]
struct LockEntry {
    token: u64,
    expires_at: Instant,
}

enum Acquire {
    Granted(u64),
    Held { expires_at: Instant },
}

impl std::fmt::Debug for MemKvStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MemKvStore")
            .field("prefix", &self.inner.prefix)
            .field("keys", &self.inner.data.len())
            .field("watched_keys", &self.inner.watchers.len())
            .finish()
    }
}

impl MemKvStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemKvInner {
                prefix: prefix.into(),
                data: DashMap::new(),
                watchers: DashMap::new(),
                locks: Mutex::new(HashMap::new()),
                released: Notify::new(),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Drops every watch subscription, ending all open [`WatchStream`]s as a
    /// lost connection would.
    pub fn disconnect_watchers(&self) {
        self.inner.watchers.clear();
        debug!(prefix = %self.inner.prefix, "all watchers disconnected");
    }

    /// Number of live subscriptions on `key`.
    pub fn watcher_count(
        &self,
        key: &str,
    ) -> usize {
        self.inner
            .watchers
            .get(key)
            .map(|watchers| watchers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Value recorded by the current holder of the lock on `key`, if any.
    pub fn lock_holder(
        &self,
        key: &str,
    ) -> Option<Bytes> {
        self.inner.purge_expired(key);
        let locks = self.inner.locks.lock();
        locks.get(key).and_then(|_| self.inner.data.get(key).map(|value| value.clone()))
    }
}

impl MemKvInner {
    fn notify(
        &self,
        key: &str,
        event_type: WatchEventType,
    ) {
        let Some(mut watchers) = self.watchers.get_mut(key) else {
            return;
        };
        let event = WatchEvent {
            key: key.to_string(),
            event_type,
        };
        watchers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            // A pending event already tells the watcher to reload
            Err(TrySendError::Full(_)) => {
                trace!(key, "watch buffer full, event coalesced");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    fn set(
        &self,
        key: &str,
        value: Bytes,
    ) {
        self.data.insert(key.to_string(), value);
        self.notify(key, WatchEventType::Put);
    }

    fn remove(
        &self,
        key: &str,
    ) {
        if self.data.remove(key).is_some() {
            self.notify(key, WatchEventType::Delete);
        }
    }

    /// Drops the lock on `key` if its TTL ran out, deleting the lock key.
    fn purge_expired(
        &self,
        key: &str,
    ) {
        let mut locks = self.locks.lock();
        let expired = locks
            .get(key)
            .map(|entry| entry.expires_at <= Instant::now())
            .unwrap_or(false);
        if expired {
            locks.remove(key);
            self.remove(key);
            self.released.notify_waiters();
            debug!(key, "lock expired");
        }
    }

    fn try_acquire(
        &self,
        key: &str,
        options: &LockOptions,
    ) -> Acquire {
        self.purge_expired(key);

        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get(key) {
            return Acquire::Held {
                expires_at: entry.expires_at,
            };
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        locks.insert(
            key.to_string(),
            LockEntry {
                token,
                expires_at: Instant::now() + options.ttl,
            },
        );
        self.set(key, options.value.clone());
        Acquire::Granted(token)
    }

    fn release(
        &self,
        key: &str,
        token: u64,
    ) -> KvResult<()> {
        self.purge_expired(key);

        let mut locks = self.locks.lock();
        match locks.get(key) {
            Some(entry) if entry.token == token => {
                locks.remove(key);
                self.remove(key);
                self.released.notify_waiters();
                Ok(())
            }
            _ => Err(KvError::LockNotHeld { key: key.to_string() }),
        }
    }
}

#[async_trait::async_trait]
impl KvStore for MemKvStore {
    fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    async fn watch(
        &self,
        key: &str,
        buffer: usize,
    ) -> KvResult<WatchStream> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.inner.watchers.entry(key.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn get(
        &self,
        key: &str,
    ) -> KvResult<Option<Bytes>> {
        self.inner.purge_expired(key);
        Ok(self.inner.data.get(key).map(|value| value.clone()))
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> KvResult<()> {
        self.inner.set(key, value);
        Ok(())
    }

    async fn new_lock(
        &self,
        key: &str,
        options: LockOptions,
    ) -> KvResult<Box<dyn Locker>> {
        Ok(Box::new(MemLocker {
            store: self.inner.clone(),
            key: key.to_string(),
            options,
            token: None,
        }))
    }
}

struct MemLocker {
    store: Arc<MemKvInner>,
    key: String,
    options: LockOptions,
    token: Option<u64>,
}

#[async_trait::async_trait]
impl Locker for MemLocker {
    async fn lock(
        &mut self,
        stop: CancellationToken,
    ) -> KvResult<bool> {
        let store = self.store.clone();
        loop {
            // Registered before the check so a release in between is not missed
            let released = store.released.notified();

            match store.try_acquire(&self.key, &self.options) {
                Acquire::Granted(token) => {
                    self.token = Some(token);
                    return Ok(true);
                }
                Acquire::Held { expires_at } => {
                    tokio::select! {
                        _ = stop.cancelled() => return Ok(false),
                        _ = released => {}
                        _ = sleep_until(expires_at) => {}
                    }
                }
            }
        }
    }

    async fn unlock(&self) -> KvResult<()> {
        match self.token {
            Some(token) => self.store.release(&self.key, token),
            None => Err(KvError::LockNotHeld { key: self.key.clone() }),
        }
    }
}
