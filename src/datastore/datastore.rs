use std::sync::Arc;

use nanoid::nanoid;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::resync::ResyncHealth;
use super::DatastoreBuilder;
use super::Listener;
use super::Object;
use super::ObjectCache;
use super::Transaction;
use crate::kv::KvSource;
use crate::kv::KvStore;
use crate::kv::Locker;
use crate::utils::backoff::retry_notify;
use crate::DatastoreConfig;
use crate::Error;
use crate::KvResult;
use crate::Result;
use crate::TransactionError;

/// Local cache of one shared object, kept in sync with a [`KvStore`].
///
/// Cloning is cheap; clones share the cache and the resync task. The task
/// stops when the lifetime token is cancelled, on [`Datastore::shutdown`], or
/// when the last handle (including open transactions) is dropped.
pub struct Datastore<T: Object> {
    pub(crate) inner: Arc<DatastoreInner<T>>,
}

pub(crate) struct DatastoreInner<T: Object> {
    pub(crate) source: KvSource,
    pub(crate) cache: Arc<ObjectCache<T>>,
    pub(crate) lifetime: CancellationToken,
    pub(crate) config: DatastoreConfig,
    pub(crate) resync_token: CancellationToken,
    pub(crate) resync_handle: Mutex<Option<JoinHandle<()>>>,
    pub(crate) health: Arc<ResyncHealth>,
}

impl<T: Object> Drop for DatastoreInner<T> {
    fn drop(&mut self) {
        self.resync_token.cancel();
    }
}

impl<T: Object> Clone for Datastore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Object> std::fmt::Debug for Datastore<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("lock_key", &self.inner.source.lock_key())
            .field("resync", &self.inner.health.state())
            .finish()
    }
}

type LockAttempt = JoinHandle<(Box<dyn Locker>, KvResult<bool>)>;

impl<T: Object> Datastore<T> {
    /// Creates a datastore with the default configuration.
    pub async fn new(
        kv: Arc<dyn KvStore>,
        lifetime: CancellationToken,
        object: T,
        listener: Option<Listener<T>>,
    ) -> Result<Self> {
        let mut builder = DatastoreBuilder::new(kv, object).lifetime(lifetime);
        if let Some(listener) = listener {
            builder = builder.listener(listener);
        }
        builder.build().await
    }

    /// Returns the cached object.
    ///
    /// Does not touch the store; may lag behind remote changes until the next
    /// resync.
    pub async fn get(&self) -> T {
        self.inner.cache.get().await
    }

    /// Reloads the object from the store, bypassing the cache.
    pub async fn load(&self) -> Result<T> {
        self.inner.cache.load(&self.inner.source).await
    }

    /// Acquires the distributed write lock and waits until the local cache
    /// has caught up with it.
    ///
    /// If this fails after the lock was granted (the cache never reports this
    /// transaction as holder), the lock stays held until its TTL expires.
    pub async fn begin(&self) -> Result<Transaction<T>> {
        let id = nanoid!();
        debug!(%id, "Transaction begins");

        let locker = self.inner.source.new_lock(self.inner.config.lock_ttl(), &id).await?;
        let locker = self.acquire(locker).await?;

        if let Err(e) = self.wait_synced(&id).await {
            if matches!(e, Error::Cancelled) {
                release(locker.as_ref(), &id).await;
            }
            return Err(e);
        }

        debug!(%id, "Transaction synced");
        Ok(Transaction::new(self.inner.clone(), locker, id))
    }

    /// Runs the blocking lock call on its own task and races it against the
    /// lifetime token.
    async fn acquire(
        &self,
        mut locker: Box<dyn Locker>,
    ) -> Result<Box<dyn Locker>> {
        if self.inner.lifetime.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let stop = CancellationToken::new();
        let mut attempt: LockAttempt = tokio::spawn({
            let stop = stop.clone();
            async move {
                let granted = locker.lock(stop).await;
                (locker, granted)
            }
        });

        tokio::select! {
            biased;
            _ = self.inner.lifetime.cancelled() => {
                stop.cancel();
                tokio::spawn(release_abandoned(attempt));
                Err(Error::Cancelled)
            }
            joined = &mut attempt => {
                let (locker, granted) = joined?;
                if granted? {
                    Ok(locker)
                } else {
                    Err(Error::LockNotAcquired)
                }
            }
        }
    }

    /// Polls the cached lock holder until it equals `id`, within the sync
    /// retry budget.
    async fn wait_synced(
        &self,
        id: &str,
    ) -> Result<()> {
        let cache = &self.inner.cache;
        let verify = retry_notify(
            &self.inner.config.retry.sync,
            move || async move {
                let actual = cache.lock_holder().await;
                if actual == id {
                    Ok(())
                } else {
                    Err(Error::from(TransactionError::OutOfSync {
                        expected: id.to_string(),
                        actual,
                    }))
                }
            },
            |error, delay| warn!(%error, ?delay, "Datastore sync error, retrying"),
        );

        tokio::select! {
            biased;
            _ = self.inner.lifetime.cancelled() => Err(Error::Cancelled),
            result = verify => result.map_err(|e| {
                Error::from(TransactionError::CannotSync {
                    id: id.to_string(),
                    source: Box::new(e),
                })
            }),
        }
    }

    pub fn lock_key(&self) -> &str {
        self.inner.source.lock_key()
    }

    pub fn object_key(&self) -> &str {
        self.inner.source.object_key()
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.inner.config
    }

    pub fn resync_health(&self) -> &ResyncHealth {
        &self.inner.health
    }

    /// Stops the resync task and waits for it to exit. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.resync_token.cancel();
        let handle = self.inner.resync_handle.lock().take();
        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }
}

/// Releases a lock whose grant nobody is waiting for anymore.
async fn release_abandoned(attempt: LockAttempt) {
    if let Ok((locker, Ok(true))) = attempt.await {
        release(locker.as_ref(), "abandoned").await;
    }
}

async fn release(
    locker: &dyn Locker,
    id: &str,
) {
    match locker.unlock().await {
        Ok(()) => debug!(%id, "Lock released"),
        Err(error) => warn!(%id, %error, "Failed to release lock"),
    }
}
