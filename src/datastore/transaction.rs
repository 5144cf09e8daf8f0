use std::sync::Arc;

use tracing::debug;
use tracing::error;

use super::DatastoreInner;
use super::Object;
use crate::kv::Locker;
use crate::Result;
use crate::TransactionError;

/// Single-use write handle holding the distributed lock.
///
/// Produced by [`super::Datastore::begin`] once the lock is granted and the
/// cache is known to reflect it. State machine:
///
/// ```text
/// Created --commit ok--------------------> Committed (further commits fail)
/// Created --store error------------------> Created   (lock still held, commit may be retried)
/// Created --store ok, unlock error-------> Committed (PartiallyCommitted returned)
/// ```
///
/// Dropping an uncommitted transaction leaves the lock to expire with its TTL.
pub struct Transaction<T: Object> {
    datastore: Arc<DatastoreInner<T>>,
    remote_lock: Box<dyn Locker>,
    id: String,
    used: bool,
}

impl<T: Object> std::fmt::Debug for Transaction<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("lock_key", &self.datastore.source.lock_key())
            .field("used", &self.used)
            .finish()
    }
}

impl<T: Object> Transaction<T> {
    pub(crate) fn new(
        datastore: Arc<DatastoreInner<T>>,
        remote_lock: Box<dyn Locker>,
        id: String,
    ) -> Self {
        Self {
            datastore,
            remote_lock,
            id,
            used: false,
        }
    }

    /// Id recorded as the lock holder
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Persists `object`, releases the lock and updates the local cache.
    ///
    /// The object is stored before the lock is released, so the next lock
    /// holder always finds it durable. If storing fails the lock is kept and
    /// the transaction stays usable.
    ///
    /// If the object was stored but releasing the lock failed, the data is
    /// durable: the cache is updated, the transaction is marked used, and
    /// [`TransactionError::PartiallyCommitted`] is returned. The lock is then
    /// in an unknown state and is reclaimed by its TTL at the latest.
    pub async fn commit(
        &mut self,
        object: T,
    ) -> Result<()> {
        let mut state = self.datastore.cache.write().await;
        if self.used {
            return Err(TransactionError::AlreadyUsed { id: self.id.clone() }.into());
        }

        self.datastore.source.store(&object).await?;

        let unlocked = self.remote_lock.unlock().await;
        state.object = object;
        self.used = true;

        if let Err(source) = unlocked {
            error!(id = %self.id, error = %source, "Transaction persisted but lock release failed");
            return Err(TransactionError::PartiallyCommitted {
                id: self.id.clone(),
                source,
            }
            .into());
        }

        debug!(id = %self.id, "Transaction committed");
        Ok(())
    }
}
