//! Key-value store boundary.
//!
//! The datastore never talks to a concrete store. Everything it needs from the
//! replicated key-value service is expressed by [`KvStore`] and [`Locker`]:
//!
//! - **watch**: change notifications for one key; the stream ending means the
//!   connection is gone for good
//! - **get / put**: linearizable single-key reads and writes
//! - **locks**: TTL-expiring distributed locks whose holder value is readable
//!   at the lock key
//!
//! [`MemKvStore`] is an in-process implementation for tests and single-process
//! deployments.

mod mem;
mod source;

pub use mem::*;
pub(crate) use source::*;


use std::time::Duration;

use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::KvResult;

/// Event type for watch notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventType {
    /// Key was inserted or updated
    Put,
    /// Key was deleted (explicitly, by unlock, or by lock expiry)
    Delete,
}

/// Watch event containing key change information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub key: String,
    pub event_type: WatchEventType,
}

/// Stream of change notifications for one key.
///
/// `recv()` returning `None` signals an unrecoverable disconnect. Dropping the
/// receiver unsubscribes.
pub type WatchStream = mpsc::Receiver<WatchEvent>;

/// Parameters of a distributed lock request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// The lock is released by the store if not unlocked within `ttl`
    pub ttl: Duration,
    /// Value recorded at the lock key while the lock is held
    pub value: Bytes,
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Namespace under which all keys of one shared object live
    fn prefix(&self) -> &str;

    /// Subscribes to changes of `key`.
    async fn watch(
        &self,
        key: &str,
        buffer: usize,
    ) -> KvResult<WatchStream>;

    async fn get(
        &self,
        key: &str,
    ) -> KvResult<Option<Bytes>>;

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> KvResult<()>;

    /// Prepares a lock on `key`. Nothing is acquired until [`Locker::lock`].
    async fn new_lock(
        &self,
        key: &str,
        options: LockOptions,
    ) -> KvResult<Box<dyn Locker>>;
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Locker: Send + Sync {
    /// Blocks until the lock is granted (`Ok(true)`) or `stop` is cancelled
    /// (`Ok(false)`).
    async fn lock(
        &mut self,
        stop: CancellationToken,
    ) -> KvResult<bool>;

    /// Releases the lock. Fails if it is not held by this handle anymore.
    async fn unlock(&self) -> KvResult<()>;
}
