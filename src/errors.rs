//! Datastore Error Hierarchy
//!
//! Errors are split by the layer that produces them: the external key-value
//! store, the transaction protocol, and the local runtime (configuration,
//! background tasks, cancellation).

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for key-value store operations
pub type KvResult<T> = std::result::Result<T, KvError>;

/// Boxed error returned by consumer supplied callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failures reported by the key-value store client
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Object encode/decode failures
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transaction protocol violations and failures
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The datastore lifetime token was cancelled
    #[error("Datastore lifetime cancelled")]
    Cancelled,

    /// The store returned from a lock attempt without granting it
    #[error("Lock was not acquired")]
    LockNotAcquired,

    /// Change notification stream ended
    #[error("Watch stream on {key} closed")]
    WatchClosed { key: String },

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Commit called on a transaction that already committed
    #[error("Transaction {id} already used. Please begin a new one.")]
    AlreadyUsed { id: String },

    /// Cached lock holder does not match the transaction yet
    #[error("Object lock value: expected {expected}, got {actual}")]
    OutOfSync { expected: String, actual: String },

    /// Lock was granted but the local cache never caught up
    #[error("Datastore cannot sync for transaction {id}: {source}")]
    CannotSync {
        id: String,
        #[source]
        source: Box<Error>,
    },

    /// Object is durable but the remote lock release failed
    #[error("Transaction {id} persisted but lock release failed: {source}")]
    PartiallyCommitted {
        id: String,
        #[source]
        source: KvError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    /// Connection to the store lost
    #[error("Channel closed")]
    ChannelClosed,

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Unlock of a lock this handle does not hold (never acquired, released or expired)
    #[error("Lock {key} is not held")]
    LockNotHeld { key: String },

    /// Store side error
    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Errors after which the resync task must stop instead of retrying.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::WatchClosed { .. } | Error::Cancelled)
    }
}
