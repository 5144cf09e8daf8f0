//! Shared object cache and single-writer transactions.
//!
//! A [`Datastore`] keeps a local copy of one shared object in sync with the
//! key-value store and hands out [`Transaction`]s for writing it:
//!
//! ```text
//! lock key change ──watch──▶ resync task ──write guard──▶ ObjectCache ◀──read── get()
//!                                                             ▲
//! begin(): acquire lock ─▶ wait until cached holder == tx id ─┘
//! commit(): store object ─▶ release lock ─▶ update cache
//! ```
//!
//! Any write to the object is paired with a lock key touch, so the lock key
//! alone drives resynchronization.

mod builder;
mod cache;
#[allow(clippy::module_inception)]
mod datastore;
mod resync;
mod store;
mod transaction;

pub use builder::*;
pub(crate) use cache::*;
pub use datastore::*;
pub use resync::ResyncHealth;
pub use resync::ResyncState;
pub use store::*;
pub use transaction::*;


use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::BoxError;

/// Shared, user-defined record kept in sync across processes.
///
/// Implemented for every serializable, cloneable, thread-safe type.
pub trait Object: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Object for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Called with the refreshed object after every resync reload.
///
/// Errors are logged and otherwise ignored.
pub type Listener<T> = Arc<dyn Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Bookkeeping stored next to the object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Id of the transaction holding (or last seen holding) the write lock
    pub lock_holder: String,
}
