//! Keeps one shared configuration object consistent across processes through
//! a replicated key-value store.
//!
//! - [`Datastore`] caches the object locally and follows remote changes
//!   through a watch on the lock key.
//! - [`Datastore::begin`] acquires the store's distributed lock and waits for
//!   the cache to catch up before handing out a [`Transaction`].
//! - [`Transaction::commit`] stores the new object, then releases the lock.
//!
//! The store itself is abstracted by [`KvStore`]; [`MemKvStore`] is an
//! in-process implementation.

mod config;
mod constants;
mod datastore;
mod errors;
pub mod kv;
pub mod utils;

pub use config::*;
pub use datastore::*;
pub use errors::*;
pub use kv::KvStore;
pub use kv::LockOptions;
pub use kv::Locker;
pub use kv::MemKvStore;
pub use kv::WatchEvent;
pub use kv::WatchEventType;
pub use kv::WatchStream;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
