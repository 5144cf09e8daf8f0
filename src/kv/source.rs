use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use super::KvStore;
use super::LockOptions;
use super::Locker;
use super::WatchStream;
use crate::constants::LOCK_KEY_SUFFIX;
use crate::constants::OBJECT_KEY_SUFFIX;
use crate::Metadata;
use crate::Object;
use crate::Result;

/// Maps one shared object onto the keys of a [`KvStore`] namespace.
///
/// - `<prefix>/object`: the bincode encoded object
/// - `<prefix>/lock`: the store's lock key; its value is the current holder id
#[derive(Clone)]
pub(crate) struct KvSource {
    kv: Arc<dyn KvStore>,
    lock_key: String,
    object_key: String,
}

impl KvSource {
    pub(crate) fn new(kv: Arc<dyn KvStore>) -> Self {
        let prefix = kv.prefix().to_string();
        Self {
            kv,
            lock_key: format!("{prefix}{LOCK_KEY_SUFFIX}"),
            object_key: format!("{prefix}{OBJECT_KEY_SUFFIX}"),
        }
    }

    pub(crate) fn lock_key(&self) -> &str {
        &self.lock_key
    }

    pub(crate) fn object_key(&self) -> &str {
        &self.object_key
    }

    pub(crate) async fn watch_lock(
        &self,
        buffer: usize,
    ) -> Result<WatchStream> {
        Ok(self.kv.watch(&self.lock_key, buffer).await?)
    }

    /// Decodes the stored object into `target`.
    ///
    /// An absent key leaves `target` untouched.
    pub(crate) async fn load_into<T: Object>(
        &self,
        target: &mut T,
    ) -> Result<()> {
        if let Some(raw) = self.kv.get(&self.object_key).await? {
            *target = bincode::deserialize(&raw)?;
            trace!(key = %self.object_key, len = raw.len(), "object loaded");
        }
        Ok(())
    }

    /// Reads the lock holder recorded at the lock key.
    pub(crate) async fn load_metadata(&self) -> Result<Metadata> {
        let lock_holder = match self.kv.get(&self.lock_key).await? {
            Some(raw) => String::from_utf8_lossy(&raw).into_owned(),
            None => String::new(),
        };
        Ok(Metadata { lock_holder })
    }

    pub(crate) async fn store<T: Object>(
        &self,
        source: &T,
    ) -> Result<()> {
        let raw = bincode::serialize(source)?;
        self.kv.put(&self.object_key, Bytes::from(raw)).await?;
        Ok(())
    }

    pub(crate) async fn new_lock(
        &self,
        ttl: Duration,
        id: &str,
    ) -> Result<Box<dyn Locker>> {
        let options = LockOptions {
            ttl,
            value: Bytes::copy_from_slice(id.as_bytes()),
        };
        Ok(self.kv.new_lock(&self.lock_key, options).await?)
    }
}
