//! A builder for constructing a [`Datastore`].
//!
//! ## Example
//! ```ignore
//! let shutdown = CancellationToken::new();
//! let datastore = DatastoreBuilder::new(Arc::new(store), ClusterSettings::default())
//!     .lifetime(shutdown.clone())
//!     .listener(Arc::new(|settings: &ClusterSettings| {
//!         info!(?settings, "settings changed");
//!         Ok(())
//!     }))
//!     .build()
//!     .await?;
//! ```
//!
//! `build()` registers the watch on the lock key and spawns the resync task.
//! It fails only if the configuration is invalid or the watch cannot be
//! registered.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::resync::ResyncHealth;
use super::resync::ResyncTask;
use super::Datastore;
use super::DatastoreInner;
use super::Listener;
use super::Object;
use super::ObjectCache;
use crate::kv::KvSource;
use crate::kv::KvStore;
use crate::DatastoreConfig;
use crate::Result;

pub struct DatastoreBuilder<T: Object> {
    kv: Arc<dyn KvStore>,
    object: T,
    lifetime: CancellationToken,
    listener: Option<Listener<T>>,
    config: DatastoreConfig,
}

impl<T: Object> DatastoreBuilder<T> {
    /// `object` seeds the cache until the first reload.
    pub fn new(
        kv: Arc<dyn KvStore>,
        object: T,
    ) -> Self {
        Self {
            kv,
            object,
            lifetime: CancellationToken::new(),
            listener: None,
            config: DatastoreConfig::default(),
        }
    }

    /// Cancelling `lifetime` stops the resync task and aborts pending `begin` calls.
    pub fn lifetime(
        mut self,
        lifetime: CancellationToken,
    ) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn listener(
        mut self,
        listener: Listener<T>,
    ) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn config(
        mut self,
        config: DatastoreConfig,
    ) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> Result<Datastore<T>> {
        let config = self.config.validate()?;
        let source = KvSource::new(self.kv);
        let events = source.watch_lock(config.watch_buffer).await?;

        let cache = Arc::new(ObjectCache::new(self.object));
        let health = Arc::new(ResyncHealth::default());
        let resync_token = self.lifetime.child_token();

        let task = ResyncTask {
            source: source.clone(),
            cache: cache.clone(),
            listener: self.listener,
            policy: config.retry.resync,
            health: health.clone(),
        };
        let handle = tokio::spawn(task.run(events, resync_token.clone()));
        debug!(lock_key = %source.lock_key(), "Datastore created");

        Ok(Datastore {
            inner: Arc::new(DatastoreInner {
                source,
                cache,
                lifetime: self.lifetime,
                config,
                resync_token,
                resync_handle: Mutex::new(Some(handle)),
                health,
            }),
        })
    }
}
