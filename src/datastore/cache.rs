use tokio::sync::RwLock;
use tokio::sync::RwLockWriteGuard;

use super::Metadata;
use super::Object;
use crate::kv::KvSource;
use crate::Result;

pub(crate) struct CachedState<T> {
    pub(crate) object: T,
    pub(crate) meta: Metadata,
}

/// Object and metadata behind one readers-writer guard.
///
/// Readers only ever get copies. Writers (resync reloads, commits) hold the
/// guard across their store round trips so they never interleave.
pub(crate) struct ObjectCache<T> {
    state: RwLock<CachedState<T>>,
}

impl<T: Object> ObjectCache<T> {
    pub(crate) fn new(object: T) -> Self {
        Self {
            state: RwLock::new(CachedState {
                object,
                meta: Metadata::default(),
            }),
        }
    }

    pub(crate) async fn get(&self) -> T {
        self.state.read().await.object.clone()
    }

    pub(crate) async fn lock_holder(&self) -> String {
        self.state.read().await.meta.lock_holder.clone()
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, CachedState<T>> {
        self.state.write().await
    }

    /// Reloads object and metadata from the store; returns the new object.
    ///
    /// Metadata is read first: a holder seen here has already been granted
    /// the lock, so the object read afterwards includes every earlier commit.
    pub(crate) async fn reload(
        &self,
        source: &KvSource,
    ) -> Result<T> {
        let mut state = self.state.write().await;
        let meta = source.load_metadata().await?;
        source.load_into(&mut state.object).await?;
        state.meta = meta;
        Ok(state.object.clone())
    }

    /// Reloads only the object.
    pub(crate) async fn load(
        &self,
        source: &KvSource,
    ) -> Result<T> {
        let mut state = self.state.write().await;
        source.load_into(&mut state.object).await?;
        Ok(state.object.clone())
    }
}
