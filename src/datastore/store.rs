#[cfg(test)]
use mockall::automock;

use super::Datastore;
use super::Object;
use super::Transaction;
use crate::Result;

/// Read and write access to one shared object.
///
/// Implemented by [`Datastore`]. Code that only needs to read or update the
/// object can depend on this trait and be tested against a mock.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Store<T: Object>: Send + Sync {
    /// Cached object, see [`Datastore::get`]
    async fn get(&self) -> T;

    /// Object read through from the key-value store
    async fn load(&self) -> Result<T>;

    /// Locks the object for writing, see [`Datastore::begin`]
    async fn begin(&self) -> Result<Box<dyn WriteTransaction<T>>>;
}

/// Single-use write handle returned by [`Store::begin`].
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait WriteTransaction<T: Object>: Send + Sync {
    fn id(&self) -> &str;

    async fn commit(
        &mut self,
        object: T,
    ) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: Object> Store<T> for Datastore<T> {
    async fn get(&self) -> T {
        Datastore::get(self).await
    }

    async fn load(&self) -> Result<T> {
        Datastore::load(self).await
    }

    async fn begin(&self) -> Result<Box<dyn WriteTransaction<T>>> {
        Ok(Box::new(Datastore::begin(self).await?))
    }
}

#[async_trait::async_trait]
impl<T: Object> WriteTransaction<T> for Transaction<T> {
    fn id(&self) -> &str {
        Transaction::id(self)
    }

    async fn commit(
        &mut self,
        object: T,
    ) -> Result<()> {
        Transaction::commit(self, object).await
    }
}
