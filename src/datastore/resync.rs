use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Listener;
use super::Object;
use super::ObjectCache;
use crate::kv::KvSource;
use crate::kv::WatchStream;
use crate::utils::backoff::ExponentialBackoff;
use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Lifecycle of the background resync task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncState {
    /// Following change notifications
    Running,
    /// Shut down through the lifetime token
    Stopped,
    /// Notification stream lost; the cache no longer follows the store
    Failed,
}

/// Counters describing the resync task, for external health checks.
#[derive(Debug)]
pub struct ResyncHealth {
    state: AtomicU8,
    reloads: AtomicU64,
    retries: AtomicU64,
}

impl Default for ResyncHealth {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(ResyncState::Running as u8),
            reloads: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }
}

impl ResyncHealth {
    pub fn state(&self) -> ResyncState {
        match self.state.load(Ordering::Acquire) {
            s if s == ResyncState::Running as u8 => ResyncState::Running,
            s if s == ResyncState::Stopped as u8 => ResyncState::Stopped,
            _ => ResyncState::Failed,
        }
    }

    /// Successful reloads since construction
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Acquire)
    }

    /// Failed attempts that were retried
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Acquire)
    }

    fn set_state(
        &self,
        state: ResyncState,
    ) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Background task reloading the cache on every lock key notification.
pub(crate) struct ResyncTask<T: Object> {
    pub(crate) source: KvSource,
    pub(crate) cache: Arc<ObjectCache<T>>,
    pub(crate) listener: Option<Listener<T>>,
    pub(crate) policy: BackoffPolicy,
    pub(crate) health: Arc<ResyncHealth>,
}

impl<T: Object> ResyncTask<T> {
    /// Runs until `token` is cancelled or the notification stream closes.
    ///
    /// Reload failures are retried with exponential backoff. The elapsed
    /// budget of a bounded policy covers one failure streak, starting at its
    /// first failure. A closed stream cancels `token` and ends the task.
    pub(crate) async fn run(
        self,
        mut events: WatchStream,
        token: CancellationToken,
    ) {
        let key = self.source.lock_key().to_string();
        info!(%key, "Datastore resync started");

        // Started by the first failure of a streak, cleared by the next successful reload
        let mut backoff: Option<ExponentialBackoff> = None;
        let mut pending = false;
        loop {
            let error = match self.follow(&mut events, &token, &mut backoff, &mut pending).await {
                Ok(()) => {
                    self.health.set_state(ResyncState::Stopped);
                    info!(%key, "Datastore resync stopped");
                    return;
                }
                Err(error) => error,
            };

            if error.is_permanent() {
                token.cancel();
                self.health.set_state(ResyncState::Failed);
                error!(%key, %error, "Error in watch datastore");
                return;
            }

            let backoff = backoff.get_or_insert_with(|| ExponentialBackoff::new(&self.policy));
            let Some(delay) = backoff.next_backoff() else {
                self.health.set_state(ResyncState::Failed);
                error!(%key, %error, "Error in watch datastore, retry budget exhausted");
                return;
            };
            self.health.retries.fetch_add(1, Ordering::AcqRel);
            warn!(%key, %error, ?delay, "Error in watch datastore, retrying");

            tokio::select! {
                _ = token.cancelled() => {
                    self.health.set_state(ResyncState::Stopped);
                    info!(%key, "Datastore resync stopped");
                    return;
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// Reloads on every notification. `pending` carries a reload that failed
    /// over to the next attempt, so recovery does not wait for a new event.
    async fn follow(
        &self,
        events: &mut WatchStream,
        token: &CancellationToken,
        backoff: &mut Option<ExponentialBackoff>,
        pending: &mut bool,
    ) -> Result<()> {
        loop {
            if *pending {
                self.reload().await?;
                *pending = false;
                *backoff = None;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                event = events.recv() => match event {
                    Some(event) => {
                        trace!(?event, "Datastore change received");
                        *pending = true;
                    }
                    None => {
                        return Err(Error::WatchClosed {
                            key: self.source.lock_key().to_string(),
                        })
                    }
                },
            }
        }
    }

    async fn reload(&self) -> Result<()> {
        let object = self.cache.reload(&self.source).await?;
        self.health.reloads.fetch_add(1, Ordering::AcqRel);

        if let Some(listener) = &self.listener {
            if let Err(error) = listener(&object) {
                error!(%error, "Error calling datastore listener");
            }
        }
        Ok(())
    }
}
