use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::kv::LockOptions;
use crate::kv::Locker;
use crate::kv::WatchEvent;
use crate::kv::WatchStream;
use crate::KvError;
use crate::KvResult;
use crate::KvStore;
use crate::MemKvStore;

/// [`MemKvStore`] wrapper with switchable failures.
pub(crate) struct FlakyKvStore {
    pub(crate) inner: MemKvStore,
    failing_gets: AtomicU32,
    failing_puts: AtomicU32,
    mute_watch: AtomicBool,
    get_calls: AtomicU32,
    put_calls: AtomicU32,
    /// Senders of muted streams, kept so the streams stay open
    muted: Mutex<Vec<mpsc::Sender<WatchEvent>>>,
}

impl FlakyKvStore {
    pub(crate) fn new(inner: MemKvStore) -> Self {
        Self {
            inner,
            failing_gets: AtomicU32::new(0),
            failing_puts: AtomicU32::new(0),
            mute_watch: AtomicBool::new(false),
            get_calls: AtomicU32::new(0),
            put_calls: AtomicU32::new(0),
            muted: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_next_gets(
        &self,
        n: u32,
    ) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_puts(
        &self,
        n: u32,
    ) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Watch streams opened from now on stay open but never deliver.
    pub(crate) fn mute_watch(&self) {
        self.mute_watch.store(true, Ordering::SeqCst);
    }

    pub(crate) fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait::async_trait]
impl KvStore for FlakyKvStore {
    fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    async fn watch(
        &self,
        key: &str,
        buffer: usize,
    ) -> KvResult<WatchStream> {
        if self.mute_watch.load(Ordering::SeqCst) {
            let (tx, rx) = mpsc::channel(buffer.max(1));
            self.muted.lock().push(tx);
            return Ok(rx);
        }
        self.inner.watch(key, buffer).await
    }

    async fn get(
        &self,
        key: &str,
    ) -> KvResult<Option<Bytes>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_gets) {
            return Err(KvError::Timeout);
        }
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> KvResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_puts) {
            return Err(KvError::Server("injected put failure".to_string()));
        }
        self.inner.put(key, value).await
    }

    async fn new_lock(
        &self,
        key: &str,
        options: LockOptions,
    ) -> KvResult<Box<dyn Locker>> {
        self.inner.new_lock(key, options).await
    }
}
