use std::time::Duration;

// -
// Key namespace

/// Suffix appended to the client prefix to form the lock key
pub(crate) const LOCK_KEY_SUFFIX: &str = "/lock";

/// Suffix appended to the client prefix to form the object key
pub(crate) const OBJECT_KEY_SUFFIX: &str = "/object";

// -
// Transaction protocol

/// TTL of the distributed write lock
pub(crate) const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(20);

/// Upper bound for the post-lock cache sync check
pub(crate) const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-watcher notification buffer
pub(crate) const DEFAULT_WATCH_BUFFER: usize = 16;
