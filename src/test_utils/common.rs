use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use tokio::time::sleep;
use tokio::time::timeout;

use crate::BackoffPolicy;
use crate::BoxError;
use crate::DatastoreConfig;
use crate::Listener;
use crate::RetryPolicies;

/// Sample shared object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ClusterSettings {
    pub(crate) version: u64,
    pub(crate) backends: Vec<String>,
}

impl ClusterSettings {
    pub(crate) fn with_version(version: u64) -> Self {
        Self {
            version,
            backends: (0..version).map(|i| format!("10.0.0.{i}:8080")).collect(),
        }
    }
}

pub(crate) fn encode(settings: &ClusterSettings) -> Bytes {
    Bytes::from(bincode::serialize(settings).unwrap())
}

pub(crate) fn decode(raw: &Bytes) -> ClusterSettings {
    bincode::deserialize(raw).unwrap()
}

/// Millisecond-scale retries so tests converge quickly
pub(crate) fn fast_config() -> DatastoreConfig {
    DatastoreConfig {
        retry: RetryPolicies {
            resync: BackoffPolicy {
                initial_interval_ms: 10,
                multiplier: 2.0,
                randomization_factor: 0.0,
                max_interval_ms: 100,
                max_elapsed_ms: 0,
            },
            sync: BackoffPolicy {
                initial_interval_ms: 10,
                multiplier: 1.5,
                randomization_factor: 0.0,
                max_interval_ms: 100,
                max_elapsed_ms: 2000,
            },
        },
        ..Default::default()
    }
}

/// Polls `check` until it holds, panicking after five seconds.
pub(crate) async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(5), async {
        while !check().await {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Wraps a closure as a datastore listener.
pub(crate) fn listener<F>(f: F) -> Listener<ClusterSettings>
where
    F: Fn(&ClusterSettings) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}
