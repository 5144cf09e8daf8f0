#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kv_datastore::BackoffPolicy;
use kv_datastore::Datastore;
use kv_datastore::DatastoreBuilder;
use kv_datastore::DatastoreConfig;
use kv_datastore::MemKvStore;
use kv_datastore::RetryPolicies;
use serde::Deserialize;
use serde::Serialize;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Shared object used across the integration tests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub revision: u64,
    pub routes: Vec<(String, String)>,
}

impl RoutingTable {
    pub fn next(&self) -> Self {
        let mut routes = self.routes.clone();
        routes.push((format!("/svc{}", self.revision), format!("10.0.1.{}:80", self.revision)));
        Self {
            revision: self.revision + 1,
            routes,
        }
    }
}

pub fn test_config() -> DatastoreConfig {
    DatastoreConfig {
        retry: RetryPolicies {
            resync: BackoffPolicy {
                initial_interval_ms: 5,
                multiplier: 2.0,
                randomization_factor: 0.0,
                max_interval_ms: 50,
                max_elapsed_ms: 0,
            },
            sync: BackoffPolicy {
                initial_interval_ms: 5,
                multiplier: 1.5,
                randomization_factor: 0.0,
                max_interval_ms: 50,
                max_elapsed_ms: 5000,
            },
        },
        ..Default::default()
    }
}

/// One "process" attached to the shared in-memory cluster store
pub async fn node(
    store: &MemKvStore,
    lifetime: CancellationToken,
    config: DatastoreConfig,
) -> Datastore<RoutingTable> {
    DatastoreBuilder::new(Arc::new(store.clone()), RoutingTable::default())
        .lifetime(lifetime)
        .config(config)
        .build()
        .await
        .unwrap()
}

pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(10), async {
        while !check().await {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
