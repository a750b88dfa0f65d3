//! Device type to store client lookup table

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ShardConfig;
use crate::store::{MemcacheClient, StoreClient};

/// Immutable map of device type to store client.
///
/// Built once before any pipeline task starts and shared through an `Arc`;
/// nothing mutates it afterwards.
pub struct ShardTable {
    clients: HashMap<String, Arc<dyn StoreClient>>,
}

impl ShardTable {
    /// One memcached client per configured shard, each with `timeout`.
    pub fn connect(config: &ShardConfig, timeout: Duration) -> Self {
        Self::from_clients(config.iter().map(|(device_type, endpoint)| {
            let client: Arc<dyn StoreClient> = Arc::new(MemcacheClient::new(endpoint, timeout));
            (device_type.to_string(), client)
        }))
    }

    /// Build a table from arbitrary client handles.
    pub fn from_clients<I, S>(clients: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn StoreClient>)>,
        S: Into<String>,
    {
        Self {
            clients: clients.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, device_type: &str) -> Option<&Arc<dyn StoreClient>> {
        self.clients.get(device_type)
    }

    /// Configured device types, sorted
    pub fn device_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ShardTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardTable")
            .field("device_types", &self.device_types())
            .finish()
    }
}
