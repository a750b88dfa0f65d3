//! Key-value store capability
//!
//! The loader only needs whole-value `set` (overwrite) and `get`, each bounded
//! by the client's own timeout. [`MemcacheClient`] speaks the memcached text
//! protocol; [`MemoryStore`] keeps values in process.

mod memcache;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memcache::{MemcacheClient, MAX_KEY_LENGTH};
pub use memory::MemoryStore;

/// Errors returned by a store client
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected store response: {0}")]
    Protocol(String),

    #[error("value was not stored")]
    NotStored,

    #[error("invalid key {0:?}")]
    InvalidKey(String),
}

/// A handle to one shard of the key-value store
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Overwrite the value stored under `key`.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
