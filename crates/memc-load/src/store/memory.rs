//! In-process store

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{StoreClient, StoreError};

/// `HashMap`-backed store that can be told to reject the first N writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
    reject_first: u64,
    set_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose first `n` `set` calls fail. `u64::MAX` never accepts a write.
    pub fn rejecting_first(n: u64) -> Self {
        Self {
            reject_first: n,
            ..Self::default()
        }
    }

    /// Number of `set` calls received, failed ones included
    pub fn set_calls(&self) -> u64 {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // a poisoned map is still a valid map
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let call = self.set_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.reject_first {
            return Err(StoreError::Protocol("SERVER_ERROR rejected".to_string()));
        }
        self.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.value(key))
    }
}
