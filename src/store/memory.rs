//! In-memory store
//!
//! HashMap wrapped in a parking_lot RwLock: many concurrent readers, one
//! writer at a time. Options are accepted and ignored.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::Store;
use crate::error::Result;
use crate::protocol::{Options, Value};

/// Store that keeps everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<Vec<u8>, Value>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn key_exists(&self, key: &[u8], _options: &Options) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn load(&self, key: &[u8], _options: &Options) -> Result<Option<Value>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn store(&self, key: &[u8], value: Value, _options: &Options) -> Result<()> {
        self.data.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8], _options: &Options) -> Result<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn clear(&self, _options: &Options) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }
}
