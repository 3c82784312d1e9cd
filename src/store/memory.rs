//! In-process store sink
//!
//! Keeps hashes in memory and records every operation in order. Used when
//! no external store is wanted and as the store double in tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::StoreSink;
use crate::error::Result;

/// One call made against the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Upsert {
        key: String,
        field: String,
        value: String,
    },
    Delete {
        key: String,
        field: String,
    },
    Clear {
        key: String,
    },
}

#[derive(Debug, Default)]
struct Inner {
    hashes: HashMap<String, BTreeMap<String, String>>,
    log: Vec<StoreOp>,
}

/// Hash store held in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: Mutex<Inner>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicked writer cannot leave a hash half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str, field: &str) -> Option<String> {
        self.lock()
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field).cloned())
    }

    /// All fields of a hash, sorted by field
    pub fn entries(&self, key: &str) -> Vec<(String, String)> {
        self.lock()
            .hashes
            .get(key)
            .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Every operation received so far, oldest first
    pub fn operations(&self) -> Vec<StoreOp> {
        self.lock().log.clone()
    }
}

#[async_trait]
impl StoreSink for MemorySink {
    async fn upsert(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        inner.log.push(StoreOp::Upsert {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, key: &str, field: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(hash) = inner.hashes.get_mut(key) {
            hash.remove(field);
        }
        inner.log.push(StoreOp::Delete {
            key: key.to_string(),
            field: field.to_string(),
        });
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.hashes.remove(key);
        inner.log.push(StoreOp::Clear {
            key: key.to_string(),
        });
        Ok(())
    }
}
