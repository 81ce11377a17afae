//! Keyed record lists persisted as one JSON array per storage key.
//!
//! Every failure in here degrades instead of propagating: a missing or
//! corrupt array reads as empty, a failed write is logged and dropped.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::models::Keyed;
use crate::storage::StoragePort;

pub struct LocalRecordStore<T> {
    storage: Arc<dyn StoragePort>,
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for LocalRecordStore<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            key: self.key,
            _marker: PhantomData,
        }
    }
}

impl<T> LocalRecordStore<T>
where
    T: Keyed + Serialize + DeserializeOwned + Clone,
{
    pub fn new(storage: Arc<dyn StoragePort>, key: &'static str) -> Self {
        Self {
            storage,
            key,
            _marker: PhantomData,
        }
    }

    pub fn storage(&self) -> Arc<dyn StoragePort> {
        Arc::clone(&self.storage)
    }

    pub fn list(&self) -> Vec<T> {
        let raw = match self.storage.get_item(self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                log::warn!("reading {} failed: {err}", self.key);
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                log::warn!("discarding malformed {} payload: {err}", self.key);
                Vec::new()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.list().into_iter().find(|record| record.key() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.list().iter().any(|record| record.key() == id)
    }

    /// Appends unless a record with the same id is already stored.
    pub fn add(&self, record: T) {
        let mut records = self.list();
        if records.iter().any(|existing| existing.key() == record.key()) {
            log::debug!("{} already holds {}", self.key, record.key());
            return;
        }
        records.push(record);
        self.write(&records);
    }

    pub fn remove(&self, id: &str) {
        let mut records = self.list();
        let before = records.len();
        records.retain(|record| record.key() != id);
        if records.len() != before {
            self.write(&records);
        }
    }

    pub fn update(&self, id: &str, record: T) {
        let mut records = self.list();
        match records.iter().position(|existing| existing.key() == id) {
            Some(index) => {
                records[index] = record;
                self.write(&records);
            }
            None => log::debug!("{} has no record {id} to update", self.key),
        }
    }

    pub fn clear(&self) {
        self.write(&[]);
    }

    fn write(&self, records: &[T]) {
        let payload = match serde_json::to_string(records) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("serializing {} failed: {err}", self.key);
                return;
            }
        };
        if let Err(err) = self.storage.set_item(self.key, &payload) {
            log::warn!("writing {} failed: {err}", self.key);
        }
    }
}
