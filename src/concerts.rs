use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::listing;
use crate::models::ConcertRecord;
use crate::storage::StoragePort;
use crate::store::LocalRecordStore;

pub const SAVED_CONCERTS_KEY: &str = "savedConcerts";
pub const SCANNED_CONCERTS_KEY: &str = "scannedConcerts";
pub const LAST_SYNC_KEY: &str = "scannedConcertsLastSync";

/// Concerts the user bookmarked.
#[derive(Clone)]
pub struct SavedConcertStore {
    records: LocalRecordStore<ConcertRecord>,
}

impl SavedConcertStore {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self {
            records: LocalRecordStore::new(storage, SAVED_CONCERTS_KEY),
        }
    }

    pub fn list(&self) -> Vec<ConcertRecord> {
        self.records.list()
    }

    pub fn list_sorted(&self, tz: Tz) -> Vec<ConcertRecord> {
        let mut concerts = self.records.list();
        listing::sort_soonest_first(&mut concerts, tz);
        concerts
    }

    pub fn save(&self, concert: ConcertRecord) {
        self.records.add(concert);
    }

    pub fn unsave(&self, id: &str) {
        self.records.remove(id);
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.records.contains(id)
    }
}

/// Concerts acquired by scanning, plus the time they were last checked
/// against the remote store.
#[derive(Clone)]
pub struct ScannedConcertStore {
    records: LocalRecordStore<ConcertRecord>,
}

impl ScannedConcertStore {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self {
            records: LocalRecordStore::new(storage, SCANNED_CONCERTS_KEY),
        }
    }

    pub fn list(&self) -> Vec<ConcertRecord> {
        self.records.list()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.list().into_iter().map(|r| r.id).collect()
    }

    pub fn get(&self, id: &str) -> Option<ConcertRecord> {
        self.records.get(id)
    }

    pub fn add(&self, concert: ConcertRecord) {
        self.records.add(concert);
    }

    pub fn remove(&self, id: &str) {
        self.records.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains(id)
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        let storage = self.records.storage();
        let raw = match storage.get_item(LAST_SYNC_KEY) {
            Ok(raw) => raw?,
            Err(err) => {
                log::warn!("reading {LAST_SYNC_KEY} failed: {err}");
                return None;
            }
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(err) => {
                log::warn!("ignoring malformed {LAST_SYNC_KEY} value {raw:?}: {err}");
                None
            }
        }
    }

    pub fn set_last_sync_at(&self, at: DateTime<Utc>) {
        if let Err(err) = self
            .records
            .storage()
            .set_item(LAST_SYNC_KEY, &at.to_rfc3339())
        {
            log::warn!("writing {LAST_SYNC_KEY} failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn record(id: &str, date: &str) -> ConcertRecord {
        ConcertRecord::new(id, "Concert", date, "Hall")
    }

    #[test]
    fn saved_store_sorts_soonest_first() {
        let saved = SavedConcertStore::new(Arc::new(MemoryStorage::new()));
        saved.save(record("b", "4/20/2025 7:30pm"));
        saved.save(record("a", "3/30/2025 7:30pm"));
        saved.save(record("c", "not a date"));
        let ids: Vec<_> = saved.list_sorted(New_York).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(saved.list()[0].id, "b");
    }

    #[test]
    fn saved_and_scanned_share_storage_but_not_keys() {
        let storage: Arc<dyn StoragePort> = Arc::new(MemoryStorage::new());
        let saved = SavedConcertStore::new(storage.clone());
        let scanned = ScannedConcertStore::new(storage);
        scanned.add(record("a", "2025-04-02"));
        assert!(scanned.contains("a"));
        assert!(!saved.is_saved("a"));
        saved.save(record("a", "2025-04-02"));
        saved.unsave("a");
        assert!(scanned.contains("a"));
    }

    #[test]
    fn last_sync_round_trips_and_tolerates_garbage() {
        let storage = Arc::new(MemoryStorage::new());
        let scanned = ScannedConcertStore::new(storage.clone());
        assert_eq!(scanned.last_sync_at(), None);

        let at = Utc.with_ymd_and_hms(2025, 3, 30, 23, 30, 0).unwrap();
        scanned.set_last_sync_at(at);
        assert_eq!(scanned.last_sync_at(), Some(at));

        storage
            .set_item(LAST_SYNC_KEY, "yesterday")
            .expect("seed garbage");
        assert_eq!(scanned.last_sync_at(), None);
    }
}
