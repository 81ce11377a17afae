use std::sync::Arc;

use chrono::Utc;

use crate::models::{ConcertRecord, JournalDraft, JournalEntry};
use crate::storage::StoragePort;
use crate::store::LocalRecordStore;
use crate::utils;

pub const JOURNAL_ENTRIES_KEY: &str = "journalEntries";

#[derive(Clone)]
pub struct JournalStore {
    entries: LocalRecordStore<JournalEntry>,
}

impl JournalStore {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self {
            entries: LocalRecordStore::new(storage, JOURNAL_ENTRIES_KEY),
        }
    }

    pub fn list(&self) -> Vec<JournalEntry> {
        self.entries.list()
    }

    pub fn get(&self, id: &str) -> Option<JournalEntry> {
        self.entries.get(id)
    }

    /// The entry already written about this concert, matched by title.
    pub fn find_for_concert(&self, record: &ConcertRecord) -> Option<JournalEntry> {
        let title = utils::clean_text(&record.title);
        if title.is_empty() {
            return None;
        }
        self.entries.list().into_iter().find(|entry| entry.title == title)
    }

    pub fn create(&self, draft: JournalDraft) -> JournalEntry {
        let id = self.next_id(Utc::now().timestamp_millis());
        let entry = draft.into_entry(id);
        self.entries.add(entry.clone());
        entry
    }

    /// Rewrites an entry from a draft, keeping its id and recomputing the preview.
    pub fn edit(&self, id: &str, draft: JournalDraft) -> Option<JournalEntry> {
        if !self.entries.contains(id) {
            return None;
        }
        let entry = draft.into_entry(id.to_string());
        self.entries.update(id, entry.clone());
        Some(entry)
    }

    pub fn delete(&self, id: &str) {
        self.entries.remove(id);
    }

    // millisecond ids can collide when two entries land in the same tick
    fn next_id(&self, millis: i64) -> String {
        let taken: Vec<String> = self.entries.list().into_iter().map(|e| e.id).collect();
        let mut candidate = millis;
        while taken.iter().any(|id| *id == candidate.to_string()) {
            candidate += 1;
        }
        candidate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn draft(title: &str, content: &str) -> JournalDraft {
        JournalDraft {
            title: title.into(),
            date: "2025-03-30T19:30".into(),
            venue: "Tyler-Tallman Hall".into(),
            rating: 4,
            content: content.into(),
        }
    }

    #[test]
    fn create_assigns_unique_ids() {
        let journal = JournalStore::new(Arc::new(MemoryStorage::new()));
        let first = journal.create(draft("Czech Chamber Music", "Lovely Dvořák."));
        let second = journal.create(draft("Czech Chamber Music", "Went again."));
        assert_ne!(first.id, second.id);
        assert_eq!(journal.list().len(), 2);
        assert_eq!(journal.get(&first.id).map(|e| e.preview).as_deref(), Some("Lovely Dvořák."));
    }

    #[test]
    fn next_id_skips_taken_millis() {
        let journal = JournalStore::new(Arc::new(MemoryStorage::new()));
        journal.entries.add(draft("a", "a").into_entry("1000".into()));
        journal.entries.add(draft("b", "b").into_entry("1001".into()));
        assert_eq!(journal.next_id(1000), "1002");
        assert_eq!(journal.next_id(5), "5");
    }

    #[test]
    fn edit_keeps_position_and_refreshes_preview() {
        let journal = JournalStore::new(Arc::new(MemoryStorage::new()));
        journal.entries.add(draft("first", "short").into_entry("1".into()));
        journal.entries.add(draft("second", "short").into_entry("2".into()));

        let long = "m".repeat(140);
        let edited = journal.edit("1", draft("first, revised", &long)).expect("entry exists");
        assert_eq!(edited.preview, format!("{}...", "m".repeat(100)));

        let entries = journal.list();
        assert_eq!(entries[0].id, "1");
        assert_eq!(entries[0].title, "first, revised");
        assert_eq!(entries[1].id, "2");
        assert!(journal.edit("missing", draft("x", "y")).is_none());
    }

    #[test]
    fn finds_existing_entry_for_a_concert() {
        let journal = JournalStore::new(Arc::new(MemoryStorage::new()));
        journal.entries.add(draft("Czech Chamber Music", "a").into_entry("1".into()));
        journal.entries.add(draft("Winter Gala", "b").into_entry("2".into()));

        let concert = ConcertRecord::new("abc", "  Czech  Chamber Music ", "3/30/2025", "Hall");
        assert_eq!(journal.find_for_concert(&concert).map(|e| e.id).as_deref(), Some("1"));

        let other = ConcertRecord::new("xyz", "Spring Gala", "4/20/2025", "Hall");
        assert!(journal.find_for_concert(&other).is_none());
        let untitled = ConcertRecord::new("xyz", " ", "4/20/2025", "Hall");
        assert!(journal.find_for_concert(&untitled).is_none());
    }

    #[test]
    fn delete_removes_only_the_target() {
        let journal = JournalStore::new(Arc::new(MemoryStorage::new()));
        journal.entries.add(draft("a", "a").into_entry("1".into()));
        journal.entries.add(draft("b", "b").into_entry("2".into()));
        journal.delete("1");
        journal.delete("1");
        let ids: Vec<_> = journal.list().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["2"]);
    }
}
