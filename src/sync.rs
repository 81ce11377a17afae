//! Pruning scanned concerts that the remote store no longer publishes.
//!
//! A cycle verifies local ids against the remote in fixed-size batches, then
//! removes whatever was positively confirmed missing. A batch whose lookups
//! fail counts as fully present, so a flaky network never deletes anything.
//!
//! The read-modify-write in a cycle is not atomic with respect to user
//! actions on the same stores (e.g. unsaving mid-cycle): last writer wins.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};

use crate::concerts::{SavedConcertStore, ScannedConcertStore};
use crate::remote::{verify_exist, RemoteConcertLookup};

/// True when at least `interval` has passed since the last completed sync.
pub fn should_sync(
    now: DateTime<Utc>,
    last_sync_at: Option<DateTime<Utc>>,
    interval: Duration,
) -> bool {
    match last_sync_at {
        Some(last) => now.signed_duration_since(last) >= interval,
        None => true,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub checked: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub removed: Vec<String>,
    /// Another cycle was already running; nothing was done.
    pub skipped: bool,
    /// The owner stopped while lookups were in flight; results were dropped.
    pub abandoned: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

pub struct SyncReconciler<R> {
    remote: R,
    scanned: ScannedConcertStore,
    saved: Option<SavedConcertStore>,
    batch_size: usize,
    in_flight: AtomicBool,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R: RemoteConcertLookup> SyncReconciler<R> {
    pub fn new(remote: R, scanned: ScannedConcertStore, batch_size: usize) -> Self {
        Self {
            remote,
            scanned,
            saved: None,
            batch_size: batch_size.max(1),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Also drop pruned concerts from the saved list.
    pub fn with_saved(mut self, saved: SavedConcertStore) -> Self {
        self.saved = Some(saved);
        self
    }

    pub fn scanned(&self) -> &ScannedConcertStore {
        &self.scanned
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.scanned.last_sync_at()
    }

    pub fn is_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        should_sync(now, self.last_sync_at(), interval)
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one cycle and stamps `now` as the last sync time.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> SyncReport {
        self.reconcile_while(now, &AtomicBool::new(true)).await
    }

    /// Like [`reconcile`](Self::reconcile), but drops the results if `live`
    /// was cleared while lookups were in flight. Each owner of a cycle holds
    /// its own flag, so a restarted owner never revives a stale cycle.
    pub async fn reconcile_while(&self, now: DateTime<Utc>, live: &AtomicBool) -> SyncReport {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("sync already in flight, skipping");
            return SyncReport::skipped();
        }
        let _guard = FlightGuard(&self.in_flight);

        let local_ids = self.scanned.ids();
        let mut report = SyncReport {
            checked: local_ids.len(),
            ..SyncReport::default()
        };

        let mut surviving: HashSet<String> = HashSet::with_capacity(local_ids.len());
        for batch in local_ids.chunks(self.batch_size) {
            report.batches += 1;
            match verify_exist(&self.remote, batch).await {
                Ok(confirmed) => surviving.extend(confirmed),
                Err(err) => {
                    log::warn!(
                        "could not verify {} concerts, keeping them this cycle: {err}",
                        batch.len()
                    );
                    report.failed_batches += 1;
                    surviving.extend(batch.iter().cloned());
                }
            }
        }

        // nothing below awaits, so this check covers every write
        if !live.load(Ordering::Acquire) {
            log::debug!("sync owner stopped mid-cycle, dropping results");
            report.abandoned = true;
            return report;
        }

        for id in local_ids.iter().filter(|id| !surviving.contains(*id)) {
            self.scanned.remove(id);
            if let Some(saved) = &self.saved {
                saved.unsave(id);
            }
            report.removed.push(id.clone());
        }
        self.scanned.set_last_sync_at(now);

        log::info!(
            "sync checked {} concerts in {} batches, removed {}, {} batches unverified",
            report.checked,
            report.batches,
            report.removed.len(),
            report.failed_batches
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Concert, ConcertRecord};
    use crate::remote::RemoteError;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ScriptedRemote {
        known: HashSet<String>,
        failing: HashSet<String>,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedRemote {
        fn knowing(ids: &[&str]) -> Self {
            Self {
                known: ids.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl RemoteConcertLookup for ScriptedRemote {
        async fn fetch_by_id(&self, id: &str) -> Result<Option<Concert>, RemoteError> {
            Ok(self.known.contains(id).then(Concert::default))
        }

        async fn exists(&self, id: &str) -> Result<bool, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now_active, Ordering::SeqCst);
            self.seen.lock().expect("seen lock").push(id.to_string());
            tokio::task::yield_now().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(id) {
                return Err(RemoteError::Http("timeout".into()));
            }
            Ok(self.known.contains(id))
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 30, 19, minute, 0).unwrap()
    }

    fn seeded(ids: &[String]) -> (ScannedConcertStore, SavedConcertStore) {
        let storage = Arc::new(MemoryStorage::new());
        let scanned = ScannedConcertStore::new(storage.clone());
        let saved = SavedConcertStore::new(storage);
        for id in ids {
            scanned.add(ConcertRecord::new(id, "Concert", "2025-04-20", "Hall"));
        }
        (scanned, saved)
    }

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn should_sync_respects_interval() {
        let interval = Duration::minutes(5);
        assert!(!should_sync(at(4), Some(at(0)), interval));
        assert!(should_sync(at(5), Some(at(0)), interval));
        assert!(should_sync(at(6), Some(at(0)), interval));
        assert!(should_sync(at(0), None, interval));
    }

    #[tokio::test]
    async fn prunes_concerts_missing_remotely() {
        let (scanned, saved) = seeded(&names(&["A", "B", "C"]));
        saved.save(ConcertRecord::new("B", "Concert", "2025-04-20", "Hall"));
        saved.save(ConcertRecord::new("C", "Concert", "2025-04-20", "Hall"));
        let reconciler =
            SyncReconciler::new(ScriptedRemote::knowing(&["A", "C"]), scanned.clone(), 10)
                .with_saved(saved.clone());

        let report = reconciler.reconcile(at(7)).await;

        assert_eq!(scanned.ids(), names(&["A", "C"]));
        assert_eq!(report.removed, names(&["B"]));
        assert_eq!(scanned.last_sync_at(), Some(at(7)));
        assert!(!saved.is_saved("B"));
        assert!(saved.is_saved("C"));
    }

    #[tokio::test]
    async fn saved_list_is_untouched_without_coupling() {
        let (scanned, saved) = seeded(&names(&["A", "B"]));
        saved.save(ConcertRecord::new("B", "Concert", "2025-04-20", "Hall"));
        let reconciler = SyncReconciler::new(ScriptedRemote::knowing(&["A"]), scanned.clone(), 10);
        reconciler.reconcile(at(1)).await;
        assert_eq!(scanned.ids(), names(&["A"]));
        assert!(saved.is_saved("B"));
    }

    #[tokio::test]
    async fn failed_batch_keeps_its_ids() {
        let ids: Vec<String> = (0..25).map(|i| format!("c{i:02}")).collect();
        let (scanned, _) = seeded(&ids);
        // odd ids are gone remotely; c13 sits in the second batch and times out
        let remote = ScriptedRemote {
            known: ids
                .iter()
                .filter(|id| id.ends_with(['0', '2', '4', '6', '8']))
                .cloned()
                .collect(),
            failing: names(&["c13"]).into_iter().collect(),
            ..ScriptedRemote::default()
        };
        let reconciler = SyncReconciler::new(remote, scanned.clone(), 10);

        let report = reconciler.reconcile(at(2)).await;

        assert_eq!(report.failed_batches, 1);
        let left: HashSet<String> = scanned.ids().into_iter().collect();
        for (i, id) in ids.iter().enumerate() {
            let in_second_batch = (10..20).contains(&i);
            let expected = i % 2 == 0 || in_second_batch;
            assert_eq!(left.contains(id), expected, "{id}");
        }
        assert_eq!(scanned.last_sync_at(), Some(at(2)));
    }

    #[tokio::test]
    async fn total_failure_removes_nothing_but_completes() {
        let (scanned, _) = seeded(&names(&["A", "B"]));
        let remote = ScriptedRemote {
            failing: names(&["A", "B"]).into_iter().collect(),
            ..ScriptedRemote::default()
        };
        let reconciler = SyncReconciler::new(remote, scanned.clone(), 10);
        let report = reconciler.reconcile(at(3)).await;
        assert!(report.removed.is_empty());
        assert_eq!(scanned.ids(), names(&["A", "B"]));
        assert_eq!(scanned.last_sync_at(), Some(at(3)));
    }

    #[tokio::test]
    async fn verifies_in_bounded_batches() {
        let ids: Vec<String> = (0..25).map(|i| format!("c{i:02}")).collect();
        let (scanned, _) = seeded(&ids);
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let reconciler = SyncReconciler::new(ScriptedRemote::knowing(&refs), scanned.clone(), 10);

        let report = reconciler.reconcile(at(4)).await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.checked, 25);
        assert!(report.removed.is_empty());
        let remote = &reconciler.remote;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 25);
        assert!(remote.peak.load(Ordering::SeqCst) <= 10);
        let mut seen = remote.seen.lock().expect("seen lock").clone();
        seen.sort();
        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn empty_store_still_records_sync_time() {
        let (scanned, _) = seeded(&[]);
        let reconciler = SyncReconciler::new(ScriptedRemote::default(), scanned.clone(), 10);
        let report = reconciler.reconcile(at(5)).await;
        assert_eq!(report.batches, 0);
        assert_eq!(scanned.last_sync_at(), Some(at(5)));
        assert!(!reconciler.is_due(at(9), Duration::minutes(5)));
        assert!(reconciler.is_due(at(10), Duration::minutes(5)));
    }

    #[tokio::test]
    async fn stopped_owner_gets_no_writes() {
        let (scanned, _) = seeded(&names(&["A", "B"]));
        let reconciler = SyncReconciler::new(ScriptedRemote::knowing(&["A"]), scanned.clone(), 10);
        let report = reconciler
            .reconcile_while(at(6), &AtomicBool::new(false))
            .await;
        assert!(report.abandoned);
        assert_eq!(scanned.ids(), names(&["A", "B"]));
        assert_eq!(scanned.last_sync_at(), None);
    }

    #[tokio::test]
    async fn overlapping_cycles_are_skipped() {
        let (scanned, _) = seeded(&names(&["A"]));
        let reconciler = SyncReconciler::new(ScriptedRemote::knowing(&["A"]), scanned, 10);
        reconciler.in_flight.store(true, Ordering::SeqCst);
        assert!(reconciler.reconcile(at(1)).await.skipped);
        reconciler.in_flight.store(false, Ordering::SeqCst);
        let report = reconciler.reconcile(at(1)).await;
        assert!(!report.skipped);
        assert!(!reconciler.is_syncing());
    }
}
