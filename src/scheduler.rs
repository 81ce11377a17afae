//! Periodic background sync with explicit start/stop.
//!
//! `start` runs one cycle right away when a sync is due, then one per
//! interval. Cycles are awaited inline, so a slow cycle delays the next tick
//! instead of overlapping it. Every run carries its own liveness flag;
//! stopping clears it first, which lets in-flight lookups finish without
//! touching the stores, even if a new run starts on the same reconciler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::remote::RemoteConcertLookup;
use crate::sync::SyncReconciler;

struct Running {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    live: Arc<AtomicBool>,
}

impl Running {
    fn is_active(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.handle.is_finished()
    }

    fn stop(&self) {
        self.live.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);
    }
}

pub struct SyncScheduler<R: RemoteConcertLookup + 'static> {
    reconciler: Arc<SyncReconciler<R>>,
    interval: Duration,
    running: Option<Running>,
}

impl<R: RemoteConcertLookup + 'static> SyncScheduler<R> {
    pub fn new(reconciler: Arc<SyncReconciler<R>>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval: interval.max(Duration::from_millis(1)),
            running: None,
        }
    }

    pub fn reconciler(&self) -> &Arc<SyncReconciler<R>> {
        &self.reconciler
    }

    /// False once a stop was requested, even while the old task winds down.
    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(Running::is_active)
    }

    /// Must be called from within a tokio runtime. A second call while
    /// running is a no-op; a run that is still winding down after a stop
    /// request is left to finish on its own and replaced.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if let Some(stale) = self.running.take() {
            stale.stop();
        }

        let live = Arc::new(AtomicBool::new(true));
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let reconciler = Arc::clone(&self.reconciler);
        let interval = self.interval;
        let due_after = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
        // cadence is anchored at start, not at the task's first poll
        let first_tick = Instant::now() + interval;
        let token = Arc::clone(&live);

        let handle = tokio::spawn(async move {
            if reconciler.is_due(Utc::now(), due_after) {
                reconciler.reconcile_while(Utc::now(), &token).await;
            } else {
                log::debug!("last sync is recent, waiting for the next tick");
            }

            let mut ticker = interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if !token.load(Ordering::Acquire) {
                            break;
                        }
                        reconciler.reconcile_while(Utc::now(), &token).await;
                    }
                }
            }
            log::debug!("sync scheduler stopped");
        });

        log::info!("sync scheduler started, every {}s", interval.as_secs());
        self.running = Some(Running {
            handle,
            shutdown,
            live,
        });
    }

    /// Stops future cycles without waiting. Results of a cycle already in
    /// flight are discarded.
    pub fn request_stop(&mut self) {
        if let Some(running) = &self.running {
            running.stop();
        }
    }

    /// Stops the timer and waits for the background task to wind down.
    pub async fn stop(&mut self) {
        self.request_stop();
        if let Some(running) = self.running.take() {
            if let Err(err) = running.handle.await {
                log::warn!("sync scheduler task ended abnormally: {err}");
            }
        }
    }
}

impl<R: RemoteConcertLookup + 'static> Drop for SyncScheduler<R> {
    fn drop(&mut self) {
        self.request_stop();
    }
}
