use super::reconcile_report::ReconcileReport;
use super::reconciler::Reconciler;
use crate::application::ports::connectivity::ConnectivitySignal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TRIGGER_CAPACITY: usize = 16;

/// Why a reconcile pass was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    ConnectivityRestored,
    Foreground,
    Timer,
    Manual,
}

/// Runs reconcile passes in the background: when connectivity comes back,
/// when the app returns to the foreground, on an optional timer and on
/// request. Triggers that arrive during a pass collapse into one follow-up
/// pass.
pub struct SyncScheduler {
    worker: Worker,
    triggers: mpsc::Sender<SyncTrigger>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
struct Worker {
    reconciler: Arc<Reconciler>,
    connectivity: Arc<dyn ConnectivitySignal>,
    shutdown: CancellationToken,
    last_report: Arc<RwLock<Option<ReconcileReport>>>,
}

impl SyncScheduler {
    /// Spawns the trigger loop. Must be called inside a tokio runtime.
    pub fn start(
        reconciler: Arc<Reconciler>,
        connectivity: Arc<dyn ConnectivitySignal>,
        interval: Option<Duration>,
    ) -> Self {
        let worker = Worker {
            reconciler,
            connectivity,
            shutdown: CancellationToken::new(),
            last_report: Arc::new(RwLock::new(None)),
        };
        let (triggers, receiver) = mpsc::channel(TRIGGER_CAPACITY);
        let handle = tokio::spawn(run_loop(worker.clone(), receiver, interval));
        info!(interval_secs = interval.map(|period| period.as_secs()), "Sync scheduler started");

        Self {
            worker,
            triggers,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn notify_foreground(&self) {
        self.enqueue(SyncTrigger::Foreground);
    }

    /// Queues a pass without waiting for it.
    pub fn request_sync(&self) {
        self.enqueue(SyncTrigger::Manual);
    }

    /// Runs a pass on the caller's task. Returns a skipped report while
    /// offline or while another pass is running.
    pub async fn sync_now(&self) -> ReconcileReport {
        match self.worker.run(SyncTrigger::Manual).await {
            Some(report) => report,
            None => ReconcileReport::skipped(Utc::now().timestamp_millis()),
        }
    }

    /// Cancels the pass in progress, if any. Entries not yet answered stay
    /// queued.
    pub async fn cancel_current_pass(&self) -> bool {
        self.worker.reconciler.cancel_running().await
    }

    pub async fn last_report(&self) -> Option<ReconcileReport> {
        self.worker.last_report.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.reconciler.is_running()
    }

    /// Cancels any running pass and waits for the loop to exit.
    pub async fn shutdown(&self) {
        self.worker.shutdown.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "Sync scheduler task ended abnormally");
            }
        }
        info!("Sync scheduler stopped");
    }

    fn enqueue(&self, trigger: SyncTrigger) {
        match self.triggers.try_send(trigger) {
            Ok(()) => {}
            // A queued trigger already covers this one.
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(?trigger, "Sync already queued");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(?trigger, "Sync scheduler is stopped");
            }
        }
    }
}

impl Worker {
    async fn run(&self, trigger: SyncTrigger) -> Option<ReconcileReport> {
        if !self.connectivity.is_online() {
            debug!(?trigger, "Offline, sync skipped");
            return None;
        }

        debug!(?trigger, "Starting reconcile pass");
        let report = self.reconciler.run_pass(&self.shutdown.child_token()).await;

        if report.skipped {
            return Some(report);
        }
        *self.last_report.write().await = Some(report.clone());
        Some(report)
    }
}

async fn run_loop(
    worker: Worker,
    mut receiver: mpsc::Receiver<SyncTrigger>,
    interval: Option<Duration>,
) {
    let mut online = worker.connectivity.subscribe();
    let mut was_online = *online.borrow_and_update();
    let mut watching = true;
    let mut ticker = interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let trigger = tokio::select! {
            _ = worker.shutdown.cancelled() => break,
            changed = online.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let now_online = *online.borrow_and_update();
                let restored = now_online && !was_online;
                was_online = now_online;
                if !restored {
                    continue;
                }
                info!("Connectivity restored");
                SyncTrigger::ConnectivityRestored
            }
            _ = next_tick(&mut ticker) => SyncTrigger::Timer,
            received = receiver.recv() => match received {
                Some(trigger) => trigger,
                None => break,
            },
        };

        let mut pending = Some(trigger);
        while let Some(trigger) = pending.take() {
            worker.run(trigger).await;
            if worker.shutdown.is_cancelled() {
                break;
            }
            if let Ok(next) = receiver.try_recv() {
                while receiver.try_recv().is_ok() {}
                pending = Some(next);
            }
        }
    }
    debug!("Sync scheduler loop exited");
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
