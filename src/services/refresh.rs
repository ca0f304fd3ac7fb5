//! The refresh coordinator: the single background worker that owns the
//! fetch+reconcile+build cycle.
//!
//! A binary gate permits at most one in-flight run. Triggers land in a
//! length-1 slot with drop-oldest overflow; the internal schedule enqueues
//! into that slot, while an external trigger is rejected outright when a
//! run is already executing. All loops observe the process-wide stop
//! signal, and a run cancelled by the deadline still gets its fetch run
//! persisted as failed from a fresh context.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::{watch, Notify, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RefreshConfig;
use crate::errors::AppError;
use crate::models::PreviewSummary;
use crate::pipeline::{RefreshOutcome, RefreshPipeline};
use crate::services::events::{EventBus, RefreshEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResponse {
    Accepted,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Full,
    BuildOnly,
}

struct Inner {
    pipeline: RefreshPipeline,
    events: EventBus,
    config: RefreshConfig,
    gate: Semaphore,
    queued: Mutex<Option<RunKind>>,
    queue_notify: Notify,
    stop: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        pipeline: RefreshPipeline,
        events: EventBus,
        config: RefreshConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                events,
                config,
                gate: Semaphore::new(1),
                queued: Mutex::new(None),
                queue_notify: Notify::new(),
                stop,
            }),
        }
    }

    /// Whether a run currently holds the execution gate.
    pub fn is_busy(&self) -> bool {
        self.inner.gate.available_permits() == 0
    }

    /// External trigger for a full refresh. Rejected while a run is
    /// executing; while one is merely queued, the queued run is replaced.
    pub fn trigger_full(&self) -> TriggerResponse {
        self.trigger(RunKind::Full)
    }

    /// External trigger for a build-only cycle.
    pub fn trigger_build_only(&self) -> TriggerResponse {
        self.trigger(RunKind::BuildOnly)
    }

    fn trigger(&self, kind: RunKind) -> TriggerResponse {
        if self.is_busy() {
            return TriggerResponse::Busy;
        }
        self.enqueue(kind);
        TriggerResponse::Accepted
    }

    /// Length-1 queue with drop-oldest overflow.
    fn enqueue(&self, kind: RunKind) {
        let mut slot = self.inner.queued.lock().expect("trigger queue poisoned");
        if let Some(replaced) = slot.replace(kind) {
            info!("Replacing queued {:?} run with {:?}", replaced, kind);
        }
        drop(slot);
        self.inner.queue_notify.notify_one();
    }

    fn take_queued(&self) -> Option<RunKind> {
        self.inner.queued.lock().expect("trigger queue poisoned").take()
    }

    /// Operator dry-run against one provider. Runs under the same gate as
    /// refreshes; rejected while one is in flight.
    pub async fn preview(&self, provider_id: Uuid) -> Result<PreviewSummary, AppError> {
        let _permit = self
            .inner
            .gate
            .try_acquire()
            .map_err(|_| AppError::RefreshBusy)?;
        self.inner
            .pipeline
            .preview(provider_id)
            .await
            .map_err(|e| AppError::internal(e.to_string()))
    }

    /// Run the coordinator until the stop signal fires: startup delay,
    /// initial full refresh, then the trigger and schedule loops.
    pub async fn run(&self) -> Result<()> {
        let mut stop = self.inner.stop.clone();

        tokio::select! {
            _ = tokio::time::sleep(self.inner.config.startup_delay()) => {}
            _ = stop.changed() => return Ok(()),
        }

        info!("Refresh coordinator started; scheduling initial refresh");
        self.enqueue(RunKind::Full);

        let mut schedule = tokio::time::interval(self.inner.config.interval());
        schedule.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = self.inner.queue_notify.notified() => {
                    while let Some(kind) = self.take_queued() {
                        self.execute(kind).await;
                    }
                }
                _ = schedule.tick() => {
                    if self.is_busy() {
                        info!("Scheduled refresh skipped; a run is already in progress");
                    } else {
                        self.enqueue(RunKind::Full);
                    }
                }
                _ = stop.changed() => {
                    info!("Refresh coordinator stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn execute(&self, kind: RunKind) {
        let permit = match self.inner.gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        self.inner.events.publish(RefreshEvent::RefreshStarted);

        let deadline = self.inner.config.run_timeout();
        let result = tokio::time::timeout(deadline, async {
            match kind {
                RunKind::Full => self.inner.pipeline.full_refresh().await,
                RunKind::BuildOnly => self.inner.pipeline.build_only().await,
            }
        })
        .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("Refresh run failed: {:#}", e);
                RefreshOutcome::failed(format!("{e:#}"))
            }
            Err(_elapsed) => {
                let summary = format!(
                    "refresh exceeded the {}s deadline",
                    deadline.as_secs()
                );
                warn!("{}", summary);
                // The run future was dropped mid-flight; persist the
                // failure from this fresh, non-cancelled context.
                if let Some(run_id) = self.inner.pipeline.in_flight_run() {
                    if let Err(e) = self
                        .inner
                        .pipeline
                        .database()
                        .mark_fetch_run_failed(run_id, &summary)
                        .await
                    {
                        error!("Could not persist deadline failure for run {}: {}", run_id, e);
                    }
                    self.inner.pipeline.clear_in_flight();
                }
                RefreshOutcome::failed(summary)
            }
        };

        self.inner.events.publish(RefreshEvent::RefreshCompleted {
            succeeded: outcome.succeeded,
            error_summary: outcome.error_summary,
        });
        drop(permit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotConfig;
    use crate::database::Database;

    async fn test_coordinator() -> (RefreshCoordinator, watch::Sender<bool>) {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let pipeline = RefreshPipeline::new(
            db,
            SnapshotConfig {
                directory: std::env::temp_dir().join("m3undle-coordinator-test"),
                retention_count: 3,
            },
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let coordinator = RefreshCoordinator::new(
            pipeline,
            EventBus::new(),
            RefreshConfig {
                interval_hours: 4,
                timeout_minutes: 5,
                startup_delay_seconds: 0,
            },
            stop_rx,
        );
        (coordinator, stop_tx)
    }

    #[tokio::test]
    async fn triggers_collapse_to_one_queued_run() {
        let (coordinator, _stop) = test_coordinator().await;

        assert!(!coordinator.is_busy());
        assert_eq!(coordinator.trigger_full(), TriggerResponse::Accepted);
        assert_eq!(coordinator.trigger_build_only(), TriggerResponse::Accepted);

        // The second trigger replaced the first; only one run is queued.
        assert_eq!(coordinator.take_queued(), Some(RunKind::BuildOnly));
        assert_eq!(coordinator.take_queued(), None);
    }

    #[tokio::test]
    async fn stop_signal_ends_the_run_loop() {
        let (coordinator, stop_tx) = test_coordinator().await;
        let handle = tokio::spawn(async move { coordinator.run().await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("run loop did not stop")
            .unwrap()
            .unwrap();
    }
}
