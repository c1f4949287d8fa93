//! Timer-driven scheduler for the pipeline's background jobs.
//!
//! Fires independent interval jobs: the auto-link pass, the operation
//! creation sweep, the knowledge cleanup, and the backfill queue drain.
//! Organizations are processed sequentially inside a job, each behind a
//! per-org lease, and every item failure stays inside its own boundary —
//! a bad organization never aborts the tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use opsmail_core::defaults;
use opsmail_core::Result;
use opsmail_pipeline::{AutoLinker, KnowledgeService, OperationCreator};

use crate::leases::OrgLeases;
use crate::queue::BackfillQueue;

/// Broadcast channel capacity for scheduler events.
const EVENT_CAPACITY: usize = 64;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seconds between auto-link passes.
    pub auto_link_interval_secs: u64,
    /// Seconds between operation creation sweeps.
    pub creation_sweep_interval_secs: u64,
    /// Seconds between knowledge cleanup passes.
    pub knowledge_cleanup_interval_secs: u64,
    /// Seconds between backfill queue polls.
    pub backfill_poll_interval_secs: u64,
    /// Whether scheduled processing is enabled.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_link_interval_secs: defaults::AUTO_LINK_INTERVAL_SECS,
            creation_sweep_interval_secs: defaults::CREATION_SWEEP_INTERVAL_SECS,
            knowledge_cleanup_interval_secs: defaults::KNOWLEDGE_CLEANUP_INTERVAL_SECS,
            backfill_poll_interval_secs: 5,
            enabled: true,
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OPSMAIL_SCHEDULER_ENABLED` | `true` | Enable/disable scheduled processing |
    /// | `OPSMAIL_AUTO_LINK_INTERVAL_SECS` | `300` | Auto-link pass interval |
    /// | `OPSMAIL_CREATION_SWEEP_INTERVAL_SECS` | `600` | Creation sweep interval |
    /// | `OPSMAIL_KNOWLEDGE_CLEANUP_INTERVAL_SECS` | `3600` | Knowledge cleanup interval |
    /// | `OPSMAIL_BACKFILL_POLL_SECS` | `5` | Backfill queue poll interval |
    pub fn from_env() -> Self {
        let enabled = std::env::var("OPSMAIL_SCHEDULER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let interval = |var: &str, default: u64| {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
                .max(1)
        };

        Self {
            auto_link_interval_secs: interval(
                "OPSMAIL_AUTO_LINK_INTERVAL_SECS",
                defaults::AUTO_LINK_INTERVAL_SECS,
            ),
            creation_sweep_interval_secs: interval(
                "OPSMAIL_CREATION_SWEEP_INTERVAL_SECS",
                defaults::CREATION_SWEEP_INTERVAL_SECS,
            ),
            knowledge_cleanup_interval_secs: interval(
                "OPSMAIL_KNOWLEDGE_CLEANUP_INTERVAL_SECS",
                defaults::KNOWLEDGE_CLEANUP_INTERVAL_SECS,
            ),
            backfill_poll_interval_secs: interval("OPSMAIL_BACKFILL_POLL_SECS", 5),
            enabled,
        }
    }

    /// Set the auto-link interval.
    pub fn with_auto_link_interval(mut self, secs: u64) -> Self {
        self.auto_link_interval_secs = secs;
        self
    }

    /// Set the creation sweep interval.
    pub fn with_creation_sweep_interval(mut self, secs: u64) -> Self {
        self.creation_sweep_interval_secs = secs;
        self
    }

    /// Set the knowledge cleanup interval.
    pub fn with_knowledge_cleanup_interval(mut self, secs: u64) -> Self {
        self.knowledge_cleanup_interval_secs = secs;
        self
    }

    /// Set the backfill poll interval.
    pub fn with_backfill_poll_interval(mut self, secs: u64) -> Self {
        self.backfill_poll_interval_secs = secs;
        self
    }

    /// Enable or disable scheduled processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// The scheduled job families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    AutoLink,
    CreationSweep,
    KnowledgeCleanup,
    BackfillDrain,
}

/// Event emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Scheduler started.
    SchedulerStarted,
    /// Scheduler stopped.
    SchedulerStopped,
    /// A job tick finished.
    JobCompleted { job: JobKind },
    /// A job tick failed for one organization; the tick continued.
    JobFailed {
        job: JobKind,
        org_id: Uuid,
        error: String,
    },
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<SchedulerEvent>,
}

impl SchedulerHandle {
    /// Signal the scheduler to shut down gracefully. The in-flight tick
    /// runs to completion first.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).await.map_err(|_| {
            opsmail_core::Error::Internal("Failed to send shutdown signal".into())
        })?;
        Ok(())
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Timer-driven scheduler over the pipeline services.
pub struct Scheduler {
    linker: Arc<AutoLinker>,
    creator: Arc<OperationCreator>,
    knowledge: Arc<KnowledgeService>,
    queue: Arc<BackfillQueue>,
    leases: Arc<OrgLeases>,
    orgs: Arc<RwLock<Vec<Uuid>>>,
    config: SchedulerConfig,
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl Scheduler {
    /// Create a new scheduler over the given services.
    pub fn new(
        linker: Arc<AutoLinker>,
        creator: Arc<OperationCreator>,
        knowledge: Arc<KnowledgeService>,
        queue: Arc<BackfillQueue>,
        config: SchedulerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            linker,
            creator,
            knowledge,
            queue,
            leases: OrgLeases::new(),
            orgs: Arc::new(RwLock::new(Vec::new())),
            config,
            event_tx,
        }
    }

    /// Register an organization for scheduled processing.
    pub async fn register_org(&self, org_id: Uuid) {
        let mut orgs = self.orgs.write().await;
        if !orgs.contains(&org_id) {
            orgs.push(org_id);
            debug!(org_id = %org_id, "Registered organization");
        }
    }

    /// The lease registry, shared so other components can respect it.
    pub fn leases(&self) -> Arc<OrgLeases> {
        self.leases.clone()
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the scheduler and return a handle for control.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        SchedulerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Scheduler is disabled, not starting");
            return;
        }

        info!(
            auto_link_secs = self.config.auto_link_interval_secs,
            creation_sweep_secs = self.config.creation_sweep_interval_secs,
            knowledge_cleanup_secs = self.config.knowledge_cleanup_interval_secs,
            backfill_poll_secs = self.config.backfill_poll_interval_secs,
            "Scheduler started"
        );
        let _ = self.event_tx.send(SchedulerEvent::SchedulerStarted);

        let mut link_tick = interval_after(self.config.auto_link_interval_secs);
        let mut sweep_tick = interval_after(self.config.creation_sweep_interval_secs);
        let mut cleanup_tick = interval_after(self.config.knowledge_cleanup_interval_secs);
        let mut drain_tick = interval_after(self.config.backfill_poll_interval_secs);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = link_tick.tick() => {
                    self.run_auto_link().await;
                    let _ = self.event_tx.send(SchedulerEvent::JobCompleted { job: JobKind::AutoLink });
                }
                _ = sweep_tick.tick() => {
                    self.run_creation_sweep().await;
                    let _ = self.event_tx.send(SchedulerEvent::JobCompleted { job: JobKind::CreationSweep });
                }
                _ = cleanup_tick.tick() => {
                    self.run_knowledge_cleanup().await;
                    let _ = self.event_tx.send(SchedulerEvent::JobCompleted { job: JobKind::KnowledgeCleanup });
                }
                _ = drain_tick.tick() => {
                    self.drain_backfills().await;
                    let _ = self.event_tx.send(SchedulerEvent::JobCompleted { job: JobKind::BackfillDrain });
                }
            }
        }

        let _ = self.event_tx.send(SchedulerEvent::SchedulerStopped);
        info!("Scheduler stopped");
    }

    /// One auto-link pass over every registered organization.
    pub async fn run_auto_link(&self) {
        for org_id in self.registered().await {
            let Some(_lease) = self.leases.try_acquire(org_id) else {
                debug!(org_id = %org_id, "Organization busy, skipping auto-link this tick");
                continue;
            };
            match self.linker.link_unlinked_emails(org_id).await {
                Ok(linked) => {
                    debug!(org_id = %org_id, linked_count = linked, "Auto-link tick done")
                }
                Err(e) => self.org_failed(JobKind::AutoLink, org_id, e),
            }
        }
    }

    /// One creation sweep over every registered organization.
    pub async fn run_creation_sweep(&self) {
        for org_id in self.registered().await {
            let Some(_lease) = self.leases.try_acquire(org_id) else {
                debug!(org_id = %org_id, "Organization busy, skipping sweep this tick");
                continue;
            };
            match self.creator.sweep(org_id).await {
                Ok(stats) => debug!(
                    org_id = %org_id,
                    processed = stats.processed,
                    created = stats.created,
                    failed = stats.failed,
                    "Creation sweep tick done"
                ),
                Err(e) => self.org_failed(JobKind::CreationSweep, org_id, e),
            }
        }
    }

    /// One knowledge cleanup pass over every registered organization.
    pub async fn run_knowledge_cleanup(&self) {
        for org_id in self.registered().await {
            let Some(_lease) = self.leases.try_acquire(org_id) else {
                debug!(org_id = %org_id, "Organization busy, skipping cleanup this tick");
                continue;
            };
            match self.knowledge.cleanup_low_value_entries(org_id).await {
                Ok(removed) => {
                    debug!(org_id = %org_id, removed_count = removed, "Cleanup tick done")
                }
                Err(e) => self.org_failed(JobKind::KnowledgeCleanup, org_id, e),
            }
        }
    }

    /// Drain the backfill queue. A task whose organization is busy goes
    /// back to the front of the queue for the next poll.
    pub async fn drain_backfills(&self) {
        while let Some(task) = self.queue.claim_next().await {
            let Some(_lease) = self.leases.try_acquire(task.org_id) else {
                debug!(
                    task_id = %task.id,
                    org_id = %task.org_id,
                    "Organization busy, requeueing backfill task"
                );
                self.queue.requeue(task.id).await;
                break;
            };
            match self
                .linker
                .process_historical_emails(task.org_id, task.rule_id)
                .await
            {
                Ok(stats) if stats.failed == 0 => {
                    info!(
                        task_id = %task.id,
                        processed = stats.processed,
                        watermark_advanced = stats.watermark_advanced,
                        "Backfill task completed"
                    );
                    self.queue.complete(task.id).await;
                }
                Ok(stats) => {
                    // Watermark was withheld; the failed window reruns on
                    // the next trigger.
                    warn!(
                        task_id = %task.id,
                        processed = stats.processed,
                        failed = stats.failed,
                        "Backfill task finished with item failures"
                    );
                    self.queue
                        .fail(task.id, format!("{} items failed", stats.failed))
                        .await;
                }
                Err(e) => {
                    let message = e.to_string();
                    self.org_failed(JobKind::BackfillDrain, task.org_id, e);
                    self.queue.fail(task.id, message).await;
                }
            }
        }
    }

    async fn registered(&self) -> Vec<Uuid> {
        self.orgs.read().await.clone()
    }

    fn org_failed(&self, job: JobKind, org_id: Uuid, error: opsmail_core::Error) {
        warn!(?job, org_id = %org_id, error = %error, "Scheduled job failed for organization");
        let _ = self.event_tx.send(SchedulerEvent::JobFailed {
            job,
            org_id,
            error: error.to_string(),
        });
    }
}

/// Interval whose first tick fires after one full period, not immediately.
fn interval_after(secs: u64) -> tokio::time::Interval {
    let period = Duration::from_secs(secs.max(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
