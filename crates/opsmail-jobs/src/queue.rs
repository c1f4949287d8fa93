//! In-process backfill task queue with status tracking.
//!
//! Rule writes that enable a backfill enqueue a task here instead of firing
//! the backfill inline; the scheduler drains the queue on its own cadence.
//! Every task keeps its status and error count so a stuck or failing
//! backfill is visible after the fact.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use opsmail_core::{BackfillSink, Result};

/// Lifecycle of a backfill task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Enqueued, not yet claimed.
    Pending,
    /// Claimed by the scheduler and currently executing.
    Running,
    /// Completed with zero item failures.
    Done,
    /// Errored, or completed with item failures.
    Failed,
}

/// One queued historical backfill for a rule.
#[derive(Debug, Clone)]
pub struct BackfillTask {
    pub id: Uuid,
    pub org_id: Uuid,
    pub rule_id: Uuid,
    pub status: TaskStatus,
    /// Number of times this task has been failed.
    pub error_count: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct QueueState {
    tasks: HashMap<Uuid, BackfillTask>,
    /// Pending task ids in enqueue order.
    pending: VecDeque<Uuid>,
}

/// FIFO queue of backfill tasks. Enqueueing is the [`BackfillSink`]
/// implementation the rule engine writes through; the scheduler claims,
/// runs, and resolves tasks.
#[derive(Default)]
pub struct BackfillQueue {
    state: Mutex<QueueState>,
}

impl BackfillQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the oldest pending task, marking it running.
    pub async fn claim_next(&self) -> Option<BackfillTask> {
        let mut state = self.state.lock().await;
        let id = state.pending.pop_front()?;
        let task = state.tasks.get_mut(&id)?;
        task.status = TaskStatus::Running;
        debug!(task_id = %id, org_id = %task.org_id, "Claimed backfill task");
        Some(task.clone())
    }

    /// Put a claimed task back at the front of the queue untouched, e.g.
    /// when its organization is busy this tick.
    pub async fn requeue(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.get_mut(&id) {
            task.status = TaskStatus::Pending;
            state.pending.push_front(id);
        }
    }

    /// Mark a task done.
    pub async fn complete(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.get_mut(&id) {
            task.status = TaskStatus::Done;
            task.finished_at = Some(Utc::now());
        }
    }

    /// Mark a task failed and bump its error count.
    pub async fn fail(&self, id: Uuid, error: impl Into<String>) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.get_mut(&id) {
            task.status = TaskStatus::Failed;
            task.error_count += 1;
            task.last_error = Some(error.into());
            task.finished_at = Some(Utc::now());
        }
    }

    /// Look up a task by id.
    pub async fn get(&self, id: Uuid) -> Option<BackfillTask> {
        self.state.lock().await.tasks.get(&id).cloned()
    }

    /// Number of tasks waiting to be claimed.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Snapshot of every task, for diagnostics.
    pub async fn tasks(&self) -> Vec<BackfillTask> {
        self.state.lock().await.tasks.values().cloned().collect()
    }
}

#[async_trait]
impl BackfillSink for BackfillQueue {
    async fn enqueue(&self, org_id: Uuid, rule_id: Uuid) -> Result<Uuid> {
        let mut state = self.state.lock().await;

        // A rule edited twice before the scheduler catches up needs one
        // backfill, not two.
        let duplicate = state.pending.iter().find(|id| {
            state
                .tasks
                .get(id)
                .is_some_and(|t| t.org_id == org_id && t.rule_id == rule_id)
        });
        if let Some(&existing) = duplicate {
            debug!(task_id = %existing, rule_id = %rule_id, "Backfill already pending");
            return Ok(existing);
        }

        let task = BackfillTask {
            id: Uuid::new_v4(),
            org_id,
            rule_id,
            status: TaskStatus::Pending,
            error_count: 0,
            last_error: None,
            enqueued_at: Utc::now(),
            finished_at: None,
        };
        let id = task.id;
        state.pending.push_back(id);
        state.tasks.insert(id, task);
        info!(task_id = %id, org_id = %org_id, rule_id = %rule_id, "Backfill task enqueued");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_then_claim_transitions_to_running() {
        let queue = BackfillQueue::new();
        let org = Uuid::new_v4();
        let rule = Uuid::new_v4();

        let id = queue.enqueue(org, rule).await.unwrap();
        assert_eq!(queue.get(id).await.unwrap().status, TaskStatus::Pending);
        assert_eq!(queue.pending_count().await, 1);

        let claimed = queue.claim_next().await.unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.org_id, org);
        assert_eq!(claimed.rule_id, rule);
        assert_eq!(queue.get(id).await.unwrap().status, TaskStatus::Running);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_complete_marks_done() {
        let queue = BackfillQueue::new();
        let id = queue.enqueue(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        queue.claim_next().await.unwrap();
        queue.complete(id).await;

        let task = queue.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.finished_at.is_some());
        assert_eq!(task.error_count, 0);
    }

    #[tokio::test]
    async fn test_fail_records_error_and_count() {
        let queue = BackfillQueue::new();
        let id = queue.enqueue(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        queue.claim_next().await.unwrap();
        queue.fail(id, "2 items failed").await;

        let task = queue.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_count, 1);
        assert_eq!(task.last_error.as_deref(), Some("2 items failed"));
    }

    #[tokio::test]
    async fn test_claims_are_fifo() {
        let queue = BackfillQueue::new();
        let org = Uuid::new_v4();
        let first = queue.enqueue(org, Uuid::new_v4()).await.unwrap();
        let second = queue.enqueue(org, Uuid::new_v4()).await.unwrap();

        assert_eq!(queue.claim_next().await.unwrap().id, first);
        assert_eq!(queue.claim_next().await.unwrap().id, second);
        assert!(queue.claim_next().await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_pending_enqueue_is_coalesced() {
        let queue = BackfillQueue::new();
        let org = Uuid::new_v4();
        let rule = Uuid::new_v4();

        let first = queue.enqueue(org, rule).await.unwrap();
        let second = queue.enqueue(org, rule).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(queue.pending_count().await, 1);

        // Once claimed, a re-trigger enqueues a fresh task.
        queue.claim_next().await.unwrap();
        let third = queue.enqueue(org, rule).await.unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn test_requeue_puts_task_at_front() {
        let queue = BackfillQueue::new();
        let org = Uuid::new_v4();
        let first = queue.enqueue(org, Uuid::new_v4()).await.unwrap();
        let second = queue.enqueue(org, Uuid::new_v4()).await.unwrap();

        let claimed = queue.claim_next().await.unwrap();
        assert_eq!(claimed.id, first);
        queue.requeue(first).await;

        assert_eq!(queue.get(first).await.unwrap().status, TaskStatus::Pending);
        assert_eq!(queue.claim_next().await.unwrap().id, first);
        assert_eq!(queue.claim_next().await.unwrap().id, second);
    }
}
