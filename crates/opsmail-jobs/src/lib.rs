//! # opsmail-jobs
//!
//! Background scheduling for the opsmail pipeline.
//!
//! This crate provides:
//! - A timer-driven [`Scheduler`] firing the auto-link pass, the operation
//!   creation sweep, and the knowledge cleanup on independent intervals
//! - A [`BackfillQueue`] of historical backfill tasks with status tracking
//!   and per-task error counts, drained by the scheduler
//! - Per-organization [`OrgLeases`] so overlapping runs for the same
//!   organization are skipped instead of racing
//!
//! ## Example
//!
//! ```ignore
//! use opsmail_jobs::{BackfillQueue, Scheduler, SchedulerConfig};
//!
//! let queue = BackfillQueue::new();
//! let scheduler = Scheduler::new(linker, creator, knowledge, queue, SchedulerConfig::from_env());
//! scheduler.register_org(org_id).await;
//!
//! let handle = scheduler.start();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod leases;
pub mod queue;
pub mod scheduler;

// Re-export core types
pub use opsmail_core::*;

pub use leases::{OrgLease, OrgLeases};
pub use queue::{BackfillQueue, BackfillTask, TaskStatus};
pub use scheduler::{JobKind, Scheduler, SchedulerConfig, SchedulerEvent, SchedulerHandle};
