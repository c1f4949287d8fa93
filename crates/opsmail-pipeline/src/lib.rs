//! # opsmail-pipeline
//!
//! The four core services of the email→operation pipeline:
//!
//! - [`knowledge::KnowledgeService`] — bounded, self-pruning store of
//!   organizational facts with dedup and relevance reinforcement.
//! - [`rules::RuleEngine`] — linking rule lifecycle with write-time pattern
//!   resolution and backfill enqueueing.
//! - [`creator::OperationCreator`] — rule-matched operation creation with
//!   layered structured extraction.
//! - [`linker::AutoLinker`] — signal-based email↔operation linking and
//!   watermarked historical backfill.
//!
//! All services work against the repository traits in `opsmail-core`; the
//! in-memory implementations in `opsmail-store` back the scheduler binary
//! and the test suites.

pub mod creator;
pub mod knowledge;
pub mod linker;
pub mod rules;

pub use creator::{match_subject, CreationOutcome, OperationCreator, SweepStats};
pub use knowledge::{AddOutcome, KnowledgeConfig, KnowledgeService, NewKnowledge};
pub use linker::{substitute_template, AutoLinker, BackfillStats};
pub use rules::{resolve_pattern, RuleEngine};
