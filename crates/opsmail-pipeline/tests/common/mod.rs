//! Shared wiring for pipeline integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use opsmail_core::{LinkSignals, NewRule, NoOpBackfillSink};
use opsmail_extract::{HeuristicExtractor, MockExtractor};
use opsmail_pipeline::{AutoLinker, KnowledgeService, OperationCreator, RuleEngine};
use opsmail_store::fixtures::RecordingSink;
use opsmail_store::Store;

pub struct Harness {
    pub store: Store,
    pub knowledge: Arc<KnowledgeService>,
    pub creator: Arc<OperationCreator>,
    pub linker: AutoLinker,
    pub engine: RuleEngine,
    pub sink: RecordingSink,
    pub mock: MockExtractor,
}

pub fn harness() -> Harness {
    harness_with(MockExtractor::new())
}

/// Full pipeline over a fresh in-memory store, with the given extraction
/// backend and the heuristic fallback behind it.
pub fn harness_with(mock: MockExtractor) -> Harness {
    let store = Store::in_memory();
    let sink = RecordingSink::new();
    let knowledge = Arc::new(KnowledgeService::new(store.knowledge.clone()));
    let creator = Arc::new(OperationCreator::new(
        store.rules.clone(),
        store.operations.clone(),
        store.clients.clone(),
        store.emails.clone(),
        knowledge.clone(),
        Arc::new(mock.clone()),
        Arc::new(HeuristicExtractor::new()),
        Arc::new(sink.clone()),
    ));
    let linker = AutoLinker::new(
        store.rules.clone(),
        store.operations.clone(),
        store.clients.clone(),
        store.emails.clone(),
        creator.clone(),
    );
    let engine = RuleEngine::new(store.rules.clone(), Arc::new(NoOpBackfillSink));
    Harness {
        store,
        knowledge,
        creator,
        linker,
        engine,
        sink,
        mock,
    }
}

/// A permissive rule request: matches any account and sender, creates
/// operations and clients, fills fields.
pub fn new_rule(org_id: Uuid, subject_pattern: &str) -> NewRule {
    NewRule {
        org_id,
        name: "intake".into(),
        subject_pattern: subject_pattern.into(),
        company_domains: vec![],
        auto_create_operations: true,
        auto_create_clients: true,
        auto_fill_fields: true,
        default_assignee_ids: vec![],
        email_account_ids: vec![],
        process_from_date: None,
        enabled: true,
        link_signals: LinkSignals::default(),
    }
}

pub fn dated(email: &mut opsmail_core::EmailMessage, date: DateTime<Utc>) {
    email.date = date;
}
