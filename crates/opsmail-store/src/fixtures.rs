//! Test fixtures for opsmail integration tests.
//!
//! Always compiled so per-crate `tests/` suites can share entity builders
//! and the recording notification sink.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use opsmail_core::{
    Client, EmailMessage, KnowledgeCategory, KnowledgeEntry, LinkSignals, LinkingRule,
    NewOperation, Notification, NotificationSink, NotifyTarget, OperationStatus, PatternKind,
    Result,
};

/// An enabled rule with a literal pattern and no restrictions.
pub fn rule(org_id: Uuid) -> LinkingRule {
    LinkingRule {
        id: Uuid::new_v4(),
        org_id,
        name: "booking intake".into(),
        subject_pattern: PatternKind::Literal("BOOKING".into()),
        company_domains: vec![],
        auto_create_operations: true,
        auto_create_clients: true,
        auto_fill_fields: true,
        default_assignee_ids: vec![],
        email_account_ids: vec![],
        process_from_date: None,
        last_historical_processed: None,
        enabled: true,
        link_signals: LinkSignals::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// A knowledge entry with base relevance and a unique content hash.
pub fn knowledge_entry(org_id: Uuid, category: KnowledgeCategory) -> KnowledgeEntry {
    let id = Uuid::new_v4();
    KnowledgeEntry {
        id,
        org_id,
        category,
        title: "fixture".into(),
        content: format!("fixture content for entry {}", id),
        keywords: vec![],
        content_hash: format!("hash-{}", id),
        relevance_score: 1.0,
        usage_count: 0,
        last_used: Utc::now(),
        source: "test".into(),
        source_id: None,
        metadata: None,
        created_at: Utc::now(),
    }
}

/// A draft operation request.
pub fn new_operation(org_id: Uuid, name: &str) -> NewOperation {
    NewOperation {
        org_id,
        name: name.into(),
        status: OperationStatus::Active,
        client_id: None,
        operation_type: None,
        shipping_mode: None,
        carrier: None,
        pickup_address: None,
        delivery_address: None,
        booking_tracking: None,
        mbl_awb: None,
        hbl_awb: None,
        description: None,
        etd: None,
        eta: None,
        auto_created: false,
        needs_attention: false,
        missing_fields: vec![],
        assignee_ids: vec![],
    }
}

/// A client record.
pub fn client(org_id: Uuid) -> Client {
    Client {
        id: Uuid::new_v4(),
        org_id,
        name: "Fixture Client".into(),
        email: Some("client@external.example".into()),
        created_at: Utc::now(),
    }
}

/// An unlinked, unprocessed email.
pub fn email(org_id: Uuid, subject: &str) -> EmailMessage {
    EmailMessage {
        id: Uuid::new_v4(),
        org_id,
        email_account_id: Uuid::new_v4(),
        from_addr: "\"Fixture Sender\" <sender@external.example>".into(),
        recipients: vec!["ops@freightco.example".into()],
        subject: subject.into(),
        body: "fixture body".into(),
        date: Utc::now(),
        attachments: vec![],
        operation_id: None,
        processed_for_creation: false,
    }
}

/// Notification sink that records every delivery for assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    deliveries: Arc<Mutex<Vec<(NotifyTarget, Notification)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(NotifyTarget, Notification)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, target: NotifyTarget, notification: Notification) -> Result<()> {
        self.deliveries.lock().unwrap().push((target, notification));
        Ok(())
    }
}
