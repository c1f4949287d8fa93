//! Core traits for opsmail abstractions.
//!
//! These traits define the boundary contracts the pipeline consumes —
//! persistence, structured extraction, attachment text extraction, and the
//! notification sink — enabling pluggable backends and testability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// RULE REPOSITORY
// =============================================================================

/// Request for creating a linking rule. The subject pattern arrives as raw
/// text; the rule engine resolves it into a [`PatternKind`] at write time.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub org_id: Uuid,
    pub name: String,
    pub subject_pattern: String,
    pub company_domains: Vec<String>,
    pub auto_create_operations: bool,
    pub auto_create_clients: bool,
    pub auto_fill_fields: bool,
    pub default_assignee_ids: Vec<Uuid>,
    pub email_account_ids: Vec<Uuid>,
    pub process_from_date: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub link_signals: LinkSignals,
}

/// Partial update for a linking rule. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateRule {
    pub name: Option<String>,
    pub subject_pattern: Option<String>,
    pub company_domains: Option<Vec<String>>,
    pub auto_create_operations: Option<bool>,
    pub auto_create_clients: Option<bool>,
    pub auto_fill_fields: Option<bool>,
    pub default_assignee_ids: Option<Vec<Uuid>>,
    pub email_account_ids: Option<Vec<Uuid>>,
    pub process_from_date: Option<Option<DateTime<Utc>>>,
    pub enabled: Option<bool>,
    pub link_signals: Option<LinkSignals>,
}

/// Repository for linking rule storage.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Insert a fully-resolved rule.
    async fn insert(&self, rule: LinkingRule) -> Result<Uuid>;

    /// Fetch a rule by id within an organization.
    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<LinkingRule>>;

    /// List all rules for an organization in (created_at, id) order.
    async fn list(&self, org_id: Uuid) -> Result<Vec<LinkingRule>>;

    /// List enabled rules for an organization in (created_at, id) order.
    async fn list_enabled(&self, org_id: Uuid) -> Result<Vec<LinkingRule>>;

    /// Replace a stored rule.
    async fn update(&self, rule: LinkingRule) -> Result<()>;

    /// Delete a rule.
    async fn delete(&self, org_id: Uuid, id: Uuid) -> Result<()>;

    /// Advance the backfill watermark. Callers only invoke this after a
    /// batch completed with zero item failures.
    async fn set_watermark(&self, org_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

// =============================================================================
// KNOWLEDGE REPOSITORY
// =============================================================================

/// Query for relevant knowledge.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeQuery {
    pub category: Option<KnowledgeCategory>,
    /// Entries matching any of these keywords are returned. Empty means
    /// "no keyword filter".
    pub keywords: Vec<String>,
    pub limit: i64,
}

/// Selection bounds for low-value eviction.
#[derive(Debug, Clone)]
pub struct EvictionCriteria {
    pub relevance_floor: f32,
    pub min_usage: i64,
    pub created_before: DateTime<Utc>,
    pub limit: i64,
}

/// Repository for knowledge entry storage. Ranking, deduplication, and
/// reinforcement policy live in the pipeline's `KnowledgeService`; this
/// trait only provides scoped reads and writes.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn insert(&self, entry: KnowledgeEntry) -> Result<Uuid>;

    /// Replace a stored entry (used by merge and reinforcement).
    async fn update(&self, entry: KnowledgeEntry) -> Result<()>;

    /// Exact-hash lookup within an organization.
    async fn find_by_hash(&self, org_id: Uuid, hash: &str) -> Result<Option<KnowledgeEntry>>;

    /// Highest-relevance entries of a category, for fuzzy deduplication.
    async fn top_by_relevance(
        &self,
        org_id: Uuid,
        category: KnowledgeCategory,
        limit: i64,
    ) -> Result<Vec<KnowledgeEntry>>;

    /// Filtered query ordered by relevance desc, usage desc, recency desc.
    /// No side effects; reinforcement is applied by the service.
    async fn query(&self, org_id: Uuid, query: &KnowledgeQuery) -> Result<Vec<KnowledgeEntry>>;

    /// Increment usage and refresh `last_used` on the given entries.
    async fn record_usage(&self, org_id: Uuid, ids: &[Uuid]) -> Result<()>;

    /// Entries eligible for eviction under the given criteria.
    async fn list_evictable(
        &self,
        org_id: Uuid,
        criteria: &EvictionCriteria,
    ) -> Result<Vec<KnowledgeEntry>>;

    async fn delete_many(&self, org_id: Uuid, ids: &[Uuid]) -> Result<i64>;

    async fn count(&self, org_id: Uuid) -> Result<i64>;

    async fn count_by_category(&self, org_id: Uuid) -> Result<Vec<(KnowledgeCategory, i64)>>;
}

// =============================================================================
// OPERATION REPOSITORY
// =============================================================================

/// Request for creating an operation.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub org_id: Uuid,
    pub name: String,
    pub status: OperationStatus,
    pub client_id: Option<Uuid>,
    pub operation_type: Option<String>,
    pub shipping_mode: Option<String>,
    pub carrier: Option<String>,
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub booking_tracking: Option<String>,
    pub mbl_awb: Option<String>,
    pub hbl_awb: Option<String>,
    pub description: Option<String>,
    pub etd: Option<DateTime<Utc>>,
    pub eta: Option<DateTime<Utc>>,
    pub auto_created: bool,
    pub needs_attention: bool,
    pub missing_fields: Vec<String>,
    pub assignee_ids: Vec<Uuid>,
}

/// Repository for shipment operations.
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Insert a new operation. Rejects a `client_id` belonging to another
    /// organization with `Error::InvalidInput`.
    async fn insert(&self, op: NewOperation) -> Result<Operation>;

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<Operation>>;

    /// Case-insensitive "name contains" lookup within an organization.
    async fn find_by_name_contains(&self, org_id: Uuid, needle: &str)
        -> Result<Option<Operation>>;

    /// Operations not in a terminal state.
    async fn list_active(&self, org_id: Uuid) -> Result<Vec<Operation>>;
}

// =============================================================================
// CLIENT REPOSITORY
// =============================================================================

/// Request for creating a client.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub org_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

/// Repository for client records.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn insert(&self, client: NewClient) -> Result<Client>;

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<Client>>;

    /// Exact (case-insensitive) email lookup.
    async fn find_by_email(&self, org_id: Uuid, email: &str) -> Result<Option<Client>>;

    /// Case-insensitive "name contains" lookup.
    async fn find_by_name_contains(&self, org_id: Uuid, needle: &str) -> Result<Option<Client>>;
}

// =============================================================================
// EMAIL REPOSITORY
// =============================================================================

/// Filter for unlinked-email scans.
#[derive(Debug, Clone, Default)]
pub struct UnlinkedEmailFilter {
    /// Restrict to these connected accounts. Empty means all accounts.
    pub account_ids: Vec<Uuid>,
    /// Only email that carries attachments (second-pass attachment search).
    pub with_attachments_only: bool,
    pub limit: i64,
}

/// Repository for synced email. The pipeline only ever writes the link
/// pointer and the consumed flag.
#[async_trait]
pub trait EmailRepository: Send + Sync {
    async fn insert(&self, email: EmailMessage) -> Result<Uuid>;

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<EmailMessage>>;

    /// Unlinked email (null operation pointer), newest first, bounded.
    async fn find_unlinked(
        &self,
        org_id: Uuid,
        filter: &UnlinkedEmailFilter,
    ) -> Result<Vec<EmailMessage>>;

    /// Email not yet consumed by the creation pipeline, oldest first.
    async fn find_unprocessed(&self, org_id: Uuid, limit: i64) -> Result<Vec<EmailMessage>>;

    /// Email dated strictly after `after`, ascending by date, bounded.
    /// Backfill depends on this ordering: the watermark assumes monotonic
    /// progress.
    async fn list_since(
        &self,
        org_id: Uuid,
        after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EmailMessage>>;

    /// Set the operation pointer on the given emails where it is still
    /// null. Already-linked emails are skipped (at-most-once semantics).
    /// Returns the number actually updated.
    async fn link_to_operation(
        &self,
        org_id: Uuid,
        email_ids: &[Uuid],
        operation_id: Uuid,
    ) -> Result<i64>;

    /// Mark an email as consumed by the creation pipeline. Idempotent.
    async fn mark_processed(&self, org_id: Uuid, id: Uuid) -> Result<()>;
}

// =============================================================================
// STRUCTURED EXTRACTION
// =============================================================================

/// Prompt handed to a structured-extraction backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionPrompt {
    pub subject: String,
    /// Body, already truncated by the caller.
    pub body: String,
    /// Raw From header, for the heuristic path.
    pub from_addr: String,
    /// Company domains whose addresses must never be attributed as clients.
    pub exclusion_domains: Vec<String>,
    /// Knowledge-base context lines ("category: content").
    pub context_entries: Vec<String>,
}

impl ExtractionPrompt {
    /// Render the prompt as the text sent to the extraction service.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Extract structured shipment data from this email.\n");
        if !self.exclusion_domains.is_empty() {
            out.push_str(&format!(
                "Never attribute addresses under these company domains as the client: {}.\n",
                self.exclusion_domains.join(", ")
            ));
        }
        if !self.context_entries.is_empty() {
            out.push_str("Known organizational context:\n");
            for entry in &self.context_entries {
                out.push_str(&format!("- {}\n", entry));
            }
        }
        out.push_str(&format!("From: {}\n", self.from_addr));
        out.push_str(&format!("Subject: {}\n", self.subject));
        out.push_str(&format!("Body:\n{}\n", self.body));
        out
    }
}

/// Backend producing structured shipment data from an email prompt.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Extract structured data. Any failure (unreachable service, malformed
    /// response, schema violation) is an error; callers degrade to the
    /// heuristic path, never abort.
    async fn extract(&self, prompt: &ExtractionPrompt) -> Result<ExtractedOperationData>;

    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;

    /// Human-readable name of this backend.
    fn name(&self) -> &str;
}

// =============================================================================
// ATTACHMENT TEXT EXTRACTION
// =============================================================================

/// Fetches raw attachment bytes from object storage.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn fetch(&self, storage_key: &str) -> Result<Vec<u8>>;
}

/// Adapter extracting text from one attachment family (PDF text layer,
/// image OCR). Registered in the text-extraction bridge and dispatched by
/// content type.
#[async_trait]
pub trait AttachmentTextAdapter: Send + Sync {
    /// Whether this adapter handles the given content type.
    fn supports(&self, content_type: &str) -> bool;

    /// Extract text from raw bytes.
    async fn extract(&self, data: &[u8], filename: &str) -> Result<String>;

    /// Check if the adapter's external dependencies are available.
    async fn health_check(&self) -> Result<bool>;

    /// Human-readable name of this adapter.
    fn name(&self) -> &str;
}

// =============================================================================
// BACKFILL
// =============================================================================

/// Receives backfill requests raised by rule writes. Enabling a rule with a
/// `process_from_date` goes through here; the scheduler drains the queue
/// behind this trait.
#[async_trait]
pub trait BackfillSink: Send + Sync {
    /// Queue a historical backfill for the rule. Returns the task id.
    async fn enqueue(&self, org_id: Uuid, rule_id: Uuid) -> Result<Uuid>;
}

/// Sink that drops backfill requests, for wirings without a scheduler.
pub struct NoOpBackfillSink;

#[async_trait]
impl BackfillSink for NoOpBackfillSink {
    async fn enqueue(&self, _org_id: Uuid, _rule_id: Uuid) -> Result<Uuid> {
        Ok(Uuid::new_v4())
    }
}

// =============================================================================
// NOTIFICATION SINK
// =============================================================================

/// Fire-and-forget notification delivery. Failures are logged by callers,
/// never propagated.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, target: NotifyTarget, notification: Notification) -> Result<()>;
}

/// No-op sink for when notifications aren't needed.
pub struct NoOpSink;

#[async_trait]
impl NotificationSink for NoOpSink {
    async fn notify(&self, _target: NotifyTarget, _notification: Notification) -> Result<()> {
        Ok(())
    }
}

/// Payload helper: JSON metadata attached to operation notifications.
pub fn operation_notification_data(operation: &Operation) -> JsonValue {
    serde_json::json!({
        "operation_id": operation.id,
        "auto_created": operation.auto_created,
        "needs_attention": operation.needs_attention,
    })
}
