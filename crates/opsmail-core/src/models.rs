//! Core data models for opsmail.
//!
//! Entities are organization-scoped: every record carries the `org_id` of the
//! freight operator it belongs to, and repositories reject cross-organization
//! references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// LINKING RULES
// =============================================================================

/// How a rule's subject pattern is interpreted.
///
/// Resolved once at rule write time. An uncompilable regex is stored as
/// `Literal` explicitly — matching never falls back silently at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum PatternKind {
    /// Regular expression; capture group 1 (or the whole match) yields the
    /// candidate operation name.
    Regex(String),
    /// Literal substring; the first whitespace-delimited token after the
    /// literal yields the candidate operation name.
    Literal(String),
}

impl PatternKind {
    /// The raw pattern text, regardless of kind.
    pub fn pattern(&self) -> &str {
        match self {
            PatternKind::Regex(p) | PatternKind::Literal(p) => p,
        }
    }
}

/// Per-rule toggles for the auto-linker's match signals.
///
/// Every signal defaults to "on"; operators disable signals explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSignals {
    /// Match the client's email address against sender and recipients.
    pub match_client_email: bool,
    /// Match the operation id as a substring of subject/body.
    pub match_operation_id: bool,
    /// Match booking/tracking numbers as substrings.
    pub match_tracking: bool,
    /// Match master/house bill numbers as substrings.
    pub match_bills: bool,
    /// Run the second pass over already-extracted attachment text.
    pub search_attachments: bool,
    /// Optional subject template with placeholders substituted from the
    /// operation (`{operationId}`, `{projectName}`, `{bookingTracking}`,
    /// `{mbl_awb}`, `{hbl_awb}`).
    pub subject_template: Option<String>,
    /// Optional body template, same placeholder set.
    pub body_template: Option<String>,
}

impl Default for LinkSignals {
    fn default() -> Self {
        Self {
            match_client_email: true,
            match_operation_id: true,
            match_tracking: true,
            match_bills: true,
            search_attachments: false,
            subject_template: None,
            body_template: None,
        }
    }
}

/// Operator-authored policy describing which email may create or attach to
/// operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingRule {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    /// Subject pattern, resolved at write time.
    pub subject_pattern: PatternKind,
    /// Sender domains this rule applies to. Empty means "match anything".
    pub company_domains: Vec<String>,
    /// Create a new operation when no existing one matches.
    pub auto_create_operations: bool,
    /// Create a client record when extraction finds an unknown external party.
    pub auto_create_clients: bool,
    /// Fill extracted structured fields onto the created operation.
    pub auto_fill_fields: bool,
    /// Staff attached to operations this rule creates.
    pub default_assignee_ids: Vec<Uuid>,
    /// Email accounts this rule is restricted to. Empty means all accounts.
    pub email_account_ids: Vec<Uuid>,
    /// Start of historical backfill.
    pub process_from_date: Option<DateTime<Utc>>,
    /// Backfill watermark: advances only when a batch completes with zero
    /// item failures.
    pub last_historical_processed: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub link_signals: LinkSignals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkingRule {
    /// Whether this rule accepts email from the given account.
    pub fn allows_account(&self, account_id: Option<Uuid>) -> bool {
        if self.email_account_ids.is_empty() {
            return true;
        }
        match account_id {
            Some(id) => self.email_account_ids.contains(&id),
            None => false,
        }
    }

    /// Whether the sender address is on this rule's company domains.
    /// No configured domains means "match anything".
    pub fn allows_sender(&self, sender: &str) -> bool {
        if self.company_domains.is_empty() {
            return true;
        }
        match email_domain(sender) {
            Some(domain) => self
                .company_domains
                .iter()
                .any(|d| d.eq_ignore_ascii_case(&domain)),
            None => false,
        }
    }
}

// =============================================================================
// KNOWLEDGE STORE
// =============================================================================

/// Categories of organizational knowledge extracted from processed email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    TrackingNumbers,
    Carriers,
    Routes,
    Clients,
    Contacts,
    OperationPatterns,
}

impl KnowledgeCategory {
    /// Stable string form used in content hashes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeCategory::TrackingNumbers => "tracking_numbers",
            KnowledgeCategory::Carriers => "carriers",
            KnowledgeCategory::Routes => "routes",
            KnowledgeCategory::Clients => "clients",
            KnowledgeCategory::Contacts => "contacts",
            KnowledgeCategory::OperationPatterns => "operation_patterns",
        }
    }

    /// All categories, for statistics aggregation.
    pub fn all() -> [KnowledgeCategory; 6] {
        [
            KnowledgeCategory::TrackingNumbers,
            KnowledgeCategory::Carriers,
            KnowledgeCategory::Routes,
            KnowledgeCategory::Clients,
            KnowledgeCategory::Contacts,
            KnowledgeCategory::OperationPatterns,
        ]
    }
}

impl std::fmt::Display for KnowledgeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A deduplicated, relevance-scored fact extracted from processed email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: Uuid,
    pub org_id: Uuid,
    pub category: KnowledgeCategory,
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
    /// sha256 over `"{category}:{normalized content}"`. Unique per
    /// (org, hash), enforced as the upsert key.
    pub content_hash: String,
    /// Starts at the base value, capped at 5.0.
    pub relevance_score: f32,
    pub usage_count: i64,
    pub last_used: DateTime<Utc>,
    /// What produced the entry ("email_processing", "operation_creation").
    pub source: String,
    /// The record the entry is attributed to.
    pub source_id: Option<Uuid>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics for an organization's knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStatistics {
    pub total: i64,
    pub capacity: i64,
    pub by_category: Vec<(KnowledgeCategory, i64)>,
    /// Top entries by relevance, then usage.
    pub top_entries: Vec<KnowledgeEntry>,
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Lifecycle status of a shipment operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Draft,
    Active,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

impl OperationStatus {
    /// Terminal operations are excluded from auto-linking.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Cancelled)
    }
}

/// A shipment operation. Created once by this pipeline, then owned by the
/// surrounding business workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
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
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// CLIENTS
// =============================================================================

/// An external party a shipment is handled for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// EMAIL
// =============================================================================

/// Attachment metadata on a synced email. Text extraction happens out of
/// band; `extracted_text` is consulted but never recomputed by the linker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub storage_key: String,
    pub extracted_text: Option<String>,
}

/// A synced inbound email message. Read-only from the pipeline's
/// perspective except for the `operation_id` pointer and the consumed flag,
/// each set at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email_account_id: Uuid,
    /// Raw From header, e.g. `"Jane Doe" <jane@acme.com>` or a bare address.
    pub from_addr: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
    pub attachments: Vec<EmailAttachment>,
    /// Link pointer, starts null, set exactly once.
    pub operation_id: Option<Uuid>,
    /// Set once the creation pipeline has consumed this message.
    pub processed_for_creation: bool,
}

impl EmailMessage {
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Extract the bare address from a From-style header.
///
/// Handles `"Name" <addr@host>`, `Name <addr@host>`, and bare `addr@host`.
pub fn email_address(header: &str) -> Option<String> {
    let header = header.trim();
    if let (Some(start), Some(end)) = (header.rfind('<'), header.rfind('>')) {
        if start < end {
            let addr = header[start + 1..end].trim();
            if addr.contains('@') {
                return Some(addr.to_lowercase());
            }
        }
        return None;
    }
    if header.contains('@') && !header.contains(char::is_whitespace) {
        return Some(header.to_lowercase());
    }
    None
}

/// Extract the display name from a From-style header, if present.
pub fn email_display_name(header: &str) -> Option<String> {
    let header = header.trim();
    let start = header.rfind('<')?;
    let name = header[..start].trim().trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Domain part of an address or From-style header, lowercased.
pub fn email_domain(header: &str) -> Option<String> {
    let addr = email_address(header)?;
    addr.rsplit_once('@').map(|(_, d)| d.to_string())
}

// =============================================================================
// STRUCTURED EXTRACTION
// =============================================================================

/// Structured shipment data extracted from an email.
///
/// Strict schema: the extraction service's JSON is deserialized into this
/// shape and then validated; a schema violation downgrades the caller to the
/// heuristic path instead of trusting ad hoc parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedOperationData {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub category: Option<String>,
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
}

/// Fields required for an operation to avoid the `needs_attention` flag.
pub const REQUIRED_OPERATION_FIELDS: [&str; 4] = [
    "operation_type",
    "shipping_mode",
    "pickup_address",
    "delivery_address",
];

impl ExtractedOperationData {
    /// Validate the payload: present string fields must be non-empty and a
    /// present client email must look like an address. Violations reject the
    /// whole payload (the caller falls back to heuristics).
    pub fn validate(&self) -> crate::Result<()> {
        let string_fields = [
            ("client_name", &self.client_name),
            ("client_email", &self.client_email),
            ("category", &self.category),
            ("operation_type", &self.operation_type),
            ("shipping_mode", &self.shipping_mode),
            ("carrier", &self.carrier),
            ("pickup_address", &self.pickup_address),
            ("delivery_address", &self.delivery_address),
            ("booking_tracking", &self.booking_tracking),
            ("mbl_awb", &self.mbl_awb),
            ("hbl_awb", &self.hbl_awb),
            ("description", &self.description),
        ];
        for (name, value) in string_fields {
            if let Some(v) = value {
                if v.trim().is_empty() {
                    return Err(crate::Error::InvalidInput(format!(
                        "extracted field '{}' is present but empty",
                        name
                    )));
                }
            }
        }
        if let Some(email) = &self.client_email {
            if email_address(email).is_none() {
                return Err(crate::Error::InvalidInput(format!(
                    "extracted client_email '{}' is not an address",
                    email
                )));
            }
        }
        Ok(())
    }

    /// Names of required fields missing from this payload.
    pub fn missing_required_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.operation_type.is_none() {
            missing.push("operation_type".to_string());
        }
        if self.shipping_mode.is_none() {
            missing.push("shipping_mode".to_string());
        }
        if self.pickup_address.is_none() {
            missing.push("pickup_address".to_string());
        }
        if self.delivery_address.is_none() {
            missing.push("delivery_address".to_string());
        }
        missing
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Delivery target for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NotifyTarget {
    User(Uuid),
    Organization(Uuid),
}

/// A fire-and-forget notification. Delivery failures are logged, never
/// propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub data: Option<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_kind_pattern() {
        assert_eq!(PatternKind::Regex("BOOKING-(\\w+)".into()).pattern(), "BOOKING-(\\w+)");
        assert_eq!(PatternKind::Literal("REF".into()).pattern(), "REF");
    }

    #[test]
    fn test_pattern_kind_serde_tagged() {
        let kind = PatternKind::Regex("X-(\\d+)".into());
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "regex");
        assert_eq!(json["pattern"], "X-(\\d+)");
        let back: PatternKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn test_link_signals_default_all_on() {
        let signals = LinkSignals::default();
        assert!(signals.match_client_email);
        assert!(signals.match_operation_id);
        assert!(signals.match_tracking);
        assert!(signals.match_bills);
        assert!(!signals.search_attachments);
        assert!(signals.subject_template.is_none());
    }

    fn rule_with_domains(domains: Vec<&str>) -> LinkingRule {
        LinkingRule {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            name: "test".into(),
            subject_pattern: PatternKind::Literal("REF".into()),
            company_domains: domains.into_iter().map(String::from).collect(),
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

    #[test]
    fn test_rule_allows_sender_empty_domains_matches_anything() {
        let rule = rule_with_domains(vec![]);
        assert!(rule.allows_sender("anyone@anywhere.example"));
    }

    #[test]
    fn test_rule_allows_sender_domain_match() {
        let rule = rule_with_domains(vec!["acme.com"]);
        assert!(rule.allows_sender("\"Jane\" <jane@acme.com>"));
        assert!(rule.allows_sender("jane@ACME.COM"));
        assert!(!rule.allows_sender("jane@other.com"));
    }

    #[test]
    fn test_rule_allows_account() {
        let mut rule = rule_with_domains(vec![]);
        assert!(rule.allows_account(None));
        assert!(rule.allows_account(Some(Uuid::new_v4())));

        let account = Uuid::new_v4();
        rule.email_account_ids = vec![account];
        assert!(rule.allows_account(Some(account)));
        assert!(!rule.allows_account(Some(Uuid::new_v4())));
        assert!(!rule.allows_account(None));
    }

    #[test]
    fn test_knowledge_category_as_str_roundtrip() {
        for category in KnowledgeCategory::all() {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
            let back: KnowledgeCategory = serde_json::from_str(&json).unwrap();
            assert_eq!(back, category);
        }
    }

    #[test]
    fn test_operation_status_terminal() {
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(!OperationStatus::Draft.is_terminal());
        assert!(!OperationStatus::Active.is_terminal());
        assert!(!OperationStatus::InTransit.is_terminal());
        assert!(!OperationStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_email_address_parsing() {
        assert_eq!(
            email_address("\"Jane Doe\" <Jane@Acme.com>"),
            Some("jane@acme.com".to_string())
        );
        assert_eq!(
            email_address("Jane Doe <jane@acme.com>"),
            Some("jane@acme.com".to_string())
        );
        assert_eq!(email_address("jane@acme.com"), Some("jane@acme.com".to_string()));
        assert_eq!(email_address("not an address"), None);
        assert_eq!(email_address("Jane Doe <not-an-address>"), None);
    }

    #[test]
    fn test_email_display_name() {
        assert_eq!(
            email_display_name("\"Jane Doe\" <jane@acme.com>"),
            Some("Jane Doe".to_string())
        );
        assert_eq!(
            email_display_name("Jane Doe <jane@acme.com>"),
            Some("Jane Doe".to_string())
        );
        assert_eq!(email_display_name("jane@acme.com"), None);
        assert_eq!(email_display_name("<jane@acme.com>"), None);
    }

    #[test]
    fn test_email_domain() {
        assert_eq!(email_domain("jane@Acme.com"), Some("acme.com".to_string()));
        assert_eq!(
            email_domain("\"J\" <j@freight.example>"),
            Some("freight.example".to_string())
        );
        assert_eq!(email_domain("nonsense"), None);
    }

    #[test]
    fn test_extracted_data_validate_ok() {
        let data = ExtractedOperationData {
            client_name: Some("Acme".into()),
            client_email: Some("ops@acme.com".into()),
            ..Default::default()
        };
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_extracted_data_validate_rejects_empty_field() {
        let data = ExtractedOperationData {
            carrier: Some("   ".into()),
            ..Default::default()
        };
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_extracted_data_validate_rejects_bad_email() {
        let data = ExtractedOperationData {
            client_email: Some("not-an-address".into()),
            ..Default::default()
        };
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_missing_required_fields() {
        let data = ExtractedOperationData {
            operation_type: Some("import".into()),
            shipping_mode: Some("sea".into()),
            ..Default::default()
        };
        let missing = data.missing_required_fields();
        assert_eq!(missing, vec!["pickup_address", "delivery_address"]);

        let complete = ExtractedOperationData {
            operation_type: Some("import".into()),
            shipping_mode: Some("sea".into()),
            pickup_address: Some("Shanghai".into()),
            delivery_address: Some("Rotterdam".into()),
            ..Default::default()
        };
        assert!(complete.missing_required_fields().is_empty());
    }

    #[test]
    fn test_notify_target_serde() {
        let target = NotifyTarget::User(Uuid::nil());
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["kind"], "user");
    }
}
