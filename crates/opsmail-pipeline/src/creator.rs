//! Smart operation creator.
//!
//! Turns inbound email into shipment operations. An email is matched against
//! the organization's enabled rules in stable order; the first rule whose
//! subject pattern yields a candidate operation name wins. An existing
//! operation with that name makes the whole pass a no-op, so reprocessing
//! the same email never duplicates work.
//!
//! Structured extraction is layered: the configured backend first, the
//! heuristic From-header extractor when it fails, an empty payload when both
//! do. Extraction never aborts a creation.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use opsmail_core::{
    defaults, email_domain, ClientRepository, EmailMessage, EmailRepository,
    ExtractedOperationData, ExtractionPrompt, KnowledgeCategory, KnowledgeQuery, LinkingRule,
    NewClient, NewOperation, Notification, NotificationSink, NotifyTarget, Operation,
    OperationRepository, OperationStatus, PatternKind, Result, RuleRepository,
    StructuredExtractor,
};

use crate::knowledge::{KnowledgeService, NewKnowledge};

/// Counts for one creation sweep over unprocessed email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Emails examined.
    pub processed: usize,
    /// Operations created.
    pub created: usize,
    /// Emails whose processing failed; left unconsumed for the next sweep.
    pub failed: usize,
}

/// What processing one email did.
#[derive(Debug, Clone)]
pub enum CreationOutcome {
    /// No enabled rule matched; the email was consumed without effect.
    NoMatch,
    /// The candidate name matched an existing operation; the email was
    /// attached to it.
    Attached(Operation),
    /// A new operation was created.
    Created(Operation),
}

impl CreationOutcome {
    /// The operation the email ended up on, if any.
    pub fn into_operation(self) -> Option<Operation> {
        match self {
            CreationOutcome::NoMatch => None,
            CreationOutcome::Attached(op) | CreationOutcome::Created(op) => Some(op),
        }
    }
}

/// Service creating operations from rule-matched email.
pub struct OperationCreator {
    rules: Arc<dyn RuleRepository>,
    operations: Arc<dyn OperationRepository>,
    clients: Arc<dyn ClientRepository>,
    emails: Arc<dyn EmailRepository>,
    knowledge: Arc<KnowledgeService>,
    extractor: Arc<dyn StructuredExtractor>,
    heuristic: Arc<dyn StructuredExtractor>,
    notifier: Arc<dyn NotificationSink>,
}

impl OperationCreator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        operations: Arc<dyn OperationRepository>,
        clients: Arc<dyn ClientRepository>,
        emails: Arc<dyn EmailRepository>,
        knowledge: Arc<KnowledgeService>,
        extractor: Arc<dyn StructuredExtractor>,
        heuristic: Arc<dyn StructuredExtractor>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            rules,
            operations,
            clients,
            emails,
            knowledge,
            extractor,
            heuristic,
            notifier,
        }
    }

    /// Process one email through the creation pipeline. The email is marked
    /// consumed in every non-error outcome.
    pub async fn process_email(&self, email: &EmailMessage) -> Result<CreationOutcome> {
        let org_id = email.org_id;

        let matched = self.match_rules(email).await?;
        let (rule, candidate_name) = match matched {
            Some(m) => m,
            None => {
                debug!(org_id = %org_id, email_id = %email.id, "No rule matched, email consumed");
                self.emails.mark_processed(org_id, email.id).await?;
                return Ok(CreationOutcome::NoMatch);
            }
        };

        // Idempotence: an operation whose name already contains the
        // candidate absorbs the email instead of spawning a duplicate.
        if let Some(existing) = self
            .operations
            .find_by_name_contains(org_id, &candidate_name)
            .await?
        {
            debug!(
                org_id = %org_id,
                email_id = %email.id,
                operation_id = %existing.id,
                "Candidate name matches existing operation"
            );
            self.emails
                .link_to_operation(org_id, &[email.id], existing.id)
                .await?;
            self.emails.mark_processed(org_id, email.id).await?;
            return Ok(CreationOutcome::Attached(existing));
        }

        if !rule.auto_create_operations {
            debug!(
                org_id = %org_id,
                email_id = %email.id,
                rule_id = %rule.id,
                "Rule matched but does not auto-create operations"
            );
            self.emails.mark_processed(org_id, email.id).await?;
            return Ok(CreationOutcome::NoMatch);
        }

        let data = self.extract_operation_data(email, &rule).await;
        let client_id = self.resolve_client(org_id, &rule, &data).await;

        let missing_fields = data.missing_required_fields();
        let needs_attention = !missing_fields.is_empty();

        let new_op = NewOperation {
            org_id,
            name: candidate_name.clone(),
            status: OperationStatus::Active,
            client_id,
            operation_type: filled(&rule, data.operation_type.clone()),
            shipping_mode: filled(&rule, data.shipping_mode.clone()),
            carrier: filled(&rule, data.carrier.clone()),
            pickup_address: filled(&rule, data.pickup_address.clone()),
            delivery_address: filled(&rule, data.delivery_address.clone()),
            booking_tracking: filled(&rule, data.booking_tracking.clone()),
            mbl_awb: filled(&rule, data.mbl_awb.clone()),
            hbl_awb: filled(&rule, data.hbl_awb.clone()),
            description: filled(&rule, data.description.clone()),
            etd: if rule.auto_fill_fields { data.etd } else { None },
            eta: if rule.auto_fill_fields { data.eta } else { None },
            auto_created: true,
            needs_attention,
            missing_fields,
            assignee_ids: rule.default_assignee_ids.clone(),
        };
        let operation = self.operations.insert(new_op).await?;
        info!(
            org_id = %org_id,
            email_id = %email.id,
            operation_id = %operation.id,
            rule_id = %rule.id,
            needs_attention = operation.needs_attention,
            "Operation auto-created from email"
        );

        // Everything past the insert is best-effort: a failed side effect
        // is logged, never rolled back into the creation.
        self.record_facts(&operation, &data).await;
        self.notify_creation(&operation).await;

        self.emails
            .link_to_operation(org_id, &[email.id], operation.id)
            .await?;
        self.emails.mark_processed(org_id, email.id).await?;
        Ok(CreationOutcome::Created(operation))
    }

    /// Sweep unprocessed email for an organization, each message inside its
    /// own failure boundary.
    pub async fn sweep(&self, org_id: Uuid) -> Result<SweepStats> {
        let batch = self
            .emails
            .find_unprocessed(org_id, defaults::LINK_BATCH_SIZE)
            .await?;
        let mut stats = SweepStats::default();
        for email in &batch {
            match self.process_email(email).await {
                Ok(outcome) => {
                    stats.processed += 1;
                    if matches!(outcome, CreationOutcome::Created(_)) {
                        stats.created += 1;
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        org_id = %org_id,
                        email_id = %email.id,
                        error = %e,
                        "Creation pipeline failed for email"
                    );
                }
            }
        }
        if stats.processed > 0 || stats.failed > 0 {
            info!(
                org_id = %org_id,
                processed = stats.processed,
                created = stats.created,
                failed_count = stats.failed,
                "Creation sweep completed"
            );
        }
        Ok(stats)
    }

    /// First enabled rule (stable order) whose gates pass and whose subject
    /// pattern yields a candidate name.
    async fn match_rules(&self, email: &EmailMessage) -> Result<Option<(LinkingRule, String)>> {
        let rules = self.rules.list_enabled(email.org_id).await?;
        for rule in rules {
            if !rule.allows_account(Some(email.email_account_id)) {
                continue;
            }
            if !rule.allows_sender(&email.from_addr) {
                continue;
            }
            if let Some(name) = match_subject(&rule.subject_pattern, &email.subject) {
                return Ok(Some((rule, name)));
            }
        }
        Ok(None)
    }

    /// Build the prompt and run the extraction ladder. Never fails: the
    /// backend degrades to the heuristic, the heuristic to an empty payload.
    async fn extract_operation_data(
        &self,
        email: &EmailMessage,
        rule: &LinkingRule,
    ) -> ExtractedOperationData {
        let prompt = ExtractionPrompt {
            subject: email.subject.clone(),
            body: truncate_chars(&email.body, defaults::PROMPT_BODY_TRUNCATE),
            from_addr: email.from_addr.clone(),
            exclusion_domains: rule.company_domains.clone(),
            context_entries: self.context_entries(email).await,
        };

        match self.extractor.extract(&prompt).await {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    org_id = %email.org_id,
                    email_id = %email.id,
                    backend = self.extractor.name(),
                    error = %e,
                    "Structured extraction failed, degrading to heuristics"
                );
                match self.heuristic.extract(&prompt).await {
                    Ok(data) => data,
                    Err(e) => {
                        debug!(email_id = %email.id, error = %e, "Heuristic extraction failed");
                        ExtractedOperationData::default()
                    }
                }
            }
        }
    }

    /// Knowledge-base lines for the prompt: entries whose keywords overlap
    /// the email text, capped.
    async fn context_entries(&self, email: &EmailMessage) -> Vec<String> {
        let query = KnowledgeQuery {
            category: None,
            keywords: email_keywords(email),
            limit: defaults::KNOWLEDGE_CONTEXT_ENTRIES as i64,
        };
        match self.knowledge.get_relevant_knowledge(email.org_id, &query).await {
            Ok(entries) => entries
                .iter()
                .map(|e| format!("{}: {}", e.category, e.content))
                .collect(),
            Err(e) => {
                warn!(org_id = %email.org_id, error = %e, "Knowledge lookup for prompt failed");
                Vec::new()
            }
        }
    }

    /// Resolve or create the client. An address under the rule's company
    /// domains is the operator's own staff and is discarded, never a client.
    async fn resolve_client(
        &self,
        org_id: Uuid,
        rule: &LinkingRule,
        data: &ExtractedOperationData,
    ) -> Option<Uuid> {
        if let Some(domain) = data.client_email.as_deref().and_then(email_domain) {
            if rule
                .company_domains
                .iter()
                .any(|d| d.eq_ignore_ascii_case(&domain))
            {
                // The extracted contact is the operator's own staff. The
                // name travels with the address, so both are discarded.
                debug!(org_id = %org_id, domain = %domain, "Extracted client is internal, discarded");
                return None;
            }
        }
        let email = data
            .client_email
            .as_deref()
            .filter(|addr| email_domain(addr).is_some());
        let name = data.client_name.as_deref();
        if email.is_none() && name.is_none() {
            return None;
        }

        if let Some(addr) = email {
            match self.clients.find_by_email(org_id, addr).await {
                Ok(Some(client)) => return Some(client.id),
                Ok(None) => {}
                Err(e) => {
                    warn!(org_id = %org_id, error = %e, "Client email lookup failed");
                    return None;
                }
            }
        }
        if let Some(n) = name {
            match self.clients.find_by_name_contains(org_id, n).await {
                Ok(Some(client)) => return Some(client.id),
                Ok(None) => {}
                Err(e) => {
                    warn!(org_id = %org_id, error = %e, "Client name lookup failed");
                    return None;
                }
            }
        }

        if !rule.auto_create_clients {
            return None;
        }
        let new_client = NewClient {
            org_id,
            name: name
                .map(str::to_string)
                .or_else(|| email.map(str::to_string))?,
            email: email.map(str::to_string),
        };
        match self.clients.insert(new_client).await {
            Ok(client) => {
                info!(org_id = %org_id, client_id = %client.id, "Client auto-created");
                Some(client.id)
            }
            Err(e) => {
                warn!(org_id = %org_id, error = %e, "Client auto-creation failed");
                None
            }
        }
    }

    /// Push non-null extracted facts into the knowledge store. Facts equal
    /// to the operation name carry no information beyond the operation
    /// record itself and are skipped.
    async fn record_facts(&self, operation: &Operation, data: &ExtractedOperationData) {
        let mut facts: Vec<(KnowledgeCategory, String, String)> = Vec::new();

        if let Some(client_name) = &data.client_name {
            let contact = data.client_email.as_deref().unwrap_or("unknown contact");
            facts.push((
                KnowledgeCategory::Clients,
                client_name.clone(),
                format!("client {} reachable at {}", client_name, contact),
            ));
        }
        if let (Some(pickup), Some(delivery)) = (&data.pickup_address, &data.delivery_address) {
            facts.push((
                KnowledgeCategory::Routes,
                format!("{} to {}", pickup, delivery),
                format!("shipping route from {} to {}", pickup, delivery),
            ));
        }
        if let Some(carrier) = &data.carrier {
            let mode = data.shipping_mode.as_deref().unwrap_or("unspecified mode");
            facts.push((
                KnowledgeCategory::Carriers,
                carrier.clone(),
                format!("carrier {} used for {} shipments", carrier, mode),
            ));
        }
        if let Some(tracking) = &data.booking_tracking {
            facts.push((
                KnowledgeCategory::TrackingNumbers,
                tracking.clone(),
                format!("booking reference {} for operation {}", tracking, operation.name),
            ));
        }

        for (category, title, content) in facts {
            if title == operation.name {
                continue;
            }
            let keywords = content
                .split_whitespace()
                .map(str::to_lowercase)
                .collect();
            let result = self
                .knowledge
                .add_knowledge(
                    operation.org_id,
                    NewKnowledge {
                        category,
                        title,
                        content,
                        keywords,
                        source: "operation_creation".into(),
                        source_id: Some(operation.id),
                        metadata: None,
                    },
                )
                .await;
            if let Err(e) = result {
                warn!(
                    org_id = %operation.org_id,
                    operation_id = %operation.id,
                    error = %e,
                    "Knowledge write failed after operation creation"
                );
            }
        }
    }

    /// Notify default assignees and the organization. Fire-and-forget.
    async fn notify_creation(&self, operation: &Operation) {
        let data = Some(opsmail_core::operation_notification_data(operation));
        let (title, body) = if operation.needs_attention {
            (
                format!("Operation {} needs attention", operation.name),
                format!(
                    "Auto-created from email with missing fields: {}",
                    operation.missing_fields.join(", ")
                ),
            )
        } else {
            (
                format!("Operation {} created", operation.name),
                "Auto-created from email".to_string(),
            )
        };

        for assignee in &operation.assignee_ids {
            let notification = Notification {
                title: title.clone(),
                body: body.clone(),
                url: None,
                data: data.clone(),
            };
            if let Err(e) = self
                .notifier
                .notify(NotifyTarget::User(*assignee), notification)
                .await
            {
                warn!(operation_id = %operation.id, error = %e, "Assignee notification failed");
            }
        }

        let notification = Notification {
            title,
            body,
            url: None,
            data,
        };
        if let Err(e) = self
            .notifier
            .notify(NotifyTarget::Organization(operation.org_id), notification)
            .await
        {
            warn!(operation_id = %operation.id, error = %e, "Organization notification failed");
        }
    }
}

/// Apply the rule's auto-fill gate to an extracted field.
fn filled(rule: &LinkingRule, value: Option<String>) -> Option<String> {
    if rule.auto_fill_fields {
        value
    } else {
        None
    }
}

/// Extract the candidate operation name from a subject.
///
/// Regex patterns yield capture group 1 when present, else the whole match.
/// Literal patterns yield the first whitespace-delimited token after the
/// literal, with leading separators stripped.
pub fn match_subject(pattern: &PatternKind, subject: &str) -> Option<String> {
    match pattern {
        PatternKind::Regex(raw) => {
            let re = regex::Regex::new(raw).ok()?;
            let captures = re.captures(subject)?;
            let matched = captures
                .get(1)
                .or_else(|| captures.get(0))
                .map(|m| m.as_str().trim().to_string())?;
            non_empty(matched)
        }
        PatternKind::Literal(literal) => {
            let lower_subject = subject.to_lowercase();
            let lower_literal = literal.to_lowercase();
            let start = lower_subject.find(&lower_literal)?;
            // Lowercasing can shift byte offsets for non-ASCII subjects;
            // a misaligned boundary just means no match.
            let rest = subject
                .get(start + lower_literal.len()..)?
                .trim_start_matches([' ', '-', ':', '#']);
            let token = rest.split_whitespace().next()?.trim().to_string();
            non_empty(token)
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Truncate to at most `max` characters on a char boundary.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Lowercased distinct words of subject and body worth matching knowledge
/// keywords against. Short words carry no signal.
fn email_keywords(email: &EmailMessage) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();
    for word in email.subject.split_whitespace().chain(email.body.split_whitespace()) {
        let word: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if word.len() >= 4 && seen.insert(word.clone()) {
            keywords.push(word);
        }
    }
    keywords
}
