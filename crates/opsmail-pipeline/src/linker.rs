//! Auto-linker.
//!
//! Attaches unlinked email to existing operations by matching a disjunction
//! of signals: the client's address, the operation id, booking/tracking and
//! bill numbers, and operator-authored subject/body templates. Which signals
//! run is controlled per rule; each defaults to on.
//!
//! Also owns historical backfill: replaying old email through the creation
//! pipeline from a rule's `process_from_date`, with a watermark that only
//! advances when a batch completes clean.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use opsmail_core::{
    defaults, email_address, ClientRepository, EmailMessage, EmailRepository, Error, LinkSignals,
    LinkingRule, Operation, OperationRepository, Result, RuleRepository, UnlinkedEmailFilter,
};

use crate::creator::OperationCreator;

/// Counts for one historical backfill batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub processed: usize,
    pub failed: usize,
    /// Whether the rule's watermark moved. Requires a clean batch.
    pub watermark_advanced: bool,
}

/// Service linking unlinked email to operations and replaying history.
pub struct AutoLinker {
    rules: Arc<dyn RuleRepository>,
    operations: Arc<dyn OperationRepository>,
    clients: Arc<dyn ClientRepository>,
    emails: Arc<dyn EmailRepository>,
    creator: Arc<OperationCreator>,
}

impl AutoLinker {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        operations: Arc<dyn OperationRepository>,
        clients: Arc<dyn ClientRepository>,
        emails: Arc<dyn EmailRepository>,
        creator: Arc<OperationCreator>,
    ) -> Self {
        Self {
            rules,
            operations,
            clients,
            emails,
            creator,
        }
    }

    /// Link unlinked email to active operations. Returns the number of
    /// emails linked.
    pub async fn link_unlinked_emails(&self, org_id: Uuid) -> Result<i64> {
        let rules = self.rules.list_enabled(org_id).await?;
        let operations = self.operations.list_active(org_id).await?;
        if rules.is_empty() || operations.is_empty() {
            return Ok(0);
        }

        let mut linked = 0;
        for rule in &rules {
            linked += self.link_for_rule(org_id, rule, &operations).await?;
        }
        if linked > 0 {
            info!(org_id = %org_id, linked_count = linked, "Auto-link pass completed");
        }
        Ok(linked)
    }

    async fn link_for_rule(
        &self,
        org_id: Uuid,
        rule: &LinkingRule,
        operations: &[Operation],
    ) -> Result<i64> {
        let batch = self
            .emails
            .find_unlinked(
                org_id,
                &UnlinkedEmailFilter {
                    account_ids: rule.email_account_ids.clone(),
                    with_attachments_only: false,
                    limit: defaults::LINK_BATCH_SIZE,
                },
            )
            .await?;

        let attachment_batch = if rule.link_signals.search_attachments {
            self.emails
                .find_unlinked(
                    org_id,
                    &UnlinkedEmailFilter {
                        account_ids: rule.email_account_ids.clone(),
                        with_attachments_only: true,
                        limit: defaults::LINK_BATCH_SIZE,
                    },
                )
                .await?
        } else {
            Vec::new()
        };

        let mut linked = 0;
        for operation in operations {
            let matchers = self.matchers_for(org_id, operation, &rule.link_signals).await;

            let mut matched: HashSet<Uuid> = HashSet::new();
            for email in &batch {
                if matchers.matches_email(email) {
                    matched.insert(email.id);
                }
            }
            // Second pass: already-extracted attachment text only. Text is
            // never recomputed here.
            for email in &attachment_batch {
                if matchers.matches_attachment_text(email) {
                    matched.insert(email.id);
                }
            }

            if !matched.is_empty() {
                let ids: Vec<Uuid> = matched.into_iter().collect();
                linked += self
                    .emails
                    .link_to_operation(org_id, &ids, operation.id)
                    .await?;
            }
        }
        Ok(linked)
    }

    /// Replay historical email through the creation pipeline for one rule.
    ///
    /// Processing starts at the later of the rule's `process_from_date` and
    /// its watermark, ascending. Each email sits in its own failure
    /// boundary; the watermark advances to the last date in the batch only
    /// when every item succeeded, so a failed item is retried next run.
    pub async fn process_historical_emails(
        &self,
        org_id: Uuid,
        rule_id: Uuid,
    ) -> Result<BackfillStats> {
        let rule = self
            .rules
            .get(org_id, rule_id)
            .await?
            .ok_or(Error::RuleNotFound(rule_id))?;
        let from = match rule.process_from_date {
            Some(date) => date,
            None => return Ok(BackfillStats::default()),
        };
        let start = match rule.last_historical_processed {
            Some(watermark) if watermark > from => watermark,
            _ => from,
        };

        let batch = self
            .emails
            .list_since(org_id, start, defaults::BACKFILL_BATCH_SIZE)
            .await?;
        let mut stats = BackfillStats::default();
        for email in &batch {
            match self.creator.process_email(email).await {
                Ok(_) => stats.processed += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        org_id = %org_id,
                        rule_id = %rule_id,
                        email_id = %email.id,
                        error = %e,
                        "Historical email processing failed"
                    );
                }
            }
        }

        if stats.failed == 0 {
            if let Some(last) = batch.last() {
                self.rules.set_watermark(org_id, rule_id, last.date).await?;
                stats.watermark_advanced = true;
            }
        }
        info!(
            org_id = %org_id,
            rule_id = %rule_id,
            processed = stats.processed,
            failed_count = stats.failed,
            watermark_advanced = stats.watermark_advanced,
            "Historical backfill batch completed"
        );
        Ok(stats)
    }

    /// Precompute the operation's match values under the rule's toggles.
    async fn matchers_for(
        &self,
        org_id: Uuid,
        operation: &Operation,
        signals: &LinkSignals,
    ) -> OperationMatchers {
        let client_email = if signals.match_client_email {
            match operation.client_id {
                Some(client_id) => match self.clients.get(org_id, client_id).await {
                    Ok(Some(client)) => client.email.map(|e| e.to_lowercase()),
                    Ok(None) => None,
                    Err(e) => {
                        warn!(org_id = %org_id, client_id = %client_id, error = %e, "Client lookup failed during linking");
                        None
                    }
                },
                None => None,
            }
        } else {
            None
        };

        OperationMatchers::new(operation, signals, client_email)
    }
}

/// The concrete values an operation can be recognized by in email text,
/// resolved once per (operation, rule) pair.
struct OperationMatchers {
    client_email: Option<String>,
    operation_id: Option<String>,
    tracking: Option<String>,
    mbl: Option<String>,
    hbl: Option<String>,
    subject_needle: Option<String>,
    body_needle: Option<String>,
}

impl OperationMatchers {
    fn new(operation: &Operation, signals: &LinkSignals, client_email: Option<String>) -> Self {
        let value = |on: bool, v: &Option<String>| {
            if !on {
                return None;
            }
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
        };
        Self {
            client_email,
            operation_id: signals
                .match_operation_id
                .then(|| operation.id.to_string().to_lowercase()),
            tracking: value(signals.match_tracking, &operation.booking_tracking),
            mbl: value(signals.match_bills, &operation.mbl_awb),
            hbl: value(signals.match_bills, &operation.hbl_awb),
            subject_needle: signals
                .subject_template
                .as_deref()
                .and_then(|t| substitute_template(t, operation))
                .map(|s| s.to_lowercase()),
            body_needle: signals
                .body_template
                .as_deref()
                .and_then(|t| substitute_template(t, operation))
                .map(|s| s.to_lowercase()),
        }
    }

    fn matches_email(&self, email: &EmailMessage) -> bool {
        if let Some(addr) = &self.client_email {
            if email_address(&email.from_addr).as_deref() == Some(addr) {
                return true;
            }
            if email
                .recipients
                .iter()
                .any(|r| email_address(r).as_deref() == Some(addr))
            {
                return true;
            }
        }

        let subject = email.subject.to_lowercase();
        let body = email.body.to_lowercase();
        if self.text_signal_hits(&subject) || self.text_signal_hits(&body) {
            return true;
        }
        if let Some(needle) = &self.subject_needle {
            if subject.contains(needle) {
                return true;
            }
        }
        if let Some(needle) = &self.body_needle {
            if body.contains(needle) {
                return true;
            }
        }
        false
    }

    fn matches_attachment_text(&self, email: &EmailMessage) -> bool {
        email.attachments.iter().any(|attachment| {
            match &attachment.extracted_text {
                Some(text) => {
                    let text = text.to_lowercase();
                    if self.text_signal_hits(&text) {
                        return true;
                    }
                    if let Some(addr) = &self.client_email {
                        if text.contains(addr) {
                            return true;
                        }
                    }
                    false
                }
                None => false,
            }
        })
    }

    /// Identifier signals against an already-lowercased haystack.
    fn text_signal_hits(&self, haystack: &str) -> bool {
        [&self.operation_id, &self.tracking, &self.mbl, &self.hbl]
            .into_iter()
            .flatten()
            .any(|needle| haystack.contains(needle))
    }
}

/// Substitute operation fields into a link template. A template referencing
/// a field the operation doesn't carry yields nothing, so an empty
/// substitution can never match everything.
pub fn substitute_template(template: &str, operation: &Operation) -> Option<String> {
    let mut out = template.to_string();
    let substitutions = [
        ("{operationId}", Some(operation.id.to_string())),
        ("{projectName}", Some(operation.name.clone())),
        ("{bookingTracking}", operation.booking_tracking.clone()),
        ("{mbl_awb}", operation.mbl_awb.clone()),
        ("{hbl_awb}", operation.hbl_awb.clone()),
    ];
    for (placeholder, value) in substitutions {
        if !out.contains(placeholder) {
            continue;
        }
        match value {
            Some(v) if !v.trim().is_empty() => out = out.replace(placeholder, &v),
            _ => return None,
        }
    }
    let out = out.trim().to_string();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}
