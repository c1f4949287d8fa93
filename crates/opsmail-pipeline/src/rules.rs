//! Linking rule engine.
//!
//! Owns rule validation and lifecycle. Subject patterns are resolved into
//! [`PatternKind`] at write time: a pattern that fails to compile as a regex
//! is stored as an explicit literal, so run-time matching never guesses.
//! Enabling a rule that carries a `process_from_date` raises a backfill
//! request through the [`BackfillSink`].

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use opsmail_core::{
    BackfillSink, Error, LinkingRule, NewRule, PatternKind, Result, RuleRepository, UpdateRule,
};

/// Service owning rule validation, pattern resolution, and backfill
/// enqueueing over a [`RuleRepository`].
pub struct RuleEngine {
    repo: Arc<dyn RuleRepository>,
    backfill: Arc<dyn BackfillSink>,
}

impl RuleEngine {
    pub fn new(repo: Arc<dyn RuleRepository>, backfill: Arc<dyn BackfillSink>) -> Self {
        Self { repo, backfill }
    }

    /// Create a rule. The raw subject pattern is resolved here, once.
    pub async fn create_rule(&self, new: NewRule) -> Result<LinkingRule> {
        if new.name.trim().is_empty() {
            return Err(Error::InvalidInput("rule name must not be empty".into()));
        }
        if new.subject_pattern.trim().is_empty() {
            return Err(Error::InvalidInput(
                "rule subject pattern must not be empty".into(),
            ));
        }

        let now = Utc::now();
        let rule = LinkingRule {
            id: Uuid::new_v4(),
            org_id: new.org_id,
            name: new.name,
            subject_pattern: resolve_pattern(&new.subject_pattern),
            company_domains: normalize_domains(new.company_domains),
            auto_create_operations: new.auto_create_operations,
            auto_create_clients: new.auto_create_clients,
            auto_fill_fields: new.auto_fill_fields,
            default_assignee_ids: new.default_assignee_ids,
            email_account_ids: new.email_account_ids,
            process_from_date: new.process_from_date,
            last_historical_processed: None,
            enabled: new.enabled,
            link_signals: new.link_signals,
            created_at: now,
            updated_at: now,
        };

        self.repo.insert(rule.clone()).await?;
        info!(org_id = %rule.org_id, rule_id = %rule.id, "Linking rule created");

        if rule.enabled && rule.process_from_date.is_some() {
            self.enqueue_backfill(&rule).await;
        }
        Ok(rule)
    }

    /// Apply a partial update. Re-resolves the pattern when it changes and
    /// enqueues a backfill when the update enables historical processing.
    pub async fn update_rule(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: UpdateRule,
    ) -> Result<LinkingRule> {
        let mut rule = self
            .repo
            .get(org_id, id)
            .await?
            .ok_or(Error::RuleNotFound(id))?;

        let backfill_touched = patch.process_from_date.is_some() || patch.enabled == Some(true);

        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidInput("rule name must not be empty".into()));
            }
            rule.name = name;
        }
        if let Some(pattern) = patch.subject_pattern {
            if pattern.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "rule subject pattern must not be empty".into(),
                ));
            }
            rule.subject_pattern = resolve_pattern(&pattern);
        }
        if let Some(domains) = patch.company_domains {
            rule.company_domains = normalize_domains(domains);
        }
        if let Some(v) = patch.auto_create_operations {
            rule.auto_create_operations = v;
        }
        if let Some(v) = patch.auto_create_clients {
            rule.auto_create_clients = v;
        }
        if let Some(v) = patch.auto_fill_fields {
            rule.auto_fill_fields = v;
        }
        if let Some(v) = patch.default_assignee_ids {
            rule.default_assignee_ids = v;
        }
        if let Some(v) = patch.email_account_ids {
            rule.email_account_ids = v;
        }
        if let Some(v) = patch.process_from_date {
            rule.process_from_date = v;
        }
        if let Some(v) = patch.enabled {
            rule.enabled = v;
        }
        if let Some(v) = patch.link_signals {
            rule.link_signals = v;
        }
        rule.updated_at = Utc::now();

        self.repo.update(rule.clone()).await?;
        debug!(org_id = %org_id, rule_id = %id, "Linking rule updated");

        if backfill_touched && rule.enabled && rule.process_from_date.is_some() {
            self.enqueue_backfill(&rule).await;
        }
        Ok(rule)
    }

    pub async fn get_rule(&self, org_id: Uuid, id: Uuid) -> Result<Option<LinkingRule>> {
        self.repo.get(org_id, id).await
    }

    pub async fn list_rules(&self, org_id: Uuid) -> Result<Vec<LinkingRule>> {
        self.repo.list(org_id).await
    }

    pub async fn delete_rule(&self, org_id: Uuid, id: Uuid) -> Result<()> {
        self.repo.delete(org_id, id).await?;
        info!(org_id = %org_id, rule_id = %id, "Linking rule deleted");
        Ok(())
    }

    /// Best-effort: a failed enqueue loses one backfill trigger, not the
    /// rule write.
    async fn enqueue_backfill(&self, rule: &LinkingRule) {
        match self.backfill.enqueue(rule.org_id, rule.id).await {
            Ok(task_id) => {
                info!(
                    org_id = %rule.org_id,
                    rule_id = %rule.id,
                    task_id = %task_id,
                    "Backfill task enqueued"
                );
            }
            Err(e) => {
                warn!(
                    org_id = %rule.org_id,
                    rule_id = %rule.id,
                    error = %e,
                    "Failed to enqueue backfill task"
                );
            }
        }
    }
}

/// Resolve a raw subject pattern. Uncompilable regexes become explicit
/// literals, logged at write time, never silently at match time.
pub fn resolve_pattern(raw: &str) -> PatternKind {
    match Regex::new(raw) {
        Ok(_) => PatternKind::Regex(raw.to_string()),
        Err(e) => {
            warn!(pattern = raw, error = %e, "Subject pattern is not a valid regex, storing as literal");
            PatternKind::Literal(raw.to_string())
        }
    }
}

fn normalize_domains(domains: Vec<String>) -> Vec<String> {
    domains
        .into_iter()
        .map(|d| d.trim().trim_start_matches('@').to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}
