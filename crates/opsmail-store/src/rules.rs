//! In-memory linking rule repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use opsmail_core::{Error, LinkingRule, Result, RuleRepository};

/// In-memory [`RuleRepository`] implementation.
#[derive(Clone, Default)]
pub struct MemRuleRepository {
    rules: Arc<RwLock<HashMap<Uuid, LinkingRule>>>,
}

impl MemRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sort_stable(rules: &mut Vec<LinkingRule>) {
        // Stable iteration order for rule matching: (created_at, id).
        rules.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
    }
}

#[async_trait]
impl RuleRepository for MemRuleRepository {
    async fn insert(&self, rule: LinkingRule) -> Result<Uuid> {
        let id = rule.id;
        self.rules.write().await.insert(id, rule);
        Ok(id)
    }

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<LinkingRule>> {
        let rules = self.rules.read().await;
        Ok(rules.get(&id).filter(|r| r.org_id == org_id).cloned())
    }

    async fn list(&self, org_id: Uuid) -> Result<Vec<LinkingRule>> {
        let rules = self.rules.read().await;
        let mut out: Vec<_> = rules.values().filter(|r| r.org_id == org_id).cloned().collect();
        Self::sort_stable(&mut out);
        Ok(out)
    }

    async fn list_enabled(&self, org_id: Uuid) -> Result<Vec<LinkingRule>> {
        let mut out = self.list(org_id).await?;
        out.retain(|r| r.enabled);
        Ok(out)
    }

    async fn update(&self, rule: LinkingRule) -> Result<()> {
        let mut rules = self.rules.write().await;
        match rules.get(&rule.id) {
            Some(existing) if existing.org_id == rule.org_id => {
                rules.insert(rule.id, rule);
                Ok(())
            }
            _ => Err(Error::RuleNotFound(rule.id)),
        }
    }

    async fn delete(&self, org_id: Uuid, id: Uuid) -> Result<()> {
        let mut rules = self.rules.write().await;
        match rules.get(&id) {
            Some(existing) if existing.org_id == org_id => {
                rules.remove(&id);
                Ok(())
            }
            _ => Err(Error::RuleNotFound(id)),
        }
    }

    async fn set_watermark(&self, org_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(&id) {
            Some(rule) if rule.org_id == org_id => {
                rule.last_historical_processed = Some(at);
                rule.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(Error::RuleNotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::rule;

    #[tokio::test]
    async fn test_insert_and_get_scoped_by_org() {
        let repo = MemRuleRepository::new();
        let org = Uuid::new_v4();
        let r = rule(org);
        let id = repo.insert(r.clone()).await.unwrap();

        assert!(repo.get(org, id).await.unwrap().is_some());
        assert!(repo.get(Uuid::new_v4(), id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_enabled_filters_and_orders() {
        let repo = MemRuleRepository::new();
        let org = Uuid::new_v4();

        let mut first = rule(org);
        first.created_at = Utc::now() - chrono::Duration::hours(2);
        let mut second = rule(org);
        second.created_at = Utc::now() - chrono::Duration::hours(1);
        let mut disabled = rule(org);
        disabled.enabled = false;

        repo.insert(second.clone()).await.unwrap();
        repo.insert(first.clone()).await.unwrap();
        repo.insert(disabled).await.unwrap();

        let enabled = repo.list_enabled(org).await.unwrap();
        assert_eq!(enabled.len(), 2);
        assert_eq!(enabled[0].id, first.id);
        assert_eq!(enabled[1].id, second.id);
    }

    #[tokio::test]
    async fn test_update_rejects_foreign_org() {
        let repo = MemRuleRepository::new();
        let org = Uuid::new_v4();
        let r = rule(org);
        repo.insert(r.clone()).await.unwrap();

        let mut foreign = r.clone();
        foreign.org_id = Uuid::new_v4();
        assert!(repo.update(foreign).await.is_err());
    }

    #[tokio::test]
    async fn test_set_watermark() {
        let repo = MemRuleRepository::new();
        let org = Uuid::new_v4();
        let r = rule(org);
        repo.insert(r.clone()).await.unwrap();

        let at = Utc::now();
        repo.set_watermark(org, r.id, at).await.unwrap();
        let stored = repo.get(org, r.id).await.unwrap().unwrap();
        assert_eq!(stored.last_historical_processed, Some(at));
    }
}
