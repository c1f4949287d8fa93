//! In-memory email repository.
//!
//! The pipeline only writes the `operation_id` pointer (at most once) and
//! the consumed flag; everything else is read-only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use opsmail_core::{EmailMessage, EmailRepository, Result, UnlinkedEmailFilter};

/// In-memory [`EmailRepository`] implementation.
#[derive(Clone, Default)]
pub struct MemEmailRepository {
    emails: Arc<RwLock<HashMap<Uuid, EmailMessage>>>,
}

impl MemEmailRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmailRepository for MemEmailRepository {
    async fn insert(&self, email: EmailMessage) -> Result<Uuid> {
        let id = email.id;
        self.emails.write().await.insert(id, email);
        Ok(id)
    }

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<EmailMessage>> {
        let emails = self.emails.read().await;
        Ok(emails.get(&id).filter(|e| e.org_id == org_id).cloned())
    }

    async fn find_unlinked(
        &self,
        org_id: Uuid,
        filter: &UnlinkedEmailFilter,
    ) -> Result<Vec<EmailMessage>> {
        let emails = self.emails.read().await;
        let mut out: Vec<_> = emails
            .values()
            .filter(|e| e.org_id == org_id && e.operation_id.is_none())
            .filter(|e| {
                filter.account_ids.is_empty() || filter.account_ids.contains(&e.email_account_id)
            })
            .filter(|e| !filter.with_attachments_only || e.has_attachments())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        out.truncate(filter.limit.max(0) as usize);
        Ok(out)
    }

    async fn find_unprocessed(&self, org_id: Uuid, limit: i64) -> Result<Vec<EmailMessage>> {
        let emails = self.emails.read().await;
        let mut out: Vec<_> = emails
            .values()
            .filter(|e| e.org_id == org_id && !e.processed_for_creation)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn list_since(
        &self,
        org_id: Uuid,
        after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EmailMessage>> {
        let emails = self.emails.read().await;
        let mut out: Vec<_> = emails
            .values()
            .filter(|e| e.org_id == org_id && e.date > after)
            .cloned()
            .collect();
        // Ascending date: backfill watermarks assume monotonic progress.
        out.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn link_to_operation(
        &self,
        org_id: Uuid,
        email_ids: &[Uuid],
        operation_id: Uuid,
    ) -> Result<i64> {
        let mut emails = self.emails.write().await;
        let mut updated = 0;
        for id in email_ids {
            if let Some(email) = emails.get_mut(id) {
                if email.org_id == org_id && email.operation_id.is_none() {
                    email.operation_id = Some(operation_id);
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn mark_processed(&self, org_id: Uuid, id: Uuid) -> Result<()> {
        let mut emails = self.emails.write().await;
        if let Some(email) = emails.get_mut(&id) {
            if email.org_id == org_id {
                email.processed_for_creation = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::email;

    #[tokio::test]
    async fn test_find_unlinked_respects_accounts_and_attachments() {
        let repo = MemEmailRepository::new();
        let org = Uuid::new_v4();
        let account = Uuid::new_v4();

        let mut in_account = email(org, "subject one");
        in_account.email_account_id = account;
        let other_account = email(org, "subject two");
        let mut with_attachment = email(org, "subject three");
        with_attachment.email_account_id = account;
        with_attachment.attachments = vec![opsmail_core::EmailAttachment {
            filename: "bl.pdf".into(),
            content_type: "application/pdf".into(),
            storage_key: "k".into(),
            extracted_text: Some("HBL-123".into()),
        }];

        repo.insert(in_account.clone()).await.unwrap();
        repo.insert(other_account).await.unwrap();
        repo.insert(with_attachment.clone()).await.unwrap();

        let scoped = repo
            .find_unlinked(
                org,
                &UnlinkedEmailFilter {
                    account_ids: vec![account],
                    with_attachments_only: false,
                    limit: 50,
                },
            )
            .await
            .unwrap();
        assert_eq!(scoped.len(), 2);

        let attachments_only = repo
            .find_unlinked(
                org,
                &UnlinkedEmailFilter {
                    account_ids: vec![account],
                    with_attachments_only: true,
                    limit: 50,
                },
            )
            .await
            .unwrap();
        assert_eq!(attachments_only.len(), 1);
        assert_eq!(attachments_only[0].id, with_attachment.id);
    }

    #[tokio::test]
    async fn test_link_to_operation_sets_pointer_at_most_once() {
        let repo = MemEmailRepository::new();
        let org = Uuid::new_v4();
        let msg = email(org, "subject");
        let id = repo.insert(msg).await.unwrap();

        let first_op = Uuid::new_v4();
        let second_op = Uuid::new_v4();

        assert_eq!(repo.link_to_operation(org, &[id], first_op).await.unwrap(), 1);
        // Second attempt is a no-op: the pointer is already set.
        assert_eq!(repo.link_to_operation(org, &[id], second_op).await.unwrap(), 0);

        let stored = repo.get(org, id).await.unwrap().unwrap();
        assert_eq!(stored.operation_id, Some(first_op));
    }

    #[tokio::test]
    async fn test_list_since_ascending() {
        let repo = MemEmailRepository::new();
        let org = Uuid::new_v4();
        let base = Utc::now() - chrono::Duration::days(10);

        for offset in [3i64, 1, 2] {
            let mut msg = email(org, &format!("day {}", offset));
            msg.date = base + chrono::Duration::days(offset);
            repo.insert(msg).await.unwrap();
        }

        let since = repo.list_since(org, base, 10).await.unwrap();
        assert_eq!(since.len(), 3);
        assert!(since.windows(2).all(|w| w[0].date <= w[1].date));

        // Strictly-after boundary.
        let after_day_one = repo
            .list_since(org, base + chrono::Duration::days(1), 10)
            .await
            .unwrap();
        assert_eq!(after_day_one.len(), 2);
    }
}
