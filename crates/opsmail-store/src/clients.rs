//! In-memory client repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use opsmail_core::{Client, ClientRepository, NewClient, Result};

/// In-memory [`ClientRepository`] implementation.
///
/// The client map is shared with [`crate::MemOperationRepository`] for
/// referential-integrity checks on operation inserts.
#[derive(Clone, Default)]
pub struct MemClientRepository {
    clients: Arc<RwLock<HashMap<Uuid, Client>>>,
}

impl MemClientRepository {
    pub fn new(clients: Arc<RwLock<HashMap<Uuid, Client>>>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl ClientRepository for MemClientRepository {
    async fn insert(&self, client: NewClient) -> Result<Client> {
        let record = Client {
            id: Uuid::new_v4(),
            org_id: client.org_id,
            name: client.name,
            email: client.email.map(|e| e.to_lowercase()),
            created_at: Utc::now(),
        };
        self.clients
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<Client>> {
        let clients = self.clients.read().await;
        Ok(clients.get(&id).filter(|c| c.org_id == org_id).cloned())
    }

    async fn find_by_email(&self, org_id: Uuid, email: &str) -> Result<Option<Client>> {
        let email = email.to_lowercase();
        let clients = self.clients.read().await;
        Ok(clients
            .values()
            .filter(|c| c.org_id == org_id)
            .find(|c| c.email.as_deref() == Some(email.as_str()))
            .cloned())
    }

    async fn find_by_name_contains(&self, org_id: Uuid, needle: &str) -> Result<Option<Client>> {
        let needle = needle.to_lowercase();
        let clients = self.clients.read().await;
        Ok(clients
            .values()
            .filter(|c| c.org_id == org_id)
            .find(|c| c.name.to_lowercase().contains(&needle))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> MemClientRepository {
        MemClientRepository::new(Arc::new(RwLock::new(HashMap::new())))
    }

    #[tokio::test]
    async fn test_insert_normalizes_email() {
        let repo = repo();
        let org = Uuid::new_v4();
        let created = repo
            .insert(NewClient {
                org_id: org,
                name: "Acme GmbH".into(),
                email: Some("Ops@Acme.COM".into()),
            })
            .await
            .unwrap();
        assert_eq!(created.email.as_deref(), Some("ops@acme.com"));

        let found = repo.find_by_email(org, "OPS@ACME.COM").await.unwrap();
        assert_eq!(found.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_find_by_name_contains() {
        let repo = repo();
        let org = Uuid::new_v4();
        repo.insert(NewClient {
            org_id: org,
            name: "Northwind Logistics".into(),
            email: None,
        })
        .await
        .unwrap();

        assert!(repo
            .find_by_name_contains(org, "northwind")
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .find_by_name_contains(org, "southbound")
            .await
            .unwrap()
            .is_none());
    }
}
