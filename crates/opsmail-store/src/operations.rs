//! In-memory operation repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use opsmail_core::{Client, Error, NewOperation, Operation, OperationRepository, Result};

/// In-memory [`OperationRepository`] implementation.
///
/// Holds a reference to the client map so inserts can reject a `client_id`
/// that belongs to another organization.
#[derive(Clone, Default)]
pub struct MemOperationRepository {
    operations: Arc<RwLock<HashMap<Uuid, Operation>>>,
    clients: Arc<RwLock<HashMap<Uuid, Client>>>,
}

impl MemOperationRepository {
    pub fn new(clients: Arc<RwLock<HashMap<Uuid, Client>>>) -> Self {
        Self {
            operations: Arc::new(RwLock::new(HashMap::new())),
            clients,
        }
    }
}

#[async_trait]
impl OperationRepository for MemOperationRepository {
    async fn insert(&self, op: NewOperation) -> Result<Operation> {
        if let Some(client_id) = op.client_id {
            let clients = self.clients.read().await;
            let owned = clients
                .get(&client_id)
                .is_some_and(|c| c.org_id == op.org_id);
            if !owned {
                return Err(Error::InvalidInput(format!(
                    "client {} does not belong to organization {}",
                    client_id, op.org_id
                )));
            }
        }

        let operation = Operation {
            id: Uuid::new_v4(),
            org_id: op.org_id,
            name: op.name,
            status: op.status,
            client_id: op.client_id,
            operation_type: op.operation_type,
            shipping_mode: op.shipping_mode,
            carrier: op.carrier,
            pickup_address: op.pickup_address,
            delivery_address: op.delivery_address,
            booking_tracking: op.booking_tracking,
            mbl_awb: op.mbl_awb,
            hbl_awb: op.hbl_awb,
            description: op.description,
            etd: op.etd,
            eta: op.eta,
            auto_created: op.auto_created,
            needs_attention: op.needs_attention,
            missing_fields: op.missing_fields,
            assignee_ids: op.assignee_ids,
            created_at: Utc::now(),
        };
        self.operations
            .write()
            .await
            .insert(operation.id, operation.clone());
        Ok(operation)
    }

    async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Option<Operation>> {
        let operations = self.operations.read().await;
        Ok(operations.get(&id).filter(|o| o.org_id == org_id).cloned())
    }

    async fn find_by_name_contains(
        &self,
        org_id: Uuid,
        needle: &str,
    ) -> Result<Option<Operation>> {
        let needle = needle.to_lowercase();
        let operations = self.operations.read().await;
        Ok(operations
            .values()
            .filter(|o| o.org_id == org_id)
            .find(|o| o.name.to_lowercase().contains(&needle))
            .cloned())
    }

    async fn list_active(&self, org_id: Uuid) -> Result<Vec<Operation>> {
        let operations = self.operations.read().await;
        let mut out: Vec<_> = operations
            .values()
            .filter(|o| o.org_id == org_id && !o.status.is_terminal())
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{client, new_operation};
    use opsmail_core::OperationStatus;

    fn repo_with_clients() -> (MemOperationRepository, Arc<RwLock<HashMap<Uuid, Client>>>) {
        let clients = Arc::new(RwLock::new(HashMap::new()));
        (MemOperationRepository::new(clients.clone()), clients)
    }

    #[tokio::test]
    async fn test_insert_rejects_foreign_client() {
        let (repo, clients) = repo_with_clients();
        let org = Uuid::new_v4();
        let foreign = client(Uuid::new_v4());
        clients.write().await.insert(foreign.id, foreign.clone());

        let mut op = new_operation(org, "OP-1");
        op.client_id = Some(foreign.id);
        let err = repo.insert(op).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_find_by_name_contains_case_insensitive() {
        let (repo, _) = repo_with_clients();
        let org = Uuid::new_v4();
        repo.insert(new_operation(org, "Shipment ABC123 Hamburg"))
            .await
            .unwrap();

        assert!(repo
            .find_by_name_contains(org, "abc123")
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .find_by_name_contains(org, "XYZ")
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .find_by_name_contains(Uuid::new_v4(), "abc123")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_active_excludes_terminal() {
        let (repo, _) = repo_with_clients();
        let org = Uuid::new_v4();

        repo.insert(new_operation(org, "active")).await.unwrap();
        let mut done = new_operation(org, "done");
        done.status = OperationStatus::Completed;
        repo.insert(done).await.unwrap();
        let mut cancelled = new_operation(org, "cancelled");
        cancelled.status = OperationStatus::Cancelled;
        repo.insert(cancelled).await.unwrap();

        let active = repo.list_active(org).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "active");
    }
}
