//! # opsmail-store
//!
//! In-memory repository layer for opsmail.
//!
//! The relational engine itself is an external collaborator; the pipeline
//! talks to the repository traits in `opsmail-core`. This crate provides
//! the async in-memory implementations that back the scheduler binary and
//! every test.
//!
//! ## Example
//!
//! ```rust
//! use opsmail_store::Store;
//! use opsmail_core::RuleRepository;
//!
//! # #[tokio::main]
//! # async fn main() -> opsmail_core::Result<()> {
//! let store = Store::in_memory();
//! let rules = store.rules.list(uuid::Uuid::new_v4()).await?;
//! assert!(rules.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod attachments;
pub mod clients;
pub mod emails;
pub mod knowledge;
pub mod operations;
pub mod rules;

// Test fixtures for integration tests.
// Always compiled so per-crate tests/ suites can use the builders.
pub mod fixtures;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

pub use attachments::MemAttachmentFetcher;
pub use clients::MemClientRepository;
pub use emails::MemEmailRepository;
pub use knowledge::MemKnowledgeRepository;
pub use operations::MemOperationRepository;
pub use rules::MemRuleRepository;

// Re-export core types
pub use opsmail_core::*;

/// Combined store context with all repositories.
#[derive(Clone)]
pub struct Store {
    /// Linking rule repository.
    pub rules: Arc<MemRuleRepository>,
    /// Knowledge entry repository.
    pub knowledge: Arc<MemKnowledgeRepository>,
    /// Operation repository.
    pub operations: Arc<MemOperationRepository>,
    /// Client repository.
    pub clients: Arc<MemClientRepository>,
    /// Email repository.
    pub emails: Arc<MemEmailRepository>,
    /// Attachment byte store.
    pub attachments: Arc<MemAttachmentFetcher>,
}

impl Store {
    /// Create a fresh in-memory store. Operations and clients share a map
    /// so operation inserts can verify client ownership.
    pub fn in_memory() -> Self {
        let client_map = Arc::new(RwLock::new(HashMap::new()));
        Self {
            rules: Arc::new(MemRuleRepository::new()),
            knowledge: Arc::new(MemKnowledgeRepository::new()),
            operations: Arc::new(MemOperationRepository::new(client_map.clone())),
            clients: Arc::new(MemClientRepository::new(client_map)),
            attachments: Arc::new(MemAttachmentFetcher::new()),
            emails: Arc::new(MemEmailRepository::new()),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsmail_core::{ClientRepository, NewClient, OperationRepository};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_store_shares_client_map_with_operations() {
        let store = Store::in_memory();
        let org = Uuid::new_v4();

        let client = store
            .clients
            .insert(NewClient {
                org_id: org,
                name: "Acme".into(),
                email: None,
            })
            .await
            .unwrap();

        let mut op = fixtures::new_operation(org, "OP-1");
        op.client_id = Some(client.id);
        assert!(store.operations.insert(op).await.is_ok());
    }
}
