//! In-memory attachment byte store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use opsmail_core::{AttachmentFetcher, Error, Result};

/// In-memory [`AttachmentFetcher`] implementation keyed by storage key.
#[derive(Clone, Default)]
pub struct MemAttachmentFetcher {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemAttachmentFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes under a storage key.
    pub async fn put(&self, storage_key: impl Into<String>, data: Vec<u8>) {
        self.blobs.write().await.insert(storage_key.into(), data);
    }
}

#[async_trait]
impl AttachmentFetcher for MemAttachmentFetcher {
    async fn fetch(&self, storage_key: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().await;
        blobs
            .get(storage_key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("attachment blob {}", storage_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_fetch() {
        let fetcher = MemAttachmentFetcher::new();
        fetcher.put("a/b.pdf", b"%PDF-1.4".to_vec()).await;
        assert_eq!(fetcher.fetch("a/b.pdf").await.unwrap(), b"%PDF-1.4");
        assert!(fetcher.fetch("missing").await.is_err());
    }
}
