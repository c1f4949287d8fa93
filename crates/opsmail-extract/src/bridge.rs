//! Text extraction bridge.
//!
//! Pulls raw text out of email attachments so downstream matchers can search
//! non-text content. Every failure path collapses to `None`: callers treat a
//! missing result as "no signal", never as an error to propagate.

use std::sync::Arc;

use tracing::debug;

use opsmail_core::{AttachmentFetcher, AttachmentTextAdapter, EmailAttachment};

use crate::adapters::{ImageOcrAdapter, PdfTextAdapter};

/// Bridge dispatching attachment bytes to the first adapter that supports
/// the content type.
pub struct TextExtractionBridge {
    fetcher: Arc<dyn AttachmentFetcher>,
    adapters: Vec<Arc<dyn AttachmentTextAdapter>>,
}

impl TextExtractionBridge {
    /// Create a bridge with the standard adapter set (PDF text layer,
    /// image OCR).
    pub fn new(fetcher: Arc<dyn AttachmentFetcher>) -> Self {
        Self {
            fetcher,
            adapters: vec![Arc::new(PdfTextAdapter), Arc::new(ImageOcrAdapter::new())],
        }
    }

    /// Create a bridge with a custom adapter set.
    pub fn with_adapters(
        fetcher: Arc<dyn AttachmentFetcher>,
        adapters: Vec<Arc<dyn AttachmentTextAdapter>>,
    ) -> Self {
        Self { fetcher, adapters }
    }

    /// Extract text from an attachment, or `None` on any failure or
    /// unsupported type.
    pub async fn extract(&self, attachment: &EmailAttachment) -> Option<String> {
        let adapter = self
            .adapters
            .iter()
            .find(|a| a.supports(&attachment.content_type))?;

        let data = match self.fetcher.fetch(&attachment.storage_key).await {
            Ok(data) => data,
            Err(e) => {
                debug!(
                    storage_key = %attachment.storage_key,
                    error = %e,
                    "Attachment fetch failed, no text signal"
                );
                return None;
            }
        };

        match adapter.extract(&data, &attachment.filename).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                debug!(
                    adapter = adapter.name(),
                    filename = %attachment.filename,
                    error = %e,
                    "Attachment text extraction failed, no text signal"
                );
                None
            }
        }
    }

    /// Health of every registered adapter, by name. A probe error counts
    /// as unavailable.
    pub async fn health_report(&self) -> Vec<(String, bool)> {
        let mut report = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let healthy = adapter.health_check().await.unwrap_or(false);
            report.push((adapter.name().to_string(), healthy));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opsmail_core::{Error, Result};
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    struct MapFetcher(RwLock<HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl AttachmentFetcher for MapFetcher {
        async fn fetch(&self, storage_key: &str) -> Result<Vec<u8>> {
            self.0
                .read()
                .await
                .get(storage_key)
                .cloned()
                .ok_or_else(|| Error::NotFound(storage_key.to_string()))
        }
    }

    struct UpperAdapter;

    #[async_trait]
    impl AttachmentTextAdapter for UpperAdapter {
        fn supports(&self, content_type: &str) -> bool {
            content_type == "text/plain"
        }

        async fn extract(&self, data: &[u8], _filename: &str) -> Result<String> {
            Ok(String::from_utf8_lossy(data).to_uppercase())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "upper"
        }
    }

    fn attachment(content_type: &str, key: &str) -> EmailAttachment {
        EmailAttachment {
            filename: "f".into(),
            content_type: content_type.into(),
            storage_key: key.into(),
            extracted_text: None,
        }
    }

    fn bridge_with(blobs: Vec<(&str, &[u8])>) -> TextExtractionBridge {
        let map: HashMap<String, Vec<u8>> = blobs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect();
        TextExtractionBridge::with_adapters(
            Arc::new(MapFetcher(RwLock::new(map))),
            vec![Arc::new(UpperAdapter)],
        )
    }

    #[tokio::test]
    async fn test_extracts_via_matching_adapter() {
        let bridge = bridge_with(vec![("k1", b"hbl-123")]);
        let text = bridge.extract(&attachment("text/plain", "k1")).await;
        assert_eq!(text.as_deref(), Some("HBL-123"));
    }

    #[tokio::test]
    async fn test_unsupported_type_is_none() {
        let bridge = bridge_with(vec![("k1", b"data")]);
        assert!(bridge.extract(&attachment("audio/mpeg", "k1")).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_none() {
        let bridge = bridge_with(vec![]);
        assert!(bridge.extract(&attachment("text/plain", "missing")).await.is_none());
    }

    #[tokio::test]
    async fn test_health_report_names_every_adapter() {
        let bridge = bridge_with(vec![]);
        let report = bridge.health_report().await;
        assert_eq!(report, vec![("upper".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_empty_text_is_none() {
        let bridge = bridge_with(vec![("k1", b"   ")]);
        assert!(bridge.extract(&attachment("text/plain", "k1")).await.is_none());
    }
}
