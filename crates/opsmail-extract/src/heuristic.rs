//! Heuristic fallback extractor.
//!
//! Used whenever the structured-extraction service is unavailable or its
//! response fails validation. Parses the From header for a name/email pair
//! and applies the same company-domain exclusion the service is instructed
//! with: the pipeline stays alive, just with less data.

use async_trait::async_trait;
use tracing::debug;

use opsmail_core::{
    email_address, email_display_name, email_domain, ExtractedOperationData, ExtractionPrompt,
    Result, StructuredExtractor,
};

/// Fallback extractor that derives what it can from email headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StructuredExtractor for HeuristicExtractor {
    async fn extract(&self, prompt: &ExtractionPrompt) -> Result<ExtractedOperationData> {
        let mut data = ExtractedOperationData::default();

        let address = email_address(&prompt.from_addr);
        let internal = address.as_deref().is_some_and(|addr| {
            email_domain(addr).is_some_and(|domain| {
                prompt
                    .exclusion_domains
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(&domain))
            })
        });

        if internal {
            debug!(from = %prompt.from_addr, "Sender is internal staff, not attributing as client");
        } else if let Some(addr) = address {
            data.client_email = Some(addr.clone());
            data.client_name = email_display_name(&prompt.from_addr)
                .or_else(|| addr.split('@').next().map(String::from));
        }

        if !prompt.subject.trim().is_empty() {
            data.description = Some(prompt.subject.trim().to_string());
        }

        Ok(data)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
