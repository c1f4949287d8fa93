//! Mock structured extractor for deterministic testing.
//!
//! Provides fixed or subject-mapped responses, failure injection, and a
//! call log for assertions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use opsmail_core::{
    Error, ExtractedOperationData, ExtractionPrompt, Result, StructuredExtractor,
};

/// Mock extraction backend for testing.
#[derive(Clone)]
pub struct MockExtractor {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<ExtractionPrompt>>>,
}

#[derive(Debug, Clone, Default)]
struct MockConfig {
    default_response: ExtractedOperationData,
    /// Responses keyed by prompt subject.
    mapped_responses: HashMap<String, ExtractedOperationData>,
    always_fail: bool,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    /// Create a mock returning an empty payload for every prompt.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the response returned for unmapped prompts.
    pub fn with_response(mut self, response: ExtractedOperationData) -> Self {
        Arc::make_mut(&mut self.config).default_response = response;
        self
    }

    /// Map a specific prompt subject to a response.
    pub fn with_response_for_subject(
        mut self,
        subject: impl Into<String>,
        response: ExtractedOperationData,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .mapped_responses
            .insert(subject.into(), response);
        self
    }

    /// Make every extraction fail, for exercising the heuristic fallback.
    pub fn with_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).always_fail = true;
        self
    }

    /// All prompts received so far.
    pub fn calls(&self) -> Vec<ExtractionPrompt> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of extraction calls made.
    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl StructuredExtractor for MockExtractor {
    async fn extract(&self, prompt: &ExtractionPrompt) -> Result<ExtractedOperationData> {
        self.call_log.lock().unwrap().push(prompt.clone());

        if self.config.always_fail {
            return Err(Error::Extraction("mock failure injected".into()));
        }

        Ok(self
            .config
            .mapped_responses
            .get(&prompt.subject)
            .cloned()
            .unwrap_or_else(|| self.config.default_response.clone()))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.config.always_fail)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(subject: &str) -> ExtractionPrompt {
        ExtractionPrompt {
            subject: subject.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_default_response_and_call_log() {
        let mock = MockExtractor::new().with_response(ExtractedOperationData {
            carrier: Some("Maersk".into()),
            ..Default::default()
        });

        let data = mock.extract(&prompt("anything")).await.unwrap();
        assert_eq!(data.carrier.as_deref(), Some("Maersk"));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.calls()[0].subject, "anything");
    }

    #[tokio::test]
    async fn test_subject_mapped_response() {
        let mock = MockExtractor::new().with_response_for_subject(
            "special",
            ExtractedOperationData {
                carrier: Some("DHL".into()),
                ..Default::default()
            },
        );

        assert_eq!(
            mock.extract(&prompt("special")).await.unwrap().carrier.as_deref(),
            Some("DHL")
        );
        assert!(mock.extract(&prompt("other")).await.unwrap().carrier.is_none());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mock = MockExtractor::new().with_failure();
        assert!(mock.extract(&prompt("x")).await.is_err());
        assert!(!mock.health_check().await.unwrap());
        // Failed calls are still logged.
        assert_eq!(mock.call_count(), 1);
    }
}
