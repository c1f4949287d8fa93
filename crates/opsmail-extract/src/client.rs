//! HTTP structured-extraction backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use opsmail_core::{
    defaults, Error, ExtractedOperationData, ExtractionPrompt, Result, StructuredExtractor,
};

/// Default extraction service base URL.
pub const DEFAULT_EXTRACTOR_URL: &str = defaults::EXTRACTOR_URL;

/// Timeout for extraction requests (seconds).
pub const EXTRACTOR_TIMEOUT_SECS: u64 = defaults::EXTRACTOR_TIMEOUT_SECS;

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    data: ExtractedOperationData,
}

/// Structured-extraction backend over an HTTP JSON service.
///
/// POSTs the rendered prompt to `{base}/extract` and expects
/// `{"data": {...}}` with the strict field set. Responses that fail schema
/// validation are rejected so the caller can downgrade to heuristics.
pub struct HttpExtractorBackend {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpExtractorBackend {
    /// Create a backend with custom configuration.
    pub fn with_config(base_url: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    /// Create from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OPSMAIL_EXTRACTOR_URL` | `http://127.0.0.1:8089` | Service base URL |
    /// | `OPSMAIL_EXTRACTOR_TIMEOUT_SECS` | `30` | Request timeout |
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(defaults::ENV_EXTRACTOR_URL)
            .unwrap_or_else(|_| DEFAULT_EXTRACTOR_URL.to_string());
        let timeout_secs = std::env::var(defaults::ENV_EXTRACTOR_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(EXTRACTOR_TIMEOUT_SECS);
        Self::with_config(base_url, timeout_secs)
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The configured request timeout in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

#[async_trait]
impl StructuredExtractor for HttpExtractorBackend {
    async fn extract(&self, prompt: &ExtractionPrompt) -> Result<ExtractedOperationData> {
        let rendered = prompt.render();
        let start = Instant::now();

        let response = self
            .client
            .post(format!("{}/extract", self.base_url))
            .json(&ExtractRequest { prompt: &rendered })
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("extraction service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Extraction(format!(
                "extraction service returned {}",
                response.status()
            )));
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("malformed extraction response: {}", e)))?;

        // Strict schema: violations downgrade the caller to heuristics.
        if let Err(e) = parsed.data.validate() {
            warn!(error = %e, "Extraction response failed schema validation");
            return Err(Error::Extraction(format!("schema violation: {}", e)));
        }

        debug!(
            prompt_len = rendered.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Structured extraction completed"
        );
        Ok(parsed.data)
    }

    async fn health_check(&self) -> Result<bool> {
        match self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "http_extractor"
    }
}
