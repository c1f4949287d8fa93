//! Image OCR adapter — extracts text using `tesseract`.
//!
//! Binary availability is probed once and reused across extractions, so a
//! missing OCR install costs one failed probe instead of one per image.

use std::io::Write;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::sync::OnceCell;

use opsmail_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use opsmail_core::{AttachmentTextAdapter, Error, Result};

use super::run_cmd_with_timeout;

const SUPPORTED_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/tiff", "image/bmp"];

/// Adapter for OCR over image attachments.
#[derive(Default)]
pub struct ImageOcrAdapter {
    available: OnceCell<bool>,
}

impl ImageOcrAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn probe(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                match Command::new("tesseract").arg("--version").output().await {
                    Ok(output) => output.status.success(),
                    Err(_) => false,
                }
            })
            .await
    }
}

#[async_trait]
impl AttachmentTextAdapter for ImageOcrAdapter {
    fn supports(&self, content_type: &str) -> bool {
        SUPPORTED_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type))
    }

    async fn extract(&self, data: &[u8], filename: &str) -> Result<String> {
        if data.is_empty() {
            return Err(Error::InvalidInput(format!(
                "cannot run OCR on empty image '{}'",
                filename
            )));
        }

        if !self.probe().await {
            return Err(Error::Internal("tesseract is not installed".to_string()));
        }

        let mut tmpfile = NamedTempFile::new()
            .map_err(|e| Error::Internal(format!("failed to create temp file: {}", e)))?;
        tmpfile
            .write_all(data)
            .map_err(|e| Error::Internal(format!("failed to write temp file: {}", e)))?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        // "stdout" as the output base makes tesseract print to stdout.
        run_cmd_with_timeout(
            Command::new("tesseract").arg(&tmp_path).arg("stdout"),
            EXTRACTION_CMD_TIMEOUT_SECS,
        )
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.probe().await)
    }

    fn name(&self) -> &str {
        "image_ocr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_images_only() {
        let adapter = ImageOcrAdapter::new();
        assert!(adapter.supports("image/png"));
        assert!(adapter.supports("IMAGE/JPEG"));
        assert!(!adapter.supports("application/pdf"));
        assert!(!adapter.supports("text/plain"));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let adapter = ImageOcrAdapter::new();
        assert!(adapter.extract(b"", "blank.png").await.is_err());
    }

    #[tokio::test]
    async fn test_probe_is_cached() {
        let adapter = ImageOcrAdapter::new();
        let first = adapter.health_check().await.unwrap();
        let second = adapter.health_check().await.unwrap();
        assert_eq!(first, second);
    }
}
