//! PDF text-layer adapter — extracts text using `pdftotext` (poppler-utils).

use std::io::Write;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;

use opsmail_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use opsmail_core::{AttachmentTextAdapter, Error, Result};

use super::run_cmd_with_timeout;

/// Adapter for extracting the text layer of PDF attachments.
pub struct PdfTextAdapter;

#[async_trait]
impl AttachmentTextAdapter for PdfTextAdapter {
    fn supports(&self, content_type: &str) -> bool {
        content_type.eq_ignore_ascii_case("application/pdf")
    }

    async fn extract(&self, data: &[u8], filename: &str) -> Result<String> {
        if data.is_empty() {
            return Err(Error::InvalidInput(
                "cannot extract text from empty PDF data".to_string(),
            ));
        }

        // Validate PDF magic bytes (%PDF)
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::InvalidInput(format!(
                "file '{}' is not a valid PDF (missing %PDF header)",
                filename
            )));
        }

        // pdftotext reads from a file path
        let mut tmpfile = NamedTempFile::new()
            .map_err(|e| Error::Internal(format!("failed to create temp file: {}", e)))?;
        tmpfile
            .write_all(data)
            .map_err(|e| Error::Internal(format!("failed to write temp file: {}", e)))?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        run_cmd_with_timeout(
            Command::new("pdftotext").arg(&tmp_path).arg("-"),
            EXTRACTION_CMD_TIMEOUT_SECS,
        )
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new("pdftotext").arg("-v").output().await {
            Ok(output) => {
                // pdftotext -v prints version to stderr and exits with 0 or 99
                // depending on the version. Both indicate the binary exists.
                Ok(output.status.success() || output.status.code() == Some(99))
            }
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "pdf_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_pdf_only() {
        let adapter = PdfTextAdapter;
        assert!(adapter.supports("application/pdf"));
        assert!(adapter.supports("Application/PDF"));
        assert!(!adapter.supports("image/png"));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let adapter = PdfTextAdapter;
        let result = adapter.extract(b"", "empty.pdf").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_magic_rejected() {
        let adapter = PdfTextAdapter;
        let result = adapter.extract(b"not a pdf at all", "bad.pdf").await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("not a valid PDF"), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_health_check_does_not_error() {
        let adapter = PdfTextAdapter;
        // Passes whether or not pdftotext is installed.
        assert!(adapter.health_check().await.is_ok());
    }
}
