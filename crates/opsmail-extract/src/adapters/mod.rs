//! Attachment text adapters, one per attachment family.

mod image_ocr;
mod pdf_text;

pub use image_ocr::ImageOcrAdapter;
pub use pdf_text::PdfTextAdapter;

use tokio::process::Command;

use opsmail_core::{Error, Result};

/// Run a command with a timeout, returning stdout as a string.
pub(crate) async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    let output = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| Error::Internal(format!("external command timed out after {}s", timeout_secs)))?
        .map_err(|e| Error::Internal(format!("failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Internal(format!(
            "command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
