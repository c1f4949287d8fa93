//! Extraction backends for opsmail.
//!
//! Two concerns live here:
//!
//! - **Structured extraction**: turning an email into an
//!   [`ExtractedOperationData`](opsmail_core::ExtractedOperationData) payload.
//!   The [`HttpExtractorBackend`] talks to an external service; the
//!   [`HeuristicExtractor`] derives what it can from the sender address alone
//!   and backs the service up when it is down; the [`MockExtractor`] serves
//!   tests.
//! - **Attachment text**: the [`TextExtractionBridge`] pulls searchable text
//!   out of PDF and image attachments via external tools.

pub mod adapters;
pub mod bridge;
pub mod client;
pub mod heuristic;
pub mod mock;

pub use adapters::{ImageOcrAdapter, PdfTextAdapter};
pub use bridge::TextExtractionBridge;
pub use client::HttpExtractorBackend;
pub use heuristic::HeuristicExtractor;
pub use mock::MockExtractor;
