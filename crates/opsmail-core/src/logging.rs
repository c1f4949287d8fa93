//! Structured logging schema and field name constants for opsmail.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), sweep completions |
//! | DEBUG | Decision points, skipped items, config choices |
//! | TRACE | Per-item iteration, high-volume data (match candidates) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "store", "extract", "pipeline", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "knowledge", "creator", "linker", "scheduler", "bridge"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "add_knowledge", "process_email", "link_unlinked", "backfill"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Organization UUID being processed.
pub const ORG_ID: &str = "org_id";

/// Linking rule UUID.
pub const RULE_ID: &str = "rule_id";

/// Email message UUID.
pub const EMAIL_ID: &str = "email_id";

/// Operation (shipment) UUID.
pub const OPERATION_ID: &str = "operation_id";

/// Knowledge entry UUID.
pub const ENTRY_ID: &str = "entry_id";

/// Backfill task UUID.
pub const TASK_ID: &str = "task_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of emails linked by a sweep.
pub const LINKED_COUNT: &str = "linked_count";

/// Number of items that failed inside a batch.
pub const FAILED_COUNT: &str = "failed_count";

/// Number of entries removed by a cleanup pass.
pub const EVICTED_COUNT: &str = "evicted_count";

/// Byte length of a prompt sent to the extraction service.
pub const PROMPT_LEN: &str = "prompt_len";
