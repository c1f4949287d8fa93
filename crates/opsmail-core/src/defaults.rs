//! Centralized default constants for the opsmail system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates should reference these constants instead of defining
//! their own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// KNOWLEDGE STORE
// =============================================================================

/// Soft per-organization capacity for knowledge entries.
pub const KNOWLEDGE_CAPACITY: i64 = 100;

/// Minimum content length (characters) for a knowledge entry to be stored.
/// Shorter content is rejected as too low-signal to be worth a slot.
pub const KNOWLEDGE_MIN_CONTENT_LEN: usize = 20;

/// Jaccard similarity threshold at which two entries in the same category
/// are merged rather than stored separately.
pub const KNOWLEDGE_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Number of highest-relevance same-category entries compared against a
/// new entry during fuzzy deduplication.
pub const KNOWLEDGE_DEDUP_CANDIDATES: i64 = 20;

/// Base relevance score assigned to a newly inserted entry.
pub const RELEVANCE_BASE: f32 = 1.0;

/// Relevance bump applied on an exact content-hash hit.
pub const RELEVANCE_EXACT_BUMP: f32 = 0.2;

/// Relevance bump applied on a fuzzy merge.
pub const RELEVANCE_MERGE_BUMP: f32 = 0.3;

/// Upper bound for relevance scores.
pub const RELEVANCE_CAP: f32 = 5.0;

/// Entries below this relevance are candidates for eviction.
pub const RELEVANCE_EVICTION_FLOOR: f32 = 0.5;

/// Entries with fewer usages than this AND older than
/// [`CLEANUP_STALE_DAYS`] are candidates for eviction.
pub const CLEANUP_MIN_USAGE: i64 = 3;

/// Age in days past which a low-usage entry becomes evictable.
pub const CLEANUP_STALE_DAYS: i64 = 30;

/// Maximum entries removed by a single cleanup pass.
pub const CLEANUP_BATCH_SIZE: i64 = 50;

/// Maximum knowledge entries embedded as context in an extraction prompt.
pub const KNOWLEDGE_CONTEXT_ENTRIES: usize = 5;

/// Default limit for relevant-knowledge queries.
pub const KNOWLEDGE_QUERY_LIMIT: i64 = 10;

// =============================================================================
// OPERATION CREATION
// =============================================================================

/// Characters of email body included in an extraction prompt.
pub const PROMPT_BODY_TRUNCATE: usize = 2000;

// =============================================================================
// AUTO-LINKING
// =============================================================================

/// Maximum unlinked emails examined per auto-link run.
///
/// There is deliberately no pagination cursor; large backlogs drain across
/// successive scheduled runs. Known scaling gap, not a semantic.
pub const LINK_BATCH_SIZE: i64 = 50;

/// Maximum emails processed per historical backfill batch. Candidates are
/// processed in ascending date order; the watermark assumes monotonic
/// progress.
pub const BACKFILL_BATCH_SIZE: i64 = 200;

// =============================================================================
// SCHEDULER
// =============================================================================

/// Interval between auto-link sweeps (seconds).
pub const AUTO_LINK_INTERVAL_SECS: u64 = 300;

/// Interval between operation-creation sweeps (seconds).
pub const CREATION_SWEEP_INTERVAL_SECS: u64 = 600;

/// Interval between knowledge cleanup sweeps (seconds).
pub const KNOWLEDGE_CLEANUP_INTERVAL_SECS: u64 = 3600;

// =============================================================================
// STRUCTURED EXTRACTION SERVICE
// =============================================================================

/// Environment variable for the extraction service URL.
pub const ENV_EXTRACTOR_URL: &str = "OPSMAIL_EXTRACTOR_URL";

/// Default extraction service base URL. The backend POSTs to
/// `{base}/extract` and probes `{base}/health`.
pub const EXTRACTOR_URL: &str = "http://127.0.0.1:8089";

/// Environment variable for the extraction request timeout.
pub const ENV_EXTRACTOR_TIMEOUT_SECS: &str = "OPSMAIL_EXTRACTOR_TIMEOUT_SECS";

/// Timeout for extraction requests in seconds.
pub const EXTRACTOR_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// TEXT EXTRACTION BRIDGE
// =============================================================================

/// Per-command timeout for external extraction tools (seconds).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_bounds_are_consistent() {
        const {
            assert!(KNOWLEDGE_DEDUP_CANDIDATES <= KNOWLEDGE_CAPACITY);
            assert!(CLEANUP_BATCH_SIZE <= KNOWLEDGE_CAPACITY);
            assert!(KNOWLEDGE_MIN_CONTENT_LEN > 0);
        }
    }

    #[test]
    fn relevance_scale_is_ordered() {
        // Runtime check needed for floating point comparisons
        assert!(RELEVANCE_EVICTION_FLOOR < RELEVANCE_BASE);
        assert!(RELEVANCE_BASE < RELEVANCE_CAP);
        assert!(RELEVANCE_EXACT_BUMP < RELEVANCE_MERGE_BUMP);
        assert!(RELEVANCE_MERGE_BUMP < RELEVANCE_CAP);
    }

    #[test]
    fn similarity_threshold_in_unit_interval() {
        assert!(KNOWLEDGE_SIMILARITY_THRESHOLD > 0.0);
        assert!(KNOWLEDGE_SIMILARITY_THRESHOLD <= 1.0);
    }

    #[test]
    fn batch_sizes_positive() {
        const {
            assert!(LINK_BATCH_SIZE > 0);
            assert!(BACKFILL_BATCH_SIZE > 0);
        }
    }

    #[test]
    fn scheduler_intervals_ordered() {
        const {
            assert!(AUTO_LINK_INTERVAL_SECS < CREATION_SWEEP_INTERVAL_SECS);
            assert!(CREATION_SWEEP_INTERVAL_SECS < KNOWLEDGE_CLEANUP_INTERVAL_SECS);
        }
    }
}
