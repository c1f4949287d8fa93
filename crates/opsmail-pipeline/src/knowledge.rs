//! Knowledge store service.
//!
//! A bounded, self-pruning store of organizational facts extracted from
//! processed email. Writes deduplicate aggressively (exact hash, then fuzzy
//! word overlap); reads reinforce what they return; a cleanup pass evicts
//! low-value entries to hold the per-organization capacity.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use opsmail_core::{
    defaults, EvictionCriteria, KnowledgeCategory, KnowledgeEntry, KnowledgeQuery,
    KnowledgeRepository, KnowledgeStatistics, Result,
};

/// Tunables for the knowledge store. Defaults come from
/// [`opsmail_core::defaults`]; capacity and the similarity threshold can be
/// overridden through the environment.
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    /// Soft per-organization entry capacity.
    pub capacity: i64,
    /// Minimum content length for a fact to be worth a slot.
    pub min_content_len: usize,
    /// Jaccard similarity at which two same-category entries merge.
    pub similarity_threshold: f32,
    /// Same-category candidates compared during fuzzy deduplication.
    pub dedup_candidates: i64,
    /// Relevance assigned on insert.
    pub relevance_base: f32,
    /// Relevance bump on an exact hash hit.
    pub exact_bump: f32,
    /// Relevance bump on a fuzzy merge.
    pub merge_bump: f32,
    /// Relevance ceiling.
    pub relevance_cap: f32,
    /// Entries below this relevance are evictable.
    pub eviction_floor: f32,
    /// Usage below this, combined with staleness, makes an entry evictable.
    pub cleanup_min_usage: i64,
    /// Days after which a low-usage entry counts as stale.
    pub cleanup_stale_days: i64,
    /// Maximum entries removed per cleanup pass.
    pub cleanup_batch_size: i64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::KNOWLEDGE_CAPACITY,
            min_content_len: defaults::KNOWLEDGE_MIN_CONTENT_LEN,
            similarity_threshold: defaults::KNOWLEDGE_SIMILARITY_THRESHOLD,
            dedup_candidates: defaults::KNOWLEDGE_DEDUP_CANDIDATES,
            relevance_base: defaults::RELEVANCE_BASE,
            exact_bump: defaults::RELEVANCE_EXACT_BUMP,
            merge_bump: defaults::RELEVANCE_MERGE_BUMP,
            relevance_cap: defaults::RELEVANCE_CAP,
            eviction_floor: defaults::RELEVANCE_EVICTION_FLOOR,
            cleanup_min_usage: defaults::CLEANUP_MIN_USAGE,
            cleanup_stale_days: defaults::CLEANUP_STALE_DAYS,
            cleanup_batch_size: defaults::CLEANUP_BATCH_SIZE,
        }
    }
}

impl KnowledgeConfig {
    /// Create from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OPSMAIL_KNOWLEDGE_CAPACITY` | `100` | Per-org entry capacity |
    /// | `OPSMAIL_KNOWLEDGE_SIMILARITY` | `0.7` | Merge threshold |
    /// | `OPSMAIL_KNOWLEDGE_CLEANUP_BATCH` | `50` | Max evictions per pass |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse::<i64>("OPSMAIL_KNOWLEDGE_CAPACITY") {
            config.capacity = v;
        }
        if let Some(v) = env_parse::<f32>("OPSMAIL_KNOWLEDGE_SIMILARITY") {
            config.similarity_threshold = v;
        }
        if let Some(v) = env_parse::<i64>("OPSMAIL_KNOWLEDGE_CLEANUP_BATCH") {
            config.cleanup_batch_size = v;
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// A fact to be stored.
#[derive(Debug, Clone)]
pub struct NewKnowledge {
    pub category: KnowledgeCategory,
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
    /// What produced the entry ("email_processing", "operation_creation").
    pub source: String,
    pub source_id: Option<Uuid>,
    pub metadata: Option<JsonValue>,
}

/// What a write did with the submitted fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Content too short to be worth a slot. Not an error.
    Rejected,
    /// Exact duplicate; the existing entry was reinforced.
    Reinforced(Uuid),
    /// Near-duplicate; merged into the existing entry.
    Merged(Uuid),
    /// Stored as a new entry.
    Inserted(Uuid),
}

/// Service owning deduplication, reinforcement, and eviction policy over a
/// [`KnowledgeRepository`].
pub struct KnowledgeService {
    repo: Arc<dyn KnowledgeRepository>,
    config: KnowledgeConfig,
}

impl KnowledgeService {
    pub fn new(repo: Arc<dyn KnowledgeRepository>) -> Self {
        Self::with_config(repo, KnowledgeConfig::default())
    }

    pub fn with_config(repo: Arc<dyn KnowledgeRepository>, config: KnowledgeConfig) -> Self {
        Self { repo, config }
    }

    /// Store a fact, deduplicating against existing entries.
    ///
    /// Too-short content is rejected quietly; an exact hash hit reinforces
    /// the stored entry; content sharing at least the configured word
    /// overlap with a same-category entry merges into it; anything else is
    /// inserted, evicting low-value entries first when the store is full.
    pub async fn add_knowledge(&self, org_id: Uuid, new: NewKnowledge) -> Result<AddOutcome> {
        let normalized = normalize_content(&new.content);
        if normalized.chars().count() < self.config.min_content_len {
            debug!(
                org_id = %org_id,
                category = %new.category,
                len = normalized.chars().count(),
                "Knowledge content below minimum length, not stored"
            );
            return Ok(AddOutcome::Rejected);
        }

        let hash = content_hash(new.category, &normalized);

        // Exact duplicate: reinforce in place.
        if let Some(mut existing) = self.repo.find_by_hash(org_id, &hash).await? {
            existing.usage_count += 1;
            existing.relevance_score =
                cap(existing.relevance_score + self.config.exact_bump, self.config.relevance_cap);
            existing.last_used = Utc::now();
            let id = existing.id;
            self.repo.update(existing).await?;
            debug!(org_id = %org_id, entry_id = %id, "Knowledge reinforced on exact hash hit");
            return Ok(AddOutcome::Reinforced(id));
        }

        // Fuzzy duplicate: merge into the closest high-relevance entry.
        let candidates = self
            .repo
            .top_by_relevance(org_id, new.category, self.config.dedup_candidates)
            .await?;
        for mut candidate in candidates {
            let similarity = jaccard(&normalized, &normalize_content(&candidate.content));
            if similarity < self.config.similarity_threshold {
                continue;
            }
            // Keep the longer content; it subsumes the shorter.
            if new.content.len() > candidate.content.len() {
                candidate.content = new.content.clone();
            }
            for keyword in &new.keywords {
                if !candidate.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
                    candidate.keywords.push(keyword.clone());
                }
            }
            candidate.content_hash =
                content_hash(candidate.category, &normalize_content(&candidate.content));
            candidate.relevance_score =
                cap(candidate.relevance_score + self.config.merge_bump, self.config.relevance_cap);
            candidate.usage_count += 1;
            candidate.last_used = Utc::now();
            let id = candidate.id;
            self.repo.update(candidate).await?;
            debug!(
                org_id = %org_id,
                entry_id = %id,
                similarity,
                "Knowledge merged into near-duplicate"
            );
            return Ok(AddOutcome::Merged(id));
        }

        // Full store: make room before inserting.
        if self.repo.count(org_id).await? >= self.config.capacity {
            let evicted = self.cleanup_low_value_entries(org_id).await?;
            if evicted == 0 {
                warn!(
                    org_id = %org_id,
                    "Knowledge store at capacity with nothing evictable"
                );
            }
        }

        let entry = KnowledgeEntry {
            id: Uuid::new_v4(),
            org_id,
            category: new.category,
            title: new.title,
            content: new.content,
            keywords: new.keywords,
            content_hash: hash,
            relevance_score: self.config.relevance_base,
            // The initial store counts as the first use.
            usage_count: 1,
            last_used: Utc::now(),
            source: new.source,
            source_id: new.source_id,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        let id = self.repo.insert(entry).await?;
        Ok(AddOutcome::Inserted(id))
    }

    /// Fetch relevant knowledge. Every returned entry is reinforced: reads
    /// count as usage.
    pub async fn get_relevant_knowledge(
        &self,
        org_id: Uuid,
        query: &KnowledgeQuery,
    ) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.repo.query(org_id, query).await?;
        if !entries.is_empty() {
            let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
            self.repo.record_usage(org_id, &ids).await?;
        }
        Ok(entries)
    }

    /// Evict low-value entries: relevance below the floor, or low-usage and
    /// stale. Returns the number removed.
    pub async fn cleanup_low_value_entries(&self, org_id: Uuid) -> Result<i64> {
        let criteria = EvictionCriteria {
            relevance_floor: self.config.eviction_floor,
            min_usage: self.config.cleanup_min_usage,
            created_before: Utc::now() - Duration::days(self.config.cleanup_stale_days),
            limit: self.config.cleanup_batch_size,
        };
        let evictable = self.repo.list_evictable(org_id, &criteria).await?;
        if evictable.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = evictable.iter().map(|e| e.id).collect();
        let removed = self.repo.delete_many(org_id, &ids).await?;
        info!(org_id = %org_id, evicted_count = removed, "Knowledge cleanup pass completed");
        Ok(removed)
    }

    /// Aggregate statistics: totals, per-category counts, top entries.
    pub async fn get_statistics(&self, org_id: Uuid) -> Result<KnowledgeStatistics> {
        let total = self.repo.count(org_id).await?;
        let by_category = self.repo.count_by_category(org_id).await?;
        let top_entries = self
            .repo
            .query(
                org_id,
                &KnowledgeQuery {
                    category: None,
                    keywords: vec![],
                    limit: 10,
                },
            )
            .await?;
        Ok(KnowledgeStatistics {
            total,
            capacity: self.config.capacity,
            by_category,
            top_entries,
        })
    }

    pub fn config(&self) -> &KnowledgeConfig {
        &self.config
    }
}

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize_content(content: &str) -> String {
    content
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// sha256 over `"{category}:{normalized content}"`, hex-encoded.
pub fn content_hash(category: KnowledgeCategory, normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Jaccard similarity over whitespace-delimited word sets.
pub fn jaccard(a: &str, b: &str) -> f32 {
    let set_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f32 / union as f32
}

fn cap(value: f32, ceiling: f32) -> f32 {
    if value > ceiling {
        ceiling
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            normalize_content("  Maersk   handles\tEU\nlanes "),
            "maersk handles eu lanes"
        );
    }

    #[test]
    fn test_content_hash_is_category_scoped() {
        let normalized = "maersk handles eu lanes";
        let a = content_hash(KnowledgeCategory::Carriers, normalized);
        let b = content_hash(KnowledgeCategory::Routes, normalized);
        assert_ne!(a, b);
        assert_eq!(a, content_hash(KnowledgeCategory::Carriers, normalized));
    }

    #[test]
    fn test_jaccard_bounds() {
        assert_eq!(jaccard("a b c", "a b c"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        let mid = jaccard("a b c d", "a b c e");
        assert!(mid > 0.5 && mid < 0.7, "got {}", mid);
    }

    #[test]
    fn test_config_defaults_match_constants() {
        let config = KnowledgeConfig::default();
        assert_eq!(config.capacity, defaults::KNOWLEDGE_CAPACITY);
        assert_eq!(config.similarity_threshold, defaults::KNOWLEDGE_SIMILARITY_THRESHOLD);
        assert_eq!(config.relevance_cap, defaults::RELEVANCE_CAP);
    }

    #[test]
    fn test_cap() {
        assert_eq!(cap(5.2, 5.0), 5.0);
        assert_eq!(cap(4.9, 5.0), 4.9);
    }
}
