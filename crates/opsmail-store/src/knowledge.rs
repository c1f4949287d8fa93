//! In-memory knowledge entry repository.
//!
//! Scoped reads and writes only; deduplication, reinforcement, and eviction
//! policy live in the pipeline's `KnowledgeService`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use opsmail_core::{
    Error, EvictionCriteria, KnowledgeCategory, KnowledgeEntry, KnowledgeQuery,
    KnowledgeRepository, Result,
};

/// In-memory [`KnowledgeRepository`] implementation.
#[derive(Clone, Default)]
pub struct MemKnowledgeRepository {
    entries: Arc<RwLock<HashMap<Uuid, KnowledgeEntry>>>,
}

impl MemKnowledgeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relevance desc, usage desc, recency desc.
    fn sort_ranked(entries: &mut [KnowledgeEntry]) {
        entries.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then(b.usage_count.cmp(&a.usage_count))
                .then(b.last_used.cmp(&a.last_used))
        });
    }
}

#[async_trait]
impl KnowledgeRepository for MemKnowledgeRepository {
    async fn insert(&self, entry: KnowledgeEntry) -> Result<Uuid> {
        let id = entry.id;
        self.entries.write().await.insert(id, entry);
        Ok(id)
    }

    async fn update(&self, entry: KnowledgeEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        match entries.get(&entry.id) {
            Some(existing) if existing.org_id == entry.org_id => {
                entries.insert(entry.id, entry);
                Ok(())
            }
            _ => Err(Error::NotFound(format!("knowledge entry {}", entry.id))),
        }
    }

    async fn find_by_hash(&self, org_id: Uuid, hash: &str) -> Result<Option<KnowledgeEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .find(|e| e.org_id == org_id && e.content_hash == hash)
            .cloned())
    }

    async fn top_by_relevance(
        &self,
        org_id: Uuid,
        category: KnowledgeCategory,
        limit: i64,
    ) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.entries.read().await;
        let mut out: Vec<_> = entries
            .values()
            .filter(|e| e.org_id == org_id && e.category == category)
            .cloned()
            .collect();
        Self::sort_ranked(&mut out);
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn query(&self, org_id: Uuid, query: &KnowledgeQuery) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.entries.read().await;
        let needles: Vec<String> = query.keywords.iter().map(|k| k.to_lowercase()).collect();
        let mut out: Vec<_> = entries
            .values()
            .filter(|e| e.org_id == org_id)
            .filter(|e| query.category.map_or(true, |c| e.category == c))
            .filter(|e| {
                if needles.is_empty() {
                    return true;
                }
                // "Any keyword overlaps" filter.
                e.keywords
                    .iter()
                    .any(|k| needles.contains(&k.to_lowercase()))
            })
            .cloned()
            .collect();
        Self::sort_ranked(&mut out);
        out.truncate(query.limit.max(0) as usize);
        Ok(out)
    }

    async fn record_usage(&self, org_id: Uuid, ids: &[Uuid]) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        for id in ids {
            if let Some(entry) = entries.get_mut(id) {
                if entry.org_id == org_id {
                    entry.usage_count += 1;
                    entry.last_used = now;
                }
            }
        }
        Ok(())
    }

    async fn list_evictable(
        &self,
        org_id: Uuid,
        criteria: &EvictionCriteria,
    ) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.entries.read().await;
        let mut out: Vec<_> = entries
            .values()
            .filter(|e| e.org_id == org_id)
            .filter(|e| {
                e.relevance_score < criteria.relevance_floor
                    || (e.usage_count < criteria.min_usage
                        && e.created_at < criteria.created_before)
            })
            .cloned()
            .collect();
        // Lowest value first so truncation keeps the worst offenders.
        out.sort_by(|a, b| {
            a.relevance_score
                .total_cmp(&b.relevance_score)
                .then(a.usage_count.cmp(&b.usage_count))
                .then(a.last_used.cmp(&b.last_used))
        });
        out.truncate(criteria.limit.max(0) as usize);
        Ok(out)
    }

    async fn delete_many(&self, org_id: Uuid, ids: &[Uuid]) -> Result<i64> {
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for id in ids {
            if entries.get(id).is_some_and(|e| e.org_id == org_id) {
                entries.remove(id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count(&self, org_id: Uuid) -> Result<i64> {
        let entries = self.entries.read().await;
        Ok(entries.values().filter(|e| e.org_id == org_id).count() as i64)
    }

    async fn count_by_category(&self, org_id: Uuid) -> Result<Vec<(KnowledgeCategory, i64)>> {
        let entries = self.entries.read().await;
        let mut counts = Vec::new();
        for category in KnowledgeCategory::all() {
            let n = entries
                .values()
                .filter(|e| e.org_id == org_id && e.category == category)
                .count() as i64;
            if n > 0 {
                counts.push((category, n));
            }
        }
        Ok(counts)
    }
}
