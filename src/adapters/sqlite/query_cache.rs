//! SQLite implementation of the similarity-aware query cache.
//!
//! Two records per cached query: the full document under the query hash,
//! and a sibling meta record carrying the original query text and its
//! token set for neighbor matching. Both share one TTL.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::BTreeSet;

use crate::adapters::sqlite::util::{expires_ts, now_ts};
use crate::domain::errors::CoreResult;
use crate::domain::models::config::CacheConfig;
use crate::domain::models::document::ReportDocument;
use crate::domain::ports::{CacheHit, CacheHitKind, QueryCache};
use crate::domain::similarity::{jaccard_similarity, tokenize};

/// Stable digest of the query's byte form.
fn query_hash(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, sqlx::FromRow)]
struct MetaRow {
    query: String,
    tokens: String,
    result_hash: String,
    created_at: String,
}

#[derive(Clone)]
pub struct SqliteQueryCache {
    pool: SqlitePool,
    config: CacheConfig,
}

impl SqliteQueryCache {
    pub fn new(pool: SqlitePool, config: CacheConfig) -> Self {
        Self { pool, config }
    }

    async fn document_by_hash(&self, hash: &str) -> CoreResult<Option<ReportDocument>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT document FROM cache_documents WHERE hash = ? AND expires_at > ?",
        )
        .bind(hash)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Scan stored meta records for the best token-Jaccard neighbor.
    async fn similar_lookup(
        &self,
        tokens: &BTreeSet<String>,
    ) -> CoreResult<Option<CacheHit>> {
        let rows: Vec<MetaRow> = sqlx::query_as(
            "SELECT query, tokens, result_hash, created_at FROM cache_meta
             WHERE expires_at > ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(now_ts())
        .bind(i64::from(self.config.max_scan))
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<(f64, MetaRow)> = Vec::new();
        for row in rows {
            let Ok(stored) = serde_json::from_str::<Vec<String>>(&row.tokens) else {
                continue;
            };
            let stored: BTreeSet<String> = stored.into_iter().collect();
            let similarity = jaccard_similarity(tokens, &stored);
            if similarity >= self.config.similarity_threshold {
                candidates.push((similarity, row));
            }
        }

        // Best similarity wins; ties break toward the more recent entry.
        candidates.sort_by(|(sa, ra), (sb, rb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| rb.created_at.cmp(&ra.created_at))
        });

        for (similarity, row) in candidates {
            // A meta entry whose result document is gone is skipped.
            if let Some(document) = self.document_by_hash(&row.result_hash).await? {
                tracing::info!(
                    similarity,
                    original_query = %row.query,
                    "query cache similarity hit"
                );
                return Ok(Some(CacheHit {
                    document,
                    kind: CacheHitKind::Similar {
                        similarity,
                        original_query: row.query,
                    },
                }));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl QueryCache for SqliteQueryCache {
    async fn lookup(&self, query: &str) -> CoreResult<Option<CacheHit>> {
        // Exact match strictly precedes the similarity scan.
        let hash = query_hash(query);
        if let Some(document) = self.document_by_hash(&hash).await? {
            tracing::info!("query cache exact hit");
            return Ok(Some(CacheHit { document, kind: CacheHitKind::Exact }));
        }

        let tokens = tokenize(query);
        if tokens.is_empty() {
            // No usable tokens: exact-only semantics.
            return Ok(None);
        }

        self.similar_lookup(&tokens).await
    }

    async fn store(&self, query: &str, document: &ReportDocument) -> CoreResult<()> {
        let hash = query_hash(query);
        let tokens: Vec<String> = tokenize(query).into_iter().collect();
        let expires = expires_ts(self.config.result_ttl_secs);
        let now = now_ts();

        sqlx::query(
            "INSERT INTO cache_documents (hash, document, created_at, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(hash) DO UPDATE SET
                document = excluded.document,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
        )
        .bind(&hash)
        .bind(serde_json::to_string(document)?)
        .bind(&now)
        .bind(&expires)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO cache_meta (hash, query, tokens, result_hash, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(hash) DO UPDATE SET
                query = excluded.query,
                tokens = excluded.tokens,
                result_hash = excluded.result_hash,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
        )
        .bind(&hash)
        .bind(query)
        .bind(serde_json::to_string(&tokens)?)
        .bind(&hash)
        .bind(&now)
        .bind(&expires)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn sweep_expired(&self) -> CoreResult<u64> {
        let now = now_ts();
        let mut removed = 0;
        for table in ["cache_documents", "cache_meta"] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE expires_at <= ?"))
                .bind(&now)
                .execute(&self.pool)
                .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;
    use crate::domain::models::document::{DocumentMetadata, DocumentSummary};
    use chrono::Utc;

    async fn cache() -> SqliteQueryCache {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        SqliteQueryCache::new(pool, CacheConfig::default())
    }

    fn document(title: &str) -> ReportDocument {
        ReportDocument {
            metadata: DocumentMetadata {
                query: title.to_string(),
                title: title.to_string(),
                generated_at: Utc::now(),
                phased: true,
                has_forum_log: false,
            },
            summary: DocumentSummary::default(),
            sections: vec![],
            forum_log: None,
            sources: vec![],
        }
    }

    #[tokio::test]
    async fn test_exact_hit() {
        let cache = cache().await;
        cache.store("Analyze EV market 2025", &document("d1")).await.unwrap();

        let hit = cache.lookup("Analyze EV market 2025").await.unwrap().unwrap();
        assert_eq!(hit.kind, CacheHitKind::Exact);
        assert_eq!(hit.document.metadata.title, "d1");
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let cache = cache().await;
        assert!(cache.lookup("never stored").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_similarity_hit_reordered_cjk_query() {
        let cache = cache().await;
        cache.store("电动汽车 2025 市场分析", &document("d1")).await.unwrap();

        let hit = cache.lookup("2025 电动汽车市场 分析").await.unwrap().unwrap();
        match hit.kind {
            CacheHitKind::Similar { similarity, original_query } => {
                assert!(similarity >= 0.80);
                assert_eq!(original_query, "电动汽车 2025 市场分析");
            }
            CacheHitKind::Exact => panic!("expected a similarity hit"),
        }
    }

    #[tokio::test]
    async fn test_below_threshold_is_a_miss() {
        let cache = cache().await;
        cache.store("global semiconductor supply chain", &document("d1")).await.unwrap();

        assert!(cache
            .lookup("consumer coffee pricing trends")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_exact_precedes_similarity() {
        let cache = cache().await;
        cache.store("ev market outlook 2025", &document("similar")).await.unwrap();
        cache.store("ev market outlook 2025 overview", &document("exact")).await.unwrap();

        let hit = cache
            .lookup("ev market outlook 2025 overview")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.kind, CacheHitKind::Exact);
        assert_eq!(hit.document.metadata.title, "exact");
    }

    #[tokio::test]
    async fn test_empty_token_query_is_exact_only() {
        let cache = cache().await;
        cache.store("!!!", &document("d1")).await.unwrap();

        // Exact still works.
        assert!(cache.lookup("!!!").await.unwrap().is_some());
        // A different punctuation-only query has no tokens to compare.
        assert!(cache.lookup("???").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_meta_with_missing_document_is_skipped() {
        let cache = cache().await;
        cache.store("ev market outlook 2025", &document("d1")).await.unwrap();

        // Drop the document but keep the meta record.
        sqlx::query("DELETE FROM cache_documents")
            .execute(&cache.pool)
            .await
            .unwrap();

        assert!(cache
            .lookup("ev market outlook for 2025")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_store_overwrites_same_query() {
        let cache = cache().await;
        cache.store("q", &document("old")).await.unwrap();
        cache.store("q", &document("new")).await.unwrap();

        let hit = cache.lookup("q").await.unwrap().unwrap();
        assert_eq!(hit.document.metadata.title, "new");
    }
}
