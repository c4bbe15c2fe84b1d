//! Similarity-aware query result cache port.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::errors::CoreResult;
use crate::domain::models::document::ReportDocument;

/// How a cache lookup matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CacheHitKind {
    /// The query hashed to an existing entry byte-for-byte.
    Exact,
    /// A token-Jaccard neighbor at or above the similarity threshold.
    Similar {
        similarity: f64,
        original_query: String,
    },
}

/// A successful cache lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub document: ReportDocument,
    pub kind: CacheHitKind,
}

/// Two-tier result cache: exact hash match first, then a bounded
/// similarity scan over stored token sets.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Look a query up. A miss is normal control flow, not an error.
    async fn lookup(&self, query: &str) -> CoreResult<Option<CacheHit>>;

    /// Store a rendered document under the query's fingerprint, together
    /// with the sibling meta record used for similarity matching.
    async fn store(&self, query: &str, document: &ReportDocument) -> CoreResult<()>;

    /// Physically delete expired rows. Returns the number removed.
    async fn sweep_expired(&self) -> CoreResult<u64>;
}
