//! Retrieval seam over the knowledge store.
//!
//! The [`Retriever`] adds no ranking of its own. It exists so that
//! retrieval parameters (`top_k`, score floor, source filter) are
//! configured and tested independently of the store and the synthesizers.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::models::ScoredChunk;
use crate::store::KnowledgeStore;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Maximum chunks to return.
    pub top_k: usize,
    /// Drop chunks scoring below this normalized similarity.
    pub min_score: Option<f64>,
    /// Only return chunks whose document source equals this value.
    pub source_filter: Option<String>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: None,
            source_filter: None,
        }
    }
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<KnowledgeStore>,
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(store: Arc<KnowledgeStore>, params: RetrievalParams) -> Self {
        Self { store, params }
    }

    /// Return up to `top_k` chunks for `query`, best first.
    ///
    /// A blank query returns an empty result rather than an arbitrary
    /// ranking.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // A source filter may discard top hits, so rank everything first.
        let fetch = if self.params.source_filter.is_some() {
            usize::MAX
        } else {
            self.params.top_k
        };
        let mut results = self.store.query(query, fetch).await?;

        if let Some(source) = &self.params.source_filter {
            results.retain(|r| &r.chunk.source == source);
        }
        if let Some(floor) = self.params.min_score {
            results.retain(|r| r.score >= floor);
        }
        results.truncate(self.params.top_k);

        debug!(returned = results.len(), top_k = self.params.top_k, "retrieved context");
        Ok(results)
    }
}
