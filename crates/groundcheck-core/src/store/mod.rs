//! Generation-swapped knowledge store.
//!
//! The [`KnowledgeStore`] owns exactly one live [`KnowledgeBase`]
//! generation at a time. [`rebuild`](KnowledgeStore::rebuild) embeds a new
//! chunk set into a fresh generation off to the side and then swaps an
//! `Arc`, so no query ever sees a mix of two generations.
//!
//! # Lifecycle
//!
//! ```text
//!  new() ──▶ empty ──rebuild()──▶ serving(g1) ──rebuild()──▶ serving(g2) ...
//!                                   │    ▲
//!                          rebuilding    │ embed ok: swap
//!                                   └────┘ embed error: keep g1
//! ```
//!
//! While a rebuild is embedding, [`query`](KnowledgeStore::query) and any
//! second rebuild fail fast with [`Error::StoreRebuilding`]. A rebuild
//! that fails (or whose future is dropped) leaves the previous generation
//! live.

mod snapshot;

pub use snapshot::KnowledgeBase;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::{Error, Result, Stage};
use crate::models::{Chunk, ScoredChunk};

/// Outcome of a successful [`KnowledgeStore::rebuild`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    pub generation: u64,
    pub chunk_count: usize,
    pub model: String,
    pub dims: usize,
}

/// Point-in-time view of the store, for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    /// Live generation number (0 before the first build).
    pub generation: u64,
    pub chunk_count: usize,
    pub rebuilding: bool,
}

#[derive(Default)]
struct StoreState {
    live: Option<Arc<KnowledgeBase>>,
    rebuilding: Option<u64>,
    last_generation: u64,
}

/// Process-wide knowledge store shared as `Arc<KnowledgeStore>`.
pub struct KnowledgeStore {
    embedder: Arc<dyn Embedder>,
    state: RwLock<StoreState>,
}

/// Clears the rebuilding flag on every exit path of a rebuild.
struct RebuildGuard<'a> {
    store: &'a KnowledgeStore,
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.store.write_state().rebuilding = None;
    }
}

impl KnowledgeStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            state: RwLock::new(StoreState::default()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the knowledge base with a new generation built from `chunks`.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyInput`] if `chunks` is empty; the store is untouched.
    /// - [`Error::StoreRebuilding`] if another rebuild is in progress.
    /// - [`Error::Embedding`] if the embedder fails or returns vectors of
    ///   the wrong count or dimensionality; the previous generation stays live.
    pub async fn rebuild(&self, chunks: Vec<Chunk>) -> Result<BuildResult> {
        if chunks.is_empty() {
            return Err(Error::EmptyInput {
                stage: Stage::Index,
            });
        }

        let generation = {
            let mut state = self.write_state();
            if let Some(generation) = state.rebuilding {
                return Err(Error::StoreRebuilding { generation });
            }
            state.last_generation += 1;
            state.rebuilding = Some(state.last_generation);
            state.last_generation
        };
        let _guard = RebuildGuard { store: self };

        info!(
            generation,
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "rebuilding knowledge base"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let dims = self.embedder.dims();
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            return Err(Error::Embedding(format!(
                "vector {} has {} dims, expected {}",
                bad,
                vectors[bad].len(),
                dims
            )));
        }

        let kb = KnowledgeBase::new(
            generation,
            self.embedder.model_name().to_string(),
            chunks,
            vectors,
        );
        let result = BuildResult {
            generation,
            chunk_count: kb.len(),
            model: kb.model().to_string(),
            dims,
        };

        self.write_state().live = Some(Arc::new(kb));
        info!(generation, chunks = result.chunk_count, "knowledge base swapped in");
        Ok(result)
    }

    /// Return the `k` chunks most similar to `text`, best first.
    ///
    /// An empty (never built) store returns no results. `k` larger than
    /// the store returns every chunk.
    ///
    /// # Errors
    ///
    /// [`Error::StoreRebuilding`] while a rebuild is in progress.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let kb = match self.snapshot()? {
            Some(kb) => kb,
            None => return Ok(Vec::new()),
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))?;

        let results = kb.search(&query_vec, k);
        debug!(
            generation = kb.generation(),
            k,
            returned = results.len(),
            "knowledge store query"
        );
        Ok(results)
    }

    /// The live generation, or `None` before the first build.
    ///
    /// # Errors
    ///
    /// [`Error::StoreRebuilding`] while a rebuild is in progress.
    pub fn snapshot(&self) -> Result<Option<Arc<KnowledgeBase>>> {
        let state = self.read_state();
        if let Some(generation) = state.rebuilding {
            return Err(Error::StoreRebuilding { generation });
        }
        Ok(state.live.clone())
    }

    pub fn status(&self) -> StoreStatus {
        let state = self.read_state();
        StoreStatus {
            generation: state.live.as_ref().map(|kb| kb.generation()).unwrap_or(0),
            chunk_count: state.live.as_ref().map(|kb| kb.len()).unwrap_or(0),
            rebuilding: state.rebuilding.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{split_documents, ChunkParams};
    use crate::embedding::HashEmbedder;
    use crate::models::Document;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn chunks_for(docs: &[(&str, &str)]) -> Vec<Chunk> {
        let docs: Vec<Document> = docs.iter().map(|(s, b)| Document::new(*s, *b)).collect();
        split_documents(
            &docs,
            ChunkParams {
                chunk_size: 1000,
                overlap: 200,
            },
        )
        .unwrap()
    }

    fn rules_chunks() -> Vec<Chunk> {
        chunks_for(&[
            ("discounts.md", "The SAVE15 discount code takes 15% off the cart total."),
            ("shipping.md", "Express shipping costs $10. FREESHIP waives express shipping."),
            ("cart.md", "An empty cart shows a total of zero and rejects coupon codes."),
            ("returns.md", "Items may be returned within thirty days of delivery."),
        ])
    }

    fn hash_store() -> KnowledgeStore {
        KnowledgeStore::new(Arc::new(HashEmbedder::default()))
    }

    /// Embedder that pauses (or fails) the next batch once armed.
    struct GatedEmbedder {
        inner: HashEmbedder,
        armed: AtomicBool,
        fail: bool,
        entered: Notify,
        release: Notify,
    }

    impl GatedEmbedder {
        fn new(fail: bool) -> Self {
            Self {
                inner: HashEmbedder::default(),
                armed: AtomicBool::new(false),
                fail,
                entered: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl Embedder for GatedEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
        fn dims(&self) -> usize {
            self.inner.dims()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.armed.swap(false, Ordering::SeqCst) {
                if self.fail {
                    return Err(Error::Embedding("backend unavailable".to_string()));
                }
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.embed(texts).await
        }
    }

    #[tokio::test]
    async fn test_query_before_build_is_empty() {
        let store = hash_store();
        assert!(store.query("anything", 3).await.unwrap().is_empty());
        assert_eq!(store.status().generation, 0);
    }

    #[tokio::test]
    async fn test_rebuild_reports_counts() {
        let store = hash_store();
        let result = store.rebuild(rules_chunks()).await.unwrap();
        assert_eq!(result.generation, 1);
        assert_eq!(result.chunk_count, 4);
        assert_eq!(result.model, "hash-v1");
        assert_eq!(store.status().chunk_count, 4);
    }

    #[tokio::test]
    async fn test_query_returns_k_ordered() {
        let store = hash_store();
        store.rebuild(rules_chunks()).await.unwrap();
        let results = store.query("SAVE15 discount code", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].chunk.source, "discounts.md");
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_query_k_larger_than_store_returns_all() {
        let store = hash_store();
        store.rebuild(rules_chunks()).await.unwrap();
        assert_eq!(store.query("shipping", 50).await.unwrap().len(), 4);
        assert!(store.query("shipping", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_rebuild_keeps_prior_generation() {
        let store = hash_store();
        store.rebuild(rules_chunks()).await.unwrap();
        let err = store.rebuild(Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::EmptyInput {
                stage: Stage::Index
            }
        ));
        let status = store.status();
        assert_eq!(status.generation, 1);
        assert!(!status.rebuilding);
        assert_eq!(store.query("cart", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_wholesale() {
        let store = hash_store();
        store.rebuild(rules_chunks()).await.unwrap();
        store
            .rebuild(chunks_for(&[("faq.md", "Gift cards never expire.")]))
            .await
            .unwrap();
        let results = store.query("discount", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source, "faq.md");
        assert_eq!(store.status().generation, 2);
    }

    #[tokio::test]
    async fn test_query_during_rebuild_fails_fast() {
        let embedder = Arc::new(GatedEmbedder::new(false));
        let store = Arc::new(KnowledgeStore::new(embedder.clone()));
        store.rebuild(rules_chunks()).await.unwrap();

        embedder.armed.store(true, Ordering::SeqCst);
        let rebuilding = {
            let store = store.clone();
            tokio::spawn(async move { store.rebuild(rules_chunks()).await })
        };
        embedder.entered.notified().await;

        let err = store.query("SAVE15", 3).await.unwrap_err();
        assert!(matches!(err, Error::StoreRebuilding { generation: 2 }));
        assert!(err.is_retryable());
        assert!(store.status().rebuilding);
        assert!(matches!(
            store.rebuild(rules_chunks()).await,
            Err(Error::StoreRebuilding { .. })
        ));

        embedder.release.notify_one();
        let built = rebuilding.await.unwrap().unwrap();
        assert_eq!(built.generation, 2);
        assert!(!store.status().rebuilding);
        assert_eq!(store.query("SAVE15", 3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_rebuild_restores_prior_generation() {
        let embedder = Arc::new(GatedEmbedder::new(true));
        let store = KnowledgeStore::new(embedder.clone());
        store.rebuild(rules_chunks()).await.unwrap();

        embedder.armed.store(true, Ordering::SeqCst);
        let err = store.rebuild(rules_chunks()).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));

        let status = store.status();
        assert_eq!(status.generation, 1);
        assert!(!status.rebuilding);
        assert_eq!(store.query("shipping", 4).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_same_text_same_scores() {
        let store = hash_store();
        store.rebuild(rules_chunks()).await.unwrap();
        let a = store.query("express shipping", 4).await.unwrap();
        let b = store.query("express shipping", 4).await.unwrap();
        let sa: Vec<f64> = a.iter().map(|r| r.score).collect();
        let sb: Vec<f64> = b.iter().map(|r| r.score).collect();
        assert_eq!(sa, sb);
    }
}
