//! Immutable knowledge base generation.
//!
//! A [`KnowledgeBase`] is one complete set of (chunk, vector) pairs built
//! from a single ingestion. It is never mutated after construction; the
//! [`KnowledgeStore`](super::KnowledgeStore) replaces it wholesale.
//! Vector search is brute-force cosine similarity over all entries.

use chrono::{DateTime, Utc};

use crate::embedding::normalized_similarity;
use crate::models::{Chunk, ScoredChunk};

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

pub struct KnowledgeBase {
    generation: u64,
    model: String,
    built_at: DateTime<Utc>,
    entries: Vec<Entry>,
}

impl KnowledgeBase {
    /// Pair chunks with their vectors. Callers guarantee equal lengths.
    pub(crate) fn new(
        generation: u64,
        model: String,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Self {
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry { chunk, vector })
            .collect();
        Self {
            generation,
            model,
            built_at: Utc::now(),
            entries,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct document sources, in ingestion order.
    pub fn sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for e in &self.entries {
            if !out.contains(&e.chunk.source.as_str()) {
                out.push(&e.chunk.source);
            }
        }
        out
    }

    /// Return the `k` entries most similar to `query_vec`, best first.
    ///
    /// Ties keep ingestion order. `k` larger than the base returns every
    /// entry.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, normalized_similarity(query_vec, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("generation", &self.generation)
            .field("model", &self.model)
            .field("chunks", &self.entries.len())
            .finish()
    }
}
