//! Sliding-window text chunker.
//!
//! Splits document bodies into overlapping [`Chunk`]s of at most
//! `chunk_size` characters. Consecutive windows share `overlap` characters
//! so that sentences straddling a boundary stay retrievable from either side.
//!
//! Each chunk receives a deterministic UUIDv5 derived from its document ID
//! and index, plus a SHA-256 hash of its text.
//!
//! # Algorithm
//!
//! 1. Index the body's character boundaries (never split inside a UTF-8 sequence).
//! 2. Emit the window `[start, min(start + chunk_size, len))`.
//! 3. Stop once a window reaches the end of the body; otherwise advance
//!    `start` by `chunk_size - overlap` and repeat.
//!
//! The last window may be shorter than `chunk_size`. Empty bodies produce
//! no chunks.
//!
//! # Example
//!
//! ```rust
//! use groundcheck_core::chunk::{split_documents, ChunkParams};
//! use groundcheck_core::models::Document;
//!
//! let docs = vec![Document::new("rules.md", "abcdefghij")];
//! let chunks = split_documents(&docs, ChunkParams { chunk_size: 4, overlap: 1 }).unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, ["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result, Stage};
use crate::models::{Chunk, Document};

/// Window size and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkParams {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(Error::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Split every document into overlapping chunks.
///
/// Chunks are returned grouped by document, in input order, with
/// contiguous per-document indices starting at 0.
///
/// # Errors
///
/// - [`Error::EmptyInput`] if `documents` is empty.
/// - [`Error::InvalidChunking`] unless `chunk_size > overlap`.
pub fn split_documents(documents: &[Document], params: ChunkParams) -> Result<Vec<Chunk>> {
    if documents.is_empty() {
        return Err(Error::EmptyInput {
            stage: Stage::Chunk,
        });
    }
    params.validate()?;

    let mut chunks = Vec::new();
    for doc in documents {
        chunks.extend(split_text(doc, params));
    }
    Ok(chunks)
}

fn split_text(doc: &Document, params: ChunkParams) -> Vec<Chunk> {
    let body = doc.body.as_str();
    // Byte offset of every char start, plus the end of the string.
    let bounds: Vec<usize> = body
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(body.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < char_len {
        let end = (start + params.chunk_size).min(char_len);
        let text = &body[bounds[start]..bounds[end]];
        chunks.push(make_chunk(doc, chunks.len(), start, text));
        if end == char_len {
            break;
        }
        start += params.stride();
    }
    chunks
}

fn make_chunk(doc: &Document, index: usize, offset: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!("{}:{}", doc.id, index);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();

    Chunk {
        id,
        document_id: doc.id.clone(),
        source: doc.source.clone(),
        chunk_index: index,
        offset,
        text: text.to_string(),
        hash,
    }
}
