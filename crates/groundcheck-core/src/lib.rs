//! # Groundcheck Core
//!
//! Shared, runtime-free logic for Groundcheck: data models, chunking, the
//! generation-swapped knowledge store, retrieval, the business rule model,
//! prompt construction, and decoding of generation output.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or other
//! runtime-specific dependencies. Embedding and generation backends are
//! reached through the [`embedding::Embedder`] and [`generation::Generator`]
//! traits, implemented by the `groundcheck` app crate (or by test doubles).

pub mod chunk;
pub mod decode;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod rules;
pub mod store;

pub use error::{Error, Result, Stage};
