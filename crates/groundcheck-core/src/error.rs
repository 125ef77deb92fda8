//! Error taxonomy shared by every pipeline stage.
//!
//! Each variant carries enough structured detail (failing [`Stage`], raw
//! generation payload, offending field) for a presentation layer to render
//! it without string parsing.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Result type alias using the Groundcheck [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading documents from the ingestion source.
    Ingest,
    /// Splitting documents into chunks.
    Chunk,
    /// Embedding chunks and building a knowledge base generation.
    Index,
    /// Querying the knowledge store.
    Retrieve,
    /// Generating structured test cases.
    TestCases,
    /// Generating an automation script.
    Script,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Chunk => "chunk",
            Stage::Index => "index",
            Stage::Retrieve => "retrieve",
            Stage::TestCases => "test_cases",
            Stage::Script => "script",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("nothing to process at stage {stage}: input is empty")]
    EmptyInput { stage: Stage },

    #[error("knowledge store is rebuilding generation {generation}; retry the request")]
    StoreRebuilding { generation: u64 },

    #[error("generation backend returned malformed output at stage {stage}: {reason}")]
    MalformedGeneration {
        stage: Stage,
        reason: String,
        raw: String,
    },

    #[error("test case '{test_id}' has no usable `{field}`; cannot select a business rule")]
    InsufficientSpecification { test_id: String, field: &'static str },

    #[error("generation backend did not answer within {}s at stage {stage}", .timeout.as_secs_f64())]
    GenerationTimeout { stage: Stage, timeout: Duration },

    #[error("invalid chunking parameters: chunk_size={chunk_size}, overlap={overlap} (need chunk_size > overlap)")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    #[error("embedding backend error: {0}")]
    Embedding(String),

    /// Backend failure. Backends leave `stage` unset; callers that know
    /// the stage attach it with [`Error::at_stage`].
    #[error(
        "generation backend error{}: {message}",
        .stage.map(|s| format!(" at stage {}", s)).unwrap_or_default()
    )]
    Generation {
        stage: Option<Stage>,
        message: String,
    },
}

impl Error {
    /// A generation backend failure not yet tied to a stage.
    pub fn generation(message: impl Into<String>) -> Self {
        Error::Generation {
            stage: None,
            message: message.into(),
        }
    }

    /// Attach `stage` to a stage-less generation failure; other errors
    /// pass through unchanged.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Error::Generation {
                stage: None,
                message,
            } => Error::Generation {
                stage: Some(stage),
                message,
            },
            other => other,
        }
    }
    /// The stage this error belongs to, when it is stage-specific.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::EmptyInput { stage }
            | Error::MalformedGeneration { stage, .. }
            | Error::GenerationTimeout { stage, .. } => Some(*stage),
            Error::StoreRebuilding { .. } => Some(Stage::Retrieve),
            Error::InsufficientSpecification { .. } => Some(Stage::Script),
            Error::InvalidChunking { .. } => Some(Stage::Chunk),
            Error::Embedding(_) => Some(Stage::Index),
            Error::Generation { stage, .. } => *stage,
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreRebuilding { .. } | Error::GenerationTimeout { .. }
        )
    }

    /// Raw generation payload, if this error carries one.
    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            Error::MalformedGeneration { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::EmptyInput { .. } => "empty_input",
            Error::StoreRebuilding { .. } => "store_rebuilding",
            Error::MalformedGeneration { .. } => "malformed_generation",
            Error::InsufficientSpecification { .. } => "insufficient_specification",
            Error::GenerationTimeout { .. } => "timeout",
            Error::InvalidChunking { .. } => "bad_request",
            Error::Embedding(_) | Error::Generation { .. } => "backend_error",
        }
    }
}
