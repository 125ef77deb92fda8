//! Grounded test case synthesis.
//!
//! Retrieve context, ask the backend once for structured test cases,
//! decode strictly, then make sure every `grounded_in` names context that
//! was actually fed to the request.

use groundcheck_core::decode::decode_test_cases;
use groundcheck_core::generation::{GenerationRequest, Generator};
use groundcheck_core::models::{ScoredChunk, TestCase};
use groundcheck_core::prompt::test_case_request;
use groundcheck_core::retrieve::Retriever;
use groundcheck_core::{Error, Result, Stage};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::generation::complete_within;

/// Phrases shorter than this never count as quoting a chunk.
const MIN_QUOTED_PHRASE: usize = 12;

pub struct TestCaseSynthesizer {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    temperature: f32,
    timeout: Duration,
}

impl TestCaseSynthesizer {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            generator,
            temperature,
            timeout,
        }
    }

    /// Retrieve context for `query` and build the generation request
    /// without calling the backend.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyInput`] (stage `retrieve`) when nothing is retrieved.
    pub async fn prepare(&self, query: &str) -> Result<(GenerationRequest, Vec<ScoredChunk>)> {
        let context = self.retriever.retrieve(query).await?;
        if context.is_empty() {
            return Err(Error::EmptyInput {
                stage: Stage::Retrieve,
            });
        }
        let request = test_case_request(query, &context, self.temperature);
        Ok((request, context))
    }

    pub async fn synthesize(&self, query: &str) -> Result<Vec<TestCase>> {
        let (request, context) = self.prepare(query).await?;
        let raw = complete_within(
            self.generator.as_ref(),
            &request,
            self.timeout,
            Stage::TestCases,
        )
        .await?;

        let mut cases = decode_test_cases(&raw, Stage::TestCases)?;
        enforce_grounding(&mut cases, &context);
        info!(cases = cases.len(), context = context.len(), "synthesized test cases");
        Ok(cases)
    }
}

/// Replace any `grounded_in` that does not name fed context with the
/// references of all fed chunks.
pub fn enforce_grounding(cases: &mut [TestCase], context: &[ScoredChunk]) {
    let fallback = context
        .iter()
        .map(|sc| sc.chunk.reference())
        .collect::<Vec<_>>()
        .join(", ");

    for case in cases.iter_mut() {
        if !is_grounded(&case.grounded_in, context) {
            warn!(
                test_id = %case.test_id,
                claimed = %case.grounded_in,
                "grounded_in does not name retrieved context; re-attributing"
            );
            case.grounded_in = fallback.clone();
        }
    }
}

/// Whether `claim` names at least one fed chunk by reference, source,
/// file stem, or a quoted phrase.
pub fn is_grounded(claim: &str, context: &[ScoredChunk]) -> bool {
    claim
        .split([',', ';', '\n'])
        .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`'))
        .filter(|part| !part.is_empty())
        .any(|part| context.iter().any(|sc| names_chunk(part, sc)))
}

fn names_chunk(part: &str, sc: &ScoredChunk) -> bool {
    let part = part.to_lowercase();
    let chunk = &sc.chunk;
    let source = chunk.source.to_lowercase();
    let stem = Path::new(&chunk.source)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    part == chunk.reference().to_lowercase()
        || part == source
        || (!stem.is_empty() && part == stem)
        || (part.chars().count() >= MIN_QUOTED_PHRASE && chunk.text.to_lowercase().contains(&part))
}
