//! The `Pipeline` facade: one shared store plus both synthesizers, wired
//! from [`Config`]. Both the CLI and the HTTP server go through it.

use anyhow::Context;
use groundcheck_core::chunk::split_documents;
use groundcheck_core::embedding::Embedder;
use groundcheck_core::generation::{GenerationRequest, Generator};
use groundcheck_core::models::{Document, GeneratedScript, ScoredChunk, TestCase};
use groundcheck_core::retrieve::{RetrievalParams, Retriever};
use groundcheck_core::rules::RuleBook;
use groundcheck_core::store::{BuildResult, KnowledgeStore, StoreStatus};
use groundcheck_core::{Error, Result, Stage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::{create_generator, DisabledGenerator};
use crate::ingest::{scan_directory, SkippedFile};
use crate::script::ScriptSynthesizer;
use crate::testcases::TestCaseSynthesizer;

/// Outcome of [`Pipeline::ingest`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub root: PathBuf,
    pub documents: usize,
    pub chunks: usize,
    pub generation: u64,
    pub model: String,
    pub dims: usize,
    pub skipped: Vec<SkippedFile>,
}

pub struct Pipeline {
    config: Config,
    store: Arc<KnowledgeStore>,
    retrieval: RetrievalParams,
    test_cases: TestCaseSynthesizer,
    scripts: ScriptSynthesizer,
}

impl Pipeline {
    /// Build the pipeline with the backends named in `config`.
    ///
    /// A generation backend that cannot be created (typically a missing
    /// API key) is replaced by a [`DisabledGenerator`] carrying the reason,
    /// so ingestion and retrieval still work.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator: Arc<dyn Generator> = match create_generator(&config.generation) {
            Ok(generator) => generator,
            Err(e) => {
                warn!(error = %e, "generation backend unavailable; synthesis will fail");
                Arc::new(DisabledGenerator::new(e.to_string()))
            }
        };
        Ok(Self::with_backends(config, embedder, generator))
    }

    pub fn with_backends(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let store = Arc::new(KnowledgeStore::new(embedder));
        let retrieval = config.retrieval.params();
        let timeout = config.generation.timeout();
        let temperature = config.generation.temperature;

        let test_cases = TestCaseSynthesizer::new(
            Retriever::new(store.clone(), retrieval.clone()),
            generator.clone(),
            temperature,
            timeout,
        );
        let scripts = ScriptSynthesizer::new(
            RuleBook::checkout(config.rules.pricing()),
            config.page.clone(),
            generator,
            temperature,
            timeout,
        );

        Self {
            config,
            store,
            retrieval,
            test_cases,
            scripts,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn status(&self) -> StoreStatus {
        self.store.status()
    }

    /// Walk `root` (default `[ingest].root`), chunk, and rebuild the store.
    pub async fn ingest(&self, root: Option<&Path>) -> anyhow::Result<IngestSummary> {
        let root = root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.ingest.root.clone());
        let outcome = scan_directory(&self.config.ingest, Some(&root))
            .with_context(|| format!("Failed to scan {}", root.display()))?;
        let documents = outcome.documents.len();

        let build = self.ingest_documents(outcome.documents).await?;
        let summary = IngestSummary {
            root,
            documents,
            chunks: build.chunk_count,
            generation: build.generation,
            model: build.model,
            dims: build.dims,
            skipped: outcome.skipped,
        };
        info!(
            root = %summary.root.display(),
            documents = summary.documents,
            chunks = summary.chunks,
            skipped = summary.skipped.len(),
            generation = summary.generation,
            "ingest complete"
        );
        Ok(summary)
    }

    /// Chunk already-loaded documents and rebuild the store.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyInput`] (stage `ingest`) for no documents; chunking and
    /// index errors propagate unchanged. The previous generation stays live
    /// on any failure.
    pub async fn ingest_documents(&self, documents: Vec<Document>) -> Result<BuildResult> {
        if documents.is_empty() {
            return Err(Error::EmptyInput {
                stage: Stage::Ingest,
            });
        }
        let chunks = split_documents(&documents, self.config.chunking.params())?;
        self.store.rebuild(chunks).await
    }

    /// Ranked chunks for `text`, honoring the configured filters; `k`
    /// overrides `[retrieval].top_k`.
    pub async fn query(&self, text: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        let params = RetrievalParams {
            top_k: k.unwrap_or(self.retrieval.top_k),
            ..self.retrieval.clone()
        };
        Retriever::new(self.store.clone(), params).retrieve(text).await
    }

    pub async fn generate_test_cases(&self, query: &str) -> Result<Vec<TestCase>> {
        self.test_cases.synthesize(query).await
    }

    /// The request [`Self::generate_test_cases`] would send.
    pub async fn test_case_prompt(&self, query: &str) -> Result<GenerationRequest> {
        Ok(self.test_cases.prepare(query).await?.0)
    }

    pub async fn generate_script(&self, test_case: &TestCase, markup: &str) -> Result<GeneratedScript> {
        self.scripts.synthesize(test_case, markup).await
    }

    /// The request [`Self::generate_script`] would send, and the rule it encodes.
    pub fn script_prompt(&self, test_case: &TestCase, markup: &str) -> Result<(GenerationRequest, String)> {
        self.scripts.prepare(test_case, markup)
    }
}
