//! TOML configuration.
//!
//! Every section is optional; missing sections and keys fall back to the
//! defaults below. [`load_config`] returns the built-in defaults when the
//! file does not exist, so `gck` works out of the box against `./docs`.
//!
//! ```toml
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! top_k = 3
//!
//! [embedding]
//! provider = "hash"
//!
//! [generation]
//! provider = "openai-compatible"
//! base_url = "https://api.groq.com/openai/v1"
//! model = "llama-3.3-70b-versatile"
//! api_key_env = "GROQ_API_KEY"
//!
//! [ingest]
//! root = "./docs"
//!
//! [page]
//! path = "assets/checkout.html"
//!
//! [rules]
//! discount_factor = 0.85
//! shipping_cost = 10.0
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{bail, Context, Result};
use groundcheck_core::chunk::ChunkParams;
use groundcheck_core::prompt::PageContract;
use groundcheck_core::retrieve::RetrievalParams;
use groundcheck_core::rules::PricingSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub page: PageContract,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Restrict retrieval to one document source.
    #[serde(default)]
    pub source: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
            source: None,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.top_k,
            min_score: self.min_score,
            source_filter: self.source.clone(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            base_url: default_base_url(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generation_provider() -> String {
    "openai-compatible".to_string()
}
fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_generation_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_ingest_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_ingest_root() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.html".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RulesConfig {
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,
    #[serde(default = "default_shipping_cost")]
    pub shipping_cost: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            discount_factor: default_discount_factor(),
            shipping_cost: default_shipping_cost(),
            tolerance: default_tolerance(),
        }
    }
}

impl RulesConfig {
    pub fn pricing(&self) -> PricingSettings {
        PricingSettings {
            discount_factor: self.discount_factor,
            shipping_cost: self.shipping_cost,
            tolerance: self.tolerance,
        }
    }
}

fn default_discount_factor() -> f64 {
    0.85
}
fn default_shipping_cost() -> f64 {
    10.0
}
fn default_tolerance() -> f64 {
    0.01
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Load and validate the configuration at `path`.
///
/// A missing file yields the defaults; an unreadable or invalid file is
/// an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if let Some(min) = config.retrieval.min_score {
        if !(0.0..=1.0).contains(&min) {
            bail!("retrieval.min_score must be in [0.0, 1.0]");
        }
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.unwrap_or(0) == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "openai-compatible" | "disabled" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be openai-compatible or disabled.",
            other
        ),
    }
    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    // Validate rules
    if !(config.rules.discount_factor > 0.0 && config.rules.discount_factor <= 1.0) {
        bail!("rules.discount_factor must be in (0.0, 1.0]");
    }
    if config.rules.shipping_cost < 0.0 {
        bail!("rules.shipping_cost must be >= 0");
    }
    if config.rules.tolerance <= 0.0 {
        bail!("rules.tolerance must be > 0");
    }

    if config.page.path.trim().is_empty() {
        bail!("page.path must not be empty");
    }
    for (key, id) in [
        ("page.total_price_id", &config.page.total_price_id),
        ("page.discount_input_id", &config.page.discount_input_id),
        ("page.apply_button_id", &config.page.apply_button_id),
        ("page.shipping_select_id", &config.page.shipping_select_id),
    ] {
        if id.trim().is_empty() {
            bail!("{} must not be empty", key);
        }
    }
    if config.page.add_to_cart_ids.is_empty() {
        bail!("page.add_to_cart_ids must list at least one button id");
    }
    if let Some(pos) = config
        .page
        .add_to_cart_ids
        .iter()
        .position(|id| id.trim().is_empty())
    {
        bail!("page.add_to_cart_ids[{}] must not be empty", pos);
    }

    Ok(())
}
