//! # Groundcheck CLI (`gck`)
//!
//! ## Usage
//!
//! ```bash
//! gck --config ./config/gck.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gck ingest` | Build the knowledge base and report what was indexed |
//! | `gck query "<text>"` | Show the chunks retrieval returns for a query |
//! | `gck tests "<query>"` | Generate grounded test cases as JSON |
//! | `gck script --cases FILE --html FILE` | Generate an automation script for one test case |
//! | `gck serve` | Start the HTTP server |
//!
//! The knowledge base lives in memory, so `query` and `tests` ingest the
//! configured root on every run.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use groundcheck::config::{self, Config};
use groundcheck::pipeline::Pipeline;
use groundcheck::server;
use groundcheck_core::decode::decode_test_cases;
use groundcheck_core::models::TestCase;
use groundcheck_core::Stage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Groundcheck — grounded QA test cases and automation scripts from your docs.
#[derive(Parser)]
#[command(
    name = "gck",
    about = "Groundcheck — grounded QA test case and automation script generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/gck.toml`. A missing file means built-in defaults.
    #[arg(long, global = true, default_value = "./config/gck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the ingest root, chunk, and build the knowledge base.
    Ingest {
        /// Override `[ingest].root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Ingest, then print the chunks retrieved for a query.
    Query {
        text: String,

        /// Number of chunks to return (default `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Override `[ingest].root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Ingest, then generate grounded test cases for a query.
    Tests {
        query: String,

        /// Write the JSON to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the generation request instead of calling the backend.
        #[arg(long)]
        prompt_only: bool,

        /// Override `[ingest].root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Generate an automation script for one test case.
    Script {
        /// JSON file of test cases (as written by `gck tests`).
        #[arg(long)]
        cases: PathBuf,

        /// `test_id` to use; defaults to the first test case.
        #[arg(long)]
        id: Option<String>,

        /// Markup of the page under test.
        #[arg(long)]
        html: PathBuf,

        /// Write the script to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the generation request instead of calling the backend.
        #[arg(long)]
        prompt_only: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { root } => run_ingest(cfg, root.as_deref()).await?,
        Commands::Query { text, k, root } => run_query(cfg, &text, k, root.as_deref()).await?,
        Commands::Tests {
            query,
            out,
            prompt_only,
            root,
        } => run_tests(cfg, &query, out.as_deref(), prompt_only, root.as_deref()).await?,
        Commands::Script {
            cases,
            id,
            html,
            out,
            prompt_only,
        } => run_script(cfg, &cases, id.as_deref(), &html, out.as_deref(), prompt_only).await?,
        Commands::Serve => {
            let pipeline = Arc::new(Pipeline::from_config(cfg)?);
            server::run_server(pipeline).await?;
        }
    }

    Ok(())
}

async fn run_ingest(cfg: Config, root: Option<&Path>) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(cfg)?;
    let summary = pipeline.ingest(root).await?;

    println!("ingest {}", summary.root.display());
    println!("  documents: {}", summary.documents);
    println!("  chunks: {}", summary.chunks);
    println!("  generation: {}", summary.generation);
    println!("  model: {} ({} dims)", summary.model, summary.dims);
    println!("  skipped: {}", summary.skipped.len());
    for skipped in &summary.skipped {
        println!("    {} — {}", skipped.path, skipped.reason);
    }
    println!("ok");
    Ok(())
}

async fn run_query(
    cfg: Config,
    text: &str,
    k: Option<usize>,
    root: Option<&Path>,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(cfg)?;
    pipeline.ingest(root).await?;
    let results = pipeline.query(text, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, r) in results.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, r.score, r.chunk.reference());
        let snippet: String = r.chunk.text.chars().take(160).collect();
        println!("   {}", snippet.replace('\n', " ").trim());
    }
    Ok(())
}

async fn run_tests(
    cfg: Config,
    query: &str,
    out: Option<&Path>,
    prompt_only: bool,
    root: Option<&Path>,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(cfg)?;
    pipeline.ingest(root).await?;

    if prompt_only {
        let request = pipeline.test_case_prompt(query).await?;
        println!("{}", request.render());
        return Ok(());
    }

    let cases = pipeline.generate_test_cases(query).await?;
    let json = serde_json::to_string_pretty(&cases)?;
    match out {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("wrote {} test cases to {}", cases.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn run_script(
    cfg: Config,
    cases_path: &Path,
    id: Option<&str>,
    html_path: &Path,
    out: Option<&Path>,
    prompt_only: bool,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(cases_path)
        .with_context(|| format!("Failed to read test cases: {}", cases_path.display()))?;
    let cases = decode_test_cases(&raw, Stage::Script)
        .with_context(|| format!("Failed to parse test cases: {}", cases_path.display()))?;
    let test_case = select_case(cases, id)?;
    let markup = std::fs::read_to_string(html_path)
        .with_context(|| format!("Failed to read page markup: {}", html_path.display()))?;

    let pipeline = Pipeline::from_config(cfg)?;

    if prompt_only {
        let (request, rule) = pipeline.script_prompt(&test_case, &markup)?;
        println!("# rule: {}", rule);
        println!("{}", request.render());
        return Ok(());
    }

    let script = pipeline.generate_script(&test_case, &markup).await?;
    match out {
        Some(path) => {
            std::fs::write(path, &script.source)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "wrote script for {} (rule: {}) to {}",
                script.test_id,
                script.rule,
                path.display()
            );
        }
        None => println!("{}", script.source),
    }
    Ok(())
}

fn select_case(cases: Vec<TestCase>, id: Option<&str>) -> anyhow::Result<TestCase> {
    match id {
        Some(id) => {
            let available: Vec<String> = cases.iter().map(|c| c.test_id.clone()).collect();
            cases
                .into_iter()
                .find(|c| c.test_id == id)
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "No test case with test_id '{}'. Available: {}",
                        id,
                        available.join(", ")
                    )
                })
        }
        None => match cases.into_iter().next() {
            Some(first) => Ok(first),
            None => bail!("Test case file contains no test cases"),
        },
    }
}
