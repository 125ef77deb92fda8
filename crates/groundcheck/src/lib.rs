//! # Groundcheck
//!
//! Grounded QA test case and browser-automation script generation from
//! project documentation.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌────────────────┐
//! │ Filesystem │──▶│ Chunk+Embed │──▶│ KnowledgeStore │
//! │  md/txt/…  │   │             │   │ (generations)  │
//! └────────────┘   └─────────────┘   └───────┬────────┘
//!                                            │ retrieve
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!              ┌───────────────┐     ┌───────────────┐
//!              │  Test cases   │────▶│    Scripts    │
//!              │  (grounded)   │     │ (rule-driven) │
//!              └───────────────┘     └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gck ingest --root ./docs
//! gck tests "discount codes" --out cases.json
//! gck script --cases cases.json --id DC1 --html assets/checkout.html
//! gck serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`ingest`] | Filesystem walk and document loading |
//! | [`extract`] | PDF text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Chat-completions backend and timeouts |
//! | [`testcases`] | Grounded test case synthesis |
//! | [`script`] | Automation script synthesis |
//! | [`pipeline`] | Facade used by the CLI and server |
//! | [`server`] | HTTP server |

pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod pipeline;
pub mod script;
pub mod server;
pub mod testcases;
