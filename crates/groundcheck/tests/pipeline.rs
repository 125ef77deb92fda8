//! In-process pipeline tests with a scripted generation backend.

use async_trait::async_trait;
use groundcheck::config::Config;
use groundcheck::pipeline::Pipeline;
use groundcheck_core::embedding::HashEmbedder;
use groundcheck_core::generation::{GenerationRequest, Generator};
use groundcheck_core::models::TestCase;
use groundcheck_core::{Error, Stage};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Returns the same text for every request and records what it was sent.
struct Scripted {
    response: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl Scripted {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            response: "[]".to_string(),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> GenerationRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Generator for Scripted {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &GenerationRequest) -> groundcheck_core::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

fn docs_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::write(
        root.join("doc1.md"),
        "# Discounts\n\nApplying a discount code to an empty cart leaves the total unchanged.\n\
         SAVE15 takes 15% off the cart total.",
    )
    .unwrap();
    fs::write(
        root.join("shipping.md"),
        "# Shipping\n\nExpress shipping costs $10. FREESHIP removes the express shipping fee.",
    )
    .unwrap();
    fs::write(
        root.join("faq.txt"),
        "Invalid coupon codes are rejected and the total does not change.",
    )
    .unwrap();
    tmp
}

fn config_for(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.ingest.root = root.to_path_buf();
    config.generation.timeout_secs = 1;
    config
}

fn pipeline(root: &std::path::Path, generator: Arc<Scripted>) -> Pipeline {
    Pipeline::with_backends(
        config_for(root),
        Arc::new(HashEmbedder::default()),
        generator,
    )
}

fn save15_case() -> TestCase {
    TestCase {
        test_id: "DC2".to_string(),
        description: "Apply SAVE15 to a cart with headphones".to_string(),
        expected_result: "Total drops by 15%".to_string(),
        grounded_in: "doc1.md#0".to_string(),
    }
}

const DC1: &str = r#"{"test_id":"DC1","description":"empty cart discount","expected_result":"no change","grounded_in":"doc1"}"#;

#[tokio::test]
async fn test_dc1_round_trip_is_unmodified() {
    let docs = docs_dir();
    let generator = Scripted::new(DC1);
    let p = pipeline(docs.path(), generator.clone());
    p.ingest(None).await.unwrap();

    let cases = p.generate_test_cases("empty cart discount").await.unwrap();
    assert_eq!(
        cases,
        vec![TestCase {
            test_id: "DC1".to_string(),
            description: "empty cart discount".to_string(),
            expected_result: "no change".to_string(),
            grounded_in: "doc1".to_string(),
        }]
    );
    assert_eq!(generator.calls(), 1);

    let request = generator.last_request();
    let system = request.system.unwrap();
    assert!(system.contains("QA Automation Lead"));
    assert!(system.contains("[source: doc1.md#0]"));
    assert_eq!(request.prompt, "empty cart discount");
}

#[tokio::test]
async fn test_wrapped_and_fenced_output_is_accepted() {
    let docs = docs_dir();
    let raw = "```json\n{\"test_cases\": [{\"test_id\": \"A\", \"description\": \"FREESHIP\", \"grounded_in\": \"shipping.md\"}]}\n```";
    let p = pipeline(docs.path(), Scripted::new(raw));
    p.ingest(None).await.unwrap();

    let cases = p.generate_test_cases("free shipping").await.unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].grounded_in, "shipping.md");
}

#[tokio::test]
async fn test_truncated_output_is_malformed_with_raw() {
    let docs = docs_dir();
    let raw = r#"[{"test_id": "DC1", "description": "empty cart"#;
    let p = pipeline(docs.path(), Scripted::new(raw));
    p.ingest(None).await.unwrap();

    let err = p.generate_test_cases("discount").await.unwrap_err();
    assert_eq!(err.code(), "malformed_generation");
    assert_eq!(err.stage(), Some(Stage::TestCases));
    assert_eq!(err.raw_payload(), Some(raw));
}

#[tokio::test]
async fn test_empty_list_is_not_an_error() {
    let docs = docs_dir();
    let p = pipeline(docs.path(), Scripted::new("[]"));
    p.ingest(None).await.unwrap();
    assert!(p.generate_test_cases("discount").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fabricated_grounding_is_reattributed() {
    let docs = docs_dir();
    let raw = r#"[{"test_id": "X", "description": "d", "expected_result": "e", "grounded_in": "Confluence page 42"}]"#;
    let p = pipeline(docs.path(), Scripted::new(raw));
    p.ingest(None).await.unwrap();

    let context = p.query("discount code", None).await.unwrap();
    let cases = p.generate_test_cases("discount code").await.unwrap();
    let expected: Vec<String> = context.iter().map(|sc| sc.chunk.reference()).collect();
    assert_eq!(cases[0].grounded_in, expected.join(", "));
}

#[tokio::test]
async fn test_no_context_fails_before_generation() {
    let docs = docs_dir();
    let generator = Scripted::new(DC1);
    let p = pipeline(docs.path(), generator.clone());
    // Never ingested: nothing to ground in.
    let err = p.generate_test_cases("discount").await.unwrap_err();
    assert!(matches!(
        err,
        Error::EmptyInput {
            stage: Stage::Retrieve
        }
    ));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_generation_timeout() {
    let docs = docs_dir();
    let p = pipeline(docs.path(), Scripted::slow(Duration::from_secs(5)));
    p.ingest(None).await.unwrap();

    let err = p.generate_test_cases("discount").await.unwrap_err();
    assert!(matches!(
        err,
        Error::GenerationTimeout {
            stage: Stage::TestCases,
            ..
        }
    ));
}

#[tokio::test]
async fn test_ingest_summary_and_generations() {
    let docs = docs_dir();
    fs::write(docs.path().join("bad.txt"), [0xffu8, 0xfe, 0x00]).unwrap();
    let p = pipeline(docs.path(), Scripted::new("[]"));

    let first = p.ingest(None).await.unwrap();
    assert_eq!(first.documents, 3);
    assert_eq!(first.generation, 1);
    assert_eq!(first.model, "hash-v1");
    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.skipped[0].path, "bad.txt");

    let second = p.ingest(None).await.unwrap();
    assert_eq!(second.generation, 2);
    assert_eq!(p.status().generation, 2);
    assert_eq!(p.status().chunk_count, second.chunks);
}

#[tokio::test]
async fn test_empty_reingest_keeps_previous_generation() {
    let docs = docs_dir();
    let empty = TempDir::new().unwrap();
    let p = pipeline(docs.path(), Scripted::new("[]"));
    let first = p.ingest(None).await.unwrap();

    let err = p.ingest(Some(empty.path())).await.unwrap_err();
    let core = err.downcast_ref::<Error>().unwrap();
    assert!(matches!(
        core,
        Error::EmptyInput {
            stage: Stage::Ingest
        }
    ));

    let status = p.status();
    assert_eq!(status.generation, 1);
    assert_eq!(status.chunk_count, first.chunks);
    assert!(!p.query("discount", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_query_k_override() {
    let docs = docs_dir();
    let p = pipeline(docs.path(), Scripted::new("[]"));
    p.ingest(None).await.unwrap();

    assert_eq!(p.query("discount", Some(1)).await.unwrap().len(), 1);
    assert_eq!(p.query("discount", Some(50)).await.unwrap().len(), 3);
    assert!(p.query("discount", Some(0)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_script_strips_fences_and_names_rule() {
    let docs = docs_dir();
    let generator = Scripted::new("```python\nprint('checkout')\n```");
    let p = pipeline(docs.path(), generator.clone());

    let script = p.generate_script(&save15_case(), "<html></html>").await.unwrap();
    assert_eq!(script.test_id, "DC2");
    assert_eq!(script.rule, "percent-discount");
    assert_eq!(script.source, "print('checkout')");

    let prompt = generator.last_request().prompt;
    assert!(prompt.contains("expected = price_before * 0.85"));
    assert!(prompt.contains("< 0.01"));
    assert!(prompt.contains("btn-add-headphones"));
}

#[tokio::test]
async fn test_script_rule_decision_table() {
    let docs = docs_dir();
    let generator = Scripted::new("print(1)");
    let p = pipeline(docs.path(), generator.clone());

    let mut case = save15_case();
    case.description = "FREESHIP with express shipping".to_string();
    let script = p.generate_script(&case, "").await.unwrap();
    assert_eq!(script.rule, "free-shipping");
    assert!(generator.last_request().prompt.contains("expected = price_before - 10"));

    case.description = "Apply a code to an empty cart".to_string();
    let script = p.generate_script(&case, "").await.unwrap();
    assert_eq!(script.rule, "empty-cart");
    let prompt = generator.last_request().prompt;
    assert!(prompt.contains("expected = price_before`"));
    assert!(!prompt.contains("btn-add-headphones"));
}

#[tokio::test]
async fn test_script_generation_is_idempotent() {
    let docs = docs_dir();
    let generator = Scripted::new("driver = None");
    let p = pipeline(docs.path(), generator.clone());

    let a = p.generate_script(&save15_case(), "<html/>").await.unwrap();
    let b = p.generate_script(&save15_case(), "<html/>").await.unwrap();
    assert_eq!(a, b);

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests[0], requests[1]);
}

#[tokio::test]
async fn test_blank_description_never_calls_backend() {
    let docs = docs_dir();
    let generator = Scripted::new("print(1)");
    let p = pipeline(docs.path(), generator.clone());

    let mut case = save15_case();
    case.description = "  ".to_string();
    let err = p.generate_script(&case, "<html/>").await.unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientSpecification {
            field: "description",
            ..
        }
    ));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_empty_script_is_malformed() {
    let docs = docs_dir();
    let p = pipeline(docs.path(), Scripted::new("```python\n```"));
    let err = p.generate_script(&save15_case(), "").await.unwrap_err();
    assert_eq!(err.code(), "malformed_generation");
    assert_eq!(err.stage(), Some(Stage::Script));
}

#[tokio::test]
async fn test_script_prefers_python_block_over_setup_block() {
    let docs = docs_dir();
    let reply = "First install the driver:\n```bash\npip install selenium\n```\n\
                 Then run:\n```python\nfrom selenium import webdriver\ndriver = webdriver.Chrome()\n```\n";
    let p = pipeline(docs.path(), Scripted::new(reply));

    let script = p.generate_script(&save15_case(), "").await.unwrap();
    assert_eq!(
        script.source,
        "from selenium import webdriver\ndriver = webdriver.Chrome()"
    );
}

#[tokio::test]
async fn test_backend_failure_names_stage() {
    let docs = docs_dir();
    let p = Pipeline::with_backends(
        config_for(docs.path()),
        Arc::new(HashEmbedder::default()),
        Arc::new(groundcheck::generation::DisabledGenerator::new("no key")),
    );
    let err = p.generate_script(&save15_case(), "").await.unwrap_err();
    assert_eq!(err.code(), "backend_error");
    assert_eq!(err.stage(), Some(Stage::Script));
}
