//! Prompt construction for both synthesizers.
//!
//! Every builder here is a pure function of its inputs: no clocks, no
//! randomness, no I/O. Given a deterministic backend, identical inputs
//! therefore produce identical outputs.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::generation::GenerationRequest;
use crate::models::{ScoredChunk, TestCase};
use crate::rules::{Coupon, Directive};

const TEST_CASE_SYSTEM: &str = "You are a QA Automation Lead. \
Write functional test cases for the feature the user asks about, \
using ONLY the context provided below. Do not invent behavior the context does not describe.";

const SCRIPT_SYSTEM: &str = "You are a Senior SDET. \
Write a Python Selenium script for the single test case you are given. \
Return ONLY raw Python code. Do not output Markdown code blocks or commentary.";

/// DOM contract of the page under test.
///
/// Generated scripts refer to elements only through these identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContract {
    /// Page location relative to the script's working directory.
    pub path: String,
    pub total_price_id: String,
    pub discount_input_id: String,
    pub apply_button_id: String,
    /// Buttons clicked, in order, to put items in the cart.
    pub add_to_cart_ids: Vec<String>,
    pub shipping_select_id: String,
    /// Option value selecting express shipping.
    pub express_option: String,
    /// Seconds to wait for page scripts to recompute the total.
    pub settle_secs: u64,
}

impl Default for PageContract {
    fn default() -> Self {
        Self {
            path: "assets/checkout.html".to_string(),
            total_price_id: "total-price".to_string(),
            discount_input_id: "discount-code".to_string(),
            apply_button_id: "apply-coupon-btn".to_string(),
            add_to_cart_ids: vec!["btn-add-headphones".to_string()],
            shipping_select_id: "shipping-method".to_string(),
            express_option: "express".to_string(),
            settle_secs: 1,
        }
    }
}

/// Build the grounded test case request.
///
/// Each retrieved chunk becomes a `[source: <ref>]` block, and the same
/// references are listed as the only acceptable `grounded_in` values.
pub fn test_case_request(
    query: &str,
    context: &[ScoredChunk],
    temperature: f32,
) -> GenerationRequest {
    let mut system = String::from(TEST_CASE_SYSTEM);
    system.push_str("\n\nOutput strictly JSON: an array of objects with exactly the keys ");
    system.push_str("\"test_id\", \"description\", \"expected_result\", \"grounded_in\".\n");
    system.push_str("\"grounded_in\" must name the context block the test case is based on, ");
    system.push_str("using one of these references:\n");
    for sc in context {
        let _ = writeln!(system, "- {}", sc.chunk.reference());
    }
    system.push_str("Do not output Markdown code blocks.\n\nContext:\n");
    for sc in context {
        let _ = write!(
            system,
            "\n[source: {}]\n{}\n",
            sc.chunk.reference(),
            sc.chunk.text.trim()
        );
    }

    GenerationRequest::new(query.trim())
        .with_system(system)
        .with_temperature(temperature)
}

/// Build the script request for one test case.
///
/// `rule` is the directive the rule book selected for the test case's
/// description; it is rendered as explicit numbered steps so the backend
/// never has to infer pricing semantics.
pub fn script_request(
    test_case: &TestCase,
    rule: &Directive,
    markup: &str,
    page: &PageContract,
    temperature: f32,
) -> GenerationRequest {
    let mut p = String::new();

    p.push_str("--- TEST CASE ---\n");
    let _ = writeln!(p, "test_id: {}", test_case.test_id);
    let _ = writeln!(p, "description: {}", test_case.description.trim());
    let _ = writeln!(p, "expected_result: {}", test_case.expected_result.trim());
    let _ = writeln!(p, "business rule: {}", rule.rule);

    p.push_str("\n--- FILE LOCATION ---\n");
    let _ = writeln!(
        p,
        "The page under test is at \"{}\", relative to the script.",
        page.path
    );

    p.push_str("\n--- SCOPE ---\n");
    p.push_str("Generate code ONLY for this test case. Use only the element ids named below.\n");

    p.push_str("\n--- STEPS ---\n");
    for (i, step) in script_steps(rule, page).iter().enumerate() {
        let _ = writeln!(p, "{}. {}", i + 1, step);
    }

    p.push_str("\n--- TARGET HTML ---\n");
    p.push_str(markup.trim());
    p.push('\n');

    GenerationRequest::new(p)
        .with_system(SCRIPT_SYSTEM)
        .with_temperature(temperature)
}

fn script_steps(rule: &Directive, page: &PageContract) -> Vec<String> {
    let wait = format!(
        "Wait {}s for the page to recompute the total.",
        page.settle_secs
    );
    let mut steps = vec![
        "Import `os`, `time` and Selenium's `webdriver` and `By`; initialize a Chrome driver."
            .to_string(),
        format!(
            "Resolve the page: `file_path = os.path.abspath(\"{}\")`, then open it with \
             `driver.get(f\"file:///{{file_path}}\")`.",
            page.path
        ),
        "Wrap every following step in `try:` and call `driver.quit()` in the matching \
         `finally:` block, so the driver is released on every exit path, including a failed \
         assertion."
            .to_string(),
    ];

    if rule.cart.add_items {
        let ids: Vec<String> = page
            .add_to_cart_ids
            .iter()
            .map(|id| format!("`{}`", id))
            .collect();
        steps.push(format!(
            "Add items to the cart by clicking, in order: {}.",
            ids.join(", ")
        ));
    } else {
        steps.push("Do NOT add any items; the cart must stay empty.".to_string());
    }
    if rule.cart.express_shipping {
        steps.push(format!(
            "Select the option with value `{}` in the `{}` select element.",
            page.express_option, page.shipping_select_id
        ));
    }
    steps.push(wait.clone());
    steps.push(format!(
        "Capture `price_before` as a float parsed from the text of `{}` \
         (strip any currency symbol).",
        page.total_price_id
    ));
    let coupon = match &rule.coupon {
        Coupon::Fixed(code) => format!("the code `{}`", code),
        Coupon::FromTestCase => "the coupon code named in the test case description".to_string(),
    };
    steps.push(format!(
        "Type {} into `{}`, then click `{}`.",
        coupon, page.discount_input_id, page.apply_button_id
    ));
    steps.push(wait);
    steps.push(format!(
        "Capture `price_after` as a float from `{}` the same way.",
        page.total_price_id
    ));
    match rule.expectation.formula() {
        None => steps.push(
            "Print `price_before` and `price_after`. Do not assert on them.".to_string(),
        ),
        Some(formula) => steps.push(format!(
            "Compute `expected = {}` and `assert abs(price_after - expected) < {}`.",
            formula, rule.tolerance
        )),
    }
    steps
}
