//! Rule-directed automation script synthesis.
//!
//! The rule book picks a [`Directive`](groundcheck_core::rules::Directive)
//! from the test case description; the prompt spells that directive out as
//! explicit steps against the configured page contract. The backend only
//! writes the code.

use groundcheck_core::decode::strip_code_fences;
use groundcheck_core::generation::{GenerationRequest, Generator};
use groundcheck_core::models::{GeneratedScript, TestCase};
use groundcheck_core::prompt::{script_request, PageContract};
use groundcheck_core::rules::RuleBook;
use groundcheck_core::{Error, Result, Stage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::generation::complete_within;

/// Fence info strings that mark the script itself.
const SCRIPT_LANGUAGES: [&str; 3] = ["python", "py", "python3"];

pub struct ScriptSynthesizer {
    rules: RuleBook,
    page: PageContract,
    generator: Arc<dyn Generator>,
    temperature: f32,
    timeout: Duration,
}

impl ScriptSynthesizer {
    pub fn new(
        rules: RuleBook,
        page: PageContract,
        generator: Arc<dyn Generator>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            rules,
            page,
            generator,
            temperature,
            timeout,
        }
    }

    /// Select the rule for `test_case` and build the request, without
    /// calling the backend. Returns the request and the rule name.
    ///
    /// # Errors
    ///
    /// [`Error::InsufficientSpecification`] when the description is blank.
    pub fn prepare(&self, test_case: &TestCase, markup: &str) -> Result<(GenerationRequest, String)> {
        let description = test_case
            .description()
            .ok_or_else(|| Error::InsufficientSpecification {
                test_id: test_case.test_id.clone(),
                field: "description",
            })?;

        let directive = self.rules.evaluate(description);
        debug!(test_id = %test_case.test_id, rule = %directive.rule, "selected business rule");

        let request = script_request(test_case, directive, markup, &self.page, self.temperature);
        Ok((request, directive.rule.clone()))
    }

    pub async fn synthesize(&self, test_case: &TestCase, markup: &str) -> Result<GeneratedScript> {
        let (request, rule) = self.prepare(test_case, markup)?;
        let raw = complete_within(self.generator.as_ref(), &request, self.timeout, Stage::Script)
            .await?;

        let source = strip_code_fences(&raw, &SCRIPT_LANGUAGES);
        if source.is_empty() {
            return Err(Error::MalformedGeneration {
                stage: Stage::Script,
                reason: "script is empty after removing code fences".to_string(),
                raw,
            });
        }

        info!(test_id = %test_case.test_id, %rule, lines = source.lines().count(), "synthesized script");
        Ok(GeneratedScript {
            test_id: test_case.test_id.clone(),
            rule,
            source: source.to_string(),
        })
    }
}
