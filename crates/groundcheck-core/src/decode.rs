//! Decoding of raw generation output.
//!
//! Language models are asked for strict JSON but routinely wrap it in
//! Markdown fences, surround it with prose, or pick their own envelope.
//! Test case output is therefore recognized as one of a closed set of
//! [`Shape`]s, tried in order:
//!
//! 1. a single test case object
//! 2. an object wrapping a `test_cases` array
//! 3. a bare array, whose elements are objects or plain strings
//!
//! Anything else is [`Error::MalformedGeneration`] carrying the untouched
//! payload.

use serde_json::{Map, Value};

use crate::error::{Error, Result, Stage};
use crate::models::TestCase;

const WRAPPER_KEY: &str = "test_cases";
const ID_KEYS: [&str; 3] = ["test_id", "id", "test_case_id"];
const DESCRIPTION_KEYS: [&str; 3] = ["description", "test_scenario", "summary"];
const EXPECTED_KEYS: [&str; 2] = ["expected_result", "expected"];
const STRING_FIELDS: [&str; 9] = [
    "test_id",
    "id",
    "test_case_id",
    "description",
    "test_scenario",
    "summary",
    "expected_result",
    "expected",
    "grounded_in",
];

/// Recognized top-level layouts of test case output.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Single(Map<String, Value>),
    Wrapped(Vec<Value>),
    List(Vec<Value>),
}

impl Shape {
    fn classify(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Object(map) => {
                let map = lowercase_keys(map);
                if has_any(&map, &ID_KEYS) || has_any(&map, &DESCRIPTION_KEYS) {
                    Ok(Shape::Single(map))
                } else if let Some(inner) = map.get(WRAPPER_KEY) {
                    match inner {
                        Value::Array(items) => Ok(Shape::Wrapped(items.clone())),
                        other => Err(format!(
                            "`{}` is {}, expected an array",
                            WRAPPER_KEY,
                            kind(other)
                        )),
                    }
                } else {
                    Err("object has neither test case fields nor a `test_cases` array".to_string())
                }
            }
            Value::Array(items) => Ok(Shape::List(items)),
            other => Err(format!(
                "top-level value is {}, expected an object or array",
                kind(&other)
            )),
        }
    }

    fn into_elements(self) -> Vec<Value> {
        match self {
            Shape::Single(map) => vec![Value::Object(map)],
            Shape::Wrapped(items) | Shape::List(items) => items,
        }
    }
}

/// One Markdown fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Info string of the opening fence (`json`, `python`, ...), may be empty.
    pub info: &'a str,
    pub body: &'a str,
}

impl FencedBlock<'_> {
    /// Whether the info string names one of `languages` (case-insensitive).
    pub fn is_language(&self, languages: &[&str]) -> bool {
        let tag = self.info.split_whitespace().next().unwrap_or("");
        languages.iter().any(|l| l.eq_ignore_ascii_case(tag))
    }
}

/// Info strings recognized at the start of a single-line fence.
const INLINE_TAGS: [&str; 9] = [
    "json", "python", "python3", "py", "bash", "sh", "shell", "text", "javascript",
];

/// Every fenced block in `raw`, in order. An unterminated final fence
/// runs to the end of the input.
pub fn fenced_blocks(raw: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let line_end = after.find('\n').unwrap_or(after.len());
        let first_line = &after[..line_end];

        if let Some(close) = first_line.find("```") {
            let inner = first_line[..close].trim();
            let block = match inner.split_once(char::is_whitespace) {
                Some((tag, body)) if INLINE_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag)) => {
                    FencedBlock {
                        info: tag,
                        body: body.trim(),
                    }
                }
                _ => FencedBlock {
                    info: "",
                    body: inner,
                },
            };
            blocks.push(block);
            rest = &after[close + 3..];
            continue;
        }

        let info = first_line.trim();
        let body = &after[(line_end + 1).min(after.len())..];
        match body.find("```") {
            Some(close) => {
                blocks.push(FencedBlock {
                    info,
                    body: body[..close].trim(),
                });
                rest = &body[close + 3..];
            }
            None => {
                blocks.push(FencedBlock {
                    info,
                    body: body.trim(),
                });
                break;
            }
        }
    }
    blocks
}

/// Extract code from output that may be wrapped in Markdown fences.
///
/// Unfenced input is returned trimmed. Otherwise the first block tagged
/// with one of `languages` wins, falling back to the longest block (the
/// earliest on ties). Prose outside the fences is dropped.
pub fn strip_code_fences<'a>(raw: &'a str, languages: &[&str]) -> &'a str {
    let blocks = fenced_blocks(raw);
    if blocks.is_empty() {
        return raw.trim();
    }
    if let Some(block) = blocks.iter().find(|b| b.is_language(languages)) {
        return block.body;
    }
    blocks
        .iter()
        .fold(None::<&FencedBlock<'a>>, |best, b| match best {
            Some(best) if best.body.len() >= b.body.len() => Some(best),
            _ => Some(b),
        })
        .map(|b| b.body)
        .unwrap_or("")
}

/// Decode test cases from raw backend output.
///
/// When the output holds several JSON blocks (untagged or tagged `json`),
/// every block is decoded and the test cases are concatenated in order.
/// An empty array decodes to an empty list; it is the caller's decision
/// whether that is acceptable.
pub fn decode_test_cases(raw: &str, stage: Stage) -> Result<Vec<TestCase>> {
    let malformed = |reason: String| Error::MalformedGeneration {
        stage,
        reason,
        raw: raw.to_string(),
    };

    let blocks = fenced_blocks(raw);
    let bodies: Vec<&str> = if blocks.is_empty() {
        vec![raw.trim()]
    } else {
        let json: Vec<&str> = blocks
            .iter()
            .filter(|b| b.info.is_empty() || b.is_language(&["json"]))
            .map(|b| b.body)
            .collect();
        if json.is_empty() {
            blocks.iter().map(|b| b.body).collect()
        } else {
            json
        }
    };

    let mut elements = Vec::new();
    for (n, body) in bodies.iter().enumerate() {
        if body.is_empty() {
            return Err(malformed(if bodies.len() == 1 {
                "output is empty".to_string()
            } else {
                format!("block {} is empty", n)
            }));
        }
        let value = match serde_json::from_str::<Value>(body) {
            Ok(v) => v,
            Err(first) => json_span(body)
                .and_then(|span| serde_json::from_str::<Value>(span).ok())
                .ok_or_else(|| malformed(format!("output is not valid JSON: {}", first)))?,
        };
        elements.extend(Shape::classify(value).map_err(&malformed)?.into_elements());
    }

    elements
        .into_iter()
        .enumerate()
        .map(|(i, element)| element_to_test_case(i, element).map_err(&malformed))
        .collect()
}

fn element_to_test_case(index: usize, element: Value) -> std::result::Result<TestCase, String> {
    match element {
        Value::String(s) => Ok(TestCase {
            test_id: format!("TC-{}", index),
            description: s,
            expected_result: "See description".to_string(),
            grounded_in: String::new(),
        }),
        Value::Object(map) => {
            let mut map = lowercase_keys(map);
            if let Some(Value::Array(refs)) = map.get("grounded_in") {
                let joined = refs
                    .iter()
                    .map(scalar_to_string)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| format!("element {}: `grounded_in` holds a nested value", index))?
                    .join(", ");
                map.insert("grounded_in".to_string(), Value::String(joined));
            }
            for key in STRING_FIELDS {
                if let Some(v) = map.get_mut(key) {
                    let text = scalar_to_string(v)
                        .ok_or_else(|| format!("element {}: `{}` is {}", index, key, kind(v)))?;
                    *v = Value::String(text);
                }
            }
            // Blank ids count as missing.
            map.retain(|k, v| !(ID_KEYS.contains(&k.as_str()) && v.as_str() == Some("")));
            for group in [&ID_KEYS[..], &DESCRIPTION_KEYS[..], &EXPECTED_KEYS[..]] {
                keep_first_alias(&mut map, group);
            }
            if !map.contains_key("test_id") {
                map.insert("test_id".to_string(), Value::String(format!("TC-{}", index)));
            }
            serde_json::from_value(Value::Object(map))
                .map_err(|e| format!("element {}: {}", index, e))
        }
        other => Err(format!(
            "element {} is {}, expected an object or string",
            index,
            kind(&other)
        )),
    }
}

fn lowercase_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect()
}

/// Collapse an alias group onto its canonical (first) key, preferring
/// the earliest alias present.
fn keep_first_alias(map: &mut Map<String, Value>, group: &[&str]) {
    let Some(found) = group.iter().find(|k| map.contains_key(**k)) else {
        return;
    };
    let value = map.remove(*found);
    for alias in group {
        map.remove(*alias);
    }
    if let Some(value) = value {
        map.insert(group[0].to_string(), value);
    }
}

fn has_any(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|k| map.contains_key(*k))
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// The outermost `{...}` or `[...]` span, for JSON surrounded by prose.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
