//! Parsing backend responses into verdicts.
//!
//! Backends are asked to answer in three labelled lines:
//!
//! ```text
//! Result: PASS
//! Confidence: 0.92
//! Reasoning: The document declares a title in its metadata.
//! ```
//!
//! Models drift from that shape, so labels match case-insensitively, may be
//! wrapped in markdown bold, and a JSON object (bare or fenced) is accepted as
//! well. Anything without a recognizable PASS/FAIL is a [`VerdictError`].

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Confidence assumed when the backend gives a result but no confidence.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

lazy_static! {
    static ref FIELD: Regex = Regex::new(
        r"(?im)^[ \t]*(?:[-*>#][ \t]*)*\**[ \t]*(result|confidence|reasoning)[ \t]*\**[ \t]*:[ \t]*\**[ \t]*(.*)$"
    )
    .unwrap();
    static ref LEADING_NUMBER: Regex = Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)\s*(%)?").unwrap();
}

/// A backend's judgement on one specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    /// Always within `[0.0, 1.0]`
    pub confidence: f64,
    pub reasoning: String,
}

/// Why a response could not be turned into a [`Verdict`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictError {
    #[error("response is empty")]
    Empty,

    #[error("no Result line found")]
    MissingResult,

    #[error("unrecognized result '{0}' (expected PASS or FAIL)")]
    UnknownResult(String),

    #[error("confidence '{0}' is not a number")]
    InvalidConfidence(String),
}

/// Parse a raw backend response.
///
/// A reply that is a JSON object as a whole is read as JSON. Otherwise an
/// explicit `Result:` line decides, and only a reply without one falls back
/// to a fenced or embedded JSON object.
pub fn parse_verdict(text: &str) -> Result<Verdict, VerdictError> {
    let text = text.trim().trim_matches('\u{feff}');
    if text.is_empty() {
        return Err(VerdictError::Empty);
    }

    if let Some(object) = json_object(text) {
        if let Some(verdict) = verdict_from_json(&object, text) {
            return verdict;
        }
    }

    let fields = LineFields::scan(text);
    if fields.result.is_none() {
        if let Some(object) = embedded_json_object(text) {
            if let Some(verdict) = verdict_from_json(&object, text) {
                return verdict;
            }
        }
    }

    fields.into_verdict(text)
}

/// Labelled values found in a response.
#[derive(Debug, Default)]
struct LineFields<'a> {
    result: Option<&'a str>,
    confidence: Option<&'a str>,
    reasoning: Option<&'a str>,
}

impl<'a> LineFields<'a> {
    fn scan(text: &'a str) -> Self {
        let mut fields = LineFields::default();
        let mut reasoning_start = None;
        let mut label_starts = Vec::new();

        for caps in FIELD.captures_iter(text) {
            let (Some(line), Some(key), Some(value)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            label_starts.push(line.start());
            match key.as_str().to_ascii_lowercase().as_str() {
                "result" if fields.result.is_none() => fields.result = Some(value.as_str()),
                "confidence" if fields.confidence.is_none() => {
                    fields.confidence = Some(value.as_str())
                }
                "reasoning" if reasoning_start.is_none() => reasoning_start = Some(value.start()),
                _ => {}
            }
        }

        // Reasoning spans lines up to the next label, or the end of the text.
        fields.reasoning = reasoning_start.map(|start| {
            let end = label_starts
                .iter()
                .copied()
                .find(|&label| label > start)
                .unwrap_or(text.len());
            &text[start..end]
        });
        fields
    }

    fn into_verdict(self, text: &str) -> Result<Verdict, VerdictError> {
        let passed = parse_result(self.result.ok_or(VerdictError::MissingResult)?)?;
        let confidence = match self.confidence {
            Some(raw) => parse_confidence(raw)?,
            None => DEFAULT_CONFIDENCE,
        };

        Ok(Verdict {
            passed,
            confidence,
            reasoning: reasoning_or_whole(self.reasoning, text),
        })
    }
}

/// `None` when the object carries no result field at all, so the caller can
/// fall back to line parsing.
fn verdict_from_json(
    object: &serde_json::Map<String, Value>,
    text: &str,
) -> Option<Result<Verdict, VerdictError>> {
    let field = |name: &str| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    };

    let passed = match (field("result"), field("passed")) {
        (Some(Value::String(s)), _) => parse_result(s),
        (_, Some(Value::Bool(b))) => Ok(*b),
        (Some(other), _) | (None, Some(other)) => {
            Err(VerdictError::UnknownResult(other.to_string()))
        }
        (None, None) => return None,
    };

    let verdict = passed.and_then(|passed| {
        let confidence = match field("confidence") {
            None | Some(Value::Null) => DEFAULT_CONFIDENCE,
            Some(Value::Number(n)) => {
                normalize_confidence(n.as_f64().unwrap_or(DEFAULT_CONFIDENCE), false)
            }
            Some(Value::String(s)) => parse_confidence(s)?,
            Some(other) => return Err(VerdictError::InvalidConfidence(other.to_string())),
        };
        let reasoning = match field("reasoning") {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        };
        Ok(Verdict {
            passed,
            confidence,
            reasoning: reasoning_or_whole(reasoning, text),
        })
    });

    Some(verdict)
}

fn parse_result(raw: &str) -> Result<bool, VerdictError> {
    let word = raw
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '`' | '"' | '\'' | '_'))
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match word.as_str() {
        "PASS" | "PASSED" => Ok(true),
        "FAIL" | "FAILED" => Ok(false),
        _ => Err(VerdictError::UnknownResult(raw.trim().to_string())),
    }
}

fn parse_confidence(raw: &str) -> Result<f64, VerdictError> {
    let value = raw.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '`' | '"'));
    let caps = LEADING_NUMBER
        .captures(value)
        .ok_or_else(|| VerdictError::InvalidConfidence(raw.trim().to_string()))?;

    let number = caps
        .get(0)
        .map(|m| m.as_str().trim_end_matches(|c: char| c == '%' || c.is_whitespace()))
        .and_then(|n| n.parse::<f64>().ok())
        .ok_or_else(|| VerdictError::InvalidConfidence(raw.trim().to_string()))?;

    Ok(normalize_confidence(number, caps.get(1).is_some()))
}

/// Map a stated confidence into `[0, 1]`: percentages (explicit, or bare
/// numbers in `(1, 100]`) are divided by 100, everything else is clamped.
fn normalize_confidence(value: f64, percent: bool) -> f64 {
    let value = if percent || (value > 1.0 && value <= 100.0) {
        value / 100.0
    } else {
        value
    };
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn reasoning_or_whole(reasoning: Option<&str>, text: &str) -> String {
    reasoning
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(text)
        .to_string()
}

fn as_json_object(candidate: &str) -> Option<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// The reply as a JSON object, bare or in a single code fence.
fn json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    if let Some(map) = as_json_object(text) {
        return Some(map);
    }

    let body = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))?
        .strip_suffix("```")?;
    as_json_object(body)
}

/// A JSON object somewhere in free-form output: a fenced block, or the
/// outermost `{...}` slice.
fn embedded_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            if let Some(end) = body.find("```") {
                if let Some(map) = as_json_object(&body[..end]) {
                    return Some(map);
                }
            }
        }
    }

    let (i, j) = (text.find('{')?, text.rfind('}')?);
    if i < j {
        as_json_object(&text[i..=j])
    } else {
        None
    }
}
