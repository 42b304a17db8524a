//! Response recovery: raw model output → one well-formed JSON object.
//!
//! Models asked for "JSON only" still wrap it in ```json fences, open with
//! "Voici le JSON :", or leave a trailing comma where generation stopped.
//! Recovery runs a fixed sequence of stages on each candidate text and stops
//! at the first one that parses to an object:
//!
//! 1. **Direct**: parse the text as is.
//! 2. **Fenced**: take the interior of the first fenced code block (any or no
//!    language tag; an unclosed fence runs to the end of the text).
//! 3. **Brace-bounded**: slice from the first `{` to the last `}` inclusive,
//!    dropping leading and trailing commentary.
//! 4. **Repaired**: collapse runs of commas and remove commas directly before
//!    `}` or `]`, then parse.
//!
//! Repair only ever runs on text that has already been through extraction;
//! comma cleanup on text still wrapped in fences or prose fixes nothing.
//!
//! Candidates are tried channel by channel: function-call arguments first,
//! free text second. The function-call channel is structurally a single JSON
//! object, so when both are present it wins even if the free text would
//! also parse.

use crate::error::ExtractionError;
use crate::pipeline::llm::ModelResponse;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Which response channel the object came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Channel {
    ToolCall,
    Text,
}

/// The stage at which parsing first succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RecoveryStage {
    Direct,
    Fenced,
    BraceBounded,
    Repaired,
}

/// A recovered JSON object plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredJson {
    pub value: Map<String, Value>,
    pub channel: Channel,
    pub stage: RecoveryStage,
}

/// Recover a single JSON object from a model response.
///
/// # Errors
/// [`ExtractionError::NoParsableJson`] when no channel yields an object after
/// all stages; `raw_text` holds the pre-repair candidate(s).
pub fn recover(raw: &ModelResponse) -> Result<RecoveredJson, ExtractionError> {
    let mut channels: Vec<(Channel, &str)> = Vec::with_capacity(2);
    if let Some(ref call) = raw.tool_call {
        channels.push((Channel::ToolCall, call.arguments.as_str()));
    }
    if let Some(ref text) = raw.text {
        channels.push((Channel::Text, text.as_str()));
    }

    let mut failures: Vec<String> = Vec::new();
    for (channel, text) in channels {
        match recover_text(text) {
            Ok((value, stage)) => {
                debug!("Recovered JSON from {:?} channel at stage {:?}", channel, stage);
                return Ok(RecoveredJson {
                    value,
                    channel,
                    stage,
                });
            }
            Err(pre_repair) => {
                warn!("{:?} channel yielded no parsable JSON object", channel);
                failures.push(pre_repair);
            }
        }
    }

    let raw_text = failures.join("\n---\n");
    debug!("Unrecoverable model output: {}", raw_text);
    Err(ExtractionError::NoParsableJson { raw_text })
}

/// Run every stage on one candidate text.
///
/// On failure, returns the text as it stood just before repair.
pub fn recover_text(text: &str) -> Result<(Map<String, Value>, RecoveryStage), String> {
    if let Some(obj) = parse_object(text) {
        return Ok((obj, RecoveryStage::Direct));
    }

    let mut current = text;
    if let Some(inner) = extract_fenced(current) {
        if let Some(obj) = parse_object(inner) {
            return Ok((obj, RecoveryStage::Fenced));
        }
        // An inline fence around a word must not hide an object outside it.
        if inner.contains('{') {
            current = inner;
        }
    }

    if let Some(bounded) = extract_brace_bounded(current) {
        if let Some(obj) = parse_object(bounded) {
            return Ok((obj, RecoveryStage::BraceBounded));
        }
        current = bounded;
    }

    let repaired = repair_commas(current);
    match parse_object(&repaired) {
        Some(obj) => Ok((obj, RecoveryStage::Repaired)),
        None => Err(current.to_string()),
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ── Stage 2: fenced block ────────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n?(.*?)(?:```|\z)").unwrap());

/// Interior of the first fenced code block, if any.
pub fn extract_fenced(text: &str) -> Option<&str> {
    RE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// ── Stage 3: brace-bounded slice ─────────────────────────────────────────────

/// Substring from the first `{` to the last `}` inclusive.
pub fn extract_brace_bounded(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ── Stage 4: syntactic repair ────────────────────────────────────────────────

// Both rules match a whole string literal first so commas inside quoted
// values (line names such as "Tranche A, ]") are left untouched.
static RE_COMMA_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)("(?:[^"\\]|\\.)*")|,(?:\s*,)+"#).unwrap());
static RE_TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)("(?:[^"\\]|\\.)*")|,\s*([}\]])"#).unwrap());

/// Collapse `,,` runs, then drop commas that sit right before `}` or `]`.
///
/// Text inside string literals is never rewritten.
pub fn repair_commas(text: &str) -> String {
    let collapsed = RE_COMMA_RUN.replace_all(text, |caps: &Captures| match caps.get(1) {
        Some(literal) => literal.as_str().to_string(),
        None => ",".to_string(),
    });
    RE_TRAILING_COMMA
        .replace_all(&collapsed, |caps: &Captures| match caps.get(1) {
            Some(literal) => literal.as_str().to_string(),
            None => caps[2].to_string(),
        })
        .into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────────
