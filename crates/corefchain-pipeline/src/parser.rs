//! Parse completion responses into structured values
//!
//! Models wrap JSON in markdown fences, prepend prose, or leave a stray
//! apostrophe before a key's closing quote. Each parser first recovers the
//! JSON object, then checks the stage's expected shape. Errors are plain
//! strings: they become the retry policy's rejection reasons.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static STRAY_APOSTROPHE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"\n\r]+?)'\s*:"#).expect("apostrophe regex is valid"));

/// Mentions listed by an extraction response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionPayload {
    /// Surface strings to be located in the segment
    Surfaces {
        /// Names
        proper_nouns: Vec<String>,
        /// Descriptive references
        noun_phrases: Vec<String>,
        /// Proper noun → short description
        descriptions: BTreeMap<String, String>,
    },

    /// Mentions with explicit segment-local byte offsets
    Spans(Vec<ExplicitSpan>),
}

/// One mention with offsets given by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitSpan {
    /// Stated surface text
    pub text: String,
    /// Segment-local start byte
    pub start: usize,
    /// Segment-local end byte
    pub end: usize,
}

/// Canonical-form proposals for one segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorefProposal {
    /// Surface → canonical form, `None` when the model left it unresolved
    pub resolved: BTreeMap<String, Option<String>>,
    /// Canonical form → description
    pub descriptions: BTreeMap<String, String>,
}

/// Answer of one verification pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the mentions denote the same entity
    pub same_entity: bool,
    /// Canonical label, always present when `same_entity`
    pub label: Option<String>,
}

/// Recover the JSON object from a raw response
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, String> {
    let mut text = raw.trim();
    if let Some(body) = strip_code_fence(text) {
        text = body;
    }

    let start = text
        .find('{')
        .ok_or_else(|| format!("no JSON object in response: {}", preview(raw)))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| format!("unterminated JSON object: {}", preview(raw)))?;
    let candidate = &text[start..=end];

    let value = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => value,
        Err(first) => {
            let repaired = STRAY_APOSTROPHE.replace_all(candidate, "\"${1}\":");
            serde_json::from_str::<Value>(&repaired)
                .map_err(|_| format!("invalid JSON: {}", first))?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err("response is not a JSON object".to_string()),
    }
}

/// Parse an extraction response
pub fn parse_extraction(raw: &str) -> Result<ExtractionPayload, String> {
    let object = extract_json_object(raw)?;

    if let Some(mentions) = object.get("MENTIONS") {
        let items = mentions
            .as_array()
            .ok_or_else(|| "MENTIONS must be a list".to_string())?;
        return items
            .iter()
            .map(parse_explicit_span)
            .collect::<Result<Vec<_>, _>>()
            .map(ExtractionPayload::Spans);
    }

    let entities = match object.get("ENTITIES") {
        Some(Value::Object(entities)) => entities,
        Some(Value::Null) | None
            if object.contains_key("PROPER_NOUN") || object.contains_key("NOUN_PHRASE") =>
        {
            &object
        }
        Some(_) => return Err("ENTITIES must be an object".to_string()),
        None => return Err("missing ENTITIES".to_string()),
    };

    Ok(ExtractionPayload::Surfaces {
        proper_nouns: string_list(entities.get("PROPER_NOUN"), "PROPER_NOUN")?,
        noun_phrases: string_list(entities.get("NOUN_PHRASE"), "NOUN_PHRASE")?,
        descriptions: string_map(object.get("PROPER_NOUN_DESCRIPTION")),
    })
}

/// Parse a coreference proposal response
pub fn parse_proposal(raw: &str) -> Result<CorefProposal, String> {
    let object = extract_json_object(raw)?;

    let resolved = match object.get("RESOLVED_ENTITIES") {
        Some(Value::Object(map)) => map,
        Some(_) => return Err("RESOLVED_ENTITIES must be an object".to_string()),
        None => return Err("missing RESOLVED_ENTITIES".to_string()),
    };
    if !object.contains_key("AUXILIARY_DESCRIPTIONS") {
        return Err("missing AUXILIARY_DESCRIPTIONS".to_string());
    }

    let mut proposal = CorefProposal {
        descriptions: string_map(object.get("AUXILIARY_DESCRIPTIONS")),
        ..Default::default()
    };
    for (surface, canonical) in resolved {
        let canonical = match canonical {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::String(_) | Value::Null => None,
            other => {
                return Err(format!(
                    "canonical form of '{}' must be a string or null, got {}",
                    surface, other
                ))
            }
        };
        proposal.resolved.insert(surface.trim().to_string(), canonical);
    }
    Ok(proposal)
}

/// Parse a verification response
pub fn parse_verdict(raw: &str) -> Result<Verdict, String> {
    let object = extract_json_object(raw)?;

    let same_entity = match object.get("SAME_ENTITY") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => true,
            "false" | "no" => false,
            _ => return Err(format!("SAME_ENTITY must be a boolean, got '{}'", s)),
        },
        Some(_) => return Err("SAME_ENTITY must be a boolean".to_string()),
        None => return Err("missing SAME_ENTITY".to_string()),
    };

    let label = match object.get("CANONICAL_LABEL") {
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                None
            } else if s.contains('\n') {
                return Err("CANONICAL_LABEL must be a single line".to_string());
            } else {
                Some(s.to_string())
            }
        }
        Some(Value::Null) | None => None,
        Some(_) => return Err("CANONICAL_LABEL must be a string".to_string()),
    };

    if same_entity && label.is_none() {
        return Err("affirmative verdict without CANONICAL_LABEL".to_string());
    }

    Ok(Verdict { same_entity, label })
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    Some(&body[..close])
}

fn parse_explicit_span(item: &Value) -> Result<ExplicitSpan, String> {
    let text = item
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| "mention without 'text'".to_string())?;
    let offset = |key: &str| {
        item.get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .ok_or_else(|| format!("mention '{}' without a valid '{}'", text, key))
    };
    Ok(ExplicitSpan {
        text: text.to_string(),
        start: offset("start")?,
        end: offset("end")?,
    })
}

fn string_list(value: Option<&Value>, key: &str) -> Result<Vec<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| format!("{} items must be quoted strings", key))
            })
            .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
            .collect(),
        Some(_) => Err(format!("{} must be a list", key)),
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.trim().to_string(), v.trim().to_string())))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(80).collect::<String>().replace('\n', " ")
}
