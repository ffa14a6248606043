//! Parsing and repair of generated output
//!
//! Generated text is untrusted. It may wrap the JSON in prose or code fences,
//! carry the wrong top-level list, or mistype fields. This module finds the
//! structured object, classifies it into a [`ParsedResponse`] and converts it
//! into the deliverable an [`OutputShape`] expects, repairing the one
//! recognized alternate shape instead of rejecting it.

use crate::error::GenerationError;
use crate::prompts::OutputKind;
use crate::resilience;
use crate::types::{AdviceItem, ChecklistDraft, ChecklistItem, Importance};
use serde_json::{Map, Value};

/// Locate the first balanced `{...}` span in `text` that parses as a JSON object
///
/// Braces inside string literals are ignored. Spans that balance but do not
/// parse (e.g. `{name}` in prose) are skipped in favor of the next one.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(bytes, start) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Index of the `}` closing the object that opens at `start`
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Structured content recognized in a generated object
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// `{"advices": [...]}`; the list may be empty
    Advices(Vec<AdviceItem>),
    /// `{"checklist": [...], ...}`; the item list may be empty
    Checklist(ChecklistDraft),
    Unrecognized,
}

impl ParsedResponse {
    /// Parse raw generated text
    pub fn from_text(text: &str, expected: OutputKind) -> Result<Self, GenerationError> {
        let value = extract_json_object(text)
            .ok_or_else(|| GenerationError::Parse("no JSON object found in generated text".to_string()))?;
        Ok(Self::classify(&value, expected))
    }

    /// Classify an object, preferring the expected key when both are present
    pub fn classify(value: &Value, expected: OutputKind) -> Self {
        let Some(object) = value.as_object() else {
            return ParsedResponse::Unrecognized;
        };
        let advices = object.get(OutputKind::Advice.list_key()).and_then(Value::as_array);
        let checklist = object.get(OutputKind::Checklist.list_key()).and_then(Value::as_array);

        match (expected, advices, checklist) {
            (OutputKind::Checklist, _, Some(items)) => ParsedResponse::Checklist(checklist_draft(items, object)),
            (_, Some(items), _) => ParsedResponse::Advices(parse_items(items)),
            (_, None, Some(items)) => ParsedResponse::Checklist(checklist_draft(items, object)),
            (_, None, None) => ParsedResponse::Unrecognized,
        }
    }
}

/// Items that deserialize and carry a non-blank `short_advice`
fn parse_items<T>(items: &[Value]) -> Vec<T>
where
    T: serde::de::DeserializeOwned + HasShortAdvice,
{
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(parsed) if !parsed.short_advice().trim().is_empty() => Some(parsed),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Skipping malformed generated item: {}", e);
                None
            }
        })
        .collect()
}

fn checklist_draft(items: &[Value], object: &Map<String, Value>) -> ChecklistDraft {
    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let recommendations = object
        .get("recommendations")
        .map(lenient::value_list)
        .unwrap_or_default();

    let tips = object
        .iter()
        .filter(|(key, value)| key.ends_with("_tips") || (key.as_str() == "objection_handling" && value.is_array()))
        .map(|(key, value)| (key.clone(), lenient::value_list(value)))
        .collect();

    ChecklistDraft {
        items: parse_items(items),
        summary,
        recommendations,
        tips,
    }
}

trait HasShortAdvice {
    fn short_advice(&self) -> &str;
}

impl HasShortAdvice for AdviceItem {
    fn short_advice(&self) -> &str {
        &self.short_advice
    }
}

impl HasShortAdvice for ChecklistItem {
    fn short_advice(&self) -> &str {
        &self.short_advice
    }
}

/// How an output was obtained from a parsed response
#[derive(Debug, Clone, PartialEq)]
pub enum Accepted<T> {
    /// The expected list was present and non-empty
    Direct(T),
    /// Synthesized from the alternate shape
    Repaired(T),
}

impl<T> Accepted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Accepted::Direct(t) | Accepted::Repaired(t) => t,
        }
    }

    pub fn was_repaired(&self) -> bool {
        matches!(self, Accepted::Repaired(_))
    }
}

/// A deliverable the generation pipeline can produce
pub trait OutputShape: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    const KIND: OutputKind;

    /// Convert a parsed response, repairing the alternate shape when possible
    fn accept(parsed: ParsedResponse) -> Result<Accepted<Self::Output>, GenerationError>;

    /// Static minimal output used when generation is exhausted
    fn fallback() -> Self::Output;

    /// Number of items, for logging
    fn item_count(output: &Self::Output) -> usize;
}

/// Advice list pipeline
pub struct AdviceShape;

/// Checklist pipeline
pub struct ChecklistShape;

impl OutputShape for AdviceShape {
    type Output = Vec<AdviceItem>;

    const KIND: OutputKind = OutputKind::Advice;

    fn accept(parsed: ParsedResponse) -> Result<Accepted<Self::Output>, GenerationError> {
        match parsed {
            ParsedResponse::Advices(items) if !items.is_empty() => Ok(Accepted::Direct(items)),
            ParsedResponse::Advices(_) => Err(GenerationError::Structure("`advices` list is empty".to_string())),
            ParsedResponse::Checklist(draft) if !draft.items.is_empty() => {
                Ok(Accepted::Repaired(vec![advice_from_checklist(&draft)]))
            }
            ParsedResponse::Checklist(_) => Err(GenerationError::Structure(
                "expected `advices`, found an empty `checklist`".to_string(),
            )),
            ParsedResponse::Unrecognized => Err(GenerationError::Structure("missing `advices` list".to_string())),
        }
    }

    fn fallback() -> Self::Output {
        vec![resilience::fallback_advice()]
    }

    fn item_count(output: &Self::Output) -> usize {
        output.len()
    }
}

impl OutputShape for ChecklistShape {
    type Output = ChecklistDraft;

    const KIND: OutputKind = OutputKind::Checklist;

    fn accept(parsed: ParsedResponse) -> Result<Accepted<Self::Output>, GenerationError> {
        match parsed {
            ParsedResponse::Checklist(draft) if !draft.items.is_empty() => Ok(Accepted::Direct(draft)),
            ParsedResponse::Checklist(_) => Err(GenerationError::Structure("`checklist` list is empty".to_string())),
            ParsedResponse::Advices(items) if !items.is_empty() => Ok(Accepted::Repaired(ChecklistDraft {
                items: vec![checklist_from_advices(&items)],
                ..Default::default()
            })),
            ParsedResponse::Advices(_) => Err(GenerationError::Structure(
                "expected `checklist`, found an empty `advices`".to_string(),
            )),
            ParsedResponse::Unrecognized => Err(GenerationError::Structure("missing `checklist` list".to_string())),
        }
    }

    fn fallback() -> Self::Output {
        resilience::fallback_checklist()
    }

    fn item_count(output: &Self::Output) -> usize {
        output.items.len()
    }
}

/// Condense a checklist into a single advice item
pub fn advice_from_checklist(draft: &ChecklistDraft) -> AdviceItem {
    let lead = draft
        .items
        .iter()
        .find(|i| i.importance == Importance::Critical)
        .or_else(|| draft.items.first())
        .cloned()
        .unwrap_or_default();

    let short_advice = match draft.items.len() {
        0 | 1 => lead.short_advice.clone(),
        n => format!("{} (plus {} more preparation points)", lead.short_advice, n - 1),
    };

    AdviceItem {
        theory_id: lead.theory_id.clone(),
        theory_name: lead.theory_name.clone(),
        short_advice,
        expected_effect: draft.summary.clone().unwrap_or_else(|| lead.expected_effect.clone()),
        caution: lead.caution.clone(),
        tips: draft.recommendations.first().cloned().unwrap_or_else(|| lead.tips.clone()),
        related_theory: other_theories(draft.items.iter().map(|i| i.theory_name.as_str()), &lead.theory_name),
        implementation_steps: draft.items.iter().map(|i| i.short_advice.clone()).collect(),
        success_indicators: merged(draft.items.iter().map(|i| &i.success_indicators)),
        common_mistakes: merged(draft.items.iter().map(|i| &i.common_mistakes)),
        selected_rank: 0,
    }
}

/// Condense advice items into a single checklist item
pub fn checklist_from_advices(items: &[AdviceItem]) -> ChecklistItem {
    let lead = items.first().cloned().unwrap_or_default();
    let short_advice = match items.len() {
        0 | 1 => lead.short_advice.clone(),
        n => format!("{} (plus {} related actions)", lead.short_advice, n - 1),
    };

    ChecklistItem {
        theory_id: lead.theory_id.clone(),
        theory_name: lead.theory_name.clone(),
        short_advice,
        expected_effect: lead.expected_effect.clone(),
        caution: lead.caution.clone(),
        tips: lead.tips.clone(),
        related_theory: other_theories(items.iter().map(|i| i.theory_name.as_str()), &lead.theory_name),
        implementation_steps: items.iter().map(|i| i.short_advice.clone()).collect(),
        success_indicators: merged(items.iter().map(|i| &i.success_indicators)),
        common_mistakes: merged(items.iter().map(|i| &i.common_mistakes)),
        importance: Importance::Important,
        examples: Vec::new(),
        reasoning: format!("Condensed from {} advice item(s)", items.len()),
        timing: String::new(),
    }
}

fn other_theories<'a>(names: impl Iterator<Item = &'a str>, lead: &str) -> String {
    let mut others: Vec<&str> = Vec::new();
    for name in names {
        if !name.is_empty() && name != lead && !others.contains(&name) {
            others.push(name);
        }
    }
    others.join(", ")
}

fn merged<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in lists.flatten() {
        if !out.contains(entry) {
            out.push(entry.clone());
        }
    }
    out
}

/// Forgiving field decoders for generated JSON
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Any scalar as text; null as empty; arrays joined by newlines
    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value_text(&value))
    }

    /// An array of scalars, or one string split into lines
    pub fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value_list(&value))
    }

    pub fn value_text(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.trim().to_string(),
            Value::Array(items) => items
                .iter()
                .map(value_text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }

    pub fn value_list(value: &Value) -> Vec<String> {
        match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .iter()
                .map(value_text)
                .filter(|s| !s.is_empty())
                .collect(),
            Value::String(s) => s
                .lines()
                .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            other => vec![other.to_string()],
        }
    }
}
