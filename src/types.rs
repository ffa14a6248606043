//! Core types for scene-advisor
//!
//! Request context, generated advice and checklist items, reference
//! theories and the payloads returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::response::lenient;

/// A normalized description of the business situation being advised on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub scene: String,
    pub goal: String,
    pub time_limit: String,
    pub stakes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    /// Scene-specific optional fields; only values actually supplied
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Context {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// One piece of advice produced for a context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdviceItem {
    #[serde(default, deserialize_with = "lenient::text")]
    pub theory_id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub theory_name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub short_advice: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub expected_effect: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub caution: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub tips: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub related_theory: String,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub implementation_steps: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub success_indicators: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub common_mistakes: Vec<String>,
    /// 1-based position in the final list, assigned by the assembler
    #[serde(default, skip_deserializing)]
    pub selected_rank: u32,
}

/// How much a checklist item matters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Critical,
    Important,
    #[default]
    Recommended,
}

impl Importance {
    /// Unknown or missing values read as `Recommended`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "high" => Importance::Critical,
            "important" | "medium" => Importance::Important,
            _ => Importance::Recommended,
        }
    }
}

impl<'de> Deserialize<'de> for Importance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = lenient::text(deserializer)?;
        Ok(Importance::parse(&raw))
    }
}

/// A preparation checklist entry; parallel to [`AdviceItem`] without a rank
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    #[serde(default, deserialize_with = "lenient::text")]
    pub theory_id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub theory_name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub short_advice: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub expected_effect: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub caution: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub tips: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub related_theory: String,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub implementation_steps: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub success_indicators: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub common_mistakes: Vec<String>,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub examples: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub timing: String,
}

/// Checklist items plus the surrounding material a generation may carry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChecklistDraft {
    pub items: Vec<ChecklistItem>,
    pub summary: Option<String>,
    pub recommendations: Vec<String>,
    /// Named tip arrays (e.g. `facilitation_tips`)
    pub tips: BTreeMap<String, Vec<String>>,
}

/// A reference theory from the candidate pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTheory {
    pub id: String,
    pub name: String,
    #[serde(alias = "domain")]
    pub category: String,
    #[serde(default)]
    pub academic_field: String,
    #[serde(default, alias = "description")]
    pub definition: String,
    #[serde(default)]
    pub key_concepts: BTreeSet<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub practical_tips: Vec<String>,
    #[serde(default)]
    pub applicable_scenarios: Vec<String>,
}

impl CandidateTheory {
    /// All textual fields joined, used for keyword and literal matching
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<&str> = vec![
            &self.name,
            &self.category,
            &self.academic_field,
            &self.definition,
        ];
        parts.extend(self.key_concepts.iter().map(String::as_str));
        parts.extend(self.examples.iter().map(String::as_str));
        parts.extend(self.practical_tips.iter().map(String::as_str));
        parts.extend(self.applicable_scenarios.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// How a [`SelectionResult`] was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    Identity,
    Content,
}

/// Caller-facing view of a selected theory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheorySummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub relevance: String,
    pub academic_field: String,
    pub key_concepts: Vec<String>,
    pub when_to_use: Vec<String>,
    pub examples: Vec<String>,
    pub practical_tips: Vec<String>,
}

/// Theories related to a piece of advice (at most 3)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub related_theories: Vec<TheorySummary>,
    pub summary: String,
    pub selection_method: SelectionMethod,
}

/// Request for related theories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TheoryRequest {
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub short_advice: Option<String>,
    #[serde(default)]
    pub additional_context: Option<String>,
    #[serde(default)]
    pub advice_id: Option<String>,
}

/// One advice request and what was produced for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub context: Context,
    pub advices: Vec<AdviceItem>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(context: Context, advices: Vec<AdviceItem>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context,
            advices,
            created_at: Utc::now(),
        }
    }
}

/// Payload for the advice entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceResponse {
    pub session_id: String,
    pub advices: Vec<AdviceItem>,
}

/// Payload for the checklist entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistResponse {
    pub checklist: Vec<ChecklistItem>,
    pub summary: String,
    pub recommendations: Vec<String>,
    /// Scene-specific tip arrays, flattened into the top-level object
    #[serde(flatten)]
    pub tips: BTreeMap<String, Vec<String>>,
}
