//! Prompt construction for advice and checklist generation

use crate::scenes::{AttributeSpec, SceneTemplate};
use crate::types::Context;
use serde::{Deserialize, Serialize};

/// Which deliverable a prompt asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Advice,
    Checklist,
}

impl OutputKind {
    /// Top-level key the generated object must carry
    pub fn list_key(&self) -> &'static str {
        match self {
            OutputKind::Advice => "advices",
            OutputKind::Checklist => "checklist",
        }
    }
}

/// A fully rendered prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Render the prompt for one context under one scene template
///
/// Only attributes present on the context are mentioned, each as its own line.
pub fn build_prompt(
    template: &SceneTemplate,
    context: &Context,
    attributes: &[AttributeSpec],
    kind: OutputKind,
) -> Prompt {
    let system = format!(
        "You are {role}. Every recommendation must cite the behavioral-science or \
         management theory it rests on. Reply with a single JSON object and nothing else.",
        role = template.role
    );

    let mut situation = vec![
        format!("Scene: {}", context.scene),
        format!("Goal: {}", context.goal),
        format!("Time available: {}", context.time_limit),
        format!("Stakes: {}", context.stakes),
    ];
    if let Some(participants) = context.participants {
        situation.push(format!("Participants: {}", participants));
    }
    if let Some(relationship) = &context.relationship {
        situation.push(format!("Relationship with the other side: {}", relationship));
    }
    for spec in attributes {
        if let Some(value) = context.attribute(&spec.key) {
            situation.push(format!("{}: {}", spec.label, value));
        }
    }

    let (task, schema) = match kind {
        OutputKind::Advice => (
            format!(
                "Give 3 to 5 concrete pieces of advice focused on {}. Order them from most to least impactful.",
                template.advice_focus
            ),
            ADVICE_SCHEMA.to_string(),
        ),
        OutputKind::Checklist => (
            format!(
                "Build a preparation checklist covering {}. Mark each item critical, important or recommended.",
                template.checklist_focus
            ),
            checklist_schema(&template.tip_keys),
        ),
    };

    let user = format!(
        "## Situation\n{situation}\n\n## Task\n{task}\n\n## Output format\n\
         Put the items under \"{key}\", shaped like this:\n{schema}",
        key = kind.list_key(),
        situation = situation
            .iter()
            .map(|line| format!("- {}", line))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    Prompt { system, user }
}

const ADVICE_SCHEMA: &str = r#"{
  "advices": [
    {
      "theory_id": "short-kebab-id",
      "theory_name": "Name of the theory",
      "short_advice": "One-sentence action",
      "expected_effect": "What changes if this is done",
      "caution": "When this backfires",
      "tips": "A practical tip",
      "related_theory": "A second relevant theory",
      "implementation_steps": ["step 1", "step 2"],
      "success_indicators": ["observable sign"],
      "common_mistakes": ["mistake"]
    }
  ]
}"#;

fn checklist_schema(tip_keys: &[String]) -> String {
    let tips: String = tip_keys
        .iter()
        .map(|key| format!(",\n  \"{}\": [\"tip\"]", key))
        .collect();
    format!(
        r#"{{
  "checklist": [
    {{
      "theory_id": "short-kebab-id",
      "theory_name": "Name of the theory",
      "short_advice": "What to check or prepare",
      "importance": "critical | important | recommended",
      "expected_effect": "Why it matters",
      "caution": "Common pitfall",
      "tips": "A practical tip",
      "related_theory": "A second relevant theory",
      "implementation_steps": ["step 1"],
      "success_indicators": ["observable sign"],
      "common_mistakes": ["mistake"],
      "examples": ["example"],
      "reasoning": "Why this item is on the list",
      "timing": "When to do it"
    }}
  ],
  "summary": "One paragraph overview",
  "recommendations": ["overall recommendation"]{tips}
}}"#
    )
}
