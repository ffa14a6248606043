//! Scene catalog: specialist templates and recognized context attributes
//!
//! Each business scene (meeting, sales, interview, ...) gets a specialist
//! template that shapes the prompt. Scenes without an entry use the generic
//! template. Adding a scene is a table change; the context schema does not
//! move because scene-specific fields live in `Context::attributes`.

use serde::{Deserialize, Serialize};

/// Prompt persona and focus for one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTemplate {
    pub scene: String,
    /// Who the model should act as
    pub role: String,
    /// What advice for this scene should concentrate on
    pub advice_focus: String,
    /// What a preparation checklist for this scene should cover
    pub checklist_focus: String,
    /// Names of the tip arrays a checklist response carries for this scene
    pub tip_keys: Vec<String>,
}

/// A scene-specific optional field accepted on requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub key: String,
    /// Human label used when the value is rendered into a prompt
    pub label: String,
}

/// Static scene configuration injected into the dispatcher and normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTable {
    pub specialists: Vec<SceneTemplate>,
    pub generic: SceneTemplate,
    pub attributes: Vec<AttributeSpec>,
}

impl SceneTable {
    /// Specialist template for a scene, if one is mapped
    pub fn specialist(&self, scene: &str) -> Option<&SceneTemplate> {
        let scene = scene.trim();
        self.specialists.iter().find(|t| t.scene == scene)
    }

    /// Template whose tip arrays apply to the scene
    pub fn template_for(&self, scene: &str) -> &SceneTemplate {
        self.specialist(scene).unwrap_or(&self.generic)
    }
}

fn template(scene: &str, role: &str, advice_focus: &str, checklist_focus: &str, tips: &[&str]) -> SceneTemplate {
    SceneTemplate {
        scene: scene.to_string(),
        role: role.to_string(),
        advice_focus: advice_focus.to_string(),
        checklist_focus: checklist_focus.to_string(),
        tip_keys: tips.iter().map(|t| t.to_string()).collect(),
    }
}

fn attribute(key: &str, label: &str) -> AttributeSpec {
    AttributeSpec {
        key: key.to_string(),
        label: label.to_string(),
    }
}

impl Default for SceneTable {
    fn default() -> Self {
        Self {
            specialists: vec![
                template(
                    "meeting",
                    "an experienced meeting facilitator grounded in organizational psychology",
                    "reaching the meeting goal within the time available: framing the decision, steering discussion, handling disagreement and closing with clear owners",
                    "agenda preparation, stakeholder alignment before the meeting, facilitation moves and follow-up",
                    &["facilitation_tips"],
                ),
                template(
                    "sales",
                    "a senior B2B sales coach who applies persuasion research",
                    "building trust with the customer, surfacing needs, handling objections and moving the deal to the next stage",
                    "customer research, discovery questions, objection handling and a concrete next step",
                    &["closing_tips", "objection_handling"],
                ),
                template(
                    "interview",
                    "a hiring expert familiar with structured interviewing research",
                    "running a fair, structured conversation that yields evidence for the hiring decision",
                    "role requirements, question design, evaluation criteria and candidate experience",
                    &["question_tips"],
                ),
                template(
                    "negotiation",
                    "a negotiation advisor trained in principled negotiation",
                    "protecting interests, creating options, anchoring and managing concessions",
                    "BATNA, target and walk-away points, concession plan and relationship goals",
                    &["concession_tips"],
                ),
                template(
                    "presentation",
                    "a presentation coach who applies research on persuasion and attention",
                    "structuring the message for the audience, keeping attention and landing the call to action",
                    "audience analysis, storyline, supporting evidence, rehearsal and Q&A preparation",
                    &["delivery_tips"],
                ),
                template(
                    "one_on_one",
                    "a leadership coach specialized in one-on-one conversations",
                    "psychological safety, listening, feedback and agreeing on growth actions",
                    "topics to raise, feedback framing, questions to ask and commitments to follow up",
                    &["coaching_tips"],
                ),
            ],
            generic: template(
                "generic",
                "a business advisor who grounds every recommendation in established behavioral science",
                "the most effective actions toward the stated goal given the time limit and stakes",
                "the preparation steps that most improve the odds of reaching the stated goal",
                &["general_tips"],
            ),
            attributes: vec![
                attribute("meeting_type", "Meeting type"),
                attribute("agenda", "Agenda"),
                attribute("decision_maker", "Decision maker"),
                attribute("customer_type", "Customer type"),
                attribute("product", "Product or service"),
                attribute("deal_stage", "Deal stage"),
                attribute("budget", "Budget"),
                attribute("interview_type", "Interview type"),
                attribute("position", "Position"),
                attribute("candidate_level", "Candidate level"),
                attribute("counterpart", "Counterpart"),
                attribute("batna", "Best alternative if no agreement"),
                attribute("audience", "Audience"),
                attribute("presentation_length", "Presentation length"),
                attribute("topic", "Topic"),
                attribute("concern", "Main concern"),
                attribute("industry", "Industry"),
                attribute("additional_context", "Additional context"),
            ],
        }
    }
}
