//! Guaranteed-success wrapper around dispatch
//!
//! Whatever happens downstream, a validated context gets a structurally valid,
//! non-empty deliverable. When generation is exhausted the static fallback
//! below is returned instead of an error.

use crate::dispatcher::{Route, SpecialistDispatcher};
use crate::response::OutputShape;
use crate::types::{AdviceItem, ChecklistDraft, ChecklistItem, Context, Importance};
use tokio::time::Instant;
use tracing::{info, warn};

/// Where a delivered output came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Specialist(String),
    Generic,
    Fallback,
}

impl From<Route> for Origin {
    fn from(route: Route) -> Self {
        match route {
            Route::Specialist(scene) => Origin::Specialist(scene),
            Route::Generic => Origin::Generic,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Delivered<T> {
    pub output: T,
    pub origin: Origin,
}

pub struct ResilientPipeline {
    dispatcher: SpecialistDispatcher,
}

impl ResilientPipeline {
    pub fn new(dispatcher: SpecialistDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Dispatch, substituting the static fallback for any failure
    pub async fn run<S: OutputShape>(&self, context: &Context, deadline: Instant) -> Delivered<S::Output> {
        match self.dispatcher.dispatch::<S>(context, deadline).await {
            Ok(dispatched) => {
                info!(
                    "Generated {} {:?} item(s) for scene '{}' via {:?}",
                    S::item_count(&dispatched.output),
                    S::KIND,
                    context.scene,
                    dispatched.route
                );
                Delivered {
                    output: dispatched.output,
                    origin: dispatched.route.into(),
                }
            }
            Err(err) => {
                warn!(
                    "All generation strategies failed for scene '{}', serving fallback: {}",
                    context.scene, err
                );
                Delivered {
                    output: S::fallback(),
                    origin: Origin::Fallback,
                }
            }
        }
    }

    /// Specialist only; `None` when the scene has no specialist
    pub async fn run_specialist<S: OutputShape>(
        &self,
        context: &Context,
        deadline: Instant,
    ) -> Option<Delivered<S::Output>> {
        let result = self.dispatcher.dispatch_specialist::<S>(context, deadline).await?;
        Some(match result {
            Ok(output) => Delivered {
                output,
                origin: Origin::Specialist(context.scene.clone()),
            },
            Err(err) => {
                warn!("Specialist '{}' failed, serving fallback: {}", context.scene, err);
                Delivered {
                    output: S::fallback(),
                    origin: Origin::Fallback,
                }
            }
        })
    }
}

/// Context-agnostic advice served when generation is unavailable
pub fn fallback_advice() -> AdviceItem {
    AdviceItem {
        theory_id: "goal-setting".to_string(),
        theory_name: "Goal-Setting Theory".to_string(),
        short_advice: "State the one outcome you need from this situation, then open with it.".to_string(),
        expected_effect: "A specific, explicit goal focuses attention and makes the conversation easier to steer."
            .to_string(),
        caution: "Stating the goal too forcefully can feel like pressure; invite input right after.".to_string(),
        tips: "Write the outcome down in one sentence before you start.".to_string(),
        related_theory: "Active Listening".to_string(),
        implementation_steps: vec![
            "Write down the single outcome you need".to_string(),
            "Share it at the start and ask whether others see it the same way".to_string(),
            "Close by confirming the next step and who owns it".to_string(),
        ],
        success_indicators: vec!["Everyone can restate the goal and the agreed next step".to_string()],
        common_mistakes: vec!["Raising several goals at once".to_string()],
        selected_rank: 0,
    }
}

/// Context-agnostic checklist served when generation is unavailable
pub fn fallback_checklist() -> ChecklistDraft {
    ChecklistDraft {
        items: vec![ChecklistItem {
            theory_id: "goal-setting".to_string(),
            theory_name: "Goal-Setting Theory".to_string(),
            short_advice: "Define the outcome you need and the next step you will ask for.".to_string(),
            expected_effect: "Clear goals make preparation and follow-up concrete.".to_string(),
            caution: "Leave room for the other side's goals.".to_string(),
            tips: "Keep the outcome to one sentence.".to_string(),
            related_theory: "Implementation Intentions".to_string(),
            implementation_steps: vec![
                "Write the desired outcome".to_string(),
                "List the one question you must get answered".to_string(),
                "Decide the next step you will propose".to_string(),
            ],
            success_indicators: vec!["You can state the outcome and next step without notes".to_string()],
            common_mistakes: vec!["Preparing content but not the ask".to_string()],
            importance: Importance::Critical,
            examples: vec!["\"By the end of today I want agreement on the Q3 budget owner.\"".to_string()],
            reasoning: "A defined outcome is the precondition for every other preparation step.".to_string(),
            timing: "Before the situation starts".to_string(),
        }],
        summary: Some(
            "Generated guidance is temporarily unavailable; start from a clear goal and next step.".to_string(),
        ),
        recommendations: vec![
            "Clarify the outcome you need".to_string(),
            "Plan the next step you will propose".to_string(),
        ],
        tips: Default::default(),
    }
}
