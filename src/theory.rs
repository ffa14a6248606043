//! Theory relevance selection
//!
//! Two mutually exclusive modes pick at most three reference theories:
//!
//! - identity: an `advice_id` hashes to fixed pool positions, so the same id
//!   always maps to the same theories for the same pool
//! - content: candidates are scored against the scene, goal and advice text
//!   and the best three are kept
//!
//! Index collisions in identity mode are kept as-is; the result may repeat a
//! theory.

use crate::error::ValidationError;
use crate::types::{CandidateTheory, SelectionMethod, SelectionResult, TheoryRequest, TheorySummary};
use tracing::debug;

pub const MAX_RELATED: usize = 3;

const CATEGORY_MATCH: u32 = 10;
const KEYWORD_HIT: u32 = 1;
const LITERAL_MATCH: u32 = 2;

/// How text is compared when scoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseMode {
    #[default]
    Sensitive,
    Insensitive,
}

impl CaseMode {
    fn normalize(&self, s: &str) -> String {
        match self {
            CaseMode::Sensitive => s.to_string(),
            CaseMode::Insensitive => s.to_lowercase(),
        }
    }
}

/// Lookup tables used by content mode
#[derive(Debug, Clone)]
pub struct SelectionTables {
    /// Exact scene -> category
    pub scene_categories: Vec<(String, String)>,
    /// Goal substring -> category, first match wins
    pub goal_categories: Vec<(String, String)>,
    pub vocabulary: Vec<String>,
    pub case: CaseMode,
}

fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for SelectionTables {
    fn default() -> Self {
        Self {
            scene_categories: pairs(&[
                ("meeting", "decision_making"),
                ("sales", "persuasion"),
                ("interview", "communication"),
                ("negotiation", "negotiation"),
                ("presentation", "persuasion"),
                ("one_on_one", "motivation"),
            ]),
            goal_categories: pairs(&[
                ("decide", "decision_making"),
                ("persuade", "persuasion"),
                ("convince", "persuasion"),
                ("agree", "negotiation"),
                ("motivate", "motivation"),
                ("trust", "communication"),
                ("lead", "leadership"),
                ("align", "team_dynamics"),
            ]),
            vocabulary: [
                "trust", "listen", "question", "anchor", "frame", "reciprocity", "commitment", "consensus",
                "feedback", "empathy", "evidence", "story", "deadline", "scarcity", "authority", "priority",
                "goal", "agenda", "rapport", "objection",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            case: CaseMode::default(),
        }
    }
}

/// Selects related theories from a candidate pool
#[derive(Debug, Clone, Default)]
pub struct TheoryRelevanceEngine {
    tables: SelectionTables,
}

impl TheoryRelevanceEngine {
    pub fn new(tables: SelectionTables) -> Self {
        Self { tables }
    }

    /// Pick up to three theories for `request` out of `pool`
    pub fn select(
        &self,
        request: &TheoryRequest,
        pool: &[CandidateTheory],
    ) -> Result<SelectionResult, ValidationError> {
        if let Some(advice_id) = present(&request.advice_id) {
            return Ok(self.select_by_identity(advice_id, pool));
        }

        let scene = present(&request.scene).ok_or_else(|| ValidationError::missing("scene"))?;
        let goal = present(&request.goal).ok_or_else(|| ValidationError::missing("goal"))?;
        let advice = present(&request.short_advice).ok_or_else(|| ValidationError::missing("short_advice"))?;
        let extra = present(&request.additional_context).unwrap_or("");

        Ok(self.select_by_content(scene, goal, advice, extra, pool))
    }

    fn select_by_identity(&self, advice_id: &str, pool: &[CandidateTheory]) -> SelectionResult {
        let related = identity_indices(advice_id, pool.len())
            .into_iter()
            .map(|i| summarize(&pool[i], format!("Associated with advice {}", advice_id)))
            .collect::<Vec<_>>();

        debug!("Identity selection for '{}' picked {} theories", advice_id, related.len());

        SelectionResult {
            summary: summary_line(&related, &format!("advice {}", advice_id)),
            related_theories: related,
            selection_method: SelectionMethod::Identity,
        }
    }

    fn select_by_content(
        &self,
        scene: &str,
        goal: &str,
        advice: &str,
        extra: &str,
        pool: &[CandidateTheory],
    ) -> SelectionResult {
        let case = self.tables.case;
        let target = self.target_category(scene, goal);
        let keywords = self.keyword_hits(&format!("{} {}", advice, extra));
        let scene_n = case.normalize(scene);
        let goal_n = case.normalize(goal);

        let mut scored: Vec<(u32, &CandidateTheory, bool, Vec<&str>)> = pool
            .iter()
            .map(|theory| {
                let text = case.normalize(&theory.searchable_text());
                let mut score = 0;

                let in_category = target
                    .as_ref()
                    .is_some_and(|target| case.normalize(&theory.category) == case.normalize(target));
                if in_category {
                    score += CATEGORY_MATCH;
                }

                let matched: Vec<&str> = keywords
                    .iter()
                    .copied()
                    .filter(|k| text.contains(&case.normalize(k)))
                    .collect();
                score += KEYWORD_HIT * matched.len() as u32;

                if text.contains(&scene_n) || text.contains(&goal_n) {
                    score += LITERAL_MATCH;
                }

                (score, theory, in_category, matched)
            })
            .collect();

        // stable: equal scores keep pool order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let related = scored
            .into_iter()
            .take(MAX_RELATED)
            .map(|(score, theory, in_category, matched)| {
                summarize(theory, relevance_text(score, in_category, theory, &matched))
            })
            .collect::<Vec<_>>();

        debug!(
            "Content selection for scene '{}' (target {:?}, {} keyword hits) picked {} theories",
            scene,
            target,
            keywords.len(),
            related.len()
        );

        SelectionResult {
            summary: summary_line(&related, &format!("{} / {}", scene, goal)),
            related_theories: related,
            selection_method: SelectionMethod::Content,
        }
    }

    /// Scene table first, then the first goal keyword contained in the goal;
    /// `None` means every category is equally eligible
    pub fn target_category(&self, scene: &str, goal: &str) -> Option<String> {
        let case = self.tables.case;
        let scene_n = case.normalize(scene.trim());
        let goal_n = case.normalize(goal);

        self.tables
            .scene_categories
            .iter()
            .find(|(key, _)| case.normalize(key) == scene_n)
            .or_else(|| {
                self.tables
                    .goal_categories
                    .iter()
                    .find(|(key, _)| goal_n.contains(&case.normalize(key)))
            })
            .map(|(_, category)| category.clone())
    }

    /// Vocabulary entries contained in `text`, in vocabulary order
    pub fn keyword_hits(&self, text: &str) -> Vec<&str> {
        let case = self.tables.case;
        let text = case.normalize(text);
        self.tables
            .vocabulary
            .iter()
            .filter(|word| text.contains(&case.normalize(word)))
            .map(String::as_str)
            .collect()
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// 32-bit polynomial hash over UTF-16 code units, wrapping like a Java `int`
pub fn identity_hash(id: &str) -> i32 {
    id.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Pool positions for `id`: `k * |hash| mod n` for k = 1, 2, 3
pub fn identity_indices(id: &str, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let h = identity_hash(id).unsigned_abs() as u64;
    (1..=MAX_RELATED as u64)
        .map(|k| ((k * h) % n as u64) as usize)
        .collect()
}

fn summarize(theory: &CandidateTheory, relevance: String) -> TheorySummary {
    TheorySummary {
        id: theory.id.clone(),
        name: theory.name.clone(),
        description: theory.definition.clone(),
        relevance,
        academic_field: theory.academic_field.clone(),
        key_concepts: theory.key_concepts.iter().cloned().collect(),
        when_to_use: theory.applicable_scenarios.clone(),
        examples: theory.examples.clone(),
        practical_tips: theory.practical_tips.clone(),
    }
}

fn relevance_text(score: u32, in_category: bool, theory: &CandidateTheory, matched: &[&str]) -> String {
    let mut reasons = Vec::new();
    if in_category {
        reasons.push(format!("matches the {} category", theory.category));
    }
    if !matched.is_empty() {
        reasons.push(format!("shares concepts: {}", matched.join(", ")));
    }
    if reasons.is_empty() {
        format!("General reference (score {})", score)
    } else {
        format!("Relevant because it {} (score {})", reasons.join(" and "), score)
    }
}

fn summary_line(related: &[TheorySummary], subject: &str) -> String {
    if related.is_empty() {
        return "No reference theories are available".to_string();
    }
    let names: Vec<&str> = related.iter().map(|t| t.name.as_str()).collect();
    format!("{} related theories for {}: {}", related.len(), subject, names.join(", "))
}
