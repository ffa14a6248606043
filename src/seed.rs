//! Built-in reference theories
//!
//! Loaded by `advisor --seed` when the theory table is empty. Categories line
//! up with the selection tables in [`crate::theory`].

use crate::db::{count_theories, upsert_theory};
use crate::error::PersistenceError;
use crate::types::CandidateTheory;
use rusqlite::Connection;
use tracing::info;

struct SeedTheory {
    id: &'static str,
    name: &'static str,
    category: &'static str,
    academic_field: &'static str,
    definition: &'static str,
    key_concepts: &'static [&'static str],
    examples: &'static [&'static str],
    practical_tips: &'static [&'static str],
    applicable_scenarios: &'static [&'static str],
}

impl SeedTheory {
    fn to_candidate(&self) -> CandidateTheory {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        CandidateTheory {
            id: self.id.to_string(),
            name: self.name.to_string(),
            category: self.category.to_string(),
            academic_field: self.academic_field.to_string(),
            definition: self.definition.to_string(),
            key_concepts: self.key_concepts.iter().map(|s| s.to_string()).collect(),
            examples: owned(self.examples),
            practical_tips: owned(self.practical_tips),
            applicable_scenarios: owned(self.applicable_scenarios),
        }
    }
}

const SEED: &[SeedTheory] = &[
    SeedTheory {
        id: "anchoring",
        name: "Anchoring Effect",
        category: "negotiation",
        academic_field: "behavioral economics",
        definition: "The first number put on the table pulls later estimates toward it.",
        key_concepts: &["anchor", "frame", "first offer"],
        examples: &["Opening a salary discussion with a researched market figure"],
        practical_tips: &[
            "Make the first offer when you know the range",
            "Re-anchor explicitly if the other side opens extreme",
        ],
        applicable_scenarios: &["negotiation", "sales"],
    },
    SeedTheory {
        id: "reciprocity",
        name: "Reciprocity Principle",
        category: "persuasion",
        academic_field: "social psychology",
        definition: "People feel obliged to return favors and concessions.",
        key_concepts: &["reciprocity", "concession", "trust"],
        examples: &["Sharing a useful benchmark before asking for a meeting"],
        practical_tips: &["Give something of real value first", "Label concessions so they are noticed"],
        applicable_scenarios: &["sales", "negotiation"],
    },
    SeedTheory {
        id: "social-proof",
        name: "Social Proof",
        category: "persuasion",
        academic_field: "social psychology",
        definition: "Under uncertainty people follow what similar others do.",
        key_concepts: &["consensus", "evidence", "story"],
        examples: &["Citing a peer company that adopted the same tool"],
        practical_tips: &["Use references close to the listener's situation"],
        applicable_scenarios: &["sales", "presentation"],
    },
    SeedTheory {
        id: "groupthink",
        name: "Groupthink",
        category: "decision_making",
        academic_field: "organizational psychology",
        definition: "Cohesive groups suppress dissent and converge on poor decisions.",
        key_concepts: &["consensus", "question", "devil's advocate"],
        examples: &["A steering group approving a plan nobody privately believed in"],
        practical_tips: &["Ask for objections before asking for agreement", "Let the most junior person speak first"],
        applicable_scenarios: &["meeting"],
    },
    SeedTheory {
        id: "goal-setting",
        name: "Goal-Setting Theory",
        category: "motivation",
        academic_field: "organizational psychology",
        definition: "Specific, challenging goals with feedback raise performance.",
        key_concepts: &["goal", "feedback", "commitment"],
        examples: &["Agreeing a single measurable outcome for a quarter"],
        practical_tips: &[
            "State goals as outcomes, not activities",
            "Schedule the feedback point when the goal is set",
        ],
        applicable_scenarios: &["one_on_one", "meeting"],
    },
    SeedTheory {
        id: "active-listening",
        name: "Active Listening",
        category: "communication",
        academic_field: "counseling psychology",
        definition: "Attending to, paraphrasing and checking the speaker's meaning builds rapport and accuracy.",
        key_concepts: &["listen", "empathy", "rapport", "question"],
        examples: &["Summarizing a candidate's answer before the follow-up question"],
        practical_tips: &["Paraphrase before responding", "Ask one open question at a time"],
        applicable_scenarios: &["interview", "one_on_one"],
    },
    SeedTheory {
        id: "transformational-leadership",
        name: "Transformational Leadership",
        category: "leadership",
        academic_field: "management science",
        definition: "Leaders raise commitment by linking work to a shared vision and individual growth.",
        key_concepts: &["story", "commitment", "authority"],
        examples: &["Opening a reorganization announcement with why it matters to customers"],
        practical_tips: &["Tie each request to the larger purpose"],
        applicable_scenarios: &["presentation", "meeting"],
    },
    SeedTheory {
        id: "psychological-safety",
        name: "Psychological Safety",
        category: "team_dynamics",
        academic_field: "organizational behavior",
        definition: "Teams perform better when members can take interpersonal risks without fear.",
        key_concepts: &["trust", "feedback", "question"],
        examples: &["A retrospective where the manager shares their own mistake first"],
        practical_tips: &["Thank people for raising bad news", "Frame work as learning problems"],
        applicable_scenarios: &["meeting", "one_on_one"],
    },
];

/// The built-in theory pool, in seed order
pub fn seed_theories() -> Vec<CandidateTheory> {
    SEED.iter().map(SeedTheory::to_candidate).collect()
}

/// Insert the built-in pool if the table is empty; returns how many were added
pub fn seed_if_empty(conn: &Connection) -> Result<usize, PersistenceError> {
    if count_theories(conn)? > 0 {
        return Ok(0);
    }
    let theories = seed_theories();
    for theory in &theories {
        upsert_theory(conn, theory)?;
    }
    info!("Seeded {} theories", theories.len());
    Ok(theories.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, load_theories};
    use crate::theory::SelectionTables;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn test_seed_ids_are_unique() {
        let theories = seed_theories();
        let ids: HashSet<_> = theories.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), theories.len());
    }

    #[test]
    fn test_seed_covers_every_target_category() {
        let categories: HashSet<_> = seed_theories().into_iter().map(|t| t.category).collect();
        let tables = SelectionTables::default();
        for (_, category) in tables.scene_categories.iter().chain(&tables.goal_categories) {
            assert!(categories.contains(category), "no seed theory for {}", category);
        }
    }

    #[test]
    fn test_seed_if_empty_runs_once() {
        let dir = tempdir().unwrap();
        let conn = init_db(&dir.path().join("seed.db")).unwrap();

        assert_eq!(seed_if_empty(&conn).unwrap(), SEED.len());
        assert_eq!(seed_if_empty(&conn).unwrap(), 0);

        let pool = load_theories(&conn).unwrap();
        assert_eq!(pool[0].id, "anchoring");
        assert_eq!(pool.len(), SEED.len());
    }
}
