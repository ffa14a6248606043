//! Response assembly and best-effort persistence
//!
//! Ranks the delivered advice, wraps it in a [`Session`] with a fresh id and
//! hands the session to the gateway on a blocking worker. The response never
//! waits on, or depends on, that write.

use crate::db::PersistenceGateway;
use crate::types::{
    AdviceItem, AdviceResponse, ChecklistDraft, ChecklistItem, ChecklistResponse, Context, Importance, Session,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const MAX_DEFAULT_RECOMMENDATIONS: usize = 3;

/// Assign dense 1-based ranks in list order
pub fn rank_advices(mut advices: Vec<AdviceItem>) -> Vec<AdviceItem> {
    for (index, item) in advices.iter_mut().enumerate() {
        item.selected_rank = index as u32 + 1;
    }
    advices
}

/// Ranked advice plus the session that records it
pub fn assemble_advice(context: &Context, advices: Vec<AdviceItem>) -> (AdviceResponse, Session) {
    let session = Session::new(context.clone(), rank_advices(advices));
    let response = AdviceResponse {
        session_id: session.id.clone(),
        advices: session.advices.clone(),
    };
    (response, session)
}

/// Final checklist payload; every tip key of the scene is present, possibly empty
pub fn assemble_checklist(context: &Context, draft: ChecklistDraft, tip_keys: &[String]) -> ChecklistResponse {
    let ChecklistDraft {
        items,
        summary,
        recommendations,
        mut tips,
    } = draft;

    for key in tip_keys {
        tips.entry(key.clone()).or_default();
    }

    let summary = summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("{} preparation item(s) for your {}", items.len(), context.scene));

    let recommendations = if recommendations.is_empty() {
        default_recommendations(&items)
    } else {
        recommendations
    };

    ChecklistResponse {
        checklist: items,
        summary,
        recommendations,
        tips,
    }
}

/// Critical items first, then the rest, by short advice
fn default_recommendations(items: &[ChecklistItem]) -> Vec<String> {
    let critical = items.iter().filter(|i| i.importance == Importance::Critical);
    let rest = items.iter().filter(|i| i.importance != Importance::Critical);
    critical
        .chain(rest)
        .map(|i| i.short_advice.clone())
        .take(MAX_DEFAULT_RECOMMENDATIONS)
        .collect()
}

/// Write the session on a blocking worker; failures are only logged
pub fn persist(gateway: Arc<dyn PersistenceGateway>, session: Session) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || match gateway.store(&session) {
        Ok(()) => debug!("Stored session {} ({} advices)", session.id, session.advices.len()),
        Err(e) => warn!("Failed to store session {}: {}", session.id, e),
    })
}
