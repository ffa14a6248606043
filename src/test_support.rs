//! Shared doubles for unit tests

use crate::error::{PersistenceError, TransportError};
use crate::generation::{GenerationParams, GenerationService};
use crate::db::PersistenceGateway;
use crate::prompts::Prompt;
use crate::types::{AdviceItem, Context, Session};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Replays scripted results, then repeats a default forever
pub(crate) struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, TransportError>>>,
    repeat: Result<String, TransportError>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(script: Vec<Result<String, TransportError>>, repeat: Result<String, TransportError>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always(result: Result<String, TransportError>) -> Self {
        Self::new(Vec::new(), result)
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub(crate) fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, prompt: &Prompt, _params: &GenerationParams) -> Result<String, TransportError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.repeat.clone())
    }
}

/// Remembers every session written to it
#[derive(Default)]
pub(crate) struct RecordingGateway {
    pub(crate) sessions: Mutex<Vec<Session>>,
}

impl PersistenceGateway for RecordingGateway {
    fn create_session(&self, session: &Session) -> Result<String, PersistenceError> {
        let mut stored = session.clone();
        stored.advices.clear();
        self.sessions.lock().unwrap().push(stored);
        Ok(session.id.clone())
    }

    fn attach_advice(&self, session_id: &str, advices: &[AdviceItem]) -> Result<(), PersistenceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| PersistenceError::Unavailable(format!("no session {}", session_id)))?;
        session.advices = advices.to_vec();
        Ok(())
    }
}

/// Fails every write
pub(crate) struct FailingGateway;

impl PersistenceGateway for FailingGateway {
    fn create_session(&self, _session: &Session) -> Result<String, PersistenceError> {
        Err(PersistenceError::Unavailable("store is down".to_string()))
    }

    fn attach_advice(&self, _session_id: &str, _advices: &[AdviceItem]) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("store is down".to_string()))
    }
}

/// `{"advices": [...]}` with `n` distinct items
pub(crate) fn advices_json(n: usize) -> String {
    let advices: Vec<serde_json::Value> = (1..=n)
        .map(|i| {
            serde_json::json!({
                "theory_id": format!("theory-{}", i),
                "theory_name": format!("Theory {}", i),
                "short_advice": format!("Advice number {}", i),
                "implementation_steps": ["prepare", "act"]
            })
        })
        .collect();
    serde_json::json!({ "advices": advices }).to_string()
}

pub(crate) fn meeting_context() -> Context {
    Context {
        scene: "meeting".to_string(),
        goal: "decide".to_string(),
        time_limit: "short".to_string(),
        stakes: "high".to_string(),
        participants: None,
        relationship: None,
        attributes: BTreeMap::new(),
    }
}
