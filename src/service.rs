//! The advisor entry points
//!
//! [`AdvisorService`] owns the whole pipeline: normalization, dispatch with
//! retry and fallback, assembly, and the best-effort session write. Only
//! validation failures reach the caller.

use crate::assembler::{assemble_advice, assemble_checklist, persist, rank_advices};
use crate::config::AdvisorConfig;
use crate::db::{PersistenceGateway, TheoryCatalog};
use crate::dispatcher::SpecialistDispatcher;
use crate::error::{AdvisorError, ValidationError};
use crate::generation::GenerationService;
use crate::normalize::{normalize, theory_request};
use crate::resilience::ResilientPipeline;
use crate::response::{AdviceShape, ChecklistShape};
use crate::scenes::SceneTable;
use crate::strategy::GenerationStrategy;
use crate::theory::TheoryRelevanceEngine;
use crate::types::{AdviceItem, AdviceResponse, CandidateTheory, ChecklistResponse, SelectionResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Stand-in deadline when the configured timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

pub struct AdvisorService {
    scenes: Arc<SceneTable>,
    pipeline: ResilientPipeline,
    engine: TheoryRelevanceEngine,
    gateway: Arc<dyn PersistenceGateway>,
    catalog: Arc<dyn TheoryCatalog>,
    request_timeout: Duration,
}

impl AdvisorService {
    pub fn new(
        config: AdvisorConfig,
        generator: Arc<dyn GenerationService>,
        gateway: Arc<dyn PersistenceGateway>,
        catalog: Arc<dyn TheoryCatalog>,
    ) -> Self {
        let scenes = Arc::new(config.scenes);
        let strategy = GenerationStrategy::new(
            generator,
            config.generation.params,
            config.retry,
            scenes.attributes.clone().into(),
        );

        Self {
            pipeline: ResilientPipeline::new(SpecialistDispatcher::new(scenes.clone(), strategy)),
            scenes,
            engine: TheoryRelevanceEngine::new(config.selection),
            gateway,
            catalog,
            request_timeout: config.request_timeout,
        }
    }

    fn deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.request_timeout).unwrap_or_else(|| now + FAR_FUTURE)
    }

    /// Ranked advice for a context, with a session id
    pub async fn advise(&self, body: &Value) -> Result<AdviceResponse, AdvisorError> {
        let (response, _persisted) = self.advise_and_persist(body).await?;
        Ok(response)
    }

    async fn advise_and_persist(&self, body: &Value) -> Result<(AdviceResponse, JoinHandle<()>), AdvisorError> {
        let context = normalize(body, &self.scenes)?;
        info!("Advice request for scene '{}' (goal: {})", context.scene, context.goal);

        let delivered = self.pipeline.run::<AdviceShape>(&context, self.deadline()).await;
        let (response, session) = assemble_advice(&context, delivered.output);

        info!(
            "Session {} answered with {} advices ({:?})",
            response.session_id,
            response.advices.len(),
            delivered.origin
        );

        let handle = persist(self.gateway.clone(), session);
        Ok((response, handle))
    }

    /// Specialist-only advice for `scene`, which overrides any scene in the body
    pub async fn advise_specialist(&self, scene: &str, body: &Value) -> Result<Vec<AdviceItem>, AdvisorError> {
        let mut body = body.clone();
        let Some(object) = body.as_object_mut() else {
            return Err(ValidationError::invalid("body", "request body must be a JSON object").into());
        };
        object.insert("scene".to_string(), Value::String(scene.to_string()));

        let context = normalize(&body, &self.scenes)?;
        let delivered = self
            .pipeline
            .run_specialist::<AdviceShape>(&context, self.deadline())
            .await
            .ok_or_else(|| ValidationError::invalid("scene", format!("no specialist for scene '{}'", scene)))?;

        info!(
            "Specialist '{}' answered with {} advices ({:?})",
            context.scene,
            delivered.output.len(),
            delivered.origin
        );
        Ok(rank_advices(delivered.output))
    }

    /// Preparation checklist for a context
    pub async fn checklist(&self, body: &Value) -> Result<ChecklistResponse, AdvisorError> {
        let context = normalize(body, &self.scenes)?;
        info!("Checklist request for scene '{}'", context.scene);

        let delivered = self.pipeline.run::<ChecklistShape>(&context, self.deadline()).await;
        let tip_keys = &self.scenes.template_for(&context.scene).tip_keys;
        let response = assemble_checklist(&context, delivered.output, tip_keys);

        info!(
            "Checklist for scene '{}' has {} items ({:?})",
            context.scene,
            response.checklist.len(),
            delivered.origin
        );
        Ok(response)
    }

    /// Up to three reference theories related to a piece of advice
    pub async fn related_theories(&self, body: &Value) -> Result<SelectionResult, AdvisorError> {
        let request = theory_request(body)?;
        let pool = self.candidate_pool().await;
        Ok(self.engine.select(&request, &pool)?)
    }

    /// The theory pool; an unreadable store yields an empty pool
    async fn candidate_pool(&self) -> Vec<CandidateTheory> {
        let catalog = self.catalog.clone();
        match tokio::task::spawn_blocking(move || catalog.candidate_theories()).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => {
                warn!("Failed to load candidate theories: {}", e);
                Vec::new()
            }
            Err(e) => {
                warn!("Theory loader task failed: {}", e);
                Vec::new()
            }
        }
    }
}
