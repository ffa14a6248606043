//! Scene-based dispatch
//!
//! A context whose scene has a specialist template is tried there first. Any
//! specialist failure is absorbed here and the generic template runs instead;
//! only a generic failure escapes to the caller.

use crate::error::GenerationError;
use crate::response::OutputShape;
use crate::scenes::SceneTable;
use crate::strategy::GenerationStrategy;
use crate::types::Context;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Which template produced an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Specialist(String),
    Generic,
}

#[derive(Debug, Clone)]
pub struct Dispatched<T> {
    pub output: T,
    pub route: Route,
}

pub struct SpecialistDispatcher {
    scenes: Arc<SceneTable>,
    strategy: GenerationStrategy,
}

impl SpecialistDispatcher {
    pub fn new(scenes: Arc<SceneTable>, strategy: GenerationStrategy) -> Self {
        Self { scenes, strategy }
    }

    /// Specialist first when mapped, generic otherwise or on specialist failure
    pub async fn dispatch<S: OutputShape>(
        &self,
        context: &Context,
        deadline: Instant,
    ) -> Result<Dispatched<S::Output>, GenerationError> {
        match self.scenes.specialist(&context.scene) {
            Some(template) => match self.strategy.run::<S>(template, context, deadline).await {
                Ok(output) => {
                    return Ok(Dispatched {
                        output,
                        route: Route::Specialist(template.scene.clone()),
                    })
                }
                Err(err) => warn!(
                    "Specialist '{}' failed, falling back to generic strategy: {}",
                    template.scene, err
                ),
            },
            None => debug!("No specialist for scene '{}', using generic strategy", context.scene),
        }

        let output = self
            .strategy
            .run::<S>(&self.scenes.generic, context, deadline)
            .await?;
        Ok(Dispatched {
            output,
            route: Route::Generic,
        })
    }

    /// Run only the specialist for the context's scene, without fallthrough
    pub async fn dispatch_specialist<S: OutputShape>(
        &self,
        context: &Context,
        deadline: Instant,
    ) -> Option<Result<S::Output, GenerationError>> {
        let template = self.scenes.specialist(&context.scene)?;
        Some(self.strategy.run::<S>(template, context, deadline).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationConfig, RetryPolicy};
    use crate::error::TransportError;
    use crate::response::AdviceShape;
    use crate::test_support::{advices_json, meeting_context, ScriptedGenerator};
    use std::time::Duration;

    fn dispatcher(generator: Arc<ScriptedGenerator>) -> SpecialistDispatcher {
        let scenes = Arc::new(SceneTable::default());
        let strategy = GenerationStrategy::new(
            generator,
            GenerationConfig::default().params,
            RetryPolicy::default(),
            scenes.attributes.clone().into(),
        );
        SpecialistDispatcher::new(scenes, strategy)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test(start_paused = true)]
    async fn test_mapped_scene_uses_specialist() {
        let generator = Arc::new(ScriptedGenerator::always(Ok(advices_json(3))));
        let result = dispatcher(generator.clone())
            .dispatch::<AdviceShape>(&meeting_context(), deadline())
            .await
            .unwrap();

        assert_eq!(result.route, Route::Specialist("meeting".to_string()));
        assert_eq!(result.output.len(), 3);
        assert!(generator.prompts()[0].system.contains("meeting facilitator"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmapped_scene_goes_straight_to_generic() {
        let generator = Arc::new(ScriptedGenerator::always(Ok(advices_json(2))));
        let mut context = meeting_context();
        context.scene = "wedding toast".to_string();

        let result = dispatcher(generator.clone())
            .dispatch::<AdviceShape>(&context, deadline())
            .await
            .unwrap();

        assert_eq!(result.route, Route::Generic);
        assert_eq!(generator.calls(), 1);
        assert!(generator.prompts()[0].system.contains("business advisor"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_specialist_failure_falls_through_to_generic() {
        // specialist burns its 4 calls, generic succeeds on its first
        let mut script: Vec<Result<String, TransportError>> = vec![Err(TransportError::RateLimited); 4];
        script.push(Ok(advices_json(1)));
        let generator = Arc::new(ScriptedGenerator::new(script, Err(TransportError::RateLimited)));

        let result = dispatcher(generator.clone())
            .dispatch::<AdviceShape>(&meeting_context(), deadline())
            .await
            .unwrap();

        assert_eq!(result.route, Route::Generic);
        assert_eq!(generator.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_failure_propagates() {
        let generator = Arc::new(ScriptedGenerator::always(Err(TransportError::Authentication(
            "revoked".into(),
        ))));

        let err = dispatcher(generator.clone())
            .dispatch::<AdviceShape>(&meeting_context(), deadline())
            .await
            .unwrap_err();

        // one call each: the auth failure is not retried
        assert_eq!(generator.calls(), 2);
        assert!(matches!(err, GenerationError::Exhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_specialist_without_mapping() {
        let generator = Arc::new(ScriptedGenerator::always(Ok(advices_json(1))));
        let mut context = meeting_context();
        context.scene = "unknown".to_string();

        let result = dispatcher(generator.clone())
            .dispatch_specialist::<AdviceShape>(&context, deadline())
            .await;
        assert!(result.is_none());
        assert_eq!(generator.calls(), 0);
    }
}
