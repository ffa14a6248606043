//! Generation strategy: request, parse, validate, retry
//!
//! One strategy run is a small state machine:
//!
//! ```text
//! Requesting ─▶ ParseCheck ─▶ StructureCheck ─▶ Success
//!     │             │               │
//!     └──────┬──────┴───────────────┘
//!            ▼
//!        Retrying ──(budget left)──▶ Requesting
//!            │
//!            └──(budget spent / deadline)──▶ Exhausted
//! ```
//!
//! Transport, parse and structure failures all draw from the same attempt
//! budget. Backoff is linear and strictly sequential.

use crate::config::RetryPolicy;
use crate::error::GenerationError;
use crate::generation::{GenerationParams, GenerationService};
use crate::prompts::{build_prompt, Prompt};
use crate::response::{Accepted, OutputShape, ParsedResponse};
use crate::scenes::{AttributeSpec, SceneTemplate};
use crate::types::Context;
use std::sync::Arc;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

enum State<T> {
    Requesting,
    ParseCheck(String),
    StructureCheck(ParsedResponse),
    Retrying(GenerationError),
    Success(Accepted<T>),
    Exhausted(GenerationError),
}

/// Builds prompts, calls the generation service and validates what comes back
pub struct GenerationStrategy {
    service: Arc<dyn GenerationService>,
    params: GenerationParams,
    retry: RetryPolicy,
    attributes: Arc<[AttributeSpec]>,
}

impl GenerationStrategy {
    pub fn new(
        service: Arc<dyn GenerationService>,
        params: GenerationParams,
        retry: RetryPolicy,
        attributes: Arc<[AttributeSpec]>,
    ) -> Self {
        Self {
            service,
            params,
            retry,
            attributes,
        }
    }

    /// Generate one deliverable for `context` using `template`
    ///
    /// Fails with [`GenerationError::Exhausted`] once the attempt budget or
    /// the deadline is spent, or immediately on a non-recoverable transport
    /// failure.
    pub async fn run<S: OutputShape>(
        &self,
        template: &SceneTemplate,
        context: &Context,
        deadline: Instant,
    ) -> Result<S::Output, GenerationError> {
        let prompt = build_prompt(template, context, &self.attributes, S::KIND);
        self.run_prompt::<S>(&template.scene, &prompt, deadline).await
    }

    async fn run_prompt<S: OutputShape>(
        &self,
        label: &str,
        prompt: &Prompt,
        deadline: Instant,
    ) -> Result<S::Output, GenerationError> {
        let mut attempt: u32 = 0;
        let mut calls: u32 = 0;
        let mut state: State<S::Output> = State::Requesting;

        loop {
            state = match state {
                State::Requesting => {
                    if Instant::now() >= deadline {
                        State::Exhausted(GenerationError::DeadlineExceeded)
                    } else {
                        calls += 1;
                        debug!("[{}] generation call {} (retry {})", label, calls, attempt);
                        match timeout_at(deadline, self.service.generate(prompt, &self.params)).await {
                            Err(_) => State::Exhausted(GenerationError::DeadlineExceeded),
                            Ok(Ok(text)) => State::ParseCheck(text),
                            Ok(Err(err)) => State::Retrying(err.into()),
                        }
                    }
                }
                State::ParseCheck(text) => match ParsedResponse::from_text(&text, S::KIND) {
                    Ok(parsed) => State::StructureCheck(parsed),
                    Err(err) => State::Retrying(err),
                },
                State::StructureCheck(parsed) => match S::accept(parsed) {
                    Ok(accepted) => State::Success(accepted),
                    Err(err) => State::Retrying(err),
                },
                State::Retrying(err) => {
                    if !err.is_retryable() || attempt >= self.retry.max_attempts {
                        State::Exhausted(err)
                    } else {
                        let delay = self.retry.delay_for(attempt);
                        let resume = Instant::now().checked_add(delay);
                        if resume.map_or(true, |at| at >= deadline) {
                            warn!("[{}] {}; no time left for another attempt", label, err);
                            State::Exhausted(GenerationError::DeadlineExceeded)
                        } else {
                            warn!(
                                "[{}] attempt {} failed: {}. Retrying in {:?}",
                                label,
                                calls,
                                err,
                                delay
                            );
                            sleep(delay).await;
                            attempt += 1;
                            State::Requesting
                        }
                    }
                }
                State::Success(accepted) => {
                    if accepted.was_repaired() {
                        debug!("[{}] accepted repaired {:?} output", label, S::KIND);
                    }
                    return Ok(accepted.into_inner());
                }
                State::Exhausted(last) => {
                    return Err(GenerationError::Exhausted {
                        attempts: calls,
                        last: Box::new(last),
                    });
                }
            };
        }
    }
}
