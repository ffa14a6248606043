//! scene-advisor - scene-aware business advice
//!
//! Turns a short description of a business situation (a meeting, a sales
//! call, an interview) into ranked, theory-backed advice or a preparation
//! checklist, and picks reference theories related to a piece of advice.
//!
//! # Guarantees
//!
//! - A request that passes validation always gets a non-empty answer. When the
//!   generation service is down, a static fallback is served.
//! - A failing generation call is retried at most three times with linear
//!   backoff, inside one request deadline.
//! - Theory selection is deterministic for a given request and pool.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use scene_advisor::{AdvisorConfig, AdvisorService, HttpGenerationClient, SqliteGateway};
//!
//! let config = AdvisorConfig::from_env();
//! let generator = Arc::new(HttpGenerationClient::new(&config.generation)?);
//! let store = Arc::new(SqliteGateway::open(&config.db_path)?);
//! let service = AdvisorService::new(config, generator, store.clone(), store);
//!
//! let response = service.advise(&json!({
//!     "scene": "meeting", "goal": "decide", "time_limit": "short", "stakes": "high"
//! })).await?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! request ─▶ normalize ─▶ SpecialistDispatcher ─▶ GenerationStrategy (retry loop)
//!                               │                        │
//!                               └── generic template ◀───┘ on specialist failure
//!                                          │
//!                               ResilientPipeline (fallback) ─▶ assembler ─▶ response
//!                                                                  │
//!                                                                  └─▶ PersistenceGateway (best effort)
//!
//! request ─▶ TheoryRelevanceEngine (identity | content) ─▶ SelectionResult
//! ```

pub mod assembler;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod generation;
pub mod normalize;
pub mod prompts;
pub mod resilience;
pub mod response;
pub mod scenes;
pub mod seed;
pub mod server;
pub mod service;
pub mod strategy;
pub mod theory;
pub mod types;

#[cfg(test)]
mod test_support;

// Core types
pub use types::*;

// Entry points
pub use config::{AdvisorConfig, GenerationConfig, RetryPolicy};
pub use service::AdvisorService;

// Collaborators
pub use db::{init_db, PersistenceGateway, SqliteGateway, TheoryCatalog};
pub use generation::{GenerationParams, GenerationService, HttpGenerationClient};

// Errors
pub use error::{AdvisorError, GenerationError, PersistenceError, TransportError, ValidationError};

// Theory selection
pub use theory::{CaseMode, SelectionTables, TheoryRelevanceEngine};
