//! # Telos
//!
//! Evolutionary directive optimization for generative text backends.
//!
//! A *directive* - the free-text system prompt steering a generation
//! backend - is treated as a genome. Telos maintains a population of
//! variant directives across generations, scores them against weighted
//! test cases by driving the backend, and breeds better directives
//! through elitism, tournament selection, crossover, and additive
//! mutation.
//!
//! ## Architecture
//!
//! ```text
//! +------------------+     +------------------+     +------------------+
//! |  Population      | --> | Fitness          | --> |   Selection      |
//! |  Store           |     | Evaluator        |     | (Tournament)     |
//! +------------------+     +---------+--------+     +---------+--------+
//!          ^                         |                        |
//!          |                         v                        v
//! +--------+---------+     +------------------+     +------------------+
//! |   Next           | <-- |  Generation      | <-- |  Crossover +     |
//! |   Generation     |     |  Backend         |     |  Mutation        |
//! +------------------+     +------------------+     +------------------+
//! ```
//!
//! The [`engine::EvolutionEngine`] drives the loop and publishes
//! lifecycle events on its [`bus::EventBus`]; the
//! [`backend::GenerationBackend`] trait abstracts the scored model
//! service (an Ollama client ships in [`backend::ollama`]).
//!
//! Scoring is heuristic by design - keyword containment, length proxies,
//! fixed vocabulary lists - and those heuristics are part of the engine's
//! observable behavior.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use telos::backend::OllamaBackend;
//! use telos::model::TestCase;
//! use telos::{EvolutionConfig, EvolutionEngine};
//!
//! #[tokio::main]
//! async fn main() -> telos::Result<()> {
//!     let backend = Box::new(OllamaBackend::new());
//!     let mut engine = EvolutionEngine::new(EvolutionConfig::default(), backend);
//!
//!     engine.initialize_evolution("You are a helpful assistant.")?;
//!     engine.start_evolution()?;
//!
//!     let cases = vec![
//!         TestCase::new("greet", "Introduce yourself.")
//!             .with_keywords(vec!["assistant".into()]),
//!     ];
//!     for _ in 0..5 {
//!         engine.evolve_generation(&cases).await?;
//!     }
//!
//!     println!("{}", engine.best_individual().unwrap().summary());
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod backend;
pub mod bus;
pub mod config;
pub mod crossover;
pub mod engine;
pub mod error;
pub mod fitness;
pub mod model;
pub mod mutation;
pub mod random;
pub mod tracing_setup;

// ============================================================================
// Type Aliases
// ============================================================================

/// Type alias for fitness and criterion scores (0.0 - 1.0 range).
pub type Score = f64;

/// Type alias for individual identifiers.
pub type IndividualId = String;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{GenerationBackend, GenerationOptions, GenerationResponse, OllamaBackend};
pub use bus::{EngineEvent, EventBus, EventKind, Subscription};
pub use config::EvolutionConfig;
pub use engine::{CancelFlag, EngineState, EvolutionEngine, EvolutionExport};
pub use error::{Error, Result};
pub use fitness::{CriterionScores, CriterionWeights, FitnessEvaluator};
pub use model::{
    EvolutionMetrics, Generation, Individual, PerformanceProfile, PopulationStore, TestCase,
    TestOutcome,
};
pub use mutation::{MutationOperator, MutationStrategy};
pub use random::SeededRng;
pub use tracing_setup::{setup_logging, should_use_json};
