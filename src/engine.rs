//! # Evolution Engine
//!
//! The generation controller. Orchestrates one evolutionary step -
//! evaluate -> select -> reproduce -> replace - over the population store,
//! and owns the run's lifecycle state machine:
//!
//! ```text
//! Uninitialized -> Initialized -> Active <-> (evolve loop)
//!                       ^            |
//!                       |            v
//!                    [reset] <-- Stopped
//! ```
//!
//! One step evaluates every individual of the current generation against
//! the supplied test cases, carries the top `elite_size` individuals
//! forward unchanged, and fills the remainder through tournament
//! selection, crossover, and mutation. Generations accumulate in the
//! store and are never deleted short of a full reset.
//!
//! The engine is an explicitly constructed value - callers create one per
//! run and pass it where it is needed; there is no process-wide instance.
//! All backend traffic flows through the engine's exclusively owned
//! backend handle, which serializes every swap-invoke-restore sequence by
//! construction.
//!
//! ## Example
//!
//! ```rust,ignore
//! use telos::{EvolutionConfig, EvolutionEngine};
//! use telos::backend::OllamaBackend;
//! use telos::model::TestCase;
//!
//! let backend = Box::new(OllamaBackend::new());
//! let mut engine = EvolutionEngine::new(EvolutionConfig::default().with_seed(7), backend);
//!
//! engine.initialize_evolution("You are a helpful assistant.")?;
//! engine.start_evolution()?;
//!
//! let cases = vec![TestCase::new("greet", "Introduce yourself.")];
//! for _ in 0..5 {
//!     engine.evolve_generation(&cases).await?;
//! }
//! println!("best: {}", engine.best_individual().unwrap().summary());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::backend::GenerationBackend;
use crate::bus::{EventBus, EventKind, Subscription};
use crate::config::EvolutionConfig;
use crate::crossover::CrossoverOperator;
use crate::error::{bail_if, Error, Result};
use crate::fitness::FitnessEvaluator;
use crate::model::{EvolutionMetrics, Generation, Individual, PopulationStore, TestCase};
use crate::mutation::MutationOperator;
use crate::random::SeededRng;

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// No population exists.
    Uninitialized,
    /// Generation zero is seeded; evolution has not begun.
    Initialized,
    /// `evolve_generation` steps are accepted.
    Active,
    /// Evolution paused; all data retained.
    Stopped,
}

impl EngineState {
    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initialized => "Initialized",
            Self::Active => "Active",
            Self::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Cooperative cancellation signal, checked between backend calls.
///
/// Cancelling aborts the in-flight `evolve_generation` with
/// [`Error::Cancelled`] before any store or metrics mutation, so a
/// cancelled step leaves the run exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag for a new run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// EXPORT SNAPSHOT
// =============================================================================

/// Per-generation fitness series included in exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub number: usize,
    pub best_fitness: f64,
    pub average_fitness: f64,
}

/// Serializable snapshot of a run, consumable by persistence or
/// inspection layers and re-ingestable via [`EvolutionEngine::from_export`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionExport {
    /// Every generation, oldest first.
    pub generations: Vec<Generation>,

    /// Run metrics at export time.
    pub metrics: EvolutionMetrics,

    /// The configuration the run was started with.
    pub parameters: EvolutionConfig,

    /// Best/average fitness per generation.
    pub history: Vec<GenerationSummary>,

    /// Export timestamp.
    pub exported_at: DateTime<Utc>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// The evolutionary directive-optimization engine.
pub struct EvolutionEngine {
    config: EvolutionConfig,
    state: EngineState,
    store: PopulationStore,
    metrics: EvolutionMetrics,
    rng: SeededRng,
    mutation: MutationOperator,
    crossover: CrossoverOperator,
    evaluator: FitnessEvaluator,
    bus: EventBus,
    backend: Box<dyn GenerationBackend>,
    cancel: CancelFlag,
}

impl EvolutionEngine {
    /// Create an engine over the given backend. The configuration is
    /// validated at [`initialize_evolution`](Self::initialize_evolution).
    pub fn new(config: EvolutionConfig, backend: Box<dyn GenerationBackend>) -> Self {
        let rng = match config.seed {
            Some(seed) => SeededRng::new(seed),
            None => SeededRng::from_entropy(),
        };
        let evaluator = FitnessEvaluator::new(config.generation.clone());
        Self {
            config,
            state: EngineState::Uninitialized,
            store: PopulationStore::new(),
            metrics: EvolutionMetrics::default(),
            rng,
            mutation: MutationOperator::new(),
            crossover: CrossoverOperator::new(),
            evaluator,
            bus: EventBus::new(),
            backend,
            cancel: CancelFlag::new(),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The run configuration.
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Current run metrics.
    pub fn metrics(&self) -> &EvolutionMetrics {
        &self.metrics
    }

    /// The most recently appended generation.
    pub fn current_generation(&self) -> Option<&Generation> {
        self.store.current()
    }

    /// Number of stored generations.
    pub fn generation_count(&self) -> usize {
        self.store.len()
    }

    /// Best-of-run individual across **all** generations.
    pub fn best_individual(&self) -> Option<&Individual> {
        self.store.best_individual()
    }

    /// The population store.
    pub fn store(&self) -> &PopulationStore {
        &self.store
    }

    /// Read access to the backend (e.g. to inspect its active directive).
    pub fn backend(&self) -> &dyn GenerationBackend {
        self.backend.as_ref()
    }

    /// Subscribe to engine lifecycle events.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&crate::bus::EngineEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    /// A handle for cancelling in-flight evolution steps.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Seed generation zero from a base directive.
    ///
    /// Generation zero holds one exact copy of `base_directive` (the
    /// elite seed) plus `population_size - 1` variants mutated at the
    /// reduced seed rate. Valid from any state; replaces any existing
    /// population.
    pub fn initialize_evolution(&mut self, base_directive: &str) -> Result<()> {
        self.config.validate()?;
        bail_if!(
            base_directive.trim().is_empty(),
            Error::Validation("base directive must not be empty".to_string())
        );

        self.cancel.reset();
        self.store.clear();

        let mut individuals = Vec::with_capacity(self.config.population_size);
        individuals.push(Individual::new(base_directive, 0));
        while individuals.len() < self.config.population_size {
            let outcome =
                self.mutation
                    .mutate(&mut self.rng, base_directive, self.config.seed_mutation_rate);
            let descriptions = outcome.descriptions();
            individuals
                .push(Individual::new(outcome.directive, 0).with_mutations(descriptions));
        }

        self.store.push(Generation::new(0, individuals));
        self.metrics = EvolutionMetrics {
            total_generations: 1,
            ..EvolutionMetrics::default()
        };
        self.state = EngineState::Initialized;

        info!(
            "evolution initialized: population {} from {}-char base directive",
            self.config.population_size,
            base_directive.len()
        );
        self.bus.emit(
            EventKind::EvolutionInitialized,
            json!({
                "population_size": self.config.population_size,
                "directive_length": base_directive.len(),
            }),
        );
        Ok(())
    }

    /// Begin accepting `evolve_generation` steps.
    pub fn start_evolution(&mut self) -> Result<()> {
        match self.state {
            EngineState::Initialized | EngineState::Stopped => {
                self.state = EngineState::Active;
                info!("evolution started");
                self.bus.emit(EventKind::EvolutionStarted, json!({}));
                Ok(())
            }
            state => Err(Error::state("start evolution", state)),
        }
    }

    /// Pause evolution, retaining all data.
    pub fn stop_evolution(&mut self) -> Result<()> {
        match self.state {
            EngineState::Active => {
                self.state = EngineState::Stopped;
                info!("evolution stopped after {} generations", self.store.len());
                self.bus.emit(
                    EventKind::EvolutionStopped,
                    json!({ "total_generations": self.store.len() }),
                );
                Ok(())
            }
            state => Err(Error::state("stop evolution", state)),
        }
    }

    /// Discard all generations and metrics and return to Uninitialized.
    pub fn reset_evolution(&mut self) {
        self.store.clear();
        self.metrics = EvolutionMetrics::default();
        self.state = EngineState::Uninitialized;
        self.cancel.reset();
        info!("evolution reset");
        self.bus.emit(EventKind::EvolutionReset, json!({}));
    }

    // =========================================================================
    // EVOLUTION STEP
    // =========================================================================

    /// Run one evolutionary step: evaluate, select, reproduce, replace.
    ///
    /// Returns `Ok(None)` without touching any state when the engine is
    /// not Active - callers polling from a UI treat that as "nothing to
    /// do" rather than an error. When Active, returns the newly appended
    /// generation.
    pub async fn evolve_generation(
        &mut self,
        test_cases: &[TestCase],
    ) -> Result<Option<Generation>> {
        if self.state != EngineState::Active {
            debug!("evolve_generation ignored in state {}", self.state);
            return Ok(None);
        }
        bail_if!(
            test_cases.is_empty(),
            Error::Validation("evolve_generation requires at least one test case".to_string())
        );

        let cancel = self.cancel.clone();
        let current_number = self
            .store
            .current()
            .map(|g| g.number)
            .ok_or_else(|| Error::state("evolve generation", self.state))?;

        // Evaluate a working copy; the store is only touched once the whole
        // generation has been scored, so cancellation mid-evaluation leaves
        // the run untouched.
        let mut evaluated = self
            .store
            .current()
            .map(|g| g.individuals.clone())
            .unwrap_or_default();
        for individual in evaluated.iter_mut() {
            self.evaluator
                .evaluate(individual, test_cases, self.backend.as_mut(), &cancel)
                .await?;
        }

        if let Some(current) = self.store.current_mut() {
            current.individuals = evaluated.clone();
            current.recompute_stats();
        }

        // Rank a copy; the stored generation keeps its original order.
        let mut ranked = evaluated.clone();
        ranked.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let next_number = current_number + 1;
        let mut next_individuals: Vec<Individual> =
            Vec::with_capacity(self.config.population_size);

        // Elites carry over byte-identical: same id, directive, fitness,
        // and performance; only the generation tag advances.
        for elite in ranked.iter().take(self.config.elite_size) {
            let mut carried = elite.clone();
            carried.generation = next_number;
            next_individuals.push(carried);
        }

        while next_individuals.len() < self.config.population_size {
            let parent1 = tournament(&mut self.rng, &evaluated, self.config.tournament_size);
            let parent2 = tournament(&mut self.rng, &evaluated, self.config.tournament_size);

            let (mut directive, parent_ids) = if self.rng.roll(self.config.crossover_rate) {
                (
                    self.crossover
                        .crossover(&mut self.rng, &parent1.directive, &parent2.directive),
                    vec![parent1.id.clone(), parent2.id.clone()],
                )
            } else {
                (parent1.directive.clone(), vec![parent1.id.clone()])
            };

            let mut mutation_descriptions = Vec::new();
            if self.rng.roll(self.config.mutation_rate) {
                let outcome =
                    self.mutation
                        .mutate(&mut self.rng, &directive, self.config.mutation_rate);
                mutation_descriptions = outcome.descriptions();
                directive = outcome.directive;
            }

            next_individuals.push(
                Individual::new(directive, next_number)
                    .with_parents(parent_ids)
                    .with_mutations(mutation_descriptions),
            );
        }

        let generation = Generation::new(next_number, next_individuals);
        self.store.push(generation.clone());
        self.metrics.record(&generation, self.store.len());

        info!(
            "generation {} evolved: best {:.3}, avg {:.3}, improvement {:+.3}",
            generation.number,
            self.metrics.best_fitness,
            self.metrics.average_fitness,
            self.metrics.improvement_rate
        );
        self.bus.emit(
            EventKind::GenerationEvolved,
            json!({
                "generation": generation.number,
                "best_fitness": self.metrics.best_fitness,
                "average_fitness": self.metrics.average_fitness,
                "improvement_rate": self.metrics.improvement_rate,
            }),
        );

        Ok(Some(generation))
    }

    // =========================================================================
    // BEST DIRECTIVE & EXPORT
    // =========================================================================

    /// Write the best-of-run directive into the backend's active slot.
    pub fn apply_best_directive(&mut self) -> Result<String> {
        let (directive, id, fitness) = {
            let best = self
                .best_individual()
                .ok_or_else(|| Error::Validation("no individuals to apply".to_string()))?;
            (best.directive.clone(), best.id.clone(), best.fitness)
        };

        self.backend.set_active_directive(&directive);
        info!("applied best directive {} (fitness {:.3})", id, fitness);
        self.bus.emit(
            EventKind::SystemPromptUpdated,
            json!({
                "individual_id": id,
                "fitness": fitness,
                "directive_length": directive.len(),
            }),
        );
        Ok(directive)
    }

    /// Snapshot the run for persistence or inspection.
    pub fn export_evolution_data(&self) -> EvolutionExport {
        EvolutionExport {
            generations: self.store.iter().cloned().collect(),
            metrics: self.metrics.clone(),
            parameters: self.config.clone(),
            history: self
                .store
                .iter()
                .map(|g| GenerationSummary {
                    number: g.number,
                    best_fitness: g.best_fitness,
                    average_fitness: g.average_fitness,
                })
                .collect(),
            exported_at: Utc::now(),
        }
    }

    /// Rebuild an engine from an exported snapshot.
    ///
    /// Individual ids, fitness values, and parent linkage are restored
    /// exactly. The engine comes back Stopped (or Uninitialized for an
    /// empty export); call [`start_evolution`](Self::start_evolution) to
    /// continue the run.
    pub fn from_export(
        export: EvolutionExport,
        backend: Box<dyn GenerationBackend>,
    ) -> Result<Self> {
        export.parameters.validate()?;
        for (index, generation) in export.generations.iter().enumerate() {
            bail_if!(
                generation.number != index,
                Error::Export(format!(
                    "generation numbering is not contiguous at index {}",
                    index
                ))
            );
        }

        let state = if export.generations.is_empty() {
            EngineState::Uninitialized
        } else {
            EngineState::Stopped
        };

        let mut engine = Self::new(export.parameters, backend);
        engine.store = PopulationStore::from_generations(export.generations);
        engine.metrics = export.metrics;
        engine.state = state;
        Ok(engine)
    }
}

impl std::fmt::Debug for EvolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionEngine")
            .field("state", &self.state)
            .field("generations", &self.store.len())
            .field("best_fitness", &self.metrics.best_fitness)
            .finish()
    }
}

// =============================================================================
// TOURNAMENT SELECTION
// =============================================================================

/// Sample `k` individuals uniformly with replacement; keep the fittest.
fn tournament<'a>(
    rng: &mut SeededRng,
    population: &'a [Individual],
    k: usize,
) -> &'a Individual {
    let mut best = &population[rng.index(population.len())];
    for _ in 1..k {
        let challenger = &population[rng.index(population.len())];
        if challenger.fitness > best.fitness {
            best = challenger;
        }
    }
    best
}

// =============================================================================
// TESTS
// =============================================================================
