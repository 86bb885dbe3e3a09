//! Integration tests for the evolution engine.
//!
//! These tests drive the full engine loop against a scripted mock backend:
//! lifecycle state machine, generation mechanics (elitism, fixed
//! population size), directive-slot discipline, partial failure recovery,
//! cancellation, events, and the export round-trip.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use telos::backend::{GenerationBackend, GenerationOptions, GenerationResponse};
use telos::model::TestCase;
use telos::{EngineState, Error, EvolutionConfig, EvolutionEngine, EvolutionExport, Result};

// ============================================================================
// Mock Backend
// ============================================================================

/// Record of one generate call: the directive active at call time and the
/// input it was asked about.
type CallLog = Arc<Mutex<Vec<(String, String)>>>;

/// Scripted backend. Answers echo the active directive, so responses (and
/// therefore fitness) genuinely depend on which directive was swapped in.
struct MockBackend {
    active: String,
    fail_inputs: HashSet<String>,
    log: CallLog,
}

impl MockBackend {
    fn new() -> (Self, CallLog) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                active: String::new(),
                fail_inputs: HashSet::new(),
                log: Arc::clone(&log),
            },
            log,
        )
    }

    fn failing_on(mut self, input: &str) -> Self {
        self.fail_inputs.insert(input.to_string());
        self
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn active_directive(&self) -> String {
        self.active.clone()
    }

    fn set_active_directive(&mut self, directive: &str) {
        self.active = directive.to_string();
    }

    async fn generate(
        &self,
        input: &str,
        _options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        self.log
            .lock()
            .unwrap()
            .push((self.active.clone(), input.to_string()));

        if self.fail_inputs.contains(input) {
            return Err(Error::BackendInvocation("scripted failure".to_string()));
        }

        let content = format!("{} In response to: {}", self.active, input);
        Ok(GenerationResponse {
            token_count: content.split_whitespace().count() as u32,
            duration_ms: 1,
            content,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

const BASE_DIRECTIVE: &str = "You are a helpful assistant. Answer clearly and honestly.";

fn test_config() -> EvolutionConfig {
    EvolutionConfig::default()
        .with_population_size(4)
        .with_elite_size(2)
        .with_seed(42)
}

fn test_cases() -> Vec<TestCase> {
    vec![
        TestCase::new("greet", "Introduce yourself.")
            .with_keywords(vec!["helpful".into(), "assistant".into()]),
        TestCase::new("fact", "What do you value?")
            .with_kind("values")
            .with_expected_content("clarity and honesty")
            .with_weight(1.0),
    ]
}

fn engine_with_mock() -> (EvolutionEngine, CallLog) {
    let (backend, log) = MockBackend::new();
    (EvolutionEngine::new(test_config(), Box::new(backend)), log)
}

// ============================================================================
// Initialization
// ============================================================================

mod initialization {
    use super::*;

    #[test]
    fn seeds_exact_copy_plus_mutants() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();

        assert_eq!(engine.state(), EngineState::Initialized);
        assert_eq!(engine.generation_count(), 1);

        let generation = engine.current_generation().unwrap();
        assert_eq!(generation.number, 0);
        assert_eq!(generation.size(), 4);

        // The elite seed is byte-identical to the base directive.
        assert_eq!(generation.individuals[0].directive, BASE_DIRECTIVE);
        assert!(generation.individuals[0].applied_mutations.is_empty());

        // Mutation is additive, so every variant still starts with the base.
        for individual in &generation.individuals {
            assert!(individual.directive.starts_with(BASE_DIRECTIVE));
            assert_eq!(individual.fitness, 0.0);
            assert_eq!(individual.generation, 0);
        }
    }

    #[test]
    fn rejects_empty_directive() {
        let (mut engine, _log) = engine_with_mock();
        assert!(engine.initialize_evolution("   ").is_err());
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn rejects_invalid_config() {
        let (backend, _log) = MockBackend::new();
        let config = EvolutionConfig::default()
            .with_population_size(4)
            .with_elite_size(9);
        let mut engine = EvolutionEngine::new(config, Box::new(backend));
        let err = engine.initialize_evolution(BASE_DIRECTIVE).unwrap_err();
        assert_eq!(err.code(), "E001");
        assert_eq!(engine.generation_count(), 0);
    }

    #[test]
    fn reinitialize_replaces_population() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.initialize_evolution("A different base.").unwrap();
        assert_eq!(engine.generation_count(), 1);
        assert_eq!(
            engine.current_generation().unwrap().individuals[0].directive,
            "A different base."
        );
    }
}

// ============================================================================
// Lifecycle state machine
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn evolve_before_start_is_silent_noop() {
        let (mut engine, log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();

        let result = engine.evolve_generation(&test_cases()).await.unwrap();
        assert!(result.is_none());

        // Nothing mutated, nothing called.
        assert_eq!(engine.generation_count(), 1);
        assert_eq!(engine.metrics().total_generations, 1);
        assert_eq!(engine.metrics().best_fitness, 0.0);
        assert!(engine.metrics().last_evolution.is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn start_requires_initialized() {
        let (mut engine, _log) = engine_with_mock();
        let err = engine.start_evolution().unwrap_err();
        assert_eq!(err.code(), "E010");
    }

    #[tokio::test]
    async fn stop_retains_data_and_restart_resumes() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        engine.stop_evolution().unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.generation_count(), 2);

        // Stopped engines ignore evolve calls.
        let result = engine.evolve_generation(&test_cases()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(engine.generation_count(), 2);

        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();
        assert_eq!(engine.generation_count(), 3);
    }

    #[tokio::test]
    async fn reset_discards_everything() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        engine.reset_evolution();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.generation_count(), 0);
        assert_eq!(engine.metrics().total_generations, 0);
        assert!(engine.best_individual().is_none());
    }
}

// ============================================================================
// Evolution mechanics
// ============================================================================

mod evolution {
    use super::*;

    #[tokio::test]
    async fn every_generation_has_fixed_size_and_unit_fitness() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();

        let cases = test_cases();
        for _ in 0..3 {
            engine.evolve_generation(&cases).await.unwrap();
        }

        assert_eq!(engine.generation_count(), 4);
        for generation in engine.store().iter() {
            assert_eq!(generation.size(), 4);
            for individual in &generation.individuals {
                assert!(
                    (0.0..=1.0).contains(&individual.fitness),
                    "fitness {} out of range",
                    individual.fitness
                );
            }
        }

        // Generation numbers increase strictly by one.
        let numbers: Vec<usize> = engine.store().iter().map(|g| g.number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn elites_are_carried_forward_unchanged() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        let previous = engine.store().get(0).unwrap();
        let current = engine.store().get(1).unwrap();

        // The first elite_size individuals of the new generation are exact
        // copies of their predecessors: same id, byte-identical directive,
        // unchanged fitness - only the generation tag moved.
        for elite in current.individuals.iter().take(2) {
            let ancestor = previous
                .individuals
                .iter()
                .find(|i| i.id == elite.id)
                .expect("elite id must exist in the previous generation");
            assert_eq!(elite.directive, ancestor.directive);
            assert_eq!(elite.fitness, ancestor.fitness);
            assert_eq!(elite.generation, 1);
        }

        // Elites are the fittest of the evaluated previous generation.
        let mut fitnesses: Vec<f64> = previous.individuals.iter().map(|i| i.fitness).collect();
        fitnesses.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(current.individuals[0].fitness, fitnesses[0]);
    }

    #[tokio::test]
    async fn offspring_record_lineage() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        let previous_ids: HashSet<String> = engine
            .store()
            .get(0)
            .unwrap()
            .individuals
            .iter()
            .map(|i| i.id.clone())
            .collect();

        let current = engine.store().get(1).unwrap();
        for offspring in current.individuals.iter().skip(2) {
            assert!(!offspring.parent_ids.is_empty());
            assert!(offspring.parent_ids.len() <= 2);
            for parent_id in &offspring.parent_ids {
                assert!(previous_ids.contains(parent_id));
            }
            // Offspring are unevaluated until the next step.
            assert_eq!(offspring.fitness, 0.0);
        }
    }

    #[tokio::test]
    async fn best_individual_is_best_of_run() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();

        let cases = test_cases();
        for _ in 0..3 {
            engine.evolve_generation(&cases).await.unwrap();
        }

        let best = engine.best_individual().unwrap();
        let max_seen = engine
            .store()
            .iter()
            .flat_map(|g| g.individuals.iter())
            .map(|i| i.fitness)
            .fold(0.0, f64::max);
        assert_eq!(best.fitness, max_seen);
    }

    #[tokio::test]
    async fn metrics_track_latest_generation() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();

        let generation = engine
            .evolve_generation(&test_cases())
            .await
            .unwrap()
            .unwrap();
        let metrics = engine.metrics();
        assert_eq!(metrics.total_generations, 2);
        assert_eq!(metrics.best_fitness, generation.best_fitness);
        assert_eq!(metrics.average_fitness, generation.average_fitness);
        assert!(metrics.last_evolution.is_some());
        // First recorded improvement equals the best fitness itself.
        assert_eq!(metrics.improvement_rate, generation.best_fitness);
    }
}

// ============================================================================
// Directive slot discipline
// ============================================================================

mod directive_slot {
    use super::*;

    #[tokio::test]
    async fn active_directive_restored_after_evolve() {
        let (mut backend, _log) = MockBackend::new();
        backend.set_active_directive("dashboard production directive");
        let mut engine = EvolutionEngine::new(test_config(), Box::new(backend));

        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        assert_eq!(
            engine.backend().active_directive(),
            "dashboard production directive"
        );
    }

    #[tokio::test]
    async fn active_directive_restored_even_when_calls_fail() {
        let (backend, _log) = MockBackend::new();
        let mut backend = backend.failing_on("Introduce yourself.");
        backend.set_active_directive("dashboard production directive");
        let mut engine = EvolutionEngine::new(test_config(), Box::new(backend));

        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        assert_eq!(
            engine.backend().active_directive(),
            "dashboard production directive"
        );
    }

    #[tokio::test]
    async fn generate_calls_run_under_the_individuals_directive() {
        let (mut engine, log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        let directives: HashSet<String> = engine
            .store()
            .get(0)
            .unwrap()
            .individuals
            .iter()
            .map(|i| i.directive.clone())
            .collect();

        let log = log.lock().unwrap();
        // 4 individuals x 2 cases, sequentially.
        assert_eq!(log.len(), 8);
        for (active_at_call, _input) in log.iter() {
            assert!(
                directives.contains(active_at_call),
                "a generate call ran under a foreign directive"
            );
        }
    }

    #[tokio::test]
    async fn failed_case_scores_zero_but_evaluation_continues() {
        let (backend, _log) = MockBackend::new();
        let backend = backend.failing_on("Introduce yourself.");
        let mut engine = EvolutionEngine::new(test_config(), Box::new(backend));

        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        let evaluated = engine.store().get(0).unwrap();
        for individual in &evaluated.individuals {
            assert_eq!(individual.test_results.len(), 2);

            let failed = &individual.test_results[0];
            assert!(failed.is_error());
            assert_eq!(failed.weighted_score, 0.0);

            let succeeded = &individual.test_results[1];
            assert!(!succeeded.is_error());
            assert!(succeeded.overall_score > 0.0);

            // Mean over both cases: half the successful contribution.
            let expected = succeeded.weighted_score / 2.0;
            assert!((individual.fitness - expected).abs() < 1e-9);
        }
    }
}

// ============================================================================
// Cancellation
// ============================================================================

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancelled_step_leaves_run_untouched() {
        let (mut engine, log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();

        engine.cancel_flag().cancel();
        let err = engine.evolve_generation(&test_cases()).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        assert_eq!(engine.generation_count(), 1);
        assert!(log.lock().unwrap().is_empty());
        for individual in &engine.current_generation().unwrap().individuals {
            assert_eq!(individual.fitness, 0.0);
            assert!(individual.test_results.is_empty());
        }
    }

    #[tokio::test]
    async fn reset_clears_cancellation() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.cancel_flag().cancel();
        engine.reset_evolution();

        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        let result = engine.evolve_generation(&test_cases()).await.unwrap();
        assert!(result.is_some());
    }
}

// ============================================================================
// Events
// ============================================================================

mod events {
    use super::*;

    #[tokio::test]
    async fn lifecycle_emits_events_in_order() {
        let (mut engine, _log) = engine_with_mock();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _subscription = engine.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.kind.to_string());
        });

        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();
        engine.apply_best_directive().unwrap();
        engine.stop_evolution().unwrap();
        engine.reset_evolution();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                "evolution_initialized",
                "evolution_started",
                "generation_evolved",
                "system_prompt_updated",
                "evolution_stopped",
                "evolution_reset",
            ]
        );
    }

    #[tokio::test]
    async fn generation_evolved_carries_metrics() {
        let (mut engine, _log) = engine_with_mock();
        let payload: Arc<Mutex<serde_json::Value>> =
            Arc::new(Mutex::new(serde_json::Value::Null));
        let payload_clone = Arc::clone(&payload);
        let _subscription = engine.subscribe(move |event| {
            if event.kind.as_str() == "generation_evolved" {
                *payload_clone.lock().unwrap() = event.data.clone();
            }
        });

        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        let payload = payload.lock().unwrap();
        assert_eq!(payload["generation"], 1);
        assert!(payload["best_fitness"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn apply_best_writes_backend_slot() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        let applied = engine.apply_best_directive().unwrap();
        assert_eq!(engine.backend().active_directive(), applied);
        assert_eq!(applied, engine.best_individual().unwrap().directive);
    }
}

// ============================================================================
// Export round-trip
// ============================================================================

mod export {
    use super::*;

    #[tokio::test]
    async fn export_round_trips_through_json_file() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        let cases = test_cases();
        engine.evolve_generation(&cases).await.unwrap();
        engine.evolve_generation(&cases).await.unwrap();

        let export = engine.export_evolution_data();
        assert_eq!(export.generations.len(), 3);
        assert_eq!(export.history.len(), 3);

        // Through the filesystem, as the dashboard's persistence layer
        // would consume it.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, serde_json::to_string_pretty(&export).unwrap()).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let restored_export: EvolutionExport = serde_json::from_str(&raw).unwrap();

        let (backend, _log2) = MockBackend::new();
        let restored = EvolutionEngine::from_export(restored_export, Box::new(backend)).unwrap();

        assert_eq!(restored.state(), EngineState::Stopped);
        assert_eq!(restored.generation_count(), engine.generation_count());
        assert_eq!(
            restored.metrics().best_fitness,
            engine.metrics().best_fitness
        );

        // Ids, fitness values, and parent linkage reconstruct exactly.
        for (original, round_tripped) in engine.store().iter().zip(restored.store().iter()) {
            assert_eq!(original.number, round_tripped.number);
            for (a, b) in original
                .individuals
                .iter()
                .zip(round_tripped.individuals.iter())
            {
                assert_eq!(a.id, b.id);
                assert_eq!(a.fitness, b.fitness);
                assert_eq!(a.parent_ids, b.parent_ids);
                assert_eq!(a.directive, b.directive);
            }
        }
    }

    #[tokio::test]
    async fn restored_engine_can_continue_evolving() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        engine.start_evolution().unwrap();
        engine.evolve_generation(&test_cases()).await.unwrap();

        let export = engine.export_evolution_data();
        let (backend, _log2) = MockBackend::new();
        let mut restored = EvolutionEngine::from_export(export, Box::new(backend)).unwrap();

        restored.start_evolution().unwrap();
        let generation = restored
            .evolve_generation(&test_cases())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(generation.number, 2);
    }

    #[test]
    fn rejects_non_contiguous_generations() {
        let (mut engine, _log) = engine_with_mock();
        engine.initialize_evolution(BASE_DIRECTIVE).unwrap();
        let mut export = engine.export_evolution_data();
        export.generations[0].number = 5;

        let (backend, _log2) = MockBackend::new();
        let err = EvolutionEngine::from_export(export, Box::new(backend)).unwrap_err();
        assert_eq!(err.code(), "E031");
    }

    #[test]
    fn empty_export_restores_uninitialized() {
        let (engine, _log) = engine_with_mock();
        let export = engine.export_evolution_data();
        let (backend, _log2) = MockBackend::new();
        let restored = EvolutionEngine::from_export(export, Box::new(backend)).unwrap();
        assert_eq!(restored.state(), EngineState::Uninitialized);
    }
}
