//! Core data model for directive evolution.
//!
//! A directive (the free-text system prompt steering the generation
//! backend) is the genome. An [`Individual`] is one candidate directive
//! with its fitness, per-criterion performance, and lineage; a
//! [`Generation`] is the complete fixed-size population at one step;
//! the [`PopulationStore`] accumulates generations for the life of a run
//! and is never pruned.
//!
//! Directives are immutable once an individual is created: mutation and
//! crossover always produce new individuals. The evaluator populates
//! `fitness`, `test_results`, and `performance` in place; nothing else
//! touches them.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{bail_if, Error, Result};
use crate::fitness::CriterionScores;

// =============================================================================
// TEST CASE
// =============================================================================

fn default_weight() -> f64 {
    1.0
}

fn default_kind() -> String {
    "general".to_string()
}

/// A weighted scenario a directive is scored against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique identifier.
    pub id: String,

    /// Input text sent to the backend.
    pub input: String,

    /// Category tag (e.g. "factual", "creative", "safety").
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// Keywords the response is expected to contain. May be empty.
    #[serde(default)]
    pub expected_keywords: Vec<String>,

    /// Reference content for the accuracy criterion, when available.
    #[serde(default)]
    pub expected_content: Option<String>,

    /// Positive weight applied to this case's fitness contribution.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl TestCase {
    /// Create a test case with defaults (kind "general", weight 1.0).
    pub fn new(id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            kind: default_kind(),
            expected_keywords: Vec::new(),
            expected_content: None,
            weight: default_weight(),
        }
    }

    /// Set the category tag.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the expected keywords.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.expected_keywords = keywords;
        self
    }

    /// Set the reference content for accuracy scoring.
    pub fn with_expected_content(mut self, content: impl Into<String>) -> Self {
        self.expected_content = Some(content.into());
        self
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// On-disk test case file (`[[cases]]` entries in TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TestCaseFile {
    cases: Vec<TestCase>,
}

/// Load test cases from a TOML file.
///
/// ```toml
/// [[cases]]
/// id = "greeting"
/// type = "conversational"
/// input = "Introduce yourself."
/// expected_keywords = ["assistant", "help"]
/// weight = 1.0
/// ```
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let raw = std::fs::read_to_string(path)?;
    let file: TestCaseFile = toml::from_str(&raw)
        .map_err(|e| Error::Validation(format!("invalid test case file: {}", e)))?;
    bail_if!(
        file.cases.is_empty(),
        Error::Validation("test case file contains no cases".to_string())
    );
    for case in &file.cases {
        bail_if!(
            case.weight <= 0.0,
            Error::Validation(format!("test case '{}' has non-positive weight", case.id))
        );
    }
    Ok(file.cases)
}

// =============================================================================
// PER-CRITERION PERFORMANCE
// =============================================================================

/// Aggregated per-criterion averages across an individual's test results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceProfile {
    /// Mean overall score across scored test cases.
    pub response_quality: f64,
    /// Mean relevance score.
    pub relevance: f64,
    /// Mean coherence score.
    pub coherence: f64,
    /// Mean creativity score.
    pub creativity: f64,
    /// Mean helpfulness score.
    pub helpfulness: f64,
    /// Mean safety score.
    pub safety: f64,
    /// Mean accuracy score.
    pub accuracy: f64,
    /// Mean backend call duration in milliseconds.
    pub avg_duration_ms: f64,
    /// Mean token count per backend call.
    pub avg_token_count: f64,
}

/// Outcome of running one individual against one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Id of the test case.
    pub test_case_id: String,

    /// Per-criterion scores, all zero when the call failed.
    pub scores: CriterionScores,

    /// Weighted sum of the criterion scores, in [0, 1].
    pub overall_score: f64,

    /// `overall_score * weight` - this case's fitness contribution.
    pub weighted_score: f64,

    /// Length of the backend response in characters.
    pub response_length: usize,

    /// Tokens generated by the backend.
    pub token_count: u32,

    /// Backend call duration in milliseconds.
    pub duration_ms: u64,

    /// Error message when the backend invocation failed.
    pub error: Option<String>,
}

impl TestOutcome {
    /// Outcome for a failed backend invocation: zero contribution, error
    /// recorded, evaluation of the individual continues.
    pub fn failed(test_case_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            scores: CriterionScores::default(),
            overall_score: 0.0,
            weighted_score: 0.0,
            response_length: 0,
            token_count: 0,
            duration_ms: 0,
            error: Some(message.into()),
        }
    }

    /// Whether the backend invocation failed for this case.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// =============================================================================
// INDIVIDUAL
// =============================================================================

/// One candidate directive with fitness, performance, and lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    /// Unique identifier.
    pub id: String,

    /// The directive text. Never edited in place after creation.
    pub directive: String,

    /// Fitness in [0, 1] once evaluated; 0.0 before evaluation.
    pub fitness: f64,

    /// Generation this individual belongs to.
    pub generation: usize,

    /// Ids of the 0-2 parents this individual was bred from.
    #[serde(default)]
    pub parent_ids: Vec<String>,

    /// Human-readable descriptions of the mutations applied at creation.
    #[serde(default)]
    pub applied_mutations: Vec<String>,

    /// Per-criterion averages, populated by the evaluator.
    #[serde(default)]
    pub performance: PerformanceProfile,

    /// Per-test-case outcomes, populated by the evaluator.
    #[serde(default)]
    pub test_results: Vec<TestOutcome>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Individual {
    /// Create a fresh, unevaluated individual.
    pub fn new(directive: impl Into<String>, generation: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            directive: directive.into(),
            fitness: 0.0,
            generation,
            parent_ids: Vec::new(),
            applied_mutations: Vec::new(),
            performance: PerformanceProfile::default(),
            test_results: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Record parent lineage (at most two parents).
    pub fn with_parents(mut self, parent_ids: Vec<String>) -> Self {
        debug_assert!(parent_ids.len() <= 2, "an individual has at most 2 parents");
        self.parent_ids = parent_ids;
        self
    }

    /// Record the mutation descriptions applied at creation.
    pub fn with_mutations(mut self, applied_mutations: Vec<String>) -> Self {
        self.applied_mutations = applied_mutations;
        self
    }

    /// Whether the evaluator has scored this individual.
    pub fn is_evaluated(&self) -> bool {
        !self.test_results.is_empty()
    }

    /// Brief one-line summary.
    pub fn summary(&self) -> String {
        let preview: String = self.directive.chars().take(40).collect();
        format!(
            "{} (gen {}, fitness {:.3}): {}{}",
            &self.id[..8.min(self.id.len())],
            self.generation,
            self.fitness,
            preview,
            if self.directive.chars().count() > 40 { "..." } else { "" }
        )
    }
}

// =============================================================================
// GENERATION
// =============================================================================

/// The complete, fixed-size population at one evolutionary step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generation number (0-indexed, strictly increasing by 1).
    pub number: usize,

    /// The individuals; length equals the configured population size.
    pub individuals: Vec<Individual>,

    /// Highest fitness in this generation.
    pub best_fitness: f64,

    /// Mean fitness across this generation.
    pub average_fitness: f64,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Generation {
    /// Create a generation and compute its fitness statistics.
    pub fn new(number: usize, individuals: Vec<Individual>) -> Self {
        let mut generation = Self {
            number,
            individuals,
            best_fitness: 0.0,
            average_fitness: 0.0,
            created_at: Utc::now(),
        };
        generation.recompute_stats();
        generation
    }

    /// Recompute best/average fitness from the current individuals.
    pub fn recompute_stats(&mut self) {
        if self.individuals.is_empty() {
            self.best_fitness = 0.0;
            self.average_fitness = 0.0;
            return;
        }
        self.best_fitness = self
            .individuals
            .iter()
            .map(|i| i.fitness)
            .fold(0.0, f64::max);
        self.average_fitness =
            self.individuals.iter().map(|i| i.fitness).sum::<f64>() / self.individuals.len() as f64;
    }

    /// Number of individuals.
    pub fn size(&self) -> usize {
        self.individuals.len()
    }

    /// The fittest individual of this generation.
    pub fn best_individual(&self) -> Option<&Individual> {
        self.individuals.iter().max_by(|a, b| {
            a.fitness
                .partial_cmp(&b.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Brief one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Generation {}: {} individuals, best {:.3}, avg {:.3}",
            self.number,
            self.individuals.len(),
            self.best_fitness,
            self.average_fitness
        )
    }
}

// =============================================================================
// EVOLUTION METRICS
// =============================================================================

/// Run-level metrics, recomputed after each evolutionary step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionMetrics {
    /// Number of generations in the store (including generation zero).
    pub total_generations: usize,

    /// Best fitness of the most recent generation.
    pub best_fitness: f64,

    /// Average fitness of the most recent generation.
    pub average_fitness: f64,

    /// Relative change of best fitness vs. the previously recorded value.
    /// Negative when the latest generation regressed.
    pub improvement_rate: f64,

    /// When the last evolutionary step completed.
    pub last_evolution: Option<DateTime<Utc>>,
}

impl EvolutionMetrics {
    /// Fold a newly appended generation into the metrics.
    pub fn record(&mut self, generation: &Generation, total_generations: usize) {
        let previous_best = self.best_fitness;
        self.best_fitness = generation.best_fitness;
        self.average_fitness = generation.average_fitness;
        self.improvement_rate = if previous_best > 0.0 {
            (generation.best_fitness - previous_best) / previous_best
        } else {
            generation.best_fitness
        };
        self.total_generations = total_generations;
        self.last_evolution = Some(Utc::now());
    }
}

// =============================================================================
// POPULATION STORE
// =============================================================================

/// Append-only store of every generation in the run, indexed 0..N.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopulationStore {
    generations: Vec<Generation>,
}

impl PopulationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously exported generations.
    pub fn from_generations(generations: Vec<Generation>) -> Self {
        Self { generations }
    }

    /// Append a generation.
    pub fn push(&mut self, generation: Generation) {
        debug_assert_eq!(
            generation.number,
            self.generations.len(),
            "generation numbers must increase strictly by 1"
        );
        self.generations.push(generation);
    }

    /// The most recently appended generation.
    pub fn current(&self) -> Option<&Generation> {
        self.generations.last()
    }

    /// Mutable access to the most recent generation (evaluation writes
    /// fitness in place).
    pub fn current_mut(&mut self) -> Option<&mut Generation> {
        self.generations.last_mut()
    }

    /// A generation by number.
    pub fn get(&self, number: usize) -> Option<&Generation> {
        self.generations.get(number)
    }

    /// Number of stored generations.
    pub fn len(&self) -> usize {
        self.generations.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// Discard all generations.
    pub fn clear(&mut self) {
        self.generations.clear();
    }

    /// Iterate generations oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Generation> {
        self.generations.iter()
    }

    /// Best-of-run: the highest-fitness individual across **all**
    /// generations, not just the latest. Earliest wins ties.
    pub fn best_individual(&self) -> Option<&Individual> {
        let mut best: Option<&Individual> = None;
        for generation in &self.generations {
            for individual in &generation.individuals {
                match best {
                    Some(current) if individual.fitness <= current.fitness => {}
                    _ => best = Some(individual),
                }
            }
        }
        best
    }
}

// =============================================================================
// TESTS
// =============================================================================
