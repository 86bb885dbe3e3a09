//! Configuration for the evolution engine.
//!
//! [`EvolutionConfig`] holds every tunable parameter of a run. Values can
//! come from defaults, a preset, builder-style setters, or a TOML file in
//! the user config directory.
//!
//! # Example Configuration File
//!
//! ```toml
//! population_size = 8
//! elite_size = 2
//! mutation_rate = 0.3
//! crossover_rate = 0.7
//! tournament_size = 3
//! seed_mutation_rate = 0.2
//!
//! [generation]
//! temperature = 0.7
//! max_tokens = 512
//! ```
//!
//! Invalid parameter combinations are rejected by [`EvolutionConfig::validate`],
//! which the engine calls before seeding generation zero - a bad config
//! fails fast instead of corrupting a run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::GenerationOptions;
use crate::error::{bail_if, Error, Result};

// =============================================================================
// DEFAULTS
// =============================================================================

fn default_population_size() -> usize {
    8
}

fn default_elite_size() -> usize {
    2
}

fn default_mutation_rate() -> f64 {
    0.3
}

fn default_crossover_rate() -> f64 {
    0.7
}

fn default_tournament_size() -> usize {
    3
}

fn default_seed_mutation_rate() -> f64 {
    0.2
}

// =============================================================================
// EVOLUTION CONFIG
// =============================================================================

/// Parameters governing one evolutionary run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of individuals in every generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,

    /// Number of top individuals copied forward unchanged each step.
    #[serde(default = "default_elite_size")]
    pub elite_size: usize,

    /// Probability that an offspring passes through mutation, and the
    /// per-strategy roll probability inside the mutation operator.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,

    /// Probability that an offspring is produced by crossover rather than
    /// cloning its first parent.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,

    /// Number of candidates sampled (with replacement) per tournament.
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,

    /// Reduced mutation probability used when seeding generation zero.
    #[serde(default = "default_seed_mutation_rate")]
    pub seed_mutation_rate: f64,

    /// Seed for the run's random source. `None` draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Options forwarded to the generation backend for every test call.
    #[serde(default)]
    pub generation: GenerationOptions,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            elite_size: default_elite_size(),
            mutation_rate: default_mutation_rate(),
            crossover_rate: default_crossover_rate(),
            tournament_size: default_tournament_size(),
            seed_mutation_rate: default_seed_mutation_rate(),
            seed: None,
            generation: GenerationOptions::default(),
        }
    }
}

impl EvolutionConfig {
    /// Create a small, quick configuration for smoke runs.
    pub fn fast() -> Self {
        Self {
            population_size: 4,
            elite_size: 1,
            mutation_rate: 0.4,
            crossover_rate: 0.6,
            tournament_size: 2,
            ..Self::default()
        }
    }

    /// Create a larger configuration for longer optimization runs.
    pub fn thorough() -> Self {
        Self {
            population_size: 16,
            elite_size: 3,
            mutation_rate: 0.25,
            crossover_rate: 0.8,
            tournament_size: 4,
            ..Self::default()
        }
    }

    /// Set a seed for deterministic behavior.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the population size.
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    /// Set the elite count.
    pub fn with_elite_size(mut self, size: usize) -> Self {
        self.elite_size = size;
        self
    }

    /// Validate parameter ranges.
    ///
    /// Called by the engine at `initialize_evolution`; a configuration that
    /// fails here never seeds a population.
    pub fn validate(&self) -> Result<()> {
        bail_if!(
            self.population_size < 2,
            Error::config("population_size", "must be at least 2")
        );
        bail_if!(
            self.elite_size > self.population_size,
            Error::config("elite_size", "must not exceed population_size")
        );
        bail_if!(
            !(0.0..=1.0).contains(&self.mutation_rate),
            Error::config("mutation_rate", "must be within [0, 1]")
        );
        bail_if!(
            !(0.0..=1.0).contains(&self.crossover_rate),
            Error::config("crossover_rate", "must be within [0, 1]")
        );
        bail_if!(
            !(0.0..=1.0).contains(&self.seed_mutation_rate),
            Error::config("seed_mutation_rate", "must be within [0, 1]")
        );
        bail_if!(
            self.tournament_size == 0,
            Error::config("tournament_size", "must be at least 1")
        );
        Ok(())
    }

    /// Default configuration file location:
    /// `<user config dir>/telos/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("telos").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when no
    /// file exists there.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|_| Error::ConfigFileNotFound {
            path: path.display().to_string(),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| Error::ConfigInvalidFormat {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================
