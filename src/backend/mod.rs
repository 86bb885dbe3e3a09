//! # Generation Backend Interface
//!
//! The evolution engine scores directives by driving an external text
//! generation backend. The backend exposes a single mutable "active
//! directive" slot (the system prompt it currently answers under) and a
//! `generate` call; the fitness evaluator temporarily swaps the slot to
//! the individual under test and restores it afterward.
//!
//! Telos treats the backend as a capability interface, not an owned
//! resource: anything implementing [`GenerationBackend`] can be plugged
//! into the engine - the bundled [`OllamaBackend`], the dashboard's model
//! service, or a scripted mock in tests.
//!
//! ## Serialization of the directive slot
//!
//! Because the slot is shared mutable state, swap-invoke-restore sequences
//! must never interleave. The engine owns its backend exclusively (`&mut`
//! access), so interleaving is unrepresentable; implementors do not need
//! internal locking for correctness of the slot.

pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use ollama::{OllamaBackend, OllamaBackendBuilder, OllamaConfig};

// ============================================================================
// OPTIONS & RESPONSE
// ============================================================================

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    512
}

/// Sampling options forwarded with every generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum number of tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// A completed generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text.
    pub content: String,

    /// Number of tokens produced, as reported by the backend.
    pub token_count: u32,

    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// A text generation backend with a mutable active-directive slot.
///
/// `active_directive`/`set_active_directive` access the slot; `generate`
/// answers `input` under whatever directive is currently active.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Read the currently active directive.
    fn active_directive(&self) -> String;

    /// Replace the active directive.
    fn set_active_directive(&mut self, directive: &str);

    /// Generate a response for `input` under the active directive.
    async fn generate(
        &self,
        input: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse>;
}

// ============================================================================
// TESTS
// ============================================================================
