//! # Ollama Generation Backend
//!
//! Local-first implementation of [`GenerationBackend`] against an Ollama
//! server. No API keys, no cloud dependency - the same model service the
//! dashboard drives for its chat panel.
//!
//! The active-directive slot maps onto the request's `system` field: every
//! `generate` call answers under whatever directive is currently held in
//! the slot.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use telos::backend::{GenerationBackend, GenerationOptions, OllamaBackend};
//!
//! let mut backend = OllamaBackend::builder()
//!     .endpoint("http://localhost:11434")
//!     .model("llama3.2")
//!     .build();
//!
//! backend.set_active_directive("You are a concise assistant.");
//! let response = backend.generate("What is Rust?", &GenerationOptions::default()).await?;
//! println!("{}", response.content);
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationBackend, GenerationOptions, GenerationResponse};
use crate::error::{Error, Result};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

/// Default model used when none is configured.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for the Ollama backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server.
    pub endpoint: String,

    /// Model name to generate with.
    pub model: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ============================================================================
// API REQUEST/RESPONSE TYPES
// ============================================================================

/// Ollama generate request body.
#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    options: OllamaSamplingOptions,
    stream: bool,
}

/// Sampling options in Ollama's naming.
#[derive(Debug, Clone, Serialize)]
struct OllamaSamplingOptions {
    temperature: f64,
    num_predict: u32,
}

impl From<&GenerationOptions> for OllamaSamplingOptions {
    fn from(options: &GenerationOptions) -> Self {
        Self {
            temperature: options.temperature,
            num_predict: options.max_tokens,
        }
    }
}

/// Ollama generate response body.
#[derive(Debug, Clone, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: u32,
}

// ============================================================================
// BACKEND
// ============================================================================

/// [`GenerationBackend`] implementation backed by a local Ollama server.
#[derive(Debug)]
pub struct OllamaBackend {
    http_client: Client,
    config: OllamaConfig,
    active_directive: String,
}

impl OllamaBackend {
    /// Create a backend with the default endpoint and model.
    pub fn new() -> Self {
        Self::with_config(OllamaConfig::default())
    }

    /// Create a backend with explicit configuration.
    pub fn with_config(config: OllamaConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            config,
            active_directive: String::new(),
        }
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> OllamaBackendBuilder {
        OllamaBackendBuilder::default()
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Check that the server is reachable.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.config.endpoint);
        let response =
            self.http_client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::BackendConnection {
                    endpoint: self.config.endpoint.clone(),
                    source: e,
                })?;

        if !response.status().is_success() {
            return Err(Error::BackendResponse {
                details: format!("health check returned HTTP {}", response.status().as_u16()),
            });
        }
        Ok(())
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn active_directive(&self) -> String {
        self.active_directive.clone()
    }

    fn set_active_directive(&mut self, directive: &str) {
        self.active_directive = directive.to_string();
    }

    async fn generate(
        &self,
        input: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        let url = format!("{}/api/generate", self.config.endpoint);
        let start = Instant::now();

        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: input.to_string(),
            system: if self.active_directive.is_empty() {
                None
            } else {
                Some(self.active_directive.clone())
            },
            options: OllamaSamplingOptions::from(options),
            stream: false,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::BackendConnection {
                endpoint: self.config.endpoint.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendInvocation(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let body: OllamaGenerateResponse =
            response.json().await.map_err(|e| Error::BackendResponse {
                details: format!("failed to parse generate response: {}", e),
            })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "generate: {} tokens in {}ms ({} chars in)",
            body.eval_count,
            duration_ms,
            input.len()
        );

        Ok(GenerationResponse {
            content: body.response,
            token_count: body.eval_count,
            duration_ms,
        })
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`OllamaBackend`].
#[derive(Debug, Default)]
pub struct OllamaBackendBuilder {
    config: OllamaConfig,
}

impl OllamaBackendBuilder {
    /// Set the server endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the request timeout in seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// Build the backend.
    pub fn build(self) -> OllamaBackend {
        OllamaBackend::with_config(self.config)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let backend = OllamaBackend::builder()
            .endpoint("http://10.0.0.2:11434")
            .model("mistral")
            .timeout_secs(30)
            .build();
        assert_eq!(backend.endpoint(), "http://10.0.0.2:11434");
        assert_eq!(backend.model(), "mistral");
    }

    #[test]
    fn test_directive_slot() {
        let mut backend = OllamaBackend::new();
        assert!(backend.active_directive().is_empty());
        backend.set_active_directive("Be brief.");
        assert_eq!(backend.active_directive(), "Be brief.");
    }

    #[test]
    fn test_empty_directive_omits_system_field() {
        let request = OllamaGenerateRequest {
            model: "m".into(),
            prompt: "p".into(),
            system: None,
            options: OllamaSamplingOptions {
                temperature: 0.7,
                num_predict: 64,
            },
            stream: false,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("system"));
    }
}
