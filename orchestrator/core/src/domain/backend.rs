// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Execution Backend Domain Interface (Anti-Corruption Layer)
//
// Defines the domain interface for model-inference backends. Swarm workers,
// the task decomposer, and session initialization all call through this seam,
// so every implementation must be safe to invoke concurrently.
//
// Implementations live in infrastructure/.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Domain interface for a model-inference backend.
///
/// Combines the generation surface with the runtime/model registry surface
/// (health, model residency) so callers can pre-flight a model before
/// fanning work out to it.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Generate a completion for `prompt` using the named model.
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, BackendError>;

    /// Check if the backend is healthy and accessible.
    async fn health_check(&self) -> Result<(), BackendError>;

    /// Whether `model` is currently resident in the backend.
    async fn is_model_loaded(&self, model: &str) -> Result<bool, BackendError>;

    /// Pull/load `model` into the backend.
    async fn load_model(&self, model: &str) -> Result<(), BackendError>;
}

/// Options for a single generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,

    /// Hard wall-clock budget for the call, in seconds. Backends turn an
    /// overrun into [`BackendError::Timeout`].
    pub timeout_secs: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(4096),
            temperature: Some(0.7),
            timeout_secs: Some(30),
        }
    }
}

impl GenerationOptions {
    /// Options tuned for code generation (low temperature, large budget).
    pub fn for_code() -> Self {
        Self {
            max_tokens: Some(8000),
            temperature: Some(0.3),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Generated text
    pub text: String,

    /// Token usage stats
    pub usage: TokenUsage,

    /// Model used (e.g., "qwen2.5-coder", "llama3.2")
    pub model: String,

    /// Why generation stopped
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why generation stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural completion (model decided to stop)
    Stop,

    /// Hit max_tokens limit
    Length,
}

/// Errors that can occur during backend operations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Backend error: {0}")]
    Provider(String),

    #[error("Call exceeded {0}s budget")]
    Timeout(u64),
}
