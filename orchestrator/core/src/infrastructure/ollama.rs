// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ollama Execution Backend Adapter
//
// Anti-Corruption Layer for local Ollama inference. Supports air-gapped
// deployments with local open-source models; model selection is per call
// so one adapter serves the whole swarm.

use crate::domain::backend::{
    BackendError, ExecutionBackend, FinishReason, GenerationOptions, GenerationResponse, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
    eval_count: Option<u32>,
    prompt_eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaTags {
    models: Vec<OllamaTag>,
}

#[derive(Deserialize)]
struct OllamaTag {
    name: String,
}

#[derive(Serialize)]
struct OllamaPull {
    name: String,
    stream: bool,
}

impl OllamaBackend {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ExecutionBackend for OllamaBackend {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, BackendError> {
        let request = OllamaRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            options: Some(OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens.map(|t| t as i32),
            }),
        };

        let send = self.client.post(self.url("/api/generate")).json(&request).send();

        let response = match options.timeout_secs {
            Some(budget) => tokio::time::timeout(Duration::from_secs(budget), send)
                .await
                .map_err(|_| BackendError::Timeout(budget))?,
            None => send.await,
        }
        .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status == 404 {
                BackendError::ModelNotFound(model.to_string())
            } else {
                BackendError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Provider(format!("Failed to parse response: {}", e)))?;

        Ok(GenerationResponse {
            text: ollama_response.response,
            usage: TokenUsage {
                prompt_tokens: ollama_response.prompt_eval_count.unwrap_or(0),
                completion_tokens: ollama_response.eval_count.unwrap_or(0),
                total_tokens: ollama_response.prompt_eval_count.unwrap_or(0)
                    + ollama_response.eval_count.unwrap_or(0),
            },
            model: model.to_string(),
            finish_reason: if ollama_response.done {
                FinishReason::Stop
            } else {
                FinishReason::Length
            },
        })
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        // Listing models doubles as the liveness probe.
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Network(format!("HTTP {}", response.status())))
        }
    }

    async fn is_model_loaded(&self, model: &str) -> Result<bool, BackendError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Network(format!("HTTP {}", response.status())));
        }

        let tags: OllamaTags = response
            .json()
            .await
            .map_err(|e| BackendError::Provider(format!("Failed to parse tags: {}", e)))?;

        // Ollama tags carry the variant suffix ("qwen2.5-coder:7b").
        Ok(tags
            .models
            .iter()
            .any(|t| t.name == model || t.name.split(':').next() == Some(model)))
    }

    async fn load_model(&self, model: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&OllamaPull {
                name: model.to_string(),
                stream: false,
            })
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(BackendError::Provider(format!("HTTP {}: {}", status, error_text)))
        }
    }
}
