// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Executor
//!
//! Fans sub-tasks out for concurrent execution and aggregates the results.
//!
//! Every sub-task runs on its own task, all spawned up front (fan-out equals
//! the sub-task count; backpressure against the system as a whole is the
//! rate limiter's job, not the executor's). Within one sub-task the
//! two-phase pipeline is strictly sequential: generate a draft, then have a
//! reviewer persona critique and return the final version. Only the refined
//! output is kept.
//!
//! A failing sub-task is captured as a typed outcome, logged, and excluded
//! from the aggregate; the other sub-tasks complete normally and the
//! invocation reports success with partial coverage. No retry happens here.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use aegis_swarm_core::application::circuit_breaker::CircuitBreakerRegistry;
use aegis_swarm_core::application::rate_limiter::{RateDecision, RateLimiter};
use aegis_swarm_core::domain::backend::{ExecutionBackend, GenerationOptions};
use aegis_swarm_core::domain::knowledge::KnowledgeBase;

use crate::domain::task::{
    OutcomeStatus, PipelinePhase, Subtask, SubtaskFailure, SwarmId, SwarmResult, TaskContext,
    TaskDomain, WorkerOutcome, REVIEWER_PREAMBLE,
};

/// Name of the downstream dependency every generation call is guarded by.
const INFERENCE_DEPENDENCY: &str = "inference";

/// Concrete models behind the abstract sub-task hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSelection {
    /// General-purpose model ("default" hint).
    pub default_model: String,

    /// Code-specialized model ("coder" hint).
    pub coder_model: String,

    /// Model for the review pass; usually the most capable of the three.
    pub review_model: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            default_model: "llama3.2".to_string(),
            coder_model: "qwen2.5-coder".to_string(),
            review_model: "qwen2.5-coder".to_string(),
        }
    }
}

impl ModelSelection {
    fn resolve<'a>(&'a self, hint: &'a str) -> &'a str {
        match hint {
            "coder" => &self.coder_model,
            "default" => &self.default_model,
            // A concrete model name passes through untouched.
            other if !other.is_empty() => other,
            _ => &self.default_model,
        }
    }
}

/// Executes one swarm invocation. Cheap to clone; all heavy state is shared.
#[derive(Clone)]
pub struct SwarmExecutor {
    backend: Arc<dyn ExecutionBackend>,
    knowledge: Arc<dyn KnowledgeBase>,
    limiter: Arc<RateLimiter>,
    breakers: Arc<CircuitBreakerRegistry>,
    models: ModelSelection,
}

impl SwarmExecutor {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        knowledge: Arc<dyn KnowledgeBase>,
        limiter: Arc<RateLimiter>,
        breakers: Arc<CircuitBreakerRegistry>,
        models: ModelSelection,
    ) -> Self {
        Self {
            backend,
            knowledge,
            limiter,
            breakers,
            models,
        }
    }

    /// Execute all sub-tasks concurrently and aggregate by domain.
    pub async fn execute(&self, subtasks: Vec<Subtask>, ctx: &TaskContext) -> SwarmResult {
        let swarm_id = SwarmId::new();
        debug!(swarm = ?swarm_id.0, subtasks = subtasks.len(), "Fanning out swarm");

        let handles: Vec<_> = subtasks
            .into_iter()
            .map(|subtask| {
                let executor = self.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move { executor.run_subtask(subtask, ctx).await })
            })
            .collect();

        let mut result = SwarmResult::new();
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok((domain, outcome))) => {
                    metrics::counter!("swarm_subtasks_completed_total").increment(1);
                    result.insert(domain, outcome);
                }
                Ok(Err(failure)) => {
                    metrics::counter!("swarm_subtasks_failed_total").increment(1);
                    warn!(
                        swarm = ?swarm_id.0,
                        domain = %failure.domain(),
                        error = %failure,
                        "Sub-task failed, excluded from aggregate"
                    );
                }
                Err(join_err) => {
                    metrics::counter!("swarm_subtasks_failed_total").increment(1);
                    warn!(swarm = ?swarm_id.0, error = %join_err, "Sub-task aborted");
                }
            }
        }
        result
    }

    async fn run_subtask(
        &self,
        subtask: Subtask,
        ctx: TaskContext,
    ) -> Result<(TaskDomain, WorkerOutcome), SubtaskFailure> {
        let domain = subtask.domain;
        let client = if ctx.client_id.is_empty() {
            "anonymous"
        } else {
            ctx.client_id.as_str()
        };

        if let RateDecision::Denied { reason, .. } = self
            .limiter
            .check(client, estimate_tokens(&subtask.instruction))
            .await
        {
            return Err(SubtaskFailure::RateLimited {
                domain,
                reason: reason.as_str(),
            });
        }

        let breaker = self.breakers.breaker(INFERENCE_DEPENDENCY);

        // Phase 1: generate a draft under the domain's role.
        let prompt = self.generate_prompt(&subtask, &ctx).await;
        let model = self.models.resolve(&subtask.model_hint).to_string();
        let draft = breaker
            .call(self.backend.generate(&prompt, &model, &GenerationOptions::for_code()))
            .await
            .map_err(|e| SubtaskFailure::Pipeline {
                domain,
                phase: PipelinePhase::Generate,
                message: e.to_string(),
            })?;

        // Phase 2: reviewer critiques and returns the final version.
        let review_prompt = format!(
            "{REVIEWER_PREAMBLE}\n\nOriginal task:\n{}\n\nDraft:\n{}",
            subtask.instruction, draft.text
        );
        let refined = breaker
            .call(self.backend.generate(
                &review_prompt,
                &self.models.review_model,
                &GenerationOptions::for_code(),
            ))
            .await
            .map_err(|e| SubtaskFailure::Pipeline {
                domain,
                phase: PipelinePhase::Review,
                message: e.to_string(),
            })?;

        Ok((
            domain,
            WorkerOutcome {
                status: OutcomeStatus::Success,
                solution: refined.text,
                infrastructure: serde_json::Map::new(),
                model_used: refined.model,
            },
        ))
    }

    /// Build the phase-1 prompt: role preamble, domain-specific enrichment,
    /// then the instruction.
    async fn generate_prompt(&self, subtask: &Subtask, ctx: &TaskContext) -> String {
        let mut parts = vec![subtask.domain.role_preamble().to_string()];

        if subtask.domain == TaskDomain::Migration {
            if let (Some(source), Some(target)) = (&ctx.source_stack, &ctx.target_stack) {
                parts.push(format!("Migration: {source} -> {target}"));
            }
            let language = ctx.language.as_deref().unwrap_or_default();
            let framework = ctx
                .framework
                .as_deref()
                .or(ctx.target_stack.as_deref())
                .unwrap_or_default();
            let practices = self.knowledge.best_practices(language, framework).await;
            if !practices.is_empty() {
                let mut section = String::from("Target-stack conventions:");
                for practice in practices {
                    section.push_str("\n- ");
                    section.push_str(&practice);
                }
                parts.push(section);
            }
        }

        if !ctx.extra.is_empty() {
            let mut section = String::from("Additional context:");
            for (key, value) in &ctx.extra {
                section.push_str(&format!("\n- {key}: {value}"));
            }
            parts.push(section);
        }

        parts.push(format!("Task: {}", subtask.instruction));
        parts.join("\n\n")
    }
}

/// Crude prompt-length heuristic for budget accounting (~4 chars/token).
fn estimate_tokens(instruction: &str) -> u64 {
    (instruction.len() / 4) as u64
}
