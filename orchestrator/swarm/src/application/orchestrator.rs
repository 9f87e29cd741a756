// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Orchestrator
//!
//! Single entry point for one orchestration: decompose the task, execute
//! the swarm, report the aggregate. The two stages are sequential by
//! construction (execution needs the full sub-task list); all concurrency
//! lives inside the executor.
//!
//! Orchestration is infallible at this layer. Decomposition degrades
//! rather than fails, and the executor contains per-sub-task failures, so
//! the report always comes back, possibly with partial worker coverage.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::decomposer::TaskDecomposer;
use crate::application::executor::SwarmExecutor;
use crate::domain::task::{Subtask, SwarmResult, TaskContext};

/// Label reported as the coordinating agent in every report.
const AGENT_LABEL: &str = "LeadArchitect";

/// Outcome of one orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationReport {
    /// Always "success"; per-sub-task failures show up as missing domains
    /// in `worker_results`, not as an overall failure.
    pub status: String,

    /// The sub-tasks the work was split into, in decomposition order.
    pub decomposition: Vec<Subtask>,

    /// Aggregate of the completed sub-task pipelines, keyed by domain.
    pub worker_results: SwarmResult,

    /// Which coordinating agent produced this report.
    pub agent_label: String,
}

pub struct SwarmOrchestrator {
    decomposer: TaskDecomposer,
    executor: SwarmExecutor,
}

impl SwarmOrchestrator {
    pub fn new(decomposer: TaskDecomposer, executor: SwarmExecutor) -> Self {
        Self {
            decomposer,
            executor,
        }
    }

    /// Run one task through decompose-then-execute and report the aggregate.
    pub async fn orchestrate(&self, task: &str, ctx: &TaskContext) -> OrchestrationReport {
        let started = std::time::Instant::now();

        let decomposition = self.decomposer.decompose(task, ctx).await;
        let worker_results = self.executor.execute(decomposition.clone(), ctx).await;

        metrics::histogram!("swarm_orchestration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            subtasks = decomposition.len(),
            completed = worker_results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Orchestration finished"
        );

        OrchestrationReport {
            status: "success".to_string(),
            decomposition,
            worker_results,
            agent_label: AGENT_LABEL.to_string(),
        }
    }
}
