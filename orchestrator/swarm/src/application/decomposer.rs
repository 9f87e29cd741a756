// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Decomposer
//!
//! Converts one task description into a set of sub-tasks.
//!
//! Known task types decompose deterministically from fixed templates, so
//! the platform's primary workflows always produce the same swarm shape.
//! Unknown types fall back to asking a model to propose the decomposition;
//! if that call or its parsing fails, the decomposer degrades to a single
//! generic sub-task. Decomposition never raises to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use aegis_swarm_core::domain::backend::{ExecutionBackend, GenerationOptions};

use crate::application::executor::ModelSelection;
use crate::domain::task::{Subtask, TaskContext, TaskDomain, TaskType};

/// Upper bound on the slice handed to the lenient JSON scan. Model output
/// beyond this is not worth scanning; degrade instead.
const MAX_SCAN_BYTES: usize = 64 * 1024;

pub struct TaskDecomposer {
    backend: Arc<dyn ExecutionBackend>,
    models: ModelSelection,
}

impl TaskDecomposer {
    pub fn new(backend: Arc<dyn ExecutionBackend>, models: ModelSelection) -> Self {
        Self { backend, models }
    }

    /// Decompose `task` into sub-tasks. Infallible: every path ends in at
    /// least one sub-task.
    pub async fn decompose(&self, task: &str, ctx: &TaskContext) -> Vec<Subtask> {
        let task_type = ctx.task_type();
        let subtasks = match &task_type {
            TaskType::FullProjectGeneration => self.full_project_template(task, ctx),
            TaskType::Migration => self.migration_template(task, ctx),
            TaskType::SelfHealing => self.self_healing_template(task),
            TaskType::Other(_) => self.propose_via_model(task, &task_type).await,
        };
        info!(
            task_type = task_type.as_str(),
            domains = ?subtasks.iter().map(|s| s.domain).collect::<Vec<_>>(),
            "Decomposed task"
        );
        subtasks
    }

    fn full_project_template(&self, task: &str, ctx: &TaskContext) -> Vec<Subtask> {
        let stack_note = ctx
            .target_stack
            .as_deref()
            .map(|s| format!(" Target stack: {s}."))
            .unwrap_or_default();
        vec![
            Subtask::new(
                TaskDomain::Backend,
                format!("Design and generate the backend for: {task}.{stack_note}"),
                "coder",
            ),
            Subtask::new(
                TaskDomain::Frontend,
                format!("Design and generate the frontend for: {task}.{stack_note}"),
                "coder",
            ),
            Subtask::new(
                TaskDomain::Database,
                format!("Design the database schema and migrations for: {task}."),
                "coder",
            ),
            Subtask::new(
                TaskDomain::Infrastructure,
                format!("Describe the runtime and deployment requirements for: {task}."),
                "default",
            ),
        ]
    }

    fn migration_template(&self, task: &str, ctx: &TaskContext) -> Vec<Subtask> {
        let target = ctx.target_stack.as_deref().unwrap_or("the target stack");
        vec![
            Subtask::new(
                TaskDomain::Migration,
                format!("Migrate to {target}, preserving all functionality: {task}"),
                "coder",
            ),
            Subtask::new(
                TaskDomain::Audit,
                format!("Audit the migrated output of '{task}' for behavioral parity with the source."),
                "default",
            ),
        ]
    }

    fn self_healing_template(&self, task: &str) -> Vec<Subtask> {
        vec![
            Subtask::new(
                TaskDomain::Audit,
                format!("Diagnose the root cause of: {task}"),
                "default",
            ),
            Subtask::new(
                TaskDomain::Fix,
                format!("Apply the minimal correct fix for: {task}"),
                "coder",
            ),
        ]
    }

    /// Unknown task type: ask the backend to propose a decomposition, and
    /// degrade to one generic sub-task if anything about that goes wrong.
    async fn propose_via_model(&self, task: &str, task_type: &TaskType) -> Vec<Subtask> {
        let prompt = format!(
            "Decompose the following task into independent sub-tasks.\n\
             Task type: {}\nTask: {}\n\n\
             Respond with ONLY a JSON array of objects, each with the keys \
             \"domain\", \"instruction\", and \"model\". Valid domains: backend, \
             frontend, database, infrastructure, migration, audit, fix, general.",
            task_type.as_str(),
            task
        );

        let response = match self
            .backend
            .generate(&prompt, &self.models.default_model, &GenerationOptions::default())
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Fallback decomposition call failed, degrading to generic sub-task");
                return self.generic_fallback(task);
            }
        };

        match parse_proposed_subtasks(&response.text) {
            Some(subtasks) if !subtasks.is_empty() => subtasks,
            _ => {
                warn!("Could not extract sub-tasks from model response, degrading to generic sub-task");
                self.generic_fallback(task)
            }
        }
    }

    fn generic_fallback(&self, task: &str) -> Vec<Subtask> {
        vec![Subtask::new(TaskDomain::General, task, "default")]
    }
}

#[derive(Deserialize)]
struct ProposedSubtask {
    domain: String,
    instruction: String,
    #[serde(default)]
    model: Option<String>,
}

/// Extract a sub-task array from free-form model output.
///
/// Strict parse of the whole response first; only if that fails, a bounded
/// scan for the outermost `[...]`. Both paths terminate and yield a typed
/// result. Duplicate domains are dropped (first occurrence wins) so a
/// decomposition never produces two sub-tasks with the same aggregation key.
fn parse_proposed_subtasks(text: &str) -> Option<Vec<Subtask>> {
    let proposed: Vec<ProposedSubtask> = match serde_json::from_str(text.trim()) {
        Ok(parsed) => parsed,
        Err(_) => {
            let start = text.find('[')?;
            let end = text.rfind(']')?;
            if end <= start || end - start > MAX_SCAN_BYTES {
                return None;
            }
            serde_json::from_str(&text[start..=end]).ok()?
        }
    };

    let mut seen = HashSet::new();
    let mut subtasks = Vec::new();
    for item in proposed {
        let domain = TaskDomain::parse(&item.domain).unwrap_or(TaskDomain::General);
        if !seen.insert(domain) {
            debug!(%domain, "Dropping duplicate domain from proposed decomposition");
            continue;
        }
        subtasks.push(Subtask::new(
            domain,
            item.instruction,
            item.model.unwrap_or_else(|| "default".to_string()),
        ));
    }
    Some(subtasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_swarm_core::domain::backend::{
        BackendError, FinishReason, GenerationResponse, TokenUsage,
    };
    use async_trait::async_trait;

    /// Backend whose generate either returns a canned response or fails.
    struct ScriptedBackend {
        response: Option<String>,
    }

    #[async_trait]
    impl ExecutionBackend for ScriptedBackend {
        async fn generate(
            &self,
            _prompt: &str,
            model: &str,
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, BackendError> {
            match &self.response {
                Some(text) => Ok(GenerationResponse {
                    text: text.clone(),
                    usage: TokenUsage::default(),
                    model: model.to_string(),
                    finish_reason: FinishReason::Stop,
                }),
                None => Err(BackendError::Network("connection refused".into())),
            }
        }

        async fn health_check(&self) -> Result<(), BackendError> {
            Ok(())
        }

        async fn is_model_loaded(&self, _model: &str) -> Result<bool, BackendError> {
            Ok(true)
        }

        async fn load_model(&self, _model: &str) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn decomposer(response: Option<&str>) -> TaskDecomposer {
        TaskDecomposer::new(
            Arc::new(ScriptedBackend {
                response: response.map(String::from),
            }),
            ModelSelection::default(),
        )
    }

    fn ctx(task_type: &str) -> TaskContext {
        TaskContext {
            task_type: Some(task_type.to_string()),
            ..TaskContext::default()
        }
    }

    fn domains(subtasks: &[Subtask]) -> Vec<TaskDomain> {
        subtasks.iter().map(|s| s.domain).collect()
    }

    #[tokio::test]
    async fn full_project_domains_are_fixed_regardless_of_task_text() {
        let dec = decomposer(None);
        let expected = vec![
            TaskDomain::Backend,
            TaskDomain::Frontend,
            TaskDomain::Database,
            TaskDomain::Infrastructure,
        ];
        for task in ["Build a CRUD API", "Launch a social network", ""] {
            let subtasks = dec.decompose(task, &ctx("full_project_generation")).await;
            assert_eq!(domains(&subtasks), expected, "task text: {task:?}");
        }
    }

    #[tokio::test]
    async fn migration_template_includes_coder_hint_and_audit() {
        let dec = decomposer(None);
        let mut context = ctx("migration");
        context.target_stack = Some("Go".to_string());
        let subtasks = dec.decompose("Migrate Java to Go", &context).await;

        assert_eq!(domains(&subtasks), vec![TaskDomain::Migration, TaskDomain::Audit]);
        assert_eq!(subtasks[0].model_hint, "coder");
        assert!(subtasks[0].instruction.contains("Go"));
    }

    #[tokio::test]
    async fn self_healing_template_yields_audit_then_fix() {
        let dec = decomposer(None);
        let subtasks = dec.decompose("NullPointer in Auth.py", &ctx("self_healing")).await;
        assert_eq!(domains(&subtasks), vec![TaskDomain::Audit, TaskDomain::Fix]);
    }

    #[tokio::test]
    async fn unknown_type_with_failing_backend_degrades_to_general() {
        let dec = decomposer(None);
        let subtasks = dec.decompose("do something odd", &ctx("weird_type")).await;
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].domain, TaskDomain::General);
        assert_eq!(subtasks[0].instruction, "do something odd");
    }

    #[tokio::test]
    async fn unknown_type_parses_strict_json_response() {
        let dec = decomposer(Some(
            r#"[{"domain": "backend", "instruction": "do backend", "model": "coder"},
                {"domain": "audit", "instruction": "check it"}]"#,
        ));
        let subtasks = dec.decompose("task", &ctx("custom")).await;
        assert_eq!(domains(&subtasks), vec![TaskDomain::Backend, TaskDomain::Audit]);
        assert_eq!(subtasks[0].model_hint, "coder");
        assert_eq!(subtasks[1].model_hint, "default");
    }

    #[tokio::test]
    async fn unknown_type_scans_json_out_of_surrounding_prose() {
        let dec = decomposer(Some(
            "Sure! Here is the plan:\n\
             [{\"domain\": \"fix\", \"instruction\": \"patch it\"}]\n\
             Let me know if you need more.",
        ));
        let subtasks = dec.decompose("task", &ctx("custom")).await;
        assert_eq!(domains(&subtasks), vec![TaskDomain::Fix]);
    }

    #[tokio::test]
    async fn garbage_response_degrades_to_general() {
        let dec = decomposer(Some("I cannot help with that."));
        let subtasks = dec.decompose("task", &ctx("custom")).await;
        assert_eq!(domains(&subtasks), vec![TaskDomain::General]);
    }

    #[tokio::test]
    async fn duplicate_domains_in_proposal_are_dropped() {
        let dec = decomposer(Some(
            r#"[{"domain": "backend", "instruction": "a"},
                {"domain": "backend", "instruction": "b"},
                {"domain": "unknown_thing", "instruction": "c"}]"#,
        ));
        let subtasks = dec.decompose("task", &ctx("custom")).await;
        // Second "backend" dropped; unknown domain maps to general.
        assert_eq!(domains(&subtasks), vec![TaskDomain::Backend, TaskDomain::General]);
        assert_eq!(subtasks[0].instruction, "a");
    }
}
