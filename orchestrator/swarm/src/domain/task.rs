// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Task Aggregates
//!
//! Defines the core types for one swarm invocation:
//!
//! - [`TaskDomain`] — closed enum of functional domains; the aggregation key.
//! - [`Subtask`] — one unit of work, immutable once created.
//! - [`WorkerOutcome`] / [`SwarmResult`] — per-domain results and their
//!   aggregate, only ever visible to callers as a completed whole.
//!
//! Domains are a closed set on purpose: role/prompt selection is an
//! exhaustive match, so adding a domain forces every dispatch site to be
//! revisited.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for one swarm invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmId(pub Uuid);

impl SwarmId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SwarmId {
    fn default() -> Self {
        Self::new()
    }
}

/// Functional domain of a sub-task; unique per swarm invocation and used as
/// the aggregation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDomain {
    Backend,
    Frontend,
    Database,
    Infrastructure,
    Migration,
    Audit,
    Fix,
    General,
}

impl TaskDomain {
    /// Role preamble prepended to the generate-phase prompt.
    pub fn role_preamble(&self) -> &'static str {
        match self {
            Self::Backend => {
                "You are a SENIOR BACKEND ENGINEER. Produce production-ready server-side \
                 code with error handling, logging, and tests."
            }
            Self::Frontend => {
                "You are a SENIOR FRONTEND ENGINEER. Produce accessible, idiomatic UI code \
                 following the framework's conventions."
            }
            Self::Database => {
                "You are a SENIOR DATA ENGINEER. Design normalized schemas, migrations, \
                 and query layers with integrity constraints."
            }
            Self::Infrastructure => {
                "You are a SENIOR PLATFORM ENGINEER. Describe the runtime and deployment \
                 requirements of the system precisely."
            }
            Self::Migration => {
                "You are a LEGACY MODERNIZATION & MIGRATION EXPERT. Preserve business \
                 logic exactly while adapting to target-stack idioms, and handle breaking \
                 changes gracefully."
            }
            Self::Audit => {
                "You are a SENIOR CODE AUDITOR. Identify defects, security issues, and \
                 behavioral regressions with concrete evidence."
            }
            Self::Fix => {
                "You are a SR. RELIABILITY ENGINEER & DEBUGGING SPECIALIST. Find the root \
                 cause, apply the minimal correct fix, and explain it."
            }
            Self::General => {
                "You are an expert software engineer. Provide a complete, production-ready \
                 solution to the task."
            }
        }
    }

    /// Wire-stable name (matches the serde form).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Database => "database",
            Self::Infrastructure => "infrastructure",
            Self::Migration => "migration",
            Self::Audit => "audit",
            Self::Fix => "fix",
            Self::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backend" => Some(Self::Backend),
            "frontend" => Some(Self::Frontend),
            "database" => Some(Self::Database),
            "infrastructure" => Some(Self::Infrastructure),
            "migration" => Some(Self::Migration),
            "audit" => Some(Self::Audit),
            "fix" | "self_healing" => Some(Self::Fix),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role preamble for the review/refine phase, shared across domains.
pub const REVIEWER_PREAMBLE: &str =
    "You are a PRINCIPAL ENGINEER acting as a strict reviewer. Critique the draft below, \
     then return the improved, final version of the complete deliverable. Return only \
     the final version.";

/// Kind of high-level task being orchestrated. Known kinds decompose from
/// fixed templates; anything else goes through the model-proposed fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskType {
    FullProjectGeneration,
    Migration,
    SelfHealing,
    Other(String),
}

impl TaskType {
    pub fn parse(s: &str) -> Self {
        match s {
            "full_project_generation" => Self::FullProjectGeneration,
            "migration" => Self::Migration,
            "self_healing" => Self::SelfHealing,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::FullProjectGeneration => "full_project_generation",
            Self::Migration => "migration",
            Self::SelfHealing => "self_healing",
            Self::Other(s) => s,
        }
    }
}

/// One unit of work within a swarm. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub domain: TaskDomain,
    pub instruction: String,
    /// Abstract model capability hint ("default", "coder"); resolved to a
    /// concrete model by the executor.
    pub model_hint: String,
}

impl Subtask {
    pub fn new(domain: TaskDomain, instruction: impl Into<String>, model_hint: impl Into<String>) -> Self {
        Self {
            domain,
            instruction: instruction.into(),
            model_hint: model_hint.into(),
        }
    }
}

/// Caller-supplied context for one orchestration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    /// Client identity used for rate-limit accounting.
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub task_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_stack: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_stack: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,

    /// Anything else the caller wants to thread through to prompts.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskContext {
    pub fn task_type(&self) -> TaskType {
        self.task_type
            .as_deref()
            .map(TaskType::parse)
            .unwrap_or_else(|| TaskType::Other(String::new()))
    }
}

/// Result of one successfully completed sub-task pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub status: OutcomeStatus,

    /// Final (review-phase) output. The generate-phase draft is discarded.
    pub solution: String,

    /// Auxiliary metadata attached by the worker (e.g. deployment notes).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub infrastructure: serde_json::Map<String, serde_json::Value>,

    /// Model that produced the final output.
    pub model_used: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
}

/// Why one sub-task pipeline failed. Contained by the executor; never fails
/// the invocation.
#[derive(Debug, thiserror::Error)]
pub enum SubtaskFailure {
    #[error("Sub-task '{domain}' denied by rate limiter: {reason}")]
    RateLimited { domain: TaskDomain, reason: &'static str },

    #[error("Sub-task '{domain}' {phase} phase failed: {message}")]
    Pipeline {
        domain: TaskDomain,
        phase: PipelinePhase,
        message: String,
    },
}

impl SubtaskFailure {
    pub fn domain(&self) -> TaskDomain {
        match self {
            Self::RateLimited { domain, .. } | Self::Pipeline { domain, .. } => *domain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Generate,
    Review,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Generate => "generate",
            Self::Review => "review",
        })
    }
}

/// Aggregate of one swarm invocation, keyed by domain. Contains exactly one
/// entry per successfully completed sub-task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmResult {
    pub results: HashMap<TaskDomain, WorkerOutcome>,
}

impl SwarmResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a completed outcome. Duplicate domains indicate a decomposer
    /// bug; the first outcome wins and the duplicate is reported.
    pub fn insert(&mut self, domain: TaskDomain, outcome: WorkerOutcome) -> bool {
        match self.results.entry(domain) {
            std::collections::hash_map::Entry::Occupied(_) => {
                tracing::error!(%domain, "Duplicate domain in swarm aggregate, dropping outcome");
                false
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(outcome);
                true
            }
        }
    }

    pub fn get(&self, domain: TaskDomain) -> Option<&WorkerOutcome> {
        self.results.get(&domain)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Split every solution's `### FILE: name` fenced blocks into per-file
    /// contents, keyed `domain/filename`. Solutions without file markers
    /// contribute nothing.
    pub fn generated_files(&self) -> HashMap<String, String> {
        let mut files = HashMap::new();
        for (domain, outcome) in &self.results {
            for (name, content) in extract_file_blocks(&outcome.solution) {
                files.insert(format!("{domain}/{name}"), content);
            }
        }
        files
    }
}

/// Scan `solution` for `### FILE: path` marker lines, each followed by a
/// fenced code block holding that file's contents. Blank lines between the
/// marker and the opening fence are tolerated; a marker without a fence is
/// skipped.
///
/// The scan is linear over the input and always terminates; an unterminated
/// fence simply ends the last block at end of input.
pub fn extract_file_blocks(solution: &str) -> Vec<(String, String)> {
    const MARKER: &str = "### FILE:";
    let mut blocks = Vec::new();
    let mut lines = solution.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(rest) = line.trim_start().strip_prefix(MARKER) else {
            continue;
        };
        let name = rest.trim();
        if name.is_empty() {
            continue;
        }

        // Skip to the opening fence, tolerating blank lines in between.
        while matches!(lines.peek(), Some(l) if l.trim().is_empty()) {
            lines.next();
        }
        let Some(fence) = lines.peek() else { break };
        if !fence.trim_start().starts_with("```") {
            continue;
        }
        lines.next();

        let mut content = Vec::new();
        for body in lines.by_ref() {
            if body.trim_start().starts_with("```") {
                break;
            }
            content.push(body);
        }
        blocks.push((name.to_string(), content.join("\n")));
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_roundtrips_through_strings() {
        for domain in [
            TaskDomain::Backend,
            TaskDomain::Migration,
            TaskDomain::Fix,
            TaskDomain::General,
        ] {
            assert_eq!(TaskDomain::parse(domain.as_str()), Some(domain));
        }
        assert_eq!(TaskDomain::parse("self_healing"), Some(TaskDomain::Fix));
        assert_eq!(TaskDomain::parse("blockchain"), None);
    }

    #[test]
    fn duplicate_insert_keeps_first_outcome() {
        let mut result = SwarmResult::new();
        let outcome = |text: &str| WorkerOutcome {
            status: OutcomeStatus::Success,
            solution: text.to_string(),
            infrastructure: serde_json::Map::new(),
            model_used: "m".to_string(),
        };
        assert!(result.insert(TaskDomain::Backend, outcome("first")));
        assert!(!result.insert(TaskDomain::Backend, outcome("second")));
        assert_eq!(result.get(TaskDomain::Backend).unwrap().solution, "first");
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn extracts_multiple_file_blocks() {
        let solution = "### FILE: main.py\n```python\n# Refined FastAPI Code\n```\n\
                        ### FILE: models.py\n```python\n# Refined Models\n```";
        let blocks = extract_file_blocks(solution);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, "main.py");
        assert_eq!(blocks[0].1, "# Refined FastAPI Code");
        assert_eq!(blocks[1].0, "models.py");
    }

    #[test]
    fn unterminated_fence_still_terminates_scan() {
        let solution = "### FILE: a.rs\n```rust\nfn main() {}";
        let blocks = extract_file_blocks(solution);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].1, "fn main() {}");
    }

    #[test]
    fn prose_without_markers_yields_nothing() {
        assert!(extract_file_blocks("Here is some advice about your code.").is_empty());
    }

    #[test]
    fn generated_files_are_keyed_by_domain() {
        let mut result = SwarmResult::new();
        result.insert(
            TaskDomain::Backend,
            WorkerOutcome {
                status: OutcomeStatus::Success,
                solution: "### FILE: main.py\n```python\nprint('hi')\n```".to_string(),
                infrastructure: serde_json::Map::new(),
                model_used: "qwen2.5-coder".to_string(),
            },
        );
        let files = result.generated_files();
        assert_eq!(files.get("backend/main.py").map(String::as_str), Some("print('hi')"));
    }
}
