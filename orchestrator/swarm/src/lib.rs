// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-swarm-orchestrator` — Task Decomposition & Swarm Execution
//!
//! Turns one high-level task into a set of concurrently executed sub-tasks,
//! runs each through a two-phase generate/review pipeline, and aggregates
//! results keyed by domain, tolerating partial failure.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `TaskDomain`, `Subtask`, `WorkerOutcome`, `SwarmResult` |
//! | [`application`] | Application | `TaskDecomposer`, `SwarmExecutor`, `SwarmOrchestrator` |
//!
//! ## Key Concepts
//!
//! - **Swarm**: one invocation of decomposition + concurrent execution over
//!   a set of sub-tasks.
//! - **Two-phase pipeline**: every sub-task's output is generated, then
//!   critiqued and refined by a reviewer pass; only the refined output is
//!   kept.
//! - **Partial coverage**: a sub-task failure is logged and excluded from
//!   the aggregate; the invocation as a whole still succeeds.

pub mod domain;
pub mod application;

pub use domain::*;
