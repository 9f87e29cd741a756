// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod decomposer;
pub mod executor;
pub mod orchestrator;

pub use decomposer::TaskDecomposer;
pub use executor::{ModelSelection, SwarmExecutor};
pub use orchestrator::{OrchestrationReport, SwarmOrchestrator};
