// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod memory_store;
pub mod ollama;

pub use memory_store::MemoryStore;
pub use ollama::OllamaBackend;
