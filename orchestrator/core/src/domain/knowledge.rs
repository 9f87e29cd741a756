// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Framework Knowledge Domain Interface
//
// Optional lookup of per-stack conventions used to enrich migration-domain
// prompts. Absence of a knowledge source must never fail decomposition or
// execution, so the null object below is a valid production wiring.

use async_trait::async_trait;

/// Best-practices lookup for a language/framework pair.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Conventions worth injecting into a generation prompt for the given
    /// stack. An empty list is a normal answer, not an error.
    async fn best_practices(&self, language: &str, framework: &str) -> Vec<String>;
}

/// Knowledge source that knows nothing. Default wiring when no framework
/// registry is attached.
#[derive(Debug, Default)]
pub struct NullKnowledge;

#[async_trait]
impl KnowledgeBase for NullKnowledge {
    async fn best_practices(&self, _language: &str, _framework: &str) -> Vec<String> {
        Vec::new()
    }
}
