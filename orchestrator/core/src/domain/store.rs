// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Shared Store Domain Interfaces
//
// Two narrow seams onto whatever keyed store the deployment provides:
//
// - `CounterStore`: the atomic-increment-capable store the rate limiter
//   depends on. This is the one place in the swarm core whose correctness
//   rests on an external consistency guarantee rather than in-process
//   locking, so both operations must be atomic per key.
// - `KeyedStore`: plain TTL'd key/value for session checkpoints.
//
// The in-memory implementations live in infrastructure/memory_store.rs.
// A Redis implementation maps `window_count` onto a
// ZREMRANGEBYSCORE/ZADD/ZCARD/EXPIRE pipeline and `add_and_get` onto
// INCRBY + EXPIRE.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Errors from the shared store. All of them mean "the store did not answer
/// authoritatively"; policy for what happens then belongs to the caller
/// (the rate limiter fails open, the session manager logs and carries on).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Value at '{0}' is not in the expected shape")]
    Corrupt(String),
}

/// Atomic counters shared across orchestrator processes.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Record an event at `now` under `key`, drop every recorded event older
    /// than `window`, and return the number of events remaining in the
    /// window (including the one just recorded). Atomic per key.
    async fn window_count(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<u32, StoreError>;

    /// Add `amount` to the counter at `key` and return the new total.
    /// The first write to a key arms `ttl`; later writes leave it untouched.
    async fn add_and_get(&self, key: &str, amount: u64, ttl: Duration) -> Result<u64, StoreError>;
}

/// TTL'd key/value storage for session checkpoints and small blobs.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
