// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-Memory Counter/Keyed Store
//
// Process-local implementation of the shared-store seams, honoring the same
// per-key atomicity contract an external store provides. Suitable for
// single-node deployments and tests; multi-node deployments swap in a
// store backed by a network counter service.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::time::Duration;

use crate::domain::store::{CounterStore, KeyedStore, StoreError};

#[derive(Debug, Clone)]
struct Counter {
    total: u64,
    expires_at: DateTime<Utc>,
}

/// Dashmap-backed store. Each operation holds the shard lock for its key
/// for the whole read-modify-write, which is what makes the counters
/// atomic per key.
#[derive(Default)]
pub struct MemoryStore {
    windows: DashMap<String, Vec<DateTime<Utc>>>,
    counters: DashMap<String, Counter>,
    values: DashMap<String, (Vec<u8>, DateTime<Utc>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn delta(ttl: Duration) -> TimeDelta {
        TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::days(365 * 100))
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn window_count(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<u32, StoreError> {
        let cutoff = now - Self::delta(window);
        let mut entry = self.windows.entry(key.to_string()).or_default();
        entry.retain(|t| *t > cutoff);
        entry.push(now);
        Ok(entry.len() as u32)
    }

    async fn add_and_get(&self, key: &str, amount: u64, ttl: Duration) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut entry = self.counters.entry(key.to_string()).or_insert_with(|| Counter {
            total: 0,
            expires_at: now + Self::delta(ttl),
        });
        if entry.expires_at <= now {
            // Expired counter: this write starts a fresh period.
            entry.total = 0;
            entry.expires_at = now + Self::delta(ttl);
        }
        entry.total = entry.total.saturating_add(amount);
        Ok(entry.total)
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.values
            .insert(key.to_string(), (value, Utc::now() + Self::delta(ttl)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        // Clone out under the read guard; removal needs the guard released.
        let live = self
            .values
            .get(key)
            .map(|entry| (entry.1 > Utc::now()).then(|| entry.0.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
