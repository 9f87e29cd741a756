// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Rate Limiter
//!
//! Distributed admission gate combining a sliding one-minute request window
//! with a per-UTC-day token budget. Both counters live in a shared
//! [`CounterStore`] so that every orchestrator process enforces one logical
//! limit.
//!
//! The two checks are independent and deny with machine-distinguishable
//! reasons. If the store is unreachable the limiter fails open: the request
//! is allowed, flagged degraded, and the outage is logged. Availability of
//! the primary service wins over strict quota enforcement.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::config::RateLimitConfig;
use crate::domain::store::CounterStore;

const WINDOW: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(86_400);

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// Requests-per-minute window exceeded.
    RequestRate,
    /// Daily token budget exceeded.
    TokenBudget,
}

impl RateLimitReason {
    /// Wire-stable reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestRate => "rate_limit_exceeded",
            Self::TokenBudget => "token_budget_exceeded",
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        /// Requests observed in the current window, this one included.
        window_used: u32,
        /// True when the store was unreachable and the limiter failed open.
        degraded: bool,
    },
    Denied {
        reason: RateLimitReason,
        limit: u64,
        current: u64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Shared admission gate, one instance per orchestrator process.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Check whether `client_id` may proceed with a request estimated to
    /// spend `estimated_tokens`.
    pub async fn check(&self, client_id: &str, estimated_tokens: u64) -> RateDecision {
        self.check_at(client_id, estimated_tokens, Utc::now()).await
    }

    /// Clock-injected variant of [`check`](Self::check).
    pub async fn check_at(
        &self,
        client_id: &str,
        estimated_tokens: u64,
        now: DateTime<Utc>,
    ) -> RateDecision {
        // 1. Requests-per-minute, sliding window.
        let window_key = format!("rl:window:{client_id}");
        let window_used = match self.store.window_count(&window_key, now, WINDOW).await {
            Ok(count) => count,
            Err(e) => return self.fail_open(client_id, &e),
        };

        if window_used > self.config.requests_per_minute {
            warn!(
                client = client_id,
                current = window_used,
                limit = self.config.requests_per_minute,
                "Request rate limit exceeded"
            );
            metrics::counter!("swarm_rate_limit_denied_total", "reason" => "rate_limit_exceeded")
                .increment(1);
            return RateDecision::Denied {
                reason: RateLimitReason::RequestRate,
                limit: self.config.requests_per_minute as u64,
                current: window_used as u64,
            };
        }

        // 2. Daily token budget. First write of the day arms the 24h expiry.
        if estimated_tokens > 0 {
            let day_key = format!("rl:tokens:{client_id}:{}", now.format("%Y-%m-%d"));
            let daily_total = match self.store.add_and_get(&day_key, estimated_tokens, DAY).await {
                Ok(total) => total,
                Err(e) => return self.fail_open(client_id, &e),
            };

            if daily_total > self.config.daily_token_limit {
                warn!(
                    client = client_id,
                    current = daily_total,
                    limit = self.config.daily_token_limit,
                    "Daily token budget exceeded"
                );
                metrics::counter!("swarm_rate_limit_denied_total", "reason" => "token_budget_exceeded")
                    .increment(1);
                return RateDecision::Denied {
                    reason: RateLimitReason::TokenBudget,
                    limit: self.config.daily_token_limit,
                    current: daily_total,
                };
            }
        }

        RateDecision::Allowed {
            window_used,
            degraded: false,
        }
    }

    fn fail_open(&self, client_id: &str, err: &crate::domain::store::StoreError) -> RateDecision {
        warn!(client = client_id, error = %err, "Counter store unreachable, failing open");
        metrics::counter!("swarm_rate_limit_degraded_total").increment(1);
        RateDecision::Allowed {
            window_used: 0,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::StoreError;
    use crate::infrastructure::memory_store::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn limiter_with(store: Arc<dyn CounterStore>, rpm: u32, daily: u64) -> RateLimiter {
        RateLimiter::new(
            store,
            RateLimitConfig {
                requests_per_minute: rpm,
                daily_token_limit: daily,
            },
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn denies_request_over_window_limit() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()), 3, 1_000_000);

        for i in 0..3 {
            let decision = limiter.check_at("alice", 10, at(i)).await;
            assert!(decision.is_allowed(), "request {i} should pass");
        }

        match limiter.check_at("alice", 10, at(3)).await {
            RateDecision::Denied { reason, limit, current } => {
                assert_eq!(reason, RateLimitReason::RequestRate);
                assert_eq!(reason.as_str(), "rate_limit_exceeded");
                assert_eq!(limit, 3);
                assert_eq!(current, 4);
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn window_slides_and_frees_capacity() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()), 2, 1_000_000);

        assert!(limiter.check_at("bob", 0, at(0)).await.is_allowed());
        assert!(limiter.check_at("bob", 0, at(1)).await.is_allowed());
        assert!(!limiter.check_at("bob", 0, at(2)).await.is_allowed());

        // 61s later the first window has fully elapsed.
        assert!(limiter.check_at("bob", 0, at(62)).await.is_allowed());
    }

    #[tokio::test]
    async fn denies_over_daily_token_budget_with_distinct_reason() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()), 100, 500);

        assert!(limiter.check_at("carol", 400, at(0)).await.is_allowed());
        match limiter.check_at("carol", 400, at(1)).await {
            RateDecision::Denied { reason, current, .. } => {
                assert_eq!(reason, RateLimitReason::TokenBudget);
                assert_eq!(reason.as_str(), "token_budget_exceeded");
                assert_eq!(current, 800);
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_token_estimate_skips_budget_check() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()), 100, 1);
        // Would blow the 1-token budget if it were charged.
        assert!(limiter.check_at("dave", 0, at(0)).await.is_allowed());
        assert!(limiter.check_at("dave", 0, at(1)).await.is_allowed());
    }

    #[tokio::test]
    async fn separate_clients_have_separate_windows() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()), 1, 1_000_000);
        assert!(limiter.check_at("erin", 0, at(0)).await.is_allowed());
        assert!(!limiter.check_at("erin", 0, at(1)).await.is_allowed());
        assert!(limiter.check_at("frank", 0, at(1)).await.is_allowed());
    }

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn window_count(
            &self,
            _key: &str,
            _now: DateTime<Utc>,
            _window: Duration,
        ) -> Result<u32, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn add_and_get(
            &self,
            _key: &str,
            _amount: u64,
            _ttl: Duration,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn fails_open_when_store_is_down() {
        let limiter = limiter_with(Arc::new(DownStore), 1, 1);
        match limiter.check_at("grace", 999, at(0)).await {
            RateDecision::Allowed { degraded, .. } => assert!(degraded),
            other => panic!("expected degraded allow, got {other:?}"),
        }
    }
}
