// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Swarm Core Configuration Types
//
// Plain serde-deserializable configuration for the resilience primitives
// and the session manager. Durations accept humantime strings ("60s",
// "1h") in config files. Every struct has working defaults so a bare
// construction is a valid deployment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one named circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` before the breaker trips.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an `Open` breaker refuses calls before allowing a trial.
    #[serde(default = "default_recovery_timeout", with = "humantime_serde")]
    pub recovery_timeout: Duration,

    /// Wall-clock budget applied to every wrapped call; an overrun counts
    /// as a failure. `None` disables the budget.
    #[serde(default = "default_call_timeout", with = "humantime_serde::option")]
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
            call_timeout: default_call_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_call_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

/// Configuration for the per-client admission gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed inside the trailing one-minute window.
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,

    /// Estimated tokens a client may spend per UTC day.
    #[serde(default = "default_daily_tokens")]
    pub daily_token_limit: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rpm(),
            daily_token_limit: default_daily_tokens(),
        }
    }
}

fn default_rpm() -> u32 {
    60
}

fn default_daily_tokens() -> u64 {
    100_000
}

/// Configuration for the session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle longer than this are destroyed by the sweep.
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Hard bound on live sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Interval between background sweep cycles.
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Evict the least-recently-active session instead of refusing a create
    /// once `max_sessions` is reached.
    #[serde(default = "default_true")]
    pub evict_lra_at_capacity: bool,

    /// Retained conversational turns per session.
    #[serde(default = "default_memory_turns")]
    pub memory_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl: default_session_ttl(),
            max_sessions: default_max_sessions(),
            sweep_interval: default_sweep_interval(),
            evict_lra_at_capacity: true,
            memory_turns: default_memory_turns(),
        }
    }
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_sessions() -> usize {
    10_000
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_memory_turns() -> usize {
    20
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_baseline() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.session_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.max_sessions, 10_000);
        assert!(cfg.evict_lra_at_capacity);

        let rl = RateLimitConfig::default();
        assert_eq!(rl.requests_per_minute, 60);
        assert_eq!(rl.daily_token_limit, 100_000);
    }

    #[test]
    fn durations_accept_humantime_strings() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{"session_ttl": "2h", "sweep_interval": "30s"}"#,
        )
        .unwrap();
        assert_eq!(cfg.session_ttl, Duration::from_secs(7200));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(30));

        let cb: CircuitBreakerConfig =
            serde_json::from_str(r#"{"recovery_timeout": "90s"}"#).unwrap();
        assert_eq!(cb.recovery_timeout, Duration::from_secs(90));
        assert_eq!(cb.failure_threshold, 5);
    }
}
