// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Circuit Breaker
//!
//! Three-state guard (`Closed → Open → HalfOpen → Closed|Open`) for one
//! named downstream dependency. Repeated failures trip the breaker open;
//! while open, calls fail fast without touching the dependency; after the
//! recovery timeout exactly one trial call is let through, and its outcome
//! decides whether the breaker closes again or re-opens.
//!
//! Every state transition happens under a single mutex region per breaker,
//! so concurrent callers never race into inconsistent states (in
//! particular, two callers can never both believe they are the trial call).
//! The trial slot is held through an RAII guard: if the trial future is
//! dropped before it resolves (the caller raced it against a timeout or
//! select), the breaker re-opens instead of staying wedged half-open.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::config::CircuitBreakerConfig;

/// Breaker state as observed between transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// Dependency considered down; calls fail fast.
    Open,
    /// Recovery timeout elapsed; one trial call in flight.
    HalfOpen,
}

/// Error surfaced to callers of [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open; the dependency was not invoked. Callers should
    /// treat this as "currently unavailable, do not retry immediately".
    #[error("Circuit '{name}' is open, retry after {retry_after:?}")]
    Open { name: String, retry_after: Duration },

    /// The wrapped call exceeded the configured budget; counted as a failure.
    #[error("Circuit '{name}' call timed out after {budget:?}")]
    Timeout { name: String, budget: Duration },

    /// The wrapped call itself failed; counted as a failure.
    #[error(transparent)]
    Inner(E),
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    /// Set while the half-open trial call is in flight.
    trial_in_flight: bool,
}

/// Guards one named downstream dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Held by the caller that owns the half-open trial. Dropped without a
/// recorded outcome (the wrapped future was cancelled mid-flight), it
/// re-opens the breaker so the trial slot cannot be lost forever.
struct TrialSlot<'a> {
    breaker: &'a CircuitBreaker,
}

impl Drop for TrialSlot<'_> {
    fn drop(&mut self) {
        let mut inner = self.breaker.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.state = CircuitState::Open;
            inner.trial_in_flight = false;
            inner.last_failure = Some(Instant::now());
            metrics::counter!("swarm_circuit_opened_total", "breaker" => self.breaker.name.clone())
                .increment(1);
            warn!(
                breaker = %self.breaker.name,
                "Trial call cancelled before completing, circuit re-opened"
            );
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Invoke `fut` under the breaker's protection.
    ///
    /// The state decision is taken before the future is polled; an open
    /// breaker rejects without constructing any downstream work.
    pub async fn call<F, T, E>(&self, fut: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        // Kept alive across the await so cancellation releases the trial.
        let _trial = self.admit()?;

        let outcome = match self.config.call_timeout {
            Some(budget) => match tokio::time::timeout(budget, fut).await {
                Ok(result) => result.map_err(CircuitBreakerError::Inner),
                Err(_) => Err(CircuitBreakerError::Timeout {
                    name: self.name.clone(),
                    budget,
                }),
            },
            None => fut.await.map_err(CircuitBreakerError::Inner),
        };

        match outcome {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }

    /// Decide whether the caller may proceed, transitioning `Open → HalfOpen`
    /// when the recovery timeout has elapsed. Returns the trial slot when
    /// this caller is the half-open trial.
    fn admit<E>(&self) -> Result<Option<TrialSlot<'_>>, CircuitBreakerError<E>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(None),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(breaker = %self.name, "Circuit moving to half-open, testing recovery");
                    Ok(Some(TrialSlot { breaker: self }))
                } else {
                    Err(CircuitBreakerError::Open {
                        name: self.name.clone(),
                        retry_after: self.config.recovery_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    // Someone else holds the trial slot.
                    Err(CircuitBreakerError::Open {
                        name: self.name.clone(),
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(Some(TrialSlot { breaker: self }))
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.trial_in_flight = false;
                info!(breaker = %self.name, "Circuit recovered, now closed");
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        warn!(
            breaker = %self.name,
            failures = inner.failure_count,
            "Circuit recorded a failure"
        );

        match inner.state {
            CircuitState::HalfOpen => {
                // Any failure during the trial immediately re-opens.
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
                metrics::counter!("swarm_circuit_opened_total", "breaker" => self.name.clone())
                    .increment(1);
                warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                metrics::counter!("swarm_circuit_opened_total", "breaker" => self.name.clone())
                    .increment(1);
                warn!(breaker = %self.name, "Failure threshold reached, circuit is now open");
            }
            _ => {}
        }
    }
}

/// Explicitly constructed collection of breakers, one per named dependency.
/// Injected wherever downstream calls are made; there is no process-global
/// registry.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get or create the breaker guarding `name`.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }
}
