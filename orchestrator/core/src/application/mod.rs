// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod session_manager;

// Re-export the protective wrappers for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitBreakerRegistry, CircuitState};
pub use rate_limiter::{RateDecision, RateLimitReason, RateLimiter};
pub use session_manager::SessionManager;
