// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-swarm-core` — Domain Contracts & Resilience Primitives
//!
//! Shared foundation for the AEGIS swarm: the execution-backend seam, the
//! keyed counter-store seam, agent session lifecycle, and the protective
//! wrappers (circuit breaker, rate limiter) every downstream call site
//! routes through.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `ExecutionBackend`, `CounterStore`, session aggregates, config |
//! | [`application`] | Application | `CircuitBreaker`, `RateLimiter`, `SessionManager` |
//! | [`infrastructure`] | Infrastructure | Ollama adapter, in-memory store |

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
