// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Session Aggregates
//!
//! Defines the stateful per-user session owned by the
//! [`SessionManager`](crate::application::session_manager::SessionManager):
//!
//! - [`AgentSession`] — aggregate root; mutated only through manager
//!   operations, never handed out by reference.
//! - [`SessionId`] — unique identifier (UUID newtype).
//! - [`SessionState`] — `Initializing → Active ⇄ Idle → Destroyed`;
//!   `Destroyed` is absorbing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for an [`AgentSession`].
///
/// Ordered so it can serve as a tiebreaker in deadline-keyed indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new random `SessionId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Session lifecycle state.
///
/// Transitions only move rightward except `Active ⇄ Idle`; `Destroyed` is
/// terminal and a destroyed id is never reused or resurrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Active,
    Idle,
    Destroyed,
}

/// One live notification channel attached to a session (e.g. a WebSocket
/// held by the presentation layer). On destroy, each channel receives
/// [`SessionSignal::GoingAway`] before the session is dropped.
#[derive(Debug)]
pub struct SessionChannel {
    pub sender: mpsc::UnboundedSender<SessionSignal>,
}

/// Signals delivered to attached channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// The session is being torn down; the peer should not expect further
    /// traffic (WebSocket close code 1001 in the presentation layer).
    GoingAway,
}

/// Resources owned exclusively by a session and released on destroy.
#[derive(Debug, Default)]
pub struct SessionResources {
    /// Retained conversational turns, newest last. Bounded by the manager.
    pub memory: Vec<ConversationTurn>,

    /// Live channels to notify on teardown.
    pub channels: Vec<SessionChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Aggregate root for a stateful per-user agent session.
#[derive(Debug)]
pub struct AgentSession {
    pub id: SessionId,
    pub user_id: String,
    pub agent_type: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: SessionState,
    pub resources: SessionResources,
}

impl AgentSession {
    pub fn new(user_id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id: user_id.into(),
            agent_type: agent_type.into(),
            created_at: now,
            last_activity: now,
            state: SessionState::Initializing,
            resources: SessionResources::default(),
        }
    }

    /// Refresh `last_activity`. Monotone: a touch never moves it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
        if self.state == SessionState::Idle {
            self.state = SessionState::Active;
        }
    }
}

/// Caller-visible snapshot of a session. `get_session` hands out copies,
/// never references into the manager's table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub user_id: String,
    pub agent_type: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: SessionState,
}

impl From<&AgentSession> for SessionSnapshot {
    fn from(s: &AgentSession) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id.clone(),
            agent_type: s.agent_type.clone(),
            created_at: s.created_at,
            last_activity: s.last_activity,
            state: s.state,
        }
    }
}

/// Durable form of a session, written to the keyed store so a session can
/// outlive the process (or an eviction) and be rebuilt later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    pub snapshot: SessionSnapshot,
    pub memory: Vec<ConversationTurn>,
}

/// Errors surfaced across the session manager boundary.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The configured maximum of live sessions has been reached and no
    /// session was eligible for eviction. Callers must not retry in a
    /// tight loop.
    #[error("Session capacity exceeded ({0} live sessions)")]
    CapacityExceeded(usize),

    #[error("Session checkpoint failed: {0}")]
    Checkpoint(String),
}
