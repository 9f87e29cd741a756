// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Session Manager
//!
//! Owns the lifecycle of stateful per-user agent sessions: bounded in
//! count, expired by inactivity, destroyed exactly once.
//!
//! Expiry is tracked with an explicit min-heap index keyed by deadline,
//! swept by a fixed-interval background task. The sweep destroys any
//! session idle past the TTL even if it was never looked up again after
//! creation; lookups refresh the deadline (a "touch").

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::backend::ExecutionBackend;
use crate::domain::config::SessionConfig;
use crate::domain::session::{
    AgentSession, ConversationTurn, SessionChannel, SessionCheckpoint, SessionError, SessionId,
    SessionResources, SessionSignal, SessionSnapshot, SessionState,
};
use crate::domain::store::KeyedStore;

struct SessionTable {
    sessions: HashMap<SessionId, AgentSession>,
    /// Min-heap of (deadline, id). Entries are lazily invalidated: a touch
    /// pushes a fresh entry and stale ones are skipped when popped.
    expiry: BinaryHeap<Reverse<(DateTime<Utc>, SessionId)>>,
}

/// Manages agent sessions with bounded capacity and TTL cleanup.
pub struct SessionManager {
    config: SessionConfig,
    ttl: TimeDelta,
    backend: Arc<dyn ExecutionBackend>,
    checkpoints: Option<Arc<dyn KeyedStore>>,
    inner: Mutex<SessionTable>,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn ExecutionBackend>, config: SessionConfig) -> Self {
        // Absurdly large TTLs clamp to a century rather than overflowing
        // deadline arithmetic.
        let ttl = TimeDelta::from_std(config.session_ttl)
            .unwrap_or_else(|_| TimeDelta::days(365 * 100));
        Self {
            config,
            ttl,
            backend,
            checkpoints: None,
            inner: Mutex::new(SessionTable {
                sessions: HashMap::new(),
                expiry: BinaryHeap::new(),
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Attach a durable store for session checkpoints.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn KeyedStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Allocate and initialize a new session.
    ///
    /// At capacity the least-recently-active session is evicted first (when
    /// enabled); otherwise the call fails with
    /// [`SessionError::CapacityExceeded`]. Capacity is re-examined under the
    /// same lock that inserts, so concurrent creates either find room, evict,
    /// or error, and the bound is never exceeded.
    pub async fn create_session(
        &self,
        user_id: &str,
        agent_type: &str,
    ) -> Result<SessionId, SessionError> {
        let mut session = AgentSession::new(user_id, agent_type);
        self.initialize(&mut session).await;
        let id = session.id;

        let mut pending = Some(session);
        loop {
            let victim = {
                let mut inner = self.inner.lock();
                if inner.sessions.len() < self.config.max_sessions {
                    if let Some(s) = pending.take() {
                        inner.expiry.push(Reverse((s.last_activity + self.ttl, id)));
                        inner.sessions.insert(id, s);
                        metrics::gauge!("swarm_sessions_live").set(inner.sessions.len() as f64);
                    }
                    None
                } else if !self.config.evict_lra_at_capacity {
                    return Err(SessionError::CapacityExceeded(inner.sessions.len()));
                } else {
                    match inner.sessions.values().min_by_key(|s| s.last_activity) {
                        Some(lra) => Some(lra.id),
                        // At "capacity" with nothing to evict (max of zero).
                        None => return Err(SessionError::CapacityExceeded(inner.sessions.len())),
                    }
                }
            };
            match victim {
                Some(victim) => {
                    info!(session = %victim, "Evicting least-recently-active session at capacity");
                    self.destroy_session(victim);
                }
                None => break,
            }
        }

        info!(session = %id, user = user_id, agent_type, "Created agent session");
        Ok(id)
    }

    /// Wire backend resources for a fresh session. A backend that is not
    /// reachable yet is tolerated; the session starts with limited
    /// functionality rather than failing creation.
    async fn initialize(&self, session: &mut AgentSession) {
        if let Err(e) = self.backend.health_check().await {
            warn!(session = %session.id, error = %e, "Backend unreachable during session init");
        }
        session.state = SessionState::Active;
    }

    /// Look up a session. A hit refreshes `last_activity`, extending the
    /// session's effective lifetime.
    pub fn get_session(&self, id: SessionId) -> Option<SessionSnapshot> {
        let mut inner = self.inner.lock();
        let ttl = self.ttl;
        let session = inner.sessions.get_mut(&id)?;
        session.touch(Utc::now());
        let snapshot = SessionSnapshot::from(&*session);
        let deadline = session.last_activity + ttl;
        inner.expiry.push(Reverse((deadline, id)));
        Some(snapshot)
    }

    /// Destroy a session, releasing everything it owns. Idempotent; returns
    /// `false` for ids that are not (or no longer) live.
    pub fn destroy_session(&self, id: SessionId) -> bool {
        let session = {
            let mut inner = self.inner.lock();
            let removed = inner.sessions.remove(&id);
            metrics::gauge!("swarm_sessions_live").set(inner.sessions.len() as f64);
            removed
        };
        let Some(mut session) = session else {
            return false;
        };

        session.state = SessionState::Destroyed;
        for channel in session.resources.channels.drain(..) {
            // Peer may already be gone; a dead channel is not an error here.
            let _ = channel.sender.send(SessionSignal::GoingAway);
        }
        session.resources.memory.clear();

        info!(session = %id, "Destroyed agent session");
        true
    }

    /// Append a conversational turn to a session's retained memory,
    /// bounded by `memory_turns` (oldest dropped first). Counts as a touch.
    pub fn record_turn(&self, id: SessionId, role: &str, content: &str) -> bool {
        let mut inner = self.inner.lock();
        let ttl = self.ttl;
        let Some(session) = inner.sessions.get_mut(&id) else {
            return false;
        };
        session.resources.memory.push(ConversationTurn {
            role: role.to_string(),
            content: content.to_string(),
        });
        let cap = self.config.memory_turns;
        let len = session.resources.memory.len();
        if len > cap {
            session.resources.memory.drain(0..len - cap);
        }
        session.touch(Utc::now());
        let deadline = session.last_activity + ttl;
        inner.expiry.push(Reverse((deadline, id)));
        true
    }

    /// Attach a live notification channel to a session. The channel receives
    /// [`SessionSignal::GoingAway`] when the session is destroyed.
    pub fn attach_channel(
        &self,
        id: SessionId,
        sender: tokio::sync::mpsc::UnboundedSender<SessionSignal>,
    ) -> bool {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(&id) {
            Some(session) => {
                session.resources.channels.push(SessionChannel { sender });
                true
            }
            None => false,
        }
    }

    pub fn live_sessions(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    fn checkpoint_key(id: SessionId) -> String {
        format!("session:checkpoint:{id}")
    }

    /// Persist a session's current state to the checkpoint store, under the
    /// session TTL. `Ok(false)` when no store is attached or the id is not
    /// live.
    pub async fn checkpoint_session(&self, id: SessionId) -> Result<bool, SessionError> {
        let Some(store) = &self.checkpoints else {
            return Ok(false);
        };
        let record = {
            let inner = self.inner.lock();
            let Some(session) = inner.sessions.get(&id) else {
                return Ok(false);
            };
            SessionCheckpoint {
                snapshot: SessionSnapshot::from(session),
                memory: session.resources.memory.clone(),
            }
        };
        let bytes =
            serde_json::to_vec(&record).map_err(|e| SessionError::Checkpoint(e.to_string()))?;
        store
            .put(&Self::checkpoint_key(id), bytes, self.config.session_ttl)
            .await
            .map_err(|e| SessionError::Checkpoint(e.to_string()))?;
        debug!(session = %id, "Checkpointed session");
        Ok(true)
    }

    /// Rebuild a session from its checkpoint, e.g. after an eviction or a
    /// process restart. `Ok(false)` when the id is still live, no store is
    /// attached, or no checkpoint exists. The restored session starts Active
    /// with a fresh `last_activity` and no attached channels.
    pub async fn restore_session(&self, id: SessionId) -> Result<bool, SessionError> {
        let Some(store) = &self.checkpoints else {
            return Ok(false);
        };
        if self.inner.lock().sessions.contains_key(&id) {
            return Ok(false);
        }
        let Some(bytes) = store
            .get(&Self::checkpoint_key(id))
            .await
            .map_err(|e| SessionError::Checkpoint(e.to_string()))?
        else {
            return Ok(false);
        };
        let checkpoint: SessionCheckpoint =
            serde_json::from_slice(&bytes).map_err(|e| SessionError::Checkpoint(e.to_string()))?;

        let now = Utc::now();
        let session = AgentSession {
            id,
            user_id: checkpoint.snapshot.user_id,
            agent_type: checkpoint.snapshot.agent_type,
            created_at: checkpoint.snapshot.created_at,
            last_activity: now,
            state: SessionState::Active,
            resources: SessionResources {
                memory: checkpoint.memory,
                channels: Vec::new(),
            },
        };

        let mut inner = self.inner.lock();
        if inner.sessions.len() >= self.config.max_sessions {
            return Err(SessionError::CapacityExceeded(inner.sessions.len()));
        }
        inner.expiry.push(Reverse((now + self.ttl, id)));
        inner.sessions.insert(id, session);
        metrics::gauge!("swarm_sessions_live").set(inner.sessions.len() as f64);
        info!(session = %id, "Restored session from checkpoint");
        Ok(true)
    }

    /// Run one sweep cycle against the given clock, destroying every session
    /// idle past the TTL. Returns the number destroyed.
    pub fn sweep_cycle(&self, now: DateTime<Utc>) -> usize {
        // A set, not a list: one session can have several stale heap
        // entries, but must be counted and destroyed once.
        let mut expired = HashSet::new();
        {
            let mut inner = self.inner.lock();
            while let Some(&Reverse((deadline, id))) = inner.expiry.peek() {
                if deadline > now {
                    break;
                }
                inner.expiry.pop();
                if let Some(session) = inner.sessions.get(&id) {
                    // A touch since this entry was queued pushed a fresh one;
                    // only the entry matching the real deadline counts.
                    if session.last_activity + self.ttl <= now {
                        expired.insert(id);
                    }
                }
            }

            // Sessions halfway to expiry drop back to Idle.
            let half_ttl = self.ttl / 2;
            for session in inner.sessions.values_mut() {
                if session.state == SessionState::Active && now - session.last_activity > half_ttl {
                    session.state = SessionState::Idle;
                }
            }
        }

        for id in &expired {
            debug!(session = %id, "Pruning stale session");
            self.destroy_session(*id);
        }
        expired.len()
    }

    /// Start the background sweep. Returns the task handle; use
    /// [`shutdown`](Self::shutdown) to stop it.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_sweep().await;
        })
    }

    async fn run_sweep(&self) {
        info!(
            ttl = ?self.config.session_ttl,
            interval = ?self.config.sweep_interval,
            max_sessions = self.config.max_sessions,
            "Session sweep started"
        );
        let mut tick = interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let pruned = self.sweep_cycle(Utc::now());
                    if pruned > 0 {
                        info!(pruned, "Session sweep cycle destroyed stale sessions");
                        metrics::counter!("swarm_sessions_swept_total").increment(pruned as u64);
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping session sweep");
                    break;
                }
            }
        }
    }

    /// Cancel the sweep and destroy all remaining sessions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let ids: Vec<SessionId> = self.inner.lock().sessions.keys().copied().collect();
        for id in ids {
            self.destroy_session(id);
        }
        info!("Session manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backend::{
        BackendError, GenerationOptions, GenerationResponse, TokenUsage,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubBackend;

    #[async_trait]
    impl ExecutionBackend for StubBackend {
        async fn generate(
            &self,
            _prompt: &str,
            model: &str,
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, BackendError> {
            Ok(GenerationResponse {
                text: String::new(),
                usage: TokenUsage::default(),
                model: model.to_string(),
                finish_reason: crate::domain::backend::FinishReason::Stop,
            })
        }

        async fn health_check(&self) -> Result<(), BackendError> {
            Ok(())
        }

        async fn is_model_loaded(&self, _model: &str) -> Result<bool, BackendError> {
            Ok(true)
        }

        async fn load_model(&self, _model: &str) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn manager(config: SessionConfig) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(Arc::new(StubBackend), config))
    }

    #[tokio::test]
    async fn create_get_destroy_roundtrip() {
        let mgr = manager(SessionConfig::default());
        let id = mgr.create_session("alice", "universal").await.unwrap();

        let snapshot = mgr.get_session(id).expect("session should exist");
        assert_eq!(snapshot.user_id, "alice");
        assert_eq!(snapshot.state, SessionState::Active);

        assert!(mgr.destroy_session(id));
        assert!(mgr.get_session(id).is_none());
        // Idempotent.
        assert!(!mgr.destroy_session(id));
    }

    #[tokio::test]
    async fn get_refreshes_last_activity() {
        let mgr = manager(SessionConfig::default());
        let id = mgr.create_session("alice", "universal").await.unwrap();
        let first = mgr.get_session(id).unwrap().last_activity;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = mgr.get_session(id).unwrap().last_activity;
        assert!(second >= first);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_active() {
        let mgr = manager(SessionConfig {
            max_sessions: 2,
            ..SessionConfig::default()
        });
        let a = mgr.create_session("a", "t").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = mgr.create_session("b", "t").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Touch `a` so `b` becomes least recently active.
        mgr.get_session(a);

        let c = mgr.create_session("c", "t").await.unwrap();
        assert_eq!(mgr.live_sessions(), 2);
        assert!(mgr.get_session(b).is_none(), "b should have been evicted");
        assert!(mgr.get_session(a).is_some());
        assert!(mgr.get_session(c).is_some());
    }

    #[tokio::test]
    async fn capacity_errors_when_eviction_disabled() {
        let mgr = manager(SessionConfig {
            max_sessions: 1,
            evict_lra_at_capacity: false,
            ..SessionConfig::default()
        });
        mgr.create_session("a", "t").await.unwrap();
        let err = mgr.create_session("b", "t").await.unwrap_err();
        assert!(matches!(err, SessionError::CapacityExceeded(1)));
    }

    #[tokio::test]
    async fn sweep_destroys_expired_and_keeps_touched() {
        let mgr = manager(SessionConfig {
            session_ttl: Duration::from_secs(60),
            ..SessionConfig::default()
        });
        let stale = mgr.create_session("stale", "t").await.unwrap();
        let live = mgr.create_session("live", "t").await.unwrap();

        // Touch `live` a minute from now, then sweep 90s out: `stale` has
        // been idle past the TTL, `live` has not.
        let now = Utc::now();
        {
            let mut inner = mgr.inner.lock();
            let session = inner.sessions.get_mut(&live).unwrap();
            session.touch(now + TimeDelta::seconds(60));
            let deadline = session.last_activity + mgr.ttl;
            inner.expiry.push(Reverse((deadline, live)));
        }

        let pruned = mgr.sweep_cycle(now + TimeDelta::seconds(90));
        assert_eq!(pruned, 1);
        assert!(mgr.get_session(stale).is_none());
        assert!(mgr.get_session(live).is_some());
    }

    #[tokio::test]
    async fn repeated_touches_keep_session_alive_indefinitely() {
        let mgr = manager(SessionConfig {
            session_ttl: Duration::from_secs(60),
            ..SessionConfig::default()
        });
        let id = mgr.create_session("alice", "t").await.unwrap();
        let start = Utc::now();

        // Touch every TTL/2 for several TTLs worth of simulated time.
        for i in 1..=8 {
            let now = start + TimeDelta::seconds(30 * i);
            {
                let mut inner = mgr.inner.lock();
                let session = inner.sessions.get_mut(&id).unwrap();
                session.touch(now);
                let deadline = session.last_activity + mgr.ttl;
                inner.expiry.push(Reverse((deadline, id)));
            }
            assert_eq!(mgr.sweep_cycle(now), 0, "touched session must survive");
        }
        assert!(mgr.get_session(id).is_some());
    }

    #[tokio::test]
    async fn destroy_signals_attached_channels() {
        let mgr = manager(SessionConfig::default());
        let id = mgr.create_session("alice", "t").await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        assert!(mgr.attach_channel(id, tx));
        assert!(mgr.destroy_session(id));

        assert_eq!(rx.recv().await, Some(SessionSignal::GoingAway));
    }

    #[tokio::test]
    async fn memory_is_bounded_and_cleared_on_destroy() {
        let mgr = manager(SessionConfig {
            memory_turns: 3,
            ..SessionConfig::default()
        });
        let id = mgr.create_session("alice", "t").await.unwrap();
        for i in 0..10 {
            assert!(mgr.record_turn(id, "user", &format!("turn {i}")));
        }
        {
            let inner = mgr.inner.lock();
            let memory = &inner.sessions[&id].resources.memory;
            assert_eq!(memory.len(), 3);
            assert_eq!(memory[2].content, "turn 9");
        }
        assert!(mgr.destroy_session(id));
    }

    #[tokio::test]
    async fn background_sweep_prunes_on_wall_clock() {
        let mgr = manager(SessionConfig {
            session_ttl: Duration::from_millis(50),
            sweep_interval: Duration::from_millis(20),
            ..SessionConfig::default()
        });
        let id = mgr.create_session("alice", "t").await.unwrap();
        let handle = mgr.start();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(mgr.get_session(id).is_none(), "sweep should have pruned it");

        mgr.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_expiry_entries_count_once() {
        let mgr = manager(SessionConfig {
            session_ttl: Duration::from_secs(60),
            ..SessionConfig::default()
        });
        let id = mgr.create_session("alice", "t").await.unwrap();
        {
            let mut inner = mgr.inner.lock();
            let deadline = inner.sessions[&id].last_activity + mgr.ttl;
            inner.expiry.push(Reverse((deadline, id)));
            inner.expiry.push(Reverse((deadline, id)));
        }

        let pruned = mgr.sweep_cycle(Utc::now() + TimeDelta::seconds(90));
        assert_eq!(pruned, 1);
        assert_eq!(mgr.live_sessions(), 0);
    }

    #[tokio::test]
    async fn concurrent_creates_evict_rather_than_error() {
        let mgr = manager(SessionConfig {
            max_sessions: 4,
            ..SessionConfig::default()
        });

        let mut handles = Vec::new();
        for i in 0..32 {
            let mgr = Arc::clone(&mgr);
            handles.push(tokio::spawn(async move {
                mgr.create_session(&format!("user-{i}"), "t").await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert!(mgr.live_sessions() <= 4);
    }

    #[tokio::test]
    async fn checkpoint_restore_roundtrip_preserves_memory() {
        let store = Arc::new(crate::infrastructure::memory_store::MemoryStore::new());
        let mgr = Arc::new(
            SessionManager::new(Arc::new(StubBackend), SessionConfig::default())
                .with_checkpoint_store(store),
        );
        let id = mgr.create_session("alice", "universal").await.unwrap();
        mgr.record_turn(id, "user", "remember this");
        assert!(mgr.checkpoint_session(id).await.unwrap());

        assert!(mgr.destroy_session(id));
        assert!(mgr.get_session(id).is_none());

        assert!(mgr.restore_session(id).await.unwrap());
        let snapshot = mgr.get_session(id).expect("restored session is live");
        assert_eq!(snapshot.user_id, "alice");
        assert_eq!(snapshot.state, SessionState::Active);
        {
            let inner = mgr.inner.lock();
            assert_eq!(inner.sessions[&id].resources.memory[0].content, "remember this");
        }

        // Live sessions are not restored over.
        assert!(!mgr.restore_session(id).await.unwrap());
    }

    #[tokio::test]
    async fn checkpoint_without_store_is_a_noop() {
        let mgr = manager(SessionConfig::default());
        let id = mgr.create_session("alice", "t").await.unwrap();
        assert!(!mgr.checkpoint_session(id).await.unwrap());
        assert!(!mgr.restore_session(id).await.unwrap());
    }

    #[tokio::test]
    async fn shutdown_destroys_remaining_sessions() {
        let mgr = manager(SessionConfig::default());
        mgr.create_session("a", "t").await.unwrap();
        mgr.create_session("b", "t").await.unwrap();
        mgr.shutdown();
        assert_eq!(mgr.live_sessions(), 0);
    }
}
