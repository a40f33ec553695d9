use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::stream::Stream;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::rng::RandomSource;
use crate::session::{ScanSession, SessionHandle};
use crate::strategy::ProbeStrategy;
use crate::types::{
    LogEntry, ProbeInput, Progress, SessionId, SessionState, SessionSummary, SessionView,
    TargetDescriptor,
};

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<SessionId, SessionHandle>,
    /// Start order, oldest first.
    order: VecDeque<SessionId>,
    active: Option<SessionId>,
}

impl Registry {
    fn running(&self) -> Option<SessionId> {
        let id = self.active?;
        let handle = self.sessions.get(&id)?;
        (handle.state() == SessionState::Running).then_some(id)
    }

    /// Drop the oldest terminated sessions beyond `retain`.
    fn evict(&mut self, retain: usize) {
        let terminated: Vec<SessionId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.sessions.get(id).is_some_and(|h| h.state().is_terminal()))
            .collect();
        let excess = terminated.len().saturating_sub(retain);
        for id in terminated.into_iter().take(excess) {
            self.sessions.remove(&id);
            self.order.retain(|x| *x != id);
        }
    }
}

/// Public entry point: owns a registry of sessions and allows at most one
/// running session at a time.
#[derive(Debug)]
pub struct SessionController {
    config: EngineConfig,
    registry: RwLock<Registry>,
    shutdown: CancellationToken,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl SessionController {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a session with the configured random source.
    pub async fn start_scan(
        &self,
        target: TargetDescriptor,
        inputs: Vec<ProbeInput>,
        strategy: Arc<dyn ProbeStrategy>,
    ) -> EngineResult<SessionId> {
        self.start_scan_with_rng(target, inputs, strategy, self.config.random_source())
            .await
    }

    /// Variant taking an explicit random source (seeded or scripted).
    ///
    /// Rejections (`InvalidInput`, `Conflict`) happen before anything is
    /// registered or spawned, so earlier sessions are never touched.
    pub async fn start_scan_with_rng(
        &self,
        target: TargetDescriptor,
        inputs: Vec<ProbeInput>,
        strategy: Arc<dyn ProbeStrategy>,
        rng: Box<dyn RandomSource>,
    ) -> EngineResult<SessionId> {
        let mut session = ScanSession::new(target, inputs, strategy, rng)?
            .with_cancel_token(self.shutdown.child_token());
        if let Some(pacing) = self.config.pacing {
            session = session.with_pacing(pacing);
        }

        let mut reg = self.registry.write().await;
        if let Some(active) = reg.running() {
            return Err(EngineError::Conflict { active });
        }
        session.start().await?;
        let handle = session.handle();
        let id = handle.id();
        let task = tokio::spawn(session.run());
        tokio::spawn(async move {
            // The handle reads a dead task as cancelled; just report it.
            if let Err(e) = task.await {
                error!(session = %id, error = %e, "session task failed");
            }
        });

        reg.sessions.insert(id, handle);
        reg.order.push_back(id);
        reg.active = Some(id);
        reg.evict(self.config.retain_sessions);
        Ok(id)
    }

    /// Request cancellation. Cancelling a session that is not running is a no-op.
    pub async fn cancel(&self, id: SessionId) -> EngineResult<()> {
        self.handle(id).await?.cancel();
        Ok(())
    }

    /// Cancel whatever is running and make every later session start cancelled.
    pub fn shutdown(&self) {
        info!("controller shutting down");
        self.shutdown.cancel();
    }

    /// Resolves once `shutdown` has been called.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }

    pub async fn get_snapshot(&self, id: SessionId) -> EngineResult<SessionView> {
        Ok(self.handle(id).await?.snapshot().await)
    }

    /// Final tallies; only available once the session has terminated.
    pub async fn get_summary(&self, id: SessionId) -> EngineResult<SessionSummary> {
        let handle = self.handle(id).await?;
        let state = handle.state();
        if !state.is_terminal() {
            return Err(EngineError::InvalidState {
                id,
                state,
                expected: "completed or cancelled",
            });
        }
        Ok(handle.snapshot().await.summary())
    }

    pub async fn progress(&self, id: SessionId) -> EngineResult<Progress> {
        Ok(self.handle(id).await?.progress().await)
    }

    /// Progress of every retained session, oldest first.
    pub async fn list(&self) -> Vec<Progress> {
        let handles: Vec<SessionHandle> = {
            let reg = self.registry.read().await;
            reg.order
                .iter()
                .filter_map(|id| reg.sessions.get(id).cloned())
                .collect()
        };
        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            out.push(h.progress().await);
        }
        out
    }

    pub async fn active(&self) -> Option<SessionId> {
        self.registry.read().await.active
    }

    /// Live log of a session, replayed from its first entry.
    pub async fn subscribe(
        &self,
        id: SessionId,
    ) -> EngineResult<impl Stream<Item = LogEntry> + Send + 'static> {
        Ok(self.handle(id).await?.log().subscribe())
    }

    /// Resolves with the terminal state once the session finishes.
    pub async fn wait(&self, id: SessionId) -> EngineResult<SessionState> {
        Ok(self.handle(id).await?.wait().await)
    }

    async fn handle(&self, id: SessionId) -> EngineResult<SessionHandle> {
        self.registry
            .read()
            .await
            .sessions
            .get(&id)
            .cloned()
            .ok_or(EngineError::UnknownSession(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedRandom;
    use crate::session::Pacing;
    use crate::strategy::PortProbeStrategy;
    use crate::types::ProbeKind;
    use std::collections::BTreeMap;

    fn quick_config() -> EngineConfig {
        EngineConfig {
            pacing: Some(Pacing::default()),
            retain_sessions: 2,
            ..EngineConfig::default()
        }
    }

    fn ports(ps: &[u16]) -> Vec<ProbeInput> {
        ps.iter().copied().map(ProbeInput::port).collect()
    }

    #[tokio::test]
    async fn summary_before_termination_is_invalid_state() {
        let ctl = SessionController::new(EngineConfig {
            pacing: Some(Pacing::fixed(60_000)),
            ..EngineConfig::default()
        });
        let id = ctl
            .start_scan("host".into(), ports(&[1, 2]), ctl.config().strategy(ProbeKind::Port))
            .await
            .unwrap();
        let err = ctl.get_summary(id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { state: SessionState::Running, .. }));
        ctl.cancel(id).await.unwrap();
        assert_eq!(ctl.wait(id).await.unwrap(), SessionState::Cancelled);
        // Cancelling a finished session is accepted and changes nothing.
        ctl.cancel(id).await.unwrap();
        assert_eq!(ctl.get_summary(id).await.unwrap().visited_count, 0);
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let ctl = SessionController::new(quick_config());
        let id = uuid::Uuid::new_v4();
        assert_eq!(ctl.cancel(id).await, Err(EngineError::UnknownSession(id)));
        assert!(ctl.get_snapshot(id).await.is_err());
    }

    #[tokio::test]
    async fn old_terminated_sessions_are_evicted() {
        let ctl = SessionController::new(quick_config());
        let strategy: Arc<dyn ProbeStrategy> = Arc::new(PortProbeStrategy::new(BTreeMap::new()));
        let mut ids = Vec::new();
        for _ in 0..4 {
            let id = ctl
                .start_scan_with_rng(
                    "host".into(),
                    ports(&[80]),
                    strategy.clone(),
                    Box::new(ScriptedRandom::new(vec![0.0])),
                )
                .await
                .unwrap();
            ctl.wait(id).await.unwrap();
            ids.push(id);
        }
        let listed: Vec<SessionId> = ctl.list().await.into_iter().map(|p| p.id).collect();
        assert_eq!(listed.len(), 3);
        assert!(!listed.contains(&ids[0]));
        assert_eq!(ctl.active().await, Some(ids[3]));
    }

    #[tokio::test]
    async fn shutdown_cancels_running_session() {
        let ctl = SessionController::new(EngineConfig {
            pacing: Some(Pacing::fixed(60_000)),
            ..EngineConfig::default()
        });
        let id = ctl
            .start_scan("host".into(), ports(&[1]), ctl.config().strategy(ProbeKind::Port))
            .await
            .unwrap();
        ctl.shutdown();
        assert_eq!(ctl.wait(id).await.unwrap(), SessionState::Cancelled);
    }
}
