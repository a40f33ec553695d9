use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::log::{LogWriter, ResultLog};
use crate::rng::RandomSource;
use crate::strategy::ProbeStrategy;
use crate::types::{
    ProbeInput, ProbeKind, Progress, SessionId, SessionState, SessionView, Severity,
    TargetDescriptor,
};

/// Delay before each probe: `min_ms` plus a uniform jitter in `0..=jitter_ms`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pacing {
    pub min_ms: u64,
    pub jitter_ms: u64,
}

impl Pacing {
    pub const fn new(min_ms: u64, jitter_ms: u64) -> Self {
        Self { min_ms, jitter_ms }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self::new(ms, 0)
    }

    /// Jitter comes from the thread RNG, never from the strategy's source,
    /// so pacing cannot shift strategy draws.
    pub fn delay(&self) -> Duration {
        let extra = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(self.min_ms.saturating_add(extra))
    }
}

/// One run of a strategy over an ordered input list.
///
/// Inputs are visited strictly in index order, one at a time. The per-step
/// delay is the only suspension point and is interrupted by cancellation;
/// an input is either fully evaluated or never touched.
pub struct ScanSession {
    id: SessionId,
    target: TargetDescriptor,
    inputs: Arc<[ProbeInput]>,
    strategy: Arc<dyn ProbeStrategy>,
    rng: Box<dyn RandomSource>,
    pacing: Pacing,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    writer: LogWriter,
}

impl ScanSession {
    /// Build an idle session. Rejects a malformed target, an empty input
    /// list, or inputs the strategy cannot probe.
    pub fn new(
        target: TargetDescriptor,
        inputs: Vec<ProbeInput>,
        strategy: Arc<dyn ProbeStrategy>,
        rng: Box<dyn RandomSource>,
    ) -> EngineResult<Self> {
        validate(&target, &inputs, strategy.as_ref())?;
        let pacing = strategy.default_pacing();
        let (writer, _) = ResultLog::new();
        let (state, _) = watch::channel(SessionState::Idle);
        Ok(Self {
            id: Uuid::new_v4(),
            target,
            inputs: inputs.into(),
            strategy,
            rng,
            pacing,
            cancel: CancellationToken::new(),
            state,
            writer,
        })
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Use an externally owned token (e.g. a child of a controller-wide one).
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn log(&self) -> ResultLog {
        self.writer.reader()
    }

    /// Reader-side handle that outlives the session's run.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            kind: self.strategy.kind(),
            target: self.target.clone(),
            inputs: self.inputs.clone(),
            log: self.log(),
            cancel: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Request cancellation. No-op unless the session is running.
    pub fn cancel(&self) {
        if self.state() == SessionState::Running {
            self.cancel.cancel();
        }
    }

    /// `idle -> running`, logging the target and input count.
    pub async fn start(&mut self) -> EngineResult<()> {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(EngineError::InvalidState {
                id: self.id,
                state,
                expected: "idle",
            });
        }
        self.state.send_replace(SessionState::Running);
        let kind = self.strategy.kind();
        info!(session = %self.id, %kind, target = %self.target, inputs = self.inputs.len(), "session started");
        self.writer
            .append(
                None,
                Severity::Info,
                format!(
                    "Starting {} on {} ({} inputs)",
                    kind.title(),
                    self.target,
                    self.inputs.len()
                ),
            )
            .await;
        for line in self.strategy.preamble(&self.inputs) {
            self.writer.append(None, Severity::Info, line).await;
        }
        Ok(())
    }

    /// Drive the session to a terminal state, starting it first if idle.
    pub async fn run(mut self) -> SessionState {
        match self.state() {
            SessionState::Idle => {
                if let Err(e) = self.start().await {
                    warn!(session = %self.id, error = %e, "session failed to start");
                    return self.state();
                }
            }
            SessionState::Running => {}
            terminal => return terminal,
        }

        let inputs = self.inputs.clone();
        for (index, input) in inputs.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return self.finish_cancelled(index).await;
            }
            let delay = self.pacing.delay();
            if !delay.is_zero() {
                let interrupted = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if interrupted {
                    return self.finish_cancelled(index).await;
                }
            }
            if let Err(reason) = self.step(index, input).await {
                return self.finish_aborted(index, reason).await;
            }
        }
        self.finish_completed().await
    }

    /// Evaluate one input. A panicking strategy leaves the input unrecorded
    /// and yields the panic message.
    async fn step(&mut self, index: usize, input: &ProbeInput) -> Result<(), String> {
        let attempt = self.strategy.attempt_text(&self.target, input);
        self.writer.append(Some(index), Severity::Info, attempt).await;

        let rng = self.rng.as_mut();
        let evaluated = panic::catch_unwind(AssertUnwindSafe(|| {
            self.strategy.evaluate(&self.target, input, rng)
        }));
        let outcome = evaluated.map_err(panic_message)?;
        debug!(session = %self.id, index, succeeded = outcome.succeeded, "probe evaluated");
        if outcome.succeeded {
            self.writer
                .append(Some(index), Severity::Success, outcome.label.clone())
                .await;
            for detail in &outcome.details {
                self.writer
                    .append(Some(index), Severity::Success, detail.clone())
                    .await;
            }
        } else {
            self.writer
                .append(Some(index), self.strategy.miss_severity(), outcome.label.clone())
                .await;
        }
        self.writer.append_result(index, outcome).await;
        Ok(())
    }

    async fn finish_aborted(self, index: usize, reason: String) -> SessionState {
        error!(session = %self.id, index, %reason, "strategy panicked");
        self.writer
            .append(
                Some(index),
                Severity::Failure,
                format!("Evaluation of input {index} aborted: {reason}"),
            )
            .await;
        self.finish_cancelled(index).await
    }

    async fn finish_cancelled(self, index: usize) -> SessionState {
        let total = self.inputs.len();
        warn!(session = %self.id, visited = index, total, "session cancelled");
        self.writer
            .append(
                None,
                Severity::Warning,
                format!(
                    "{} cancelled after {index} of {total} inputs; {} not visited",
                    capitalize(self.strategy.kind().title()),
                    total - index
                ),
            )
            .await;
        self.finish(SessionState::Cancelled)
    }

    async fn finish_completed(self) -> SessionState {
        // Counted from the log itself, after the last write.
        let successes = self.writer.reader().snapshot().await.success_count();
        info!(session = %self.id, successes, "session completed");
        self.writer
            .append(
                None,
                Severity::Info,
                format!(
                    "{} completed. {successes} of {} probes succeeded.",
                    capitalize(self.strategy.kind().title()),
                    self.inputs.len()
                ),
            )
            .await;
        self.finish(SessionState::Completed)
    }

    /// Publish the terminal state; the log closes when `self` drops here.
    fn finish(self, state: SessionState) -> SessionState {
        self.state.send_replace(state);
        state
    }
}

/// Cloneable, read-only view of a session plus its cancel switch.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    kind: ProbeKind,
    target: TargetDescriptor,
    inputs: Arc<[ProbeInput]>,
    log: ResultLog,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    /// Current state. A session whose task died without publishing a
    /// terminal state reads as cancelled.
    pub fn state(&self) -> SessionState {
        let state = *self.state.borrow();
        if !state.is_terminal() && self.state.has_changed().is_err() {
            SessionState::Cancelled
        } else {
            state
        }
    }

    pub fn log(&self) -> &ResultLog {
        &self.log
    }

    /// Request cancellation. No-op unless the session is running.
    pub fn cancel(&self) {
        if self.state() == SessionState::Running {
            self.cancel.cancel();
        }
    }

    /// Resolves once the session is completed or cancelled.
    pub async fn wait(&self) -> SessionState {
        let mut rx = self.state.clone();
        let terminal = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        match terminal {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    pub async fn snapshot(&self) -> SessionView {
        // State first: once terminal, the log below is already final.
        let state = self.state();
        let log = self.log.snapshot().await;
        SessionView {
            id: self.id,
            kind: self.kind,
            target: self.target.clone(),
            state,
            inputs: self.inputs.to_vec(),
            results: log.results,
            log: log.entries,
        }
    }

    pub async fn progress(&self) -> Progress {
        let state = self.state();
        let (visited_count, success_count) = self.log.counts().await;
        Progress {
            id: self.id,
            kind: self.kind,
            target: self.target.clone(),
            state,
            total_inputs: self.inputs.len(),
            visited_count,
            success_count,
        }
    }
}

fn validate(
    target: &TargetDescriptor,
    inputs: &[ProbeInput],
    strategy: &dyn ProbeStrategy,
) -> EngineResult<()> {
    if !target.is_well_formed() {
        return Err(EngineError::InvalidInput(format!("malformed target {:?}", target.as_str())));
    }
    if inputs.is_empty() {
        return Err(EngineError::InvalidInput("input list is empty".into()));
    }
    if let Some((i, bad)) = inputs.iter().enumerate().find(|(_, x)| !strategy.accepts(x)) {
        return Err(EngineError::InvalidInput(format!(
            "input {i} ({bad}) cannot be probed by the {} strategy",
            strategy.kind()
        )));
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => format!("strategy panicked: {msg}"),
        Err(payload) => match payload.downcast_ref::<&str>() {
            Some(msg) => format!("strategy panicked: {msg}"),
            None => "strategy panicked".to_string(),
        },
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{ScriptedRandom, SeededRandom};
    use crate::strategy::PortProbeStrategy;
    use std::collections::BTreeMap;

    fn port_session(ports: &[u16], draws: Vec<f64>) -> ScanSession {
        let strategy = Arc::new(PortProbeStrategy::new(BTreeMap::new()));
        let inputs = ports.iter().copied().map(ProbeInput::port).collect();
        ScanSession::new("10.0.0.5".into(), inputs, strategy, Box::new(ScriptedRandom::new(draws)))
            .unwrap()
            .with_pacing(Pacing::default())
    }

    #[test]
    fn rejects_empty_inputs_and_bad_target() {
        let strategy: Arc<dyn ProbeStrategy> = Arc::new(PortProbeStrategy::new(BTreeMap::new()));
        let err = ScanSession::new("host".into(), vec![], strategy.clone(), Box::new(SeededRandom::new(1)));
        assert!(matches!(err, Err(EngineError::InvalidInput(_))));
        let err = ScanSession::new(" ".into(), vec![ProbeInput::port(1)], strategy.clone(), Box::new(SeededRandom::new(1)));
        assert!(matches!(err, Err(EngineError::InvalidInput(_))));
        let err = ScanSession::new("host".into(), vec![ProbeInput::path("admin")], strategy, Box::new(SeededRandom::new(1)));
        assert!(matches!(err, Err(EngineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn start_twice_is_invalid_state() {
        let mut session = port_session(&[22], vec![0.0]);
        session.start().await.unwrap();
        let err = session.start().await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState { state: SessionState::Running, .. }
        ));
    }

    #[tokio::test]
    async fn cancel_before_start_is_noop() {
        let session = port_session(&[22, 23], vec![0.0]);
        session.cancel();
        let handle = session.handle();
        assert_eq!(session.run().await, SessionState::Completed);
        assert_eq!(handle.snapshot().await.results.len(), 2);
    }

    #[tokio::test]
    async fn completed_run_visits_every_input_in_order() {
        let session = port_session(&[22, 80, 443], vec![0.0, 0.9]);
        let handle = session.handle();
        assert_eq!(session.run().await, SessionState::Completed);

        let view = handle.snapshot().await;
        assert_eq!(view.state, SessionState::Completed);
        assert_eq!(view.visited_count(), 3);
        // First line is the start notice, last is the summary.
        assert_eq!(view.log.first().unwrap().text, "Starting port scan on 10.0.0.5 (3 inputs)");
        assert_eq!(view.log.last().unwrap().text, "Port scan completed. 2 of 3 probes succeeded.");

        let probe_order: Vec<usize> = view.log.iter().filter_map(|e| e.probe_index).collect();
        assert!(probe_order.windows(2).all(|w| w[0] <= w[1]));
        assert!(handle.log().is_closed());
    }

    #[tokio::test]
    async fn cancel_during_delay_stops_at_boundary() {
        let mut session = port_session(&[1, 2, 3], vec![0.0]).with_pacing(Pacing::fixed(60_000));
        session.start().await.unwrap();
        let handle = session.handle();
        let run = tokio::spawn(session.run());
        handle.cancel();
        assert_eq!(run.await.unwrap(), SessionState::Cancelled);

        let view = handle.snapshot().await;
        assert!(view.results.is_empty());
        let last = view.log.last().unwrap();
        assert_eq!(last.severity, Severity::Warning);
        assert_eq!(last.text, "Port scan cancelled after 0 of 3 inputs; 3 not visited");
    }

    #[tokio::test]
    async fn dropped_session_reads_as_cancelled() {
        let mut session = port_session(&[1, 2], vec![0.0]);
        session.start().await.unwrap();
        let handle = session.handle();
        assert_eq!(handle.state(), SessionState::Running);
        drop(session);
        assert_eq!(handle.state(), SessionState::Cancelled);
        assert_eq!(handle.wait().await, SessionState::Cancelled);
        assert!(handle.log().is_closed());
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "strategy panicked: boom");
        assert_eq!(panic_message(Box::new(String::from("bad"))), "strategy panicked: bad");
        assert_eq!(panic_message(Box::new(7u8)), "strategy panicked");
    }

    #[test]
    fn pacing_stays_in_bounds() {
        let p = Pacing::new(50, 200);
        for _ in 0..100 {
            let d = p.delay();
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(250));
        }
        assert!(Pacing::default().delay().is_zero());
    }
}
