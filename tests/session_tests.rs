use std::collections::BTreeMap;
use std::sync::Arc;

use probe_engine::config::EngineConfig;
use probe_engine::inputs::{credential_inputs, path_inputs, port_inputs};
use probe_engine::rng::{RandomSource, ScriptedRandom, SeededRandom};
use probe_engine::session::{Pacing, ScanSession};
use probe_engine::strategy::{
    BannerProbeStrategy, DirectoryProbeStrategy, PortProbeStrategy, ProbeStrategy,
};
use probe_engine::tables;
use probe_engine::types::{
    OutcomePayload, PortStatus, ProbeInput, ProbeKind, ProbeOutcome, SessionState, SessionView,
    Severity, TargetDescriptor,
};
use tokio_util::sync::CancellationToken;

async fn run_to_end(
    target: &str,
    inputs: Vec<ProbeInput>,
    strategy: Arc<dyn ProbeStrategy>,
    rng: Box<dyn RandomSource>,
) -> SessionView {
    let session = ScanSession::new(target.into(), inputs, strategy, rng)
        .unwrap()
        .with_pacing(Pacing::default());
    let handle = session.handle();
    session.run().await;
    handle.snapshot().await
}

fn assert_log_covers_outcomes(view: &SessionView) {
    for (i, outcome) in view.results.iter().enumerate() {
        let severities: Vec<Severity> = view
            .log
            .iter()
            .filter(|e| e.probe_index == Some(i))
            .map(|e| e.severity)
            .collect();
        if outcome.succeeded {
            assert!(severities.contains(&Severity::Success), "index {i}: {severities:?}");
        } else {
            assert!(
                severities.contains(&Severity::Failure) || severities.contains(&Severity::Warning),
                "index {i}: {severities:?}"
            );
        }
    }
}

#[tokio::test]
async fn port_scenario_with_forced_draws() {
    let services = BTreeMap::from([(22, "SSH".to_string()), (80, "HTTP".to_string())]);
    let strategy = Arc::new(PortProbeStrategy::new(services));
    let rng = Box::new(ScriptedRandom::new(vec![0.0, 0.0, 0.99]));
    let view = run_to_end("192.168.1.1", port_inputs(&[22, 80, 9999]), strategy, rng).await;

    let payloads: Vec<OutcomePayload> = view.results.iter().map(|o| o.payload.clone()).collect();
    assert_eq!(
        payloads,
        vec![
            OutcomePayload::Port { port: 22, status: PortStatus::Open, service: "SSH".into() },
            OutcomePayload::Port { port: 80, status: PortStatus::Open, service: "HTTP".into() },
            OutcomePayload::Port { port: 9999, status: PortStatus::Closed, service: "Unknown".into() },
        ]
    );
    let summary = view.summary();
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.visited_count, 3);
    assert_eq!(summary.final_state, SessionState::Completed);
    assert_log_covers_outcomes(&view);
}

/// Cancels the session's token while evaluating one chosen port.
struct CancelOnPort {
    inner: PortProbeStrategy,
    port: u16,
    token: CancellationToken,
}

impl ProbeStrategy for CancelOnPort {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Port
    }

    fn accepts(&self, input: &ProbeInput) -> bool {
        self.inner.accepts(input)
    }

    fn evaluate(
        &self,
        target: &TargetDescriptor,
        input: &ProbeInput,
        rng: &mut dyn RandomSource,
    ) -> ProbeOutcome {
        if *input == ProbeInput::port(self.port) {
            self.token.cancel();
        }
        self.inner.evaluate(target, input, rng)
    }
}

#[tokio::test]
async fn cancel_after_second_input_leaves_rest_absent() {
    let token = CancellationToken::new();
    let strategy = Arc::new(CancelOnPort {
        inner: PortProbeStrategy::new(tables::port_services()),
        port: 2,
        token: token.clone(),
    });
    let session = ScanSession::new(
        "10.0.0.9".into(),
        port_inputs(&[1, 2, 3, 4, 5]),
        strategy,
        Box::new(SeededRandom::new(3)),
    )
    .unwrap()
    .with_pacing(Pacing::default())
    .with_cancel_token(token);
    let handle = session.handle();

    assert_eq!(session.run().await, SessionState::Cancelled);
    let view = handle.snapshot().await;
    assert_eq!(view.state, SessionState::Cancelled);
    assert_eq!(view.results.len(), 2);
    assert_eq!(view.summary().visited_count, 2);
    assert!(view.log.iter().all(|e| e.probe_index.map_or(true, |i| i < 2)));
    assert_eq!(view.log.last().map(|e| e.severity), Some(Severity::Warning));
    assert_log_covers_outcomes(&view);
}

#[tokio::test]
async fn same_seed_same_outcomes() {
    let cfg = EngineConfig::default();
    let paths = path_inputs(&cfg.directory.wordlist);
    let strategy: Arc<dyn ProbeStrategy> = Arc::new(DirectoryProbeStrategy::from_config(&cfg.directory));

    let a = run_to_end("http://t", paths.clone(), strategy.clone(), Box::new(SeededRandom::new(99))).await;
    let b = run_to_end("http://t", paths, strategy, Box::new(SeededRandom::new(99))).await;
    assert_eq!(a.results, b.results);
    assert_eq!(a.results.len(), cfg.directory.wordlist.len());
}

#[tokio::test]
async fn sequences_strictly_increase_and_indices_are_ordered() {
    let cfg = EngineConfig::default();
    let inputs = credential_inputs(&cfg.credential.usernames, &cfg.credential.passwords);
    let strategy = cfg.strategy(ProbeKind::Credential);
    let view = run_to_end("http://t/login", inputs, strategy, Box::new(SeededRandom::new(5))).await;

    assert!(view.log.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(view.log[0].sequence, 0);
    let probe_indices: Vec<usize> = view.log.iter().filter_map(|e| e.probe_index).collect();
    assert!(probe_indices.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(view.results.len(), 25);
    // Preamble lines follow the start notice.
    assert_eq!(view.log[2].text, "Total combinations: 25");
}

#[tokio::test]
async fn banner_misses_are_warnings_and_hits_carry_details() {
    let strategy = Arc::new(BannerProbeStrategy::new(tables::service_banners()));
    let rng = Box::new(ScriptedRandom::new(vec![0.1, 0.95]));
    let view = run_to_end("mail.example.com", port_inputs(&[22, 25]), strategy, rng).await;

    assert!(view.results[0].succeeded);
    assert!(!view.results[1].succeeded);
    let for_first: Vec<&str> = view
        .log
        .iter()
        .filter(|e| e.probe_index == Some(0) && e.severity == Severity::Success)
        .map(|e| e.text.as_str())
        .collect();
    assert_eq!(for_first, vec!["Banner grabbed from port 22 (SSH)", "    SSH-2.0-OpenSSH_7.4"]);
    assert!(view
        .log
        .iter()
        .any(|e| e.probe_index == Some(1) && e.severity == Severity::Warning));
    assert_log_covers_outcomes(&view);
}
