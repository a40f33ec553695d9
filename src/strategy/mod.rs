//! Pluggable outcome policies, one per probe family.
//!
//! A strategy is data (its injected tables and rates) plus a pure decision
//! function: the same target, input and random draws always give the same
//! outcome. A probe that "fails" is a normal outcome, never an error.
use crate::rng::RandomSource;
use crate::session::Pacing;
use crate::types::{OutcomePayload, ProbeInput, ProbeKind, ProbeOutcome, Severity, TargetDescriptor};

mod banner;
mod credential;
mod directory;
mod port;

pub use banner::{BannerConfig, BannerProbeStrategy};
pub use credential::{CredentialConfig, CredentialPair, CredentialProbeStrategy};
pub use directory::{DirectoryConfig, DirectoryProbeStrategy};
pub use port::{PortConfig, PortProbeStrategy};

pub trait ProbeStrategy: Send + Sync {
    fn kind(&self) -> ProbeKind;

    /// Whether `input` is the shape of work this strategy probes.
    fn accepts(&self, input: &ProbeInput) -> bool;

    /// Decide the outcome of one probe. Must depend only on the arguments
    /// and the strategy's own configuration.
    fn evaluate(
        &self,
        target: &TargetDescriptor,
        input: &ProbeInput,
        rng: &mut dyn RandomSource,
    ) -> ProbeOutcome;

    /// Text of the `info` line logged before each probe.
    fn attempt_text(&self, target: &TargetDescriptor, input: &ProbeInput) -> String {
        format!("Probing {target} with {input}")
    }

    /// Extra `info` lines logged once when a session starts.
    fn preamble(&self, _inputs: &[ProbeInput]) -> Vec<String> {
        Vec::new()
    }

    /// Severity of the log line for an unsuccessful probe.
    fn miss_severity(&self) -> Severity {
        Severity::Failure
    }

    /// Per-step delay used unless the caller overrides it.
    fn default_pacing(&self) -> Pacing {
        Pacing::default()
    }
}

/// Failure outcome for an input shape the strategy does not handle.
pub(crate) fn unsupported(kind: ProbeKind, input: &ProbeInput) -> ProbeOutcome {
    ProbeOutcome::failure(
        format!("{kind} strategy cannot probe {input}"),
        OutcomePayload::Unsupported {
            input: input.clone(),
        },
    )
}
