use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{unsupported, ProbeStrategy};
use crate::rng::RandomSource;
use crate::session::Pacing;
use crate::tables;
use crate::types::{OutcomePayload, ProbeInput, ProbeKind, ProbeOutcome, TargetDescriptor};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub username: String,
    pub password: String,
}

impl CredentialPair {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CredentialConfig {
    pub expected: CredentialPair,
    /// Chance that even the expected pair is accepted.
    pub base_rate: f64,
    pub usernames: Vec<String>,
    pub passwords: Vec<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            expected: CredentialPair::new("admin", "admin"),
            base_rate: 0.05,
            usernames: tables::default_usernames(),
            passwords: tables::default_passwords(),
        }
    }
}

/// Accepts only the expected pair, and only with probability `base_rate`.
/// The two gates are independent: `base_rate = 1.0` makes matching exact.
#[derive(Debug, Clone)]
pub struct CredentialProbeStrategy {
    expected: CredentialPair,
    base_rate: f64,
}

impl CredentialProbeStrategy {
    pub fn new(expected: CredentialPair) -> Self {
        Self {
            expected,
            base_rate: CredentialConfig::default().base_rate,
        }
    }

    pub fn with_base_rate(mut self, rate: f64) -> Self {
        self.base_rate = rate;
        self
    }

    pub fn from_config(cfg: &CredentialConfig) -> Self {
        Self::new(cfg.expected.clone()).with_base_rate(cfg.base_rate)
    }
}

impl ProbeStrategy for CredentialProbeStrategy {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Credential
    }

    fn accepts(&self, input: &ProbeInput) -> bool {
        matches!(input, ProbeInput::Credential { .. })
    }

    fn evaluate(
        &self,
        _target: &TargetDescriptor,
        input: &ProbeInput,
        rng: &mut dyn RandomSource,
    ) -> ProbeOutcome {
        let ProbeInput::Credential { username, password } = input else {
            return unsupported(self.kind(), input);
        };
        // Always draw so every attempt consumes the same amount of randomness.
        let lucky = rng.chance(self.base_rate);
        let success = lucky && self.expected.matches(username, password);
        let payload = OutcomePayload::Credential {
            username: username.clone(),
            password: password.clone(),
            success,
        };
        if success {
            ProbeOutcome::success(format!("SUCCESS! {username}:{password} - Login successful!"), payload)
        } else {
            ProbeOutcome::failure(format!("FAILED: {username}:{password}"), payload)
        }
    }

    fn attempt_text(&self, target: &TargetDescriptor, input: &ProbeInput) -> String {
        format!("Trying {input} against {target}")
    }

    fn preamble(&self, inputs: &[ProbeInput]) -> Vec<String> {
        let mut users = HashSet::new();
        let mut passwords = HashSet::new();
        for input in inputs {
            if let ProbeInput::Credential { username, password } = input {
                users.insert(username.as_str());
                passwords.insert(password.as_str());
            }
        }
        vec![
            format!("Testing {} usernames with {} passwords", users.len(), passwords.len()),
            format!("Total combinations: {}", inputs.len()),
        ]
    }

    fn default_pacing(&self) -> Pacing {
        Pacing::new(100, 300)
    }
}
