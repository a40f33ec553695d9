use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{unsupported, ProbeStrategy};
use crate::rng::RandomSource;
use crate::session::Pacing;
use crate::tables::{self, BannerRecord};
use crate::types::{OutcomePayload, ProbeInput, ProbeKind, ProbeOutcome, Severity, TargetDescriptor};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BannerConfig {
    pub banners: BTreeMap<u16, BannerRecord>,
    /// Chance that a port answers with a banner at all.
    pub response_probability: f64,
    pub ports: Vec<u16>,
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            banners: tables::service_banners(),
            response_probability: 0.7,
            ports: tables::banner_ports(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BannerProbeStrategy {
    banners: BTreeMap<u16, BannerRecord>,
    response_probability: f64,
}

impl BannerProbeStrategy {
    pub fn new(banners: BTreeMap<u16, BannerRecord>) -> Self {
        Self {
            banners,
            response_probability: BannerConfig::default().response_probability,
        }
    }

    pub fn with_response_probability(mut self, p: f64) -> Self {
        self.response_probability = p;
        self
    }

    pub fn from_config(cfg: &BannerConfig) -> Self {
        Self::new(cfg.banners.clone()).with_response_probability(cfg.response_probability)
    }

    fn record(&self, port: u16) -> BannerRecord {
        self.banners
            .get(&port)
            .cloned()
            .unwrap_or_else(|| BannerRecord::unknown(port))
    }
}

impl ProbeStrategy for BannerProbeStrategy {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Banner
    }

    fn accepts(&self, input: &ProbeInput) -> bool {
        matches!(input, ProbeInput::Port { .. })
    }

    fn evaluate(
        &self,
        _target: &TargetDescriptor,
        input: &ProbeInput,
        rng: &mut dyn RandomSource,
    ) -> ProbeOutcome {
        let ProbeInput::Port { port } = *input else {
            return unsupported(self.kind(), input);
        };
        let record = self.record(port);
        if !rng.chance(self.response_probability) {
            return ProbeOutcome::failure(
                format!("No banner received from port {port}"),
                OutcomePayload::Banner {
                    port,
                    service: record.service,
                    banner: None,
                    version: None,
                },
            );
        }

        let mut out = ProbeOutcome::success(
            format!("Banner grabbed from port {port} ({})", record.service),
            OutcomePayload::Banner {
                port,
                service: record.service.clone(),
                banner: Some(record.banner.clone()),
                version: record.version.clone(),
            },
        );
        for line in record.banner.lines() {
            out = out.with_detail(format!("    {line}"));
        }
        out
    }

    fn attempt_text(&self, target: &TargetDescriptor, input: &ProbeInput) -> String {
        format!("Connecting to {target}:{input}...")
    }

    fn miss_severity(&self) -> Severity {
        Severity::Warning
    }

    fn default_pacing(&self) -> Pacing {
        Pacing::new(200, 500)
    }
}
