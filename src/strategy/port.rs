use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{unsupported, ProbeStrategy};
use crate::rng::RandomSource;
use crate::session::Pacing;
use crate::tables;
use crate::types::{OutcomePayload, PortStatus, ProbeInput, ProbeKind, ProbeOutcome, TargetDescriptor};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PortConfig {
    /// Port number to service name.
    pub services: BTreeMap<u16, String>,
    pub open_probability: f64,
    /// Ports scanned when the caller gives none.
    pub ports: Vec<u16>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            services: tables::port_services(),
            open_probability: 0.15,
            ports: tables::common_ports(),
        }
    }
}

/// Reports each port open or closed, naming the service from the table.
#[derive(Debug, Clone)]
pub struct PortProbeStrategy {
    services: BTreeMap<u16, String>,
    open_probability: f64,
}

impl PortProbeStrategy {
    pub fn new(services: BTreeMap<u16, String>) -> Self {
        Self {
            services,
            open_probability: PortConfig::default().open_probability,
        }
    }

    pub fn with_open_probability(mut self, p: f64) -> Self {
        self.open_probability = p;
        self
    }

    pub fn from_config(cfg: &PortConfig) -> Self {
        Self::new(cfg.services.clone()).with_open_probability(cfg.open_probability)
    }

    fn service(&self, port: u16) -> String {
        self.services
            .get(&port)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

impl ProbeStrategy for PortProbeStrategy {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Port
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
        let open = rng.chance(self.open_probability);
        let service = self.service(port);
        if open {
            let label = format!("Port {port} is open ({service})");
            ProbeOutcome::success(
                label,
                OutcomePayload::Port {
                    port,
                    status: PortStatus::Open,
                    service,
                },
            )
        } else {
            ProbeOutcome::failure(
                format!("Port {port} is closed"),
                OutcomePayload::Port {
                    port,
                    status: PortStatus::Closed,
                    service,
                },
            )
        }
    }

    fn attempt_text(&self, target: &TargetDescriptor, input: &ProbeInput) -> String {
        format!("Scanning {target}:{input}")
    }

    fn default_pacing(&self) -> Pacing {
        Pacing::new(50, 200)
    }
}
