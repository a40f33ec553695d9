use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::inputs;
use crate::rng::{RandomSource, SeededRandom};
use crate::session::Pacing;
use crate::strategy::{
    BannerConfig, BannerProbeStrategy, CredentialConfig, CredentialProbeStrategy, DirectoryConfig,
    DirectoryProbeStrategy, PortConfig, PortProbeStrategy, ProbeStrategy,
};
use crate::types::{ProbeInput, ProbeKind};

/// Engine settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for strategy draws; unset means non-deterministic.
    pub seed: Option<u64>,
    /// Overrides every strategy's own pacing when set.
    pub pacing: Option<Pacing>,
    /// Terminated sessions kept by a controller before the oldest is evicted.
    pub retain_sessions: usize,
    pub port: PortConfig,
    pub banner: BannerConfig,
    pub directory: DirectoryConfig,
    pub credential: CredentialConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            pacing: None,
            retain_sessions: 16,
            port: PortConfig::default(),
            banner: BannerConfig::default(),
            directory: DirectoryConfig::default(),
            credential: CredentialConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s).context("invalid engine config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config: {}", path.as_ref().display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("in config file {}", path.as_ref().display()))
    }

    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("port.open_probability", self.port.open_probability),
            ("banner.response_probability", self.banner.response_probability),
            ("directory.common_found_probability", self.directory.common_found_probability),
            ("directory.found_probability", self.directory.found_probability),
            ("credential.base_rate", self.credential.base_rate),
        ];
        for (name, p) in rates {
            if !(0.0..=1.0).contains(&p) {
                bail!("{name} must be within 0..=1, got {p}");
            }
        }
        Ok(())
    }

    pub fn strategy(&self, kind: ProbeKind) -> Arc<dyn ProbeStrategy> {
        match kind {
            ProbeKind::Port => Arc::new(PortProbeStrategy::from_config(&self.port)),
            ProbeKind::Banner => Arc::new(BannerProbeStrategy::from_config(&self.banner)),
            ProbeKind::Directory => Arc::new(DirectoryProbeStrategy::from_config(&self.directory)),
            ProbeKind::Credential => Arc::new(CredentialProbeStrategy::from_config(&self.credential)),
        }
    }

    /// Inputs used when a caller starts `kind` without its own list.
    pub fn default_inputs(&self, kind: ProbeKind) -> Vec<ProbeInput> {
        match kind {
            ProbeKind::Port => inputs::port_inputs(&self.port.ports),
            ProbeKind::Banner => inputs::port_inputs(&self.banner.ports),
            ProbeKind::Directory => inputs::path_inputs(&self.directory.wordlist),
            ProbeKind::Credential => {
                inputs::credential_inputs(&self.credential.usernames, &self.credential.passwords)
            }
        }
    }

    pub fn random_source(&self) -> Box<dyn RandomSource> {
        Box::new(SeededRandom::from_seed_opt(self.seed))
    }
}
