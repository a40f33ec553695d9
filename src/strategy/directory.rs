use serde::{Deserialize, Serialize};

use super::{unsupported, ProbeStrategy};
use crate::rng::RandomSource;
use crate::session::Pacing;
use crate::tables;
use crate::types::{EntryKind, OutcomePayload, ProbeInput, ProbeKind, ProbeOutcome, TargetDescriptor};

const NOT_FOUND: u16 = 404;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Substrings that bias a path towards "found".
    pub common_paths: Vec<String>,
    /// Status codes drawn from uniformly; 404 means not found.
    pub status_codes: Vec<u16>,
    pub common_found_probability: f64,
    pub found_probability: f64,
    /// Paths tried when the caller gives none.
    pub wordlist: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            common_paths: tables::common_path_markers(),
            status_codes: vec![200, 301, 302, 403, 404],
            common_found_probability: 0.6,
            found_probability: 0.2,
            wordlist: tables::default_wordlist(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryProbeStrategy {
    cfg: DirectoryConfig,
}

impl DirectoryProbeStrategy {
    pub fn new(common_paths: Vec<String>) -> Self {
        Self {
            cfg: DirectoryConfig {
                common_paths,
                ..DirectoryConfig::default()
            },
        }
    }

    pub fn from_config(cfg: &DirectoryConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    fn is_common(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.cfg
            .common_paths
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()))
    }
}

/// `base` without a trailing `/`, joined with the trimmed path.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim())
}

/// Paths without an extension, or ending in `/`, are directories.
pub fn classify(path: &str) -> EntryKind {
    if !path.contains('.') || path.ends_with('/') {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "",
    }
}

impl ProbeStrategy for DirectoryProbeStrategy {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Directory
    }

    fn accepts(&self, input: &ProbeInput) -> bool {
        matches!(input, ProbeInput::Path { .. })
    }

    fn evaluate(
        &self,
        target: &TargetDescriptor,
        input: &ProbeInput,
        rng: &mut dyn RandomSource,
    ) -> ProbeOutcome {
        let ProbeInput::Path { path } = input else {
            return unsupported(self.kind(), input);
        };
        let url = join_url(target.as_str(), path);
        let kind = classify(path.trim());

        let codes = &self.cfg.status_codes;
        let status = if codes.is_empty() {
            NOT_FOUND
        } else {
            codes[rng.below(codes.len())]
        };
        let p = if self.is_common(path) {
            self.cfg.common_found_probability
        } else {
            self.cfg.found_probability
        };
        let found = rng.chance(p);

        if !found || status == NOT_FOUND {
            return ProbeOutcome::failure(
                format!("{NOT_FOUND} - {url}"),
                OutcomePayload::Directory {
                    url,
                    status: NOT_FOUND,
                    kind,
                    size: None,
                },
            );
        }

        let size = match kind {
            EntryKind::File => Some(rng.between(1000, 51_000)),
            EntryKind::Directory => None,
        };
        let label = format!("{status} {} - {url}", reason(status));
        ProbeOutcome::success(
            label,
            OutcomePayload::Directory {
                url,
                status,
                kind,
                size,
            },
        )
    }

    fn attempt_text(&self, target: &TargetDescriptor, input: &ProbeInput) -> String {
        match input {
            ProbeInput::Path { path } => format!("Requesting {}", join_url(target.as_str(), path)),
            other => format!("Requesting {target} {other}"),
        }
    }

    fn default_pacing(&self) -> Pacing {
        Pacing::new(100, 300)
    }
}
