use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier handed out by the controller for each started session.
pub type SessionId = Uuid;

/// Opaque target address (host, IP or base URL). Format checks beyond
/// "non-empty, no whitespace" belong to the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TargetDescriptor(String);

impl TargetDescriptor {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(|c| c.is_whitespace() || c.is_control())
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetDescriptor {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TargetDescriptor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The four probe families a strategy can implement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Port,
    Banner,
    Directory,
    Credential,
}

impl ProbeKind {
    /// Human-readable name used in session log lines.
    pub fn title(self) -> &'static str {
        match self {
            ProbeKind::Port => "port scan",
            ProbeKind::Banner => "banner grabbing",
            ProbeKind::Directory => "directory scan",
            ProbeKind::Credential => "brute force",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeKind::Port => "port",
            ProbeKind::Banner => "banner",
            ProbeKind::Directory => "directory",
            ProbeKind::Credential => "credential",
        };
        f.write_str(s)
    }
}

/// One unit of work. Its position in the session's input list is its index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeInput {
    Port { port: u16 },
    Path { path: String },
    Credential { username: String, password: String },
}

impl ProbeInput {
    pub fn port(port: u16) -> Self {
        ProbeInput::Port { port }
    }

    pub fn path(path: impl Into<String>) -> Self {
        ProbeInput::Path { path: path.into() }
    }

    pub fn credential(username: impl Into<String>, password: impl Into<String>) -> Self {
        ProbeInput::Credential {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Display for ProbeInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeInput::Port { port } => write!(f, "{port}"),
            ProbeInput::Path { path } => f.write_str(path),
            ProbeInput::Credential { username, password } => write!(f, "{username}:{password}"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Failure,
}

impl Severity {
    /// Console marker, e.g. `[+]` for success.
    pub fn marker(self) -> &'static str {
        match self {
            Severity::Info => "[*]",
            Severity::Success => "[+]",
            Severity::Warning => "[!]",
            Severity::Failure => "[-]",
        }
    }

    /// Wire name, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Failure => "failure",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    Open,
    Closed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
}

/// Strategy-specific result data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomePayload {
    Port {
        port: u16,
        status: PortStatus,
        service: String,
    },
    Banner {
        port: u16,
        service: String,
        banner: Option<String>,
        version: Option<String>,
    },
    Directory {
        url: String,
        status: u16,
        kind: EntryKind,
        size: Option<u64>,
    },
    Credential {
        username: String,
        password: String,
        success: bool,
    },
    /// The strategy was handed an input shape it does not probe.
    Unsupported { input: ProbeInput },
}

/// Result of evaluating exactly one probe input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub succeeded: bool,
    pub label: String,
    pub payload: OutcomePayload,
    /// Extra lines logged under the main line on success (e.g. banner text).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ProbeOutcome {
    pub fn success(label: impl Into<String>, payload: OutcomePayload) -> Self {
        Self {
            succeeded: true,
            label: label.into(),
            payload,
            details: Vec::new(),
        }
    }

    pub fn failure(label: impl Into<String>, payload: OutcomePayload) -> Self {
        Self {
            succeeded: false,
            label: label.into(),
            payload,
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }
}

/// One timestamped line in a session's log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub sequence: u64,
    /// `None` for session-level lines (start, summary, cancellation).
    pub probe_index: Option<usize>,
    pub severity: Severity,
    pub text: String,
    pub timestamp: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity.marker(), self.text)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Point-in-time copy of a session: its inputs, results and log so far.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub id: SessionId,
    pub kind: ProbeKind,
    pub target: TargetDescriptor,
    pub state: SessionState,
    pub inputs: Vec<ProbeInput>,
    /// `results[i]` is the outcome of `inputs[i]`; unvisited inputs have no slot.
    pub results: Vec<ProbeOutcome>,
    pub log: Vec<LogEntry>,
}

impl SessionView {
    pub fn visited_count(&self) -> usize {
        self.results.len()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|o| o.succeeded).count()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            total_inputs: self.inputs.len(),
            visited_count: self.visited_count(),
            success_count: self.success_count(),
            final_state: self.state,
        }
    }
}

/// Final tallies of a terminated session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub total_inputs: usize,
    pub visited_count: usize,
    pub success_count: usize,
    pub final_state: SessionState,
}

/// Live counters of a session, valid in any state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub id: SessionId,
    pub kind: ProbeKind,
    pub target: TargetDescriptor,
    pub state: SessionState,
    pub total_inputs: usize,
    pub visited_count: usize,
    pub success_count: usize,
}
