//! Append-only session log: timestamped lines plus index-aligned outcomes.
//!
//! [`ResultLog::new`] returns exactly one [`LogWriter`] and a cloneable
//! reader handle, so a log can only ever have one writer. Readers get
//! copies ([`ResultLog::snapshot`]) or a live stream ([`ResultLog::subscribe`]),
//! never a view into the shared vectors.
use std::sync::Arc;

use ::time::{format_description::well_known, OffsetDateTime};
use futures::stream::{self, Stream};
use tokio::sync::{watch, RwLock};

use crate::types::{LogEntry, ProbeOutcome, Severity};

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<LogEntry>,
    results: Vec<ProbeOutcome>,
    next_sequence: u64,
}

#[derive(Debug)]
struct Shared {
    inner: RwLock<Inner>,
    /// Bumped after every write; the sender lives in the writer, so a
    /// dropped writer closes every subscription.
    changes: watch::Receiver<u64>,
}

/// Immutable copy of a log at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSnapshot {
    pub entries: Vec<LogEntry>,
    pub results: Vec<ProbeOutcome>,
}

impl LogSnapshot {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|o| o.succeeded).count()
    }
}

/// Reader handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ResultLog {
    shared: Arc<Shared>,
}

/// The single writer of a [`ResultLog`]. Dropping it closes the log.
#[derive(Debug)]
pub struct LogWriter {
    shared: Arc<Shared>,
    notify: watch::Sender<u64>,
}

impl ResultLog {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (LogWriter, ResultLog) {
        let (notify, changes) = watch::channel(0);
        let shared = Arc::new(Shared {
            inner: RwLock::new(Inner::default()),
            changes,
        });
        (
            LogWriter {
                shared: shared.clone(),
                notify,
            },
            ResultLog { shared },
        )
    }

    pub async fn snapshot(&self) -> LogSnapshot {
        let inner = self.shared.inner.read().await;
        LogSnapshot {
            entries: inner.entries.clone(),
            results: inner.results.clone(),
        }
    }

    /// `(visited, succeeded)` without copying the log.
    pub async fn counts(&self) -> (usize, usize) {
        let inner = self.shared.inner.read().await;
        let ok = inner.results.iter().filter(|o| o.succeeded).count();
        (inner.results.len(), ok)
    }

    /// True once the writer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.changes.has_changed().is_err()
    }

    /// Stream of every entry from the first one, following new appends
    /// until the log is closed. Each call starts its own replay.
    pub fn subscribe(&self) -> impl Stream<Item = LogEntry> + Send + 'static {
        let shared = self.shared.clone();
        let rx = shared.changes.clone();
        stream::unfold((shared, rx, 0usize), |(shared, mut rx, cursor)| async move {
            loop {
                rx.borrow_and_update();
                let next = shared.inner.read().await.entries.get(cursor).cloned();
                if let Some(entry) = next {
                    return Some((entry, (shared, rx, cursor + 1)));
                }
                if rx.changed().await.is_err() {
                    // Writer gone: drain whatever landed before it closed.
                    let last = shared.inner.read().await.entries.get(cursor).cloned()?;
                    return Some((last, (shared, rx, cursor + 1)));
                }
            }
        })
    }
}

impl LogWriter {
    /// Append a line and return its sequence number.
    pub async fn append(
        &self,
        probe_index: Option<usize>,
        severity: Severity,
        text: impl Into<String>,
    ) -> u64 {
        let sequence = {
            let mut inner = self.shared.inner.write().await;
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.entries.push(LogEntry {
                sequence,
                probe_index,
                severity,
                text: text.into(),
                timestamp: now_rfc3339(),
            });
            sequence
        };
        self.notify.send_modify(|n| *n += 1);
        sequence
    }

    /// Record the outcome of input `index`. Inputs are visited in order, so
    /// `index` is always the next free slot.
    pub async fn append_result(&self, index: usize, outcome: ProbeOutcome) {
        {
            let mut inner = self.shared.inner.write().await;
            debug_assert_eq!(index, inner.results.len(), "results must be appended in index order");
            inner.results.push(outcome);
        }
        self.notify.send_modify(|n| *n += 1);
    }

    pub fn reader(&self) -> ResultLog {
        ResultLog {
            shared: self.shared.clone(),
        }
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
