//! Daily usage counters per operation kind.
//!
//! Rollover is lazy: every accounting call compares the stored day with the
//! clock and throws the whole counter set away when they differ. Nothing runs
//! in the background.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    Read,
    ReadPrimary,
    ReadSecondary,
    Write,
    UploadFile,
    DownloadFile,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::Read,
        OperationKind::ReadPrimary,
        OperationKind::ReadSecondary,
        OperationKind::Write,
        OperationKind::UploadFile,
        OperationKind::DownloadFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "Read",
            OperationKind::ReadPrimary => "ReadPrimary",
            OperationKind::ReadSecondary => "ReadSecondary",
            OperationKind::Write => "Write",
            OperationKind::UploadFile => "UploadFile",
            OperationKind::DownloadFile => "DownloadFile",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the current accounting day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Counters for one operation kind over one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationMetric {
    pub read_count: u64,
    pub read_failed: u64,
    pub write_count: u64,
    pub write_failed: u64,
    /// Text of the most recent failure; overwritten, never accumulated.
    pub last_issue: Option<String>,
}

impl OperationMetric {
    fn record(&mut self, write: bool, issue: Option<&DbError>) {
        if write {
            self.write_count += 1;
        } else {
            self.read_count += 1;
        }
        match issue {
            None => {}
            Some(err) if err.is_not_found() => {}
            Some(err) => {
                if write {
                    self.write_failed += 1;
                } else {
                    self.read_failed += 1;
                }
                self.last_issue = Some(err.to_string());
            }
        }
    }
}

/// Point-in-time copy of one kind's counters, shaped for structured logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSnapshot {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub date: String,
    pub read: u64,
    pub read_failed: u64,
    pub write: u64,
    pub write_failed: u64,
    pub issue: Option<String>,
}

#[derive(Default)]
struct Summary {
    date: Option<NaiveDate>,
    operations: HashMap<OperationKind, Arc<Mutex<OperationMetric>>>,
}

pub struct Metrics {
    clock: Arc<dyn Clock>,
    summary: Mutex<Summary>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            summary: Mutex::new(Summary::default()),
        }
    }

    /// Roll over if the stored day is unset or stale, then make sure every
    /// named kind has a counter. Calling it with no kinds only checks rollover.
    pub fn init(&self, kinds: &[OperationKind]) {
        let mut summary = lock(&self.summary);
        self.rollover(&mut summary);
        for kind in kinds {
            summary.operations.entry(*kind).or_default();
        }
    }

    fn rollover(&self, summary: &mut Summary) {
        let today = self.clock.today();
        if summary.date != Some(today) {
            summary.date = Some(today);
            summary.operations.clear();
        }
    }

    /// Forget the current day so the next access starts a fresh counter set.
    pub fn reset_period(&self) {
        lock(&self.summary).date = None;
    }

    pub fn date(&self) -> Option<NaiveDate> {
        lock(&self.summary).date
    }

    fn counter(&self, kind: OperationKind) -> Arc<Mutex<OperationMetric>> {
        let mut summary = lock(&self.summary);
        self.rollover(&mut summary);
        Arc::clone(summary.operations.entry(kind).or_default())
    }

    pub fn inc_read(&self, kind: OperationKind, issue: Option<&DbError>) {
        let counter = self.counter(kind);
        lock(&counter).record(false, issue);
    }

    pub fn inc_write(&self, kind: OperationKind, issue: Option<&DbError>) {
        let counter = self.counter(kind);
        lock(&counter).record(true, issue);
    }

    /// Current counters for `kind`, after a rollover check.
    pub fn operation(&self, kind: OperationKind) -> Option<OperationMetric> {
        let mut summary = lock(&self.summary);
        self.rollover(&mut summary);
        summary.operations.get(&kind).map(|op| lock(op).clone())
    }

    pub fn snapshot(&self, kind: OperationKind) -> Option<MetricSnapshot> {
        let mut summary = lock(&self.summary);
        self.rollover(&mut summary);
        let date = summary.date.map(format_date).unwrap_or_default();
        let op = lock(summary.operations.get(&kind)?).clone();
        Some(MetricSnapshot {
            kind,
            date,
            read: op.read_count,
            read_failed: op.read_failed,
            write: op.write_count,
            write_failed: op.write_failed,
            issue: op.last_issue,
        })
    }

    /// Snapshots of every kind touched today.
    pub fn snapshots(&self) -> Vec<MetricSnapshot> {
        OperationKind::ALL
            .iter()
            .filter_map(|kind| self.snapshot(*kind))
            .collect()
    }

    /// One-line summary: elapsed time since `started`, then the counters.
    pub fn sprint(&self, started: Instant, kind: OperationKind) -> Option<String> {
        let snap = self.snapshot(kind)?;
        Some(format!(
            "{:?} | {} ({}) - read: {} (failed: {}), write: {} (failed: {}), issue: {}",
            started.elapsed(),
            snap.kind,
            snap.date,
            snap.read,
            snap.read_failed,
            snap.write,
            snap.write_failed,
            snap.issue.as_deref().unwrap_or("none"),
        ))
    }

    /// Emit the counters for `kind` as a structured log event.
    pub fn print(&self, started: Instant, kind: OperationKind) {
        let Some(snap) = self.snapshot(kind) else {
            return;
        };
        tracing::info!(
            target: "mongodb_metric",
            kind = %snap.kind,
            date = %snap.date,
            read = snap.read,
            read_failed = snap.read_failed,
            write = snap.write,
            write_failed = snap.write_failed,
            issue = snap.issue.as_deref().unwrap_or("none"),
            duration = ?started.elapsed(),
            "mongodb metric"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
