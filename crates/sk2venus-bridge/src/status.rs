//! Status reporting.
//!
//! [`StatusBoard`] is the status sink the bridge reports to. Every report is
//! logged through `tracing` and the most recent ones are retained for the
//! status API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use sk2venus_core::StatusSink;

/// Entries kept by default.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Status,
    Error,
}

/// One report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub level: StatusLevel,
    pub message: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

/// Point-in-time view served by the status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    /// Latest status message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub error_count: u64,
    pub uptime: u64,
    pub entries: Vec<StatusEntry>,
}

pub struct StatusBoard {
    start_time: Instant,
    capacity: usize,
    entries: Mutex<VecDeque<StatusEntry>>,
    error_count: AtomicU64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            start_time: Instant::now(),
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            error_count: AtomicU64::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<StatusEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, level: StatusLevel, message: &str) {
        let entry = StatusEntry {
            level,
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        };
        let mut entries = self.entries();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Total errors reported, including ones no longer retained.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Retained entries, oldest first.
    pub fn recent(&self) -> Vec<StatusEntry> {
        self.entries().iter().cloned().collect()
    }

    /// Retained error messages, oldest first.
    pub fn errors(&self) -> Vec<String> {
        self.entries()
            .iter()
            .filter(|e| e.level == StatusLevel::Error)
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn summary(&self) -> StatusSummary {
        let entries = self.recent();
        let status = entries
            .iter()
            .rev()
            .find(|e| e.level == StatusLevel::Status)
            .map(|e| e.message.clone());
        StatusSummary {
            status,
            error_count: self.error_count(),
            uptime: self.start_time.elapsed().as_secs(),
            entries,
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for StatusBoard {
    fn status(&self, message: &str) {
        info!("{}", message);
        self.record(StatusLevel::Status, message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.record(StatusLevel::Error, message);
    }
}
