//! Common types and utilities shared across Portwatch crates.
//!
//! The canonical arrival schema, the snapshot produced by a single run, and
//! the tracing setup used by the binary and the integration tests.
//!
//! # Overview
//!
//! - [`Port`]: closed set of source sites
//! - [`ArrivalRecord`]: one normalized vessel arrival
//! - [`Snapshot`] / [`SourceSnapshot`] / [`SourceStatus`]: per-run output
//! - [`OutputFormat`]: artifact encodings understood by the writers
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use portwatch_common::{Port, Snapshot, SourceSnapshot};
//!
//! let mut snapshot = Snapshot::new(chrono::Utc::now().fixed_offset());
//! snapshot.insert(Port::Sydney, SourceSnapshot::complete(Vec::new(), 1));
//! assert_eq!(snapshot.records(Port::Sydney).len(), 0);
//! assert!(snapshot.failed_ports().is_empty());
//! ```
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod observability;

/// Source site identifier.
///
/// Adding a variant means adding an extractor for it; nothing else in the
/// pipeline branches on the concrete port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Port {
    Sydney,
    Melbourne,
}

impl Port {
    pub const ALL: [Port; 2] = [Port::Sydney, Port::Melbourne];

    /// Display name, also used for sheet/file names by the writers.
    pub fn name(&self) -> &'static str {
        match self {
            Port::Sydney => "Sydney",
            Port::Melbourne => "Melbourne",
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical arrival record shared by every source.
///
/// Fields a source does not publish stay `None`; they are never synthesised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    pub port: Port,
    pub vessel: String,
    /// Primary date/time exactly as published by the source.
    pub event_datetime: String,
    pub eta: Option<String>,
    pub origin: String,
    pub destination: String,
    pub berth: Option<String>,
    /// Lower-cased section heading the row was grouped under.
    pub category: Option<String>,
    /// When the row was processed, in the configured reference zone.
    pub captured_at: DateTime<FixedOffset>,
}

/// Outcome of one source for one run.
///
/// `Complete` with zero records means the source had nothing to report;
/// `Failed` means it could not be scraped at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceStatus {
    Complete,
    Partial { error: String },
    Failed { error: String },
}

impl SourceStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, SourceStatus::Complete)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SourceStatus::Complete => None,
            SourceStatus::Partial { error } | SourceStatus::Failed { error } => Some(error),
        }
    }

    /// Short label for tabular metadata.
    pub fn label(&self) -> &'static str {
        match self {
            SourceStatus::Complete => "complete",
            SourceStatus::Partial { .. } => "partial",
            SourceStatus::Failed { .. } => "failed",
        }
    }
}

/// Records and status contributed by a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub status: SourceStatus,
    pub pages_fetched: usize,
    pub records: Vec<ArrivalRecord>,
}

impl SourceSnapshot {
    pub fn complete(records: Vec<ArrivalRecord>, pages_fetched: usize) -> Self {
        Self {
            status: SourceStatus::Complete,
            pages_fetched,
            records,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SourceStatus::Failed {
                error: error.into(),
            },
            pages_fetched: 0,
            records: Vec::new(),
        }
    }
}

/// One complete, timestamped collection of records across all sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<FixedOffset>,
    pub sources: BTreeMap<Port, SourceSnapshot>,
}

impl Snapshot {
    pub fn new(generated_at: DateTime<FixedOffset>) -> Self {
        Self {
            generated_at,
            sources: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, port: Port, source: SourceSnapshot) {
        self.sources.insert(port, source);
    }

    /// Records for `port`, empty when the port did not contribute.
    pub fn records(&self, port: Port) -> &[ArrivalRecord] {
        self.sources
            .get(&port)
            .map(|s| s.records.as_slice())
            .unwrap_or(&[])
    }

    pub fn status(&self, port: Port) -> Option<&SourceStatus> {
        self.sources.get(&port).map(|s| &s.status)
    }

    pub fn record_count(&self) -> usize {
        self.sources.values().map(|s| s.records.len()).sum()
    }

    pub fn failed_ports(&self) -> Vec<Port> {
        self.sources
            .iter()
            .filter(|(_, s)| matches!(s.status, SourceStatus::Failed { .. }))
            .map(|(port, _)| *port)
            .collect()
    }
}

/// Preferred output format for snapshot artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}
