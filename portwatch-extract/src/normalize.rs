//! Row shapes accepted from each source layout and their mapping to [`ArrivalRecord`].
//!
//! The `from_cells` constructors hold the per-source filters; once a row
//! exists its mapping cannot fail.

use crate::html::RawRow;
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use portwatch_common::{ArrivalRecord, Port};
use std::sync::Arc;

pub const TABLE_MIN_CELLS: usize = 8;
pub const SECTION_MIN_CELLS: usize = 4;

/// Source of "now" for capture and generation timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A paginated-table row: at least 8 cells, classification cell matching.
///
/// Source columns: 0 date/time, 1 ETA, 2 classification, 3 vessel, 4 berth,
/// 6 origin, 7 destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub event_datetime: String,
    pub eta: String,
    pub vessel: String,
    pub berth: String,
    pub origin: String,
    pub destination: String,
}

impl TableRow {
    /// `None` when the row is short or its classification differs
    /// (case-insensitive) from `classification`.
    pub fn from_cells(cells: RawRow, classification: &str) -> Option<Self> {
        if cells.len() < TABLE_MIN_CELLS {
            return None;
        }
        let mut it = cells.into_iter();
        let event_datetime = it.next()?;
        let eta = it.next()?;
        let class = it.next()?;
        if class.to_lowercase() != classification.to_lowercase() {
            return None;
        }
        let vessel = it.next()?;
        let berth = it.next()?;
        it.next()?;
        let origin = it.next()?;
        let destination = it.next()?;
        Some(Self {
            event_datetime,
            eta,
            vessel,
            berth,
            origin,
            destination,
        })
    }
}

/// A heading-keyed row: at least 4 cells plus the heading it sat under.
///
/// Source columns: 0 vessel, 1 date/time, 2 origin, 3 destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRow {
    pub category: String,
    pub vessel: String,
    pub event_datetime: String,
    pub origin: String,
    pub destination: String,
}

impl SectionRow {
    pub fn from_cells(cells: RawRow, category: &str) -> Option<Self> {
        if cells.len() < SECTION_MIN_CELLS {
            return None;
        }
        let mut it = cells.into_iter();
        Some(Self {
            category: category.to_string(),
            vessel: it.next()?,
            event_datetime: it.next()?,
            origin: it.next()?,
            destination: it.next()?,
        })
    }
}

/// Maps validated rows to records, stamping `captured_at` at mapping time.
#[derive(Clone)]
pub struct Normalizer {
    clock: Arc<dyn Clock>,
    zone: Tz,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl Normalizer {
    /// Normalizer on the system clock.
    ///
    /// ```
    /// use portwatch_extract::Normalizer;
    ///
    /// let normalizer = Normalizer::new(chrono_tz::Australia::Sydney);
    /// let now = normalizer.now();
    /// assert!(now.offset().local_minus_utc() >= 10 * 3600);
    /// ```
    pub fn new(zone: Tz) -> Self {
        Self::with_clock(Arc::new(SystemClock), zone)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, zone: Tz) -> Self {
        Self { clock, zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Current instant in the reference zone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now().with_timezone(&self.zone).fixed_offset()
    }

    pub fn table_record(&self, port: Port, row: TableRow) -> ArrivalRecord {
        ArrivalRecord {
            port,
            vessel: row.vessel,
            event_datetime: row.event_datetime,
            eta: Some(row.eta),
            origin: row.origin,
            destination: row.destination,
            berth: Some(row.berth),
            category: None,
            captured_at: self.now(),
        }
    }

    pub fn section_record(&self, port: Port, row: SectionRow) -> ArrivalRecord {
        ArrivalRecord {
            port,
            vessel: row.vessel,
            event_datetime: row.event_datetime,
            eta: None,
            origin: row.origin,
            destination: row.destination,
            berth: None,
            category: Some(row.category),
            captured_at: self.now(),
        }
    }
}
