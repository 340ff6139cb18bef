//! Snapshot writers.
//!
//! Every writer names its artifact after the configured file stem and the
//! snapshot's generation date, and replaces any artifact already there.
//!
//! ```no_run
//! use portwatch_config::OutputConfig;
//! use portwatch_common::Snapshot;
//!
//! let writer = portwatch_export::writer_for(&OutputConfig::default());
//! let snapshot = Snapshot::new(chrono::Utc::now().fixed_offset());
//! let path = writer.write(&snapshot)?;
//! println!("saved to {}", path.display());
//! # Ok::<(), portwatch_export::ExportError>(())
//! ```

mod csv_dir;
mod error;
mod json;

pub use csv_dir::{COLUMNS, CsvDirectoryWriter, SUMMARY_FILE};
pub use error::ExportError;
pub use json::JsonWriter;

use portwatch_common::{OutputFormat, Snapshot};
use portwatch_config::OutputConfig;
use std::path::PathBuf;

pub trait SnapshotWriter: Send + Sync {
    /// Persist `snapshot` and return the path of the artifact.
    fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, ExportError>;
}

pub fn writer_for(output: &OutputConfig) -> Box<dyn SnapshotWriter> {
    match output.format {
        OutputFormat::Csv => Box::new(CsvDirectoryWriter::new(&output.dir, &output.file_stem)),
        OutputFormat::Json => Box::new(JsonWriter::new(&output.dir, &output.file_stem)),
    }
}

/// `<stem>_<YYYY-MM-DD>`, dated in the snapshot's own offset.
pub(crate) fn artifact_name(stem: &str, snapshot: &Snapshot) -> String {
    format!("{stem}_{}", snapshot.generated_at.format("%Y-%m-%d"))
}
