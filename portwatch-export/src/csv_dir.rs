//! One CSV per source in the snapshot plus a `Last Updated.csv` summary, in
//! a dated directory. Ports that did not run get no file.

use crate::error::{ExportError, IoContext};
use crate::{SnapshotWriter, artifact_name};
use portwatch_common::{ArrivalRecord, Snapshot};
use std::fs;
use std::path::{Path, PathBuf};

pub const COLUMNS: [&str; 9] = [
    "Port",
    "Vessel",
    "DateTime",
    "ETA",
    "From",
    "To",
    "Berth",
    "Category",
    "Last Updated",
];

pub const SUMMARY_FILE: &str = "Last Updated.csv";

const STAMP: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone)]
pub struct CsvDirectoryWriter {
    dir: PathBuf,
    stem: String,
}

impl CsvDirectoryWriter {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    /// Final directory for a snapshot: `<dir>/<stem>_<YYYY-MM-DD>`.
    pub fn target(&self, snapshot: &Snapshot) -> PathBuf {
        self.dir.join(artifact_name(&self.stem, snapshot))
    }

    fn write_port(path: &Path, records: &[ArrivalRecord]) -> Result<(), ExportError> {
        let mut out = csv::Writer::from_path(path)?;
        out.write_record(COLUMNS)?;
        for r in records {
            let stamp = r.captured_at.format(STAMP).to_string();
            out.write_record([
                r.port.name(),
                r.vessel.as_str(),
                r.event_datetime.as_str(),
                r.eta.as_deref().unwrap_or_default(),
                r.origin.as_str(),
                r.destination.as_str(),
                r.berth.as_deref().unwrap_or_default(),
                r.category.as_deref().unwrap_or_default(),
                stamp.as_str(),
            ])?;
        }
        out.flush().at("flush", path)?;
        Ok(())
    }

    fn write_summary(path: &Path, snapshot: &Snapshot) -> Result<(), ExportError> {
        let mut out = csv::WriterBuilder::new().flexible(true).from_path(path)?;
        let generated = snapshot.generated_at.format(STAMP).to_string();
        out.write_record(["Last Updated", generated.as_str()])?;
        out.write_record(["Port", "Status", "Records", "Pages", "Error"])?;
        for (port, source) in &snapshot.sources {
            let records = source.records.len().to_string();
            let pages = source.pages_fetched.to_string();
            out.write_record([
                port.name(),
                source.status.label(),
                records.as_str(),
                pages.as_str(),
                source.status.error().unwrap_or_default(),
            ])?;
        }
        out.flush().at("flush", path)?;
        Ok(())
    }
}

impl SnapshotWriter for CsvDirectoryWriter {
    /// Writes into a staging directory next to the target, then swaps it in.
    fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, ExportError> {
        let target = self.target(snapshot);
        let name = artifact_name(&self.stem, snapshot);
        let staging = self.dir.join(format!(".{name}.staging"));
        let retired = self.dir.join(format!(".{name}.old"));

        fs::create_dir_all(&self.dir).at("create", &self.dir)?;
        remove_dir_if_present(&staging)?;
        fs::create_dir(&staging).at("create", &staging)?;

        for (port, source) in &snapshot.sources {
            let path = staging.join(format!("{}.csv", port.name()));
            Self::write_port(&path, &source.records)?;
        }
        Self::write_summary(&staging.join(SUMMARY_FILE), snapshot)?;

        swap_in(&staging, &target, &retired)?;

        tracing::info!(
            path = %target.display(),
            records = snapshot.record_count(),
            "export.csv.written"
        );
        Ok(target)
    }
}

/// Replace `target` with `staging`, parking any previous artifact at
/// `retired` until the swap succeeds. On a failed publish the previous
/// artifact is moved back.
fn swap_in(staging: &Path, target: &Path, retired: &Path) -> Result<(), ExportError> {
    remove_dir_if_present(retired)?;
    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, retired).at("retire", target)?;
    }
    if let Err(err) = fs::rename(staging, target) {
        if had_previous {
            if let Err(restore) = fs::rename(retired, target) {
                tracing::error!(
                    path = %target.display(),
                    parked = %retired.display(),
                    error = %restore,
                    "export.csv.restore_failed"
                );
            }
        }
        return Err(err).at("publish", target);
    }
    remove_dir_if_present(retired)
}

fn remove_dir_if_present(path: &Path) -> Result<(), ExportError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).at("remove", path),
    }
}
