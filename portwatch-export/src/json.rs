use crate::error::{ExportError, IoContext};
use crate::{SnapshotWriter, artifact_name};
use portwatch_common::Snapshot;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// The whole snapshot as pretty JSON in `<dir>/<stem>_<YYYY-MM-DD>.json`.
#[derive(Debug, Clone)]
pub struct JsonWriter {
    dir: PathBuf,
    stem: String,
}

impl JsonWriter {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    pub fn target(&self, snapshot: &Snapshot) -> PathBuf {
        self.dir
            .join(format!("{}.json", artifact_name(&self.stem, snapshot)))
    }
}

impl SnapshotWriter for JsonWriter {
    fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, ExportError> {
        let target = self.target(snapshot);
        let tmp = target.with_extension("json.tmp");

        fs::create_dir_all(&self.dir).at("create", &self.dir)?;
        let file = File::create(&tmp).at("create", &tmp)?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, snapshot)?;
        out.write_all(b"\n").at("write", &tmp)?;
        out.flush().at("flush", &tmp)?;
        drop(out);

        fs::rename(&tmp, &target).at("publish", &target)?;
        tracing::info!(
            path = %target.display(),
            records = snapshot.record_count(),
            "export.json.written"
        );
        Ok(target)
    }
}
