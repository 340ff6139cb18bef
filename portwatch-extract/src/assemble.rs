//! Runs every registered extractor concurrently and merges the results.

use crate::error::ExtractError;
use crate::normalize::Normalizer;
use crate::registry::{Deadline, ExtractorRegistry, RegisteredSource};
use futures::future::join_all;
use portwatch_common::{Port, Snapshot, SourceSnapshot};
use std::time::Duration;
use tracing::Instrument;

/// Extra time an extractor gets to hand back its rows after its deadline
/// before it is abandoned outright.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

pub struct Assembler {
    registry: ExtractorRegistry,
    normalizer: Normalizer,
}

impl Assembler {
    pub fn new(registry: ExtractorRegistry, normalizer: Normalizer) -> Self {
        Self {
            registry,
            normalizer,
        }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// One snapshot across all sources.
    ///
    /// Sources run concurrently, each under its own deadline. A source that
    /// runs out of time keeps the rows it already had (`Partial`), or is
    /// `Failed` if it had none, and never blocks the others.
    /// `generated_at` is stamped once every source has settled.
    pub async fn assemble(&self) -> Snapshot {
        let runs = self.registry.iter().map(run_source);
        let settled = join_all(runs).await;

        let mut snapshot = Snapshot::new(self.normalizer.now());
        for (port, source) in settled {
            if let Some(error) = source.status.error() {
                tracing::warn!(
                    %port,
                    status = source.status.label(),
                    records = source.records.len(),
                    error,
                    "assemble.source.degraded"
                );
            }
            snapshot.insert(port, source);
        }

        tracing::info!(
            sources = snapshot.sources.len(),
            records = snapshot.record_count(),
            generated_at = %snapshot.generated_at,
            "assemble.done"
        );
        snapshot
    }
}

async fn run_source(entry: &RegisteredSource) -> (Port, SourceSnapshot) {
    let port = entry.extractor.port();
    let span = tracing::info_span!("source", %port);
    let extraction = entry.extractor.extract_within(Deadline::after(entry.deadline));
    let outcome = tokio::time::timeout(entry.deadline + DEADLINE_GRACE, extraction)
        .instrument(span)
        .await;

    let source = match outcome {
        Ok(extraction) => extraction.into_source(),
        Err(_) => {
            tracing::warn!(%port, "assemble.source.abandoned");
            SourceSnapshot::failed(
                ExtractError::DeadlineExceeded {
                    port,
                    deadline: entry.deadline,
                }
                .to_string(),
            )
        }
    };
    (port, source)
}
