use crate::error::ExtractError;
use async_trait::async_trait;
use portwatch_common::{ArrivalRecord, Port, SourceSnapshot, SourceStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Wall-clock budget for one source run, checked between fetches.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    /// Expires `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
            budget,
        }
    }

    pub fn none() -> Self {
        Self {
            at: None,
            budget: Duration::ZERO,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Await `fut` unless the deadline passes first.
    pub async fn run<F: Future>(&self, port: Port, fut: F) -> Result<F::Output, ExtractError> {
        let Some(at) = self.at else {
            return Ok(fut.await);
        };
        tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| ExtractError::DeadlineExceeded {
                port,
                deadline: self.budget,
            })
    }
}

/// What one extractor produced, including anything kept before a failure.
#[derive(Debug)]
pub struct Extraction {
    pub port: Port,
    pub records: Vec<ArrivalRecord>,
    pub pages_fetched: usize,
    pub error: Option<ExtractError>,
}

impl Extraction {
    pub fn new(port: Port) -> Self {
        Self {
            port,
            records: Vec::new(),
            pages_fetched: 0,
            error: None,
        }
    }

    /// Collapse into a per-source snapshot.
    ///
    /// An error after at least one page was read keeps the rows as `Partial`;
    /// an error before any page was read is `Failed`.
    pub fn into_source(self) -> SourceSnapshot {
        match self.error {
            None => SourceSnapshot::complete(self.records, self.pages_fetched),
            Some(err) if self.pages_fetched > 0 || !self.records.is_empty() => SourceSnapshot {
                status: SourceStatus::Partial {
                    error: err.to_string(),
                },
                pages_fetched: self.pages_fetched,
                records: self.records,
            },
            Some(err) => SourceSnapshot::failed(err.to_string()),
        }
    }
}

/// A pluggable source: fetches its pages and returns normalized records.
///
/// Extraction never fails outright; errors travel inside the [`Extraction`]
/// so that rows kept before them are not lost. That includes running out
/// of time: an implementation stops fetching once `deadline` passes and
/// returns what it has with [`ExtractError::DeadlineExceeded`].
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    fn port(&self) -> Port;
    fn endpoint(&self) -> &Url;
    async fn extract_within(&self, deadline: Deadline) -> Extraction;

    async fn extract(&self) -> Extraction {
        self.extract_within(Deadline::none()).await
    }
}

#[derive(Clone)]
pub struct RegisteredSource {
    pub extractor: Arc<dyn SourceExtractor>,
    pub deadline: Duration,
}

/// Extractors keyed by port, at most one per port, in registration order.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    entries: Vec<RegisteredSource>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        extractor: Arc<dyn SourceExtractor>,
        deadline: Duration,
    ) -> Result<(), ExtractError> {
        let port = extractor.port();
        if self.entries.iter().any(|e| e.extractor.port() == port) {
            return Err(ExtractError::DuplicatePort(port));
        }
        tracing::debug!(%port, endpoint = %extractor.endpoint(), ?deadline, "extract.registry.add");
        self.entries.push(RegisteredSource {
            extractor,
            deadline,
        });
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSource> {
        self.entries.iter()
    }

    pub fn ports(&self) -> Vec<Port> {
        self.entries.iter().map(|e| e.extractor.port()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ports()).finish()
    }
}
