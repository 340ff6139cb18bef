//! Sources that publish one table spread over `?page=N` URLs.
//!
//! Pages are fetched one after another until a page has no table or a table
//! with only its header row. Two guards keep a misbehaving site from holding
//! the loop open: a page cap, and a fingerprint check that stops when a page
//! repeats the rows of the one before it.

use crate::error::ExtractError;
use crate::html::{RawRow, first_table_rows};
use crate::normalize::{Normalizer, TableRow};
use crate::registry::{Deadline, Extraction, SourceExtractor};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use portwatch_common::Port;
use portwatch_http::PageFetcher;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub page_param: String,
    pub first_page: u32,
    /// Most pages with rows that will be accepted.
    pub max_pages: u32,
    /// Value of the classification column that marks an arrival.
    pub classification: String,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_param: "page".into(),
            first_page: 1,
            max_pages: 50,
            classification: "arrival".into(),
        }
    }
}

/// One fetched page. The stream ends right after a terminal page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBatch {
    pub page: u32,
    pub table_found: bool,
    pub rows: Vec<RawRow>,
}

impl PageBatch {
    pub fn is_terminal(&self) -> bool {
        !self.table_found || self.rows.is_empty()
    }
}

pub struct PaginatedTableExtractor {
    port: Port,
    base: Url,
    settings: PaginationSettings,
    fetcher: Arc<dyn PageFetcher>,
    normalizer: Normalizer,
}

impl PaginatedTableExtractor {
    pub fn new(
        port: Port,
        base: Url,
        fetcher: Arc<dyn PageFetcher>,
        normalizer: Normalizer,
        settings: PaginationSettings,
    ) -> Self {
        Self {
            port,
            base,
            settings,
            fetcher,
            normalizer,
        }
    }

    /// The base URL with the page parameter set to `page`, replacing any
    /// existing value and keeping other query pairs.
    pub fn page_url(&self, page: u32) -> Url {
        let param = self.settings.page_param.as_str();
        let kept: Vec<(String, String)> = self
            .base
            .query_pairs()
            .filter(|(k, _)| k != param)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = self.base.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(param, &page.to_string());
        url
    }

    /// Lazily fetch pages in order.
    ///
    /// No deadline applies here; [`SourceExtractor::extract_within`] bounds
    /// the whole walk.
    ///
    /// Yields every fetched page, ending after the first terminal one. Fails
    /// (and ends) on a fetch error, on a page whose rows match the previous
    /// page, or when a page beyond `max_pages` still has rows.
    pub fn pages(&self) -> impl Stream<Item = Result<PageBatch, ExtractError>> + Send + '_ {
        try_stream! {
            let mut previous: Option<blake3::Hash> = None;
            let mut offset = 0u32;
            loop {
                let page = self.settings.first_page.saturating_add(offset);
                let url = self.page_url(page);
                tracing::debug!(port = %self.port, page, url = %url, "extract.page.fetch");

                let fetched = self
                    .fetcher
                    .fetch_page(&url)
                    .await
                    .map_err(|source| ExtractError::Fetch {
                        port: self.port,
                        url: url.to_string(),
                        source,
                    })?;

                let batch = match first_table_rows(&fetched.body) {
                    Some(rows) => PageBatch { page, table_found: true, rows },
                    None => PageBatch { page, table_found: false, rows: Vec::new() },
                };

                if batch.is_terminal() {
                    tracing::debug!(
                        port = %self.port,
                        page,
                        table_found = batch.table_found,
                        "extract.page.terminal"
                    );
                    yield batch;
                    break;
                }

                if offset >= self.settings.max_pages {
                    Err::<(), _>(ExtractError::PaginationCapExceeded {
                        port: self.port,
                        max_pages: self.settings.max_pages,
                    })?;
                }

                let digest = fingerprint(&batch.rows);
                if previous == Some(digest) {
                    Err::<(), _>(ExtractError::StagnantPagination { port: self.port, page })?;
                }
                previous = Some(digest);

                yield batch;
                offset += 1;
            }
        }
    }

    fn accept(&self, rows: Vec<RawRow>, extraction: &mut Extraction) {
        for cells in rows {
            if let Some(row) = TableRow::from_cells(cells, &self.settings.classification) {
                extraction
                    .records
                    .push(self.normalizer.table_record(self.port, row));
            }
        }
    }
}

/// Content hash of a page's rows, independent of surrounding markup.
fn fingerprint(rows: &[RawRow]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update(&[0x1f]);
        }
        hasher.update(&[0x1e]);
    }
    hasher.finalize()
}

#[async_trait]
impl SourceExtractor for PaginatedTableExtractor {
    fn port(&self) -> Port {
        self.port
    }

    fn endpoint(&self) -> &Url {
        &self.base
    }

    async fn extract_within(&self, deadline: Deadline) -> Extraction {
        let mut extraction = Extraction::new(self.port);
        let pages = self.pages();
        futures::pin_mut!(pages);

        loop {
            let batch = match deadline.run(self.port, pages.next()).await {
                Ok(None) => break,
                Ok(Some(batch)) => batch,
                Err(expired) => Err(expired),
            };
            match batch {
                Ok(batch) => {
                    extraction.pages_fetched += 1;
                    self.accept(batch.rows, &mut extraction);
                }
                Err(err) => {
                    tracing::warn!(
                        port = %self.port,
                        pages = extraction.pages_fetched,
                        kept = extraction.records.len(),
                        error = %err,
                        "extract.pagination.stopped"
                    );
                    extraction.error = Some(err);
                    break;
                }
            }
        }

        tracing::info!(
            port = %self.port,
            pages = extraction.pages_fetched,
            records = extraction.records.len(),
            "extract.pagination.done"
        );
        extraction
    }
}
