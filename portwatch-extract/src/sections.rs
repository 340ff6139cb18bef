//! Sources that publish one page with several titled tables, keeping the
//! tables whose heading mentions a keyword.

use crate::error::ExtractError;
use crate::html::{data_rows, headed_tables};
use crate::normalize::{Normalizer, SectionRow};
use crate::registry::{Deadline, Extraction, SourceExtractor};
use async_trait::async_trait;
use portwatch_common::Port;
use portwatch_http::PageFetcher;
use scraper::Html;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone)]
pub struct SectionSettings {
    pub heading_tag: String,
    /// Matched case-insensitively as a substring of the heading text.
    pub keyword: String,
}

impl Default for SectionSettings {
    fn default() -> Self {
        Self {
            heading_tag: "h3".into(),
            keyword: "arrival".into(),
        }
    }
}

pub struct HeadingKeyedExtractor {
    port: Port,
    url: Url,
    heading_tag: String,
    keyword: String,
    fetcher: Arc<dyn PageFetcher>,
    normalizer: Normalizer,
}

impl HeadingKeyedExtractor {
    /// Fails when the heading tag is not a plain element name.
    pub fn new(
        port: Port,
        url: Url,
        fetcher: Arc<dyn PageFetcher>,
        normalizer: Normalizer,
        settings: SectionSettings,
    ) -> Result<Self, ExtractError> {
        let tag = settings.heading_tag.trim();
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ExtractError::InvalidHeadingTag(settings.heading_tag));
        }
        Ok(Self {
            port,
            url,
            heading_tag: tag.to_ascii_lowercase(),
            keyword: settings.keyword.to_lowercase(),
            fetcher,
            normalizer,
        })
    }

    /// Rows of every table under a matching heading, in document order,
    /// each tagged with the lower-cased heading text.
    ///
    /// A matching heading with no following table contributes nothing.
    pub fn section_rows(&self, body: &str) -> Vec<SectionRow> {
        let doc = Html::parse_document(body);
        let mut rows = Vec::new();
        for section in headed_tables(&doc, &self.heading_tag) {
            let category = section.heading.to_lowercase();
            if !category.contains(&self.keyword) {
                continue;
            }
            let Some(table) = section.table else {
                tracing::debug!(port = %self.port, heading = %section.heading, "extract.section.no_table");
                continue;
            };
            rows.extend(
                data_rows(table)
                    .into_iter()
                    .filter_map(|cells| SectionRow::from_cells(cells, &category)),
            );
        }
        rows
    }
}

#[async_trait]
impl SourceExtractor for HeadingKeyedExtractor {
    fn port(&self) -> Port {
        self.port
    }

    fn endpoint(&self) -> &Url {
        &self.url
    }

    async fn extract_within(&self, deadline: Deadline) -> Extraction {
        let mut extraction = Extraction::new(self.port);
        let fetched = deadline
            .run(self.port, self.fetcher.fetch_page(&self.url))
            .await
            .and_then(|page| {
                page.map_err(|source| ExtractError::Fetch {
                    port: self.port,
                    url: self.url.to_string(),
                    source,
                })
            });
        let page = match fetched {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(port = %self.port, error = %err, "extract.section.fetch_failed");
                extraction.error = Some(err);
                return extraction;
            }
        };
        extraction.pages_fetched = 1;

        let rows = self.section_rows(&page.body);
        extraction.records = rows
            .into_iter()
            .map(|row| self.normalizer.section_record(self.port, row))
            .collect();

        tracing::info!(
            port = %self.port,
            records = extraction.records.len(),
            "extract.section.done"
        );
        extraction
    }
}
