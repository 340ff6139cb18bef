use portwatch_common::Port;
use portwatch_http::HttpError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{port}: fetching {url} failed: {source}")]
    Fetch {
        port: Port,
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("{port}: still finding rows after {max_pages} pages")]
    PaginationCapExceeded { port: Port, max_pages: u32 },

    #[error("{port}: page {page} repeated the rows of the previous page")]
    StagnantPagination { port: Port, page: u32 },

    #[error("{port}: no result within {deadline:?}")]
    DeadlineExceeded { port: Port, deadline: Duration },

    #[error("invalid heading tag {0:?}")]
    InvalidHeadingTag(String),

    #[error("{0} already has a registered extractor")]
    DuplicatePort(Port),
}
