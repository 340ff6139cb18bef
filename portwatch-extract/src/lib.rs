//! Extraction and normalization engine for vessel-arrival pages.
//!
//! - HTML cell-text helpers over a `scraper` DOM (`html`)
//! - Row shapes, their filters, and the record mapper (`normalize`)
//! - Paginated-table sources that walk `?page=N` until an empty table (`paginated`)
//! - Heading-keyed sources that pick tables by section title (`sections`)
//! - The extractor trait and its registry (`registry`)
//! - Concurrent snapshot assembly with per-source deadlines (`assemble`)
//!
//! Transport lives behind [`portwatch_http::PageFetcher`], so every extractor
//! can be driven by canned pages in tests.

pub mod assemble;
pub mod error;
pub mod html;
pub mod normalize;
pub mod paginated;
pub mod registry;
pub mod sections;

pub use assemble::Assembler;
pub use error::ExtractError;
pub use html::RawRow;
pub use normalize::{Clock, FixedClock, Normalizer, SectionRow, SystemClock, TableRow};
pub use paginated::{PageBatch, PaginatedTableExtractor, PaginationSettings};
pub use registry::{Deadline, Extraction, ExtractorRegistry, SourceExtractor};
pub use sections::{HeadingKeyedExtractor, SectionSettings};
