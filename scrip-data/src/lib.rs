//! Listing retrieval, CSV decoding and report artifacts.

pub mod fetch;
pub mod records;
pub mod report;

pub use fetch::{decode_payload, write_snapshot, HttpFetcher, ListingFetcher, SnapshotPaths, SourceLocation};
pub use records::{read_headers, read_raw_records};
pub use report::{ReportPaths, ReportWriter};
