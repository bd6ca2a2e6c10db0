//! Normalization, deduplication and reconciliation of instrument listings.
//!
//! Everything in this crate is pure: no I/O, no fallible operations. Anomalies
//! are returned as values and logged through `tracing`.

mod anomaly;
mod dedupe;
mod emit;
mod instrument;
mod key;
mod naming;
mod normalize;
mod profile;
mod reconcile;
mod route;

pub use anomaly::Anomaly;
pub use dedupe::{dedupe, Deduplicated, DuplicateCollision};
pub use emit::{emit, ReportTables, Table};
pub use instrument::{
    normalize_symbol, NormalizedInstrument, RawRecord, RawValue, SourceKind,
    DEFAULT_OUTPUT_COLUMNS,
};
pub use key::key_of;
pub use naming::{is_plain_identifier, label_stem};
pub use normalize::{extract_isin, normalize, short_name_of, NormalizeStats, Normalized, Normalizer};
pub use profile::SourceProfile;
pub use reconcile::{
    check_completeness, merge, reconcile, CommonPair, ReconSummary, Reconciler, Reconciliation,
};
pub use route::{route_documents, KeyedInstrument, Routed};

/// Default output header as owned strings.
pub fn default_columns() -> Vec<String> {
    DEFAULT_OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect()
}
