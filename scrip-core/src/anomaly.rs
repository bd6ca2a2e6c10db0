use std::fmt;

use serde::Serialize;

/// Recoverable conditions detected while reconciling. None of them abort a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// The source filter matched zero rows.
    FilterYieldedEmpty { source: String, total_rows: usize },
    /// Several records normalized to the same symbol; the first one was kept.
    DuplicateKeyCollision {
        source: String,
        trading_symbol: String,
        kept: String,
        discarded: Vec<String>,
    },
    /// Partition sizes do not add up to the size of the key union.
    PartitionMismatch { partitioned: usize, union: usize },
    /// A composite instrument key had no ISIN component.
    MalformedCompositeKey {
        source: String,
        instrument_key: String,
    },
}

impl Anomaly {
    pub fn is_partition_mismatch(&self) -> bool {
        matches!(self, Anomaly::PartitionMismatch { .. })
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::FilterYieldedEmpty { source, total_rows } => {
                write!(f, "{source}: filter matched none of {total_rows} rows")
            }
            Anomaly::DuplicateKeyCollision {
                source,
                trading_symbol,
                kept,
                discarded,
            } => write!(
                f,
                "{source}: duplicate symbol {trading_symbol}, kept {kept}, discarded [{}]",
                discarded.join(", ")
            ),
            Anomaly::PartitionMismatch { partitioned, union } => write!(
                f,
                "partition count {partitioned} does not match key union {union}"
            ),
            Anomaly::MalformedCompositeKey {
                source,
                instrument_key,
            } => write!(f, "{source}: instrument key '{instrument_key}' carries no ISIN"),
        }
    }
}
