use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::anomaly::Anomaly;
use crate::instrument::NormalizedInstrument;
use crate::key::key_of;

/// Instrument listed by both sources, with the merged view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommonPair {
    pub left: NormalizedInstrument,
    pub right: NormalizedInstrument,
    pub merged: NormalizedInstrument,
}

/// Three-way partition of two deduplicated listings.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub left_label: String,
    pub right_label: String,
    pub common: Vec<CommonPair>,
    pub only_left: Vec<NormalizedInstrument>,
    pub only_right: Vec<NormalizedInstrument>,
    /// Size of the union of both key sets.
    pub union_size: usize,
    /// False when the completeness check failed.
    pub validated: bool,
    pub anomalies: Vec<Anomaly>,
}

impl Reconciliation {
    pub fn partitioned(&self) -> usize {
        self.common.len() + self.only_left.len() + self.only_right.len()
    }

    pub fn summary(&self) -> ReconSummary {
        ReconSummary {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            left: self.left_label.clone(),
            right: self.right_label.clone(),
            common: self.common.len(),
            only_left: self.only_left.len(),
            only_right: self.only_right.len(),
            union: self.union_size,
            validated: self.validated,
            anomalies: self.anomalies.clone(),
        }
    }
}

/// Serializable digest of a reconciliation run.
#[derive(Clone, Debug, Serialize)]
pub struct ReconSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub left: String,
    pub right: String,
    pub common: usize,
    pub only_left: usize,
    pub only_right: usize,
    pub union: usize,
    pub validated: bool,
    pub anomalies: Vec<Anomaly>,
}

/// Stateless engine that partitions two listings by join key.
#[derive(Clone, Debug)]
pub struct Reconciler {
    left_label: String,
    right_label: String,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new("left", "right")
    }
}

impl Reconciler {
    pub fn new(left_label: impl Into<String>, right_label: impl Into<String>) -> Self {
        Self {
            left_label: left_label.into(),
            right_label: right_label.into(),
        }
    }

    /// Partition `left` and `right` into common, left-only and right-only.
    ///
    /// Both inputs are expected to be deduplicated. Membership depends only on the
    /// join key; differing field values never move a record out of `common`.
    pub fn reconcile(
        &self,
        left: Vec<NormalizedInstrument>,
        right: Vec<NormalizedInstrument>,
    ) -> Reconciliation {
        debug!(
            left = %self.left_label,
            sample = ?sample_symbols(&left),
            "left trading symbols"
        );
        debug!(
            right = %self.right_label,
            sample = ?sample_symbols(&right),
            "right trading symbols"
        );

        let left_keys: HashSet<String> = left.iter().map(|i| key_of(i).to_string()).collect();
        let right_keys: HashSet<String> = right.iter().map(|i| key_of(i).to_string()).collect();
        let union_size = left_keys.union(&right_keys).count();

        let mut right_index: HashMap<String, NormalizedInstrument> =
            HashMap::with_capacity(right.len());
        let mut only_right = Vec::new();
        let mut collapsed_right = 0;
        for instrument in right {
            if left_keys.contains(key_of(&instrument)) {
                match right_index.entry(key_of(&instrument).to_string()) {
                    Entry::Vacant(slot) => {
                        slot.insert(instrument);
                    }
                    Entry::Occupied(_) => collapsed_right += 1,
                }
            } else {
                only_right.push(instrument);
            }
        }

        let mut common = Vec::new();
        let mut only_left = Vec::new();
        for instrument in left {
            match right_index.get(key_of(&instrument)) {
                Some(counterpart) => {
                    let merged = merge(&instrument, counterpart);
                    common.push(CommonPair {
                        left: instrument,
                        right: counterpart.clone(),
                        merged,
                    });
                }
                None => only_left.push(instrument),
            }
        }

        // Right-side repeats of a common key are folded into one pair; count them
        // so duplicates on either side break the completeness check.
        let partitioned = common.len() + only_left.len() + only_right.len() + collapsed_right;
        let mut anomalies = Vec::new();
        let validated = match check_completeness(partitioned, union_size) {
            Ok(()) => true,
            Err(anomaly) => {
                warn!(
                    partitioned,
                    union = union_size,
                    "partition counts do not add up to the key union"
                );
                anomalies.push(anomaly);
                false
            }
        };

        info!(
            common = common.len(),
            only_left = only_left.len(),
            only_right = only_right.len(),
            union = union_size,
            left = %self.left_label,
            right = %self.right_label,
            "reconciled listings"
        );

        Reconciliation {
            left_label: self.left_label.clone(),
            right_label: self.right_label.clone(),
            common,
            only_left,
            only_right,
            union_size,
            validated,
            anomalies,
        }
    }
}

/// Reconcile with generic labels.
pub fn reconcile(
    left: Vec<NormalizedInstrument>,
    right: Vec<NormalizedInstrument>,
) -> Reconciliation {
    Reconciler::default().reconcile(left, right)
}

/// Completeness law: every key of the union lands in exactly one partition.
pub fn check_completeness(partitioned: usize, union: usize) -> Result<(), Anomaly> {
    if partitioned == union {
        Ok(())
    } else {
        Err(Anomaly::PartitionMismatch { partitioned, union })
    }
}

/// Field-wise merge: left value when present and non-blank, else right, else null.
pub fn merge(left: &NormalizedInstrument, right: &NormalizedInstrument) -> NormalizedInstrument {
    NormalizedInstrument {
        exchange: prefer_required(&left.exchange, &right.exchange),
        trading_symbol: prefer_required(&left.trading_symbol, &right.trading_symbol),
        instrument_key: prefer(&left.instrument_key, &right.instrument_key),
        symbol_name: prefer(&left.symbol_name, &right.symbol_name),
        security_id: prefer(&left.security_id, &right.security_id),
        short_name: prefer(&left.short_name, &right.short_name),
        name: prefer(&left.name, &right.name),
        isin: prefer(&left.isin, &right.isin),
        source: left.source,
    }
}

fn prefer(left: &Option<String>, right: &Option<String>) -> Option<String> {
    present(left).or_else(|| present(right))
}

fn prefer_required(left: &str, right: &str) -> String {
    if left.trim().is_empty() {
        right.to_string()
    } else {
        left.to_string()
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .filter(|text| !text.trim().is_empty())
        .cloned()
}

fn sample_symbols(instruments: &[NormalizedInstrument]) -> Vec<&str> {
    instruments.iter().take(5).map(key_of).collect()
}
