use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::anomaly::Anomaly;
use crate::instrument::{normalize_symbol, NormalizedInstrument, RawRecord, SourceKind};
use crate::profile::SourceProfile;

/// Cap on distinct filter values remembered for diagnostics.
const MAX_DISTINCT_VALUES: usize = 32;

/// Counters collected while normalizing one source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub total: usize,
    pub retained: usize,
    pub filtered_out: usize,
    pub missing_symbol: usize,
    pub malformed_keys: usize,
    pub exchange_values: BTreeSet<String>,
    pub instrument_types: BTreeSet<String>,
}

/// Output of a normalization pass.
#[derive(Clone, Debug)]
pub struct Normalized {
    pub instruments: Vec<NormalizedInstrument>,
    pub stats: NormalizeStats,
    pub anomalies: Vec<Anomaly>,
}

/// Maps raw provider rows into [`NormalizedInstrument`]s according to a [`SourceProfile`].
#[derive(Clone, Debug)]
pub struct Normalizer {
    profile: SourceProfile,
}

impl Normalizer {
    pub fn new(profile: SourceProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    /// Filter, then normalize every retained record. Never fails.
    pub fn normalize<I>(&self, records: I) -> Normalized
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let profile = &self.profile;
        let mut stats = NormalizeStats::default();
        let mut anomalies = Vec::new();
        let mut instruments = Vec::new();
        let mut samples = Vec::new();

        for record in records {
            stats.total += 1;
            let exchange = record.text(&profile.exchange_column);
            let instrument_type = record.text(&profile.instrument_type_column);
            remember(&mut stats.exchange_values, exchange.as_deref());
            remember(&mut stats.instrument_types, instrument_type.as_deref());
            if samples.len() < 5 {
                samples.push(format!(
                    "{}={:?} {}={:?}",
                    profile.exchange_column,
                    exchange.as_deref().unwrap_or(""),
                    profile.instrument_type_column,
                    instrument_type.as_deref().unwrap_or("")
                ));
            }

            if !matches_target(exchange.as_deref(), &profile.exchange_value)
                || !matches_target(instrument_type.as_deref(), &profile.instrument_type_value)
            {
                stats.filtered_out += 1;
                continue;
            }

            let Some(trading_symbol) = record
                .text(&profile.symbol_column)
                .map(|raw| normalize_symbol(&raw))
                .filter(|symbol| !symbol.is_empty())
            else {
                stats.missing_symbol += 1;
                continue;
            };

            let name = clean(record.text(&profile.name_column));
            let instrument_key = profile
                .instrument_key_column
                .as_deref()
                .and_then(|column| clean(record.text(column)));
            let security_id = profile
                .security_id_column
                .as_deref()
                .and_then(|column| clean(record.text(column)));

            let isin = if profile.isin_from_instrument_key {
                match instrument_key.as_deref() {
                    Some(key) => match isin_from_composite_key(key) {
                        CompositeIsin::Present(isin) => Some(isin),
                        CompositeIsin::Blank => None,
                        CompositeIsin::Malformed => {
                            stats.malformed_keys += 1;
                            debug!(source = %profile.label, instrument_key = %key, "composite key carries no ISIN");
                            anomalies.push(Anomaly::MalformedCompositeKey {
                                source: profile.label.clone(),
                                instrument_key: key.to_string(),
                            });
                            None
                        }
                    },
                    None => None,
                }
            } else {
                None
            };

            instruments.push(NormalizedInstrument {
                exchange: profile.output_exchange.clone(),
                short_name: name.as_deref().and_then(short_name_of),
                symbol_name: name.clone(),
                name,
                trading_symbol,
                instrument_key,
                security_id,
                isin,
                source: profile.kind,
            });
        }

        stats.retained = instruments.len();
        info!(
            source = %profile.label,
            total = stats.total,
            retained = stats.retained,
            filtered_out = stats.filtered_out,
            missing_symbol = stats.missing_symbol,
            "normalized source listing"
        );
        debug!(
            source = %profile.label,
            exchanges = ?stats.exchange_values,
            instrument_types = ?stats.instrument_types,
            "distinct filter values"
        );
        if stats.malformed_keys > 0 {
            warn!(
                source = %profile.label,
                count = stats.malformed_keys,
                "instrument keys without ISIN component"
            );
        }
        if stats.filtered_out == stats.total {
            warn!(
                source = %profile.label,
                total = stats.total,
                exchange = %profile.exchange_value,
                instrument_type = %profile.instrument_type_value,
                sample = ?samples,
                "no records matched the source filter"
            );
            anomalies.push(Anomaly::FilterYieldedEmpty {
                source: profile.label.clone(),
                total_rows: stats.total,
            });
        } else if instruments.is_empty() {
            warn!(
                source = %profile.label,
                matched = stats.total - stats.filtered_out,
                missing_symbol = stats.missing_symbol,
                column = %profile.symbol_column,
                "every matching record had a blank trading symbol"
            );
        }

        Normalized {
            instruments,
            stats,
            anomalies,
        }
    }
}

/// Normalize with the default profile of `kind`.
pub fn normalize<I>(records: I, kind: SourceKind) -> Normalized
where
    I: IntoIterator<Item = RawRecord>,
{
    Normalizer::new(SourceProfile::for_kind(kind)).normalize(records)
}

#[derive(Debug, PartialEq, Eq)]
enum CompositeIsin {
    Present(String),
    Blank,
    Malformed,
}

fn isin_from_composite_key(key: &str) -> CompositeIsin {
    match key.split('|').nth(1) {
        Some(part) if !part.trim().is_empty() => CompositeIsin::Present(part.trim().to_string()),
        Some(_) => CompositeIsin::Blank,
        None => CompositeIsin::Malformed,
    }
}

/// ISIN component of a `SEGMENT|ISIN` key, if any.
pub fn extract_isin(instrument_key: &str) -> Option<String> {
    match isin_from_composite_key(instrument_key) {
        CompositeIsin::Present(isin) => Some(isin),
        _ => None,
    }
}

/// First whitespace-delimited token of a name.
pub fn short_name_of(name: &str) -> Option<String> {
    name.split_whitespace().next().map(str::to_string)
}

fn matches_target(value: Option<&str>, target: &str) -> bool {
    value.map(str::trim) == Some(target)
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn remember(seen: &mut BTreeSet<String>, value: Option<&str>) {
    if seen.len() >= MAX_DISTINCT_VALUES {
        return;
    }
    if let Some(value) = value {
        if !seen.contains(value) {
            seen.insert(value.to_string());
        }
    }
}
