use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::anomaly::Anomaly;
use crate::instrument::NormalizedInstrument;
use crate::key::key_of;

/// A symbol that appeared more than once within one source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateCollision {
    pub trading_symbol: String,
    pub kept: NormalizedInstrument,
    pub discarded: Vec<NormalizedInstrument>,
}

impl DuplicateCollision {
    fn to_anomaly(&self, source: &str) -> Anomaly {
        Anomaly::DuplicateKeyCollision {
            source: source.to_string(),
            trading_symbol: self.trading_symbol.clone(),
            kept: self.kept.describe(),
            discarded: self.discarded.iter().map(|i| i.describe()).collect(),
        }
    }
}

/// Deduplicated instruments plus every collision that was resolved.
#[derive(Clone, Debug)]
pub struct Deduplicated {
    pub instruments: Vec<NormalizedInstrument>,
    pub collisions: Vec<DuplicateCollision>,
}

impl Deduplicated {
    pub fn anomalies(&self, source: &str) -> Vec<Anomaly> {
        self.collisions
            .iter()
            .map(|collision| collision.to_anomaly(source))
            .collect()
    }

    pub fn discarded_count(&self) -> usize {
        self.collisions.iter().map(|c| c.discarded.len()).sum()
    }
}

/// Keep the first record per join key in input order; report the rest.
pub fn dedupe(instruments: Vec<NormalizedInstrument>, source: &str) -> Deduplicated {
    let input_len = instruments.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(input_len);
    let mut kept = Vec::with_capacity(input_len);
    let mut discarded: Vec<NormalizedInstrument> = Vec::new();

    for instrument in instruments {
        if seen.insert(key_of(&instrument).to_string()) {
            kept.push(instrument);
        } else {
            discarded.push(instrument);
        }
    }

    let collisions = group_collisions(&kept, discarded);
    for collision in &collisions {
        let discarded: Vec<String> = collision.discarded.iter().map(|i| i.describe()).collect();
        warn!(
            source = %source,
            symbol = %collision.trading_symbol,
            kept = %collision.kept.describe(),
            discarded = ?discarded,
            "duplicate trading symbol, keeping first occurrence"
        );
    }
    if !collisions.is_empty() {
        info!(
            source = %source,
            before = input_len,
            after = kept.len(),
            symbols = collisions.len(),
            "removed duplicate trading symbols"
        );
    }

    Deduplicated {
        instruments: kept,
        collisions,
    }
}

/// Group discarded records under the kept record for their symbol, ordered by first occurrence.
fn group_collisions(
    kept: &[NormalizedInstrument],
    discarded: Vec<NormalizedInstrument>,
) -> Vec<DuplicateCollision> {
    if discarded.is_empty() {
        return Vec::new();
    }
    let mut by_symbol: HashMap<String, Vec<NormalizedInstrument>> = HashMap::new();
    for instrument in discarded {
        by_symbol
            .entry(key_of(&instrument).to_string())
            .or_default()
            .push(instrument);
    }
    kept.iter()
        .filter_map(|first| {
            by_symbol
                .remove(key_of(first))
                .map(|discarded| DuplicateCollision {
                    trading_symbol: key_of(first).to_string(),
                    kept: first.clone(),
                    discarded,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::SourceKind;

    fn instrument(symbol: &str, name: &str, key: &str) -> NormalizedInstrument {
        NormalizedInstrument {
            exchange: "NSE".into(),
            trading_symbol: symbol.into(),
            instrument_key: Some(key.into()),
            symbol_name: Some(name.into()),
            security_id: None,
            short_name: name.split_whitespace().next().map(str::to_string),
            name: Some(name.into()),
            isin: None,
            source: SourceKind::Upstox,
        }
    }

    #[test]
    fn keeps_first_occurrence() {
        let input = vec![
            instrument("TCS", "Tata Consultancy Services", "NSE_EQ|INE123456789"),
            instrument("INFY", "Infosys Limited", "NSE_EQ|INE987654321"),
            instrument("TCS", "Tata Consultancy Services", "NSE_EQ|INE222222222"),
        ];
        let out = dedupe(input, "upstox");
        assert_eq!(out.instruments.len(), 2);
        assert_eq!(
            out.instruments[0].instrument_key.as_deref(),
            Some("NSE_EQ|INE123456789")
        );
        assert_eq!(out.collisions.len(), 1);
        let collision = &out.collisions[0];
        assert_eq!(collision.trading_symbol, "TCS");
        assert_eq!(collision.discarded.len(), 1);
        assert_eq!(
            collision.discarded[0].instrument_key.as_deref(),
            Some("NSE_EQ|INE222222222")
        );
        let anomalies = out.anomalies("upstox");
        assert_eq!(
            anomalies,
            vec![Anomaly::DuplicateKeyCollision {
                source: "upstox".into(),
                trading_symbol: "TCS".into(),
                kept: "Tata Consultancy Services (NSE_EQ|INE123456789)".into(),
                discarded: vec!["Tata Consultancy Services (NSE_EQ|INE222222222)".into()],
            }]
        );
    }

    #[test]
    fn output_symbols_are_unique() {
        let input = vec![
            instrument("A", "a", "k1"),
            instrument("B", "b", "k2"),
            instrument("A", "a", "k3"),
            instrument("C", "c", "k4"),
            instrument("B", "b", "k5"),
            instrument("A", "a", "k6"),
        ];
        let out = dedupe(input, "test");
        let symbols: Vec<_> = out.instruments.iter().map(|i| i.trading_symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B", "C"]);
        assert_eq!(out.discarded_count(), 3);
        assert_eq!(out.collisions[0].trading_symbol, "A");
        assert_eq!(out.collisions[0].discarded.len(), 2);
        assert_eq!(out.collisions[1].trading_symbol, "B");
    }

    #[test]
    fn clean_input_has_no_collisions() {
        let out = dedupe(vec![instrument("X", "x", "k")], "test");
        assert!(out.collisions.is_empty());
        assert!(out.anomalies("test").is_empty());
    }
}
