use crate::instrument::NormalizedInstrument;

/// Join key used to match instruments across sources.
///
/// The normalizer already canonicalizes `trading_symbol`, so this is the field verbatim.
pub fn key_of(instrument: &NormalizedInstrument) -> &str {
    &instrument.trading_symbol
}
