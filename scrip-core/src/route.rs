use std::ops::Deref;

use serde::Serialize;

use crate::instrument::NormalizedInstrument;

/// An instrument whose `instrument_key` is known to be present and non-blank.
///
/// Only constructible through [`KeyedInstrument::try_from_instrument`], so the
/// document sink can never receive a record without a key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeyedInstrument(NormalizedInstrument);

impl KeyedInstrument {
    pub fn try_from_instrument(
        instrument: NormalizedInstrument,
    ) -> Result<Self, NormalizedInstrument> {
        match instrument.instrument_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(Self(instrument)),
            _ => Err(instrument),
        }
    }

    pub fn key(&self) -> &str {
        self.0.instrument_key.as_deref().unwrap_or_default()
    }

    pub fn into_inner(self) -> NormalizedInstrument {
        self.0
    }
}

impl Deref for KeyedInstrument {
    type Target = NormalizedInstrument;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone, Debug, Default)]
pub struct Routed {
    pub keyed: Vec<KeyedInstrument>,
    pub unkeyed: Vec<NormalizedInstrument>,
}

/// Split instruments into those eligible for the document store and the rest.
pub fn route_documents<I>(instruments: I) -> Routed
where
    I: IntoIterator<Item = NormalizedInstrument>,
{
    let mut routed = Routed::default();
    for instrument in instruments {
        match KeyedInstrument::try_from_instrument(instrument) {
            Ok(keyed) => routed.keyed.push(keyed),
            Err(unkeyed) => routed.unkeyed.push(unkeyed),
        }
    }
    routed
}
