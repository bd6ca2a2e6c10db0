use serde::{Deserialize, Serialize};

use crate::instrument::SourceKind;

/// Declarative mapping from a provider's native columns to the canonical shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub kind: SourceKind,
    /// Label used in logs and report file names.
    pub label: String,
    pub exchange_column: String,
    pub exchange_value: String,
    pub instrument_type_column: String,
    pub instrument_type_value: String,
    pub symbol_column: String,
    pub name_column: String,
    #[serde(default)]
    pub instrument_key_column: Option<String>,
    #[serde(default)]
    pub security_id_column: Option<String>,
    /// Take the ISIN from the second `|` component of the instrument key.
    #[serde(default)]
    pub isin_from_instrument_key: bool,
    /// Exchange label stamped on every normalized record.
    pub output_exchange: String,
}

impl SourceProfile {
    /// Default profile for the provider kind.
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Upstox => Self::upstox(),
            SourceKind::Dhan => Self::dhan(),
        }
    }

    pub fn upstox() -> Self {
        Self {
            kind: SourceKind::Upstox,
            label: "upstox".to_string(),
            exchange_column: "exchange".to_string(),
            exchange_value: "NSE_EQ".to_string(),
            instrument_type_column: "instrument_type".to_string(),
            instrument_type_value: "EQUITY".to_string(),
            symbol_column: "tradingsymbol".to_string(),
            name_column: "name".to_string(),
            instrument_key_column: Some("instrument_key".to_string()),
            security_id_column: None,
            isin_from_instrument_key: true,
            output_exchange: "NSE".to_string(),
        }
    }

    pub fn dhan() -> Self {
        Self {
            kind: SourceKind::Dhan,
            label: "dhan".to_string(),
            exchange_column: "SEM_EXM_EXCH_ID".to_string(),
            exchange_value: "NSE".to_string(),
            instrument_type_column: "SEM_INSTRUMENT_NAME".to_string(),
            instrument_type_value: "EQUITY".to_string(),
            symbol_column: "SEM_TRADING_SYMBOL".to_string(),
            name_column: "SM_SYMBOL_NAME".to_string(),
            instrument_key_column: None,
            security_id_column: Some("SEM_SMST_SECURITY_ID".to_string()),
            isin_from_instrument_key: false,
            output_exchange: "NSE".to_string(),
        }
    }
}
