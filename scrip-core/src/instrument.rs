use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Column order shared by every report artifact and the relational sink.
pub const DEFAULT_OUTPUT_COLUMNS: [&str; 8] = [
    "exchange",
    "instrument_key",
    "symbol_name",
    "security_id",
    "short_name",
    "name",
    "isin",
    "trading_symbol",
];

/// Provider that supplied a listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Compressed instrument master keyed by `SEGMENT|ISIN` composite keys.
    Upstox,
    /// Scrip master CSV keyed by numeric security identifiers.
    Dhan,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Upstox => "upstox",
            SourceKind::Dhan => "dhan",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upstox" => Ok(SourceKind::Upstox),
            "dhan" => Ok(SourceKind::Dhan),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// Cell value as delivered by a provider.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl RawValue {
    /// Textual form of the value; blank text counts as absent.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Text(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(value.clone())
                }
            }
            RawValue::Integer(value) => Some(value.to_string()),
            RawValue::Float(value) if value.is_nan() => None,
            RawValue::Float(value) => {
                if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                    Some((*value as i64).to_string())
                } else {
                    Some(value.to_string())
                }
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Integer(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

/// One row of a provider listing, keyed by the provider's own column names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRecord {
    fields: HashMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used by tests and decoders.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.fields.get(field)
    }

    /// Text of a field, `None` when the field is missing or blank.
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(RawValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = RawRecord::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

/// Canonical instrument shape every provider is mapped into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedInstrument {
    pub exchange: String,
    /// Join key: trimmed and upper-cased native symbol.
    pub trading_symbol: String,
    pub instrument_key: Option<String>,
    pub symbol_name: Option<String>,
    pub security_id: Option<String>,
    pub short_name: Option<String>,
    pub name: Option<String>,
    pub isin: Option<String>,
    pub source: SourceKind,
}

impl NormalizedInstrument {
    /// Look up an output column by name. Unknown columns resolve to `None`.
    pub fn field(&self, column: &str) -> Option<&str> {
        match column {
            "exchange" => Some(self.exchange.as_str()),
            "trading_symbol" => Some(self.trading_symbol.as_str()),
            "instrument_key" => self.instrument_key.as_deref(),
            "symbol_name" => self.symbol_name.as_deref(),
            "security_id" => self.security_id.as_deref(),
            "short_name" => self.short_name.as_deref(),
            "name" => self.name.as_deref(),
            "isin" => self.isin.as_deref(),
            "source" => Some(self.source.as_str()),
            _ => None,
        }
    }

    /// Short human label used in duplicate diagnostics.
    pub fn describe(&self) -> String {
        let name = self
            .name
            .as_deref()
            .or(self.symbol_name.as_deref())
            .unwrap_or("<unnamed>");
        match self
            .instrument_key
            .as_deref()
            .or(self.security_id.as_deref())
        {
            Some(id) => format!("{name} ({id})"),
            None => name.to_string(),
        }
    }
}

/// Canonical join-key normalization: trim, then upper-case.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}
