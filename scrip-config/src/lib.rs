//! Layered configuration for the reconciliation pipeline.
//!
//! Precedence, lowest first: built-in defaults, an optional TOML file, then
//! `SCRIP__SECTION__KEY` environment variables.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use scrip_core::{is_plain_identifier, label_stem, SourceKind, SourceProfile};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const ENV_PREFIX: &str = "SCRIP";

/// Top-level settings for one pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub report: ReportConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Preferred side when merging fields; loaded into the document store.
    pub left: SourceSettings,
    /// Loaded into the relational table.
    pub right: SourceSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceSettings {
    pub kind: SourceKind,
    /// URL or local path of the listing.
    pub location: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub columns: ColumnOverrides,
}

impl SourceSettings {
    /// Default profile for `kind` with any configured overrides applied.
    pub fn profile(&self) -> SourceProfile {
        let mut profile = SourceProfile::for_kind(self.kind);
        if let Some(label) = &self.label {
            profile.label = label.clone();
        }
        self.columns.apply(&mut profile);
        profile
    }
}

/// Optional replacements for the default column mapping of a source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ColumnOverrides {
    pub exchange_column: Option<String>,
    pub exchange_value: Option<String>,
    pub instrument_type_column: Option<String>,
    pub instrument_type_value: Option<String>,
    pub symbol_column: Option<String>,
    pub name_column: Option<String>,
    pub instrument_key_column: Option<String>,
    pub security_id_column: Option<String>,
    pub isin_from_instrument_key: Option<bool>,
    pub output_exchange: Option<String>,
}

impl ColumnOverrides {
    fn apply(&self, profile: &mut SourceProfile) {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        set(&mut profile.exchange_column, &self.exchange_column);
        set(&mut profile.exchange_value, &self.exchange_value);
        set(&mut profile.instrument_type_column, &self.instrument_type_column);
        set(&mut profile.instrument_type_value, &self.instrument_type_value);
        set(&mut profile.symbol_column, &self.symbol_column);
        set(&mut profile.name_column, &self.name_column);
        set(&mut profile.output_exchange, &self.output_exchange);
        if self.instrument_key_column.is_some() {
            profile.instrument_key_column = self.instrument_key_column.clone();
        }
        if self.security_id_column.is_some() {
            profile.security_id_column = self.security_id_column.clone();
        }
        if let Some(flag) = self.isin_from_instrument_key {
            profile.isin_from_instrument_key = flag;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub columns: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub sqlite: SqliteConfig,
    pub documents: DocumentsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub table: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentsConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub collection: String,
    #[serde(default = "default_clear_before_load")]
    pub clear_before_load: bool,
}

fn default_clear_before_load() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// When set, raw listings are copied here before normalization.
    #[serde(default)]
    pub raw_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

impl AppConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`AppConfig::load`], reading variables from `env` instead of the process.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Toml).required(true),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );
        let settings: AppConfig = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<Self> {
        Self::load_with_env(None, Some(HashMap::new()))
    }

    pub fn validate(&self) -> Result<()> {
        for (side, source) in [("left", &self.sources.left), ("right", &self.sources.right)] {
            if source.location.trim().is_empty() {
                bail!("sources.{side}.location must not be empty");
            }
            if source.profile().label.trim().is_empty() {
                bail!("sources.{side}.label must not be empty");
            }
        }
        let left_label = self.sources.left.profile().label;
        let right_label = self.sources.right.profile().label;
        if label_stem(&left_label) == label_stem(&right_label) {
            bail!(
                "source labels '{left_label}' and '{right_label}' map to the same report file name"
            );
        }
        if self.report.columns.is_empty() {
            bail!("report.columns must list at least one column");
        }
        let mut seen = Vec::with_capacity(self.report.columns.len());
        for column in &self.report.columns {
            if column.trim().is_empty() {
                bail!("report.columns contains a blank column name");
            }
            if seen.contains(&column) {
                bail!("report.columns lists '{column}' twice");
            }
            seen.push(column);
        }
        if !is_plain_identifier(&self.storage.sqlite.table) {
            bail!(
                "storage.sqlite.table '{}' must be a plain identifier",
                self.storage.sqlite.table
            );
        }
        if self.storage.documents.enabled && self.storage.documents.collection.trim().is_empty() {
            bail!("storage.documents.collection must not be empty");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be positive");
        }
        Ok(())
    }

    /// Effective settings rendered as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration as TOML")
    }
}
