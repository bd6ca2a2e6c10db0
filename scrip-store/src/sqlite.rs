use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use scrip_core::{is_plain_identifier, NormalizedInstrument};
use tracing::debug;

use crate::{StoreError, StoreResult};

/// One persisted row of the relational instrument table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentRow {
    pub exchange: Option<String>,
    pub instrument_key: Option<String>,
    pub symbol_name: Option<String>,
    pub security_id: Option<String>,
    pub short_name: Option<String>,
    pub name: Option<String>,
    pub isin: Option<String>,
    pub trading_symbol: String,
}

impl From<&NormalizedInstrument> for InstrumentRow {
    fn from(value: &NormalizedInstrument) -> Self {
        Self {
            exchange: Some(value.exchange.clone()),
            instrument_key: value.instrument_key.clone(),
            symbol_name: value.symbol_name.clone(),
            security_id: value.security_id.clone(),
            short_name: value.short_name.clone(),
            name: value.name.clone(),
            isin: value.isin.clone(),
            trading_symbol: value.trading_symbol.clone(),
        }
    }
}

/// Single SQLite table with replace-all-rows semantics keyed by `trading_symbol`.
#[derive(Clone, Debug)]
pub struct SqliteInstrumentTable {
    path: PathBuf,
    table: String,
}

impl SqliteInstrumentTable {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> StoreResult<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        let repo = Self {
            path: path.into(),
            table,
        };
        repo.initialize_schema()?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                exchange TEXT,
                instrument_key TEXT,
                symbol_name TEXT,
                security_id TEXT,
                short_name TEXT,
                name TEXT,
                isin TEXT,
                trading_symbol TEXT NOT NULL PRIMARY KEY
            );",
            self.table
        ))?;
        Ok(())
    }

    fn connect(&self) -> StoreResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }

    /// Drop every existing row and insert `instruments`, atomically.
    pub fn replace_all(&self, instruments: &[NormalizedInstrument]) -> StoreResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (
                    exchange, instrument_key, symbol_name, security_id, short_name, name, isin, trading_symbol
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                self.table
            ))?;
            for instrument in instruments {
                stmt.execute(params![
                    instrument.exchange,
                    instrument.instrument_key,
                    instrument.symbol_name,
                    instrument.security_id,
                    instrument.short_name,
                    instrument.name,
                    instrument.isin,
                    instrument.trading_symbol,
                ])?;
            }
        }
        tx.commit()?;
        debug!(table = %self.table, removed, inserted = instruments.len(), "replaced table rows");
        Ok(instruments.len())
    }

    pub fn count(&self) -> StoreResult<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    /// Every row, ordered by trading symbol.
    pub fn fetch_all(&self) -> StoreResult<Vec<InstrumentRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT exchange, instrument_key, symbol_name, security_id, short_name, name, isin, trading_symbol
             FROM {} ORDER BY trading_symbol ASC",
            self.table
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(InstrumentRow {
                exchange: row.get(0)?,
                instrument_key: row.get(1)?,
                symbol_name: row.get(2)?,
                security_id: row.get(3)?,
                short_name: row.get(4)?,
                name: row.get(5)?,
                isin: row.get(6)?,
                trading_symbol: row.get(7)?,
            });
        }
        Ok(out)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are accepted.
pub fn validate_identifier(name: &str) -> StoreResult<()> {
    if is_plain_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidConfig(format!(
            "table name '{name}' is not a plain identifier"
        )))
    }
}
