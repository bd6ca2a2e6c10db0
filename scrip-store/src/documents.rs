use std::fs;
use std::path::{Path, PathBuf};

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use scrip_core::{KeyedInstrument, NormalizedInstrument};
use tracing::debug;

use crate::{StoreError, StoreResult};

const MAP_SIZE: usize = 256 * 1024 * 1024;
const MAX_COLLECTIONS: u32 = 16;

/// LMDB-backed document collection keyed by `instrument_key`.
///
/// Values are JSON-encoded [`NormalizedInstrument`]s.
pub struct DocumentStore {
    env: Env,
    db: Database<Str, Bytes>,
    path: PathBuf,
    collection: String,
}

impl DocumentStore {
    pub fn open(path: impl AsRef<Path>, collection: &str) -> StoreResult<Self> {
        Self::open_with_map_size(path, collection, MAP_SIZE)
    }

    fn open_with_map_size(
        path: impl AsRef<Path>,
        collection: &str,
        map_size: usize,
    ) -> StoreResult<Self> {
        if collection.trim().is_empty() {
            return Err(StoreError::InvalidConfig(
                "document collection name must not be empty".into(),
            ));
        }
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_COLLECTIONS)
                .open(&path)?
        };
        let mut wtxn = env.write_txn()?;
        let db: Database<Str, Bytes> = env.create_database(&mut wtxn, Some(collection))?;
        wtxn.commit()?;
        Ok(Self {
            env,
            db,
            path,
            collection: collection.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Insert or overwrite each document by key, in one write transaction.
    pub fn upsert_all(&self, documents: &[KeyedInstrument]) -> StoreResult<usize> {
        let mut wtxn = self.env.write_txn()?;
        for document in documents {
            let payload = serde_json::to_vec(document)?;
            self.db.put(&mut wtxn, document.key(), &payload)?;
        }
        wtxn.commit()?;
        debug!(collection = %self.collection, upserted = documents.len(), "upserted documents");
        Ok(documents.len())
    }

    /// Empty the collection and write `documents`, in one write transaction.
    ///
    /// On failure the previous contents stay in place.
    pub fn replace_all(&self, documents: &[KeyedInstrument]) -> StoreResult<usize> {
        let mut wtxn = self.env.write_txn()?;
        self.db.clear(&mut wtxn)?;
        for document in documents {
            let payload = serde_json::to_vec(document)?;
            self.db.put(&mut wtxn, document.key(), &payload)?;
        }
        wtxn.commit()?;
        debug!(collection = %self.collection, documents = documents.len(), "replaced collection");
        Ok(documents.len())
    }

    /// Remove every document from the collection.
    pub fn clear(&self) -> StoreResult<()> {
        let mut wtxn = self.env.write_txn()?;
        self.db.clear(&mut wtxn)?;
        wtxn.commit()?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<NormalizedInstrument>> {
        let rtxn = self.env.read_txn()?;
        match self.db.get(&rtxn, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> StoreResult<usize> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.len(&rtxn)? as usize)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrip_core::SourceKind;
    use tempfile::tempdir;

    fn keyed(symbol: &str, key: &str, name: &str) -> KeyedInstrument {
        KeyedInstrument::try_from_instrument(NormalizedInstrument {
            exchange: "NSE".into(),
            trading_symbol: symbol.into(),
            instrument_key: Some(key.into()),
            symbol_name: Some(name.into()),
            security_id: None,
            short_name: name.split_whitespace().next().map(str::to_string),
            name: Some(name.into()),
            isin: key.split('|').nth(1).map(str::to_string),
            source: SourceKind::Upstox,
        })
        .unwrap()
    }

    #[test]
    fn upsert_overwrites_by_key() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("docs"), "upstox_stocks").unwrap();
        store
            .upsert_all(&[
                keyed("TCS", "NSE_EQ|INE467B01029", "Tata Consultancy"),
                keyed("INFY", "NSE_EQ|INE009A01021", "Infosys"),
            ])
            .unwrap();
        store
            .upsert_all(&[keyed("TCS", "NSE_EQ|INE467B01029", "Tata Consultancy Services")])
            .unwrap();

        assert_eq!(store.len().unwrap(), 2);
        let tcs = store.get("NSE_EQ|INE467B01029").unwrap().unwrap();
        assert_eq!(tcs.name.as_deref(), Some("Tata Consultancy Services"));
        assert_eq!(tcs.isin.as_deref(), Some("INE467B01029"));
        assert!(store.get("NSE_EQ|MISSING").unwrap().is_none());
    }

    #[test]
    fn clear_empties_collection_and_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = DocumentStore::open(dir.path(), "stocks").unwrap();
            store.upsert_all(&[keyed("A", "NSE_EQ|A1", "A")]).unwrap();
        }
        let store = DocumentStore::open(dir.path(), "stocks").unwrap();
        assert_eq!(store.len().unwrap(), 1);
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn replace_all_drops_stale_documents() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path(), "stocks").unwrap();
        store
            .upsert_all(&[keyed("OLD", "NSE_EQ|OLD", "Old"), keyed("TCS", "NSE_EQ|TCS", "Tata")])
            .unwrap();
        let written = store
            .replace_all(&[keyed("TCS", "NSE_EQ|TCS", "Tata Consultancy")])
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get("NSE_EQ|OLD").unwrap().is_none());
    }

    #[test]
    fn failed_replace_keeps_previous_documents() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open_with_map_size(dir.path(), "stocks", 1024 * 1024).unwrap();
        store.upsert_all(&[keyed("KEEP", "NSE_EQ|KEEP", "Keep")]).unwrap();

        let bulky = "x".repeat(4096);
        let oversized: Vec<_> = (0..1024)
            .map(|i| keyed(&format!("S{i}"), &format!("NSE_EQ|S{i}"), &bulky))
            .collect();
        let err = store.replace_all(&oversized).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));

        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get("NSE_EQ|KEEP").unwrap().is_some());
    }

    #[test]
    fn blank_collection_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            DocumentStore::open(dir.path(), " "),
            Err(StoreError::InvalidConfig(_))
        ));
    }
}
