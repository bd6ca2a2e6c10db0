use scrip_core::{route_documents, NormalizedInstrument};
use tracing::{info, warn};

use crate::{DocumentStore, SqliteInstrumentTable, StoreResult};

/// Outcome of loading one instrument set into a sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadSummary {
    pub sink: String,
    pub loaded: usize,
    /// Rows routed away because the sink cannot accept them.
    pub skipped: usize,
}

/// Common shape of the persistence targets used by the pipeline.
pub trait InstrumentSink: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, instruments: &[NormalizedInstrument]) -> StoreResult<LoadSummary>;
}

impl InstrumentSink for SqliteInstrumentTable {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn load(&self, instruments: &[NormalizedInstrument]) -> StoreResult<LoadSummary> {
        let loaded = self.replace_all(instruments)?;
        info!(table = %self.table(), rows = loaded, "replaced relational table");
        Ok(LoadSummary {
            sink: self.name().to_string(),
            loaded,
            skipped: 0,
        })
    }
}

/// Document store plus its load policy.
pub struct DocumentSink {
    store: DocumentStore,
    clear_before_load: bool,
}

impl DocumentSink {
    pub fn new(store: DocumentStore, clear_before_load: bool) -> Self {
        Self {
            store,
            clear_before_load,
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }
}

impl InstrumentSink for DocumentSink {
    fn name(&self) -> &str {
        "documents"
    }

    fn load(&self, instruments: &[NormalizedInstrument]) -> StoreResult<LoadSummary> {
        let routed = route_documents(instruments.iter().cloned());
        if !routed.unkeyed.is_empty() {
            warn!(
                collection = %self.store.collection(),
                skipped = routed.unkeyed.len(),
                "instruments without instrument_key kept out of document store"
            );
        }
        let loaded = if self.clear_before_load {
            self.store.replace_all(&routed.keyed)?
        } else {
            self.store.upsert_all(&routed.keyed)?
        };
        info!(
            collection = %self.store.collection(),
            documents = loaded,
            cleared = self.clear_before_load,
            "loaded document collection"
        );
        Ok(LoadSummary {
            sink: self.name().to_string(),
            loaded,
            skipped: routed.unkeyed.len(),
        })
    }
}
