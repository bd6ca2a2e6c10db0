//! Persistence sinks for reconciled instrument sets.

mod documents;
mod error;
mod sink;
mod sqlite;

pub use documents::DocumentStore;
pub use error::{StoreError, StoreResult};
pub use sink::{DocumentSink, InstrumentSink, LoadSummary};
pub use sqlite::{validate_identifier, InstrumentRow, SqliteInstrumentTable};
