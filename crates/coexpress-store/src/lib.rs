//! SQLite correlation store
//!
//! Implements the three store contracts of `coexpress-core` over one SQLite database:
//! provenance resolution, transactional staging-file loads, and gene-pair lookup. The
//! unique index on `(gene_1, gene_2, provenance_id)` is what makes a retried ingestion
//! harmless; its conflicts are counted as duplicates while every other failure aborts the
//! load.

mod error;
mod sqlite;

pub use error::StoreError;
pub use sqlite::{DEFAULT_BATCH_SIZE, SqliteCorrelationStore};
