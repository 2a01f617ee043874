use crate::error::StoreError;
use coexpress_core::staging::parse_staging_line;
use coexpress_core::{BulkLoader, CoexprResult, CorrelationLookup, LoadReport, ProvenanceResolver};
use coexpress_types::{CorrelationRecord, GenePairKey, Provenance, ProvenanceId, ProvenanceSpec};
use rusqlite::{Connection, OptionalExtension, Statement, params};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, instrument};

const SCHEMA: &str = "
    PRAGMA foreign_keys=ON;
    CREATE TABLE IF NOT EXISTS provenance (
      id INTEGER PRIMARY KEY,
      name TEXT NOT NULL,
      url TEXT,
      category TEXT,
      subcategory TEXT,
      UNIQUE (name, url, category, subcategory)
    );
    CREATE TABLE IF NOT EXISTS gene_pair_correlation (
      id INTEGER PRIMARY KEY,
      gene_1 TEXT NOT NULL,
      gene_2 TEXT NOT NULL,
      correlation_value REAL NOT NULL,
      provenance_id INTEGER NOT NULL REFERENCES provenance(id),
      CHECK (gene_1 <= gene_2)
    );
    CREATE INDEX IF NOT EXISTS idx_gene_pair ON gene_pair_correlation (gene_1, gene_2);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_gene_pair_provenance
      ON gene_pair_correlation (gene_1, gene_2, provenance_id);
";

const INSERT_CORRELATION: &str = "INSERT INTO gene_pair_correlation \
     (gene_1, gene_2, correlation_value, provenance_id) VALUES (?1, ?2, ?3, ?4)";

/// Records committed per transaction by [`SqliteCorrelationStore::add_records`].
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// The unique-index conflict a retried load produces. Nothing else counts as a duplicate.
fn is_duplicate_pair(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(message)) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && message.contains("gene_pair_correlation.gene_1")
        }
        _ => false,
    }
}

/// Insert one record. `Ok(false)` if the pair already has a value under the provenance.
fn insert_record(stmt: &mut Statement<'_>, record: &CorrelationRecord) -> Result<bool, StoreError> {
    match stmt.execute(params![record.gene1, record.gene2, record.value, record.provenance_id]) {
        Ok(_) => Ok(true),
        Err(e) if is_duplicate_pair(&e) => {
            debug!(
                gene1 = %record.gene1,
                gene2 = %record.gene2,
                provenance_id = record.provenance_id,
                "Duplicate gene pair ignored"
            );
            Ok(false)
        }
        Err(e) => Err(StoreError::sqlite("insert correlation")(e)),
    }
}

pub struct SqliteCorrelationStore {
    conn: Connection,
}

impl SqliteCorrelationStore {
    pub fn open(path: &Path) -> CoexprResult<Self> {
        let conn = Connection::open(path).map_err(StoreError::sqlite("open database"))?;
        info!(path = %path.display(), "Opened correlation store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> CoexprResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::sqlite("open database"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> CoexprResult<Self> {
        conn.execute_batch(SCHEMA).map_err(StoreError::sqlite("create schema"))?;
        Ok(Self { conn })
    }

    pub fn record_count(&self) -> CoexprResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM gene_pair_correlation", [], |row| row.get(0))
            .map_err(StoreError::sqlite("count records"))?;
        Ok(count as u64)
    }

    /// Insert `records`, committing every `batch_size` of them.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub fn add_records(
        &mut self,
        records: &[CorrelationRecord],
        batch_size: usize,
    ) -> CoexprResult<LoadReport> {
        let mut report = LoadReport::default();
        for batch in records.chunks(batch_size.max(1)) {
            let tx = self.conn.transaction().map_err(StoreError::sqlite("begin batch"))?;
            {
                let mut stmt =
                    tx.prepare_cached(INSERT_CORRELATION).map_err(StoreError::sqlite("prepare insert"))?;
                for record in batch {
                    if insert_record(&mut stmt, record)? {
                        report.rows_loaded += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
            }
            tx.commit().map_err(StoreError::sqlite("commit batch"))?;
        }
        if report.duplicates > 0 {
            info!(duplicates = report.duplicates, "Skipped gene pairs already stored");
        }
        Ok(report)
    }

    fn load_lines(&mut self, path: &Path) -> CoexprResult<LoadReport> {
        let reader = BufReader::new(File::open(path).map_err(StoreError::staging(path))?);
        let tx = self.conn.transaction().map_err(StoreError::sqlite("begin load"))?;
        tx.execute_batch("PRAGMA defer_foreign_keys=ON;").map_err(StoreError::sqlite("defer foreign keys"))?;
        let mut report = LoadReport::default();
        {
            let mut stmt = tx.prepare_cached(INSERT_CORRELATION).map_err(StoreError::sqlite("prepare insert"))?;
            for (i, line) in reader.lines().enumerate() {
                let line = line.map_err(StoreError::staging(path))?;
                if line.is_empty() {
                    continue;
                }
                let record = parse_staging_line(&line, i as u64 + 1)?;
                if insert_record(&mut stmt, &record)? {
                    report.rows_loaded += 1;
                } else {
                    report.duplicates += 1;
                }
            }
        }
        // dropping an uncommitted transaction rolls it back
        tx.commit().map_err(StoreError::sqlite("commit load"))?;
        Ok(report)
    }
}

impl ProvenanceResolver for SqliteCorrelationStore {
    fn resolve_or_create(&mut self, spec: &ProvenanceSpec) -> CoexprResult<Provenance> {
        let existing: Option<ProvenanceId> = self
            .conn
            .query_row(
                "SELECT id FROM provenance \
                 WHERE name = ?1 AND url IS ?2 AND category IS ?3 AND subcategory IS ?4",
                params![spec.name, spec.url, spec.category, spec.subcategory],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::sqlite("find provenance"))?;
        let id = match existing {
            Some(id) => id,
            None => {
                self.conn
                    .execute(
                        "INSERT INTO provenance (name, url, category, subcategory) VALUES (?1, ?2, ?3, ?4)",
                        params![spec.name, spec.url, spec.category, spec.subcategory],
                    )
                    .map_err(StoreError::sqlite("create provenance"))?;
                let id = self.conn.last_insert_rowid();
                info!(id, name = %spec.name, "Created provenance");
                id
            }
        };
        Ok(Provenance { id, spec: spec.clone() })
    }
}

impl BulkLoader for SqliteCorrelationStore {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn load_staging_file(&mut self, path: &Path) -> CoexprResult<LoadReport> {
        let previous: i64 = self
            .conn
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .map_err(StoreError::sqlite("read synchronous"))?;
        self.conn.execute_batch("PRAGMA synchronous=OFF;").map_err(StoreError::sqlite("relax synchronous"))?;

        let loaded = self.load_lines(path);

        self.conn
            .execute_batch(&format!("PRAGMA synchronous={previous};"))
            .map_err(StoreError::sqlite("restore synchronous"))?;
        let report = loaded?;
        info!(
            rows_loaded = report.rows_loaded,
            duplicates = report.duplicates,
            "Loaded staging file"
        );
        Ok(report)
    }
}

impl CorrelationLookup for SqliteCorrelationStore {
    fn correlations(&self, gene1: &str, gene2: &str) -> CoexprResult<Vec<(Provenance, f64)>> {
        let key = GenePairKey::new(gene1, gene2);
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT p.id, p.name, p.url, p.category, p.subcategory, c.correlation_value \
                 FROM gene_pair_correlation c JOIN provenance p ON p.id = c.provenance_id \
                 WHERE c.gene_1 = ?1 AND c.gene_2 = ?2 ORDER BY p.id",
            )
            .map_err(StoreError::sqlite("prepare lookup"))?;
        let rows = stmt
            .query_map(params![key.first(), key.second()], |row| {
                let spec = ProvenanceSpec {
                    name: row.get(1)?,
                    url: row.get(2)?,
                    category: row.get(3)?,
                    subcategory: row.get(4)?,
                };
                Ok((Provenance { id: row.get(0)?, spec }, row.get(5)?))
            })
            .map_err(StoreError::sqlite("lookup correlations"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::sqlite("lookup correlations"))?;
        Ok(rows)
    }

    fn correlation(
        &self,
        gene1: &str,
        gene2: &str,
        provenance_id: ProvenanceId,
    ) -> CoexprResult<Option<f64>> {
        let key = GenePairKey::new(gene1, gene2);
        let value = self
            .conn
            .query_row(
                "SELECT correlation_value FROM gene_pair_correlation \
                 WHERE gene_1 = ?1 AND gene_2 = ?2 AND provenance_id = ?3",
                params![key.first(), key.second(), provenance_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::sqlite("lookup correlation"))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_is_created_once() {
        let mut store = SqliteCorrelationStore::open_in_memory().unwrap();
        let a = store.resolve_or_create(&ProvenanceSpec::archs4()).unwrap();
        let b = store.resolve_or_create(&ProvenanceSpec::archs4()).unwrap();
        let other = store.resolve_or_create(&ProvenanceSpec::new("ARCHS4")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn test_add_records_counts_duplicates() {
        let mut store = SqliteCorrelationStore::open_in_memory().unwrap();
        let p = store.resolve_or_create(&ProvenanceSpec::new("test")).unwrap();
        let records = vec![
            CorrelationRecord::new("B", "A", 0.5, p.id),
            CorrelationRecord::new("A", "C", 0.1, p.id),
            CorrelationRecord::new("A", "B", 0.9, p.id),
        ];
        let report = store.add_records(&records, 2).unwrap();
        assert_eq!(report, LoadReport { rows_loaded: 2, duplicates: 1 });
        assert_eq!(store.correlation("B", "A", p.id).unwrap(), Some(0.5));
    }

    #[test]
    fn test_other_constraint_failures_are_fatal() {
        let mut store = SqliteCorrelationStore::open_in_memory().unwrap();
        // provenance 42 does not exist
        let err = store.add_records(&[CorrelationRecord::new("A", "B", 0.5, 42)], 10).unwrap_err();
        assert_eq!(err.category(), "store");
        assert_eq!(store.record_count().unwrap(), 0);
    }
}
