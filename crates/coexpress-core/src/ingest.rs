//! Chunked correlation-matrix ingestion
//!
//! Streams a delimited gene x gene correlation matrix into the store without holding more
//! than one staging file's worth of records anywhere:
//!
//! ```text
//!   matrix rows ──► canonical pair ──► staging file ──(chunk_size lines)──► BulkLoader
//!                                           │                                   │
//!                                           └── renamed <staging>_<n> ◄─────────┘
//! ```
//!
//! The provenance is resolved once, before the first data row, and its id is written on
//! every staged line. Each full chunk is flushed, loaded, renamed with the next counter and
//! replaced by a fresh staging file, so an interrupted run leaves its completed chunks
//! behind as separate numbered files. Loading is synchronous; the next chunk is not written
//! while the previous one is loading.
//!
//! A data row whose column count disagrees with the header aborts the run with the row and
//! column reported. The staging writer is closed on the way out.

use crate::config::{IngestConfig, TriangleMode};
use crate::error::{CoexprError, CoexprResult};
use crate::staging::{StagingWriter, chunk_path};
use crate::store::{BulkLoader, LoadReport, ProvenanceResolver};
use coexpress_types::{GenePairKey, KEY_SEPARATOR, Provenance, ProvenanceSpec};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Totals for one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub provenance: Provenance,
    pub data_rows: u64,
    pub records_staged: u64,
    /// Empty or `NA` cells.
    pub skipped_cells: u64,
    pub load: LoadReport,
    /// Completed chunk files, in load order.
    pub chunk_files: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// Gene identifier from a (possibly quoted) cell.
pub fn clean_symbol(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

pub(crate) enum Cell {
    Value(f64),
    Missing,
    Invalid,
}

pub(crate) fn parse_cell(raw: &str) -> Cell {
    let text = raw.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("na") || text.eq_ignore_ascii_case("nan") {
        return Cell::Missing;
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Value(v),
        _ => Cell::Invalid,
    }
}

/// Symbols end up single-quoted and tab-separated in staging files, and joined by
/// [`KEY_SEPARATOR`] in rendered pair keys.
fn valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty() && !symbol.contains(['\t', '\n', '\r', '\'', KEY_SEPARATOR])
}

pub(crate) fn matrix_reader<R: Read>(input: R, config: &IngestConfig) -> CoexprResult<csv::Reader<R>> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(config.delimiter_byte()?)
        .has_headers(false)
        .flexible(true)
        .from_reader(input))
}

/// Consume the header rows and return the identifiers of the value columns.
pub(crate) fn read_column_genes<R: Read>(
    records: &mut csv::StringRecordsIter<'_, R>,
    config: &IngestConfig,
) -> CoexprResult<Vec<String>> {
    let mut column_genes = Vec::new();
    for header_row in 0..config.header_rows {
        let record = records.next().ok_or_else(|| {
            CoexprError::malformed_row(header_row as u64 + 1, 0, "file ends inside the header")
        })??;
        if header_row == config.header_key_row {
            column_genes = record
                .iter()
                .skip(config.header_columns)
                .map(|s| clean_symbol(s).to_string())
                .collect();
        }
    }
    if let Some(column) = column_genes.iter().position(|g| !valid_symbol(g)) {
        return Err(CoexprError::malformed_row(
            config.header_key_row as u64 + 1,
            config.header_columns + column,
            format!("unusable gene identifier '{}'", column_genes[column]),
        ));
    }
    Ok(column_genes)
}

#[derive(Debug, Clone)]
pub struct MatrixIngestor {
    config: IngestConfig,
}

impl MatrixIngestor {
    pub fn new(config: IngestConfig) -> CoexprResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest the matrix file at `path`.
    pub fn ingest_file<S>(
        &self,
        path: &Path,
        provenance: &ProvenanceSpec,
        store: &mut S,
    ) -> CoexprResult<IngestReport>
    where
        S: ProvenanceResolver + BulkLoader,
    {
        info!(path = %path.display(), "Ingesting correlation matrix");
        let file = File::open(path)?;
        self.ingest(BufReader::new(file), provenance, store)
    }

    /// Ingest a matrix from any byte stream.
    #[instrument(skip(self, input, store), fields(provenance = %provenance.name))]
    pub fn ingest<R, S>(
        &self,
        input: R,
        provenance: &ProvenanceSpec,
        store: &mut S,
    ) -> CoexprResult<IngestReport>
    where
        R: Read,
        S: ProvenanceResolver + BulkLoader,
    {
        let started = Instant::now();
        let config = &self.config;
        let mut reader = matrix_reader(input, config)?;
        let mut records = reader.records();
        let column_genes = read_column_genes(&mut records, config)?;
        debug!(genes = column_genes.len(), "Read matrix header");

        let provenance = store.resolve_or_create(provenance)?;
        info!(provenance_id = provenance.id, "Resolved provenance");

        let expected_columns = config.header_columns + column_genes.len();
        let progress_interval = config.progress_interval.max(1);
        let mut staging = StagingWriter::create(&config.staging_path)?;
        let mut load = LoadReport::default();
        let mut chunk_files = Vec::new();
        let (mut data_rows, mut staged, mut skipped_cells) = (0u64, 0u64, 0u64);

        for (row_index, record) in records.enumerate() {
            let record = record?;
            let line = record
                .position()
                .map_or((config.header_rows + row_index + 1) as u64, |p| p.line());
            if record.len() != expected_columns {
                return Err(CoexprError::malformed_row(
                    line,
                    record.len().min(expected_columns),
                    format!("expected {expected_columns} columns, found {}", record.len()),
                ));
            }
            let row_gene = clean_symbol(&record[config.row_key_column]);
            if !valid_symbol(row_gene) {
                return Err(CoexprError::malformed_row(
                    line,
                    config.row_key_column,
                    format!("unusable gene identifier '{row_gene}'"),
                ));
            }

            let first_value = match config.triangle {
                TriangleMode::Upper => {
                    // skipping the lower triangle is only sound when row i is column i
                    if column_genes.get(row_index).map(String::as_str) != Some(row_gene) {
                        return Err(CoexprError::malformed_row(
                            line,
                            config.header_columns + row_index,
                            format!(
                                "row gene '{row_gene}' is not header gene {} of a square matrix; use full triangle mode",
                                row_index + 1
                            ),
                        ));
                    }
                    row_index
                }
                TriangleMode::Full => 0,
            };
            for (offset, raw) in record.iter().skip(config.header_columns).enumerate().skip(first_value) {
                let column = config.header_columns + offset;
                let column_gene = column_genes.get(offset).ok_or_else(|| {
                    CoexprError::malformed_row(line, column, "value column has no header gene")
                })?;
                let value = match parse_cell(raw) {
                    Cell::Value(v) => v,
                    Cell::Missing => {
                        skipped_cells += 1;
                        continue;
                    }
                    Cell::Invalid => {
                        return Err(CoexprError::malformed_row(
                            line,
                            column,
                            format!("'{raw}' is not a correlation value"),
                        ));
                    }
                };

                staging.write_record(&GenePairKey::new(row_gene, column_gene.as_str()), value, provenance.id)?;
                staged += 1;
                if staged % progress_interval == 0 {
                    info!(records = staged, rows = data_rows, "Staged correlation records");
                }
                if staging.lines() >= config.chunk_size {
                    let (chunk, report) =
                        self.load_chunk(staging, store, chunk_files.len() as u64)?;
                    load.merge(report);
                    chunk_files.push(chunk);
                    staging = StagingWriter::create(&config.staging_path)?;
                }
            }
            data_rows += 1;
        }

        if staging.lines() > 0 {
            let (chunk, report) = self.load_chunk(staging, store, chunk_files.len() as u64)?;
            load.merge(report);
            chunk_files.push(chunk);
        } else {
            let (empty, _) = staging.finish()?;
            fs::remove_file(&empty)?;
        }

        let report = IngestReport {
            provenance,
            data_rows,
            records_staged: staged,
            skipped_cells,
            load,
            chunk_files,
            elapsed: started.elapsed(),
        };
        info!(
            data_rows = report.data_rows,
            records = report.records_staged,
            loaded = report.load.rows_loaded,
            duplicates = report.load.duplicates,
            chunks = report.chunk_files.len(),
            duration_ms = report.elapsed.as_millis() as u64,
            "Finished correlation matrix ingestion"
        );
        Ok(report)
    }

    /// Flush `staging`, hand it to the loader and rename it to its chunk name.
    fn load_chunk<S: BulkLoader>(
        &self,
        staging: StagingWriter,
        store: &mut S,
        chunk: u64,
    ) -> CoexprResult<(PathBuf, LoadReport)> {
        let (path, lines) = staging.finish()?;
        let report = store.load_staging_file(&path)?;
        let renamed = chunk_path(&path, chunk);
        fs::rename(&path, &renamed)?;
        info!(
            chunk,
            lines,
            loaded = report.rows_loaded,
            duplicates = report.duplicates,
            file = %renamed.display(),
            "Loaded staging chunk"
        );
        Ok((renamed, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::parse_staging_line;
    use coexpress_types::CorrelationRecord;

    /// Records everything it is handed.
    #[derive(Default)]
    struct RecordingStore {
        resolved: Vec<ProvenanceSpec>,
        chunks: Vec<Vec<CorrelationRecord>>,
    }

    impl ProvenanceResolver for RecordingStore {
        fn resolve_or_create(&mut self, spec: &ProvenanceSpec) -> CoexprResult<Provenance> {
            self.resolved.push(spec.clone());
            Ok(Provenance { id: 9, spec: spec.clone() })
        }
    }

    impl BulkLoader for RecordingStore {
        fn load_staging_file(&mut self, path: &Path) -> CoexprResult<LoadReport> {
            let text = fs::read_to_string(path)?;
            let records = text
                .lines()
                .enumerate()
                .map(|(i, l)| parse_staging_line(l, i as u64 + 1))
                .collect::<CoexprResult<Vec<_>>>()?;
            let rows_loaded = records.len() as u64;
            self.chunks.push(records);
            Ok(LoadReport { rows_loaded, duplicates: 0 })
        }
    }

    const SQUARE: &str = "\"\",\"A1BG\",\"A1CF\",\"A2M\"\n\
                          \"A1BG\",1,0.5,-0.25\n\
                          \"A1CF\",0.5,1,0.75\n\
                          \"A2M\",-0.25,0.75,1\n";

    fn ingestor(dir: &Path, chunk_size: u64) -> MatrixIngestor {
        MatrixIngestor::new(IngestConfig::archs4().with_staging_path(dir.join("stage")).with_chunk_size(chunk_size))
            .unwrap()
    }

    #[test]
    fn test_upper_triangle_stages_each_pair_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let report = ingestor(dir.path(), 100)
            .ingest(SQUARE.as_bytes(), &ProvenanceSpec::archs4(), &mut store)
            .unwrap();
        assert_eq!(report.records_staged, 6);
        assert_eq!(report.data_rows, 3);
        assert_eq!(store.resolved.len(), 1);
        let records: Vec<_> = store.chunks.concat();
        assert!(records.contains(&CorrelationRecord::new("A1CF", "A2M", 0.75, 9)));
        assert!(records.iter().all(|r| r.gene1 <= r.gene2 && r.provenance_id == 9));
        assert_eq!(report.chunk_files, vec![dir.path().join("stage_0")]);
        assert!(!dir.path().join("stage").exists());
    }

    #[test]
    fn test_chunks_rotate_with_increasing_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let report = ingestor(dir.path(), 4)
            .ingest(SQUARE.as_bytes(), &ProvenanceSpec::archs4(), &mut store)
            .unwrap();
        assert_eq!(store.chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 2]);
        assert_eq!(report.load.rows_loaded, 6);
        assert!(dir.path().join("stage_0").exists());
        assert!(dir.path().join("stage_1").exists());
    }

    #[test]
    fn test_exact_multiple_leaves_no_residual_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let report = ingestor(dir.path(), 3)
            .ingest(SQUARE.as_bytes(), &ProvenanceSpec::archs4(), &mut store)
            .unwrap();
        assert_eq!(report.chunk_files.len(), 2);
        assert!(!dir.path().join("stage").exists());
    }

    #[test]
    fn test_short_row_is_fatal_with_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let input = "\"\",\"A\",\"B\"\n\"A\",1,0.5\n\"B\",0.5\n";
        let err = ingestor(dir.path(), 100)
            .ingest(input.as_bytes(), &ProvenanceSpec::archs4(), &mut store)
            .unwrap_err();
        assert!(matches!(err, CoexprError::MalformedRow { row: 3, column: 2, .. }), "{err:?}");
        assert!(store.chunks.is_empty());
    }

    #[test]
    fn test_full_mode_and_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let config = IngestConfig { triangle: TriangleMode::Full, ..IngestConfig::archs4() }
            .with_staging_path(dir.path().join("stage"));
        let input = "x,A,B\nA,1,NA\nB,0.5,1\n";
        let report = MatrixIngestor::new(config)
            .unwrap()
            .ingest(input.as_bytes(), &ProvenanceSpec::new("test"), &mut store)
            .unwrap();
        assert_eq!(report.records_staged, 3);
        assert_eq!(report.skipped_cells, 1);
    }

    #[test]
    fn test_upper_mode_rejects_rows_out_of_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let permuted = "x,A,B,C\nC,0.3,0.4,1\nA,1,0.2,0.3\nB,0.2,1,0.4\n";
        let err = ingestor(dir.path(), 100)
            .ingest(permuted.as_bytes(), &ProvenanceSpec::new("test"), &mut store)
            .unwrap_err();
        assert!(matches!(err, CoexprError::MalformedRow { row: 2, column: 1, .. }), "{err:?}");
        assert!(store.chunks.is_empty());

        let config = IngestConfig { triangle: TriangleMode::Full, ..IngestConfig::archs4() }
            .with_staging_path(dir.path().join("full"));
        let report = MatrixIngestor::new(config)
            .unwrap()
            .ingest(permuted.as_bytes(), &ProvenanceSpec::new("test"), &mut store)
            .unwrap();
        assert_eq!(report.records_staged, 9);
        let mut pairs: Vec<_> = store.chunks.concat().into_iter().map(|r| (r.gene1, r.gene2)).collect();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn test_upper_mode_rejects_more_rows_than_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let err = ingestor(dir.path(), 100)
            .ingest("x,A\nA,1\nB,0.5\n".as_bytes(), &ProvenanceSpec::new("test"), &mut store)
            .unwrap_err();
        assert!(matches!(err, CoexprError::MalformedRow { row: 3, column: 2, .. }), "{err:?}");
    }

    #[test]
    fn test_non_numeric_cell_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let err = ingestor(dir.path(), 100)
            .ingest("x,A\nA,high\n".as_bytes(), &ProvenanceSpec::new("test"), &mut store)
            .unwrap_err();
        assert_eq!(err.category(), "malformed_row");
    }

    #[test]
    fn test_symbols_with_key_separator_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let err = ingestor(dir.path(), 100)
            .ingest("x,A,B|C\nA,1,0.5\nB|C,0.5,1\n".as_bytes(), &ProvenanceSpec::new("test"), &mut store)
            .unwrap_err();
        assert!(matches!(err, CoexprError::MalformedRow { row: 1, column: 2, .. }), "{err:?}");
        assert!(store.resolved.is_empty());
    }

    #[test]
    fn test_clean_symbol_strips_quotes() {
        assert_eq!(clean_symbol(" \"A1BG\" "), "A1BG");
        assert_eq!(clean_symbol("TP53"), "TP53");
    }
}
