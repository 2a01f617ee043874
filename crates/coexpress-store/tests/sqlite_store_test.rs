use coexpress_core::staging::StagingWriter;
use coexpress_core::*;
use coexpress_store::{DEFAULT_BATCH_SIZE, SqliteCorrelationStore};

const ARCHS4: &str = "\"\",\"A1BG\",\"A1CF\",\"A2M\",\"TP53\"\n\
                      \"A1BG\",1,0.21,-0.4,0.05\n\
                      \"A1CF\",0.21,1,0.33,-0.12\n\
                      \"A2M\",-0.4,0.33,1,0.7\n\
                      \"TP53\",0.05,-0.12,0.7,1\n";

#[test]
fn test_ingesting_same_file_twice_adds_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = dir.path().join("human_correlation.csv");
    std::fs::write(&matrix, ARCHS4).unwrap();
    let mut store = SqliteCorrelationStore::open(&dir.path().join("coexpress.db")).unwrap();
    let ingestor = MatrixIngestor::new(
        IngestConfig::archs4().with_staging_path(dir.path().join("staging")).with_chunk_size(4),
    )
    .unwrap();

    let first = ingestor.ingest_file(&matrix, &ProvenanceSpec::archs4(), &mut store).unwrap();
    println!("first run: {:?}", first.load);
    assert_eq!(first.load.rows_loaded, 10);
    assert_eq!(store.record_count().unwrap(), 10);

    let second = ingestor.ingest_file(&matrix, &ProvenanceSpec::archs4(), &mut store).unwrap();
    println!("second run: {:?}", second.load);
    assert_eq!(second.provenance.id, first.provenance.id);
    assert_eq!(second.load, LoadReport { rows_loaded: 0, duplicates: 10 });
    assert_eq!(store.record_count().unwrap(), 10);
}

#[test]
fn test_lookup_is_order_independent() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteCorrelationStore::open_in_memory().unwrap();
    let report = MatrixIngestor::new(IngestConfig::archs4().with_staging_path(dir.path().join("staging")))
        .unwrap()
        .ingest(ARCHS4.as_bytes(), &ProvenanceSpec::archs4(), &mut store)
        .unwrap();
    let id = report.provenance.id;

    assert_eq!(store.correlation("TP53", "A2M", id).unwrap(), Some(0.7));
    assert_eq!(store.correlation("A2M", "TP53", id).unwrap(), Some(0.7));
    assert_eq!(store.correlation("A2M", "TP53", id + 1).unwrap(), None);
    assert_eq!(store.correlation("A1BG", "A1BG", id).unwrap(), Some(1.0));
}

#[test]
fn test_same_pair_under_two_provenances() {
    let mut store = SqliteCorrelationStore::open_in_memory().unwrap();
    let archs4 = store.resolve_or_create(&ProvenanceSpec::archs4()).unwrap();
    let gtex = store.resolve_or_create(&ProvenanceSpec::new("GTEx").with_category("tissue")).unwrap();
    store
        .add_records(
            &[
                CorrelationRecord::new("TP53", "A1BG", 0.1, archs4.id),
                CorrelationRecord::new("A1BG", "TP53", 0.3, gtex.id),
            ],
            DEFAULT_BATCH_SIZE,
        )
        .unwrap();

    let values = store.correlations("TP53", "A1BG").unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0], (archs4, 0.1));
    assert_eq!(values[1], (gtex, 0.3));
    assert!(store.correlations("TP53", "BRCA1").unwrap().is_empty());
}

#[test]
fn test_malformed_staging_line_rolls_back_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteCorrelationStore::open_in_memory().unwrap();
    let p = store.resolve_or_create(&ProvenanceSpec::new("test")).unwrap();

    let path = dir.path().join("stage");
    let mut writer = StagingWriter::create(&path).unwrap();
    writer.write_record(&GenePairKey::new("A", "B"), 0.5, p.id).unwrap();
    writer.finish().unwrap();
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str("'C'\t'D'\n");
    std::fs::write(&path, contents).unwrap();

    let err = store.load_staging_file(&path).unwrap_err();
    assert!(matches!(err, CoexprError::MalformedRow { row: 2, .. }), "{err:?}");
    assert_eq!(store.record_count().unwrap(), 0);
}

#[test]
fn test_missing_staging_file_is_a_store_error() {
    let mut store = SqliteCorrelationStore::open_in_memory().unwrap();
    let err = store.load_staging_file(std::path::Path::new("/nonexistent/stage_9")).unwrap_err();
    assert_eq!(err.category(), "store");
}
