use coexpress_core::array_store::{Hyperslab, HyperslabSelection, SelectOp};
use coexpress_core::selection::SampleBlock;
use coexpress_core::test_utils::{four_gene_loader, synthetic_backend};
use coexpress_core::*;
use ndarray::s;

#[test]
fn test_composite_selection_matches_per_row_reads() {
    let backend = synthetic_backend(12, 40, 3);
    let loader = ExpressionLoader::open(Box::new(backend.clone()), DatasetLayout::default()).unwrap();
    let samples = vec![0, 1, 2, 9, 10, 17, 30, 31, 32, 33];

    let matrix = loader.read_samples(&samples, 0..12).unwrap().unwrap();
    assert_eq!(matrix.values().dim(), (samples.len(), 12));
    assert_eq!(matrix.sample_indices(), &samples[..]);
    assert!(!matrix.is_partial());

    for (row, &sample) in samples.iter().enumerate() {
        let mut single = HyperslabSelection::new([40, 12]);
        single.select(SelectOp::Set, Hyperslab::new([sample, 0], [1, 12])).unwrap();
        let expected = backend.read_selection("/data/expression", &single).unwrap();
        assert_eq!(matrix.values().slice(s![row, ..]), expected.row(0));
    }
}

#[test]
fn test_gene_range_restricts_columns() {
    let backend = synthetic_backend(12, 40, 3);
    let loader = ExpressionLoader::open(Box::new(backend), DatasetLayout::default()).unwrap();
    let matrix = loader.read_samples(&[3, 4, 5], 4..7).unwrap().unwrap();
    assert_eq!(matrix.genes(), 4..7);
    assert_eq!(matrix.values().dim(), (3, 3));
    let full = loader.read_samples(&[3, 4, 5], 0..12).unwrap().unwrap();
    assert_eq!(matrix.values(), &full.values().slice(s![.., 4..7]));
}

#[test]
fn test_partial_read_keeps_in_range_samples() {
    let loader = four_gene_loader();
    let matrix = loader.read_samples(&[0, 2, 3, 9], 0..4).unwrap().unwrap();
    assert_eq!(matrix.skipped_blocks(), &[SampleBlock::new(9, 1)]);
    assert_eq!(matrix.sample_indices(), &[0, 2, 3]);
    let a1bg = matrix.gene_values(0).unwrap().to_vec();
    assert_eq!(a1bg, vec![1.0, 3.0, 4.0]);
}

#[test]
fn test_tissue_reads_use_sorted_samples() {
    let loader = four_gene_loader();
    let brain = loader.tissue_matrix(&Tissue::label("brain")).unwrap().unwrap();
    assert_eq!(brain.sample_indices(), &[2, 4, 5]);
    let tp53 = loader.metadata().genes.resolve("TP53").unwrap();
    assert_eq!(brain.gene_values(tp53).unwrap().to_vec(), vec![4.0, 6.0, 5.0]);
    assert_eq!(
        loader.expression_for_gene_in_tissue("TP53", &Tissue::label("brain")).unwrap(),
        Some(vec![4.0, 6.0, 5.0])
    );
}

#[test]
fn test_side_file_tissue_is_cached_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cohort.txt");
    std::fs::write(&path, "S6\nS1\nS2\n").unwrap();

    let loader = four_gene_loader();
    let cohort = Tissue::sample_file(&path);
    let matrix = loader.tissue_matrix(&cohort).unwrap().unwrap();
    assert_eq!(matrix.sample_indices(), &[0, 1, 5]);
    assert!(loader.tissue_matrix(&cohort).unwrap().is_some());
    assert_eq!(loader.cached_tissues(), 1);
}
