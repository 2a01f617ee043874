use coexpress_core::pearson::pearson_unchecked;
use coexpress_core::test_utils::{four_gene_loader, synthetic_backend};
use coexpress_core::*;
use std::time::Instant;

fn engine(worker_count: usize, max_pending_tasks: usize, task_width: usize) -> AllPairsEngine {
    AllPairsEngine::new(CorrelationConfig {
        worker_count,
        max_pending_tasks,
        task_width,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_tissue_run_matches_single_pair_correlator() {
    let loader = std::sync::Arc::new(four_gene_loader());
    let liver = Tissue::label("liver");
    let result = engine(2, 4, 1).correlate_tissue(&loader, &liver, None).unwrap();
    assert!(result.is_complete());
    assert_eq!(result.genes, vec!["A1BG", "A1CF", "TP53", "FLAT"]);

    let mut single = GenePairCorrelator::new(loader.clone(), CorrelationConfig::default());
    for a in ["A1BG", "A1CF", "TP53"] {
        for b in ["A1BG", "A1CF", "TP53"] {
            let expected = single.correlate(a, b, Some(&liver)).unwrap();
            assert_eq!(result.correlation(a, b), Some(expected), "{a} vs {b}");
        }
    }
    assert!(result.correlation("FLAT", "A1BG").unwrap().is_nan());
}

#[test]
fn test_bounded_queue_covers_every_pair_once() {
    let backend = synthetic_backend(150, 24, 2);
    let loader = ExpressionLoader::open(Box::new(backend), DatasetLayout::default()).unwrap();
    let tissue = Tissue::label("tissue_1");

    let started = Instant::now();
    // tiny queue and narrow units force the producer to block repeatedly
    let result = engine(4, 3, 7).correlate_tissue(&loader, &tissue, None).unwrap();
    println!("150 genes, {} pairs in {:?}", result.total_pairs, started.elapsed());

    assert_eq!(result.total_pairs, 150 * 151 / 2);
    assert_eq!(result.completed_pairs, result.total_pairs);

    let matrix = loader.tissue_matrix(&tissue).unwrap().unwrap();
    for (a, b) in [(0, 0), (0, 149), (17, 88), (149, 149), (60, 61)] {
        let x = matrix.gene_values(a).unwrap().to_vec();
        let y = matrix.gene_values(b).unwrap().to_vec();
        assert_eq!(result.matrix.get(a, b), Some(pearson_unchecked(&x, &y)));
        assert_eq!(result.matrix.get(a, b), result.matrix.get(b, a));
    }
    for g in 0..150 {
        assert_eq!(result.matrix.get(g, g), Some(1.0));
    }
}

#[test]
fn test_results_do_not_depend_on_worker_count() {
    let backend = synthetic_backend(40, 16, 1);
    let loader = ExpressionLoader::open(Box::new(backend), DatasetLayout::default()).unwrap();
    let tissue = Tissue::label("tissue_0");
    let one = engine(1, 1, 64).correlate_tissue(&loader, &tissue, None).unwrap();
    let many = engine(8, 2, 3).correlate_tissue(&loader, &tissue, None).unwrap();
    assert_eq!(one.matrix.to_dense(), many.matrix.to_dense());
}

#[test]
fn test_records_are_canonical_and_skip_nan() {
    let loader = four_gene_loader();
    let result = engine(2, 8, 2).correlate_tissue(&loader, &Tissue::label("brain"), None).unwrap();
    let records: Vec<_> = result.records(7).collect();
    // 10 cells, FLAT's four are NaN
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.gene1 <= r.gene2 && r.provenance_id == 7));
}

#[test]
fn test_unknown_tissue_fails_before_any_work() {
    let loader = four_gene_loader();
    let err = engine(2, 8, 2).correlate_tissue(&loader, &Tissue::label("heart"), None).unwrap_err();
    assert!(matches!(err, CoexprError::UnknownTissue { .. }));
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = AllPairsEngine::new(CorrelationConfig { max_pending_tasks: 0, ..Default::default() })
        .unwrap_err();
    assert_eq!(err.category(), "configuration");
}
