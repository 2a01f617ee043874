use coexpress_core::pearson::pearson_unchecked;
use coexpress_core::test_utils::synthetic_backend;
use coexpress_core::{AllPairsEngine, CorrelationConfig, DatasetLayout, ExpressionLoader, Tissue};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

fn bench_pearson_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("pearson_kernel");

    for samples in [100, 1_000, 10_000].iter() {
        let x: Vec<f64> = (0..*samples).map(|i| (i as f64 * 0.37).sin()).collect();
        let y: Vec<f64> = (0..*samples).map(|i| (i as f64 * 0.11).cos()).collect();
        group.bench_with_input(BenchmarkId::new("samples", samples), samples, |b, _| {
            b.iter(|| black_box(pearson_unchecked(black_box(&x), black_box(&y))));
        });
    }
    group.finish();
}

fn bench_all_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("all_pairs");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for genes in [200, 500, 1_000].iter() {
        let loader =
            ExpressionLoader::open(Box::new(synthetic_backend(*genes, 300, 3)), DatasetLayout::default())
                .unwrap();
        let tissue = Tissue::label("tissue_0");
        // warm the tissue cache so only correlation is measured
        loader.tissue_matrix(&tissue).unwrap();

        for max_pending_tasks in [64, 5_000].iter() {
            let engine = AllPairsEngine::new(CorrelationConfig {
                max_pending_tasks: *max_pending_tasks,
                ..Default::default()
            })
            .unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("pending_{max_pending_tasks}"), genes),
                genes,
                |b, _| {
                    b.iter(|| black_box(engine.correlate_tissue(&loader, &tissue, None).unwrap()));
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_pearson_kernel, bench_all_pairs);
criterion_main!(benches);
