//! Synthetic array files for tests and benchmarks

use crate::array_store::MemoryArrayBackend;
use crate::config::DatasetLayout;
use crate::expression::ExpressionLoader;
use ndarray::Array2;

/// Six samples by four genes.
///
/// | sample | tissue | updated     | A1BG | A1CF | TP53 | FLAT |
/// |--------|--------|-------------|------|------|------|------|
/// | S1     | liver  | Jan 05 2016 | 1    | 6    | 2    | 3    |
/// | S2     | liver  | Feb 10 2016 | 2    | 5    | 1    | 3    |
/// | S3     | brain  | Mar 15 2017 | 3    | 4    | 4    | 3    |
/// | S4     | liver  | Apr 21 2017 | 4    | 3    | 3    | 3    |
/// | S5     | brain  | May 01 2018 | 5    | 2    | 6    | 3    |
/// | S6     | brain  | Jun 30 2018 | 6    | 1    | 5    | 3    |
pub fn four_gene_backend() -> MemoryArrayBackend {
    let columns: [[f64; 6]; 4] = [
        [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        [6.0, 5.0, 4.0, 3.0, 2.0, 1.0],
        [2.0, 1.0, 4.0, 3.0, 6.0, 5.0],
        [3.0; 6],
    ];
    let matrix = Array2::from_shape_fn((6, 4), |(sample, gene)| columns[gene][sample]);
    MemoryArrayBackend::new("four_gene.h5")
        .with_matrix("/data/expression", matrix)
        .with_strings("/meta/genes", ["A1BG", "A1CF", "TP53", "FLAT"])
        .with_strings("/meta/Sample_geo_accession", ["S1", "S2", "S3", "S4", "S5", "S6"])
        .with_strings(
            "/meta/Sample_source_name_ch1",
            ["liver", "liver", "brain", "liver", "brain", "brain"],
        )
        .with_strings(
            "/meta/Sample_last_update_date",
            ["Jan 05 2016", "Feb 10 2016", "Mar 15 2017", "Apr 21 2017", "May 01 2018", "Jun 30 2018"],
        )
}

pub fn four_gene_loader() -> ExpressionLoader {
    match ExpressionLoader::open(Box::new(four_gene_backend()), DatasetLayout::default()) {
        Ok(loader) => loader,
        Err(e) => panic!("four-gene fixture failed to load: {e}"),
    }
}

/// Deterministic `samples x genes` file with `tissues` labels assigned round-robin.
///
/// Values are a cheap hash of the cell position, so genes are neither constant nor
/// perfectly correlated with each other.
pub fn synthetic_backend(genes: usize, samples: usize, tissues: usize) -> MemoryArrayBackend {
    let tissues = tissues.max(1);
    let matrix = Array2::from_shape_fn((samples, genes), |(s, g)| {
        let mixed = (s as u64 + 1).wrapping_mul(2_654_435_761) ^ (g as u64 + 1).wrapping_mul(40_503);
        (mixed % 10_007) as f64 / 100.0
    });
    MemoryArrayBackend::new(format!("synthetic_{genes}x{samples}.h5"))
        .with_matrix("/data/expression", matrix)
        .with_strings("/meta/genes", (0..genes).map(|g| format!("GENE{g}")))
        .with_strings("/meta/Sample_geo_accession", (0..samples).map(|s| format!("GSM{s}")))
        .with_strings("/meta/Sample_source_name_ch1", (0..samples).map(|s| format!("tissue_{}", s % tissues)))
}
