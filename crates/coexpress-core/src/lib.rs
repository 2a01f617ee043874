#![allow(missing_docs)]
//! Core functionality for gene co-expression correlation.
//!
//! Two independent paths share this crate. The expression path reads tissue-restricted
//! sub-matrices out of one large samples x genes array file and correlates gene pairs over
//! them, either one pair at a time or every pair at once on a bounded worker pool. The
//! ingestion path streams a published gene x gene correlation matrix into a store through
//! chunked staging files.

/// Backing array-file access and hyperslab selections
pub mod array_store;
/// Component configuration
pub mod config;
/// Error types for core operations
pub mod error;
/// Tissue sub-matrix reads and their cache
pub mod expression;
/// HDF5 implementation of the array backend
#[cfg(feature = "hdf5")]
pub mod hdf5_store;
/// Chunked correlation-matrix ingestion
pub mod ingest;
/// Bounded-queue all-pairs correlation
pub mod matrix_engine;
/// Gene, sample and tissue lookup tables
pub mod metadata;
/// Single gene-pair correlation with a current-tissue slot
pub mod pair_correlation;
/// Lock-free upper-triangle result arena
pub mod pairwise_matrix;
/// Pearson kernel and vector normalization
pub mod pearson;
/// One loader per backing file
pub mod registry;
/// Contiguous-run coalescing of sample selections
pub mod selection;
/// Staging file format and writer
pub mod staging;
/// Contracts onto the correlation store
pub mod store;
/// Synthetic array files for tests and benchmarks
pub mod test_utils;
/// Recomputed-versus-published correlation checks
pub mod verification;

pub use array_store::{ArrayBackend, MemoryArrayBackend};
pub use config::{CorrelationConfig, DatasetLayout, IngestConfig, Normalization, TriangleMode};
pub use error::{CoexprError, CoexprResult};
pub use expression::{ExpressionLoader, ExpressionMatrix, Tissue};
pub use ingest::{IngestReport, MatrixIngestor};
pub use matrix_engine::{AllPairsEngine, AllPairsResult, CancellationToken};
pub use metadata::MetadataIndex;
pub use pair_correlation::GenePairCorrelator;
pub use registry::LoaderRegistry;
pub use store::{BulkLoader, CorrelationLookup, LoadReport, ProvenanceResolver};
pub use verification::{VerificationRow, verify_against_matrix, write_verification_tsv};

pub use coexpress_types::{CorrelationRecord, GenePairKey, Provenance, ProvenanceId, ProvenanceSpec};
