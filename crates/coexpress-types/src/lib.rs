//! Coexpress Types
//!
//! Value types shared by the correlation engine (`coexpress-core`) and the
//! relational store (`coexpress-store`). Keeping them here lets the store depend on the
//! record shapes without pulling in the array-file and threading machinery of the core.

#![deny(missing_docs)]

mod types;
pub use types::{
    CorrelationRecord, GenePairKey, KEY_SEPARATOR, Provenance, ProvenanceId, ProvenanceSpec,
};
