//! One loader per backing file
//!
//! The native array-file library does not tolerate two independent handles on one file, so
//! every consumer in a process must share the same [`ExpressionLoader`]. The registry hands
//! out `Arc`s keyed by canonical path and opens a file at most once; opening happens under
//! the map entry's lock, so two threads racing on the same path still get one loader.

use crate::array_store::ArrayBackend;
use crate::config::DatasetLayout;
use crate::error::CoexprResult;
use crate::expression::ExpressionLoader;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct LoaderRegistry {
    layout: DatasetLayout,
    loaders: DashMap<PathBuf, Arc<ExpressionLoader>>,
}

impl LoaderRegistry {
    pub fn new(layout: DatasetLayout) -> Self {
        Self { layout, loaders: DashMap::new() }
    }

    /// Key for `path`: canonical when the file exists, otherwise made absolute.
    pub fn canonical_key(path: &Path) -> PathBuf {
        std::fs::canonicalize(path)
            .or_else(|_| std::path::absolute(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// The loader for `path`, opening it with `open` if this is the first request.
    pub fn get_or_open_with<F>(&self, path: &Path, open: F) -> CoexprResult<Arc<ExpressionLoader>>
    where
        F: FnOnce(&Path) -> CoexprResult<Box<dyn ArrayBackend>>,
    {
        let key = Self::canonical_key(path);
        let entry = self.loaders.entry(key.clone()).or_try_insert_with(|| {
            let backend = open(&key)?;
            let loader = ExpressionLoader::open(backend, self.layout.clone())?;
            info!(path = %key.display(), "Registered expression loader");
            Ok::<_, crate::error::CoexprError>(Arc::new(loader))
        })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Open `path` as an HDF5 file.
    #[cfg(feature = "hdf5")]
    pub fn get_or_open(&self, path: &Path) -> CoexprResult<Arc<ExpressionLoader>> {
        self.get_or_open_with(path, |p| {
            Ok(Box::new(crate::hdf5_store::Hdf5ArrayBackend::open(p)?) as Box<dyn ArrayBackend>)
        })
    }

    pub fn get(&self, path: &Path) -> Option<Arc<ExpressionLoader>> {
        self.loaders.get(&Self::canonical_key(path)).map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::four_gene_backend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_same_path_opens_once() {
        let registry = LoaderRegistry::default();
        let opened = AtomicUsize::new(0);
        let open = |_: &Path| {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok::<_, crate::error::CoexprError>(Box::new(four_gene_backend()) as Box<dyn ArrayBackend>)
        };
        let a = registry.get_or_open_with(Path::new("synthetic/four.h5"), open).unwrap();
        let b = registry.get_or_open_with(Path::new("synthetic/four.h5"), open).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(Path::new("synthetic/four.h5")).is_some());
    }

    #[test]
    fn test_failed_open_registers_nothing() {
        let registry = LoaderRegistry::default();
        let err = registry
            .get_or_open_with(Path::new("missing.h5"), |p| {
                Err(crate::error::CoexprError::external_service("hdf5", format!("cannot open {}", p.display())))
            })
            .unwrap_err();
        assert_eq!(err.category(), "external");
        assert!(registry.is_empty());
    }
}
