//! HDF5 array files through the native library
//!
//! A selection is materialized by one hyperslab read of its bounding row range, after
//! which the selected rows are gathered in block order. The high-level API has no
//! OR-combined dataspace, and a native union would return rows in file order anyway.
//! Rows lying between blocks are read and discarded, so peak memory is the bounding
//! range rather than the selection.

use crate::array_store::{ArrayBackend, HyperslabSelection};
use crate::error::{CoexprError, CoexprResult};
use hdf5::types::{VarLenAscii, VarLenUnicode};
use ndarray::{Array2, s};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn hdf5_error(context: &str, e: hdf5::Error) -> CoexprError {
    CoexprError::external_service("hdf5", format!("{context}: {e}"))
}

pub struct Hdf5ArrayBackend {
    path: PathBuf,
    file: hdf5::File,
}

impl std::fmt::Debug for Hdf5ArrayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hdf5ArrayBackend").field("path", &self.path).finish()
    }
}

impl Hdf5ArrayBackend {
    pub fn open(path: &Path) -> CoexprResult<Self> {
        let file = hdf5::File::open(path)
            .map_err(|e| hdf5_error(&format!("cannot open {}", path.display()), e))?;
        info!(path = %path.display(), "Opened HDF5 file");
        Ok(Self { path: path.to_path_buf(), file })
    }

    fn dataset(&self, name: &str) -> CoexprResult<hdf5::Dataset> {
        self.file
            .dataset(name)
            .map_err(|e| CoexprError::layout(&self.path, name, format!("dataset not readable: {e}")))
    }
}

impl ArrayBackend for Hdf5ArrayBackend {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn group_members(&self, group: &str) -> CoexprResult<Vec<String>> {
        let group = self
            .file
            .group(group)
            .map_err(|e| CoexprError::layout(&self.path, group, format!("group not readable: {e}")))?;
        group.member_names().map_err(|e| hdf5_error("member listing", e))
    }

    fn shape(&self, dataset: &str) -> CoexprResult<Vec<usize>> {
        Ok(self.dataset(dataset)?.shape())
    }

    fn read_strings(&self, dataset: &str) -> CoexprResult<Vec<String>> {
        let ds = self.dataset(dataset)?;
        match ds.read_1d::<VarLenUnicode>() {
            Ok(values) => Ok(values.iter().map(|v| v.as_str().to_string()).collect()),
            Err(unicode_err) => {
                debug!(dataset, error = %unicode_err, "Not UTF-8 strings, retrying as ASCII");
                let values = ds
                    .read_1d::<VarLenAscii>()
                    .map_err(|e| hdf5_error(&format!("reading strings from {dataset}"), e))?;
                Ok(values.iter().map(|v| v.as_str().to_string()).collect())
            }
        }
    }

    fn read_selection(
        &self,
        dataset: &str,
        selection: &HyperslabSelection,
    ) -> CoexprResult<Array2<f64>> {
        let ds = self.dataset(dataset)?;
        let Some(bounds) = selection.bounding_block() else {
            return Ok(Array2::zeros((0, 0)));
        };
        let bounding: Array2<f64> = ds
            .read_slice_2d(s![bounds.rows(), bounds.columns()])
            .map_err(|e| hdf5_error(&format!("reading {bounds} of {dataset}"), e))?;
        debug!(
            blocks = selection.blocks().len(),
            rows_read = bounds.count[0],
            rows_kept = selection.row_count(),
            "Read selection bounding range"
        );
        selection.gather(bounding.view())
    }
}
