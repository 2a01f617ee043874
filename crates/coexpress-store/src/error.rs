use coexpress_core::CoexprError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures inside the SQLite store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error during {operation}: {source}")]
    Sqlite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cannot read staging file {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Adapter for `map_err` on rusqlite results.
    pub fn sqlite(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |source| StoreError::Sqlite { operation, source }
    }

    pub fn staging(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Staging { path: path.to_path_buf(), source }
    }

    fn operation(&self) -> &'static str {
        match self {
            StoreError::Sqlite { operation, .. } => operation,
            StoreError::Staging { .. } => "read staging file",
        }
    }
}

impl From<StoreError> for CoexprError {
    fn from(err: StoreError) -> Self {
        let details = match &err {
            StoreError::Sqlite { source, .. } => source.sqlite_error_code().map(|c| format!("{c:?}")),
            StoreError::Staging { path, .. } => Some(path.display().to_string()),
        };
        CoexprError::Store {
            message: err.to_string(),
            operation: Some(err.operation().to_string()),
            details,
        }
    }
}
