//! Staging file format
//!
//! One record per line, four tab-separated fields, each wrapped in single quotes:
//!
//! ```text
//! 'A1BG'\t'A1CF'\t'0.125'\t'1'
//! ```
//!
//! Gene order on a line is always canonical (see [`GenePairKey`]).

use crate::error::{CoexprError, CoexprResult};
use coexpress_types::{CorrelationRecord, GenePairKey, ProvenanceId};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn format_staging_line(key: &GenePairKey, value: f64, provenance_id: ProvenanceId) -> String {
    format!("'{}'\t'{}'\t'{}'\t'{}'\n", key.first(), key.second(), value, provenance_id)
}

/// Parse one staging line (with or without its newline). `line_no` is only used in errors.
pub fn parse_staging_line(line: &str, line_no: u64) -> CoexprResult<CorrelationRecord> {
    let malformed = |column: usize, message: String| CoexprError::malformed_row(line_no, column, message);
    let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
    if fields.len() != 4 {
        return Err(malformed(fields.len(), format!("expected 4 fields, found {}", fields.len())));
    }
    let unquote = |i: usize| {
        fields[i]
            .strip_prefix('\'')
            .and_then(|f| f.strip_suffix('\''))
            .ok_or_else(|| malformed(i, format!("field '{}' is not single-quoted", fields[i])))
    };
    let (gene1, gene2) = (unquote(0)?, unquote(1)?);
    let value: f64 = unquote(2)?.parse().map_err(|e| malformed(2, format!("bad value: {e}")))?;
    let provenance_id: ProvenanceId =
        unquote(3)?.parse().map_err(|e| malformed(3, format!("bad provenance id: {e}")))?;
    Ok(CorrelationRecord::new(gene1, gene2, value, provenance_id))
}

/// Path a completed chunk is renamed to: `<staging>_<n>`.
pub fn chunk_path(staging: &Path, chunk: u64) -> PathBuf {
    let mut name: OsString = staging.as_os_str().to_owned();
    name.push(format!("_{chunk}"));
    PathBuf::from(name)
}

/// Buffered writer over the current staging file.
#[derive(Debug)]
pub struct StagingWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl StagingWriter {
    /// Create (or truncate) the staging file.
    pub fn create(path: &Path) -> CoexprResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self { path: path.to_path_buf(), writer: BufWriter::new(file), lines: 0 })
    }

    pub fn write_record(
        &mut self,
        key: &GenePairKey,
        value: f64,
        provenance_id: ProvenanceId,
    ) -> CoexprResult<()> {
        self.writer.write_all(format_staging_line(key, value, provenance_id).as_bytes())?;
        self.lines += 1;
        Ok(())
    }

    /// Lines written since the file was created.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close, returning the path and line count.
    pub fn finish(mut self) -> CoexprResult<(PathBuf, u64)> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok((self.path, self.lines))
    }
}
