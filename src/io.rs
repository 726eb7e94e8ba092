use anyhow::{Context, Result};
use needletail::parse_fastx_file;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Paired sequencing files, referenced by location only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    /// Genomic read.
    pub r1: PathBuf,
    /// Composite barcode + genomic read.
    pub r2: PathBuf,
}

impl ReadPair {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(r1: P, r2: Q) -> Self {
        ReadPair {
            r1: r1.into(),
            r2: r2.into(),
        }
    }

    /// Fail with [`PipelineError::MissingInput`] unless both files exist.
    pub fn ensure_exists(&self) -> Result<(), PipelineError> {
        for path in [&self.r1, &self.r2] {
            if !path.is_file() {
                return Err(PipelineError::MissingInput { path: path.clone() });
            }
        }
        Ok(())
    }

    /// Count both files in parallel and check that they hold the same number of records.
    pub fn count_reads(&self) -> Result<u64> {
        let (r1, r2) = rayon::join(|| count_reads(&self.r1), || count_reads(&self.r2));
        let (r1_reads, r2_reads) = (r1?, r2?);
        if r1_reads != r2_reads {
            return Err(PipelineError::UnpairedReads {
                r1: self.r1.clone(),
                r1_reads,
                r2: self.r2.clone(),
                r2_reads,
            }
            .into());
        }
        Ok(r2_reads)
    }
}

/// Count the records of a FASTQ (or gzipped FASTQ) file.
///
/// A zero-byte file counts as empty rather than as a parse error.
pub fn count_reads(path: &Path) -> Result<u64> {
    // Check for 0-byte file BEFORE parsing to avoid parser errors
    if fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len()
        == 0
    {
        return Ok(0);
    }

    let mut reader = match parse_fastx_file(path) {
        Ok(r) => r,
        Err(e) if e.kind == needletail::errors::ParseErrorKind::EmptyFile => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to parse {}", path.display()));
        }
    };

    let mut total = 0u64;
    while let Some(record) = reader.next() {
        record.with_context(|| format!("Malformed record in {}", path.display()))?;
        total += 1;
    }
    Ok(total)
}

/// Fail with [`PipelineError::MissingArtifact`] unless `path` exists.
pub fn ensure_artifact(stage: &'static str, path: &Path) -> Result<(), PipelineError> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingArtifact {
            stage,
            path: path.to_path_buf(),
        })
    }
}
