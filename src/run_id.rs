use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

lazy_static! {
    /// ATX run ids look like `D01033_NG01681` and must match the prefix of the input FASTQs.
    static ref RUN_ID_PATTERN: Regex = Regex::new(r"^D\d{5}_NG\d{5}$").unwrap();
}

/// Identifier of a single pipeline run.
///
/// Every local file and every published artifact of a run is named under this
/// id, so it is validated once on construction and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: &str) -> Result<Self, PipelineError> {
        if RUN_ID_PATTERN.is_match(id) {
            Ok(RunId(id.to_string()))
        } else {
            Err(PipelineError::InvalidRunId { id: id.to_string() })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Illumina-style file name consumed by the counting tool, e.g.
    /// `D01033_NG01681_S1_L001_R2_001.fastq`.
    pub fn fastq_name(&self, read: u8, extension: &str) -> String {
        format!("{}_S1_L001_R{}_001.{}", self.0, read, extension)
    }
}

impl FromStr for RunId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunId::new(s)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parse and validate the `--run-id` argument, for use with clap's value_parser.
pub fn parse_run_id(id: &str) -> Result<RunId, String> {
    RunId::new(id).map_err(|e| e.to_string())
}
