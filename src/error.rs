use std::path::PathBuf;
use thiserror::Error;

/// Failures the pipeline reports as typed errors.
///
/// These travel inside `anyhow::Error`, so callers that care about a specific
/// condition can `downcast_ref::<PipelineError>()`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Run id '{id}' does not match the Dxxxxx_NGxxxxx format.")]
    InvalidRunId { id: String },

    #[error("Input file at {path:?} not found.")]
    MissingInput { path: PathBuf },

    #[error(
        "Failed trying to execute utility '{tool}'. Make sure it exists and you have execution permissions."
    )]
    ToolNotExecutable { tool: String },

    #[error(
        "Utility '{tool}' failed{} on execute '{cmd}'{}",
        PipelineError::format_code(*code),
        PipelineError::format_diagnostics(diagnostics)
    )]
    ToolFailed {
        tool: String,
        cmd: String,
        code: Option<i32>,
        diagnostics: Vec<String>,
    },

    #[error("Stage '{stage}' finished but did not produce {path:?}.")]
    MissingArtifact { stage: &'static str, path: PathBuf },

    #[error("Output directory {path:?} already exists; re-runs require a fresh working directory.")]
    OutputExists { path: PathBuf },

    #[error("Linker pass {pass} produced more reads ({after}) than it was given ({before}).")]
    ReadCountIncreased { pass: u8, before: u64, after: u64 },

    #[error("Paired files are out of sync: {r1:?} has {r1_reads} reads, {r2:?} has {r2_reads}.")]
    UnpairedReads {
        r1: PathBuf,
        r1_reads: u64,
        r2: PathBuf,
        r2_reads: u64,
    },

    #[error("Barcode splitting turned {input} reads into {r2} genomic and {r3} barcode reads.")]
    SplitCardinality { input: u64, r2: u64, r3: u64 },

    #[error("Invalid configuration: {msg}")]
    InvalidConfig { msg: String },

    #[error("Reference package not found at {path:?}.")]
    MissingReference { path: PathBuf },
}

impl PipelineError {
    #[cold]
    pub fn invalid_config<M: Into<String>>(msg: M) -> Self {
        PipelineError::InvalidConfig { msg: msg.into() }
    }

    /// Exit code of the failed tool, if this error came from one.
    pub fn tool_exit_code(&self) -> Option<i32> {
        match self {
            PipelineError::ToolFailed { code, .. } => *code,
            _ => None,
        }
    }

    fn format_code(code: Option<i32>) -> String {
        match code {
            Some(c) => format!(" with exit code {c}"),
            None => " (terminated by signal)".to_string(),
        }
    }

    fn format_diagnostics(lines: &[String]) -> String {
        if lines.is_empty() {
            String::new()
        } else {
            format!("\n{}", lines.join("\n"))
        }
    }
}
