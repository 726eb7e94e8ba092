//! The three processing stages. Each one turns typed inputs into typed
//! [`Artifact`](crate::artifact::Artifact) descriptors; publishing and state
//! tracking are left to the [`Pipeline`](crate::pipeline::Pipeline).

pub mod count;
pub mod filter;
pub mod split;

use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::run_id::RunId;
use crate::species::Species;

/// Everything a stage needs to know about the run it belongs to.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub species: Species,
    pub config: PipelineConfig,
}

impl RunContext {
    pub fn new(run_id: RunId, species: Species, config: PipelineConfig) -> Self {
        RunContext {
            run_id,
            species,
            config,
        }
    }

    /// A stage-local file in the work directory, named `<run id>_<suffix>`.
    pub fn work_file(&self, suffix: &str) -> PathBuf {
        self.config
            .work_dir
            .join(format!("{}_{}", self.run_id, suffix))
    }

    pub(crate) fn keep_lines(&self) -> usize {
        self.config.diagnostic_lines
    }
}
