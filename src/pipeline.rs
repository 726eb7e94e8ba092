use anyhow::{Context, Result};
use log::info;
use std::fmt;
use std::fs;

use crate::artifact::{Artifact, ArtifactStore, Category, RemotePath};
use crate::command::ToolCommand;
use crate::config::PipelineConfig;
use crate::io::ReadPair;
use crate::run_id::RunId;
use crate::species::Species;
use crate::stages::count::{self, CountOutput};
use crate::stages::filter::{self, FilterOutput};
use crate::stages::split::{self, SplitOutput};
use crate::stages::RunContext;

/// Progress of a run. Transitions are strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Filtered,
    Split,
    Counted,
    End,
}

impl PipelineState {
    pub fn next(self) -> Option<PipelineState> {
        match self {
            PipelineState::Start => Some(PipelineState::Filtered),
            PipelineState::Filtered => Some(PipelineState::Split),
            PipelineState::Split => Some(PipelineState::Counted),
            PipelineState::Counted => Some(PipelineState::End),
            PipelineState::End => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Start => "START",
            PipelineState::Filtered => "FILTERED",
            PipelineState::Split => "SPLIT",
            PipelineState::Counted => "COUNTED",
            PipelineState::End => "END",
        };
        f.write_str(name)
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub filter: FilterOutput,
    pub split: SplitOutput,
    pub count: CountOutput,
}

impl PipelineOutput {
    /// The terminal `runs/<run id>/outs/` artifact.
    pub fn outs(&self) -> &Artifact {
        &self.count.outs
    }
}

/// Entry parameters of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub reads: ReadPair,
    pub run_id: RunId,
    pub species: Species,
}

impl LaunchPlan {
    /// The canned "Test Data" run: a BaseSpace import of `D01033_NG01681`, human.
    /// Read locations are resolved through `store`.
    pub fn test_data(store: &dyn ArtifactStore) -> Result<Self> {
        const PREFIX: &str =
            "BASESPACE_IMPORTS/projects/PL000121/D01033_NG01681_L1/D01033_NG01681_S3_L001";
        Ok(LaunchPlan {
            reads: ReadPair::new(
                store.localize(&format!("{PREFIX}_R1_001.fastq.gz"))?,
                store.localize(&format!("{PREFIX}_R2_001.fastq.gz"))?,
            ),
            run_id: RunId::new("D01033_NG01681")?,
            species: Species::Human,
        })
    }
}

/// Runs Filter -> Split -> Count for one run and publishes the results.
pub struct Pipeline<'a> {
    ctx: RunContext,
    store: &'a dyn ArtifactStore,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    /// Validate the configuration and bind it to a run.
    pub fn new(
        run_id: RunId,
        species: Species,
        config: PipelineConfig,
        store: &'a dyn ArtifactStore,
    ) -> Result<Self> {
        config.validate()?;
        // fail on a missing reference before hours of filtering
        count::resolve_reference(&config.count, species)?;
        Ok(Pipeline {
            ctx: RunContext::new(run_id, species, config),
            store,
            state: PipelineState::Start,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            info!("[{}] {} -> {}", self.ctx.run_id, self.state, next);
            self.state = next;
        }
    }

    /// Where the counting stage reads its merged inputs from.
    fn cellranger_inputs(&self) -> RemotePath {
        RemotePath::dir(&self.ctx.run_id, Category::CellrangerInputs)
    }

    /// The tool invocations a run of `reads` would execute, in order.
    pub fn plan(&self, reads: &ReadPair) -> Result<Vec<ToolCommand>> {
        let mut cmds = filter::commands(&self.ctx, reads)?;
        let filtered_r2 = self.ctx.work_file("linker2_R2.fastq.gz");
        cmds.push(split::command(&self.ctx, &filtered_r2)?);
        let fastqs = self.store.locate(&self.cellranger_inputs())?;
        cmds.push(count::command(&self.ctx, &fastqs)?);
        Ok(cmds)
    }

    /// Execute all stages. Stops at the first failing stage.
    pub fn run(&mut self, reads: &ReadPair) -> Result<PipelineOutput> {
        reads.ensure_exists()?;
        fs::create_dir_all(&self.ctx.config.work_dir).with_context(|| {
            format!(
                "Failed to create work directory {}",
                self.ctx.config.work_dir.display()
            )
        })?;
        info!(
            "Starting run {} ({}, reference {})",
            self.ctx.run_id,
            self.ctx.species,
            self.ctx.species.reference()
        );

        let filtered = filter::run(&self.ctx, reads).context("Linker filtering failed")?;
        self.store.publish(&filtered.r1)?;
        self.store.publish(&filtered.r2)?;
        for stats in &filtered.stats {
            self.store.publish(stats)?;
        }
        self.advance();

        let split = split::run(&self.ctx, &filtered.r2.local).context("Barcode splitting failed")?;
        // merges with the R1 published by the filter stage
        self.store.publish(&split.dir)?;
        self.advance();

        let fastqs = self.store.locate(&self.cellranger_inputs())?;
        let counted = count::run(&self.ctx, &fastqs).context("Counting failed")?;
        self.store.publish(&counted.outs)?;
        self.advance();

        info!("Run {} finished: {}", self.ctx.run_id, counted.outs.remote);
        self.advance();
        Ok(PipelineOutput {
            filter: filtered,
            split,
            count: counted,
        })
    }
}
