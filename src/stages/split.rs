use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::RunContext;
use crate::artifact::{Artifact, Category, RemotePath};
use crate::command::ToolCommand;
use crate::error::PipelineError;
use crate::io::{count_reads, ensure_artifact};

const STAGE: &str = "split";

/// Fixed name of the directory handed to the counting tool.
pub const OUTPUT_DIR: &str = "cellranger_inputs";

#[derive(Debug, Clone)]
pub struct SplitOutput {
    /// The whole `cellranger_inputs/` directory.
    pub dir: Artifact,
    /// Genomic portion of the filtered read 2.
    pub r2: PathBuf,
    /// 16 bp barcode portion of the filtered read 2.
    pub r3: PathBuf,
    /// Records per output file, when counting is enabled.
    pub reads: Option<u64>,
}

pub fn output_dir(ctx: &RunContext) -> PathBuf {
    ctx.config.work_dir.join(OUTPUT_DIR)
}

fn output_files(ctx: &RunContext, dir: &Path) -> (PathBuf, PathBuf) {
    (
        dir.join(ctx.run_id.fastq_name(2, "fastq")),
        dir.join(ctx.run_id.fastq_name(3, "fastq")),
    )
}

/// The collaborator invocation splitting `r2` into genomic and barcode reads.
pub fn command(ctx: &RunContext, r2: &Path) -> Result<ToolCommand, PipelineError> {
    let (new_r2, r3) = output_files(ctx, &output_dir(ctx));
    let mut cmd = ToolCommand::new("split", &ctx.config.splitter.command)?;
    cmd.arg("--input")
        .arg(r2.display().to_string())
        .arg("--output_R2")
        .arg(new_r2.display().to_string())
        .arg("--output_R3")
        .arg(r3.display().to_string());
    Ok(cmd)
}

/// Create the output directory. It must not exist yet: a second split of the
/// same run without cleanup is refused.
fn create_output_dir(dir: &Path) -> Result<()> {
    match fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(PipelineError::OutputExists {
            path: dir.to_path_buf(),
        }
        .into()),
        Err(e) => Err(e).with_context(|| format!("Failed to create {}", dir.display())),
    }
}

/// Split the filtered read 2 into a genomic read 2 and a barcode read 3.
pub fn run(ctx: &RunContext, r2: &Path) -> Result<SplitOutput> {
    let dir = output_dir(ctx);
    create_output_dir(&dir)?;

    let (new_r2, r3) = output_files(ctx, &dir);
    command(ctx, r2)?.run_checked(ctx.keep_lines())?;
    ensure_artifact(STAGE, &new_r2)?;
    ensure_artifact(STAGE, &r3)?;

    let reads = if ctx.config.verify_read_counts {
        let (input, (genomic, barcodes)) = rayon::join(
            || count_reads(r2),
            || rayon::join(|| count_reads(&new_r2), || count_reads(&r3)),
        );
        let (input, genomic, barcodes) = (input?, genomic?, barcodes?);
        if genomic != barcodes || genomic != input {
            return Err(PipelineError::SplitCardinality {
                input,
                r2: genomic,
                r3: barcodes,
            }
            .into());
        }
        info!("Split {} reads into genomic and barcode reads", genomic);
        Some(genomic)
    } else {
        None
    };

    Ok(SplitOutput {
        dir: Artifact::new(
            &dir,
            RemotePath::dir(&ctx.run_id, Category::CellrangerInputs),
        ),
        r2: new_r2,
        r3,
        reads,
    })
}
