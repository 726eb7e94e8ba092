use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::RunContext;
use crate::artifact::{Artifact, Category, RemotePath};
use crate::command::ToolCommand;
use crate::config::CountConfig;
use crate::error::PipelineError;
use crate::io::ensure_artifact;
use crate::species::Species;

const STAGE: &str = "count";

#[derive(Debug, Clone)]
pub struct CountOutput {
    /// The tool's `<run id>/outs/` directory.
    pub outs: Artifact,
}

/// The `--reference` value for `species`.
///
/// Without a configured reference directory, a package found in the current
/// directory is passed by its full path (the tool runs from the work
/// directory); otherwise the bare package name is passed through.
/// With a reference directory, the package must exist inside it and its full
/// path is returned.
pub fn resolve_reference(config: &CountConfig, species: Species) -> Result<String, PipelineError> {
    match &config.reference_dir {
        None => match Path::new(species.reference()).canonicalize() {
            Ok(p) if p.is_dir() => Ok(p.display().to_string()),
            _ => Ok(species.reference().to_string()),
        },
        Some(dir) => {
            let path = dir.join(species.reference());
            match path.canonicalize() {
                Ok(p) if p.is_dir() => Ok(p.display().to_string()),
                _ => Err(PipelineError::MissingReference { path }),
            }
        }
    }
}

/// Where the tool leaves its results, relative to the work directory it runs in.
pub fn outs_dir(ctx: &RunContext) -> PathBuf {
    ctx.config
        .work_dir
        .join(ctx.run_id.as_str())
        .join("outs")
}

/// The `count` invocation over `fastqs`, run from inside the work directory.
pub fn command(ctx: &RunContext, fastqs: &Path) -> Result<ToolCommand, PipelineError> {
    let count = &ctx.config.count;
    let mut cmd = ToolCommand::new("count", &count.command)?;
    cmd.arg("count")
        .flag("id", &ctx.run_id)
        .flag("reference", resolve_reference(count, ctx.species)?)
        .flag("fastqs", fastqs.display())
        .flag("localcores", count.local_cores)
        .flag("localmem", count.local_mem_gb)
        .flag("force-cells", count.force_cells)
        .current_dir(&ctx.config.work_dir);
    Ok(cmd)
}

/// Align and count the reads of the merged input directory.
pub fn run(ctx: &RunContext, fastqs: &Path) -> Result<CountOutput> {
    // the tool runs from the work directory, so relative inputs would break
    let fastqs = fastqs
        .canonicalize()
        .map_err(|_| PipelineError::MissingInput {
            path: fastqs.to_path_buf(),
        })
        .with_context(|| "Counting input directory is not available")?;

    command(ctx, &fastqs)?.run_checked(ctx.keep_lines())?;

    let outs = outs_dir(ctx);
    ensure_artifact(STAGE, &outs)?;
    Ok(CountOutput {
        outs: Artifact::new(outs, RemotePath::dir(&ctx.run_id, Category::Outs)),
    })
}
