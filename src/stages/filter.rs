use anyhow::Result;
use log::info;
use std::path::{Path, PathBuf};

use super::RunContext;
use crate::artifact::{Artifact, Category, RemotePath};
use crate::command::ToolCommand;
use crate::config::LinkerPass;
use crate::error::PipelineError;
use crate::io::{ensure_artifact, ReadPair};

const STAGE: &str = "filter";

/// Result of one linker pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub pass: u8,
    pub output: ReadPair,
    pub stats: PathBuf,
    /// Read pairs that survived, when counting is enabled.
    pub reads: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FilterOutput {
    /// Filtered read 1, published as the final R1 of the counting input.
    pub r1: Artifact,
    /// Filtered read 2, still to be split into genomic and barcode reads.
    pub r2: Artifact,
    /// Per-pass statistics files.
    pub stats: Vec<Artifact>,
    pub passes: Vec<PassReport>,
    /// Read pairs in the unfiltered input, when counting is enabled.
    pub input_reads: Option<u64>,
}

/// Local output files of pass `pass`.
fn pass_output(ctx: &RunContext, pass: u8) -> (ReadPair, PathBuf) {
    let output = ReadPair::new(
        ctx.work_file(&format!("linker{pass}_R1.fastq.gz")),
        ctx.work_file(&format!("linker{pass}_R2.fastq.gz")),
    );
    (output, ctx.work_file(&format!("linker{pass}_stats.txt")))
}

fn pass_command(
    ctx: &RunContext,
    pass: u8,
    linker: &LinkerPass,
    input: &ReadPair,
    output: &ReadPair,
    stats: &Path,
) -> Result<ToolCommand, PipelineError> {
    let filter = &ctx.config.filter;
    let mut cmd = ToolCommand::new(&format!("linker{pass}"), &filter.command)?;
    if let Some(heap) = &filter.java_heap {
        cmd.arg(format!("-Xmx{heap}")).arg(format!("-Xms{heap}"));
    }
    cmd.kv("in1", input.r1.display())
        .kv("in2", input.r2.display())
        .kv("outm1", output.r1.display())
        .kv("outm2", output.r2.display())
        .kv("skipr1", "t")
        .kv("k", filter.kmer)
        .kv("mm", "f")
        .kv("rcomp", "f")
        .kv("restrictleft", linker.restrict_left)
        .kv("hdist", filter.hamming_distance)
        .kv("stats", stats.display())
        .kv("threads", linker.threads)
        .kv("literal", &linker.literal);
    Ok(cmd)
}

/// The two filter invocations, in execution order. Pass 2 reads pass 1's output.
pub fn commands(ctx: &RunContext, input: &ReadPair) -> Result<Vec<ToolCommand>, PipelineError> {
    let filter = &ctx.config.filter;
    let (out1, stats1) = pass_output(ctx, 1);
    let (out2, stats2) = pass_output(ctx, 2);
    Ok(vec![
        pass_command(ctx, 1, &filter.linker1, input, &out1, &stats1)?,
        pass_command(ctx, 2, &filter.linker2, &out1, &out2, &stats2)?,
    ])
}

/// Keep only read pairs whose read 2 carries both linkers.
pub fn run(ctx: &RunContext, input: &ReadPair) -> Result<FilterOutput> {
    let verify = ctx.config.verify_read_counts;
    let input_reads = if verify {
        let n = input.count_reads()?;
        info!("Input holds {} read pairs", n);
        Some(n)
    } else {
        None
    };

    let mut passes = Vec::with_capacity(2);
    let mut previous = input_reads;
    for (pass, cmd) in (1u8..).zip(commands(ctx, input)?) {
        let (output, stats) = pass_output(ctx, pass);
        cmd.run_checked(ctx.keep_lines())?;
        ensure_artifact(STAGE, &output.r1)?;
        ensure_artifact(STAGE, &output.r2)?;

        let reads = if verify {
            let after = output.count_reads()?;
            if let Some(before) = previous {
                if after > before {
                    return Err(PipelineError::ReadCountIncreased {
                        pass,
                        before,
                        after,
                    }
                    .into());
                }
            }
            info!("Linker {} kept {} read pairs", pass, after);
            previous = Some(after);
            Some(after)
        } else {
            None
        };

        passes.push(PassReport {
            pass,
            output,
            stats,
            reads,
        });
    }

    let run_id = &ctx.run_id;
    let last = &passes[passes.len() - 1].output;
    let r1 = Artifact::new(
        &last.r1,
        RemotePath::file(run_id, Category::CellrangerInputs, &run_id.fastq_name(1, "fastq.gz")),
    );
    let r2 = Artifact::new(
        &last.r2,
        RemotePath::file(
            run_id,
            Category::Preprocessing,
            &format!("{run_id}_linker2_R2.fastq.gz"),
        ),
    );
    let stats = passes
        .iter()
        .filter(|p| p.stats.is_file())
        .filter_map(|p| {
            let name = p.stats.file_name()?.to_string_lossy().to_string();
            Some(Artifact::new(
                &p.stats,
                RemotePath::file(run_id, Category::Preprocessing, &name),
            ))
        })
        .collect();

    Ok(FilterOutput {
        r1,
        r2,
        stats,
        passes,
        input_reads,
    })
}
