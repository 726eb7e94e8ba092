use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use spatial_atac::run_id::parse_run_id;
use spatial_atac::{
    LaunchPlan, LocalStore, Pipeline, PipelineConfig, PipelineError, ReadPair, RunId, Species,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Spatial ATAC-seq pre-processing: linker filtering, barcode splitting and cellranger-atac count"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline on one pair of FASTQ files
    Run(RunArgs),
    /// Run the pipeline on the canned D01033_NG01681 test data (human)
    TestData(CommonArgs),
    /// List the supported species and their reference packages
    References,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Read 1, must contain genomic sequence
    #[arg(long)]
    r1: PathBuf,

    /// Read 2, must contain the barcode sequences and end with >35bp of genomic sequence
    #[arg(long)]
    r2: PathBuf,

    /// ATX run id in Dxxxxx_NGxxxxx format; must match the prefix of the input FASTQs
    #[arg(long, value_parser = parse_run_id)]
    run_id: RunId,

    /// Reference genome for cellranger-atac
    #[arg(long, value_enum)]
    species: Species,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// TOML file overriding tool locations and resource settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scratch directory for stage-local files (overrides the config file)
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Directory the runs/<run id>/ namespace is published under (overrides the config file)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Print the tool invocations without executing anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Verbose output (debug logging, including tool stderr)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl CommonArgs {
    fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(dir) = &self.store {
            config.store_root = dir.clone();
        }
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().filter_or("SPATIAL_ATAC_LOG", level);
    env_logger::Builder::from_env(env)
        .format_target(false)
        .init();
}

fn execute(
    common: &CommonArgs,
    plan: impl FnOnce(&LocalStore) -> Result<LaunchPlan>,
) -> Result<()> {
    let config = common.load_config()?;
    let store = LocalStore::new(config.store_root.clone());
    let LaunchPlan {
        reads,
        run_id,
        species,
    } = plan(&store)?;
    let mut pipeline = Pipeline::new(run_id, species, config, &store)?;

    if common.dry_run {
        reads.ensure_exists()?;
        for cmd in pipeline.plan(&reads)? {
            println!("{cmd}");
        }
        return Ok(());
    }

    let output = pipeline.run(&reads)?;
    println!(
        "{}\t{}",
        output.outs().remote,
        store.path_of(&output.outs().remote).display()
    );
    Ok(())
}

fn print_references() {
    for species in Species::ALL {
        println!("{}\t{}", species, species.reference());
    }
}

/// Render an error and its causes, one per line.
fn error_chain(err: &anyhow::Error) -> String {
    err.chain()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n\tCaused by: ")
}

/// Exit code of the failing tool, if the failure came from one.
fn tool_exit_code(err: &anyhow::Error) -> Option<u8> {
    err.downcast_ref::<PipelineError>()
        .and_then(PipelineError::tool_exit_code)
        .and_then(|c| u8::try_from(c).ok())
        .filter(|c| *c != 0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run(args) => {
            init_logging(args.common.verbose);
            execute(&args.common, |_| {
                Ok(LaunchPlan {
                    reads: ReadPair::new(&args.r1, &args.r2),
                    run_id: args.run_id.clone(),
                    species: args.species,
                })
            })
        }
        Commands::TestData(common) => {
            init_logging(common.verbose);
            execute(common, |store| LaunchPlan::test_data(store))
        }
        Commands::References => {
            print_references();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {}", error_chain(&e));
            tool_exit_code(&e).map_or(ExitCode::FAILURE, ExitCode::from)
        }
    }
}
