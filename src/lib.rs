//! Orchestration of the spatial ATAC-seq pre-processing pipeline:
//! linker filtering, barcode splitting and `cellranger-atac count`, with every
//! artifact published under `runs/<run id>/`.

pub mod artifact;
pub mod command;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod run_id;
pub mod species;
pub mod stages;

pub use artifact::{ArtifactStore, LocalStore};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use io::ReadPair;
pub use pipeline::{LaunchPlan, Pipeline, PipelineOutput, PipelineState};
pub use run_id::RunId;
pub use species::Species;
