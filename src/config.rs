use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Tunable parameters of the pipeline.
///
/// All hardware-specific knobs (threads, cores, memory) and tool locations live
/// here instead of in the command construction of the stages. Every field has a
/// default, so an empty TOML file yields the standard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Scratch directory for stage-local files.
    pub work_dir: PathBuf,
    /// Root directory the `runs/<run id>/...` namespace is published under.
    pub store_root: PathBuf,
    /// Count records after each stage and check the stage contracts.
    ///
    /// This decompresses and parses both inputs and every intermediate file
    /// once more, which on a full sequencing run costs minutes of CPU per
    /// stage. Turn it off for very large inputs.
    pub verify_read_counts: bool,
    /// How many trailing stderr lines of a failed tool to keep in the error.
    pub diagnostic_lines: usize,
    pub filter: FilterConfig,
    pub splitter: SplitterConfig,
    pub count: CountConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            work_dir: PathBuf::from("."),
            store_root: PathBuf::from("published"),
            verify_read_counts: true,
            diagnostic_lines: 40,
            filter: FilterConfig::default(),
            splitter: SplitterConfig::default(),
            count: CountConfig::default(),
        }
    }
}

/// Settings for the two linker passes of `bbduk.sh`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Launcher for the filter tool: program followed by any fixed leading arguments.
    pub command: Vec<String>,
    /// k-mer length used to match the linker literal.
    pub kmer: usize,
    /// Hamming distance allowed when matching the linker.
    pub hamming_distance: u32,
    /// JVM heap size such as `100g`; passed as `-Xmx`/`-Xms` when set.
    pub java_heap: Option<String>,
    pub linker1: LinkerPass,
    pub linker2: LinkerPass,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            command: vec!["bbmap/bbduk.sh".to_string()],
            kmer: 30,
            hamming_distance: 3,
            java_heap: None,
            linker1: LinkerPass {
                literal: "GTGGCCGATGTTTCGCATCGGCGTACGACT".to_string(),
                restrict_left: 103,
                threads: 86,
            },
            linker2: LinkerPass {
                literal: "ATCCACGTGCTTGAGAGGCCAGAGCATTCG".to_string(),
                restrict_left: 65,
                threads: 46,
            },
        }
    }
}

/// One keep-matching pass over read 2.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkerPass {
    /// Linker sequence a read must contain to survive the pass.
    pub literal: String,
    /// Only the first `restrict_left` bases of read 2 are searched.
    pub restrict_left: usize,
    pub threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitterConfig {
    /// Launcher for the barcode splitter, e.g. `["python", "bc_process.py"]`.
    pub command: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        SplitterConfig {
            command: vec!["python".to_string(), "bc_process.py".to_string()],
        }
    }
}

/// Settings for `cellranger-atac count`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CountConfig {
    /// Launcher for the counting tool. It runs from the work directory; a
    /// relative program path is taken relative to the directory the pipeline
    /// was started from, but leading arguments are passed as given.
    pub command: Vec<String>,
    /// Passed as `--localcores`.
    pub local_cores: usize,
    /// Passed as `--localmem`, in GB.
    pub local_mem_gb: usize,
    /// Passed as `--force-cells`. Fixed by the experimental design, not derived from the data.
    pub force_cells: usize,
    /// Directory holding the reference packages. When unset the package name is
    /// passed as-is and resolved by the tool relative to the work directory.
    pub reference_dir: Option<PathBuf>,
}

impl Default for CountConfig {
    fn default() -> Self {
        CountConfig {
            command: vec!["cellranger-atac-2.1.0/cellranger-atac".to_string()],
            local_cores: 96,
            local_mem_gb: 192,
            force_cells: 2500,
            reference_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Read a configuration from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        let config: PipelineConfig =
            toml::from_str(&s).with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, fall back to the defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_toml_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Check the values that would otherwise only fail deep inside an external tool.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, command) in [
            ("filter", &self.filter.command),
            ("splitter", &self.splitter.command),
            ("count", &self.count.command),
        ] {
            if command.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(PipelineError::invalid_config(format!(
                    "{name}.command must name a program"
                )));
            }
        }

        if self.filter.kmer == 0 {
            return Err(PipelineError::invalid_config("filter.kmer must be positive"));
        }
        for (name, pass) in [("linker1", &self.filter.linker1), ("linker2", &self.filter.linker2)] {
            pass.validate(name, self.filter.kmer)?;
        }

        let count = &self.count;
        if count.local_cores == 0 || count.local_mem_gb == 0 || count.force_cells == 0 {
            return Err(PipelineError::invalid_config(
                "count.local_cores, count.local_mem_gb and count.force_cells must be positive",
            ));
        }
        Ok(())
    }
}

impl LinkerPass {
    fn validate(&self, name: &str, kmer: usize) -> Result<(), PipelineError> {
        let len = self.literal.len();
        if len == 0
            || !self
                .literal
                .bytes()
                .all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'N'))
        {
            return Err(PipelineError::invalid_config(format!(
                "filter.{name}.literal must be a non-empty uppercase ACGTN sequence"
            )));
        }
        if kmer > len {
            return Err(PipelineError::invalid_config(format!(
                "filter.kmer ({kmer}) is longer than filter.{name}.literal ({len} bp)"
            )));
        }
        if self.restrict_left < len {
            return Err(PipelineError::invalid_config(format!(
                "filter.{name}.restrict_left ({}) cannot hold the {len} bp linker",
                self.restrict_left
            )));
        }
        if self.threads == 0 {
            return Err(PipelineError::invalid_config(format!(
                "filter.{name}.threads must be positive"
            )));
        }
        Ok(())
    }
}
