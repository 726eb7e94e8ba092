//! End-to-end runs with the three external tools replaced by small `sh` scripts.
#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

use spatial_atac::{
    ArtifactStore, LocalStore, Pipeline, PipelineConfig, PipelineError, PipelineState, ReadPair,
    RunId, Species,
};

const RUN_ID: &str = "D01033_NG01681";

/// Keep-matching stand-in: every pass drops the last read pair.
const FAKE_BBDUK: &str = r##"
for a in "$@"; do
  case "$a" in
    in1=*) in1="${a#in1=}" ;;
    in2=*) in2="${a#in2=}" ;;
    outm1=*) outm1="${a#outm1=}" ;;
    outm2=*) outm2="${a#outm2=}" ;;
    stats=*) stats="${a#stats=}" ;;
  esac
done
n=$(( $(wc -l < "$in1") - 4 ))
if [ "$n" -lt 0 ]; then n=0; fi
head -n "$n" "$in1" > "$outm1"
head -n "$n" "$in2" > "$outm2"
echo "#Matched $((n / 4))" > "$stats"
"##;

/// Copies read 2 as the genomic read and keeps the first 16 bases as the barcode read.
const FAKE_SPLITTER: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --input) in="$2"; shift ;;
    --output_R2) r2="$2"; shift ;;
    --output_R3) r3="$2"; shift ;;
  esac
  shift
done
cp "$in" "$r2"
awk 'NR % 4 == 2 || NR % 4 == 0 { print substr($0, 1, 16); next } { print }' "$in" > "$r3"
"#;

/// Refuses to run unless R1, R2 and R3 are all in the --fastqs directory.
const FAKE_CELLRANGER: &str = r#"
for a in "$@"; do
  case "$a" in
    --id=*) id="${a#--id=}" ;;
    --fastqs=*) fastqs="${a#--fastqs=}" ;;
  esac
done
for r in R1_001.fastq.gz R2_001.fastq R3_001.fastq; do
  if [ ! -f "$fastqs/${id}_S1_L001_$r" ]; then
    echo "missing $r in $fastqs" >&2
    exit 2
  fi
done
mkdir -p "$id/outs"
echo "Estimated number of cells,2500" > "$id/outs/summary.csv"
"#;

struct Fixture {
    tmp: TempDir,
    reads: ReadPair,
}

impl Fixture {
    fn new(read_pairs: usize) -> Self {
        let tmp = tempdir().expect("create temp dir");
        let root = tmp.path();
        for (name, body) in [
            ("bbduk.sh", FAKE_BBDUK),
            ("bc_process.sh", FAKE_SPLITTER),
            ("cellranger-atac.sh", FAKE_CELLRANGER),
        ] {
            fs::write(root.join(name), body).unwrap();
        }

        let inputs = root.join("inputs");
        fs::create_dir(&inputs).unwrap();
        let reads = ReadPair::new(
            inputs.join(format!("{RUN_ID}_S3_L001_R1_001.fastq.gz")),
            inputs.join(format!("{RUN_ID}_S3_L001_R2_001.fastq.gz")),
        );
        fs::write(&reads.r1, fastq(read_pairs, "ACGTTGCAACGTTGCAACGTTGCA")).unwrap();
        fs::write(
            &reads.r2,
            fastq(
                read_pairs,
                "ACGTACGTGTGGCCGATGTTTCGCATCGGCGTACGACTTTTTTTTTATCCACGTGCTTGAGAGGCCAGAGCATTCGAAAA",
            ),
        )
        .unwrap();

        Fixture { tmp, reads }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    fn config(&self) -> PipelineConfig {
        let launcher = |script: &str| vec!["sh".to_string(), self.path(script).display().to_string()];
        let mut config = PipelineConfig::default();
        config.work_dir = self.path("work");
        config.store_root = self.path("store");
        config.filter.command = launcher("bbduk.sh");
        config.splitter.command = launcher("bc_process.sh");
        config.count.command = launcher("cellranger-atac.sh");
        config
    }

    fn config_toml(&self) -> PathBuf {
        let path = self.path("pipeline.toml");
        let body = format!(
            r#"
work_dir = "{work}"
store_root = "{store}"

[filter]
command = ["sh", "{bbduk}"]

[splitter]
command = ["sh", "{split}"]

[count]
command = ["sh", "{count}"]
"#,
            work = self.path("work").display(),
            store = self.path("store").display(),
            bbduk = self.path("bbduk.sh").display(),
            split = self.path("bc_process.sh").display(),
            count = self.path("cellranger-atac.sh").display(),
        );
        fs::write(&path, body).unwrap();
        path
    }
}

/// Plain-text FASTQ; the reader sniffs compression, so `.fastq.gz` names are fine.
fn fastq(n: usize, seq: &str) -> String {
    let qual = "I".repeat(seq.len());
    (0..n)
        .map(|i| format!("@read{i}\n{seq}\n+\n{qual}\n"))
        .collect()
}

fn run_id() -> RunId {
    RunId::new(RUN_ID).unwrap()
}

#[test]
fn test_full_run_publishes_outs() {
    let fx = Fixture::new(5);
    let config = fx.config();
    let store = LocalStore::new(&config.store_root);

    let mut pipeline = Pipeline::new(run_id(), Species::Human, config, &store).unwrap();
    let output = pipeline.run(&fx.reads).expect("pipeline failed");
    assert_eq!(pipeline.state(), PipelineState::End);

    // terminal artifact
    assert_eq!(output.outs().remote.to_string(), "runs/D01033_NG01681/outs/");
    let outs = store.locate(&output.outs().remote).unwrap();
    assert!(outs.join("summary.csv").is_file());

    // keep-matching passes only shrink the read set
    assert_eq!(output.filter.input_reads, Some(5));
    let kept: Vec<Option<u64>> = output.filter.passes.iter().map(|p| p.reads).collect();
    assert_eq!(kept, [Some(4), Some(3)]);
    assert_eq!(output.split.reads, Some(3));

    // everything published lives under runs/<run id>/
    let published = fx.path("store").join("runs");
    let runs: Vec<_> = fs::read_dir(&published).unwrap().collect();
    assert_eq!(runs.len(), 1);
    for artifact in [&output.filter.r1, &output.filter.r2, &output.split.dir, output.outs()]
        .into_iter()
        .chain(&output.filter.stats)
    {
        assert!(artifact
            .remote
            .to_string()
            .starts_with("runs/D01033_NG01681/"));
        assert!(store.locate(&artifact.remote).unwrap().exists());
    }

    // R1 from the filter stage merged with R2/R3 from the splitter
    let inputs = published.join(RUN_ID).join("cellranger_inputs");
    for name in [
        "D01033_NG01681_S1_L001_R1_001.fastq.gz",
        "D01033_NG01681_S1_L001_R2_001.fastq",
        "D01033_NG01681_S1_L001_R3_001.fastq",
    ] {
        assert!(inputs.join(name).is_file(), "{name} was not published");
    }
    assert!(published
        .join(RUN_ID)
        .join("preprocessing")
        .join("D01033_NG01681_linker2_R2.fastq.gz")
        .is_file());
    assert!(published
        .join(RUN_ID)
        .join("preprocessing")
        .join("D01033_NG01681_linker1_stats.txt")
        .is_file());
}

#[test]
fn test_rerun_in_same_work_dir_collides() {
    let fx = Fixture::new(3);
    let config = fx.config();
    let store = LocalStore::new(&config.store_root);

    Pipeline::new(run_id(), Species::Mouse, config.clone(), &store)
        .unwrap()
        .run(&fx.reads)
        .unwrap();

    let mut second = Pipeline::new(run_id(), Species::Mouse, config, &store).unwrap();
    let err = second.run(&fx.reads).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::OutputExists { .. })
    ));
    assert_eq!(second.state(), PipelineState::Filtered);
}

#[test]
fn test_failing_filter_stops_the_run() {
    let fx = Fixture::new(3);
    let mut config = fx.config();
    config.filter.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo 'java.lang.OutOfMemoryError' >&2; exit 3".to_string(),
    ];
    let store = LocalStore::new(&config.store_root);

    let mut pipeline = Pipeline::new(run_id(), Species::Human, config, &store).unwrap();
    let err = pipeline.run(&fx.reads).unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::ToolFailed {
            code, diagnostics, ..
        }) => {
            assert_eq!(*code, Some(3));
            assert_eq!(diagnostics, &["java.lang.OutOfMemoryError"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Start);
    assert!(!fx.path("work").join("cellranger_inputs").exists());
    assert!(!fx.path("store").exists());
}

#[test]
fn test_counting_failure_is_typed() {
    let fx = Fixture::new(2);
    let mut config = fx.config();
    config.count.command = vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()];
    let store = LocalStore::new(&config.store_root);

    let mut pipeline = Pipeline::new(run_id(), Species::Human, config, &store).unwrap();
    let err = pipeline.run(&fx.reads).unwrap_err();
    assert_eq!(
        err.downcast_ref::<PipelineError>()
            .and_then(PipelineError::tool_exit_code),
        Some(1)
    );
    assert_eq!(pipeline.state(), PipelineState::Split);
}

fn cli() -> std::process::Command {
    use assert_cmd::cargo;
    std::process::Command::new(cargo::cargo_bin!(env!("CARGO_PKG_NAME")))
}

#[test]
fn test_main_cli_runs_pipeline() -> Result<(), Box<dyn std::error::Error>> {
    use assert_cmd::assert::OutputAssertExt;
    use predicates::prelude::*;

    let fx = Fixture::new(4);
    let mut cmd = cli();
    cmd.arg("run")
        .arg("--r1")
        .arg(&fx.reads.r1)
        .arg("--r2")
        .arg(&fx.reads.r2)
        .arg("--run-id")
        .arg(RUN_ID)
        .arg("--species")
        .arg("human")
        .arg("--config")
        .arg(fx.config_toml());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("runs/D01033_NG01681/outs/"));

    assert!(fx
        .path("store")
        .join("runs")
        .join(RUN_ID)
        .join("outs")
        .join("summary.csv")
        .is_file());
    Ok(())
}

#[test]
fn test_main_cli_rejects_bad_run_id_before_any_tool() -> Result<(), Box<dyn std::error::Error>> {
    use assert_cmd::assert::OutputAssertExt;
    use predicates::prelude::*;

    let fx = Fixture::new(2);
    let mut cmd = cli();
    cmd.arg("run")
        .arg("--r1")
        .arg(&fx.reads.r1)
        .arg("--r2")
        .arg(&fx.reads.r2)
        .arg("--run-id")
        .arg("D01033-NG01681")
        .arg("--species")
        .arg("human")
        .arg("--config")
        .arg(fx.config_toml());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Dxxxxx_NGxxxxx"));

    assert!(!fx.path("work").exists());
    assert!(!fx.path("store").exists());
    Ok(())
}

#[test]
fn test_main_cli_propagates_tool_exit_code() -> Result<(), Box<dyn std::error::Error>> {
    use assert_cmd::assert::OutputAssertExt;
    use predicates::prelude::*;

    let fx = Fixture::new(2);
    fs::write(fx.path("bbduk.sh"), "echo 'bbduk exploded' >&2\nexit 4\n")?;
    let mut cmd = cli();
    cmd.arg("run")
        .arg("--r1")
        .arg(&fx.reads.r1)
        .arg("--r2")
        .arg(&fx.reads.r2)
        .arg("--run-id")
        .arg(RUN_ID)
        .arg("--species")
        .arg("mouse")
        .arg("--config")
        .arg(fx.config_toml());
    cmd.assert()
        .code(4)
        .stderr(predicate::str::contains("bbduk exploded"));
    Ok(())
}

#[test]
fn test_main_cli_test_data_dry_run() -> Result<(), Box<dyn std::error::Error>> {
    use assert_cmd::assert::OutputAssertExt;
    use predicates::prelude::*;

    let fx = Fixture::new(1);
    let imports = fx
        .path("store")
        .join("BASESPACE_IMPORTS/projects/PL000121/D01033_NG01681_L1");
    fs::create_dir_all(&imports)?;
    fs::copy(&fx.reads.r1, imports.join("D01033_NG01681_S3_L001_R1_001.fastq.gz"))?;
    fs::copy(&fx.reads.r2, imports.join("D01033_NG01681_S3_L001_R2_001.fastq.gz"))?;

    let mut cmd = cli();
    cmd.arg("test-data")
        .arg("--config")
        .arg(fx.config_toml())
        .arg("--dry-run");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("literal=GTGGCCGATGTTTCGCATCGGCGTACGACT"))
        .stdout(predicate::str::contains("literal=ATCCACGTGCTTGAGAGGCCAGAGCATTCG"))
        .stdout(predicate::str::contains("--output_R3"))
        .stdout(predicate::str::contains(
            "--reference=refdata-cellranger-arc-GRCh38-2020-A-2.0.0",
        ));

    // nothing executed
    assert!(!fx.path("work").exists());
    assert!(!fx.path("store").join("runs").exists());
    Ok(())
}

#[test]
fn test_main_cli_lists_references() {
    use assert_cmd::assert::OutputAssertExt;
    use predicates::prelude::*;

    cli()
        .arg("references")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "mouse\trefdata-cellranger-arc-mm10-2020-A-2.0.0",
        ))
        .stdout(predicate::str::contains(
            "human\trefdata-cellranger-arc-GRCh38-2020-A-2.0.0",
        ));
}


/// Prepended to the counting stand-in: the reference must be a reachable directory.
const REQUIRE_REFERENCE: &str = r#"
for a in "$@"; do
  case "$a" in
    --reference=*) reference="${a#--reference=}" ;;
  esac
done
if [ ! -d "$reference" ]; then
  echo "no reference at $reference" >&2
  exit 3
fi
"#;

#[test]
fn test_main_cli_relative_launchers_with_separate_work_dir() -> Result<(), Box<dyn std::error::Error>>
{
    use assert_cmd::assert::OutputAssertExt;
    use predicates::prelude::*;
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new(3);
    let tools = fx.path("tools");
    fs::create_dir(&tools)?;
    for (name, body) in [
        ("bbduk.sh", FAKE_BBDUK.to_string()),
        ("split.sh", FAKE_SPLITTER.to_string()),
        ("count.sh", format!("{REQUIRE_REFERENCE}{FAKE_CELLRANGER}")),
    ] {
        let script = tools.join(name);
        fs::write(&script, format!("#!/bin/sh\n{body}"))?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
    }
    // reference package next to the tools, as in a standard install
    fs::create_dir(fx.path(Species::Human.reference()))?;

    let config = fx.path("relative.toml");
    fs::write(
        &config,
        format!(
            r#"
work_dir = "{work}"
store_root = "{store}"

[filter]
command = ["tools/bbduk.sh"]

[splitter]
command = ["tools/split.sh"]

[count]
command = ["tools/count.sh"]
"#,
            work = fx.path("scratch").display(),
            store = fx.path("store").display(),
        ),
    )?;

    let mut cmd = cli();
    cmd.current_dir(fx.tmp.path())
        .arg("run")
        .arg("--r1")
        .arg(&fx.reads.r1)
        .arg("--r2")
        .arg(&fx.reads.r2)
        .arg("--run-id")
        .arg(RUN_ID)
        .arg("--species")
        .arg("human")
        .arg("--config")
        .arg(&config);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("runs/D01033_NG01681/outs/"));

    assert!(fx
        .path("scratch")
        .join(RUN_ID)
        .join("outs")
        .join("summary.csv")
        .is_file());
    assert!(fx
        .path("store")
        .join("runs")
        .join(RUN_ID)
        .join("outs")
        .join("summary.csv")
        .is_file());
    Ok(())
}
