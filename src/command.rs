use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use crate::error::PipelineError;

/// A fully assembled invocation of one external tool.
///
/// Stages build these; nothing is executed until [`ToolCommand::run`] is called,
/// which lets a dry run print exactly what would be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    label: String,
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

/// Outcome of a finished tool process.
#[derive(Debug)]
pub struct Invocation {
    pub status: ExitStatus,
    /// Trailing stderr lines, oldest first.
    pub diagnostics: Vec<String>,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

impl ToolCommand {
    /// Start a command from a launcher: the program followed by fixed leading arguments.
    pub fn new(label: &str, launcher: &[String]) -> Result<Self, PipelineError> {
        let (program, leading) = launcher
            .split_first()
            .ok_or_else(|| PipelineError::invalid_config(format!("no program given for {label}")))?;
        Ok(ToolCommand {
            label: label.to_string(),
            program: program.clone(),
            args: leading.to_vec(),
            current_dir: None,
        })
    }

    pub fn arg<S: Into<String>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Append a bbduk-style `key=value` argument.
    pub fn kv<V: fmt::Display>(&mut self, key: &str, value: V) -> &mut Self {
        self.arg(format!("{key}={value}"))
    }

    /// Append a `--flag=value` argument.
    pub fn flag<V: fmt::Display>(&mut self, name: &str, value: V) -> &mut Self {
        self.arg(format!("--{name}={value}"))
    }

    pub fn current_dir(&mut self, dir: &Path) -> &mut Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn to_command(&self) -> Result<Command> {
        let base = std::env::current_dir()?;
        let mut cmd = Command::new(anchor_program(&self.program, &base));
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    /// Run the tool to completion and report how it exited.
    ///
    /// Stdout is inherited. Stderr is forwarded line by line to the debug log and
    /// the last `keep_lines` lines are returned in the [`Invocation`].
    pub fn run(&self, keep_lines: usize) -> Result<Invocation> {
        info!("[{}] {}", self.label, self);

        let mut child = self
            .to_command()?
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                debug!("spawning {} failed: {}", self.program, e);
                PipelineError::ToolNotExecutable {
                    tool: self.program.clone(),
                }
            })?;

        let spinner = spinner(&self.label);

        let stderr = child.stderr.take();
        let label = self.label.clone();
        let reader = thread::spawn(move || {
            let mut tail = VecDeque::with_capacity(keep_lines);
            if let Some(stderr) = stderr {
                for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                    debug!("[{}] {}", label, line);
                    if keep_lines == 0 {
                        continue;
                    }
                    if tail.len() == keep_lines {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail
        });

        let status = child.wait();
        let diagnostics = reader.join().unwrap_or_default().into();
        spinner.finish_and_clear();
        let status = status?;

        debug!("[{}] exited with {}", self.label, status);
        Ok(Invocation {
            status,
            diagnostics,
        })
    }

    /// Like [`ToolCommand::run`], but a non-zero exit becomes a
    /// [`PipelineError::ToolFailed`].
    pub fn run_checked(&self, keep_lines: usize) -> Result<Invocation> {
        let invocation = self.run(keep_lines)?;
        if !invocation.succeeded() {
            return Err(PipelineError::ToolFailed {
                tool: self.program.clone(),
                cmd: self.to_string(),
                code: invocation.code(),
                diagnostics: invocation.diagnostics,
            }
            .into());
        }
        Ok(invocation)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Program path as spawned. A relative path with a directory component is
/// anchored at `base`, so it keeps pointing at the same file when the tool
/// runs from another working directory. Bare names are left to `PATH` lookup.
fn anchor_program(program: &str, base: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Spinner on stderr while a tool runs; hidden when stderr is not a terminal.
fn spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed_precise}]") {
        pb.set_style(style);
    }
    pb.set_message(format!("running {label}"));
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}
