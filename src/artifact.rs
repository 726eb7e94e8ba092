use anyhow::{Context, Result};
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::run_id::RunId;

/// Top-level folders of a run in the published namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Preprocessing,
    CellrangerInputs,
    Outs,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Preprocessing => "preprocessing",
            Category::CellrangerInputs => "cellranger_inputs",
            Category::Outs => "outs",
        }
    }
}

/// A location in the durable namespace: `runs/<run id>/<category>/[<name>]`.
///
/// Without a name it addresses the whole category folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    run_id: RunId,
    category: Category,
    name: Option<String>,
}

impl RemotePath {
    pub fn file(run_id: &RunId, category: Category, name: &str) -> Self {
        RemotePath {
            run_id: run_id.clone(),
            category,
            name: Some(name.to_string()),
        }
    }

    pub fn dir(run_id: &RunId, category: Category) -> Self {
        RemotePath {
            run_id: run_id.clone(),
            category,
            name: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Relative path components, for stores that mirror the namespace on disk.
    pub fn to_relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from("runs");
        path.push(self.run_id.as_str());
        path.push(self.category.as_str());
        if let Some(name) = &self.name {
            path.push(name);
        }
        path
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runs/{}/{}/", self.run_id, self.category.as_str())?;
        if let Some(name) = &self.name {
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// A stage output: where it was written locally and where it is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub local: PathBuf,
    pub remote: RemotePath,
}

impl Artifact {
    pub fn new<P: Into<PathBuf>>(local: P, remote: RemotePath) -> Self {
        Artifact {
            local: local.into(),
            remote,
        }
    }
}

/// Durable storage for run artifacts.
pub trait ArtifactStore {
    /// Copy one file to its remote location.
    fn publish_file(&self, artifact: &Artifact) -> Result<()>;

    /// Copy a directory's contents into its remote location, merging with
    /// whatever is already there.
    fn publish_dir(&self, artifact: &Artifact) -> Result<()>;

    /// A readable local path for a key of the store, such as an import path.
    fn localize(&self, key: &str) -> Result<PathBuf>;

    /// A readable local path for a published location.
    fn locate(&self, remote: &RemotePath) -> Result<PathBuf> {
        self.localize(&remote.to_relative_path().to_string_lossy())
    }

    fn publish(&self, artifact: &Artifact) -> Result<()> {
        if artifact.local.is_dir() {
            self.publish_dir(artifact)
        } else {
            self.publish_file(artifact)
        }
    }
}

/// A store that mirrors the namespace below a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        LocalStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `remote` lives on disk.
    pub fn path_of(&self, remote: &RemotePath) -> PathBuf {
        self.root.join(remote.to_relative_path())
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

impl ArtifactStore for LocalStore {
    fn publish_file(&self, artifact: &Artifact) -> Result<()> {
        let dest = self.path_of(&artifact.remote);
        copy_file(&artifact.local, &dest)?;
        info!("Published {} -> {}", artifact.local.display(), artifact.remote);
        Ok(())
    }

    fn publish_dir(&self, artifact: &Artifact) -> Result<()> {
        let dest = self.path_of(&artifact.remote);
        fs::create_dir_all(&dest).with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut copied = 0usize;
        for entry in WalkDir::new(&artifact.local).min_depth(1) {
            let entry = entry
                .with_context(|| format!("Failed to walk {}", artifact.local.display()))?;
            let relative = entry.path().strip_prefix(&artifact.local)?;
            let target = dest.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)
                    .with_context(|| format!("Failed to create {}", target.display()))?;
            } else {
                copy_file(entry.path(), &target)?;
                copied += 1;
            }
        }
        debug!("Merged {} files into {}", copied, dest.display());
        info!("Published {} -> {}", artifact.local.display(), artifact.remote);
        Ok(())
    }

    fn localize(&self, key: &str) -> Result<PathBuf> {
        let relative = key.trim_start_matches('/');
        Ok(self.root.join(relative))
    }
}
