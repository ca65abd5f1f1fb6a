//! On-disk layout of a generated project.
//!
//! ```text
//! <root>/
//!   src/<unit filenames>
//!   Dockerfile
//!   docker-compose.yml
//!   README.md
//!   DEVELOPER.md
//!   .genloop/            step journal and agent transcripts
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::path::contained_relative_path;
use crate::core::types::{CodeBundle, ContainerArtifacts, Documentation};
use crate::io::sandbox::{COMPOSE_FILE, Deployment, compose_project_name};

/// Paths of everything the pipeline writes for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub src_dir: PathBuf,
    pub dockerfile_path: PathBuf,
    pub compose_path: PathBuf,
    pub readme_path: PathBuf,
    pub developer_path: PathBuf,
    pub state_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: &Path) -> Self {
        let state_dir = root.join(".genloop");
        Self {
            root: root.to_path_buf(),
            src_dir: root.join("src"),
            dockerfile_path: root.join("Dockerfile"),
            compose_path: root.join(COMPOSE_FILE),
            readme_path: root.join("README.md"),
            developer_path: root.join("DEVELOPER.md"),
            state_dir,
        }
    }

    /// Directory holding per-step journal records.
    pub fn steps_dir(&self) -> PathBuf {
        self.state_dir.join("steps")
    }

    /// Directory holding prompts and outputs of one agent call.
    pub fn agent_dir(&self, seq: u32, role: &str) -> PathBuf {
        self.state_dir
            .join("agents")
            .join(format!("{seq:03}-{role}"))
    }

    pub fn outcome_path(&self) -> PathBuf {
        self.state_dir.join("outcome.json")
    }

    pub fn deployment(&self) -> Deployment {
        Deployment {
            project_dir: self.root.clone(),
            project_name: compose_project_name(&self.root),
        }
    }

    /// Create the project root and `src/`.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.src_dir)
            .with_context(|| format!("create directory {}", self.src_dir.display()))
    }

    /// Write every unit under `src/`, creating parent directories as needed.
    ///
    /// Files from earlier bundles are left in place; the container bind mount
    /// keeps pointing at the same directory.
    #[instrument(skip_all, fields(units = bundle.units.len()))]
    pub fn write_bundle(&self, bundle: &CodeBundle) -> Result<Vec<PathBuf>> {
        if bundle.units.is_empty() {
            return Err(anyhow!("refusing to persist an empty code bundle"));
        }
        self.ensure_dirs()?;
        let mut written = Vec::with_capacity(bundle.units.len());
        for unit in &bundle.units {
            let relative = contained_relative_path(&unit.filename).map_err(|err| anyhow!(err))?;
            let path = self.src_dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            fs::write(&path, &unit.code).with_context(|| format!("write {}", path.display()))?;
            debug!(path = %path.display(), "wrote code unit");
            written.push(path);
        }
        Ok(written)
    }

    pub fn write_container(&self, artifacts: &ContainerArtifacts) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create directory {}", self.root.display()))?;
        write_text(&self.dockerfile_path, &artifacts.dockerfile)?;
        write_text(&self.compose_path, &artifacts.compose)
    }

    pub fn write_docs(&self, docs: &Documentation) -> Result<()> {
        write_text(&self.readme_path, &docs.readme)?;
        write_text(&self.developer_path, &docs.developer)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    let mut buf = contents.to_string();
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
