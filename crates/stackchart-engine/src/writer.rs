//! Staged chart writes
//!
//! Artifacts are written into a temporary directory created inside the output
//! root, so the final step is a rename on the same filesystem. If any artifact
//! fails, the staging directory is dropped and the existing chart directory is
//! left untouched.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use stackchart_core::Artifact;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::renderer::{RenderedChart, guard_artifacts};

/// Permission bits for chart directories
pub const DIR_MODE: u32 = 0o755;

/// Permission bits for chart files
pub const FILE_MODE: u32 = 0o644;

/// Outcome of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub chart_dir: PathBuf,
    pub files: usize,
    pub digest: String,
    /// Whether an existing chart directory was replaced
    pub replaced: bool,
}

/// Writes rendered charts below an output root
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write a chart to `<root>/<chart name>`
    pub fn write(&self, chart: &RenderedChart) -> Result<WriteReport> {
        self.write_artifacts(&chart.name, &chart.artifacts)
    }

    /// Write artifacts whose paths all start with `<name>/`
    ///
    /// Either every artifact reaches `<root>/<name>` or none does. Artifacts
    /// still carrying `${...}` syntax are refused before anything is created.
    pub fn write_artifacts(&self, name: &str, artifacts: &[Artifact]) -> Result<WriteReport> {
        guard_artifacts(artifacts)?;
        fs::create_dir_all(&self.root).map_err(|e| EngineError::io(&self.root, e))?;

        let staging = tempfile::Builder::new()
            .prefix(".stackchart-")
            .tempdir_in(&self.root)
            .map_err(|e| EngineError::io(&self.root, e))?;

        let total = artifacts.len();
        for (i, artifact) in artifacts.iter().enumerate() {
            stage_artifact(staging.path(), name, artifact).map_err(|source| EngineError::Write {
                index: i + 1,
                total,
                path: artifact.path.clone(),
                source,
            })?;
            tracing::debug!(path = %artifact.path, bytes = artifact.content.len(), "staged artifact");
        }

        let staged = staging.path().join(name);
        fs::create_dir_all(&staged).map_err(|e| EngineError::io(&staged, e))?;
        set_directory_modes(&staged)?;

        let target = self.root.join(name);
        let replaced = swap_into_place(&staging, &staged, &target)?;

        tracing::info!(
            chart = name,
            files = total,
            path = %target.display(),
            "chart written"
        );

        Ok(WriteReport {
            chart_dir: target,
            files: total,
            digest: stackchart_core::chart_digest(artifacts),
            replaced,
        })
    }
}

fn stage_artifact(staging: &Path, name: &str, artifact: &Artifact) -> io::Result<()> {
    let relative = checked_relative_path(name, &artifact.path)?;
    let path = staging.join(relative);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, &artifact.content)?;
    set_mode(&path, FILE_MODE)
}

/// Reject paths that would land outside `<name>/`
fn checked_relative_path<'a>(name: &str, path: &'a str) -> io::Result<&'a Path> {
    let relative = Path::new(path);
    let mut components = relative.components();

    let inside = matches!(components.next(), Some(Component::Normal(first)) if first == name)
        && components.clone().next().is_some()
        && components.all(|c| matches!(c, Component::Normal(_)));

    if inside {
        Ok(relative)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("artifact path must stay inside `{}/`", name),
        ))
    }
}

fn set_directory_modes(dir: &Path) -> Result<()> {
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            EngineError::io(path, e.into())
        })?;
        if entry.file_type().is_dir() {
            set_mode(entry.path(), DIR_MODE).map_err(|e| EngineError::io(entry.path(), e))?;
        }
    }
    Ok(())
}

/// Move `staged` to `target`, parking any previous chart inside the staging
/// directory so it is removed along with it
fn swap_into_place(staging: &TempDir, staged: &Path, target: &Path) -> Result<bool> {
    let previous = staging.path().join(".previous");
    let replaced = target.exists();

    if replaced {
        fs::rename(target, &previous).map_err(|e| EngineError::io(target, e))?;
    }

    if let Err(e) = fs::rename(staged, target) {
        if replaced {
            if let Err(restore) = fs::rename(&previous, target) {
                tracing::warn!(
                    path = %target.display(),
                    error = %restore,
                    "failed to restore previous chart"
                );
            }
        }
        return Err(EngineError::io(target, e));
    }

    Ok(replaced)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
