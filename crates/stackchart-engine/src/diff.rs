//! Drift detection between a rendered chart and the copy on disk

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use similar::TextDiff;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::renderer::RenderedChart;

/// How an artifact differs from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    /// Rendered but not on disk
    Added,
    /// On disk but no longer rendered
    Removed,
    Modified,
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Added => "+",
            Self::Removed => "-",
            Self::Modified => "~",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    /// Path relative to the output root
    pub path: String,
    pub kind: DriftKind,
    /// Unified diff, for modified text files
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub entries: Vec<Drift>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: DriftKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }
}

/// Compare `chart` with what is currently under `root`
pub fn diff_against_disk(chart: &RenderedChart, root: &Path) -> Result<DriftReport> {
    let mut entries = Vec::new();
    let mut rendered = BTreeSet::new();

    for artifact in &chart.artifacts {
        rendered.insert(artifact.path.clone());
        let path = root.join(&artifact.path);

        if !path.is_file() {
            entries.push(Drift {
                path: artifact.path.clone(),
                kind: DriftKind::Added,
                diff: None,
            });
            continue;
        }

        let existing = fs::read(&path).map_err(|e| EngineError::io(&path, e))?;
        if existing == artifact.content {
            continue;
        }

        let diff = match (std::str::from_utf8(&existing), artifact.as_str()) {
            (Ok(old), Some(new)) => Some(unified_diff(&artifact.path, old, new)),
            _ => None,
        };
        entries.push(Drift {
            path: artifact.path.clone(),
            kind: DriftKind::Modified,
            diff,
        });
    }

    let chart_dir = root.join(&chart.name);
    if chart_dir.is_dir() {
        for entry in WalkDir::new(&chart_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| EngineError::io(&chart_dir, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !rendered.contains(&relative) {
                entries.push(Drift {
                    path: relative,
                    kind: DriftKind::Removed,
                    diff: None,
                });
            }
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(DriftReport { entries })
}

fn unified_diff(path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let (a, b) = (format!("a/{}", path), format!("b/{}", path));
    diff.unified_diff()
        .context_radius(3)
        .header(&a, &b)
        .to_string()
}
