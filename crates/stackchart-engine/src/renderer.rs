//! In-memory chart rendering
//!
//! `ChartRenderer` runs the whole pipeline without touching the filesystem:
//! validate the configuration, compose the values document, emit and check
//! the templates, then refuse any artifact that still carries a reference
//! expression. Writing is left to [`ArtifactWriter`](crate::writer::ArtifactWriter).

use stackchart_core::{
    Artifact, ChartDescriptor, ConfigTree, RenderedValues, Scope, ValuesComposer, chart_digest,
    find_references,
};

use crate::emitter::TemplateEmitter;
use crate::error::{EngineError, Result};
use crate::lint::check_templates;

/// A fully rendered chart, ready to be written
#[derive(Debug, Clone)]
pub struct RenderedChart {
    /// Chart name, also the directory the chart is written to
    pub name: String,
    pub scope: Scope,
    pub values: RenderedValues,
    /// Chart files in write order, paths relative to the output root
    pub artifacts: Vec<Artifact>,
}

impl RenderedChart {
    /// SHA-256 over every artifact path and content
    pub fn digest(&self) -> String {
        chart_digest(&self.artifacts)
    }

    pub fn artifact(&self, path: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.path == path)
    }

    /// Template artifacts (everything under `templates/`)
    pub fn templates(&self) -> impl Iterator<Item = &Artifact> {
        let prefix = format!("{}/templates/", self.name);
        self.artifacts
            .iter()
            .filter(move |a| a.path.starts_with(&prefix))
    }
}

/// Renders charts for one resolution scope
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartRenderer {
    scope: Scope,
}

impl ChartRenderer {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Render a chart for `tree`
    pub fn render(&self, tree: &ConfigTree) -> Result<RenderedChart> {
        tree.validate()?;
        tracing::debug!(project = %tree.project.name, "configuration validated");

        let values = ValuesComposer::new(tree, self.scope).compose()?;
        tracing::debug!(
            scope = %self.scope,
            backend = values.backend.len(),
            frontend = values.frontend.len(),
            "values composed"
        );

        let descriptor = ChartDescriptor::for_project(tree);
        let name = descriptor.name.clone();

        let mut artifacts = vec![
            Artifact::new(format!("{}/Chart.yaml", name), descriptor.to_yaml()?),
            Artifact::new(format!("{}/values.yaml", name), values.to_yaml()?),
        ];

        let templates: Vec<(String, String)> = TemplateEmitter::new(&name)
            .emit()
            .into_iter()
            .map(|(file, template)| (file.to_string(), template.to_string()))
            .collect();
        check_templates(&templates)?;
        tracing::debug!(templates = templates.len(), "templates emitted and checked");

        artifacts.extend(
            templates
                .into_iter()
                .map(|(file, source)| Artifact::new(format!("{}/templates/{}", name, file), source)),
        );

        guard_artifacts(&artifacts)?;

        Ok(RenderedChart {
            name,
            scope: self.scope,
            values,
            artifacts,
        })
    }
}

/// Fail on the first artifact that still contains `${...}` syntax
///
/// Any delimited span counts, whether or not it parses as an expression.
pub fn guard_artifacts(artifacts: &[Artifact]) -> Result<()> {
    for artifact in artifacts {
        let content = String::from_utf8_lossy(&artifact.content);
        if let Some(expression) = find_references(&content).first() {
            return Err(EngineError::UnresolvedReference {
                path: artifact.path.clone(),
                expression: expression.to_string(),
            });
        }
    }
    Ok(())
}
