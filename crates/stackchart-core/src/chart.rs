//! Chart descriptor (`Chart.yaml`)

use serde::Serialize;

use crate::config::ConfigTree;
use crate::error::Result;
use crate::naming::dns_label;

/// Chart API version understood by the target package manager
pub const CHART_API_VERSION: &str = "v2";

/// Version of the generated chart layout, independent of the project version
pub const CHART_VERSION: &str = "0.1.0";

/// Chart type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Application,
}

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDescriptor {
    pub api_version: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub version: String,
    pub app_version: String,
}

impl ChartDescriptor {
    /// Descriptor for a project
    ///
    /// The chart name is the project name normalized to a DNS label, so it can
    /// be used directly as an object-name component.
    pub fn for_project(tree: &ConfigTree) -> Self {
        Self {
            api_version: CHART_API_VERSION.to_string(),
            name: chart_name(tree),
            description: format!("Deployment chart for the {} project", tree.project.name),
            kind: ChartKind::Application,
            version: CHART_VERSION.to_string(),
            app_version: tree.project.version.clone(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Chart name (and output directory name) for a project
pub fn chart_name(tree: &ConfigTree) -> String {
    dns_label(&tree.project.name)
}
