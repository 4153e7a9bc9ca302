//! CLI commands

pub mod diff;
pub mod render;
pub mod validate;
pub mod values;

use console::style;
use stackchart_core::ConfigTree;
use std::path::Path;

use crate::error::Result;

/// Load a project configuration, reporting the path in debug mode
pub(crate) fn load_config(path: &Path, debug: bool) -> Result<ConfigTree> {
    let tree = ConfigTree::from_file(path)?;

    if debug {
        eprintln!(
            "{} Loaded project {} v{} from {}",
            style("DEBUG").dim(),
            tree.project.name,
            tree.project.version,
            path.display()
        );
    }

    Ok(tree)
}
