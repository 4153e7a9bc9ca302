//! Values command - print the composed values document

use stackchart_core::{Scope, ValuesComposer};
use std::io::Write;
use std::path::Path;

use crate::commands::load_config;
use crate::error::Result;

pub fn run(config: &Path, scope: Scope) -> Result<()> {
    let tree = load_config(config, false)?;
    tree.validate()?;

    let values = ValuesComposer::new(&tree, scope).compose()?;
    let yaml = values.to_yaml()?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(yaml.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
