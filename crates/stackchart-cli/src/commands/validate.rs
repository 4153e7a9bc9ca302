//! Validate command - check the configuration without writing anything
//!
//! Runs the full in-memory render, so reference failures and template check
//! failures are reported as well as configuration invariants.

use console::style;
use stackchart_core::{CoreError, Scope};
use stackchart_engine::{ChartRenderer, EngineError};
use std::path::Path;

use crate::commands::load_config;
use crate::error::{CliError, Result};

pub fn run(config: &Path, scope: Scope, json_output: bool, debug: bool) -> Result<()> {
    let tree = load_config(config, debug)?;

    if !json_output {
        println!(
            "{} Validating {} v{} (scope: {})",
            style("→").blue(),
            tree.project.name,
            tree.project.version,
            scope
        );
    }

    let result = ChartRenderer::new(scope).render(&tree);

    if json_output {
        let errors = match &result {
            Ok(_) => Vec::new(),
            Err(err) => error_messages(err),
        };
        let output = serde_json::json!({
            "valid": result.is_ok(),
            "scope": scope.as_str(),
            "project": {
                "name": tree.project.name,
                "version": tree.project.version,
            },
            "digest": result.as_ref().ok().map(|chart| chart.digest()),
            "errors": errors,
        });
        let rendered =
            serde_json::to_string_pretty(&output).map_err(|e| CliError::output(e.to_string()))?;
        println!("{}", rendered);

        if let Err(err) = result {
            std::process::exit(CliError::from(err).exit_code());
        }
        return Ok(());
    }

    let chart = result?;
    println!(
        "  {} {} templates passed their checks",
        style("✓").green(),
        chart.templates().count()
    );
    println!();
    println!("{} Validation passed!", style("✓").green().bold());
    Ok(())
}

/// One message per problem; validation errors carry several
fn error_messages(err: &EngineError) -> Vec<String> {
    match err {
        EngineError::Core(CoreError::Validation { issues }) => issues.clone(),
        other => vec![other.to_string()],
    }
}
