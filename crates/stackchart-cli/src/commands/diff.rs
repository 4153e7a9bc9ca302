//! Diff command - report drift between the configuration and the chart on disk

use console::style;
use stackchart_core::Scope;
use stackchart_engine::{ChartRenderer, DriftKind, diff_against_disk};
use std::path::Path;

use crate::commands::load_config;
use crate::error::{CliError, Result};

pub fn run(config: &Path, output: &Path, scope: Scope, debug: bool) -> Result<()> {
    let tree = load_config(config, debug)?;
    let chart = ChartRenderer::new(scope).render(&tree)?;
    let report = diff_against_disk(&chart, output)?;

    if report.is_clean() {
        println!(
            "{} Chart {} is up to date",
            style("✓").green().bold(),
            output.join(&chart.name).display()
        );
        return Ok(());
    }

    for entry in &report.entries {
        let marker = match entry.kind {
            DriftKind::Added => style(entry.kind.to_string()).green(),
            DriftKind::Removed => style(entry.kind.to_string()).red(),
            DriftKind::Modified => style(entry.kind.to_string()).yellow(),
        };
        println!("{} {}", marker, entry.path);

        if let Some(diff) = &entry.diff {
            for line in diff.lines() {
                let line = if line.starts_with('+') && !line.starts_with("+++") {
                    style(line).green()
                } else if line.starts_with('-') && !line.starts_with("---") {
                    style(line).red()
                } else {
                    style(line).dim()
                };
                println!("    {}", line);
            }
        }
    }

    println!();
    println!(
        "{} added, {} removed, {} modified",
        report.count(DriftKind::Added),
        report.count(DriftKind::Removed),
        report.count(DriftKind::Modified)
    );

    Err(CliError::Drift {
        path: output.join(&chart.name).display().to_string(),
        changed: report.entries.len(),
    })
}
