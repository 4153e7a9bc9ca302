//! Render command - emit the chart and write it to disk

use console::style;
use stackchart_core::Scope;
use stackchart_engine::{ArtifactWriter, ChartRenderer, RenderedChart};
use std::io::Write;
use std::path::Path;

use crate::commands::load_config;
use crate::error::Result;
use crate::util::{pluralize, truncate_hash};

pub fn run(
    config: &Path,
    output: &Path,
    scope: Scope,
    to_stdout: bool,
    show_values: bool,
    debug: bool,
) -> Result<()> {
    let tree = load_config(config, debug)?;
    let chart = ChartRenderer::new(scope).render(&tree)?;

    if debug {
        for artifact in &chart.artifacts {
            eprintln!(
                "{} {} ({} bytes, sha256 {})",
                style("DEBUG").dim(),
                artifact.path,
                artifact.content.len(),
                truncate_hash(&artifact.sha256(), 12)
            );
        }
    }

    if to_stdout {
        return print_chart(&chart, show_values);
    }

    if show_values {
        println!("{}", style("# Computed values").dim());
        print!("{}", chart.values.to_yaml()?);
        println!();
    }

    println!(
        "{} Rendering chart {} v{} (scope: {})",
        style("→").blue(),
        style(&chart.name).cyan(),
        tree.project.version,
        scope
    );

    let report = ArtifactWriter::new(output).write(&chart)?;

    if report.replaced {
        println!(
            "  {} Replaced previous chart at {}",
            style("→").blue(),
            report.chart_dir.display()
        );
    }
    println!(
        "{} Wrote {} to {} (digest {})",
        style("✓").green().bold(),
        pluralize(report.files, "file", "files"),
        report.chart_dir.display(),
        truncate_hash(&report.digest, 12)
    );

    Ok(())
}

/// Print every artifact as a multi-document stream
fn print_chart(chart: &RenderedChart, show_values: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();

    if show_values {
        writeln!(stdout, "# Computed values")?;
        write!(stdout, "{}", chart.values.to_yaml()?)?;
    }

    for artifact in &chart.artifacts {
        writeln!(stdout, "---")?;
        writeln!(stdout, "# Source: {}", artifact.path)?;
        stdout.write_all(&artifact.content)?;
        if !artifact.content.ends_with(b"\n") {
            writeln!(stdout)?;
        }
    }

    stdout.flush()?;
    Ok(())
}
