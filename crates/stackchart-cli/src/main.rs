//! Stackchart CLI - reproducible Helm charts from one project configuration

use clap::{Parser, Subcommand};
use stackchart_core::Scope;
use std::path::PathBuf;

mod commands;
mod error;
mod exit_codes;
mod util;

#[derive(Parser)]
#[command(name = "stackchart")]
#[command(author = "Stackchart Contributors")]
#[command(version)]
#[command(about = "Generate reproducible Helm charts from a single project configuration", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the chart and write it below the output root
    Render {
        /// Project configuration file
        config: PathBuf,

        /// Output root (the chart lands in <root>/<chart name>)
        #[arg(short, long, env = "STACKCHART_OUTPUT", default_value = "deploy")]
        output: PathBuf,

        /// Scope references are resolved for
        #[arg(long, default_value = "kubernetes")]
        scope: Scope,

        /// Print the artifacts instead of writing them
        #[arg(long)]
        stdout: bool,

        /// Show the composed values document
        #[arg(long)]
        show_values: bool,
    },

    /// Check the configuration and every emitted template
    Validate {
        /// Project configuration file
        config: PathBuf,

        /// Scope references are resolved for
        #[arg(long, default_value = "kubernetes")]
        scope: Scope,

        /// Output validation results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the values document
    Values {
        /// Project configuration file
        config: PathBuf,

        /// Scope references are resolved for
        #[arg(long, default_value = "kubernetes")]
        scope: Scope,
    },

    /// Compare the rendered chart with the one on disk
    Diff {
        /// Project configuration file
        config: PathBuf,

        /// Output root holding the existing chart
        #[arg(short, long, env = "STACKCHART_OUTPUT", default_value = "deploy")]
        output: PathBuf,

        /// Scope references are resolved for
        #[arg(long, default_value = "kubernetes")]
        scope: Scope,
    },
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();

    if cli.debug {
        // SAFETY: We're the only thread at this point (start of main)
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }

    let result = match cli.command {
        Commands::Render {
            config,
            output,
            scope,
            stdout,
            show_values,
        } => commands::render::run(&config, &output, scope, stdout, show_values, cli.debug),

        Commands::Validate {
            config,
            scope,
            json,
        } => commands::validate::run(&config, scope, json, cli.debug),

        Commands::Values { config, scope } => commands::values::run(&config, scope),

        Commands::Diff {
            config,
            output,
            scope,
        } => commands::diff::run(&config, &output, scope, cli.debug),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
