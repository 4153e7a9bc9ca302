//! Stackchart Engine - Helm chart emission
//!
//! This crate turns a [`ConfigTree`](stackchart_core::ConfigTree) into a chart:
//! - `ast` / `builder`: typed Go template construction
//! - `parser` / `lint`: pest-based parsing and structural checks of every template
//! - `TemplateEmitter`: deployment, service, config map, secret and helper templates
//! - `ChartRenderer`: the in-memory pipeline with the residual-reference guard
//! - `ArtifactWriter`: staged, all-or-nothing writes
//! - `diff_against_disk`: drift detection for CI

pub mod ast;
pub mod builder;
pub mod diff;
pub mod emitter;
pub mod error;
pub mod lint;
pub mod parser;
pub mod renderer;
pub mod writer;

pub use builder::TemplateBuilder;
pub use diff::{Drift, DriftKind, DriftReport, diff_against_disk};
pub use emitter::{TEMPLATE_FILES, TemplateEmitter};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use lint::{HELPERS_FILE, check_template, check_templates};
pub use renderer::{ChartRenderer, RenderedChart, guard_artifacts};
pub use writer::{ArtifactWriter, DIR_MODE, FILE_MODE, WriteReport};
