//! Stackchart Core - project configuration and values composition
//!
//! This crate provides the render-independent half of stackchart:
//! - `ConfigTree`: the project configuration (services, environment layers, cluster resources)
//! - `ReferenceResolver`: scoped `${path}` expansion with cycle detection
//! - `ValuesComposer`: the per-service values document, in a stable order
//! - `ChartDescriptor`: `Chart.yaml`
//! - `Artifact`: a rendered file and chart digests

pub mod artifact;
pub mod chart;
pub mod config;
pub mod error;
pub mod naming;
pub mod reference;
mod validation;
pub mod values;

pub use artifact::{Artifact, chart_digest};
pub use chart::{ChartDescriptor, ChartKind, chart_name};
pub use config::{
    BackendPorts, BackendService, ClusterResources, ConfigTree, EnvMap, EnvValue,
    EnvironmentVariables, FrontendPorts, FrontendService, PortSet, ProjectInfo, ScopedValue,
    Service, ServiceEnvironment, ServiceRole,
};
pub use error::{CoreError, ResolveError, Result};
pub use reference::{ReferenceResolver, Scope, contains_reference, find_references};
pub use values::{EnvVar, RenderedValues, ResourceBundle, Resources, ServiceValues, ValuesComposer};
