//! Project configuration tree
//!
//! The in-memory form of a project file: services, ports, layered environment
//! variables and cluster resources. Loaded once, then shared read-only by every
//! step of a render.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::naming;

/// Scope tag carried by cluster resources (config maps, secrets)
pub const CLUSTER_SCOPE: &str = "kubernetes";

/// Environment variable (or config/secret entry) map as declared in the source
pub type EnvMap = HashMap<String, EnvValue>;

/// Root of the project configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigTree {
    /// Project identity (chart name, registry, version)
    pub project: ProjectInfo,

    /// Backend services by name
    #[serde(default)]
    pub backend: HashMap<String, BackendService>,

    /// Frontend services by name
    #[serde(default)]
    pub frontend: HashMap<String, FrontendService>,

    /// Layered environment variables
    #[serde(default)]
    pub environment: EnvironmentVariables,

    /// Cluster-wide config maps and secrets
    #[serde(default)]
    pub cluster: ClusterResources,
}

/// Project identity
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectInfo {
    /// Project name, used as chart name and helper prefix
    pub name: String,

    /// Image registry host
    pub registry: String,

    /// Semantic version (chart appVersion and image tag)
    pub version: String,
}

/// A deployable service, generic over its port set
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Service<P> {
    /// Declared ports
    pub ports: P,

    /// Replica count (role default when absent)
    #[serde(default)]
    pub replicas: Option<u32>,

    /// Resource requests/limits replacing the role defaults field by field
    #[serde(default)]
    pub resources: Option<ResourceOverrides>,

    /// Per deployment-environment overrides, keyed by environment tag
    #[serde(default)]
    pub overrides: HashMap<String, ServiceOverride>,
}

pub type BackendService = Service<BackendPorts>;
pub type FrontendService = Service<FrontendPorts>;

/// Ports exposed by a backend service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendPorts {
    pub http: u16,
    pub health: u16,
    pub metrics: u16,
}

/// Ports exposed by a frontend service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrontendPorts {
    pub http: u16,
}

/// A named, ordered set of ports
pub trait PortSet {
    /// `(name, port)` pairs in emission order
    fn named(&self) -> Vec<(&'static str, u16)>;

    /// Look up a port by name
    fn get(&self, name: &str) -> Option<u16> {
        self.named()
            .into_iter()
            .find(|(port_name, _)| *port_name == name)
            .map(|(_, port)| port)
    }
}

impl PortSet for BackendPorts {
    fn named(&self) -> Vec<(&'static str, u16)> {
        vec![
            ("http", self.http),
            ("health", self.health),
            ("metrics", self.metrics),
        ]
    }
}

impl PortSet for FrontendPorts {
    fn named(&self) -> Vec<(&'static str, u16)> {
        vec![("http", self.http)]
    }
}

/// Overrides applied when rendering for one deployment environment
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceOverride {
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub resources: Option<ResourceOverrides>,
}

/// Partial resource requirements
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceOverrides {
    #[serde(default)]
    pub requests: Option<QuantityOverrides>,
    #[serde(default)]
    pub limits: Option<QuantityOverrides>,
}

/// Partial cpu/memory quantities
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantityOverrides {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

/// The four environment-variable layers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvironmentVariables {
    /// Applies to every service
    #[serde(default)]
    pub global: EnvMap,

    /// Applies to every backend service
    #[serde(default)]
    pub backend: EnvMap,

    /// Applies to every frontend service
    #[serde(default)]
    pub frontend: EnvMap,

    /// Service-specific layers, keyed by service name
    #[serde(default)]
    pub services: HashMap<String, ServiceEnvironment>,
}

/// Service-specific environment layers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceEnvironment {
    /// Values shared by every deployment environment
    #[serde(default)]
    pub common: EnvMap,

    /// Values for one deployment environment, keyed by environment tag.
    /// These may contain reference expressions.
    #[serde(default)]
    pub environments: HashMap<String, EnvMap>,
}

/// Cluster-wide resource declarations
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterResources {
    /// Config-data bundles by name
    #[serde(default)]
    pub config_maps: HashMap<String, EnvMap>,

    /// Secret-data bundles by name
    #[serde(default)]
    pub secrets: HashMap<String, EnvMap>,
}

/// A scalar configuration value, canonicalized to its string form
///
/// Unquoted numbers go through `i64` or `f64` on the way, so the text is not
/// always kept: `1.10` becomes `1.1` and `2.0` becomes `2`. Quote a value to
/// keep it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "RawScalar")]
pub struct EnvValue(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<RawScalar> for EnvValue {
    fn from(raw: RawScalar) -> Self {
        match raw {
            RawScalar::Bool(b) => Self(b.to_string()),
            RawScalar::Int(n) => Self(n.to_string()),
            RawScalar::Float(n) => Self(n.to_string()),
            RawScalar::String(s) => Self(s),
        }
    }
}

impl EnvValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EnvValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service role within the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceRole {
    Backend,
    Frontend,
}

impl ServiceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
        }
    }

    /// Replica count used when neither the declaration nor an override sets one
    pub fn default_replicas(&self) -> u32 {
        match self {
            Self::Backend => 2,
            Self::Frontend => 1,
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value found by path lookup, with the scope it was declared for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedValue {
    pub value: String,
    /// `None` for values legal in every scope
    pub scope: Option<String>,
}

impl ScopedValue {
    fn unscoped(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            scope: None,
        }
    }

    fn scoped(value: impl Into<String>, scope: &str) -> Self {
        Self {
            value: value.into(),
            scope: Some(scope.to_string()),
        }
    }
}

impl ConfigTree {
    /// Load a project configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a project configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Derived image name for a service (see [`naming::image_name`])
    pub fn image_name(&self, service: &str) -> String {
        naming::image_name(&self.project.name, service)
    }

    /// Full image reference `registry/imageName(service):version`
    pub fn image_reference(&self, service: &str) -> String {
        naming::image_reference(
            &self.project.registry,
            &self.project.name,
            service,
            &self.project.version,
        )
    }

    /// All declared services as `(role, name)`, sorted by role then name
    pub fn service_names(&self) -> Vec<(ServiceRole, &str)> {
        let mut names: Vec<(ServiceRole, &str)> = self
            .backend
            .keys()
            .map(|name| (ServiceRole::Backend, name.as_str()))
            .chain(
                self.frontend
                    .keys()
                    .map(|name| (ServiceRole::Frontend, name.as_str())),
            )
            .collect();
        names.sort();
        names
    }

    /// Look up a value by dotted path
    ///
    /// Supported paths:
    /// - `project.{name,registry,version}`
    /// - `backend.<svc>.ports.<port>`, `backend.<svc>.replicas`, `backend.<svc>.image`
    ///   (same for `frontend`)
    /// - `env.{global,backend,frontend}.<KEY>`
    /// - `env.services.<svc>.common.<KEY>`
    /// - `env.services.<svc>.<env-tag>.<KEY>` (scoped to `<env-tag>`)
    /// - `configMaps.<bundle>.<key>`, `secrets.<bundle>.<key>` (scoped to `kubernetes`)
    ///
    /// Variable and data keys are the last segment and may themselves contain
    /// dots (`configMaps.app.application.properties`). Service and bundle keys
    /// may not; [`validate`](Self::validate) rejects them.
    pub fn lookup(&self, path: &str) -> Option<ScopedValue> {
        let segments: Vec<&str> = path.split('.').collect();

        match segments.as_slice() {
            ["project", "name"] => Some(ScopedValue::unscoped(&self.project.name)),
            ["project", "registry"] => Some(ScopedValue::unscoped(&self.project.registry)),
            ["project", "version"] => Some(ScopedValue::unscoped(&self.project.version)),

            ["backend", name, rest @ ..] => {
                let service = self.backend.get(*name)?;
                self.lookup_service(ServiceRole::Backend, name, service, rest)
            }
            ["frontend", name, rest @ ..] => {
                let service = self.frontend.get(*name)?;
                self.lookup_service(ServiceRole::Frontend, name, service, rest)
            }

            ["env", "global", key @ ..] => lookup_env(&self.environment.global, key),
            ["env", "backend", key @ ..] => lookup_env(&self.environment.backend, key),
            ["env", "frontend", key @ ..] => lookup_env(&self.environment.frontend, key),
            ["env", "services", name, "common", key @ ..] => {
                let env = self.environment.services.get(*name)?;
                lookup_env(&env.common, key)
            }
            ["env", "services", name, tag, key @ ..] => {
                let env = self.environment.services.get(*name)?;
                let value = env.environments.get(*tag)?.get(&data_key(key)?)?;
                Some(ScopedValue::scoped(value.as_str(), tag))
            }

            ["configMaps", bundle, key @ ..] => {
                let value = self.cluster.config_maps.get(*bundle)?.get(&data_key(key)?)?;
                Some(ScopedValue::scoped(value.as_str(), CLUSTER_SCOPE))
            }
            ["secrets", bundle, key @ ..] => {
                let value = self.cluster.secrets.get(*bundle)?.get(&data_key(key)?)?;
                Some(ScopedValue::scoped(value.as_str(), CLUSTER_SCOPE))
            }

            _ => None,
        }
    }

    fn lookup_service<P: PortSet>(
        &self,
        role: ServiceRole,
        name: &str,
        service: &Service<P>,
        rest: &[&str],
    ) -> Option<ScopedValue> {
        match rest {
            ["ports", port] => service
                .ports
                .get(port)
                .map(|p| ScopedValue::unscoped(p.to_string())),
            ["replicas"] => {
                let replicas = service.replicas.unwrap_or_else(|| role.default_replicas());
                Some(ScopedValue::unscoped(replicas.to_string()))
            }
            ["image"] => Some(ScopedValue::unscoped(self.image_reference(name))),
            _ => None,
        }
    }

    /// Every path [`lookup`](Self::lookup) can answer, sorted
    pub fn known_paths(&self) -> Vec<String> {
        let mut paths = vec![
            "project.name".to_string(),
            "project.registry".to_string(),
            "project.version".to_string(),
        ];

        for (name, service) in &self.backend {
            push_service_paths(&mut paths, ServiceRole::Backend, name, &service.ports);
        }
        for (name, service) in &self.frontend {
            push_service_paths(&mut paths, ServiceRole::Frontend, name, &service.ports);
        }

        let layers = [
            ("global", &self.environment.global),
            ("backend", &self.environment.backend),
            ("frontend", &self.environment.frontend),
        ];
        for (layer, env) in layers {
            paths.extend(env.keys().map(|key| format!("env.{}.{}", layer, key)));
        }

        for (name, env) in &self.environment.services {
            paths.extend(
                env.common
                    .keys()
                    .map(|key| format!("env.services.{}.common.{}", name, key)),
            );
            for (tag, values) in &env.environments {
                paths.extend(
                    values
                        .keys()
                        .map(|key| format!("env.services.{}.{}.{}", name, tag, key)),
                );
            }
        }

        for (bundle, data) in &self.cluster.config_maps {
            paths.extend(data.keys().map(|key| format!("configMaps.{}.{}", bundle, key)));
        }
        for (bundle, data) in &self.cluster.secrets {
            paths.extend(data.keys().map(|key| format!("secrets.{}.{}", bundle, key)));
        }

        paths.sort();
        paths
    }
}

fn lookup_env(env: &EnvMap, key: &[&str]) -> Option<ScopedValue> {
    env.get(&data_key(key)?)
        .map(|value| ScopedValue::unscoped(value.as_str()))
}

/// Rejoin the trailing segments of a path into a variable or data key
fn data_key(segments: &[&str]) -> Option<String> {
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    }
}

fn push_service_paths(paths: &mut Vec<String>, role: ServiceRole, name: &str, ports: &impl PortSet) {
    for (port, _) in ports.named() {
        paths.push(format!("{}.{}.ports.{}", role, name, port));
    }
    paths.push(format!("{}.{}.replicas", role, name));
    paths.push(format!("{}.{}.image", role, name));
}
