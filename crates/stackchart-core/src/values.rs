//! Values document composition
//!
//! Turns a [`ConfigTree`] into the per-service values consumed by the chart
//! templates. Source maps are unordered, so every map is walked in sorted key
//! order here; everything downstream relies on that order for byte-stable
//! output.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::{ConfigTree, EnvMap, PortSet, ResourceOverrides, Service, ServiceOverride, ServiceRole};
use crate::error::{CoreError, Result};
use crate::naming::dns_label;
use crate::reference::{ReferenceResolver, Scope};

/// The complete values document (`values.yaml`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedValues {
    pub project_name: String,
    pub docker_registry: String,
    pub version: String,
    pub name_override: String,
    pub fullname_override: String,
    pub backend: IndexMap<String, ServiceValues>,
    pub frontend: IndexMap<String, ServiceValues>,
    pub global_config_maps: IndexMap<String, ResourceBundle>,
    pub global_secrets: IndexMap<String, ResourceBundle>,
}

impl RenderedValues {
    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Values of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceValues {
    /// Service key normalized for use in object names
    pub component: String,
    pub enabled: bool,
    pub image: String,
    pub replicas: u32,
    pub ports: IndexMap<String, u16>,
    pub env: Vec<EnvVar>,
    pub resources: Resources,
}

/// A cluster-wide config map or secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceBundle {
    /// Bundle key normalized for use in object names
    pub component: String,
    pub data: IndexMap<String, String>,
}

/// A container environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Container resource requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resources {
    pub requests: Quantities,
    pub limits: Quantities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quantities {
    pub cpu: String,
    pub memory: String,
}

impl Quantities {
    fn new(cpu: &str, memory: &str) -> Self {
        Self {
            cpu: cpu.to_string(),
            memory: memory.to_string(),
        }
    }
}

impl Resources {
    /// Role defaults
    pub fn defaults(role: ServiceRole) -> Self {
        match role {
            ServiceRole::Backend => Self {
                requests: Quantities::new("100m", "128Mi"),
                limits: Quantities::new("500m", "512Mi"),
            },
            ServiceRole::Frontend => Self {
                requests: Quantities::new("50m", "64Mi"),
                limits: Quantities::new("200m", "256Mi"),
            },
        }
    }

    /// Replace the fields present in `overrides`
    pub fn apply(mut self, overrides: Option<&ResourceOverrides>) -> Self {
        let Some(overrides) = overrides else {
            return self;
        };

        for (target, source) in [
            (&mut self.requests, &overrides.requests),
            (&mut self.limits, &overrides.limits),
        ] {
            if let Some(source) = source {
                if let Some(cpu) = &source.cpu {
                    target.cpu = cpu.clone();
                }
                if let Some(memory) = &source.memory {
                    target.memory = memory.clone();
                }
            }
        }

        self
    }
}

/// Builds a [`RenderedValues`] for one scope
pub struct ValuesComposer<'a> {
    tree: &'a ConfigTree,
    resolver: ReferenceResolver<'a>,
}

impl<'a> ValuesComposer<'a> {
    pub fn new(tree: &'a ConfigTree, scope: Scope) -> Self {
        Self {
            tree,
            resolver: ReferenceResolver::new(tree, scope),
        }
    }

    pub fn scope(&self) -> Scope {
        self.resolver.scope()
    }

    /// Compose the values document
    pub fn compose(&self) -> Result<RenderedValues> {
        let tree = self.tree;

        let mut backend = IndexMap::new();
        for (name, service) in sorted(&tree.backend) {
            backend.insert(name.clone(), self.compose_service(ServiceRole::Backend, name, service)?);
        }

        let mut frontend = IndexMap::new();
        for (name, service) in sorted(&tree.frontend) {
            frontend.insert(name.clone(), self.compose_service(ServiceRole::Frontend, name, service)?);
        }

        Ok(RenderedValues {
            project_name: tree.project.name.clone(),
            docker_registry: tree.project.registry.clone(),
            version: tree.project.version.clone(),
            name_override: String::new(),
            fullname_override: String::new(),
            backend,
            frontend,
            global_config_maps: self.compose_bundles("configMaps", "config map", &tree.cluster.config_maps)?,
            global_secrets: self.compose_bundles("secrets", "secret", &tree.cluster.secrets)?,
        })
    }

    /// Values for one service
    pub fn compose_service<P: PortSet>(
        &self,
        role: ServiceRole,
        name: &str,
        service: &Service<P>,
    ) -> Result<ServiceValues> {
        let scope = self.scope();
        let active_override: Option<&ServiceOverride> = service.overrides.get(scope.as_str());

        let replicas = active_override
            .and_then(|o| o.replicas)
            .or(service.replicas)
            .unwrap_or_else(|| role.default_replicas());

        let resources = Resources::defaults(role)
            .apply(service.resources.as_ref())
            .apply(active_override.and_then(|o| o.resources.as_ref()));

        let ports: IndexMap<String, u16> = service
            .ports
            .named()
            .into_iter()
            .map(|(port_name, port)| (port_name.to_string(), port))
            .collect();

        let env = self.compose_env(role, name, &service.ports)?;

        tracing::debug!(
            role = role.as_str(),
            service = name,
            env = env.len(),
            replicas,
            "composed service values"
        );

        Ok(ServiceValues {
            component: dns_label(name),
            enabled: true,
            image: self.tree.image_reference(name),
            replicas,
            ports,
            env,
            resources,
        })
    }

    /// Ordered environment list for one service
    ///
    /// Layers are emitted in sequence, not deduplicated: global, role-wide,
    /// service common, service values for the active scope, then the
    /// synthesized port variables. The consumer keeps the last occurrence of a
    /// duplicated name.
    fn compose_env(&self, role: ServiceRole, name: &str, ports: &impl PortSet) -> Result<Vec<EnvVar>> {
        let env = &self.tree.environment;
        let owner = format!("{} service `{}`", role, name);
        let scope = self.scope();

        let role_layer = match role {
            ServiceRole::Backend => &env.backend,
            ServiceRole::Frontend => &env.frontend,
        };

        let mut layers: Vec<(String, &EnvMap)> = vec![
            ("env.global".to_string(), &env.global),
            (format!("env.{}", role), role_layer),
        ];

        if let Some(service_env) = env.services.get(name) {
            layers.push((format!("env.services.{}.common", name), &service_env.common));
            if let Some(scoped) = service_env.environments.get(scope.as_str()) {
                layers.push((format!("env.services.{}.{}", name, scope), scoped));
            }
        }

        let mut vars = Vec::new();
        for (prefix, layer) in layers {
            for (key, raw) in sorted(layer) {
                let origin = format!("{}.{}", prefix, key);
                let value = self
                    .resolver
                    .resolve_value(&origin, raw.as_str())
                    .map_err(|source| CoreError::Reference {
                        owner: owner.clone(),
                        key: key.clone(),
                        source,
                    })?;
                vars.push(EnvVar::new(key.clone(), value.into_owned()));
            }
        }

        vars.extend(
            ports
                .named()
                .into_iter()
                .map(|(port_name, port)| EnvVar::new(port_var_name(port_name), port.to_string())),
        );

        Ok(vars)
    }

    fn compose_bundles(
        &self,
        prefix: &str,
        kind: &str,
        bundles: &HashMap<String, EnvMap>,
    ) -> Result<IndexMap<String, ResourceBundle>> {
        // Bundles only exist in the cluster, whatever scope services are rendered for
        let resolver = ReferenceResolver::new(self.tree, Scope::Kubernetes);
        let mut composed = IndexMap::new();

        for (bundle, data) in sorted(bundles) {
            let owner = format!("{} `{}`", kind, bundle);
            let mut entries = IndexMap::new();

            for (key, raw) in sorted(data) {
                let origin = format!("{}.{}.{}", prefix, bundle, key);
                let value = resolver
                    .resolve_value(&origin, raw.as_str())
                    .map_err(|source| CoreError::Reference {
                        owner: owner.clone(),
                        key: key.clone(),
                        source,
                    })?;
                entries.insert(key.clone(), value.into_owned());
            }

            composed.insert(
                bundle.clone(),
                ResourceBundle {
                    component: dns_label(bundle),
                    data: entries,
                },
            );
        }

        Ok(composed)
    }
}

/// `http` -> `HTTP_PORT`
pub fn port_var_name(port_name: &str) -> String {
    format!("{}_PORT", port_name.to_uppercase())
}

/// Entries of an unordered map, sorted by key
fn sorted<V>(map: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries: Vec<(&String, &V)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;

    const PROJECT: &str = r#"
project:
  name: shop
  registry: registry.example.com
  version: 1.2.3
backend:
  orders:
    ports: { http: 8080, health: 8081, metrics: 9090 }
  payments:
    ports: { http: 8180, health: 8181, metrics: 9190 }
    replicas: 3
    resources:
      limits: { memory: 1Gi }
    overrides:
      kubernetes:
        replicas: 5
      local:
        replicas: 1
frontend:
  web:
    ports: { http: 3000 }
environment:
  global:
    ZONE: eu
    LOG_LEVEL: info
  backend:
    LOG_LEVEL: debug
  frontend:
    API_URL: "http://orders:${backend.orders.ports.http}"
  services:
    orders:
      common:
        FEATURE_X: "on"
      environments:
        kubernetes:
          DB_HOST: "${configMaps.database.host}"
        local:
          DB_HOST: localhost
cluster:
  configMaps:
    database:
      port: 5432
      host: postgres
  secrets:
    database:
      url: "postgres://${configMaps.database.host}:${configMaps.database.port}"
"#;

    fn compose(scope: Scope) -> Result<RenderedValues> {
        let tree = ConfigTree::from_yaml(PROJECT).unwrap();
        ValuesComposer::new(&tree, scope).compose()
    }

    fn names(env: &[EnvVar]) -> Vec<&str> {
        env.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_backend_service_values() {
        let values = compose(Scope::Kubernetes).unwrap();
        let orders = &values.backend["orders"];

        assert_eq!(orders.component, "orders");
        assert!(orders.enabled);
        assert_eq!(orders.image, "registry.example.com/shop-orders:1.2.3");
        assert_eq!(orders.replicas, 2);
        assert_eq!(orders.ports["http"], 8080);
        assert_eq!(orders.resources, Resources::defaults(ServiceRole::Backend));
    }

    #[test]
    fn test_env_layer_order_and_port_vars_last() {
        let values = compose(Scope::Kubernetes).unwrap();
        let env = &values.backend["orders"].env;

        assert_eq!(
            names(env),
            vec![
                "LOG_LEVEL", "ZONE", // global, sorted
                "LOG_LEVEL", // backend role
                "FEATURE_X", // service common
                "DB_HOST",   // service kubernetes
                "HTTP_PORT", "HEALTH_PORT", "METRICS_PORT",
            ]
        );

        let tail: Vec<(&str, &str)> = env[env.len() - 3..]
            .iter()
            .map(|v| (v.name.as_str(), v.value.as_str()))
            .collect();
        assert_eq!(
            tail,
            vec![("HTTP_PORT", "8080"), ("HEALTH_PORT", "8081"), ("METRICS_PORT", "9090")]
        );
    }

    #[test]
    fn test_duplicates_are_kept_in_layer_order() {
        let values = compose(Scope::Kubernetes).unwrap();
        let levels: Vec<&str> = values.backend["orders"]
            .env
            .iter()
            .filter(|v| v.name == "LOG_LEVEL")
            .map(|v| v.value.as_str())
            .collect();
        assert_eq!(levels, vec!["info", "debug"]);
    }

    #[test]
    fn test_scoped_layer_is_resolved() {
        let values = compose(Scope::Kubernetes).unwrap();
        let db_host = values.backend["orders"]
            .env
            .iter()
            .find(|v| v.name == "DB_HOST")
            .unwrap();
        assert_eq!(db_host.value, "postgres");
    }

    #[test]
    fn test_other_scope_picks_its_own_layer() {
        let tree = ConfigTree::from_yaml(PROJECT).unwrap();
        let composer = ValuesComposer::new(&tree, Scope::Local);
        let orders = composer
            .compose_service(ServiceRole::Backend, "orders", &tree.backend["orders"])
            .unwrap();

        let db_host = orders.env.iter().find(|v| v.name == "DB_HOST").unwrap();
        assert_eq!(db_host.value, "localhost");
    }

    #[test]
    fn test_frontend_values() {
        let values = compose(Scope::Kubernetes).unwrap();
        let web = &values.frontend["web"];

        assert_eq!(web.replicas, 1);
        assert_eq!(web.ports.len(), 1);
        assert_eq!(
            names(&web.env),
            vec!["LOG_LEVEL", "ZONE", "API_URL", "HTTP_PORT"]
        );
        assert_eq!(web.env[2].value, "http://orders:8080");
        assert_eq!(web.resources, Resources::defaults(ServiceRole::Frontend));
    }

    #[test]
    fn test_replica_and_resource_precedence() {
        let values = compose(Scope::Kubernetes).unwrap();
        let payments = &values.backend["payments"];
        assert_eq!(payments.replicas, 5);
        assert_eq!(payments.resources.limits.memory, "1Gi");
        assert_eq!(payments.resources.limits.cpu, "500m");

        let tree = ConfigTree::from_yaml(PROJECT).unwrap();
        let docker = ValuesComposer::new(&tree, Scope::Docker)
            .compose_service(ServiceRole::Backend, "payments", &tree.backend["payments"])
            .unwrap();
        assert_eq!(docker.replicas, 3);
    }

    #[test]
    fn test_cluster_bundles_sorted_and_resolved() {
        let values = compose(Scope::Kubernetes).unwrap();

        let database = &values.global_config_maps["database"];
        assert_eq!(database.component, "database");
        let keys: Vec<&String> = database.data.keys().collect();
        assert_eq!(keys, vec!["host", "port"]);
        assert_eq!(
            values.global_secrets["database"].data["url"],
            "postgres://postgres:5432"
        );
    }

    #[test]
    fn test_bundles_resolve_for_cluster_in_any_scope() {
        let values = compose(Scope::Local).unwrap();

        assert_eq!(
            values.global_secrets["database"].data["url"],
            "postgres://postgres:5432"
        );
    }

    #[test]
    fn test_service_order_is_sorted() {
        let values = compose(Scope::Kubernetes).unwrap();
        let keys: Vec<&String> = values.backend.keys().collect();
        assert_eq!(keys, vec!["orders", "payments"]);
    }

    #[test]
    fn test_compose_is_deterministic() {
        let first = compose(Scope::Kubernetes).unwrap().to_yaml().unwrap();
        for _ in 0..5 {
            assert_eq!(compose(Scope::Kubernetes).unwrap().to_yaml().unwrap(), first);
        }
    }

    #[test]
    fn test_yaml_top_level_keys() {
        let yaml = compose(Scope::Kubernetes).unwrap().to_yaml().unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        for key in [
            "projectName",
            "dockerRegistry",
            "version",
            "backend",
            "frontend",
            "globalConfigMaps",
            "globalSecrets",
        ] {
            assert!(doc.get(key).is_some(), "missing top-level key {}", key);
        }
        assert_eq!(doc["backend"]["orders"]["env"][0]["name"], "LOG_LEVEL");
    }

    #[test]
    fn test_resolution_error_names_service_and_key() {
        let yaml = PROJECT.replace("${configMaps.database.host}", "${configMaps.database.hots}");
        let tree = ConfigTree::from_yaml(&yaml).unwrap();
        let err = ValuesComposer::new(&tree, Scope::Kubernetes).compose().unwrap_err();

        match &err {
            CoreError::Reference { owner, key, source } => {
                assert_eq!(owner, "backend service `orders`");
                assert_eq!(key, "DB_HOST");
                assert!(matches!(source, ResolveError::NotFound { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("DB_HOST"));
    }

    #[test]
    fn test_port_var_name() {
        assert_eq!(port_var_name("http"), "HTTP_PORT");
        assert_eq!(port_var_name("metrics"), "METRICS_PORT");
    }
}
