//! Configuration invariants enforced before anything is rendered

use std::collections::BTreeMap;

use crate::config::{ConfigTree, PortSet, Service, ServiceRole};
use crate::error::{CoreError, Result};
use crate::naming::{MAX_NAME_LEN, dns_label, truncate_name};

impl ConfigTree {
    /// Check the invariants the chart generator relies on
    ///
    /// Every violation is collected; the returned error lists all of them.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        let project = &self.project;
        if project.name.trim().is_empty() {
            issues.push("project name must not be empty".to_string());
        } else if dns_label(&project.name).is_empty() {
            issues.push(format!(
                "project name `{}` contains no characters usable in a Kubernetes name",
                project.name
            ));
        }

        if project.registry.trim().is_empty() {
            issues.push("image registry must not be empty".to_string());
        }

        if let Err(e) = semver::Version::parse(&project.version) {
            issues.push(format!(
                "project version `{}` is not a valid semantic version: {}",
                project.version, e
            ));
        }

        // Object names are `<chart>-<label>` cut to the name limit; two keys
        // that end up alike would produce duplicate Kubernetes objects.
        let chart = dns_label(&project.name);
        let mut normalized: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (role, name) in self.service_names() {
            if name.contains('.') {
                issues.push(format!(
                    "{} service `{}` contains `.` and cannot be referenced",
                    role, name
                ));
            }
            let label = dns_label(name);
            if label.is_empty() {
                issues.push(format!(
                    "{} service `{}` contains no characters usable in a Kubernetes name",
                    role, name
                ));
                continue;
            }
            normalized
                .entry(object_name(&chart, &label))
                .or_default()
                .push(format!("{} `{}`", role, name));
        }
        for (object, owners) in &normalized {
            if owners.len() > 1 {
                issues.push(format!(
                    "services {} all normalize to the object name `{}`",
                    owners.join(", "),
                    object
                ));
            }
        }

        check_bundles(&mut issues, &chart, "config map", self.cluster.config_maps.keys());
        check_bundles(&mut issues, &chart, "secret", self.cluster.secrets.keys());

        for (name, service) in &self.backend {
            check_ports(&mut issues, ServiceRole::Backend, name, service);
        }
        for (name, service) in &self.frontend {
            check_ports(&mut issues, ServiceRole::Frontend, name, service);
        }

        for name in self.environment.services.keys() {
            if !self.backend.contains_key(name) && !self.frontend.contains_key(name) {
                issues.push(format!(
                    "environment declared for unknown service `{}`",
                    name
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            issues.sort();
            Err(CoreError::Validation { issues })
        }
    }
}

/// Name a component's objects get when the release is named after the chart
fn object_name(chart: &str, label: &str) -> String {
    truncate_name(&format!("{}-{}", chart, label), MAX_NAME_LEN)
}

fn check_bundles<'a>(
    issues: &mut Vec<String>,
    chart: &str,
    kind: &str,
    names: impl Iterator<Item = &'a String>,
) {
    let mut normalized: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for name in names {
        if name.contains('.') {
            issues.push(format!(
                "{} `{}` contains `.` and cannot be referenced",
                kind, name
            ));
        }
        let label = dns_label(name);
        if label.is_empty() {
            issues.push(format!(
                "{} `{}` contains no characters usable in a Kubernetes name",
                kind, name
            ));
            continue;
        }
        normalized
            .entry(object_name(chart, &label))
            .or_default()
            .push(name);
    }

    for (object, mut owners) in normalized {
        if owners.len() > 1 {
            owners.sort();
            issues.push(format!(
                "{}s `{}` all normalize to the object name `{}`",
                kind,
                owners.join("`, `"),
                object
            ));
        }
    }
}

fn check_ports<P: PortSet>(issues: &mut Vec<String>, role: ServiceRole, name: &str, service: &Service<P>) {
    for (port_name, port) in service.ports.named() {
        if port == 0 {
            issues.push(format!(
                "{} service `{}` declares {} port 0",
                role, name, port_name
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(yaml: &str) -> ConfigTree {
        ConfigTree::from_yaml(yaml).unwrap()
    }

    fn issues(tree: &ConfigTree) -> Vec<String> {
        match tree.validate() {
            Err(CoreError::Validation { issues }) => issues,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_tree() {
        let tree = tree(
            r#"
project: { name: shop, registry: registry.example.com, version: 1.2.3 }
backend:
  orders: { ports: { http: 8080, health: 8081, metrics: 9090 } }
frontend:
  web: { ports: { http: 3000 } }
"#,
        );
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_names_colliding_after_normalization() {
        let tree = tree(
            r#"
project: { name: shop, registry: r, version: 1.0.0 }
backend:
  order_api: { ports: { http: 1, health: 2, metrics: 3 } }
  Order-API: { ports: { http: 1, health: 2, metrics: 3 } }
"#,
        );
        let issues = issues(&tree);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("order-api"));
        assert!(issues[0].contains("`order_api`"));
        assert!(issues[0].contains("`Order-API`"));
    }

    #[test]
    fn test_collision_across_roles() {
        let tree = tree(
            r#"
project: { name: shop, registry: r, version: 1.0.0 }
backend:
  web: { ports: { http: 1, health: 2, metrics: 3 } }
frontend:
  WEB: { ports: { http: 3000 } }
"#,
        );
        let issues = issues(&tree);
        assert!(issues[0].contains("backend `web`"));
        assert!(issues[0].contains("frontend `WEB`"));
    }

    #[test]
    fn test_collects_all_issues() {
        let tree = tree(
            r#"
project: { name: "", registry: "", version: latest }
backend:
  orders: { ports: { http: 0, health: 2, metrics: 3 } }
environment:
  services:
    ghost:
      common: { A: b }
"#,
        );
        let issues = issues(&tree);
        assert_eq!(issues.len(), 5);
        assert!(issues.iter().any(|i| i.contains("project name")));
        assert!(issues.iter().any(|i| i.contains("registry")));
        assert!(issues.iter().any(|i| i.contains("semantic version")));
        assert!(issues.iter().any(|i| i.contains("http port 0")));
        assert!(issues.iter().any(|i| i.contains("`ghost`")));
    }

    #[test]
    fn test_bundle_names_colliding() {
        let tree = tree(
            r#"
project: { name: shop, registry: r, version: 1.0.0 }
cluster:
  configMaps:
    app_config: { a: b }
    App-Config: { c: d }
  secrets:
    app_config: { e: f }
"#,
        );
        let issues = issues(&tree);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("config maps"));
        assert!(issues[0].contains("shop-app-config"));
    }

    #[test]
    fn test_names_colliding_after_prefix_truncation() {
        let stem = "x".repeat(60);
        let tree = tree(&format!(
            r#"
project: {{ name: shop, registry: r, version: 1.0.0 }}
backend:
  {stem}a: {{ ports: {{ http: 1, health: 2, metrics: 3 }} }}
  {stem}b: {{ ports: {{ http: 1, health: 2, metrics: 3 }} }}
cluster:
  secrets:
    {stem}a: {{ k: v }}
    {stem}b: {{ k: v }}
"#
        ));
        assert_ne!(dns_label(&format!("{stem}a")), dns_label(&format!("{stem}b")));

        let issues = issues(&tree);
        assert_eq!(issues.len(), 2);
        let object = format!("shop-{}", "x".repeat(58));
        assert!(issues.iter().all(|i| i.contains(&object)));
        assert!(issues.iter().any(|i| i.starts_with("secrets")));
        assert!(issues.iter().any(|i| i.starts_with("services")));
    }

    #[test]
    fn test_dotted_keys_rejected() {
        let tree = tree(
            r#"
project: { name: shop, registry: r, version: 1.0.0 }
backend:
  orders.v2: { ports: { http: 1, health: 2, metrics: 3 } }
cluster:
  configMaps:
    app.settings: { application.properties: "a=b" }
"#,
        );
        let issues = issues(&tree);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].starts_with("backend service `orders.v2`"));
        assert!(issues[1].starts_with("config map `app.settings`"));
        assert!(issues.iter().all(|i| i.contains("cannot be referenced")));
    }

    #[test]
    fn test_unusable_service_name() {
        let tree = tree(
            r#"
project: { name: shop, registry: r, version: 1.0.0 }
frontend:
  "___": { ports: { http: 3000 } }
"#,
        );
        assert!(issues(&tree)[0].contains("no characters usable"));
    }
}
