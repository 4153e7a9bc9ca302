//! Reference expression resolution
//!
//! Configuration values may embed references to other values in the tree:
//!
//! ```text
//! DATABASE_URL: "postgres://${configMaps.database.host}:${kubernetes:configMaps.database.port}"
//! ```
//!
//! `${path}` resolves against the active scope, `${scope:path}` names the scope
//! explicitly. Resolution is recursive: a resolved value may itself contain
//! references. Cycles, missing targets and values declared for another scope
//! are reported as [`ResolveError`]s.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigTree;
use crate::error::{CoreError, ResolveError};

/// Maximum number of nested expansions for a single value
pub const MAX_DEPTH: usize = 32;

const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Any `${...}` span, well-formed or not
static DELIMITER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{[^}]*\}").expect("valid regex"));

/// A single well-formed expression, matched against a whole delimited span
static EXPRESSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$\{(?:([a-z]+):)?([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\}$")
        .expect("valid regex")
});

/// Deployment context a value is resolved for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    #[default]
    Kubernetes,
    Docker,
    Local,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Kubernetes, Scope::Docker, Scope::Local];

    /// Tag used in configuration keys and explicit expressions
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kubernetes => "kubernetes",
            Self::Docker => "docker",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "unknown scope `{}` (expected one of: kubernetes, docker, local)",
                    s
                ))
            })
    }
}

/// Check whether a string still contains reference syntax
///
/// Any closed `${...}` span counts, including ones that are not valid
/// expressions.
pub fn contains_reference(value: &str) -> bool {
    DELIMITER_PATTERN.is_match(value)
}

/// All delimited spans in a string, in order of appearance
pub fn find_references(value: &str) -> Vec<&str> {
    DELIMITER_PATTERN
        .find_iter(value)
        .map(|m| m.as_str())
        .collect()
}

/// Resolves reference expressions against a [`ConfigTree`] for one scope
#[derive(Debug, Clone, Copy)]
pub struct ReferenceResolver<'a> {
    tree: &'a ConfigTree,
    scope: Scope,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(tree: &'a ConfigTree, scope: Scope) -> Self {
        Self { tree, scope }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Resolve every expression in `raw`
    ///
    /// A string without expressions is returned borrowed and unchanged.
    pub fn resolve<'s>(&self, raw: &'s str) -> Result<Cow<'s, str>, ResolveError> {
        if !contains_reference(raw) {
            return Ok(Cow::Borrowed(raw));
        }

        let mut stack = Vec::new();
        self.expand(raw, &mut stack).map(Cow::Owned)
    }

    /// Resolve the value stored at `origin`
    ///
    /// Seeding the chain with the value's own path lets a reference back to
    /// itself (directly or through other values) be reported as a cycle
    /// starting at `origin`.
    pub fn resolve_value<'s>(&self, origin: &str, raw: &'s str) -> Result<Cow<'s, str>, ResolveError> {
        if !contains_reference(raw) {
            return Ok(Cow::Borrowed(raw));
        }

        let mut stack = vec![origin.to_string()];
        self.expand(raw, &mut stack).map(Cow::Owned)
    }

    fn expand(&self, raw: &str, stack: &mut Vec<String>) -> Result<String, ResolveError> {
        let mut out = String::with_capacity(raw.len());
        let mut last = 0;

        for span in DELIMITER_PATTERN.find_iter(raw) {
            let expression = span.as_str();
            let Some((explicit, path)) = parse_expression(expression) else {
                return Err(ResolveError::Malformed {
                    expression: expression.to_string(),
                });
            };

            out.push_str(&raw[last..span.start()]);
            out.push_str(&self.expand_reference(expression, explicit, path, stack)?);
            last = span.end();
        }

        out.push_str(&raw[last..]);
        Ok(out)
    }

    fn expand_reference(
        &self,
        expression: &str,
        explicit: Option<&str>,
        path: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, ResolveError> {
        let active = self.scope.as_str();

        if let Some(requested) = explicit {
            if requested != active {
                return Err(ResolveError::ScopeViolation {
                    expression: expression.to_string(),
                    declared: requested.to_string(),
                    active: active.to_string(),
                });
            }
        }

        if let Some(start) = stack.iter().position(|seen| seen == path) {
            let mut cycle = stack[start..].to_vec();
            cycle.push(path.to_string());
            return Err(ResolveError::Cycle { path: cycle });
        }

        if stack.len() >= MAX_DEPTH {
            return Err(ResolveError::DepthExceeded {
                expression: expression.to_string(),
                depth: MAX_DEPTH,
            });
        }

        let found = self.tree.lookup(path).ok_or_else(|| ResolveError::NotFound {
            expression: expression.to_string(),
            suggestion: self.suggest(path),
        })?;

        if let Some(declared) = &found.scope {
            if declared != active {
                return Err(ResolveError::ScopeViolation {
                    expression: expression.to_string(),
                    declared: declared.clone(),
                    active: active.to_string(),
                });
            }
        }

        stack.push(path.to_string());
        let resolved = self.expand(&found.value, stack);
        stack.pop();
        resolved
    }

    /// Closest known path to a missing one
    fn suggest(&self, path: &str) -> Option<String> {
        self.tree
            .known_paths()
            .into_iter()
            .map(|candidate| (strsim::levenshtein(path, &candidate), candidate))
            .filter(|(distance, _)| *distance > 0 && *distance <= MAX_SUGGESTION_DISTANCE)
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, candidate)| candidate)
    }
}

/// Split `${scope:path}` into its optional scope and its path
fn parse_expression(expression: &str) -> Option<(Option<&str>, &str)> {
    let caps = EXPRESSION_PATTERN.captures(expression)?;
    let path = caps.get(2)?.as_str();
    Some((caps.get(1).map(|m| m.as_str()), path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(extra: &str) -> ConfigTree {
        let yaml = format!(
            r#"
project:
  name: shop
  registry: registry.example.com
  version: 1.2.3
backend:
  orders:
    ports: {{ http: 8080, health: 8081, metrics: 9090 }}
{}
"#,
            extra
        );
        ConfigTree::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn test_plain_string_is_unchanged() {
        let tree = tree("");
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        let out = resolver.resolve("no references here").unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, "no references here");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let tree = tree("");
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        let once = resolver.resolve("http://orders:${backend.orders.ports.http}").unwrap();
        let twice = resolver.resolve(&once).unwrap();
        assert_eq!(once, "http://orders:8080");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_multiple_and_explicit_references() {
        let tree = tree("");
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        let out = resolver
            .resolve("${project.name}@${kubernetes:project.version}")
            .unwrap();
        assert_eq!(out, "shop@1.2.3");
    }

    #[test]
    fn test_nested_resolution() {
        let tree = tree(
            r#"
environment:
  global:
    HOST: orders
    URL: "http://${env.global.HOST}:${backend.orders.ports.http}"
  services:
    orders:
      environments:
        kubernetes:
          UPSTREAM: "${env.global.URL}/api"
"#,
        );
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        let out = resolver.resolve("${env.services.orders.kubernetes.UPSTREAM}").unwrap();
        assert_eq!(out, "http://orders:8080/api");
    }

    #[test]
    fn test_reference_not_found_with_suggestion() {
        let tree = tree("");
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        let err = resolver.resolve("${backend.order.ports.http}").unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotFound {
                expression: "${backend.order.ports.http}".to_string(),
                suggestion: Some("backend.orders.ports.http".to_string()),
            }
        );
    }

    #[test]
    fn test_direct_cycle() {
        let tree = tree(
            r#"
environment:
  global:
    A: "${env.global.A}"
"#,
        );
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        let err = resolver.resolve_value("env.global.A", "${env.global.A}").unwrap_err();
        assert_eq!(
            err,
            ResolveError::Cycle {
                path: vec!["env.global.A".to_string(), "env.global.A".to_string()],
            }
        );
    }

    #[test]
    fn test_transitive_cycle() {
        let tree = tree(
            r#"
environment:
  services:
    orders:
      environments:
        kubernetes:
          A: "x-${env.services.orders.kubernetes.B}"
          B: "y-${env.services.orders.kubernetes.A}"
"#,
        );
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        let err = resolver
            .resolve_value(
                "env.services.orders.kubernetes.A",
                "x-${env.services.orders.kubernetes.B}",
            )
            .unwrap_err();

        match err {
            ResolveError::Cycle { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 3);
                assert!(path.contains(&"env.services.orders.kubernetes.B".to_string()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_without_seeded_origin_still_terminates() {
        let tree = tree(
            r#"
environment:
  global:
    A: "${env.global.B}"
    B: "${env.global.A}"
"#,
        );
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);
        assert!(matches!(
            resolver.resolve("${env.global.A}"),
            Err(ResolveError::Cycle { .. })
        ));
    }

    #[test]
    fn test_scope_violation_for_other_environment() {
        let tree = tree(
            r#"
environment:
  services:
    orders:
      environments:
        local:
          DB_HOST: localhost
"#,
        );
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        let err = resolver.resolve("${env.services.orders.local.DB_HOST}").unwrap_err();
        assert_eq!(
            err,
            ResolveError::ScopeViolation {
                expression: "${env.services.orders.local.DB_HOST}".to_string(),
                declared: "local".to_string(),
                active: "kubernetes".to_string(),
            }
        );
    }

    #[test]
    fn test_scope_violation_for_unlisted_tag() {
        let tree = tree(
            r#"
environment:
  services:
    orders:
      environments:
        staging:
          DB_HOST: staging-db
"#,
        );
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);
        assert!(matches!(
            resolver.resolve("${env.services.orders.staging.DB_HOST}"),
            Err(ResolveError::ScopeViolation { .. })
        ));
    }

    #[test]
    fn test_cluster_resources_are_kubernetes_only() {
        let tree = tree(
            r#"
cluster:
  secrets:
    database:
      password: hunter2
"#,
        );

        let k8s = ReferenceResolver::new(&tree, Scope::Kubernetes);
        assert_eq!(k8s.resolve("${secrets.database.password}").unwrap(), "hunter2");

        let docker = ReferenceResolver::new(&tree, Scope::Docker);
        assert!(matches!(
            docker.resolve("${secrets.database.password}"),
            Err(ResolveError::ScopeViolation { .. })
        ));
    }

    #[test]
    fn test_explicit_scope_mismatch() {
        let tree = tree("");
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);
        assert!(matches!(
            resolver.resolve("${local:project.name}"),
            Err(ResolveError::ScopeViolation { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut chain = String::from("environment:\n  global:\n");
        for i in 0..40 {
            chain.push_str(&format!("    V{}: \"${{env.global.V{}}}\"\n", i, i + 1));
        }
        chain.push_str("    V40: end\n");

        let tree = tree(&chain);
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);
        assert!(matches!(
            resolver.resolve("${env.global.V0}"),
            Err(ResolveError::DepthExceeded { depth: MAX_DEPTH, .. })
        ));
    }

    #[test]
    fn test_find_references() {
        assert_eq!(
            find_references("a ${x.y} b ${kubernetes:z} c"),
            vec!["${x.y}", "${kubernetes:z}"]
        );
        assert_eq!(
            find_references("a ${ project.name } b ${Kubernetes:z}"),
            vec!["${ project.name }", "${Kubernetes:z}"]
        );
        assert!(!contains_reference("{{ .Values.name }}"));
        assert!(!contains_reference("$HOME and ${ not closed"));
    }

    #[test]
    fn test_malformed_expressions_are_rejected() {
        let tree = tree("");
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        for raw in [
            "${ project.name }",
            "${Kubernetes:project.name}",
            "${}",
            "${project..name}",
            "prefix ${project.name} ${project name}",
        ] {
            let err = resolver.resolve(raw).unwrap_err();
            assert!(
                matches!(err, ResolveError::Malformed { .. }),
                "{raw}: {err:?}"
            );
        }
    }

    #[test]
    fn test_malformed_expression_inside_referenced_value() {
        let tree = tree(
            r#"
environment:
  global:
    BROKEN: "${ project.name }"
    URL: "http://${env.global.BROKEN}"
"#,
        );
        let resolver = ReferenceResolver::new(&tree, Scope::Kubernetes);

        assert_eq!(
            resolver.resolve_value("env.global.URL", "http://${env.global.BROKEN}"),
            Err(ResolveError::Malformed {
                expression: "${ project.name }".to_string()
            })
        );
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("kubernetes".parse::<Scope>().unwrap(), Scope::Kubernetes);
        assert_eq!("local".parse::<Scope>().unwrap(), Scope::Local);
        assert!("staging".parse::<Scope>().is_err());
    }
}
