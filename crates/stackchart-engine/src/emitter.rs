//! Chart template emission
//!
//! Templates never embed configuration data. They iterate over the values
//! document at install time, so the only project-derived text in them is the
//! helper prefix, which is already a DNS label.

use stackchart_core::ServiceRole;

use crate::ast::{Argument, Command, FieldAccess, Pipeline, RangeVars, Template};
use crate::builder::TemplateBuilder;
use crate::lint::HELPERS_FILE;

/// Object-name length limit enforced by the helpers
const NAME_LIMIT: i64 = 63;

/// Template files, in emission order
pub const TEMPLATE_FILES: [&str; 7] = [
    HELPERS_FILE,
    "backend-deployment.yaml",
    "backend-service.yaml",
    "frontend-deployment.yaml",
    "frontend-service.yaml",
    "configmaps.yaml",
    "secrets.yaml",
];

/// Kind of cluster-wide data bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BundleKind {
    ConfigMap,
    Secret,
}

/// Emits the chart's templates with helpers prefixed by the chart name
#[derive(Debug, Clone)]
pub struct TemplateEmitter {
    chart: String,
}

impl TemplateEmitter {
    pub fn new(chart: impl Into<String>) -> Self {
        Self {
            chart: chart.into(),
        }
    }

    /// Fully qualified helper name, e.g. `shop.fullname`
    pub fn helper(&self, name: &str) -> String {
        format!("{}.{}", self.chart, name)
    }

    /// All templates as `(file name, template)`, in [`TEMPLATE_FILES`] order
    pub fn emit(&self) -> Vec<(&'static str, Template)> {
        vec![
            (TEMPLATE_FILES[0], self.helpers()),
            (TEMPLATE_FILES[1], self.deployment(ServiceRole::Backend)),
            (TEMPLATE_FILES[2], self.service(ServiceRole::Backend)),
            (TEMPLATE_FILES[3], self.deployment(ServiceRole::Frontend)),
            (TEMPLATE_FILES[4], self.service(ServiceRole::Frontend)),
            (TEMPLATE_FILES[5], self.bundles(BundleKind::ConfigMap)),
            (TEMPLATE_FILES[6], self.bundles(BundleKind::Secret)),
        ]
    }

    /// Shared naming and label helpers
    pub fn helpers(&self) -> Template {
        let chart_name = || Argument::field(FieldAccess::dot(&["Chart", "Name"]));
        let name_override = || Argument::field(FieldAccess::dot(&["Values", "nameOverride"]));

        TemplateBuilder::new()
            .comment("Chart name, overridable with nameOverride")
            .text("\n")
            .define(&self.helper("name"), |b| {
                b.output_trimmed(truncated(Pipeline::of(Command::call(
                    "default",
                    vec![chart_name(), name_override()],
                ))))
                .text("\n")
            })
            .text("\n")
            .comment("Fully qualified release name, limited to the object-name length")
            .text("\n")
            .define(&self.helper("fullname"), |b| {
                b.if_else(
                    0,
                    Pipeline::of(Command::Field(FieldAccess::dot(&["Values", "fullnameOverride"]))),
                    |b| {
                        b.output_trimmed(truncated(Pipeline::of(Command::Field(FieldAccess::dot(
                            &["Values", "fullnameOverride"],
                        )))))
                        .text("\n")
                    },
                    |b| {
                        b.output_trimmed(Pipeline::declare(
                            "name",
                            Command::call("default", vec![chart_name(), name_override()]),
                        ))
                        .text("\n")
                        .if_else(
                            0,
                            Pipeline::of(Command::call(
                                "contains",
                                vec![
                                    Argument::var("name"),
                                    Argument::field(FieldAccess::dot(&["Release", "Name"])),
                                ],
                            )),
                            |b| {
                                b.output_trimmed(truncated(Pipeline::of(Command::Field(
                                    FieldAccess::dot(&["Release", "Name"]),
                                ))))
                                .text("\n")
                            },
                            |b| {
                                b.output_trimmed(truncated(Pipeline::of(Command::call(
                                    "printf",
                                    vec![
                                        Argument::string("%s-%s"),
                                        Argument::field(FieldAccess::dot(&["Release", "Name"])),
                                        Argument::var("name"),
                                    ],
                                ))))
                                .text("\n")
                            },
                        )
                    },
                )
            })
            .text("\n")
            .comment("Chart label value")
            .text("\n")
            .define(&self.helper("chart"), |b| {
                b.output_trimmed(truncated(
                    Pipeline::of(Command::call(
                        "printf",
                        vec![
                            Argument::string("%s-%s"),
                            chart_name(),
                            Argument::field(FieldAccess::dot(&["Chart", "Version"])),
                        ],
                    ))
                    .pipe(Command::call(
                        "replace",
                        vec![Argument::string("+"), Argument::string("_")],
                    )),
                ))
                .text("\n")
            })
            .text("\n")
            .comment("Common labels")
            .text("\n")
            .define(&self.helper("labels"), |b| {
                b.value_line("helm.sh/chart: ", self.include("chart", Argument::dot()))
                    .output(self.include("selectorLabels", Argument::dot()))
                    .text("\n")
                    .value_line(
                        "app.kubernetes.io/version: ",
                        Pipeline::of(Command::Field(FieldAccess::dot(&["Chart", "AppVersion"])))
                            .pipe(Command::func("quote")),
                    )
                    .value_line(
                        "app.kubernetes.io/managed-by: ",
                        Pipeline::of(Command::Field(FieldAccess::dot(&["Release", "Service"]))),
                    )
            })
            .text("\n")
            .comment("Selector labels")
            .text("\n")
            .define(&self.helper("selectorLabels"), |b| {
                b.value_line("app.kubernetes.io/name: ", self.include("name", Argument::dot()))
                    .value_line(
                        "app.kubernetes.io/instance: ",
                        Pipeline::of(Command::Field(FieldAccess::dot(&["Release", "Name"]))),
                    )
            })
            .text("\n")
            .comment("Object name of a component; expects a dict with root and component")
            .text("\n")
            .define(&self.helper("componentName"), |b| {
                b.output_trimmed(truncated(Pipeline::of(Command::call(
                    "printf",
                    vec![
                        Argument::string("%s-%s"),
                        Argument::pipeline(self.include(
                            "fullname",
                            Argument::field(FieldAccess::dot(&["root"])),
                        )),
                        Argument::field(FieldAccess::dot(&["component"])),
                    ],
                ))))
                .text("\n")
            })
            .text("\n")
            .comment("Selector labels of a component; expects a dict with root and key")
            .text("\n")
            .define(&self.helper("componentSelectorLabels"), |b| {
                b.value_line(
                    "",
                    self.include("selectorLabels", Argument::field(FieldAccess::dot(&["root"]))),
                )
                .value_line(
                    "app.kubernetes.io/component: ",
                    Pipeline::of(Command::Field(FieldAccess::dot(&["key"])))
                        .pipe(Command::func("quote")),
                )
            })
            .build()
    }

    /// Deployments for every enabled service of a role
    pub fn deployment(&self, role: ServiceRole) -> Template {
        let (probe_path, probe_port) = match role {
            ServiceRole::Backend => ("/health", "health"),
            ServiceRole::Frontend => ("/", "http"),
        };

        self.for_each_service(role, |b| {
            b.line("---")
                .line("apiVersion: apps/v1")
                .line("kind: Deployment")
                .line("metadata:")
                .value_line("  name: ", self.component_name("svc"))
                .line("  labels:")
                .trimmed_line(4, nindent(self.include("labels", Argument::root()), 4))
                .value_line("    app.kubernetes.io/component: ", quoted_var("key"))
                .line("spec:")
                .value_line("  replicas: ", Pipeline::of(Command::Field(FieldAccess::var("svc", &["replicas"]))))
                .line("  selector:")
                .line("    matchLabels:")
                .trimmed_line(6, nindent(self.component_selector_labels(), 6))
                .line("  template:")
                .line("    metadata:")
                .line("      labels:")
                .trimmed_line(8, nindent(self.component_selector_labels(), 8))
                .line("    spec:")
                .line("      containers:")
                .value_line(
                    "        - name: ",
                    Pipeline::of(Command::Field(FieldAccess::var("svc", &["component"]))),
                )
                .value_line(
                    "          image: ",
                    Pipeline::of(Command::Field(FieldAccess::var("svc", &["image"])))
                        .pipe(Command::func("quote")),
                )
                .line("          ports:")
                .range(
                    12,
                    Some(RangeVars::pair("portName", "port")),
                    Pipeline::of(Command::Field(FieldAccess::var("svc", &["ports"]))),
                    |b| {
                        b.value_line("            - name: ", Pipeline::of(Command::var("portName")))
                            .value_line("              containerPort: ", Pipeline::of(Command::var("port")))
                            .line("              protocol: TCP")
                    },
                )
                .line("          env:")
                .trimmed_line(12, to_yaml(FieldAccess::var("svc", &["env"]), 12))
                .line("          livenessProbe:")
                .line("            httpGet:")
                .line(&format!("              path: {}", probe_path))
                .line(&format!("              port: {}", probe_port))
                .line("          readinessProbe:")
                .line("            httpGet:")
                .line(&format!("              path: {}", probe_path))
                .line(&format!("              port: {}", probe_port))
                .line("          resources:")
                .trimmed_line(12, to_yaml(FieldAccess::var("svc", &["resources"]), 12))
        })
    }

    /// ClusterIP services for every enabled service of a role
    ///
    /// The selector is produced by the same helper and arguments as the
    /// deployment's pod labels.
    pub fn service(&self, role: ServiceRole) -> Template {
        self.for_each_service(role, |b| {
            b.line("---")
                .line("apiVersion: v1")
                .line("kind: Service")
                .line("metadata:")
                .value_line("  name: ", self.component_name("svc"))
                .line("  labels:")
                .trimmed_line(4, nindent(self.include("labels", Argument::root()), 4))
                .value_line("    app.kubernetes.io/component: ", quoted_var("key"))
                .line("spec:")
                .line("  type: ClusterIP")
                .line("  selector:")
                .trimmed_line(4, nindent(self.component_selector_labels(), 4))
                .line("  ports:")
                .range(
                    4,
                    Some(RangeVars::pair("portName", "port")),
                    Pipeline::of(Command::Field(FieldAccess::var("svc", &["ports"]))),
                    |b| {
                        b.value_line("    - name: ", Pipeline::of(Command::var("portName")))
                            .value_line("      port: ", Pipeline::of(Command::var("port")))
                            .value_line("      targetPort: ", Pipeline::of(Command::var("portName")))
                            .line("      protocol: TCP")
                    },
                )
        })
    }

    fn bundles(&self, kind: BundleKind) -> Template {
        let (values_key, object_kind) = match kind {
            BundleKind::ConfigMap => ("globalConfigMaps", "ConfigMap"),
            BundleKind::Secret => ("globalSecrets", "Secret"),
        };

        let mut value = Pipeline::of(Command::var("value"));
        if kind == BundleKind::Secret {
            value = value.pipe(Command::func("b64enc"));
        }
        let value = value.pipe(Command::func("quote"));

        TemplateBuilder::new()
            .range(
                0,
                Some(RangeVars::pair("key", "bundle")),
                Pipeline::of(Command::Field(FieldAccess::dot(&["Values", values_key]))),
                |b| {
                    let b = b
                        .line("---")
                        .line("apiVersion: v1")
                        .line(&format!("kind: {}", object_kind))
                        .line("metadata:")
                        .value_line("  name: ", self.component_name("bundle"))
                        .line("  labels:")
                        .trimmed_line(4, nindent(self.include("labels", Argument::root()), 4));
                    let b = match kind {
                        BundleKind::ConfigMap => b,
                        BundleKind::Secret => b.line("type: Opaque"),
                    };
                    b.line("data:").range(
                        2,
                        Some(RangeVars::pair("name", "value")),
                        Pipeline::of(Command::Field(FieldAccess::var("bundle", &["data"]))),
                        |b| {
                            b.text("  ")
                                .output(quoted_var("name"))
                                .text(": ")
                                .output(value)
                                .text("\n")
                        },
                    )
                },
            )
            .build()
    }

    /// `range $key, $svc := .Values.<role>` guarded by `$svc.enabled`
    fn for_each_service(
        &self,
        role: ServiceRole,
        body: impl FnOnce(TemplateBuilder) -> TemplateBuilder,
    ) -> Template {
        TemplateBuilder::new()
            .range(
                0,
                Some(RangeVars::pair("key", "svc")),
                Pipeline::of(Command::Field(FieldAccess::dot(&["Values", role.as_str()]))),
                |b| {
                    b.if_(
                        0,
                        Pipeline::of(Command::Field(FieldAccess::var("svc", &["enabled"]))),
                        body,
                    )
                },
            )
            .build()
    }

    /// `include "<chart>.<helper>" arg`
    fn include(&self, helper: &str, arg: Argument) -> Pipeline {
        Pipeline::of(Command::call(
            "include",
            vec![Argument::string(self.helper(helper)), arg],
        ))
    }

    /// Object name of the component whose values are bound to `$var`
    fn component_name(&self, var: &str) -> Pipeline {
        self.include(
            "componentName",
            dict(vec![
                ("root", Argument::root()),
                ("component", Argument::field(FieldAccess::var(var, &["component"]))),
            ]),
        )
    }

    /// Selector labels keyed by the original service key in `$key`
    fn component_selector_labels(&self) -> Pipeline {
        self.include(
            "componentSelectorLabels",
            dict(vec![("root", Argument::root()), ("key", Argument::var("key"))]),
        )
    }
}

/// `(dict "k1" v1 "k2" v2)`
fn dict(entries: Vec<(&str, Argument)>) -> Argument {
    let args = entries
        .into_iter()
        .flat_map(|(key, value)| [Argument::string(key), value])
        .collect();
    Argument::pipeline(Pipeline::of(Command::call("dict", args)))
}

/// `pipeline | trunc 63 | trimSuffix "-"`
fn truncated(pipeline: Pipeline) -> Pipeline {
    pipeline
        .pipe(Command::call("trunc", vec![Argument::int(NAME_LIMIT)]))
        .pipe(Command::call("trimSuffix", vec![Argument::string("-")]))
}

fn nindent(pipeline: Pipeline, width: i64) -> Pipeline {
    pipeline.pipe(Command::call("nindent", vec![Argument::int(width)]))
}

fn to_yaml(field: FieldAccess, width: i64) -> Pipeline {
    nindent(
        Pipeline::of(Command::call("toYaml", vec![Argument::field(field)])),
        width,
    )
}

fn quoted_var(name: &str) -> Pipeline {
    Pipeline::of(Command::var(name)).pipe(Command::func("quote"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::check_templates;

    fn rendered() -> Vec<(String, String)> {
        TemplateEmitter::new("shop")
            .emit()
            .into_iter()
            .map(|(name, template)| (name.to_string(), template.to_string()))
            .collect()
    }

    fn source(name: &str) -> String {
        rendered()
            .into_iter()
            .find(|(file, _)| file == name)
            .map(|(_, source)| source)
            .unwrap()
    }

    #[test]
    fn test_emits_files_in_order() {
        let names: Vec<String> = rendered().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, TEMPLATE_FILES.to_vec());
    }

    #[test]
    fn test_emitted_templates_pass_checks() {
        check_templates(&rendered()).unwrap();
    }

    #[test]
    fn test_emitted_templates_round_trip_through_parser() {
        for (name, template) in TemplateEmitter::new("shop").emit() {
            let parsed = crate::parser::parse(&template.to_string()).unwrap();
            assert_eq!(parsed.template, template, "{} does not round-trip", name);
        }
    }

    #[test]
    fn test_helpers_define_every_name() {
        let helpers = source(HELPERS_FILE);
        for name in [
            "name",
            "fullname",
            "chart",
            "labels",
            "selectorLabels",
            "componentName",
            "componentSelectorLabels",
        ] {
            assert!(
                helpers.contains(&format!("{{{{- define \"shop.{}\" -}}}}", name)),
                "missing helper {}",
                name
            );
        }
        assert!(helpers.contains("| trunc 63 | trimSuffix \"-\""));
    }

    #[test]
    fn test_helpers_template() {
        insta::assert_snapshot!(source(HELPERS_FILE), @r###"
        {{/* Chart name, overridable with nameOverride */}}
        {{- define "shop.name" -}}
        {{- default .Chart.Name .Values.nameOverride | trunc 63 | trimSuffix "-" }}
        {{- end }}

        {{/* Fully qualified release name, limited to the object-name length */}}
        {{- define "shop.fullname" -}}
        {{- if .Values.fullnameOverride }}
        {{- .Values.fullnameOverride | trunc 63 | trimSuffix "-" }}
        {{- else }}
        {{- $name := default .Chart.Name .Values.nameOverride }}
        {{- if contains $name .Release.Name }}
        {{- .Release.Name | trunc 63 | trimSuffix "-" }}
        {{- else }}
        {{- printf "%s-%s" .Release.Name $name | trunc 63 | trimSuffix "-" }}
        {{- end }}
        {{- end }}
        {{- end }}

        {{/* Chart label value */}}
        {{- define "shop.chart" -}}
        {{- printf "%s-%s" .Chart.Name .Chart.Version | replace "+" "_" | trunc 63 | trimSuffix "-" }}
        {{- end }}

        {{/* Common labels */}}
        {{- define "shop.labels" -}}
        helm.sh/chart: {{ include "shop.chart" . }}
        {{ include "shop.selectorLabels" . }}
        app.kubernetes.io/version: {{ .Chart.AppVersion | quote }}
        app.kubernetes.io/managed-by: {{ .Release.Service }}
        {{- end }}

        {{/* Selector labels */}}
        {{- define "shop.selectorLabels" -}}
        app.kubernetes.io/name: {{ include "shop.name" . }}
        app.kubernetes.io/instance: {{ .Release.Name }}
        {{- end }}

        {{/* Object name of a component; expects a dict with root and component */}}
        {{- define "shop.componentName" -}}
        {{- printf "%s-%s" (include "shop.fullname" .root) .component | trunc 63 | trimSuffix "-" }}
        {{- end }}

        {{/* Selector labels of a component; expects a dict with root and key */}}
        {{- define "shop.componentSelectorLabels" -}}
        {{ include "shop.selectorLabels" .root }}
        app.kubernetes.io/component: {{ .key | quote }}
        {{- end }}
        "###);
    }

    #[test]
    fn test_selector_matches_pod_labels() {
        let selector = r#"include "shop.componentSelectorLabels" (dict "root" $ "key" $key)"#;

        let deployment = source("backend-deployment.yaml");
        assert!(deployment.contains(&format!("      {{{{- {} | nindent 6 }}}}", selector)));
        assert!(deployment.contains(&format!("        {{{{- {} | nindent 8 }}}}", selector)));

        let service = source("backend-service.yaml");
        assert!(service.contains(&format!("    {{{{- {} | nindent 4 }}}}", selector)));
    }

    #[test]
    fn test_object_names_use_normalized_component() {
        let name = r#"  name: {{ include "shop.componentName" (dict "root" $ "component" $svc.component) }}"#;
        for file in [
            "backend-deployment.yaml",
            "backend-service.yaml",
            "frontend-deployment.yaml",
            "frontend-service.yaml",
        ] {
            assert!(source(file).contains(name), "{} lacks component name", file);
        }
    }

    #[test]
    fn test_deployment_iterates_values() {
        let backend = source("backend-deployment.yaml");
        assert!(backend.starts_with("{{- range $key, $svc := .Values.backend }}\n{{- if $svc.enabled }}\n---\n"));
        assert!(backend.contains("{{- toYaml $svc.env | nindent 12 }}"));
        assert!(backend.contains("              port: health"));
        assert!(backend.ends_with("{{- end }}\n{{- end }}\n"));

        let frontend = source("frontend-deployment.yaml");
        assert!(frontend.starts_with("{{- range $key, $svc := .Values.frontend }}"));
        assert!(frontend.contains("              port: http"));
    }

    #[test]
    fn test_secret_values_are_encoded() {
        let secrets = source("secrets.yaml");
        assert!(secrets.contains("kind: Secret\n"));
        assert!(secrets.contains("type: Opaque\n"));
        assert!(secrets.contains("  {{ $name | quote }}: {{ $value | b64enc | quote }}\n"));

        let configmaps = source("configmaps.yaml");
        assert!(configmaps.starts_with("{{- range $key, $bundle := .Values.globalConfigMaps }}"));
        assert!(configmaps.contains("  {{ $name | quote }}: {{ $value | quote }}\n"));
        assert!(!configmaps.contains("b64enc"));
    }

    #[test]
    fn test_helper_prefix_is_escaped() {
        let emitter = TemplateEmitter::new("we\"ird");
        let helpers = emitter.helpers().to_string();
        assert!(helpers.contains(r#"define "we\"ird.name""#));
    }
}
