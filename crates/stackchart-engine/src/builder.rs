//! Fluent construction of [`Template`]s
//!
//! ```
//! use stackchart_engine::ast::{Command, FieldAccess, Pipeline, RangeVars};
//! use stackchart_engine::builder::TemplateBuilder;
//!
//! let template = TemplateBuilder::new()
//!     .range(0, Some(RangeVars::pair("key", "svc")), Pipeline::of(Command::Field(FieldAccess::dot(&["Values", "backend"]))), |b| {
//!         b.text("name: ").output(Pipeline::of(Command::var("key"))).text("\n")
//!     })
//!     .build();
//!
//! assert_eq!(
//!     template.to_string(),
//!     "{{- range $key, $svc := .Values.backend }}\nname: {{ $key }}\n{{- end }}\n"
//! );
//! ```

use crate::ast::{Action, ActionBody, Element, Pipeline, RangeVars, Template};

/// Builds a [`Template`] element by element
///
/// Block methods (`define`, `range`, `if_`, `with`) emit the opening action,
/// the body produced by the closure and the matching `end`, each followed by
/// a newline.
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    elements: Vec<Element>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw text, merging it with preceding text
    pub fn text(mut self, text: &str) -> Self {
        if text.is_empty() {
            return self;
        }
        if let Some(Element::Text(last)) = self.elements.last_mut() {
            last.push_str(text);
        } else {
            self.elements.push(Element::Text(text.to_string()));
        }
        self
    }

    /// Append a line of raw text
    pub fn line(self, text: &str) -> Self {
        self.text(text).text("\n")
    }

    pub fn action(self, body: ActionBody) -> Self {
        self.push_action(false, false, body)
    }

    /// `{{- body }}`
    pub fn trimmed(self, body: ActionBody) -> Self {
        self.push_action(true, false, body)
    }

    pub fn comment(self, text: &str) -> Self {
        self.action(ActionBody::Comment(text.to_string()))
    }

    /// `{{ pipeline }}`
    pub fn output(self, pipeline: Pipeline) -> Self {
        self.action(ActionBody::Pipeline(pipeline))
    }

    /// `{{- pipeline }}`
    pub fn output_trimmed(self, pipeline: Pipeline) -> Self {
        self.trimmed(ActionBody::Pipeline(pipeline))
    }

    /// `prefix{{ pipeline }}` on its own line
    pub fn value_line(self, prefix: &str, pipeline: Pipeline) -> Self {
        self.text(prefix).output(pipeline).text("\n")
    }

    /// An indented `{{- pipeline }}` line, for output that carries its own
    /// leading newline (`nindent`)
    pub fn trimmed_line(self, indent: usize, pipeline: Pipeline) -> Self {
        self.text(&" ".repeat(indent)).output_trimmed(pipeline).text("\n")
    }

    /// `{{- define "name" -}}` ... `{{- end }}`
    pub fn define(self, name: &str, body: impl FnOnce(Self) -> Self) -> Self {
        let open = self
            .push_action(true, true, ActionBody::Define(name.to_string()))
            .text("\n");
        body(open).trimmed(ActionBody::End).text("\n")
    }

    pub fn range(
        self,
        indent: usize,
        vars: Option<RangeVars>,
        pipeline: Pipeline,
        body: impl FnOnce(Self) -> Self,
    ) -> Self {
        self.block(indent, ActionBody::Range { vars, pipeline }, body)
    }

    pub fn if_(self, indent: usize, condition: Pipeline, body: impl FnOnce(Self) -> Self) -> Self {
        self.block(indent, ActionBody::If(condition), body)
    }

    /// `if` with an `else` branch
    pub fn if_else(
        self,
        indent: usize,
        condition: Pipeline,
        then: impl FnOnce(Self) -> Self,
        otherwise: impl FnOnce(Self) -> Self,
    ) -> Self {
        let pad = " ".repeat(indent);
        let open = self.text(&pad).trimmed(ActionBody::If(condition)).text("\n");
        let branch = then(open).text(&pad).trimmed(ActionBody::Else).text("\n");
        otherwise(branch).text(&pad).trimmed(ActionBody::End).text("\n")
    }

    pub fn with(self, indent: usize, pipeline: Pipeline, body: impl FnOnce(Self) -> Self) -> Self {
        self.block(indent, ActionBody::With(pipeline), body)
    }

    pub fn build(self) -> Template {
        Template {
            elements: self.elements,
        }
    }

    fn block(self, indent: usize, open: ActionBody, body: impl FnOnce(Self) -> Self) -> Self {
        let pad = " ".repeat(indent);
        let open = self.text(&pad).trimmed(open).text("\n");
        body(open).text(&pad).trimmed(ActionBody::End).text("\n")
    }

    fn push_action(mut self, trim_left: bool, trim_right: bool, body: ActionBody) -> Self {
        self.elements.push(Element::Action(Action {
            trim_left,
            trim_right,
            body,
        }));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Command, FieldAccess};

    fn field(path: &[&str]) -> Pipeline {
        Pipeline::of(Command::Field(FieldAccess::dot(path)))
    }

    #[test]
    fn test_text_is_merged() {
        let template = TemplateBuilder::new().text("a").line("b").text("").text("c").build();
        assert_eq!(template.elements, vec![Element::Text("ab\nc".into())]);
    }

    #[test]
    fn test_define_block() {
        let template = TemplateBuilder::new()
            .define("shop.name", |b| b.output_trimmed(field(&["Chart", "Name"])).text("\n"))
            .build();
        assert_eq!(
            template.to_string(),
            "{{- define \"shop.name\" -}}\n{{- .Chart.Name }}\n{{- end }}\n"
        );
    }

    #[test]
    fn test_indented_blocks() {
        let template = TemplateBuilder::new()
            .if_(2, field(&["Values", "enabled"]), |b| b.line("  on: true"))
            .build();
        assert_eq!(
            template.to_string(),
            "  {{- if .Values.enabled }}\n  on: true\n  {{- end }}\n"
        );
    }

    #[test]
    fn test_if_else() {
        let template = TemplateBuilder::new()
            .if_else(0, field(&["a"]), |b| b.line("x"), |b| b.line("y"))
            .build();
        assert_eq!(
            template.to_string(),
            "{{- if .a }}\nx\n{{- else }}\ny\n{{- end }}\n"
        );
    }

    #[test]
    fn test_value_line_and_comment() {
        let template = TemplateBuilder::new()
            .comment("generated")
            .text("\n")
            .value_line("replicas: ", field(&["Values", "replicas"]))
            .trimmed_line(4, field(&["labels"]))
            .build();
        assert_eq!(
            template.to_string(),
            "{{/* generated */}}\nreplicas: {{ .Values.replicas }}\n    {{- .labels }}\n"
        );
    }
}
