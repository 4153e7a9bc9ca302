//! Go template parser
//!
//! Reads emitted templates back into the [`ast`](crate::ast) so they can be
//! checked before anything is written.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use std::ops::Range;
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "go_template.pest"]
struct GoTemplateParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{message}")]
    Syntax { message: String, offset: usize },

    #[error("invalid number `{text}`")]
    InvalidNumber { text: String, offset: usize },

    #[error("unexpected {rule:?}")]
    UnexpectedRule { rule: Rule, offset: usize },
}

impl ParseError {
    /// Byte offset the error refers to
    pub fn offset(&self) -> usize {
        match self {
            Self::Syntax { offset, .. }
            | Self::InvalidNumber { offset, .. }
            | Self::UnexpectedRule { offset, .. } => *offset,
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let offset = match e.location {
            pest::error::InputLocation::Pos(pos) => pos,
            pest::error::InputLocation::Span((start, _)) => start,
        };
        ParseError::Syntax {
            message: e.variant.message().into_owned(),
            offset,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// A parsed template with the source range of each element
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    pub template: Template,
    pub spans: Vec<Range<usize>>,
}

/// Parse a Go template
pub fn parse(input: &str) -> Result<ParsedTemplate> {
    let pairs = GoTemplateParser::parse(Rule::template, input)?;

    let mut elements = Vec::new();
    let mut spans = Vec::new();

    for pair in pairs.flat_map(|p| p.into_inner()) {
        let span = pair.as_span();
        let range = span.start()..span.end();
        match pair.as_rule() {
            Rule::text => elements.push(Element::Text(pair.as_str().to_string())),
            Rule::action => elements.push(Element::Action(parse_action(pair)?)),
            _ => continue,
        }
        spans.push(range);
    }

    Ok(ParsedTemplate {
        template: Template { elements },
        spans,
    })
}

fn parse_action(pair: Pair<Rule>) -> Result<Action> {
    let offset = pair.as_span().start();
    let mut trim_left = false;
    let mut trim_right = false;
    let mut body = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::action_start => trim_left = inner.as_str().ends_with('-'),
            Rule::action_end => trim_right = inner.as_str().starts_with('-'),
            _ => body = Some(parse_action_body(inner)?),
        }
    }

    let body = body.ok_or(ParseError::UnexpectedRule {
        rule: Rule::action,
        offset,
    })?;

    Ok(Action {
        trim_left,
        trim_right,
        body,
    })
}

fn parse_action_body(pair: Pair<Rule>) -> Result<ActionBody> {
    let offset = pair.as_span().start();

    match pair.as_rule() {
        Rule::comment => {
            let text = pair.as_str();
            let content = text
                .strip_prefix("/*")
                .and_then(|s| s.strip_suffix("*/"))
                .unwrap_or(text)
                .trim();
            Ok(ActionBody::Comment(content.to_string()))
        }
        Rule::if_action => Ok(ActionBody::If(inner_pipeline(pair)?)),
        Rule::else_if_action => Ok(ActionBody::ElseIf(inner_pipeline(pair)?)),
        Rule::else_action => Ok(ActionBody::Else),
        Rule::end_action => Ok(ActionBody::End),
        Rule::with_action => Ok(ActionBody::With(inner_pipeline(pair)?)),
        Rule::range_action => {
            let mut vars = None;
            let mut pipeline = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::range_vars => vars = Some(parse_range_vars(inner)),
                    Rule::pipeline => pipeline = Some(parse_pipeline(inner)?),
                    _ => {}
                }
            }
            let pipeline = pipeline.ok_or(ParseError::UnexpectedRule {
                rule: Rule::range_action,
                offset,
            })?;
            Ok(ActionBody::Range { vars, pipeline })
        }
        Rule::define_action => {
            let (name, _) = named_pipeline(pair)?;
            Ok(ActionBody::Define(name))
        }
        Rule::template_action => {
            let (name, pipeline) = named_pipeline(pair)?;
            Ok(ActionBody::Template { name, pipeline })
        }
        Rule::block_action => {
            let (name, pipeline) = named_pipeline(pair)?;
            let pipeline = pipeline.ok_or(ParseError::UnexpectedRule {
                rule: Rule::block_action,
                offset,
            })?;
            Ok(ActionBody::Block { name, pipeline })
        }
        Rule::pipeline => Ok(ActionBody::Pipeline(parse_pipeline(pair)?)),
        rule => Err(ParseError::UnexpectedRule { rule, offset }),
    }
}

fn inner_pipeline(pair: Pair<Rule>) -> Result<Pipeline> {
    let offset = pair.as_span().start();
    let rule = pair.as_rule();
    pair.into_inner()
        .find(|inner| inner.as_rule() == Rule::pipeline)
        .map(parse_pipeline)
        .unwrap_or(Err(ParseError::UnexpectedRule { rule, offset }))
}

/// Quoted name and optional pipeline of `define`, `template` and `block`
fn named_pipeline(pair: Pair<Rule>) -> Result<(String, Option<Pipeline>)> {
    let mut name = String::new();
    let mut pipeline = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::string_literal => name = parse_string_literal(inner.as_str()),
            Rule::pipeline => pipeline = Some(parse_pipeline(inner)?),
            _ => {}
        }
    }
    Ok((name, pipeline))
}

fn parse_range_vars(pair: Pair<Rule>) -> RangeVars {
    let mut names: Vec<String> = pair
        .into_inner()
        .filter(|inner| inner.as_rule() == Rule::variable)
        .map(|inner| variable_name(inner.as_str()))
        .collect();

    let value = names.pop().unwrap_or_default();
    RangeVars {
        key: names.pop(),
        value,
    }
}

fn parse_pipeline(pair: Pair<Rule>) -> Result<Pipeline> {
    let mut decl = None;
    let mut commands = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::decl => {
                decl = inner
                    .into_inner()
                    .next()
                    .map(|var| variable_name(var.as_str()));
            }
            Rule::command => commands.push(parse_command(inner)?),
            _ => {}
        }
    }

    Ok(Pipeline { decl, commands })
}

fn parse_command(pair: Pair<Rule>) -> Result<Command> {
    let offset = pair.as_span().start();
    let inner = pair.into_inner().next().ok_or(ParseError::UnexpectedRule {
        rule: Rule::command,
        offset,
    })?;

    match inner.as_rule() {
        Rule::function_call => {
            let mut parts = inner.into_inner();
            let name = parts
                .next()
                .map(|ident| ident.as_str().to_string())
                .unwrap_or_default();
            let args = parts.map(parse_argument).collect::<Result<Vec<_>>>()?;
            Ok(Command::Function { name, args })
        }
        _ => Ok(match parse_argument(inner)? {
            Argument::Field(field) => Command::Field(field),
            Argument::Variable(name) => Command::Variable(name),
            Argument::Literal(lit) => Command::Literal(lit),
            Argument::Pipeline(p) => Command::Parenthesized(p),
        }),
    }
}

fn parse_argument(pair: Pair<Rule>) -> Result<Argument> {
    let offset = pair.as_span().start();

    match pair.as_rule() {
        Rule::field_chain => Ok(Argument::Field(parse_field_chain(pair.as_str()))),
        Rule::variable => Ok(Argument::Variable(variable_name(pair.as_str()))),
        Rule::literal => {
            let lit = pair.into_inner().next().ok_or(ParseError::UnexpectedRule {
                rule: Rule::literal,
                offset,
            })?;
            Ok(Argument::Literal(parse_literal(lit)?))
        }
        Rule::parenthesized => {
            let pipeline = inner_pipeline(pair)?;
            Ok(Argument::Pipeline(Box::new(pipeline)))
        }
        rule => Err(ParseError::UnexpectedRule { rule, offset }),
    }
}

fn parse_field_chain(text: &str) -> FieldAccess {
    if text == "." {
        return FieldAccess::dot(&[]);
    }

    let (base, rest) = match text.strip_prefix('$') {
        Some(after) => {
            let split = after.find('.').unwrap_or(after.len());
            let (name, rest) = after.split_at(split);
            let base = if name.is_empty() {
                FieldBase::Root
            } else {
                FieldBase::Variable(name.to_string())
            };
            (base, rest)
        }
        None => (FieldBase::Dot, text),
    };

    FieldAccess {
        base,
        path: rest
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

fn parse_literal(pair: Pair<Rule>) -> Result<Literal> {
    let offset = pair.as_span().start();
    let text = pair.as_str();

    match pair.as_rule() {
        Rule::string_literal => Ok(Literal::String(parse_string_literal(text))),
        Rule::boolean => Ok(Literal::Bool(text == "true")),
        Rule::nil => Ok(Literal::Nil),
        Rule::int => text
            .parse()
            .map(Literal::Int)
            .map_err(|_| ParseError::InvalidNumber {
                text: text.to_string(),
                offset,
            }),
        rule => Err(ParseError::UnexpectedRule { rule, offset }),
    }
}

fn parse_string_literal(text: &str) -> String {
    if let Some(raw) = text.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        return raw.to_string();
    }

    let inner = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text);

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

fn variable_name(text: &str) -> String {
    text.trim_start_matches('$').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(input: &str) -> ActionBody {
        let parsed = parse(input).unwrap();
        match parsed.template.elements.into_iter().next() {
            Some(Element::Action(action)) => action.body,
            other => panic!("expected an action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_text_and_action_spans() {
        let parsed = parse("name: {{ .Values.name }}\n").unwrap();
        assert_eq!(parsed.template.elements.len(), 3);
        assert_eq!(parsed.spans, vec![0..6, 6..24, 24..25]);
    }

    #[test]
    fn test_parse_trim_markers() {
        let parsed = parse("{{- .x -}}").unwrap();
        match &parsed.template.elements[0] {
            Element::Action(action) => {
                assert!(action.trim_left);
                assert!(action.trim_right);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_range_with_vars() {
        match body("{{- range $key, $svc := .Values.backend }}") {
            ActionBody::Range { vars, pipeline } => {
                assert_eq!(vars, Some(RangeVars::pair("key", "svc")));
                assert_eq!(
                    pipeline.commands,
                    vec![Command::Field(FieldAccess::dot(&["Values", "backend"]))]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_include_with_dict() {
        let parsed = body(r#"{{ include "shop.componentName" (dict "root" $ "component" $svc.component) }}"#);
        let ActionBody::Pipeline(pipeline) = parsed else {
            panic!("expected pipeline");
        };
        let Command::Function { name, args } = &pipeline.commands[0] else {
            panic!("expected function");
        };
        assert_eq!(name, "include");
        assert_eq!(args[0], Argument::string("shop.componentName"));
        let Argument::Pipeline(dict) = &args[1] else {
            panic!("expected parenthesized argument");
        };
        assert_eq!(
            dict.commands[0],
            Command::call(
                "dict",
                vec![
                    Argument::string("root"),
                    Argument::root(),
                    Argument::string("component"),
                    Argument::field(FieldAccess::var("svc", &["component"])),
                ]
            )
        );
    }

    #[test]
    fn test_parse_declaration_and_pipes() {
        let parsed = body(r#"{{- $name := default .Chart.Name .Values.nameOverride | trunc 63 }}"#);
        let ActionBody::Pipeline(pipeline) = parsed else {
            panic!("expected pipeline");
        };
        assert_eq!(pipeline.decl.as_deref(), Some("name"));
        assert_eq!(pipeline.commands.len(), 2);
        assert_eq!(pipeline.commands[1], Command::call("trunc", vec![Argument::int(63)]));
    }

    #[test]
    fn test_parse_keywords_need_boundaries() {
        assert_eq!(body("{{ end }}"), ActionBody::End);
        assert_eq!(body("{{ else }}"), ActionBody::Else);
        assert!(matches!(body("{{ else if .x }}"), ActionBody::ElseIf(_)));
        assert_eq!(body("{{ endpoint }}"), ActionBody::Pipeline(Pipeline::of(Command::func("endpoint"))));
    }

    #[test]
    fn test_parse_comment() {
        assert_eq!(body("{{/* a note */}}"), ActionBody::Comment("a note".into()));
        assert_eq!(body("{{- /* a note */ -}}"), ActionBody::Comment("a note".into()));
    }

    #[test]
    fn test_parse_string_escapes() {
        assert_eq!(
            body(r#"{{ "a\"b\\c" }}"#),
            ActionBody::Pipeline(Pipeline::of(Command::Literal(Literal::String("a\"b\\c".into()))))
        );
    }

    #[test]
    fn test_parse_template_and_define() {
        assert_eq!(body(r#"{{- define "shop.name" -}}"#), ActionBody::Define("shop.name".into()));
        match body(r#"{{ template "shop.name" . }}"#) {
            ActionBody::Template { name, pipeline } => {
                assert_eq!(name, "shop.name");
                assert_eq!(pipeline, Some(Pipeline::of(Command::Field(FieldAccess::dot(&[])))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_action_reports_offset() {
        let err = parse("a: 1\nb: {{ .x \n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.offset() >= 8);
    }

    #[test]
    fn test_display_round_trip() {
        let source = concat!(
            "{{- range $key, $svc := .Values.backend }}\n",
            "name: {{ include \"shop.componentName\" (dict \"root\" $ \"component\" $svc.component) }}\n",
            "{{- if $svc.enabled }}\n",
            "    {{- toYaml $svc.env | nindent 12 }}\n",
            "{{- end }}\n",
            "{{- end }}\n",
        );
        let parsed = parse(source).unwrap();
        assert_eq!(parsed.template.to_string(), source);
    }
}
