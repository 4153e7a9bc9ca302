//! Structural checks on emitted templates
//!
//! Every template is parsed back with the Go template grammar, then checked
//! for balanced blocks, `else` placement, top-level `define`s, and references
//! to helpers that exist.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::ast::{ActionBody, Argument, Command, Element, Literal, Template};
use crate::error::{TemplateError, TemplateErrorKind};
use crate::parser::parse;

/// File holding the shared helper definitions
pub const HELPERS_FILE: &str = "_helpers.yaml";

/// Check a chart's templates, given as `(file name, source)` pairs
///
/// Helpers defined in [`HELPERS_FILE`] are visible to every template.
pub fn check_templates(templates: &[(String, String)]) -> Result<(), TemplateError> {
    let mut shared = BTreeSet::new();
    if let Some((name, source)) = templates.iter().find(|(name, _)| name == HELPERS_FILE) {
        let helpers = check_template(name, source, &BTreeSet::new())?;
        shared = defined_helpers(&helpers);
    }

    for (name, source) in templates.iter().filter(|(name, _)| name != HELPERS_FILE) {
        check_template(name, source, &shared)?;
    }
    Ok(())
}

/// Parse and check one template
///
/// `helpers` lists names defined elsewhere; names defined in the template
/// itself are always visible.
pub fn check_template(
    name: &str,
    source: &str,
    helpers: &BTreeSet<String>,
) -> Result<Template, TemplateError> {
    let parsed = parse(source).map_err(|e| {
        TemplateError::new(
            TemplateErrorKind::Syntax,
            format!("invalid template syntax in {}: {}", name, e),
            name,
            source,
        )
        .at_line_of(source, e.offset())
    })?;

    check_blocks(name, source, &parsed.template, &parsed.spans)?;

    let mut visible = helpers.clone();
    visible.extend(defined_helpers(&parsed.template));
    check_helper_references(name, source, &parsed.template, &parsed.spans, &visible)?;

    Ok(parsed.template)
}

/// Names of every `define` in a template
pub fn defined_helpers(template: &Template) -> BTreeSet<String> {
    template
        .elements
        .iter()
        .filter_map(|element| match element {
            Element::Action(action) => match &action.body {
                ActionBody::Define(name) | ActionBody::Block { name, .. } => Some(name.clone()),
                _ => None,
            },
            Element::Text(_) => None,
        })
        .collect()
}

struct OpenBlock {
    keyword: &'static str,
    span: Range<usize>,
    has_else: bool,
}

fn check_blocks(
    name: &str,
    source: &str,
    template: &Template,
    spans: &[Range<usize>],
) -> Result<(), TemplateError> {
    let error = |kind, message: String, span: &Range<usize>| {
        TemplateError::new(kind, message, name, source).at(span.start, span.len())
    };

    let mut stack: Vec<OpenBlock> = Vec::new();

    for (element, span) in template.elements.iter().zip(spans) {
        let Element::Action(action) = element else {
            continue;
        };

        match &action.body {
            ActionBody::Define(helper) if !stack.is_empty() => {
                return Err(error(
                    TemplateErrorKind::NestedDefine,
                    format!("`define \"{}\"` must appear at the top level", helper),
                    span,
                ));
            }
            ActionBody::ElseIf(_) => match stack.last() {
                Some(open) if open.keyword == "if" && !open.has_else => {}
                _ => {
                    return Err(error(
                        TemplateErrorKind::MisplacedElse,
                        "`else if` outside an `if` block".to_string(),
                        span,
                    ));
                }
            },
            ActionBody::Else => match stack.last_mut() {
                Some(open) if matches!(open.keyword, "if" | "range" | "with") && !open.has_else => {
                    open.has_else = true;
                }
                _ => {
                    return Err(error(
                        TemplateErrorKind::MisplacedElse,
                        "`else` outside an `if`, `range` or `with` block".to_string(),
                        span,
                    ));
                }
            },
            ActionBody::End => {
                if stack.pop().is_none() {
                    return Err(error(
                        TemplateErrorKind::Unbalanced,
                        "`end` without an open block".to_string(),
                        span,
                    ));
                }
            }
            body => {
                if let Some(keyword) = body.opens_block() {
                    stack.push(OpenBlock {
                        keyword,
                        span: span.clone(),
                        has_else: false,
                    });
                }
            }
        }
    }

    match stack.pop() {
        Some(open) => Err(error(
            TemplateErrorKind::Unbalanced,
            format!("`{}` block is never closed", open.keyword),
            &open.span,
        )
        .with_suggestion("close the block with `{{- end }}`")),
        None => Ok(()),
    }
}

fn check_helper_references(
    name: &str,
    source: &str,
    template: &Template,
    spans: &[Range<usize>],
    visible: &BTreeSet<String>,
) -> Result<(), TemplateError> {
    for (element, span) in template.elements.iter().zip(spans) {
        let Element::Action(action) = element else {
            continue;
        };

        let mut referenced: Vec<&str> = Vec::new();
        if let ActionBody::Template { name: helper, .. } = &action.body {
            referenced.push(helper);
        }
        for pipeline in action.body.pipelines() {
            pipeline.walk(&mut |command| {
                let Command::Function { name: function, args } = command else {
                    return;
                };
                if let (true, Some(Argument::Literal(Literal::String(helper)))) =
                    (function == "include", args.first())
                {
                    referenced.push(helper);
                }
            });
        }

        if let Some(missing) = referenced.into_iter().find(|helper| !visible.contains(*helper)) {
            let mut err = TemplateError::new(
                TemplateErrorKind::UnknownHelper,
                format!("{} references undefined template `{}`", name, missing),
                name,
                source,
            )
            .at(span.start, span.len());
            if let Some(closest) = closest_helper(missing, visible) {
                err = err.with_suggestion(format!("did you mean `{}`?", closest));
            }
            return Err(err);
        }
    }
    Ok(())
}

fn closest_helper<'a>(missing: &str, visible: &'a BTreeSet<String>) -> Option<&'a str> {
    visible
        .iter()
        .map(|helper| (helper, strsim::levenshtein(missing, helper)))
        .filter(|(_, distance)| *distance <= 3)
        .min_by_key(|(_, distance)| *distance)
        .map(|(helper, _)| helper.as_str())
}
