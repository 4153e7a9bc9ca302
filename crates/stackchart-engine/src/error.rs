//! Engine error types

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode, SourceSpan};
use stackchart_core::CoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(code(stackchart::config))]
    Core(#[from] CoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error("Artifact `{path}` still contains the reference expression `{expression}`")]
    #[diagnostic(
        code(stackchart::render::unresolved_reference),
        help("reference expressions must be resolved before a chart is written")
    )]
    UnresolvedReference { path: String, expression: String },

    #[error("Failed to write artifact {index} of {total} (`{path}`): {source}")]
    #[diagnostic(code(stackchart::write))]
    Write {
        index: usize,
        total: usize,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error at {path}: {source}")]
    #[diagnostic(code(stackchart::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Category of a template check failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    Syntax,
    Unbalanced,
    MisplacedElse,
    NestedDefine,
    UnknownHelper,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Unbalanced => "unbalanced",
            Self::MisplacedElse => "misplaced_else",
            Self::NestedDefine => "nested_define",
            Self::UnknownHelper => "unknown_helper",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Syntax => "template syntax error here",
            Self::Unbalanced => "block opened or closed here",
            Self::MisplacedElse => "else outside a block",
            Self::NestedDefine => "define inside a block",
            Self::UnknownHelper => "helper referenced here",
        }
    }
}

/// A generated template that does not pass the parser checks
#[derive(Error, Debug)]
#[error("{message}")]
pub struct TemplateError {
    pub message: String,
    pub kind: TemplateErrorKind,
    pub template: String,
    pub src: NamedSource<String>,
    pub span: Option<SourceSpan>,
    pub suggestion: Option<String>,
}

impl TemplateError {
    pub fn new(
        kind: TemplateErrorKind,
        message: impl Into<String>,
        template_name: &str,
        template_source: &str,
    ) -> Self {
        Self {
            message: message.into(),
            kind,
            template: template_name.to_string(),
            src: NamedSource::new(template_name, template_source.to_string()),
            span: None,
            suggestion: None,
        }
    }

    /// Point the diagnostic at a byte range of the template
    pub fn at(mut self, start: usize, len: usize) -> Self {
        self.span = Some(SourceSpan::from((start, len)));
        self
    }

    /// Point the diagnostic at the whole line of `source` containing `offset`
    pub fn at_line_of(self, source: &str, offset: usize) -> Self {
        let (start, len) = line_bounds(source, offset);
        self.at(start, len)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }

    /// Name of the template that failed
    pub fn template_name(&self) -> &str {
        &self.template
    }
}

impl Diagnostic for TemplateError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!(
            "stackchart::template::{}",
            self.kind.to_code_string()
        )))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.suggestion
            .as_ref()
            .map(|s| Box::new(s) as Box<dyn fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(self.kind.label().to_string()),
            span,
        ))))
    }
}

/// Start and length of the line containing `offset`
fn line_bounds(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let start = source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = source[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(source.len());
    (start, end - start)
}

pub type Result<T> = std::result::Result<T, EngineError>;
