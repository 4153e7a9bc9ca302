//! Typed representation of Go templates
//!
//! Chart templates are assembled from these nodes and rendered through
//! [`fmt::Display`], which produces Go template syntax. String literals are
//! escaped on render, so no value placed in a literal can terminate it.

use std::fmt;

/// A complete Go template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    pub elements: Vec<Element>,
}

/// Raw text or an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// Text outside `{{ }}`
    Text(String),
    /// A directive inside `{{ }}`
    Action(Action),
}

/// A directive inside `{{ }}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// `{{-`
    pub trim_left: bool,
    /// `-}}`
    pub trim_right: bool,
    pub body: ActionBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionBody {
    /// `{{/* text */}}`
    Comment(String),
    If(Pipeline),
    ElseIf(Pipeline),
    Else,
    End,
    Range {
        vars: Option<RangeVars>,
        pipeline: Pipeline,
    },
    With(Pipeline),
    Define(String),
    Template {
        name: String,
        pipeline: Option<Pipeline>,
    },
    Block {
        name: String,
        pipeline: Pipeline,
    },
    Pipeline(Pipeline),
}

impl ActionBody {
    /// Keyword of an action that opens a block closed by `end`
    pub fn opens_block(&self) -> Option<&'static str> {
        match self {
            Self::If(_) => Some("if"),
            Self::Range { .. } => Some("range"),
            Self::With(_) => Some("with"),
            Self::Define(_) => Some("define"),
            Self::Block { .. } => Some("block"),
            _ => None,
        }
    }

    /// Every pipeline directly held by this action
    pub fn pipelines(&self) -> Vec<&Pipeline> {
        match self {
            Self::If(p) | Self::ElseIf(p) | Self::With(p) | Self::Pipeline(p) => vec![p],
            Self::Range { pipeline, .. } | Self::Block { pipeline, .. } => vec![pipeline],
            Self::Template { pipeline, .. } => pipeline.iter().collect(),
            Self::Comment(_) | Self::Else | Self::End | Self::Define(_) => Vec::new(),
        }
    }
}

/// `$key, $value :=` in a range clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeVars {
    pub key: Option<String>,
    pub value: String,
}

impl RangeVars {
    pub fn pair(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
        }
    }
}

/// Commands separated by `|`, with an optional `$var :=` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub decl: Option<String>,
    pub commands: Vec<Command>,
}

impl Pipeline {
    pub fn of(command: Command) -> Self {
        Self {
            decl: None,
            commands: vec![command],
        }
    }

    pub fn declare(var: impl Into<String>, command: Command) -> Self {
        Self {
            decl: Some(var.into()),
            commands: vec![command],
        }
    }

    /// Append `| command`
    pub fn pipe(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Visit every command, including those nested in parentheses
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Command)) {
        for command in &self.commands {
            visit(command);
            match command {
                Command::Parenthesized(inner) => inner.walk(visit),
                Command::Function { args, .. } => {
                    for arg in args {
                        if let Argument::Pipeline(inner) = arg {
                            inner.walk(visit);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Field(FieldAccess),
    /// `$name`; the empty name is the root variable `$`
    Variable(String),
    Function { name: String, args: Vec<Argument> },
    Literal(Literal),
    Parenthesized(Box<Pipeline>),
}

impl Command {
    pub fn call(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self::Function {
            name: name.into(),
            args,
        }
    }

    /// A function invoked with no arguments, typically after `|`
    pub fn func(name: impl Into<String>) -> Self {
        Self::call(name, Vec::new())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }
}

/// `.a.b`, `$.a.b` or `$var.a.b`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccess {
    pub base: FieldBase,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldBase {
    Dot,
    Root,
    Variable(String),
}

impl FieldAccess {
    /// Field of the current context; an empty path is `.` itself
    pub fn dot(path: &[&str]) -> Self {
        Self::with_base(FieldBase::Dot, path)
    }

    pub fn root(path: &[&str]) -> Self {
        Self::with_base(FieldBase::Root, path)
    }

    pub fn var(name: &str, path: &[&str]) -> Self {
        Self::with_base(FieldBase::Variable(name.to_string()), path)
    }

    fn with_base(base: FieldBase, path: &[&str]) -> Self {
        Self {
            base,
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Field(FieldAccess),
    Variable(String),
    Literal(Literal),
    /// Parenthesized pipeline
    Pipeline(Box<Pipeline>),
}

impl Argument {
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    pub fn field(field: FieldAccess) -> Self {
        Self::Field(field)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// `.`
    pub fn dot() -> Self {
        Self::Field(FieldAccess::dot(&[]))
    }

    /// `$`
    pub fn root() -> Self {
        Self::Variable(String::new())
    }

    pub fn pipeline(pipeline: Pipeline) -> Self {
        Self::Pipeline(Box::new(pipeline))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    String(String),
    Int(i64),
    Bool(bool),
    Nil,
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            match element {
                Element::Text(text) => f.write_str(text)?,
                Element::Action(action) => write!(f, "{}", action)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let comment = matches!(self.body, ActionBody::Comment(_));
        let open = match (self.trim_left, comment) {
            (true, _) => "{{- ",
            (false, true) => "{{",
            (false, false) => "{{ ",
        };
        let close = match (self.trim_right, comment) {
            (true, _) => " -}}",
            (false, true) => "}}",
            (false, false) => " }}",
        };
        write!(f, "{}{}{}", open, self.body, close)
    }
}

impl fmt::Display for ActionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment(text) => write!(f, "/* {} */", text),
            Self::If(p) => write!(f, "if {}", p),
            Self::ElseIf(p) => write!(f, "else if {}", p),
            Self::Else => f.write_str("else"),
            Self::End => f.write_str("end"),
            Self::Range { vars, pipeline } => {
                f.write_str("range ")?;
                if let Some(vars) = vars {
                    write!(f, "{} ", vars)?;
                }
                write!(f, "{}", pipeline)
            }
            Self::With(p) => write!(f, "with {}", p),
            Self::Define(name) => write!(f, "define {}", Literal::String(name.clone())),
            Self::Template { name, pipeline } => {
                write!(f, "template {}", Literal::String(name.clone()))?;
                if let Some(p) = pipeline {
                    write!(f, " {}", p)?;
                }
                Ok(())
            }
            Self::Block { name, pipeline } => {
                write!(f, "block {} {}", Literal::String(name.clone()), pipeline)
            }
            Self::Pipeline(p) => write!(f, "{}", p),
        }
    }
}

impl fmt::Display for RangeVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "${}, ${} :=", key, self.value),
            None => write!(f, "${} :=", self.value),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(decl) = &self.decl {
            write!(f, "${} := ", decl)?;
        }
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", command)?;
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => write!(f, "{}", field),
            Self::Variable(name) => write!(f, "${}", name),
            Self::Function { name, args } => {
                f.write_str(name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            Self::Literal(lit) => write!(f, "{}", lit),
            Self::Parenthesized(p) => write!(f, "({})", p),
        }
    }
}

impl fmt::Display for FieldAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            FieldBase::Dot if self.path.is_empty() => return f.write_str("."),
            FieldBase::Dot => {}
            FieldBase::Root => f.write_str("$")?,
            FieldBase::Variable(name) => write!(f, "${}", name)?,
        }
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => write!(f, "{}", field),
            Self::Variable(name) => write!(f, "${}", name),
            Self::Literal(lit) => write!(f, "{}", lit),
            Self::Pipeline(p) => write!(f, "({})", p),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Self::Int(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Nil => f.write_str("nil"),
        }
    }
}
