//! Static parser for component source modules.
//!
//! Nothing is imported or executed. A module is reduced to the facts discovery
//! needs: its imports, module-level `raise` statements and assignments, and its
//! class declarations with bases, decorators, attributes and methods.

use pest::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

mod expressions;
pub mod lines;
mod statements;

pub use statements::parse_module;

#[derive(pest_derive::Parser)]
#[grammar = "discovery/parser/python.pest"]
pub struct PythonParser;

/// Recoverable parse failure for one source file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// The modelled expression subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PyExpr {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Name(String),
    Attribute {
        value: Box<PyExpr>,
        attr: String,
    },
    Call {
        func: Box<PyExpr>,
        args: Vec<PyExpr>,
        keywords: Vec<(String, PyExpr)>,
    },
    Subscript {
        value: Box<PyExpr>,
        index: Box<PyExpr>,
    },
    List(Vec<PyExpr>),
    Tuple(Vec<PyExpr>),
    Set(Vec<PyExpr>),
    /// `None` key marks a `**spread` entry
    Dict(Vec<(Option<PyExpr>, PyExpr)>),
    Starred(Box<PyExpr>),
    /// Anything outside the subset, kept as source text
    Opaque(String),
}

impl PyExpr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PyExpr::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PyExpr::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PyExpr::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Elements of a list, tuple or set literal.
    pub fn as_sequence(&self) -> Option<&[PyExpr]> {
        match self {
            PyExpr::List(items) | PyExpr::Tuple(items) | PyExpr::Set(items) => Some(items),
            _ => None,
        }
    }

    /// `a.b.c` for names and attribute chains over names.
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            PyExpr::Name(n) => Some(n.clone()),
            PyExpr::Attribute { value, attr } => {
                value.dotted_name().map(|base| format!("{}.{}", base, attr))
            }
            _ => None,
        }
    }

    /// Last segment of a dotted name; for subscripts, the subscripted name.
    pub fn tail_name(&self) -> Option<String> {
        match self {
            PyExpr::Name(n) => Some(n.clone()),
            PyExpr::Attribute { attr, .. } => Some(attr.clone()),
            PyExpr::Subscript { value, .. } => value.tail_name(),
            _ => None,
        }
    }

    /// Tail name of the callee when this is a call.
    pub fn call_name(&self) -> Option<String> {
        match self {
            PyExpr::Call { func, .. } => func.tail_name(),
            _ => None,
        }
    }

    pub fn keyword(&self, name: &str) -> Option<&PyExpr> {
        match self {
            PyExpr::Call { keywords, .. } => {
                keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn positional(&self, index: usize) -> Option<&PyExpr> {
        match self {
            PyExpr::Call { args, .. } => args.get(index),
            _ => None,
        }
    }

    /// Python truthiness for literals; names and calls count as truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            PyExpr::Str(s) => !s.is_empty(),
            PyExpr::Int(n) => *n != 0,
            PyExpr::Float(f) => *f != 0.0,
            PyExpr::Bool(b) => *b,
            PyExpr::None => false,
            PyExpr::List(v) | PyExpr::Tuple(v) | PyExpr::Set(v) => !v.is_empty(),
            PyExpr::Dict(v) => !v.is_empty(),
            _ => true,
        }
    }

    /// Source-like rendering.
    pub fn render(&self) -> String {
        fn join(items: &[PyExpr]) -> String {
            items.iter().map(PyExpr::render).collect::<Vec<_>>().join(", ")
        }
        match self {
            PyExpr::Str(s) => format!("{:?}", s),
            PyExpr::Int(n) => n.to_string(),
            PyExpr::Float(f) => format!("{:?}", f),
            PyExpr::Bool(true) => "True".to_string(),
            PyExpr::Bool(false) => "False".to_string(),
            PyExpr::None => "None".to_string(),
            PyExpr::Name(n) => n.clone(),
            PyExpr::Attribute { value, attr } => format!("{}.{}", value.render(), attr),
            PyExpr::Call {
                func,
                args,
                keywords,
            } => {
                let mut parts: Vec<String> = args.iter().map(PyExpr::render).collect();
                parts.extend(keywords.iter().map(|(k, v)| format!("{}={}", k, v.render())));
                format!("{}({})", func.render(), parts.join(", "))
            }
            PyExpr::Subscript { value, index } => match index.as_ref() {
                PyExpr::Tuple(items) => format!("{}[{}]", value.render(), join(items)),
                other => format!("{}[{}]", value.render(), other.render()),
            },
            PyExpr::List(items) => format!("[{}]", join(items)),
            PyExpr::Tuple(items) if items.len() == 1 => format!("({},)", items[0].render()),
            PyExpr::Tuple(items) => format!("({})", join(items)),
            PyExpr::Set(items) => format!("{{{}}}", join(items)),
            PyExpr::Dict(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| match k {
                        Some(k) => format!("{}: {}", k.render(), v.render()),
                        None => format!("**{}", v.render()),
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            PyExpr::Starred(inner) => format!("*{}", inner.render()),
            PyExpr::Opaque(text) => text.clone(),
        }
    }

    /// JSON projection of literal data; non-literal parts render as strings.
    pub fn to_json(&self) -> Value {
        match self {
            PyExpr::Str(s) => Value::String(s.clone()),
            PyExpr::Int(n) => Value::from(*n),
            PyExpr::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            PyExpr::Bool(b) => Value::Bool(*b),
            PyExpr::None => Value::Null,
            PyExpr::List(items) | PyExpr::Tuple(items) | PyExpr::Set(items) => {
                Value::Array(items.iter().map(PyExpr::to_json).collect())
            }
            PyExpr::Dict(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    if let Some(k) = k {
                        let key = k.as_str().map(str::to_string).unwrap_or_else(|| k.render());
                        map.insert(key, v.to_json());
                    }
                }
                Value::Object(map)
            }
            other => Value::String(other.render()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Import {
    /// `import a.b [as c]`
    Module {
        module: String,
        alias: Option<String>,
        line: usize,
        guarded: bool,
    },
    /// `from [.]a import b [as c]`; `level` counts leading dots
    From {
        module: Option<String>,
        level: usize,
        names: Vec<(String, Option<String>)>,
        line: usize,
        guarded: bool,
    },
}

impl Import {
    /// Imports nested in `try`/`if`/`with` blocks never fail a module load.
    pub fn is_guarded(&self) -> bool {
        match self {
            Import::Module { guarded, .. } | Import::From { guarded, .. } => *guarded,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Import::Module { line, .. } | Import::From { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAttribute {
    pub name: String,
    pub annotation: Option<PyExpr>,
    pub value: Option<PyExpr>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub decorators: Vec<String>,
    pub is_async: bool,
    pub line: usize,
}

impl MethodDecl {
    pub fn is_abstract(&self) -> bool {
        self.decorators.iter().any(|d| d.ends_with("abstractmethod"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub bases: Vec<PyExpr>,
    /// `metaclass=...` and other class keywords
    pub keywords: Vec<(String, PyExpr)>,
    pub decorators: Vec<String>,
    pub attributes: Vec<ClassAttribute>,
    pub methods: Vec<MethodDecl>,
    pub docstring: Option<String>,
    pub line: usize,
}

impl ClassDecl {
    /// Rendered base names as written, e.g. `Component`, `base.LCToolComponent`.
    pub fn base_names(&self) -> Vec<String> {
        self.bases
            .iter()
            .map(|b| b.dotted_name().unwrap_or_else(|| b.render()))
            .collect()
    }

    pub fn attribute(&self, name: &str) -> Option<&ClassAttribute> {
        self.attributes.iter().rev().find(|a| a.name == name)
    }
}

/// Everything the scanner learns about one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceModule {
    pub module_path: String,
    pub file: PathBuf,
    /// `__init__` modules
    pub is_package: bool,
    pub imports: Vec<Import>,
    /// Lines of unconditional module-level `raise` statements
    pub raises: Vec<usize>,
    /// Module-level `NAME = value` assignments, last one wins
    pub globals: Vec<(String, PyExpr)>,
    /// Every name bound at module level, including inside conditional blocks
    pub names: Vec<String>,
    pub classes: Vec<ClassDecl>,
}

impl SourceModule {
    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().rev().find(|c| c.name == name)
    }

    pub fn binds(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// `from x import *` makes every name potentially bound.
    pub fn has_star_import(&self) -> bool {
        self.imports.iter().any(|i| match i {
            Import::From { names, .. } => names.iter().any(|(n, _)| n == "*"),
            Import::Module { .. } => false,
        })
    }

    pub fn global(&self, name: &str) -> Option<&PyExpr> {
        self.globals.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The package a relative import is resolved against.
    pub fn package(&self) -> &str {
        if self.is_package {
            &self.module_path
        } else {
            self.module_path
                .rsplit_once('.')
                .map(|(pkg, _)| pkg)
                .unwrap_or("")
        }
    }
}

/// Parse a standalone expression such as a class base or attribute value.
pub fn parse_expression(text: &str) -> Result<PyExpr, SyntaxError> {
    let mut pairs = PythonParser::parse(Rule::expr_input, text)
        .map_err(|e| SyntaxError::new(1, e.to_string()))?;
    let input = pairs
        .next()
        .ok_or_else(|| SyntaxError::new(1, "empty expression"))?;
    let list = input
        .into_inner()
        .find(|p| p.as_rule() == Rule::expression_list)
        .ok_or_else(|| SyntaxError::new(1, "empty expression"))?;
    Ok(expressions::build_expression(list))
}
