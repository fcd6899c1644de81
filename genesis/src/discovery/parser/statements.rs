use super::expressions::build_expression;
use super::lines::{assignment_offsets, build_blocks, first_word, logical_lines, top_level_chars, Block};
use super::{
    parse_expression, ClassAttribute, ClassDecl, Import, MethodDecl, PyExpr, PythonParser, Rule,
    SourceModule, SyntaxError,
};
use pest::iterators::Pair;
use pest::Parser;
use std::path::Path;

/// Parse one module's source.
pub fn parse_module(
    source: &str,
    module_path: &str,
    file: &Path,
    is_package: bool,
) -> Result<SourceModule, SyntaxError> {
    let lines = logical_lines(source)?;
    let blocks = build_blocks(&lines)?;

    let mut module = SourceModule {
        module_path: module_path.to_string(),
        file: file.to_path_buf(),
        is_package,
        imports: Vec::new(),
        raises: Vec::new(),
        globals: Vec::new(),
        names: Vec::new(),
        classes: Vec::new(),
    };
    walk_module_level(&blocks, &mut module, false)?;
    Ok(module)
}

/// Module-level statements. `guarded` is set inside conditional or `try` blocks.
fn walk_module_level(
    blocks: &[Block],
    module: &mut SourceModule,
    guarded: bool,
) -> Result<(), SyntaxError> {
    let mut decorators: Vec<String> = Vec::new();

    for block in blocks {
        let text = block.text.as_str();
        match first_word(text) {
            "" if text.starts_with('@') => {
                decorators.push(parse_decorator(text, block.line)?);
                continue;
            }
            "class" => {
                let class = parse_class(block, std::mem::take(&mut decorators))?;
                module.names.push(class.name.clone());
                module.classes.push(class);
            }
            "import" => {
                for import in parse_import(text, block.line, guarded)? {
                    if let Import::Module { module: path, alias, .. } = &import {
                        let bound = alias
                            .clone()
                            .unwrap_or_else(|| path.split('.').next().unwrap_or(path).to_string());
                        module.names.push(bound);
                    }
                    module.imports.push(import);
                }
            }
            "from" => {
                let import = parse_from_import(text, block.line, guarded)?;
                if let Import::From { names, .. } = &import {
                    for (name, alias) in names {
                        module.names.push(alias.clone().unwrap_or_else(|| name.clone()));
                    }
                }
                module.imports.push(import);
            }
            "raise" => {
                if !guarded {
                    module.raises.push(block.line);
                }
            }
            "def" => {
                module.names.push(parse_def(text, block.line)?.0);
            }
            "async" if text[5..].trim_start().starts_with("def") => {
                module.names.push(parse_def(text, block.line)?.0);
            }
            "async" => {}
            "if" | "elif" | "else" | "try" | "except" | "finally" | "with" | "for" | "while"
            | "match" | "case" => {
                walk_module_level(&block.children, module, true)?;
            }
            _ => {
                if let Some((targets, value)) = parse_assignment(text) {
                    for (name, _) in targets {
                        module.names.push(name.clone());
                        if let (false, Some(value)) = (guarded, &value) {
                            module.globals.push((name, value.clone()));
                        }
                    }
                }
            }
        }
        decorators.clear();
    }
    Ok(())
}

fn parse_class(block: &Block, decorators: Vec<String>) -> Result<ClassDecl, SyntaxError> {
    let malformed = |detail: String| {
        SyntaxError::new(block.line, format!("malformed class header: {}", detail))
    };
    let mut pairs = PythonParser::parse(Rule::class_head, &block.text)
        .map_err(|e| malformed(e.variant.message().to_string()))?;
    let head = pairs
        .next()
        .ok_or_else(|| malformed("empty header".to_string()))?;

    let mut name = String::new();
    let mut bases = Vec::new();
    let mut keywords = Vec::new();
    for p in head.into_inner() {
        match p.as_rule() {
            Rule::identifier => name = p.as_str().to_string(),
            Rule::argument => collect_class_argument(p, &mut bases, &mut keywords),
            _ => {}
        }
    }
    if name.is_empty() {
        return Err(malformed("missing class name".to_string()));
    }

    let mut class = ClassDecl {
        name,
        bases,
        keywords,
        decorators,
        attributes: Vec::new(),
        methods: Vec::new(),
        docstring: None,
        line: block.line,
    };

    if let Some(first) = block.children.first() {
        if starts_like_string(&first.text) {
            if let Ok(PyExpr::Str(doc)) = parse_expression(&first.text) {
                class.docstring = Some(doc.trim().to_string());
            }
        }
    }
    walk_class_body(&block.children, &mut class)?;
    Ok(class)
}

fn collect_class_argument(
    argument: Pair<Rule>,
    bases: &mut Vec<PyExpr>,
    keywords: &mut Vec<(String, PyExpr)>,
) {
    let Some(inner) = argument.into_inner().next() else {
        return;
    };
    match inner.as_rule() {
        Rule::keyword_arg => {
            let mut parts = inner.into_inner();
            if let (Some(k), Some(v)) = (parts.next(), parts.next()) {
                keywords.push((k.as_str().to_string(), build_expression(v)));
            }
        }
        Rule::expression => bases.push(build_expression(inner)),
        _ => bases.push(PyExpr::Opaque(inner.as_str().trim().to_string())),
    }
}

fn walk_class_body(blocks: &[Block], class: &mut ClassDecl) -> Result<(), SyntaxError> {
    let mut decorators: Vec<String> = Vec::new();

    for block in blocks {
        let text = block.text.as_str();
        match first_word(text) {
            "" if text.starts_with('@') => {
                decorators.push(parse_decorator(text, block.line)?);
                continue;
            }
            "def" | "async" => {
                let (name, is_async) = parse_def(text, block.line)?;
                class.methods.push(MethodDecl {
                    name,
                    decorators: std::mem::take(&mut decorators),
                    is_async,
                    line: block.line,
                });
            }
            "class" => {}
            "if" | "elif" | "else" | "try" | "except" | "finally" | "with" | "for" | "while" => {
                walk_class_body(&block.children, class)?;
            }
            _ => {
                if let Some((targets, value)) = parse_assignment(text) {
                    for (name, annotation) in targets {
                        class.attributes.push(ClassAttribute {
                            name,
                            annotation,
                            value: value.clone(),
                            line: block.line,
                        });
                    }
                }
            }
        }
        decorators.clear();
    }
    Ok(())
}

fn parse_def(text: &str, line: usize) -> Result<(String, bool), SyntaxError> {
    let mut pairs = PythonParser::parse(Rule::def_head, text)
        .map_err(|e| SyntaxError::new(line, format!("invalid function header: {}", e.variant.message())))?;
    let head = pairs
        .next()
        .ok_or_else(|| SyntaxError::new(line, "invalid function header"))?;
    let mut name = None;
    let mut is_async = false;
    for p in head.into_inner() {
        match p.as_rule() {
            Rule::kw_async => is_async = true,
            Rule::identifier => name = Some(p.as_str().to_string()),
            _ => {}
        }
    }
    name.map(|n| (n, is_async))
        .ok_or_else(|| SyntaxError::new(line, "invalid function header"))
}

/// Decorators are recorded by callee name: `@abc.abstractmethod` -> `abc.abstractmethod`.
fn parse_decorator(text: &str, line: usize) -> Result<String, SyntaxError> {
    let mut pairs = PythonParser::parse(Rule::decorator, text)
        .map_err(|e| SyntaxError::new(line, format!("invalid decorator: {}", e.variant.message())))?;
    let expr = pairs
        .next()
        .and_then(|d| d.into_inner().find(|p| p.as_rule() == Rule::expression))
        .map(build_expression)
        .ok_or_else(|| SyntaxError::new(line, "invalid decorator"))?;
    let callee = match &expr {
        PyExpr::Call { func, .. } => func.as_ref(),
        other => other,
    };
    Ok(callee.dotted_name().unwrap_or_else(|| callee.render()))
}

fn parse_import(text: &str, line: usize, guarded: bool) -> Result<Vec<Import>, SyntaxError> {
    let mut pairs = PythonParser::parse(Rule::import_stmt, text)
        .map_err(|e| SyntaxError::new(line, format!("invalid import: {}", e.variant.message())))?;
    let stmt = pairs
        .next()
        .ok_or_else(|| SyntaxError::new(line, "invalid import"))?;
    let mut imports = Vec::new();
    for item in stmt.into_inner().filter(|p| p.as_rule() == Rule::dotted_as_name) {
        let mut parts = item.into_inner();
        let module = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
        let alias = parts
            .find(|p| p.as_rule() == Rule::identifier)
            .map(|p| p.as_str().to_string());
        imports.push(Import::Module {
            module,
            alias,
            line,
            guarded,
        });
    }
    Ok(imports)
}

fn parse_from_import(text: &str, line: usize, guarded: bool) -> Result<Import, SyntaxError> {
    let mut pairs = PythonParser::parse(Rule::from_stmt, text)
        .map_err(|e| SyntaxError::new(line, format!("invalid import: {}", e.variant.message())))?;
    let stmt = pairs
        .next()
        .ok_or_else(|| SyntaxError::new(line, "invalid import"))?;

    let mut module = None;
    let mut level = 0usize;
    let mut names = Vec::new();
    for p in stmt.into_inner() {
        match p.as_rule() {
            Rule::relative_module => {
                for part in p.into_inner() {
                    match part.as_rule() {
                        Rule::relative_dots => level = part.as_str().len(),
                        Rule::dotted_name => module = Some(part.as_str().to_string()),
                        _ => {}
                    }
                }
            }
            Rule::import_targets => {
                for target in p.into_inner() {
                    match target.as_rule() {
                        Rule::star_import => names.push(("*".to_string(), None)),
                        Rule::import_as_names => {
                            for name in target.into_inner() {
                                let mut ids = name
                                    .into_inner()
                                    .filter(|i| i.as_rule() == Rule::identifier);
                                if let Some(n) = ids.next() {
                                    let alias = ids.next().map(|a| a.as_str().to_string());
                                    names.push((n.as_str().to_string(), alias));
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    Ok(Import::From {
        module,
        level,
        names,
        line,
        guarded,
    })
}

type AssignTargets = Vec<(String, Option<PyExpr>)>;

/// `a = b = value`, `a: T = value` and bare `a: T`. Only plain-name targets are
/// kept; values outside the expression subset become opaque.
fn parse_assignment(text: &str) -> Option<(AssignTargets, Option<PyExpr>)> {
    let offsets = assignment_offsets(text);
    let (target_parts, value_text): (Vec<&str>, Option<&str>) = if offsets.is_empty() {
        (vec![text], None)
    } else {
        let mut parts = Vec::new();
        let mut start = 0usize;
        for off in &offsets {
            parts.push(&text[start..*off]);
            start = off + 1;
        }
        (parts, Some(&text[start..]))
    };

    let mut targets = Vec::new();
    for part in target_parts {
        let part = part.trim();
        let colon = top_level_chars(part)
            .into_iter()
            .find(|(_, c)| *c == ':')
            .map(|(i, _)| i);
        let (name, annotation) = match colon {
            Some(i) => (
                part[..i].trim(),
                Some(parse_or_opaque(part[i + 1..].trim())),
            ),
            None => (part, None),
        };
        if !is_identifier(name) {
            continue;
        }
        targets.push((name.to_string(), annotation));
    }

    // A bare expression statement is not an assignment.
    if value_text.is_none() && targets.iter().all(|(_, a)| a.is_none()) {
        return None;
    }
    if targets.is_empty() {
        return None;
    }
    let value = value_text.map(|v| parse_or_opaque(v.trim()));
    Some((targets, value))
}

fn parse_or_opaque(text: &str) -> PyExpr {
    parse_expression(text).unwrap_or_else(|_| PyExpr::Opaque(text.to_string()))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn starts_like_string(text: &str) -> bool {
    let stripped = text.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B' | 'f' | 'F'));
    stripped.starts_with('"') || stripped.starts_with('\'')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"
"""Module docstring."""
from __future__ import annotations

import os
from langflow.custom import Component
from .base import (
    LCToolComponent,
    helper as h,
)
from ..io import *

try:
    import optional_dep
except ImportError:
    optional_dep = None

DEFAULT_MODELS = ["gpt-4", "gpt-3.5-turbo"]


@register
class WeatherComponent(LCToolComponent, metaclass=Meta):
    """Look up the weather.

    More text.
    """

    display_name: str = "Weather"
    name = "weather_lookup"
    inputs = [
        MessageTextInput(name="city", display_name="City", required=True),  # trailing
        *LCToolComponent._base_inputs,
    ]
    outputs = [Output(display_name="Result", name="result", method="run")]
    MODEL_OPTIONS = DEFAULT_MODELS
    computed = os.environ.get("X") or "fallback"

    def build(self):
        return self.run()

    @abstractmethod
    async def run(self) -> str: ...

    @property
    def label(self): return "w"


if TYPE_CHECKING:
    class HiddenComponent(Component):
        pass
"#;

    fn parse() -> SourceModule {
        parse_module(SOURCE, "pkg.tools.weather", Path::new("pkg/tools/weather.py"), false).unwrap()
    }

    #[test]
    fn imports_are_collected() {
        let module = parse();
        assert_eq!(module.imports.len(), 6);
        assert_eq!(
            module.imports[2],
            Import::From {
                module: Some("langflow.custom".into()),
                level: 0,
                names: vec![("Component".into(), None)],
                line: 6,
                guarded: false,
            }
        );
        let Import::From { level, names, .. } = &module.imports[3] else {
            panic!("expected from-import");
        };
        assert_eq!(*level, 1);
        assert_eq!(names[1], ("helper".to_string(), Some("h".to_string())));
        assert!(module.imports[5].is_guarded());
        assert!(module.raises.is_empty());
        assert_eq!(module.package(), "pkg.tools");
    }

    #[test]
    fn class_shape() {
        let module = parse();
        assert_eq!(module.classes.len(), 2);
        let class = &module.classes[0];
        assert_eq!(class.name, "WeatherComponent");
        assert_eq!(class.base_names(), vec!["LCToolComponent".to_string()]);
        assert_eq!(class.keywords[0].0, "metaclass");
        assert_eq!(class.decorators, vec!["register".to_string()]);
        assert_eq!(class.docstring.as_deref().map(|d| d.lines().next()), Some(Some("Look up the weather.")));

        let names: Vec<&str> = class.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["display_name", "name", "inputs", "outputs", "MODEL_OPTIONS", "computed"]
        );
        let display = class.attribute("display_name").unwrap();
        assert_eq!(display.annotation, Some(PyExpr::Name("str".into())));
        assert_eq!(display.value, Some(PyExpr::Str("Weather".into())));
        assert!(matches!(class.attribute("computed").unwrap().value, Some(PyExpr::Opaque(_))));
        let inputs = class.attribute("inputs").unwrap().value.clone().unwrap();
        assert_eq!(inputs.as_sequence().map(|s| s.len()), Some(2));

        let methods: Vec<(&str, bool, bool)> = class
            .methods
            .iter()
            .map(|m| (m.name.as_str(), m.is_async, m.is_abstract()))
            .collect();
        assert_eq!(
            methods,
            vec![("build", false, false), ("run", true, true), ("label", false, false)]
        );

        assert_eq!(module.classes[1].name, "HiddenComponent");
        assert_eq!(
            module.global("DEFAULT_MODELS").and_then(|v| v.as_sequence()).map(|s| s.len()),
            Some(2)
        );
    }

    #[test]
    fn module_level_raise_is_recorded() {
        let src = "import x\nraise ImportError('missing dependency')\n";
        let module = parse_module(src, "pkg.bad", Path::new("pkg/bad.py"), false).unwrap();
        assert_eq!(module.raises, vec![2]);
    }

    #[test]
    fn malformed_class_header_is_an_error() {
        let err = parse_module("class (Base):\n    pass\n", "m", Path::new("m.py"), false).unwrap_err();
        assert!(err.message.contains("malformed class header"));
        let err = parse_module("class A(Base)\n    pass\n", "m", Path::new("m.py"), false).unwrap_err();
        assert_eq!(err.line, 1);
    }
}
