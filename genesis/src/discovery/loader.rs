//! Loading candidates without executing them.
//!
//! `SourceLoader` plays the part of an import system over the scanned
//! [`ModuleIndex`]: a module "imports" when it has no unconditional top-level
//! `raise` and every unguarded in-tree import it makes resolves, transitively.
//! Base classes are followed through imports, re-exports and aliases, then
//! linearized (C3) so inherited attributes resolve the nearest definition first.

use super::parser::{ClassDecl, Import, MethodDecl, PyExpr, SourceModule};
use super::scanner::{Candidate, ModuleIndex};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

const MAX_SYMBOL_DEPTH: usize = 16;
const MAX_VALUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("No module named '{0}'")]
    ModuleNotFound(String),
    #[error("Failed to import '{module}': {reason}")]
    ImportFailed { module: String, reason: String },
    #[error("Module '{module}' has no class '{class}'")]
    ClassNotFound { module: String, class: String },
    #[error("Cyclic inheritance involving '{0}'")]
    CyclicInheritance(String),
}

/// Turns a candidate into a loaded class description.
pub trait ComponentLoader: Send + Sync {
    fn load(&self, candidate: &Candidate) -> Result<LoadedClass, LoadError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorInfo {
    pub name: String,
    /// `None` for bases that live outside the scanned trees
    pub module: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InheritedAttribute {
    pub annotation: Option<PyExpr>,
    /// Value with names, class attributes and `*spreads` substituted where known
    pub value: Option<PyExpr>,
    pub defined_in: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InheritedMethod {
    pub decl: MethodDecl,
    pub defined_in: String,
}

/// A class with its inheritance flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedClass {
    pub module_path: String,
    pub class_name: String,
    pub file: PathBuf,
    pub line: usize,
    pub docstring: Option<String>,
    pub decorators: Vec<String>,
    /// Method resolution order, the class itself first
    pub ancestors: Vec<AncestorInfo>,
    pub attributes: IndexMap<String, InheritedAttribute>,
    pub methods: IndexMap<String, InheritedMethod>,
}

impl LoadedClass {
    pub fn qualname(&self) -> String {
        format!("{}.{}", self.module_path, self.class_name)
    }

    pub fn attribute(&self, name: &str) -> Option<&PyExpr> {
        self.attributes.get(name).and_then(|a| a.value.as_ref())
    }

    /// Attribute or method, own or inherited.
    pub fn has_member(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.methods.contains_key(name)
    }

    /// An effective abstract method leaves the class uninstantiable.
    pub fn is_abstract(&self) -> bool {
        self.methods.values().any(|m| m.decl.is_abstract())
    }

    /// Ancestor names, nearest first, excluding the class itself.
    pub fn ancestor_names(&self) -> Vec<String> {
        self.ancestors.iter().skip(1).map(|a| a.name.clone()).collect()
    }
}

#[derive(Clone)]
struct ClassRef {
    module: Arc<SourceModule>,
    name: String,
}

impl ClassRef {
    fn key(&self) -> String {
        format!("{}.{}", self.module.module_path, self.name)
    }

    fn decl(&self) -> Option<&ClassDecl> {
        self.module.class(&self.name)
    }
}

#[derive(Clone)]
enum MroEntry {
    Resolved(ClassRef),
    /// Base that could not be followed; contributes its name only
    Named(String),
}

impl MroEntry {
    fn key(&self) -> String {
        match self {
            MroEntry::Resolved(c) => c.key(),
            MroEntry::Named(n) => n.clone(),
        }
    }
}

enum Symbol {
    Class(ClassRef),
    Module(String),
    Value(Arc<SourceModule>, PyExpr),
    Unknown,
}

type ImportOutcome = Result<(), String>;

/// Loader over statically scanned sources.
pub struct SourceLoader {
    index: Arc<ModuleIndex>,
    import_status: Mutex<HashMap<String, ImportOutcome>>,
}

impl SourceLoader {
    pub fn new(index: Arc<ModuleIndex>) -> Self {
        Self {
            index,
            import_status: Mutex::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> &Arc<ModuleIndex> {
        &self.index
    }

    /// Whether `module_path` would import cleanly.
    pub fn check_import(&self, module_path: &str) -> ImportOutcome {
        let mut visiting = Vec::new();
        self.check_import_inner(module_path, &mut visiting).0
    }

    fn cached(&self, module_path: &str) -> Option<ImportOutcome> {
        let status = self
            .import_status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        status.get(module_path).cloned()
    }

    fn remember(&self, module_path: &str, outcome: &ImportOutcome) {
        let mut status = self
            .import_status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        status.insert(module_path.to_string(), outcome.clone());
    }

    /// Returns the outcome and whether it is final (did not depend on a module
    /// still being checked further up the stack).
    fn check_import_inner(&self, module_path: &str, visiting: &mut Vec<String>) -> (ImportOutcome, bool) {
        if let Some(outcome) = self.cached(module_path) {
            return (outcome, true);
        }
        if visiting.iter().any(|m| m == module_path) {
            // Partially initialised module, as with a circular import
            return (Ok(()), false);
        }
        let Some(module) = self.index.get(module_path).cloned() else {
            return if self.index.exists(module_path) {
                (Ok(()), true)
            } else {
                (Err(format!("No module named '{}'", module_path)), true)
            };
        };

        visiting.push(module_path.to_string());
        let (outcome, complete) = self.check_module_body(&module, visiting);
        visiting.pop();

        if complete {
            self.remember(module_path, &outcome);
        }
        (outcome, complete)
    }

    fn check_module_body(&self, module: &SourceModule, visiting: &mut Vec<String>) -> (ImportOutcome, bool) {
        if let Some(line) = module.raises.first() {
            return (
                Err(format!("module raises at import time (line {})", line)),
                true,
            );
        }
        let mut complete = true;

        // Importing a.b.c runs a and a.b first
        let parts: Vec<&str> = module.module_path.split('.').collect();
        for end in 1..parts.len() {
            let parent = parts[..end].join(".");
            if self.index.get(&parent).is_some() {
                let (outcome, done) = self.check_import_inner(&parent, visiting);
                complete &= done;
                if let Err(reason) = outcome {
                    return (Err(format!("parent package '{}': {}", parent, reason)), complete);
                }
            }
        }

        for import in module.imports.iter().filter(|i| !i.is_guarded()) {
            let (outcome, done) = self.check_statement(module, import, visiting);
            complete &= done;
            if let Err(reason) = outcome {
                return (Err(format!("line {}: {}", import.line(), reason)), complete);
            }
        }
        (Ok(()), complete)
    }

    fn check_statement(
        &self,
        module: &SourceModule,
        import: &Import,
        visiting: &mut Vec<String>,
    ) -> (ImportOutcome, bool) {
        match import {
            Import::Module { module: target, .. } => {
                if !self.index.is_in_tree(target) {
                    return (Ok(()), true);
                }
                self.check_import_inner(target, visiting)
            }
            Import::From {
                module: target,
                level,
                names,
                ..
            } => {
                let Some(target) = absolute_module(module, target.as_deref(), *level) else {
                    return (
                        Err("attempted relative import beyond top-level package".to_string()),
                        true,
                    );
                };
                if !self.index.is_in_tree(&target) {
                    return (Ok(()), true);
                }
                let (outcome, mut complete) = self.check_import_inner(&target, visiting);
                if outcome.is_err() {
                    return (outcome, complete);
                }
                let source = self.index.get(&target).cloned();
                for (name, _) in names.iter().filter(|(n, _)| n != "*") {
                    let submodule = format!("{}.{}", target, name);
                    if self.index.exists(&submodule) {
                        let (outcome, done) = self.check_import_inner(&submodule, visiting);
                        complete &= done;
                        if outcome.is_err() {
                            return (outcome, complete);
                        }
                        continue;
                    }
                    let bound = source
                        .as_ref()
                        .map_or(false, |m| m.binds(name) || m.has_star_import());
                    if !bound {
                        return (
                            Err(format!("cannot import name '{}' from '{}'", name, target)),
                            complete,
                        );
                    }
                }
                (Ok(()), complete)
            }
        }
    }

    fn resolve_name(&self, module: &Arc<SourceModule>, name: &str, skip_class: Option<&str>, depth: usize) -> Symbol {
        if depth > MAX_SYMBOL_DEPTH {
            return Symbol::Unknown;
        }
        if skip_class != Some(name) && module.class(name).is_some() {
            return Symbol::Class(ClassRef {
                module: module.clone(),
                name: name.to_string(),
            });
        }

        for import in module.imports.iter().rev() {
            match import {
                Import::Module { module: path, alias, .. } => {
                    if alias.as_deref() == Some(name) {
                        return Symbol::Module(path.clone());
                    }
                    if alias.is_none() && path.split('.').next() == Some(name) {
                        return Symbol::Module(name.to_string());
                    }
                }
                Import::From {
                    module: target,
                    level,
                    names,
                    ..
                } => {
                    let Some((original, _)) = names
                        .iter()
                        .find(|(n, alias)| alias.as_deref().unwrap_or(n) == name && n != "*")
                    else {
                        continue;
                    };
                    let Some(target) = absolute_module(module, target.as_deref(), *level) else {
                        return Symbol::Unknown;
                    };
                    let submodule = format!("{}.{}", target, original);
                    if self.index.exists(&submodule) {
                        return Symbol::Module(submodule);
                    }
                    return match self.index.get(&target) {
                        Some(source) => self.resolve_name(source, original, None, depth + 1),
                        None => Symbol::Unknown,
                    };
                }
            }
        }

        if let Some(value) = module.global(name) {
            return match value {
                PyExpr::Name(_) | PyExpr::Attribute { .. } => {
                    match self.resolve_expr(module, value, depth + 1) {
                        Symbol::Unknown => Symbol::Value(module.clone(), value.clone()),
                        symbol => symbol,
                    }
                }
                _ => Symbol::Value(module.clone(), value.clone()),
            };
        }

        for import in &module.imports {
            if let Import::From {
                module: target,
                level,
                names,
                ..
            } = import
            {
                if !names.iter().any(|(n, _)| n == "*") {
                    continue;
                }
                let Some(source) = absolute_module(module, target.as_deref(), *level)
                    .and_then(|t| self.index.get(&t).cloned())
                else {
                    continue;
                };
                match self.resolve_name(&source, name, None, depth + 1) {
                    Symbol::Unknown => {}
                    symbol => return symbol,
                }
            }
        }
        Symbol::Unknown
    }

    fn resolve_expr(&self, module: &Arc<SourceModule>, expr: &PyExpr, depth: usize) -> Symbol {
        match expr {
            PyExpr::Name(name) => self.resolve_name(module, name, None, depth),
            PyExpr::Attribute { value, attr } => match self.resolve_expr(module, value, depth + 1) {
                Symbol::Module(path) => {
                    let submodule = format!("{}.{}", path, attr);
                    if self.index.exists(&submodule) {
                        Symbol::Module(submodule)
                    } else if let Some(source) = self.index.get(&path).cloned() {
                        self.resolve_name(&source, attr, None, depth + 1)
                    } else {
                        Symbol::Unknown
                    }
                }
                _ => Symbol::Unknown,
            },
            PyExpr::Subscript { value, .. } => self.resolve_expr(module, value, depth + 1),
            _ => Symbol::Unknown,
        }
    }

    fn resolve_base(&self, class: &ClassRef, base: &PyExpr) -> MroEntry {
        // `class Component(Component)` refers to the imported name
        let skip = match base {
            PyExpr::Name(n) if n == &class.name => Some(class.name.as_str()),
            _ => None,
        };
        let symbol = match base {
            PyExpr::Name(n) => self.resolve_name(&class.module, n, skip, 0),
            other => self.resolve_expr(&class.module, other, 0),
        };
        match symbol {
            Symbol::Class(found) => MroEntry::Resolved(found),
            _ => MroEntry::Named(base.tail_name().unwrap_or_else(|| base.render())),
        }
    }

    fn linearize(&self, entry: &MroEntry, stack: &mut Vec<String>) -> Result<Vec<MroEntry>, LoadError> {
        let class = match entry {
            MroEntry::Named(_) => return Ok(vec![entry.clone()]),
            MroEntry::Resolved(class) => class,
        };
        let key = class.key();
        if stack.contains(&key) {
            return Err(LoadError::CyclicInheritance(key));
        }
        stack.push(key);

        let bases: Vec<MroEntry> = class
            .decl()
            .map(|decl| {
                decl.bases
                    .iter()
                    .map(|b| self.resolve_base(class, b))
                    .filter(|b| !matches!(b, MroEntry::Named(n) if n == "object"))
                    .collect()
            })
            .unwrap_or_default();

        let mut sequences = Vec::with_capacity(bases.len() + 1);
        for base in &bases {
            sequences.push(self.linearize(base, stack)?);
        }
        sequences.push(bases);
        stack.pop();

        let mut mro = vec![entry.clone()];
        mro.extend(c3_merge(sequences));
        Ok(mro)
    }

    /// Attribute value as the class sees it, nearest definition first.
    fn class_attribute(&self, class: &ClassRef, name: &str, depth: usize) -> Option<PyExpr> {
        let mut stack = Vec::new();
        let mro = self.linearize(&MroEntry::Resolved(class.clone()), &mut stack).ok()?;
        mro.iter().find_map(|entry| match entry {
            MroEntry::Resolved(c) => c
                .decl()
                .and_then(|d| d.attribute(name))
                .and_then(|a| a.value.as_ref())
                .map(|v| self.resolve_value(&c.module, v, depth + 1)),
            MroEntry::Named(_) => None,
        })
    }

    /// Substitute what can be known statically into an attribute value.
    fn resolve_value(&self, module: &Arc<SourceModule>, expr: &PyExpr, depth: usize) -> PyExpr {
        if depth > MAX_VALUE_DEPTH {
            return expr.clone();
        }
        match expr {
            PyExpr::Name(name) => match self.resolve_name(module, name, None, 0) {
                Symbol::Value(owner, value) => self.resolve_value(&owner, &value, depth + 1),
                _ => expr.clone(),
            },
            PyExpr::Attribute { value, attr } => match self.resolve_expr(module, value, 0) {
                Symbol::Class(class) => self
                    .class_attribute(&class, attr, depth)
                    .unwrap_or_else(|| expr.clone()),
                Symbol::Module(path) => match self.index.get(&path).cloned() {
                    Some(source) => match self.resolve_name(&source, attr, None, 0) {
                        Symbol::Value(owner, value) => self.resolve_value(&owner, &value, depth + 1),
                        _ => expr.clone(),
                    },
                    None => expr.clone(),
                },
                _ => expr.clone(),
            },
            PyExpr::List(items) => PyExpr::List(self.resolve_items(module, items, depth)),
            PyExpr::Tuple(items) => PyExpr::Tuple(self.resolve_items(module, items, depth)),
            PyExpr::Set(items) => PyExpr::Set(self.resolve_items(module, items, depth)),
            PyExpr::Dict(entries) => PyExpr::Dict(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(module, v, depth + 1)))
                    .collect(),
            ),
            PyExpr::Call { func, args, keywords } => PyExpr::Call {
                func: func.clone(),
                args: self.resolve_items(module, args, depth),
                keywords: keywords
                    .iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(module, v, depth + 1)))
                    .collect(),
            },
            other => other.clone(),
        }
    }

    /// Resolve sequence items, splicing `*spread` entries that resolve to sequences.
    fn resolve_items(&self, module: &Arc<SourceModule>, items: &[PyExpr], depth: usize) -> Vec<PyExpr> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                PyExpr::Starred(inner) => {
                    let resolved = self.resolve_value(module, inner, depth + 1);
                    match resolved.as_sequence() {
                        Some(elements) => out.extend(elements.iter().cloned()),
                        None => out.push(PyExpr::Starred(Box::new(resolved))),
                    }
                }
                other => out.push(self.resolve_value(module, other, depth + 1)),
            }
        }
        out
    }
}

impl ComponentLoader for SourceLoader {
    fn load(&self, candidate: &Candidate) -> Result<LoadedClass, LoadError> {
        let module = self
            .index
            .get(&candidate.module_path)
            .cloned()
            .ok_or_else(|| LoadError::ModuleNotFound(candidate.module_path.clone()))?;

        self.check_import(&candidate.module_path)
            .map_err(|reason| LoadError::ImportFailed {
                module: candidate.module_path.clone(),
                reason,
            })?;

        let decl = module
            .class(&candidate.class_name)
            .ok_or_else(|| LoadError::ClassNotFound {
                module: candidate.module_path.clone(),
                class: candidate.class_name.clone(),
            })?
            .clone();

        let root = MroEntry::Resolved(ClassRef {
            module: module.clone(),
            name: decl.name.clone(),
        });
        let mut stack = Vec::new();
        let mro = self.linearize(&root, &mut stack)?;

        let mut ancestors = Vec::with_capacity(mro.len());
        let mut attributes: IndexMap<String, InheritedAttribute> = IndexMap::new();
        let mut methods: IndexMap<String, InheritedMethod> = IndexMap::new();

        for entry in &mro {
            let class = match entry {
                MroEntry::Named(name) => {
                    ancestors.push(AncestorInfo {
                        name: name.clone(),
                        module: None,
                    });
                    continue;
                }
                MroEntry::Resolved(class) => class,
            };
            ancestors.push(AncestorInfo {
                name: class.name.clone(),
                module: Some(class.module.module_path.clone()),
            });
            let Some(class_decl) = class.decl() else {
                continue;
            };
            let defined_in = class.key();
            for attr in &class_decl.attributes {
                if attributes.contains_key(&attr.name) {
                    continue;
                }
                attributes.insert(
                    attr.name.clone(),
                    InheritedAttribute {
                        annotation: attr.annotation.clone(),
                        value: attr
                            .value
                            .as_ref()
                            .map(|v| self.resolve_value(&class.module, v, 0)),
                        defined_in: defined_in.clone(),
                    },
                );
            }
            for method in &class_decl.methods {
                if methods.contains_key(&method.name) {
                    continue;
                }
                methods.insert(
                    method.name.clone(),
                    InheritedMethod {
                        decl: method.clone(),
                        defined_in: defined_in.clone(),
                    },
                );
            }
        }

        Ok(LoadedClass {
            module_path: candidate.module_path.clone(),
            class_name: decl.name.clone(),
            file: module.file.clone(),
            line: decl.line,
            docstring: decl.docstring.clone(),
            decorators: decl.decorators.clone(),
            ancestors,
            attributes,
            methods,
        })
    }
}

/// Absolute target of a possibly relative `from` import.
fn absolute_module(module: &SourceModule, target: Option<&str>, level: usize) -> Option<String> {
    if level == 0 {
        return target.map(str::to_string);
    }
    let mut base: Vec<&str> = module.package().split('.').filter(|s| !s.is_empty()).collect();
    for _ in 1..level {
        base.pop()?;
    }
    if let Some(target) = target {
        base.extend(target.split('.'));
    }
    if base.is_empty() {
        return None;
    }
    Some(base.join("."))
}

/// C3 merge; falls back to first-seen order when the hierarchy is inconsistent.
fn c3_merge(mut sequences: Vec<Vec<MroEntry>>) -> Vec<MroEntry> {
    let fallback: Vec<MroEntry> = {
        let mut seen = std::collections::HashSet::new();
        sequences
            .iter()
            .flatten()
            .filter(|e| seen.insert(e.key()))
            .cloned()
            .collect()
    };

    let mut result: Vec<MroEntry> = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return result;
        }
        let head = sequences.iter().map(|s| &s[0]).find(|candidate| {
            let key = candidate.key();
            !sequences
                .iter()
                .any(|s| s[1..].iter().any(|e| e.key() == key))
        });
        let Some(head) = head.cloned() else {
            tracing::debug!("inconsistent hierarchy, using depth-first order");
            return fallback;
        };
        let key = head.key();
        for sequence in sequences.iter_mut() {
            if sequence[0].key() == key {
                sequence.remove(0);
            }
        }
        result.push(head);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::parser::parse_module;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn index(sources: &[(&str, &str, bool)]) -> Arc<ModuleIndex> {
        let mut index = ModuleIndex::new();
        for (path, source, is_package) in sources {
            let file = format!("{}.py", path.replace('.', "/"));
            index.insert(parse_module(source, path, Path::new(&file), *is_package).unwrap());
        }
        Arc::new(index)
    }

    fn candidate(module: &str, class: &str) -> Candidate {
        Candidate {
            module_path: module.to_string(),
            class_name: class.to_string(),
            file: PathBuf::from(format!("{}.py", module)),
            line: 1,
        }
    }

    const BASE: &str = r#"
from langflow.custom import Component

class LCModelComponent(Component):
    _base_inputs = [MessageInput(name="input_value"), BoolInput(name="stream")]
    category = "llm"

    def build_model(self):
        pass

    @abstractmethod
    def build(self):
        pass
"#;

    #[test]
    fn resolves_inheritance_across_modules() {
        let idx = index(&[
            ("pkg", "", true),
            ("pkg.base", BASE, false),
            (
                "pkg.openai",
                "from pkg.base import LCModelComponent\nfrom . import base\n\nclass OpenAIModelComponent(base.LCModelComponent):\n    inputs = [*LCModelComponent._base_inputs, StrInput(name=\"api_key\")]\n\n    def build(self):\n        pass\n",
                false,
            ),
        ]);
        let loader = SourceLoader::new(idx);
        let loaded = loader.load(&candidate("pkg.openai", "OpenAIModelComponent")).unwrap();

        assert_eq!(
            loaded.ancestor_names(),
            vec!["LCModelComponent".to_string(), "Component".to_string()]
        );
        assert_eq!(loaded.ancestors[1].module.as_deref(), Some("pkg.base"));
        assert_eq!(loaded.ancestors[2].module, None);
        assert!(!loaded.is_abstract());
        assert!(loaded.has_member("build_model"));
        assert_eq!(loaded.attribute("category"), Some(&PyExpr::Str("llm".into())));

        let inputs = loaded.attribute("inputs").and_then(|v| v.as_sequence()).unwrap();
        let names: Vec<String> = inputs
            .iter()
            .filter_map(|i| i.keyword("name").and_then(|n| n.as_str()).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["input_value", "stream", "api_key"]);
    }

    #[test]
    fn abstract_methods_are_inherited() {
        let idx = index(&[("pkg.base", BASE, false)]);
        let loader = SourceLoader::new(idx);
        let loaded = loader.load(&candidate("pkg.base", "LCModelComponent")).unwrap();
        assert!(loaded.is_abstract());
    }

    #[test]
    fn broken_in_tree_import_fails_the_load() {
        let idx = index(&[
            ("pkg.broken", "raise ImportError('optional dependency missing')\n", false),
            (
                "pkg.user",
                "from pkg.broken import thing\n\nclass UserComponent(Component):\n    pass\n",
                false,
            ),
            (
                "pkg.missing",
                "from pkg.nowhere import thing\n\nclass MissingComponent(Component):\n    pass\n",
                false,
            ),
            (
                "pkg.guarded",
                "try:\n    from pkg.nowhere import thing\nexcept ImportError:\n    thing = None\n\nclass GuardedComponent(Component):\n    pass\n",
                false,
            ),
        ]);
        let loader = SourceLoader::new(idx);

        let err = loader.load(&candidate("pkg.user", "UserComponent")).unwrap_err();
        assert!(matches!(err, LoadError::ImportFailed { .. }), "{:?}", err);
        let err = loader.load(&candidate("pkg.missing", "MissingComponent")).unwrap_err();
        assert!(err.to_string().contains("No module named 'pkg.nowhere'"));
        assert!(loader.load(&candidate("pkg.guarded", "GuardedComponent")).is_ok());
    }

    #[test]
    fn missing_name_in_tree_module_fails() {
        let idx = index(&[
            ("pkg.a", "VALUE = 1\n", false),
            ("pkg.b", "from pkg.a import OTHER\n\nclass BComponent(Component):\n    pass\n", false),
        ]);
        let loader = SourceLoader::new(idx);
        let err = loader.load(&candidate("pkg.b", "BComponent")).unwrap_err();
        assert!(err.to_string().contains("cannot import name 'OTHER'"));
    }

    #[test]
    fn circular_imports_between_modules_load() {
        let idx = index(&[
            ("pkg.a", "from pkg import b\n\nclass AComponent(Component):\n    pass\n", false),
            ("pkg.b", "from pkg import a\n\nclass BComponent(Component):\n    pass\n", false),
        ]);
        let loader = SourceLoader::new(idx);
        assert!(loader.load(&candidate("pkg.a", "AComponent")).is_ok());
        assert!(loader.load(&candidate("pkg.b", "BComponent")).is_ok());
    }

    #[test]
    fn cyclic_inheritance_is_reported() {
        let idx = index(&[(
            "pkg.cycle",
            "class AComponent(BComponent):\n    pass\n\nclass BComponent(AComponent):\n    pass\n",
            false,
        )]);
        let loader = SourceLoader::new(idx);
        let err = loader.load(&candidate("pkg.cycle", "AComponent")).unwrap_err();
        assert!(matches!(err, LoadError::CyclicInheritance(_)));
    }

    #[test]
    fn diamond_follows_c3_order() {
        let idx = index(&[(
            "pkg.diamond",
            "class Base(Component):\n    x = 'base'\n\nclass Left(Base):\n    pass\n\nclass Right(Base):\n    x = 'right'\n\nclass Both(Left, Right):\n    pass\n",
            false,
        )]);
        let loader = SourceLoader::new(idx);
        let loaded = loader.load(&candidate("pkg.diamond", "Both")).unwrap();
        let names: Vec<&str> = loaded.ancestors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Both", "Left", "Right", "Base", "Component"]);
        assert_eq!(loaded.attribute("x"), Some(&PyExpr::Str("right".into())));
    }

    #[test]
    fn relative_import_beyond_top_level() {
        let idx = index(&[("top", "from .. import x\n\nclass TopComponent(Component):\n    pass\n", false)]);
        let loader = SourceLoader::new(idx);
        assert!(loader.check_import("top").is_err());
    }
}
