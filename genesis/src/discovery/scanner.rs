//! Static scanner: walks code trees, parses every module without executing it
//! and picks out candidate component classes by their declared base names.

use super::parser::{parse_module, ClassDecl, SourceModule};
use crate::catalog::{DiscoveryError, DiscoveryStage};
use crate::config::DiscoveryConfig;
use crate::error::{error_ids, ErrorCategory, ErrorHandler, FrameworkError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// A class worth loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub module_path: String,
    pub class_name: String,
    pub file: PathBuf,
    pub line: usize,
}

/// Every parsed module of one scan, keyed by dotted path.
#[derive(Debug, Default)]
pub struct ModuleIndex {
    modules: BTreeMap<String, Arc<SourceModule>>,
    /// Dotted prefixes of every module path (namespace packages included)
    packages: BTreeSet<String>,
    /// First segment of every scanned module
    top_level: BTreeSet<String>,
}

impl ModuleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a module with the same path is already indexed.
    pub fn insert(&mut self, module: SourceModule) -> bool {
        if self.modules.contains_key(&module.module_path) {
            return false;
        }
        let path = module.module_path.clone();
        let mut prefix = String::new();
        for (i, part) in path.split('.').enumerate() {
            if i == 0 {
                self.top_level.insert(part.to_string());
                prefix.push_str(part);
            } else {
                self.packages.insert(prefix.clone());
                prefix.push('.');
                prefix.push_str(part);
            }
        }
        if module.is_package {
            self.packages.insert(path.clone());
        }
        self.modules.insert(path, Arc::new(module));
        true
    }

    pub fn get(&self, module_path: &str) -> Option<&Arc<SourceModule>> {
        self.modules.get(module_path)
    }

    /// A module file or a (possibly namespace) package exists at this path.
    pub fn exists(&self, module_path: &str) -> bool {
        self.modules.contains_key(module_path) || self.packages.contains(module_path)
    }

    /// Whether a dotted path belongs to one of the scanned trees.
    pub fn is_in_tree(&self, module_path: &str) -> bool {
        let first = module_path.split('.').next().unwrap_or(module_path);
        self.top_level.contains(first)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<SourceModule>> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub index: Arc<ModuleIndex>,
    /// In walk order: roots as given, files sorted by name, classes by position
    pub candidates: Vec<Candidate>,
    pub errors: Vec<DiscoveryError>,
    pub files_scanned: usize,
}

pub struct StaticScanner {
    skip_dirs: BTreeSet<String>,
    markers: Vec<String>,
    error_handler: ErrorHandler,
}

impl StaticScanner {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            skip_dirs: config.skip_dirs.iter().cloned().collect(),
            markers: config
                .candidate_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
            error_handler: ErrorHandler::new("StaticScanner"),
        }
    }

    /// A class is a candidate when any declared base name contains a marker.
    pub fn is_candidate(&self, class: &ClassDecl) -> bool {
        class.base_names().iter().any(|base| {
            let base = base.to_lowercase();
            self.markers.iter().any(|m| base.contains(m.as_str()))
        })
    }

    pub fn scan(&self, roots: &[PathBuf]) -> ScanResult {
        let mut index = ModuleIndex::new();
        let mut order: Vec<String> = Vec::new();
        let mut errors = Vec::new();
        let mut files_scanned = 0usize;

        for root in roots {
            let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.clone());
            if !root.exists() {
                let error = self.error_handler.create(
                    "scan",
                    error_ids::SCAN_ROOT_MISSING,
                    ErrorCategory::Validation,
                    format!("Scan root {} does not exist", root.display()),
                );
                errors.push(DiscoveryError::new(DiscoveryStage::Scan, error).with_file(root));
                continue;
            }
            let base = root.parent().map(Path::to_path_buf).unwrap_or_default();

            let walker = WalkDir::new(&root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || !e.file_type().is_dir()
                        || !self.skip_dirs.contains(e.file_name().to_string_lossy().as_ref())
                });

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                        let error = self.error_handler.from_error(
                            "scan",
                            error_ids::SCAN_READ_FAILED,
                            ErrorCategory::System,
                            &e,
                        );
                        errors.push(DiscoveryError::new(DiscoveryStage::Scan, error).with_file(path));
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if path.extension().map_or(true, |ext| ext != "py") {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy();
                let is_package = file_name == "__init__.py";
                if file_name.starts_with("__") && !is_package {
                    continue;
                }

                let Some(module_path) = module_path_for(&base, path, is_package) else {
                    continue;
                };
                files_scanned += 1;

                match self.parse_file(path, &module_path, is_package) {
                    Ok(module) => {
                        tracing::debug!(
                            module = %module_path,
                            classes = module.classes.len(),
                            "parsed module"
                        );
                        if index.insert(module) {
                            order.push(module_path);
                        } else {
                            let error = FrameworkError::validation(
                                "scan",
                                error_ids::SCAN_DUPLICATE_MODULE,
                                format!("Module {} found in more than one root; keeping the first", module_path),
                            );
                            self.error_handler.log(&error);
                            errors.push(
                                DiscoveryError::new(DiscoveryStage::Scan, error)
                                    .with_module(module_path)
                                    .with_file(path),
                            );
                        }
                    }
                    Err(error) => {
                        errors.push(
                            DiscoveryError::new(DiscoveryStage::Scan, error)
                                .with_module(module_path)
                                .with_file(path),
                        );
                    }
                }
            }
        }

        let mut candidates = Vec::new();
        for module_path in &order {
            let Some(module) = index.get(module_path) else {
                continue;
            };
            if module.is_package {
                continue;
            }
            for class in module.classes.iter().filter(|c| self.is_candidate(c)) {
                candidates.push(Candidate {
                    module_path: module_path.clone(),
                    class_name: class.name.clone(),
                    file: module.file.clone(),
                    line: class.line,
                });
            }
        }

        tracing::info!(
            files = files_scanned,
            modules = index.len(),
            candidates = candidates.len(),
            errors = errors.len(),
            "static scan complete"
        );

        ScanResult {
            index: Arc::new(index),
            candidates,
            errors,
            files_scanned,
        }
    }

    fn parse_file(
        &self,
        path: &Path,
        module_path: &str,
        is_package: bool,
    ) -> Result<SourceModule, FrameworkError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            self.error_handler
                .from_error("scan", error_ids::SCAN_READ_FAILED, ErrorCategory::System, &e)
        })?;
        parse_module(&source, module_path, path, is_package).map_err(|e| {
            self.error_handler
                .from_error("scan", error_ids::SCAN_SYNTAX_ERROR, ErrorCategory::Validation, &e)
                .with_field(format!("{}:{}", path.display(), e.line))
        })
    }
}

/// `<base>/pkg/sub/mod.py` -> `pkg.sub.mod`, `<base>/pkg/__init__.py` -> `pkg`
fn module_path_for(base: &Path, path: &Path, is_package: bool) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let file = parts.pop()?;
    if !is_package {
        parts.push(file.strip_suffix(".py").unwrap_or(&file).to_string());
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn finds_candidates_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("components");
        write(&root, "__init__.py", "");
        write(&root, "base.py", "class Component:\n    pass\n");
        write(
            &root,
            "tools/search.py",
            "from components.base import Component\n\nclass SearchComponent(Component):\n    pass\n\nclass Helper:\n    pass\n\nclass SlackConnector(BaseConnector):\n    pass\n",
        );
        write(&root, "tests/test_search.py", "class TestComponent(Component):\n    pass\n");
        write(&root, "tools/__main__.py", "class MainComponent(Component):\n    pass\n");

        let scanner = StaticScanner::new(&DiscoveryConfig::default());
        let result = scanner.scan(&[root.clone()]);

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let found: Vec<(&str, &str)> = result
            .candidates
            .iter()
            .map(|c| (c.module_path.as_str(), c.class_name.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("components.tools.search", "SearchComponent"),
                ("components.tools.search", "SlackConnector"),
            ]
        );
        assert!(result.index.get("components").unwrap().is_package);
        assert!(result.index.exists("components.tools"));
        assert!(result.index.is_in_tree("components.nope"));
        assert!(!result.index.is_in_tree("langflow.custom"));
    }

    #[test]
    fn syntax_errors_do_not_abort_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("pkg");
        write(&root, "good.py", "class GoodComponent(Component):\n    pass\n");
        write(&root, "bad.py", "class BadComponent(Component):\n    x = 'unterminated\n");

        let scanner = StaticScanner::new(&DiscoveryConfig::default());
        let result = scanner.scan(&[root]);

        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].stage, DiscoveryStage::Scan);
        assert_eq!(result.errors[0].error.error_id, error_ids::SCAN_SYNTAX_ERROR);
        assert_eq!(result.errors[0].module_path.as_deref(), Some("pkg.bad"));
    }

    #[test]
    fn missing_root_is_recorded() {
        let scanner = StaticScanner::new(&DiscoveryConfig::default());
        let result = scanner.scan(&[PathBuf::from("/definitely/not/here")]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error.error_id, error_ids::SCAN_ROOT_MISSING);
    }
}
