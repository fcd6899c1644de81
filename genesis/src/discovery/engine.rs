//! Discovery orchestration: scan, load and introspect with a bounded worker
//! pool, register, consolidate, publish a [`Catalog`].

use super::introspector::{Introspection, Introspector};
use super::loader::{ComponentLoader, SourceLoader};
use super::scanner::{Candidate, StaticScanner};
use super::variants::consolidate;
use crate::catalog::{
    duplicate_type_error, Catalog, DiscoveredComponent, DiscoveryError, DiscoveryStage,
    DiscoveryStats,
};
use crate::config::DiscoveryConfig;
use crate::error::{error_ids, ErrorCategory, ErrorHandler, FrameworkError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

enum CandidateOutcome {
    Discovered(Box<DiscoveredComponent>),
    Abstract,
    Failed(DiscoveryError),
    TimedOut(DiscoveryError),
}

pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    loader: Option<Arc<dyn ComponentLoader>>,
    error_handler: ErrorHandler,
}

impl DiscoveryEngine {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            loader: None,
            error_handler: ErrorHandler::new("DiscoveryEngine"),
        }
    }

    /// Use a host-provided loader instead of the static source loader.
    pub fn with_loader(mut self, loader: Arc<dyn ComponentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discover from the configured roots.
    pub async fn discover_configured(&self) -> Catalog {
        let roots = self.config.roots.clone();
        self.discover(&roots).await
    }

    /// Run one full discovery. Never fails as a whole: per-candidate problems
    /// are recorded in the catalog's error list.
    pub async fn discover(&self, roots: &[PathBuf]) -> Catalog {
        let started = Instant::now();
        tracing::info!(
            roots = roots.len(),
            workers = self.config.effective_workers(),
            "starting component discovery"
        );

        let scanner_config = self.config.clone();
        let scan_roots = roots.to_vec();
        let scan = match tokio::task::spawn_blocking(move || {
            StaticScanner::new(&scanner_config).scan(&scan_roots)
        })
        .await
        {
            Ok(scan) => scan,
            Err(e) => {
                let error = self.join_error("scan", e);
                let stats = DiscoveryStats {
                    scan_failures: 1,
                    duration_ms: elapsed_ms(started),
                    ..DiscoveryStats::default()
                };
                return Catalog::new(
                    BTreeMap::new(),
                    stats,
                    vec![DiscoveryError::new(DiscoveryStage::Scan, error)],
                );
            }
        };

        let loader: Arc<dyn ComponentLoader> = match &self.loader {
            Some(loader) => loader.clone(),
            None => Arc::new(SourceLoader::new(scan.index.clone())),
        };
        let introspector = Arc::new(Introspector::new(&self.config));

        let mut stats = DiscoveryStats {
            files_scanned: scan.files_scanned,
            candidates: scan.candidates.len(),
            scan_failures: scan.errors.len(),
            ..DiscoveryStats::default()
        };
        let mut errors = scan.errors;

        let outcomes = self
            .process_candidates(scan.candidates, loader, introspector.clone())
            .await;

        let mut registered: Vec<DiscoveredComponent> = Vec::new();
        let mut seen_types: BTreeSet<String> = BTreeSet::new();
        for outcome in outcomes {
            match outcome {
                CandidateOutcome::Discovered(component) => {
                    stats.total_discovered += 1;
                    stats.variants_found += component.variants.len();
                    if !seen_types.insert(component.genesis_type.clone()) {
                        stats.duplicate_types += 1;
                        errors.push(duplicate_type_error(&component));
                        continue;
                    }
                    registered.push(*component);
                }
                CandidateOutcome::Abstract => stats.abstract_skipped += 1,
                CandidateOutcome::Failed(error) => {
                    stats.introspection_failures += 1;
                    errors.push(error);
                }
                CandidateOutcome::TimedOut(error) => {
                    stats.introspection_failures += 1;
                    stats.timeouts += 1;
                    errors.push(error);
                }
            }
        }

        let registered_count = registered.len();
        let consolidated = consolidate(registered, introspector.rules());
        stats.total_consolidated = consolidated.len();
        stats.components_with_variants = consolidated.iter().filter(|c| !c.variants.is_empty()).count();
        stats.reduction_ratio = if registered_count > 0 {
            (1.0 - consolidated.len() as f64 / registered_count as f64) * 100.0
        } else {
            0.0
        };
        stats.duration_ms = elapsed_ms(started);

        let components: BTreeMap<String, DiscoveredComponent> = consolidated
            .into_iter()
            .map(|c| (c.genesis_type.clone(), c))
            .collect();

        tracing::info!(
            discovered = stats.total_discovered,
            consolidated = stats.total_consolidated,
            errors = errors.len(),
            duration_ms = stats.duration_ms,
            "component discovery complete"
        );
        Catalog::new(components, stats, errors)
    }

    /// Load and introspect every candidate. Each candidate runs on the blocking
    /// pool under its own timeout; at most `effective_workers` run at once.
    /// Outcomes come back in candidate order.
    async fn process_candidates(
        &self,
        candidates: Vec<Candidate>,
        loader: Arc<dyn ComponentLoader>,
        introspector: Arc<Introspector>,
    ) -> Vec<CandidateOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.effective_workers()));
        let timeout = self.config.candidate_timeout();

        let handles: Vec<_> = candidates
            .into_iter()
            .map(|candidate| {
                let permits = permits.clone();
                let loader = loader.clone();
                let introspector = introspector.clone();
                let handler = self.error_handler.clone();
                tokio::spawn(async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            let error = handler.from_error(
                                "discover",
                                error_ids::INTERNAL_ERROR,
                                ErrorCategory::System,
                                &e,
                            );
                            return CandidateOutcome::Failed(locate(
                                DiscoveryError::new(DiscoveryStage::Load, error),
                                &candidate,
                            ));
                        }
                    };
                    let task_candidate = candidate.clone();
                    let task_handler = handler.clone();
                    let work = tokio::task::spawn_blocking(move || {
                        process_candidate(&task_candidate, loader.as_ref(), &introspector, &task_handler)
                    });
                    match tokio::time::timeout(timeout, work).await {
                        Ok(Ok(outcome)) => outcome,
                        Ok(Err(join_error)) => {
                            let error = worker_failure(&handler, join_error);
                            CandidateOutcome::Failed(locate(
                                DiscoveryError::new(DiscoveryStage::Introspect, error),
                                &candidate,
                            ))
                        }
                        Err(_) => {
                            let error = FrameworkError::timeout(
                                "discover",
                                error_ids::COMPONENT_DISCOVERY_TIMEOUT,
                                format!(
                                    "{}.{} did not load within {} ms",
                                    candidate.module_path,
                                    candidate.class_name,
                                    timeout.as_millis()
                                ),
                            )
                            .with_component(candidate.class_name.clone());
                            handler.log(&error);
                            CandidateOutcome::TimedOut(locate(
                                DiscoveryError::new(DiscoveryStage::Load, error),
                                &candidate,
                            ))
                        }
                    }
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    let error = self.join_error("discover", e);
                    outcomes.push(CandidateOutcome::Failed(DiscoveryError::new(
                        DiscoveryStage::Load,
                        error,
                    )));
                }
            }
        }
        outcomes
    }

    fn join_error(&self, operation: &str, e: tokio::task::JoinError) -> FrameworkError {
        worker_failure(&self.error_handler, e).with_field(operation.to_string())
    }
}

fn process_candidate(
    candidate: &Candidate,
    loader: &dyn ComponentLoader,
    introspector: &Introspector,
    handler: &ErrorHandler,
) -> CandidateOutcome {
    let loaded = match loader.load(candidate) {
        Ok(loaded) => loaded,
        Err(e) => {
            let error = handler
                .from_error("load", error_ids::COMPONENT_IMPORT_FAILED, ErrorCategory::System, &e)
                .with_component(candidate.class_name.clone());
            return CandidateOutcome::Failed(locate(
                DiscoveryError::new(DiscoveryStage::Load, error),
                candidate,
            ));
        }
    };
    match introspector.introspect(&loaded) {
        Ok(Introspection::Component(component)) => CandidateOutcome::Discovered(component),
        Ok(Introspection::Abstract) => CandidateOutcome::Abstract,
        Err(error) => CandidateOutcome::Failed(locate(
            DiscoveryError::new(DiscoveryStage::Introspect, error),
            candidate,
        )),
    }
}

fn worker_failure(handler: &ErrorHandler, e: tokio::task::JoinError) -> FrameworkError {
    if e.is_panic() {
        let payload = e.into_panic();
        handler.from_panic("discover", error_ids::COMPONENT_WORKER_PANICKED, payload.as_ref())
    } else {
        handler.from_error("discover", error_ids::INTERNAL_ERROR, ErrorCategory::System, &e)
    }
}

fn locate(error: DiscoveryError, candidate: &Candidate) -> DiscoveryError {
    error
        .with_module(candidate.module_path.clone())
        .with_class(candidate.class_name.clone())
        .with_file(candidate.file.clone())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::loader::{LoadError, LoadedClass};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn tree() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("components");
        write(&root, "__init__.py", "");
        write(
            &root,
            "inputs/chat.py",
            "class ChatInput(Component):\n    display_name = \"Chat Input\"\n    outputs = [Output(name=\"message\", method=\"message_response\")]\n",
        );
        write(
            &root,
            "tools/calc.py",
            "class CalculatorComponent(Component):\n    def build_tool(self):\n        pass\n",
        );
        write(
            &root,
            "tools/broken.py",
            "import components.missing_dependency\n\nclass BrokenComponent(Component):\n    pass\n",
        );
        (dir, root)
    }

    #[tokio::test]
    async fn partial_failure_keeps_the_rest() {
        let (_dir, root) = tree();
        let catalog = DiscoveryEngine::default().discover(&[root]).await;

        assert_eq!(catalog.stats().candidates, 3);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.errors().len(), 1);
        let error = &catalog.errors()[0];
        assert_eq!(error.stage, DiscoveryStage::Load);
        assert_eq!(error.class_name.as_deref(), Some("BrokenComponent"));
        assert_eq!(error.error.error_id, error_ids::COMPONENT_IMPORT_FAILED);
        assert_eq!(error.error.exception_type.as_deref(), Some("LoadError"));

        let calc = catalog.get("genesis:calculator").unwrap();
        assert!(calc.capabilities.provides_tools);
        assert_eq!(calc.category, crate::catalog::ComponentCategory::Tool);
        assert_eq!(catalog.get("chat_input").unwrap().display_name, "Chat Input");
    }

    #[tokio::test]
    async fn parallel_and_sequential_agree() {
        let (_dir, root) = tree();
        let parallel = DiscoveryEngine::new(DiscoveryConfig {
            max_workers: 4,
            ..DiscoveryConfig::default()
        })
        .discover(&[root.clone()])
        .await;
        let sequential = DiscoveryEngine::new(DiscoveryConfig {
            parallel: false,
            ..DiscoveryConfig::default()
        })
        .discover(&[root])
        .await;

        let summary = |c: &Catalog| {
            c.iter()
                .map(|d| (d.genesis_type.clone(), d.category.clone(), d.capabilities.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&parallel), summary(&sequential));
        assert_eq!(parallel.errors().len(), sequential.errors().len());
    }

    struct PanickingLoader;

    impl ComponentLoader for PanickingLoader {
        fn load(&self, _candidate: &Candidate) -> Result<LoadedClass, LoadError> {
            panic!("loader exploded")
        }
    }

    struct SlowLoader;

    impl ComponentLoader for SlowLoader {
        fn load(&self, candidate: &Candidate) -> Result<LoadedClass, LoadError> {
            std::thread::sleep(Duration::from_millis(300));
            Err(LoadError::ModuleNotFound(candidate.module_path.clone()))
        }
    }

    #[tokio::test]
    async fn worker_panics_are_contained() {
        let (_dir, root) = tree();
        let catalog = DiscoveryEngine::default()
            .with_loader(Arc::new(PanickingLoader))
            .discover(&[root])
            .await;
        assert!(catalog.is_empty());
        assert_eq!(catalog.errors().len(), 3);
        assert!(catalog
            .errors()
            .iter()
            .all(|e| e.error.error_id == error_ids::COMPONENT_WORKER_PANICKED
                && e.error.message.contains("loader exploded")));
    }

    #[tokio::test]
    async fn slow_candidates_time_out() {
        let (_dir, root) = tree();
        let catalog = DiscoveryEngine::new(DiscoveryConfig {
            candidate_timeout_ms: 20,
            ..DiscoveryConfig::default()
        })
        .with_loader(Arc::new(SlowLoader))
        .discover(&[root])
        .await;
        assert_eq!(catalog.stats().timeouts, 3);
        assert!(catalog
            .errors()
            .iter()
            .all(|e| e.error.category == ErrorCategory::Timeout && e.error.retry_possible));
    }
}
