//! CLI context - shared state and services for all commands

use crate::catalog::Catalog;
use crate::config::GenesisConfig;
use crate::discovery::DiscoveryEngine;
use crate::error::GenesisResult;
use crate::spec::parse_document;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Shared context for CLI commands
pub struct CliContext {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: GenesisConfig,
    /// Output format preference
    pub output_format: super::OutputFormat,
    /// Quiet mode (suppress status messages)
    pub quiet: bool,
    /// Verbose mode (extra debug output)
    pub verbose: bool,
}

impl CliContext {
    /// Create a new CLI context from configuration path
    pub fn new(config_path: PathBuf) -> GenesisResult<Self> {
        let config = GenesisConfig::load(&config_path)?;
        Ok(Self {
            config_path,
            config,
            output_format: super::OutputFormat::Table,
            quiet: false,
            verbose: false,
        })
    }

    /// Create context from the first `genesis.toml` found, or defaults
    pub fn with_defaults() -> GenesisResult<Self> {
        let default_paths = [
            PathBuf::from("genesis.toml"),
            PathBuf::from("config/genesis.toml"),
            PathBuf::from("../config/genesis.toml"),
        ];

        for path in &default_paths {
            if path.exists() {
                return Self::new(path.clone());
            }
        }

        Ok(Self {
            config_path: PathBuf::from("genesis.toml"),
            config: GenesisConfig::default(),
            output_format: super::OutputFormat::Table,
            quiet: false,
            verbose: false,
        })
    }

    pub fn validate_config(&self) -> Vec<String> {
        self.config.validate()
    }

    /// Discovery engine for the configured settings, with CLI overrides
    pub fn discovery_engine(&self, sequential: bool, workers: Option<usize>) -> DiscoveryEngine {
        let mut config = self.config.discovery.clone();
        if sequential {
            config.parallel = false;
        }
        if let Some(workers) = workers {
            config.max_workers = workers;
        }
        DiscoveryEngine::new(config)
    }

    /// Run discovery over `roots`, or the configured roots when empty
    pub async fn catalog(&self, roots: &[PathBuf]) -> Catalog {
        let engine = self.discovery_engine(false, None);
        let catalog = if roots.is_empty() {
            engine.discover_configured().await
        } else {
            engine.discover(roots).await
        };
        self.debug(&format!(
            "Catalog has {} components ({} discovery errors)",
            catalog.len(),
            catalog.errors().len()
        ));
        catalog
    }

    /// Read a JSON or YAML document
    pub fn read_document(&self, path: &Path) -> GenesisResult<Value> {
        let content = std::fs::read_to_string(path)?;
        parse_document(&content)
    }

    /// Print status message (respects quiet mode)
    pub fn status(&self, message: &str) {
        if !self.quiet {
            eprintln!("{}", message);
        }
    }

    /// Print verbose message (only in verbose mode)
    pub fn debug(&self, message: &str) {
        if self.verbose {
            eprintln!("[DEBUG] {}", message);
        }
    }
}
