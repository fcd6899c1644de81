use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level `genesis.toml` layout. Every section may be omitted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenesisConfig {
    pub discovery: DiscoveryConfig,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub converter: ConverterConfig,
}

/// Scanner, loader and worker-pool settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Code trees to scan when none are given on the command line
    pub roots: Vec<PathBuf>,
    /// Directory names never descended into
    pub skip_dirs: Vec<String>,
    /// Case-insensitive substrings of a base-type name that mark a candidate
    pub candidate_markers: Vec<String>,
    /// Run load + introspection on a worker pool
    pub parallel: bool,
    pub max_workers: usize,
    /// Per-candidate load + introspection budget
    pub candidate_timeout_ms: u64,
    /// Model-family tokens recognised in variant class names
    pub model_families: Vec<String>,
    /// Class attribute holding explicit variant options
    pub variant_attribute: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            skip_dirs: [
                "__pycache__",
                "tests",
                "test",
                ".git",
                "build",
                "dist",
                "node_modules",
                ".venv",
                "venv",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            candidate_markers: vec!["component".to_string(), "connector".to_string()],
            parallel: true,
            max_workers: 8,
            candidate_timeout_ms: 10_000,
            model_families: ["gpt", "claude", "llama", "mistral"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            variant_attribute: "MODEL_OPTIONS".to_string(),
        }
    }
}

impl DiscoveryConfig {
    pub fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }

    /// Worker count actually used: 1 when sequential, never 0.
    pub fn effective_workers(&self) -> usize {
        if self.parallel {
            self.max_workers.max(1)
        } else {
            1
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_secs: f64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300.0, // 5 minutes
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::try_from_secs_f64(self.default_ttl_secs).unwrap_or(Duration::from_secs(300))
    }
}

/// Limits enforced by the variable resolver
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    pub timeout_ms: u64,
    /// Maximum placeholder expansion depth (variable -> variable -> ...)
    pub max_depth: usize,
    /// Maximum container nesting of a configuration value
    pub max_nesting: usize,
    pub max_entries: usize,
    pub max_list_length: usize,
    pub max_string_length: usize,
    pub max_serialized_bytes: usize,
    /// Expand `${env.NAME}` from the process environment
    pub allow_environment_variables: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_depth: 10,
            max_nesting: 20,
            max_entries: 10_000,
            max_list_length: 10_000,
            max_string_length: 100_000,
            max_serialized_bytes: 1024 * 1024, // 1 MB
            allow_environment_variables: false,
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConverterConfig {
    /// Overall deadline for one conversion call
    pub deadline_ms: Option<u64>,
    /// Apply regulated-domain overhead and compliance checks
    pub compliance: bool,
    /// Add input -> agent -> output and tool -> agent wiring
    pub implicit_connections: bool,
    /// Look up component types concurrently
    pub parallel_lookup: bool,
    pub max_workers: usize,
    /// `runtime_type` written into runtime adapter records
    pub runtime_type: String,
    /// Run the specification validator before converting
    pub validate: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            deadline_ms: None,
            compliance: false,
            implicit_connections: false,
            parallel_lookup: true,
            max_workers: 8,
            runtime_type: "langflow".to_string(),
            validate: true,
        }
    }
}

impl ConverterConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}
