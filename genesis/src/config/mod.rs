//! Configuration loading for `genesis.toml`.
//!
//! A missing file means defaults. Unknown keys are ignored so older binaries can
//! read newer files.

pub mod types;

pub use types::{CacheConfig, ConverterConfig, DiscoveryConfig, GenesisConfig, ResolverConfig};

use crate::error::{GenesisError, GenesisResult};
use std::path::Path;

impl GenesisConfig {
    /// Load from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> GenesisResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            GenesisError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::from_toml_str(&content).map_err(|e| {
            GenesisError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    pub fn from_toml_str(content: &str) -> GenesisResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> GenesisResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GenesisError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Human-readable warnings about settings that will misbehave.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.discovery.parallel && self.discovery.max_workers == 0 {
            warnings.push("discovery.max_workers is 0; one worker will be used".to_string());
        }
        if self.discovery.candidate_markers.is_empty() {
            warnings.push("discovery.candidate_markers is empty; no class will be a candidate".to_string());
        }
        if self.discovery.candidate_timeout_ms == 0 {
            warnings.push("discovery.candidate_timeout_ms is 0; every candidate will time out".to_string());
        }
        if self.cache.max_entries == 0 {
            warnings.push("cache.max_entries is 0; the cache will hold a single entry".to_string());
        }
        if !(self.cache.default_ttl_secs.is_finite() && self.cache.default_ttl_secs > 0.0) {
            warnings.push("cache.default_ttl_secs must be a positive number; 300 will be used".to_string());
        }
        if self.resolver.max_depth == 0 {
            warnings.push("resolver.max_depth is 0; no placeholder can be expanded".to_string());
        }
        if self.resolver.timeout_ms == 0 {
            warnings.push("resolver.timeout_ms is 0; every resolution will time out".to_string());
        }
        if self.converter.parallel_lookup && self.converter.max_workers == 0 {
            warnings.push("converter.max_workers is 0; one worker will be used".to_string());
        }
        if self.converter.runtime_type.trim().is_empty() {
            warnings.push("converter.runtime_type is empty".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = GenesisConfig::from_toml_str(
            r#"
            [discovery]
            parallel = false
            max_workers = 2

            [cache]
            max_entries = 3
            "#,
        )
        .unwrap();
        assert!(!config.discovery.parallel);
        assert_eq!(config.discovery.effective_workers(), 1);
        assert_eq!(config.cache.max_entries, 3);
        assert_eq!(config.cache.default_ttl_secs, 300.0);
        assert_eq!(config.resolver, ResolverConfig::default());
        assert_eq!(config.discovery.variant_attribute, "MODEL_OPTIONS");
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = GenesisConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, GenesisConfig::default());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn validate_flags_degenerate_settings() {
        let mut config = GenesisConfig::default();
        config.cache.max_entries = 0;
        config.resolver.max_depth = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn toml_round_trip() {
        let config = GenesisConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(GenesisConfig::from_toml_str(&text).unwrap(), config);
    }
}
