//! Engine configuration loaded with Figment
//!
//! Sources in precedence order (later sources override earlier ones):
//! 1. Default values
//! 2. An optional TOML file
//! 3. Environment variables with the `QUICKJS_SHIM_` prefix

use crate::error::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, trace};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "QUICKJS_SHIM_";

/// Settings applied when a handle creates its runtime and context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Runtime heap limit in bytes; unlimited when unset
    pub memory_limit: Option<usize>,

    /// Maximum native stack used by the interpreter in bytes
    pub max_stack_size: Option<usize>,

    /// Evaluate top-level source in strict mode
    pub strict: bool,

    /// Drain promise jobs after each top-level evaluation
    pub run_pending_jobs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: None,
            strict: false,
            run_pending_jobs: true,
        }
    }
}

impl EngineConfig {
    /// Load defaults overridden by `QUICKJS_SHIM_*` environment variables
    pub fn load() -> Result<Self> {
        Self::extract(Self::figment())
    }

    /// Load defaults, then `path`, then environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        trace!("Loading engine config file: {}", path.display());
        let figment = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file(path))
            .merge(Self::env());
        Self::extract(figment)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Self::env())
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: EngineConfig = figment.extract()?;
        debug!("Engine config: {:?}", config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_defaults() {
        let config = EngineConfig::load().unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.strict);
        assert!(config.run_pending_jobs);
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.toml");
        fs::write(&path, "memory_limit = 1048576\nstrict = true\n").unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.memory_limit, Some(1_048_576));
        assert!(config.strict);
        assert_eq!(config.max_stack_size, None);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.toml");
        fs::write(&path, "max_stack_size = 1024\n").unwrap();

        std::env::set_var("QUICKJS_SHIM_MAX_STACK_SIZE", "2048");
        let config = EngineConfig::load_from(&path);
        std::env::remove_var("QUICKJS_SHIM_MAX_STACK_SIZE");

        assert_eq!(config.unwrap().max_stack_size, Some(2048));
    }

    #[test]
    #[serial]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    #[serial]
    fn test_bad_value_is_config_error() {
        std::env::set_var("QUICKJS_SHIM_STRICT", "not-a-bool");
        let result = EngineConfig::load();
        std::env::remove_var("QUICKJS_SHIM_STRICT");

        assert!(matches!(result, Err(crate::ShimError::Config(_))));
    }
}
