use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Solver executable cannot be empty")]
    EmptyExecutable,

    #[error("Invalid launch_limit: {0}. Must be at least 1")]
    InvalidLaunchLimit(u32),

    #[error("Invalid exploratory_iter_cap: {0}. Must be at least 1")]
    InvalidIterCap(u32),

    #[error("Invalid min_continuation_cycles: {0}. Must be at least 1")]
    InvalidMinContinuationCycles(u32),

    #[error("Invalid budget_override_secs: {0}. Must be positive")]
    InvalidBudgetOverride(i64),

    #[error("Invalid pressure: {0}. Must be finite")]
    InvalidPressure(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. relaxq.yaml (project config)
    /// 3. relaxq.local.yaml (local overrides, optional)
    /// 4. Environment variables (RELAXQ_* prefix, highest priority)
    ///
    /// Resolved once at worker startup; nothing reads configuration ad
    /// hoc mid-run.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("relaxq.yaml"))
            .merge(Yaml::file("relaxq.local.yaml"))
            .merge(Env::prefixed("RELAXQ_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.solver.executable.trim().is_empty() {
            return Err(ConfigError::EmptyExecutable);
        }
        if !config.solver.pressure.is_finite() {
            return Err(ConfigError::InvalidPressure(config.solver.pressure));
        }

        if config.relax.launch_limit == 0 {
            return Err(ConfigError::InvalidLaunchLimit(config.relax.launch_limit));
        }
        if config.relax.exploratory_iter_cap == 0 {
            return Err(ConfigError::InvalidIterCap(config.relax.exploratory_iter_cap));
        }
        if config.relax.min_continuation_cycles == 0 {
            return Err(ConfigError::InvalidMinContinuationCycles(
                config.relax.min_continuation_cycles,
            ));
        }

        if let Some(secs) = config.oracle.budget_override_secs {
            if secs <= 0 {
                return Err(ConfigError::InvalidBudgetOverride(secs));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.relax.launch_limit, 5);
        assert_eq!(config.solver.executable, "castep.mpi");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_validate_empty_executable() {
        let mut config = Config::default();
        config.solver.executable = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyExecutable)
        ));
    }

    #[test]
    fn test_validate_zero_launch_limit() {
        let mut config = Config::default();
        config.relax.launch_limit = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLaunchLimit(0))
        ));
    }

    #[test]
    fn test_validate_zero_iter_cap() {
        let mut config = Config::default();
        config.relax.exploratory_iter_cap = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidIterCap(0))
        ));
    }

    #[test]
    fn test_validate_negative_budget_override() {
        let mut config = Config::default();
        config.oracle.budget_override_secs = Some(-10);
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBudgetOverride(-10))
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "loud"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "solver:\n  family: pp3\n  pressure: 2.0\nrelax:\n  launch_limit: 3"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "relax:\n  launch_limit: 8").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.relax.launch_limit, 8, "Override should win");
        assert!(
            (config.solver.pressure - 2.0).abs() < f64::EPSILON,
            "Base value should persist when not overridden"
        );
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("RELAXQ_RELAX__LAUNCH_LIMIT", Some("7")),
                ("RELAXQ_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config: Config = Figment::new()
                    .merge(Serialized::defaults(Config::default()))
                    .merge(Env::prefixed("RELAXQ_").split("__"))
                    .extract()
                    .unwrap();
                assert_eq!(config.relax.launch_limit, 7);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }
}
