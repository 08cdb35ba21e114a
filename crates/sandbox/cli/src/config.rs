//! Configuration for the sandbox driver

use serde::{Deserialize, Serialize};
use vulnsight_sandbox::synth::{FloodParams, InterceptParams};
use vulnsight_sandbox::SessionConfig;

/// Driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Flood session defaults
    #[serde(default)]
    pub flood: SessionConfig<FloodParams>,

    /// Intercept session defaults
    #[serde(default = "default_intercept")]
    pub intercept: SessionConfig<InterceptParams>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            flood: SessionConfig::default(),
            intercept: default_intercept(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_intercept() -> SessionConfig<InterceptParams> {
    SessionConfig::new(InterceptParams::default())
        .with_interval_ms(500)
        .with_log_capacity(50)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SandboxConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment keys use the `VULNSIGHT` prefix with `__` between levels,
    /// e.g. `VULNSIGHT_FLOOD__DURATION_S=30`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&SandboxConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VULNSIGHT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.flood.interval_ms, 1000);
        assert_eq!(config.flood.params.target_rate, 500);
        assert_eq!(config.intercept.interval_ms, 500);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file() {
        let config = SandboxConfig::load(None).unwrap();
        assert_eq!(config.flood.duration_s, 10);
        assert!(config.flood.seed.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[flood]\nduration_s = 30\n\n[flood.params]\ntarget_rate = 1500\n\n[logging]\njson = true"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = SandboxConfig::load(Some(&path)).unwrap();
        assert_eq!(config.flood.duration_s, 30);
        assert_eq!(config.flood.params.target_rate, 1500);
        assert_eq!(config.flood.interval_ms, 1000);
        assert!(config.logging.json);
    }
}
