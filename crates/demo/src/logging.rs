//! Logger setup for the demo binary.

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::sync::Once;

/// Crates whose output is capped at `backend_level` unless `RUST_LOG` says otherwise.
const BACKEND_CRATES: [&str; 4] = ["wgpu", "wgpu_core", "wgpu_hal", "naga"];

static INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset, in `env_logger` syntax.
    pub level: String,
    /// Ceiling for the graphics backend crates.
    pub backend_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            backend_level: "warn".to_string(),
        }
    }
}

impl LoggingConfig {
    fn backend_filter(&self) -> LevelFilter {
        self.backend_level.parse().unwrap_or(LevelFilter::Warn)
    }
}

/// Installs the global logger. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(config.level.as_str());
        let mut builder = env_logger::Builder::from_env(env);
        if std::env::var_os("RUST_LOG").is_none() {
            for krate in BACKEND_CRATES {
                builder.filter_module(krate, config.backend_filter());
            }
        }
        if let Err(e) = builder.try_init() {
            eprintln!("Logger already installed: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_level_falls_back_to_warn() {
        let mut config = LoggingConfig::default();
        assert_eq!(config.backend_filter(), LevelFilter::Warn);
        config.backend_level = "error".into();
        assert_eq!(config.backend_filter(), LevelFilter::Error);
        config.backend_level = "loud".into();
        assert_eq!(config.backend_filter(), LevelFilter::Warn);
    }

    /// Repeated initialisation must not panic.
    #[test]
    fn init_twice() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
