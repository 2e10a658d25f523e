use std::io::IsTerminal;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Environment variable holding the filter directive.
pub const ENV_LOG: &str = "CST_LOG";
/// Environment variable holding the output format.
pub const ENV_LOG_FORMAT: &str = "CST_LOG_FORMAT";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `"info"` or `"cst_core=debug,info"`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: cfg!(test) || std::io::stdout().is_terminal(),
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by `CST_LOG` and `CST_LOG_FORMAT` when set.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(level) = lookup(ENV_LOG) {
            cfg.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            cfg.format = format.parse()?;
        }
        cfg.filter()?;
        Ok(cfg)
    }

    pub(crate) fn filter(&self) -> Result<EnvFilter, LoggerError> {
        EnvFilter::try_new(&self.level).map_err(|_| LoggerError::InvalidFilter(self.level.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LoggerConfig::default();
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.level, "info");
        assert!(cfg.with_targets);
        assert!(cfg.use_color);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let cfg = LoggerConfig::from_lookup(|key| match key {
            ENV_LOG => Some("cst_core=debug,info".to_string()),
            ENV_LOG_FORMAT => Some("json".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.level, "cst_core=debug,info");
        assert_eq!(cfg.format, LoggerFormat::Json);
    }

    #[test]
    fn lookup_rejects_bad_values() {
        let bad_format = LoggerConfig::from_lookup(|key| (key == ENV_LOG_FORMAT).then(|| "xml".to_string()));
        assert!(matches!(bad_format, Err(LoggerError::UnknownFormat(_))));

        let bad_level = LoggerConfig::from_lookup(|key| (key == ENV_LOG).then(|| "cst_core=loud".to_string()));
        assert!(matches!(bad_level, Err(LoggerError::InvalidFilter(_))));
    }

    #[test]
    fn deserializes_partial_config() {
        let cfg: LoggerConfig =
            serde_json::from_str(r#"{"format":"json","level":"cst_core=debug"}"#).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level, "cst_core=debug");
        assert!(cfg.with_targets);
    }
}
