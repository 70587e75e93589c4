use std::{fmt, str::FromStr};

use carbon_error::{bail, CarbonResult, StatusCode};
use serde::{Deserialize, Serialize};

/// Допустимые уровни логирования.
pub const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        };
        f.write_str(name)
    }
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Уровень для крейтов `carbon` и `carbon_cli`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub with_ansi: bool,
    #[serde(default)]
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            with_ansi: true,
            with_target: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(
        mut self,
        level: impl Into<String>,
    ) -> Self {
        self.level = level.into();
        self
    }

    /// Переопределения из окружения: `CARBON_LOG_LEVEL`, `CARBON_LOG_FORMAT`.
    /// Нераспознанный формат игнорируется.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("CARBON_LOG_LEVEL") {
            self.level = level.to_ascii_lowercase();
        }
        if let Ok(format) = std::env::var("CARBON_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.format = format;
            }
        }
    }

    pub fn validate(&self) -> CarbonResult<()> {
        if !LEVELS.contains(&self.level.as_str()) {
            bail!(
                StatusCode::InvalidArgs,
                "invalid log level '{}', expected one of {:?}",
                self.level,
                LEVELS
            );
        }
        Ok(())
    }

    /// Директива `EnvFilter` для собственных крейтов.
    pub fn build_filter_directive(&self) -> String {
        format!("carbon={0},carbon_cli={0}", self.level)
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.build_filter_directive(), "carbon=info,carbon_cli=info");
    }

    #[test]
    fn test_invalid_level_rejected() {
        let cfg = LoggingConfig::default().with_level("loud");
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
    }

    /// Тест проверяет переопределение уровня и формата из окружения.
    #[test]
    #[serial]
    fn test_env_overrides() {
        env::set_var("CARBON_LOG_LEVEL", "DEBUG");
        env::set_var("CARBON_LOG_FORMAT", "json");
        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides();
        env::remove_var("CARBON_LOG_LEVEL");
        env::remove_var("CARBON_LOG_FORMAT");

        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
    }

    #[test]
    #[serial]
    fn test_unknown_format_ignored() {
        env::set_var("CARBON_LOG_FORMAT", "xml");
        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides();
        env::remove_var("CARBON_LOG_FORMAT");
        assert_eq!(cfg.format, LogFormat::Pretty);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
