use std::path::{Path, PathBuf};

use carbon_error::{CarbonResult, ResultExt};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    archive::{ArchiveOptions, PackerKind},
    logging::LoggingConfig,
};

/// Настройки сборки и чтения архивов.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub compressor: String,
    pub bake_index: bool,
    pub read_optimized: bool,
    pub string_cache_capacity: usize,
    pub log_level: String,
    pub log_format: String,
    pub tmp_dir: Option<PathBuf>,
}

impl Settings {
    /// Значения по умолчанию, переопределённые переменными `CARBON_*`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Как [`Settings::load`], но с файлом настроек между умолчаниями и
    /// окружением.
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("compressor", "huffman")?
            .set_default("bake_index", false)?
            .set_default("read_optimized", false)?
            .set_default("string_cache_capacity", 1024)?
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        // Переменные окружения с префиксом CARBON_
        let cfg = builder
            .add_source(Environment::with_prefix("CARBON").try_parsing(true))
            .build()?;

        cfg.try_deserialize()
    }

    /// Параметры сборки архива.
    pub fn archive_options(&self) -> CarbonResult<ArchiveOptions> {
        let compressor: PackerKind = self
            .compressor
            .parse()
            .context("parse compressor setting")?;
        Ok(ArchiveOptions {
            compressor,
            bake_index: self.bake_index,
            read_optimized: self.read_optimized,
            tmp_dir: self.tmp_dir.clone(),
        })
    }

    /// Конфигурация логирования; нераспознанный формат заменяется
    /// форматом по умолчанию.
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.to_ascii_lowercase(),
            format: self.log_format.parse().unwrap_or_default(),
            ..LoggingConfig::default()
        }
    }
}
