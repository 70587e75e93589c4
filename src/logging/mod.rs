//! Инициализация `tracing` для CLI и тестов.

pub mod config;
mod filters;
mod formatter;

pub use config::{LogFormat, LoggingConfig};
use carbon_error::{CarbonResult, GenericError, LogLevel, StackError, StatusCode};
pub use filters::build_filter_from_config;
pub use formatter::build_layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Устанавливает глобальный subscriber. Повторный вызов возвращает ошибку
/// `AlreadyExists`.
pub fn init_logging(mut config: LoggingConfig) -> CarbonResult<()> {
    config.apply_env_overrides();
    config.validate()?;

    let env_filter = build_filter_from_config(&config);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(build_layer(&config))
        .try_init()
        .map_err(|e| GenericError::new(StatusCode::AlreadyExists, e.to_string()))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = %config.format,
        "Logging system initialized"
    );
    Ok(())
}

/// Пишет ошибку в лог на уровне, рекомендованном её статус-кодом.
/// Повреждения формата и внутренние ошибки помечаются `critical`.
pub fn log_error(err: &StackError) {
    let status = err.status_code();
    let critical = err.is_critical();
    match err.log_level() {
        LogLevel::Error => tracing::error!(%status, critical, "{err}"),
        LogLevel::Warn => tracing::warn!(%status, critical, "{err}"),
        LogLevel::Info => tracing::info!(%status, critical, "{err}"),
        LogLevel::Debug => tracing::debug!(%status, critical, "{err}"),
        LogLevel::Trace => tracing::trace!(%status, critical, "{err}"),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
