use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок архива (object-safe).
///
/// Каждая ошибка, которая может оказаться внутри [`crate::StackError`],
/// сообщает свой статус-код, краткое сообщение для пользователя CLI и
/// детализированное сообщение для логов.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Категория ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any), чтобы можно было
    /// выполнить downcast к конкретному типу.
    fn as_any(&self) -> &dyn Any;

    /// Короткое сообщение для пользователя.
    ///
    /// Внутренние ошибки не раскрывают деталей реализации.
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal | StatusCode::Unexpected => {
                "Internal archive error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Набор тегов (ключ–значение) для структурного логирования.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ]
    }

    /// Имя типа ошибки (без пути модулей).
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{any::Any, error::Error, fmt};

    use super::*;

    #[derive(Debug)]
    struct DefaultError(pub &'static str);

    impl fmt::Display for DefaultError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "DefaultError: {}", self.0)
        }
    }

    impl Error for DefaultError {}

    impl ErrorExt for DefaultError {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct EofError(pub &'static str);

    impl fmt::Display for EofError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "EOF: {}", self.0)
        }
    }

    impl Error for EofError {}

    impl ErrorExt for EofError {
        fn status_code(&self) -> StatusCode {
            StatusCode::UnexpectedEof
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Тест проверяет, что по умолчанию статус ошибки — `Internal`, а
    /// сообщение для пользователя не раскрывает деталей.
    #[test]
    fn test_default_status_and_client_message() {
        let e = DefaultError("offset table overflow");
        assert_eq!(e.status_code(), StatusCode::Internal);
        assert_eq!(e.client_message(), "Internal archive error");
    }

    #[test]
    fn test_client_message_non_internal() {
        let e = EofError("string table");
        assert_eq!(e.client_message(), e.to_string());
    }

    #[test]
    fn test_as_any_downcast() {
        let e = EofError("x");
        let down = e.as_any().downcast_ref::<EofError>();
        assert_eq!(down.map(|d| d.0), Some("x"));
    }

    /// Тест проверяет, что `metrics_tags` содержит `error_type` и
    /// `status_code`, а `type_name` — короткое имя типа.
    #[test]
    fn test_metrics_tags_and_type_name() {
        let e = EofError("t");
        let tags = e.metrics_tags();
        assert!(tags
            .iter()
            .any(|(k, v)| *k == "error_type" && v.ends_with("EofError")));
        assert!(tags
            .iter()
            .any(|(k, v)| *k == "status_code" && *v == StatusCode::UnexpectedEof.to_string()));
        assert_eq!(e.log_message(), format!("{e:?}"));
    }
}
