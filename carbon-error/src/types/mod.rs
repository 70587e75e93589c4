pub mod archive;
pub mod packer;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use archive::*;
pub use packer::*;

use crate::{ErrorExt, StatusCode};

/// Универсальная ошибка с кодом и сообщением.
#[derive(Debug, Clone)]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenericError {}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Конвертация из std::io::Error
impl From<std::io::Error> for crate::StackError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => StatusCode::NotFound,
            std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
            std::io::ErrorKind::UnexpectedEof => StatusCode::UnexpectedEof,
            _ => StatusCode::Io,
        };

        crate::StackError::new(GenericError::new(code, err.to_string()))
    }
}

/// Конвертация из std::str::Utf8Error
impl From<std::str::Utf8Error> for crate::StackError {
    fn from(err: std::str::Utf8Error) -> Self {
        crate::StackError::new(GenericError::new(
            StatusCode::InvalidUtf8,
            format!("UTF-8 decoding failed: {err}"),
        ))
    }
}

/// Конвертация из std::string::FromUtf8Error
impl From<std::string::FromUtf8Error> for crate::StackError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        crate::StackError::new(GenericError::new(
            StatusCode::InvalidUtf8,
            format!("UTF-8 conversion failed: {err}"),
        ))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_generic_error() {
        let err = GenericError::new(StatusCode::InvalidArgs, "test message");
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
        assert_eq!(err.to_string(), "test message");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let stack: crate::StackError = io_err.into();
        assert_eq!(stack.status_code(), StatusCode::NotFound);

        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let stack: crate::StackError = io_err.into();
        assert_eq!(stack.status_code(), StatusCode::UnexpectedEof);

        let io_err = io::Error::other("disk on fire");
        let stack: crate::StackError = io_err.into();
        assert_eq!(stack.status_code(), StatusCode::Io);
    }

    /// Тест проверяет, что as_any() позволяет сделать downcast_ref к
    /// GenericError.
    #[test]
    fn test_generic_error_as_any_downcast() {
        let err = GenericError::new(StatusCode::NotFound, "nf");
        let any_ref = err.as_any();
        let down = any_ref.downcast_ref::<GenericError>();
        assert!(down.is_some());
        assert_eq!(down.map(|e| e.to_string()), Some("nf".to_string()));
    }

    /// Тест проверяет конвертацию невалидного UTF-8 в StackError.
    #[test]
    fn test_utf8_conversion() {
        let bytes = vec![0xff, 0xfe];
        let err = String::from_utf8(bytes).unwrap_err();
        let stack: crate::StackError = err.into();
        assert_eq!(stack.status_code(), StatusCode::InvalidUtf8);
        assert!(stack.to_string().contains("UTF-8"));
    }
}
