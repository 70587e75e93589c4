use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибка чтения/записи архива с контекстом для диагностики.
#[derive(Debug, Clone)]
pub enum ArchiveError {
    /// В позиции ожидался один маркер, а встретился другой
    InvalidMarker {
        expected: u8,
        got: u8,
        what: String,
        offset: Option<u64>,
    },

    /// Поток не начинается с магической строки архива
    InvalidMagic { got: Vec<u8> },

    /// Версия формата, которую этот код не умеет читать
    UnsupportedVersion { found: u8, supported: u8 },

    /// Смещение корневого объекта в заголовке равно нулю
    MissingRoot,

    /// Неожиданный конец потока
    UnexpectedEof {
        context: String,
        offset: Option<u64>,
        needed: Option<u64>,
    },

    /// Записанное смещение не совпадает с фактической позицией
    OffsetMismatch {
        what: String,
        stored: u64,
        actual: u64,
    },

    /// Несовпадение количеств или размеров
    SizeMismatch {
        what: String,
        expected: u64,
        got: u64,
    },

    /// Структурное повреждение данных
    CorruptedData { reason: String, offset: Option<u64> },

    /// Неизвестный маркер типа свойства или колонки
    NoSuchType { marker: u8, offset: Option<u64> },

    /// Значение не соответствует объявленному типу
    TypeMismatch {
        what: String,
        expected: String,
        got: String,
    },

    /// Индекс строк уже запечён в поток
    IndexAlreadyPresent,

    /// SID отсутствует в таблице строк
    UnknownSid { sid: u64 },

    /// Ошибка ввода-вывода
    Io { reason: String },
}

impl ArchiveError {
    /// Добавляет контекст offset к ошибке.
    pub fn with_offset(
        mut self,
        offset: u64,
    ) -> Self {
        match &mut self {
            Self::InvalidMarker { offset: o, .. }
            | Self::UnexpectedEof { offset: o, .. }
            | Self::CorruptedData { offset: o, .. }
            | Self::NoSuchType { offset: o, .. } => {
                *o = Some(offset);
            }
            _ => {}
        }
        self
    }

    /// Сокращённый конструктор для `CorruptedData` без смещения.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Self::CorruptedData {
            reason: reason.into(),
            offset: None,
        }
    }

    /// Возвращает recovery hint для пользователя.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidMagic { .. } => Some("The file is not a carbon archive"),
            Self::UnsupportedVersion { .. } => {
                Some("Rebuild the archive with a matching version of the tool")
            }
            Self::UnexpectedEof { .. } => Some("File may be truncated. Check file integrity"),
            Self::InvalidMarker { .. }
            | Self::OffsetMismatch { .. }
            | Self::CorruptedData { .. }
            | Self::MissingRoot => Some("Rebuild the archive from its source document"),
            Self::IndexAlreadyPresent => Some("Open the archive and query it directly"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArchiveError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::InvalidMarker {
                expected,
                got,
                what,
                offset,
            } => {
                write!(
                    f,
                    "Invalid marker for {what}: expected '{}', got 0x{got:02X}",
                    *expected as char
                )?;
                write_offset(f, *offset)
            }
            Self::InvalidMagic { got } => {
                write!(f, "Invalid magic: {:?}", String::from_utf8_lossy(got))
            }
            Self::UnsupportedVersion { found, supported } => {
                write!(f, "Unsupported version {found} (supported: {supported})")
            }
            Self::MissingRoot => write!(f, "Archive has no root object"),
            Self::UnexpectedEof {
                context,
                offset,
                needed,
            } => {
                write!(f, "Unexpected EOF: {context}")?;
                if let Some(n) = needed {
                    write!(f, " (needed {n} more bytes)")?;
                }
                write_offset(f, *offset)
            }
            Self::OffsetMismatch {
                what,
                stored,
                actual,
            } => {
                write!(
                    f,
                    "Offset mismatch for {what}: stored 0x{stored:X}, actual 0x{actual:X}"
                )
            }
            Self::SizeMismatch {
                what,
                expected,
                got,
            } => {
                write!(f, "Size mismatch for {what}: expected {expected}, got {got}")
            }
            Self::CorruptedData { reason, offset } => {
                write!(f, "Corrupted data: {reason}")?;
                write_offset(f, *offset)
            }
            Self::NoSuchType { marker, offset } => {
                write!(f, "No such type marker 0x{marker:02X}")?;
                write_offset(f, *offset)
            }
            Self::TypeMismatch {
                what,
                expected,
                got,
            } => {
                write!(f, "Type mismatch for {what}: expected {expected}, got {got}")
            }
            Self::IndexAlreadyPresent => {
                write!(f, "String id index is already present in the archive")
            }
            Self::UnknownSid { sid } => write!(f, "Unknown string id {sid}"),
            Self::Io { reason } => write!(f, "I/O error: {reason}"),
        }
    }
}

/// Вспомогательная функция для форматирования смещения.
fn write_offset(
    f: &mut std::fmt::Formatter<'_>,
    offset: Option<u64>,
) -> std::fmt::Result {
    if let Some(o) = offset {
        write!(f, " [offset: 0x{o:X}]")?;
    }
    Ok(())
}

impl std::error::Error for ArchiveError {}

impl ErrorExt for ArchiveError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidMarker { .. } => StatusCode::CorruptedData,
            Self::InvalidMagic { .. } => StatusCode::DeserializationFailed,
            Self::UnsupportedVersion { .. } => StatusCode::UnsupportedVersion,
            Self::MissingRoot => StatusCode::CorruptedData,
            Self::UnexpectedEof { .. } => StatusCode::UnexpectedEof,
            Self::OffsetMismatch { .. } => StatusCode::OffsetMismatch,
            Self::SizeMismatch { .. } => StatusCode::SizeMismatch,
            Self::CorruptedData { .. } => StatusCode::CorruptedData,
            Self::NoSuchType { .. } => StatusCode::Unsupported,
            Self::TypeMismatch { .. } => StatusCode::TypeError,
            Self::IndexAlreadyPresent => StatusCode::Internal,
            Self::UnknownSid { .. } => StatusCode::NotFound,
            Self::Io { .. } => StatusCode::Io,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::InvalidMagic { .. } => "Not a carbon archive".to_string(),
            Self::UnsupportedVersion { found, .. } => {
                format!("Unsupported archive version {found}")
            }
            Self::UnexpectedEof { .. } => "Incomplete archive file".to_string(),
            Self::IndexAlreadyPresent => "Archive already has a string id index".to_string(),
            Self::InvalidMarker { .. }
            | Self::MissingRoot
            | Self::OffsetMismatch { .. }
            | Self::CorruptedData { .. } => "Archive file is corrupted".to_string(),
            _ => self.to_string(),
        }
    }

    fn log_message(&self) -> String {
        let mut msg = format!("{self:?}");
        if let Some(hint) = self.recovery_hint() {
            msg.push_str(&format!(" | Hint: {hint}"));
        }
        msg
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::InvalidMarker { got, .. } | Self::NoSuchType { marker: got, .. } => {
                tags.push(("marker", format!("0x{got:02X}")));
            }
            Self::UnsupportedVersion { found, .. } => {
                tags.push(("version", found.to_string()));
            }
            _ => {}
        }

        tags
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ArchiveError::UnexpectedEof {
                context: e.to_string(),
                offset: None,
                needed: None,
            },
            _ => ArchiveError::Io {
                reason: e.to_string(),
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что `with_offset` проставляет смещение и оно
    /// отображается в `Display` в шестнадцатеричном виде.
    #[test]
    fn test_with_offset_display() {
        let err = ArchiveError::NoSuchType {
            marker: b'?',
            offset: None,
        }
        .with_offset(0x2A);
        let s = err.to_string();
        assert!(s.contains("0x3F"), "got: {s}");
        assert!(s.contains("offset: 0x2A"), "got: {s}");
    }

    #[test]
    fn test_with_offset_ignored_for_offsetless_variants() {
        let err = ArchiveError::MissingRoot.with_offset(10);
        assert!(matches!(err, ArchiveError::MissingRoot));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ArchiveError::corrupted("x").status_code(),
            StatusCode::CorruptedData
        );
        assert_eq!(
            ArchiveError::UnknownSid { sid: 3 }.status_code(),
            StatusCode::NotFound
        );
        assert_eq!(
            ArchiveError::IndexAlreadyPresent.status_code(),
            StatusCode::Internal
        );
        assert!(ArchiveError::InvalidMagic { got: b"ZDB".to_vec() }
            .status_code()
            .is_format_error());
    }

    /// Тест проверяет, что пользовательские сообщения не раскрывают
    /// внутренних смещений, а лог-сообщение содержит подсказку.
    #[test]
    fn test_client_and_log_messages() {
        let err = ArchiveError::OffsetMismatch {
            what: "column".to_string(),
            stored: 0x10,
            actual: 0x20,
        };
        assert_eq!(err.client_message(), "Archive file is corrupted");
        assert!(err.log_message().contains("Hint:"));
    }

    #[test]
    fn test_from_io_error() {
        let e = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            ArchiveError::from(e),
            ArchiveError::UnexpectedEof { .. }
        ));

        let e = std::io::Error::other("boom");
        assert!(matches!(ArchiveError::from(e), ArchiveError::Io { .. }));
    }

    #[test]
    fn test_metrics_tags_marker() {
        let err = ArchiveError::InvalidMarker {
            expected: b'}',
            got: 0x41,
            what: "object end".to_string(),
            offset: None,
        };
        let tags = err.metrics_tags();
        assert!(tags.iter().any(|(k, v)| *k == "marker" && v == "0x41"));
    }
}
