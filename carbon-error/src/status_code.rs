use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса для категоризации ошибок архива.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных (входная модель документа, запросы)
/// - 5xxx: Формат архива (повреждения, несовпадения структуры)
/// - 6xxx: Ввод-вывод
/// - 8xxx: Кодирование строк и версий
///
/// `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    NotImplemented = 1005,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    AlreadyExists = 2001,
    TypeError = 2002,
    InvalidValue = 2004,
    InvalidData = 2009,

    // === 5xxx: Формат архива ===
    CorruptedData = 5002,
    SerializationFailed = 5003,
    DeserializationFailed = 5004,
    CompressionFailed = 5005,
    SizeMismatch = 5008,
    OffsetMismatch = 5009,

    // === 6xxx: IO ===
    Io = 6000,
    PermissionDenied = 6008,
    UnexpectedEof = 6007,

    // === 8xxx: Кодирование ===
    UnsupportedVersion = 8002,
    InvalidUtf8 = 8004,
    SizeLimit = 8007,
    ParseError = 8009,
    EncodingError = 8010,
    DecodingError = 8011,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка во входных данных (модель документа, запрос) — диапазон 2xxx.
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=2999).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs)
    }

    /// Поток байт не является корректным архивом: повреждения формата
    /// (5xxx) и ошибки декодирования (8xxx).
    pub fn is_format_error(&self) -> bool {
        let c = self.code();
        (5000..=5999).contains(&c) || (8000..=8999).contains(&c)
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::CorruptedData | Self::OffsetMismatch
        )
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::AlreadyExists => LogLevel::Debug,
            Self::InvalidArgs | Self::TypeError | Self::InvalidValue | Self::InvalidData => {
                LogLevel::Info
            }
            Self::Internal | Self::CorruptedData | Self::OffsetMismatch => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
