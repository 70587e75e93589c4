/// Немедленно возвращает ошибку (аналогично `anyhow::bail!`).
///
/// Макрос возвращает `Err(StackError)` из текущей функции. Поддерживает три
/// формы:
/// - `bail!(err)` — принимает уже готовый тип ошибки или
///   `StackError`-совместимый тип;
/// - `bail!(code, "msg")` — создаёт `GenericError` с кодом и сообщением;
/// - `bail!(code, "fmt {}", arg)` — форматирует сообщение.
///
/// Пример:
///
/// ```ignore
/// use carbon_error::{bail, StatusCode};
///
/// fn check_root(root: u64) -> carbon_error::CarbonResult<()> {
///     if root == 0 {
///         bail!(StatusCode::CorruptedData, "root offset is zero");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $msg:expr) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, $msg)
        ))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($fmt, $($arg)*))
        ))
    };
}

/// Проверяет условие и вызывает `bail!`, если условие ложно.
///
/// Формы аналогичны `bail!`:
/// - `ensure!(cond, err)`;
/// - `ensure!(cond, code, "msg")`;
/// - `ensure!(cond, code, "fmt {}", arg)`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $code:expr, $msg:expr) => {
        if !($cond) {
            $crate::bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($code, $fmt, $($arg)*);
        }
    };
}

/// Добавляет контекст к `Result`.
///
/// Если аргумент — `Ok(val)`, возвращает `Ok(val)`. Если `Err(e)`, преобразует
/// `e` в `StackError` и добавляет указанный контекст.
#[macro_export]
macro_rules! context {
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => Ok(val),
            Err(e) => Err($crate::StackError::from(e).context($msg)),
        }
    };
    ($result:expr, $fmt:expr, $($arg:tt)*) => {
        match $result {
            Ok(val) => Ok(val),
            Err(e) => Err($crate::StackError::from(e).context(format!($fmt, $($arg)*))),
        }
    };
}

/// Трейт-расширение для `Result`, добавляющее методы контекстирования.
///
/// Позволяет вызывать `.context(...)` и `.with_context(...)` на результатах,
/// превращая ошибку в [`StackError`](crate::StackError) и приклеивая к ней
/// контекст.
pub trait ResultExt<T> {
    /// Если `self` — `Err`, оборачивает ошибку в `StackError` и добавляет
    /// указанный контекст.
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Ленивый контекст (строка формируется только в случае ошибки).
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(ctx))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArchiveError, CarbonResult, GenericError, StatusCode};

    #[test]
    fn test_bail_simple() {
        fn example() -> CarbonResult<()> {
            bail!(ArchiveError::MissingRoot);
        }

        let err = example().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CorruptedData);
    }

    #[test]
    fn test_bail_with_format() {
        fn example(len: usize) -> CarbonResult<()> {
            bail!(StatusCode::InvalidArgs, "Unexpected length: {}", len);
        }

        let err = example(42).unwrap_err();
        assert!(err.to_string().contains("Unexpected length: 42"));
    }

    #[test]
    fn test_ensure() {
        fn validate(strings: usize, sids: usize) -> CarbonResult<()> {
            ensure!(strings == sids, StatusCode::InvalidArgs, "length mismatch");
            ensure!(strings < 100, StatusCode::SizeLimit, "too many: {}", strings);
            Ok(())
        }

        assert!(validate(3, 3).is_ok());
        assert!(validate(3, 4).is_err());
        assert!(validate(150, 150).is_err());
    }

    #[test]
    fn test_context_macro() {
        let res: Result<(), GenericError> = Err(GenericError::new(StatusCode::Io, "disk"));
        let wrapped: CarbonResult<()> = context!(res, "write archive {}", "out.carbon");
        let err = wrapped.unwrap_err();
        assert_eq!(err.contexts()[0].message, "write archive out.carbon");
    }

    #[test]
    fn test_result_ext() {
        fn inner() -> Result<(), GenericError> {
            Err(GenericError::new(StatusCode::Internal, "inner error"))
        }

        fn outer() -> CarbonResult<()> {
            inner().context("outer context")?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.contexts().len(), 1);
        assert_eq!(err.contexts()[0].message, "outer context");
    }

    #[test]
    fn test_with_context_lazy() {
        fn example(success: bool) -> CarbonResult<()> {
            let result: Result<(), GenericError> = if success {
                Ok(())
            } else {
                Err(GenericError::new(StatusCode::Internal, "error"))
            };

            result.with_context(|| format!("attempt {success}"))?;
            Ok(())
        }

        assert!(example(true).is_ok());
        assert!(example(false).is_err());
    }
}
