//! Carbon: колоночный бинарный архив JSON-документов.
//!
//! Документ превращается в модель ([`model`]), где все строки
//! интернированы в словаре, затем сериализуется в архив ([`archive`]):
//! таблица строк (без сжатия или с кодом Хаффмана), дерево объектов с
//! типизированными группами свойств и, опционально, индекс SID → смещение.

/// Сборка, разбор, печать и запросы к архивам.
pub mod archive;
/// Настройки сборки архивов (`config` + переменные `CARBON_*`).
pub mod config;
/// Ошибки уровня модели документа.
pub mod error;
/// Инициализация `tracing`.
pub mod logging;
/// Колоночная модель документа, словарь строк и конвертация из JSON.
pub mod model;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use archive::{
    archive_from_json, archive_from_model, bake_index, load_archive, write_archive, Archive,
    ArchiveInfo, ArchiveOptions, PackerKind,
};
pub use carbon_error::{CarbonResult, StackError, StatusCode};
pub use config::Settings;
pub use error::ModelError;
pub use model::{DocObject, StringDict, SyncStringDict};
