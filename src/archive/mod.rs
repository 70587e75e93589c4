//! Бинарный архив документов в колоночном формате.
//!
//! ## Формат
//!
//! ```text
//! ArchiveHeader | StringTable | RecordHeader | корневой объект … | [индекс]
//! ```
//!
//! Все целые хранятся в little-endian. Смещения внутри записи
//! относительные и отсчитываются от корневого объекта, поэтому запись можно
//! перенести в другой буфер без перезаписи. Свойства объекта хранятся
//! группами по типу в каноническом порядке; массивы объектов
//! транспонированы в колонки.
//!
//! ## Пример
//!
//! ```no_run
//! use carbon::archive::{archive_from_json, Archive, ArchiveOptions};
//! use carbon::model::SyncStringDict;
//!
//! let mut dict = SyncStringDict::new();
//! let stream = archive_from_json(r#"{"k": 7}"#, &mut dict, &ArchiveOptions::default())?;
//! let archive = Archive::from_stream(stream.into_inner())?;
//! archive.print(&mut std::io::stdout())?;
//! # Ok::<(), carbon_error::StackError>(())
//! ```
//!
//! ## Модули
//!
//! - [`tags`] — magic, версия, маркеры и флаговые слова;
//! - [`memfile`] — буфер записи с резервированием и курсор чтения;
//! - [`header`] — заголовки фиксированного размера;
//! - [`packer`] — упаковка строк (без сжатия, Хаффман);
//! - [`strtab`] — таблица строк;
//! - [`encode`] / [`decode`] — сериализация и строгий разбор записи;
//! - [`print`] — текстовый дамп;
//! - [`index`] и [`query`] — индекс SID → смещение и запросы;
//! - [`builder`] и [`handle`] — сборка, запекание индекса, открытие.

pub mod builder;
pub mod decode;
pub mod encode;
pub mod handle;
pub mod header;
pub mod index;
pub mod memfile;
pub mod oid;
pub mod packer;
pub mod print;
pub mod query;
pub mod strtab;
pub mod tags;

pub use builder::{
    archive_from_json, archive_from_model, bake_index, load_archive, write_archive,
    ArchiveOptions,
};
pub use decode::{decode_record, read_archive, DecodedArchive, ObjectNode};
pub use encode::serialize;
pub use handle::{Archive, ArchiveInfo};
pub use index::SidIndex;
pub use memfile::{ByteReader, MemFile};
pub use oid::{OidGenerator, RandomOids, SequentialOids};
pub use packer::{Pack, Packer, PackerKind};
pub use print::print_archive;
pub use query::{Query, StridInfo};
pub use strtab::StringTable;
