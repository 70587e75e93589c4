//! Открытый архив: проверенные заголовки, таблица строк, сводка, ленивый
//! индекс и кэш строк.

use std::{
    io::Write,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use carbon_error::{ArchiveError, CarbonResult, ResultExt};
use lru::LruCache;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
    builder::load_archive,
    decode::{decode_record, record_end, ObjectNode},
    header::{ArchiveHeader, RecordHeader},
    index::SidIndex,
    memfile::ByteReader,
    print::print_archive,
    query::Query,
    strtab::StringTable,
    tags::{RecordFlags, MARKER_OBJECT_BEGIN},
};
use crate::model::{DocObject, Sid};

/// Ёмкость кэша строк по умолчанию.
pub const DEFAULT_STRING_CACHE_CAPACITY: usize = 1024;

/// Сводка об открытом архиве.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub string_table_size: u64,
    pub record_size: u64,
    pub num_embedded_strings: u32,
    /// Размер запечённого индекса, 0 — индекса в файле нет.
    pub string_id_index_size: u64,
}

pub struct Archive {
    path: Option<PathBuf>,
    data: Vec<u8>,
    header: ArchiveHeader,
    string_table: StringTable,
    record_header: RecordHeader,
    info: ArchiveInfo,
    index: OnceCell<SidIndex>,
    string_cache: Mutex<LruCache<Sid, String>>,
}

impl std::fmt::Debug for Archive {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("size", &self.data.len())
            .field("info", &self.info)
            .finish()
    }
}

fn cache(capacity: usize) -> Mutex<LruCache<Sid, String>> {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(capacity))
}

impl Archive {
    /// Открывает архив из файла.
    pub fn open(path: impl AsRef<Path>) -> CarbonResult<Self> {
        let path = path.as_ref();
        let stream = load_archive(path)?;
        let mut archive = Self::from_stream(stream.into_inner())
            .with_context(|| format!("open archive {}", path.display()))?;
        archive.path = Some(path.to_path_buf());
        Ok(archive)
    }

    /// Открывает архив из готового потока.
    ///
    /// Проверяются заголовок, таблица строк, заголовок записи по сохранённому
    /// смещению корня и маркер корневого объекта. Дерево объектов не
    /// разбирается до вызова [`Archive::root`].
    pub fn from_stream(data: Vec<u8>) -> CarbonResult<Self> {
        let header =
            ArchiveHeader::read(&mut ByteReader::new(&data)).context("read archive header")?;
        let string_table =
            StringTable::read(&data, ArchiveHeader::SIZE as u64).context("read string table")?;

        let root = header.root_object_header_offset;
        let record_pos = string_table.end;
        if record_pos + RecordHeader::SIZE as u64 != root {
            return Err(ArchiveError::OffsetMismatch {
                what: "root object".to_string(),
                stored: root,
                actual: record_pos + RecordHeader::SIZE as u64,
            }
            .into());
        }
        let record_header = RecordHeader::read(&mut ByteReader::at(&data, record_pos)?)
            .context("read record header")?;
        record_end(&data, root, record_header.record_size)?;

        let mut r = ByteReader::at(&data, root)?;
        r.expect_marker(MARKER_OBJECT_BEGIN, "root object")?;

        let index = match header.string_id_to_offset_index_offset {
            0 => OnceCell::new(),
            offset => {
                let mut r = ByteReader::at(&data, offset)?;
                OnceCell::with_value(SidIndex::deserialize(&mut r).context("read string id index")?)
            }
        };

        let info = ArchiveInfo {
            string_table_size: string_table.size(),
            record_size: record_header.record_size,
            num_embedded_strings: string_table.header.num_entries,
            string_id_index_size: index.get().map_or(0, SidIndex::size),
        };
        info!(
            size = data.len(),
            strings = info.num_embedded_strings,
            indexed = info.string_id_index_size != 0,
            "archive opened"
        );

        Ok(Self {
            path: None,
            data,
            header,
            string_table,
            record_header,
            info,
            index,
            string_cache: cache(DEFAULT_STRING_CACHE_CAPACITY),
        })
    }

    /// Меняет ёмкость кэша строк (кэш очищается).
    pub fn with_cache_capacity(
        mut self,
        capacity: usize,
    ) -> Self {
        self.string_cache = cache(capacity);
        self
    }

    /// Закрывает архив, освобождая индекс, кэш и байты записи.
    pub fn close(self) {
        debug!(path = ?self.path, "archive closed");
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn record_header(&self) -> &RecordHeader {
        &self.record_header
    }

    pub fn string_table(&self) -> &StringTable {
        &self.string_table
    }

    pub fn info(&self) -> ArchiveInfo {
        self.info
    }

    /// Ключи групп отсортированы по строковому значению.
    pub fn is_sorted(&self) -> bool {
        RecordFlags::from_bits_truncate(self.record_header.flags).contains(RecordFlags::SORTED)
    }

    /// Запечён ли в файл индекс SID → смещение.
    pub fn has_query_index_string_id_to_offset(&self) -> bool {
        self.header.string_id_to_offset_index_offset != 0
    }

    /// Индекс SID → смещение: запечённый либо построенный при первом
    /// обращении.
    pub fn index(&self) -> &SidIndex {
        self.index.get_or_init(|| {
            debug!(entries = self.string_table.len(), "building string id index");
            SidIndex::build(&self.string_table)
        })
    }

    pub(crate) fn string_cache(&self) -> &Mutex<LruCache<Sid, String>> {
        &self.string_cache
    }

    /// Контекст запросов по умолчанию.
    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Разбирает дерево объектов записи.
    pub fn root(&self) -> CarbonResult<ObjectNode> {
        let root = self.header.root_object_header_offset;
        let end = record_end(&self.data, root, self.record_header.record_size)?;
        decode_record(&self.data[..end as usize], root).context("decode record")
    }

    /// Восстанавливает модель документа.
    pub fn to_model(&self) -> CarbonResult<DocObject> {
        Ok(self.root()?.to_model())
    }

    /// Печатает структурный дамп архива.
    pub fn print(
        &self,
        w: &mut dyn Write,
    ) -> CarbonResult<()> {
        print_archive(w, &self.data)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use carbon_error::StatusCode;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        archive::builder::{archive_from_json, write_archive, ArchiveOptions},
        model::SyncStringDict,
    };

    fn build(bake: bool) -> Vec<u8> {
        let mut dict = SyncStringDict::new();
        let options = ArchiveOptions {
            bake_index: bake,
            ..ArchiveOptions::default()
        };
        archive_from_json(r#"{"a": 1, "b": {"c": [1.5, null]}}"#, &mut dict, &options)
            .unwrap()
            .into_inner()
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_archive_is_send_sync() {
        assert_send_sync::<Archive>();
    }

    #[test]
    fn test_info() {
        let data = build(false);
        let archive = Archive::from_stream(data.clone()).unwrap();
        let info = archive.info();
        assert_eq!(info.num_embedded_strings, 3);
        assert_eq!(info.string_id_index_size, 0);
        assert_eq!(
            ArchiveHeader::SIZE as u64 + info.string_table_size + RecordHeader::SIZE as u64
                + info.record_size,
            data.len() as u64
        );
        assert!(!archive.has_query_index_string_id_to_offset());
        assert!(!archive.is_sorted());
    }

    /// Тест проверяет, что запечённый индекс загружается при открытии.
    #[test]
    fn test_open_baked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("baked.carbon");
        let data = build(true);
        write_archive(&path, &crate::archive::memfile::MemFile::from_vec(data)).unwrap();

        let archive = Archive::open(&path).unwrap();
        assert!(archive.has_query_index_string_id_to_offset());
        assert!(archive.info().string_id_index_size > 0);
        assert_eq!(archive.index().len(), 3);
        assert_eq!(archive.path(), Some(path.as_path()));
        archive.close();
    }

    #[test]
    fn test_lazy_index_matches_table() {
        let archive = Archive::from_stream(build(false)).unwrap();
        let index = archive.index();
        for entry in &archive.string_table().entries {
            assert_eq!(index.lookup(entry.header.string_id), Some(entry.offset));
        }
    }

    #[test]
    fn test_to_model_and_print() {
        let archive = Archive::from_stream(build(false)).unwrap();
        let model = archive.to_model().unwrap();
        assert_eq!(model.objects.len(), 1);

        let mut out = Vec::new();
        archive.print(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("[marker: o]"));
    }

    #[test]
    fn test_rejects_root_without_object_marker() {
        let mut data = build(false);
        let root = Archive::from_stream(data.clone())
            .unwrap()
            .header()
            .root_object_header_offset as usize;
        data[root] = b'!';
        let err = Archive::from_stream(data).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CorruptedData);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let err = Archive::open(dir.path().join("nope.carbon")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotFound);
    }

    #[test]
    fn test_small_cache_capacity() {
        let archive = Archive::from_stream(build(false)).unwrap().with_cache_capacity(0);
        let query = archive.query();
        for sid in 1..=3 {
            assert!(query.fetch_string_by_id(sid).unwrap().is_some());
        }
        assert_eq!(archive.string_cache().lock().len(), 1);
    }
}
