//! Сборка архива из модели или JSON, запекание индекса и файловый ввод-вывод.

use std::{
    borrow::Cow,
    fs,
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use carbon_error::{context, ArchiveError, CarbonResult, ResultExt};
use rustc_hash::FxHashMap;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{
    encode::serialize,
    header::ArchiveHeader,
    index::SidIndex,
    memfile::{ByteReader, MemFile},
    oid::{OidGenerator, RandomOids},
    packer::{Packer, PackerKind},
    strtab::StringTable,
    tags::RecordFlags,
};
use crate::model::{object_from_json_str, DocObject, Sid, StringDict};

/// Параметры сборки архива.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub compressor: PackerKind,
    /// Дописать индекс SID → смещение в конец архива.
    pub bake_index: bool,
    /// Отсортировать ключи групп по строковому значению.
    pub read_optimized: bool,
    /// Каталог для временного файла при запекании индекса.
    pub tmp_dir: Option<PathBuf>,
}

/// Строит архив из модели. Таблица строк берётся из словаря целиком.
pub fn archive_from_model(
    model: &DocObject,
    dict: &dyn StringDict,
    options: &ArchiveOptions,
    oids: &mut dyn OidGenerator,
) -> CarbonResult<MemFile> {
    let (strings, sids) = dict.contents();
    let refs: Vec<&str> = strings.iter().map(String::as_str).collect();

    let mut flags = RecordFlags::empty();
    let model = if options.read_optimized {
        let lookup: FxHashMap<Sid, &str> = sids.iter().copied().zip(refs.iter().copied()).collect();
        let key_of = |sid: Sid| lookup.get(&sid).map(|s| s.to_string()).unwrap_or_default();
        let mut sorted = model.clone();
        sorted
            .sort_props(&key_of)
            .context("sort keys for read-optimized layout")?;
        flags |= RecordFlags::SORTED;
        Cow::Owned(sorted)
    } else {
        Cow::Borrowed(model)
    };

    let mut packer = Packer::new(options.compressor);
    let mut out = serialize(&model, &refs, &sids, &mut packer, oids, flags)?;
    debug!(
        strings = refs.len(),
        packer = %options.compressor,
        sorted = options.read_optimized,
        "archive body built"
    );

    if options.bake_index {
        bake_index(&mut out, options.tmp_dir.as_deref())?;
    }

    info!(size = out.len(), "archive built");
    Ok(out)
}

/// Разбирает JSON, интернирует все строки в `dict` и строит архив со
/// случайными OID.
pub fn archive_from_json(
    json: &str,
    dict: &mut dyn StringDict,
    options: &ArchiveOptions,
) -> CarbonResult<MemFile> {
    let model = object_from_json_str(json, dict).context("convert JSON document")?;
    archive_from_model(&model, &*dict, options, &mut RandomOids::new())
}

/// Дописывает индекс SID → смещение в конец потока и прописывает его
/// смещение в заголовок архива.
///
/// Поток проходит через временный файл: он перечитывается, индекс строится
/// по его таблице строк и добавляется в конец, затем перезаписывается
/// только заголовок. Содержимое файла заменяет исходный поток; файл
/// удаляется при выходе из функции.
pub fn bake_index(
    stream: &mut MemFile,
    tmp_dir: Option<&Path>,
) -> CarbonResult<()> {
    let mut header = ArchiveHeader::read(&mut ByteReader::new(stream.as_slice()))?;
    if header.string_id_to_offset_index_offset != 0 {
        return Err(ArchiveError::IndexAlreadyPresent.into());
    }

    let mut tmp = match tmp_dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .context("create temporary file")?;
    tmp.write_all(stream.as_slice())?;
    tmp.flush()?;

    let data = fs::read(tmp.path()).context("reload temporary file")?;
    let table = StringTable::read(&data, ArchiveHeader::SIZE as u64)?;
    let index = SidIndex::build(&table);

    let mut trailer = MemFile::with_capacity(index.size() as usize);
    index.serialize(&mut trailer)?;
    header.string_id_to_offset_index_offset = data.len() as u64;
    tmp.seek(SeekFrom::End(0))?;
    tmp.write_all(trailer.as_slice())?;

    let mut head = MemFile::with_capacity(ArchiveHeader::SIZE);
    header.write(&mut head)?;
    tmp.seek(SeekFrom::Start(0))?;
    tmp.write_all(head.as_slice())?;
    tmp.flush()?;

    *stream = MemFile::from_vec(fs::read(tmp.path()).context("reload temporary file")?);
    info!(
        entries = index.len(),
        offset = header.string_id_to_offset_index_offset,
        "string id index baked"
    );
    Ok(())
}

/// Записывает поток в файл целиком.
pub fn write_archive(
    path: impl AsRef<Path>,
    stream: &MemFile,
) -> CarbonResult<()> {
    let path = path.as_ref();
    context!(
        fs::write(path, stream.as_slice()),
        "write archive {}",
        path.display()
    )?;
    debug!(path = %path.display(), size = stream.len(), "archive written");
    Ok(())
}

/// Читает файл в поток целиком.
pub fn load_archive(path: impl AsRef<Path>) -> CarbonResult<MemFile> {
    let path = path.as_ref();
    let data = context!(fs::read(path), "load archive {}", path.display())?;
    Ok(MemFile::from_vec(data))
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
