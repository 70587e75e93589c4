//! Сериализация модели документа в поток архива.
//!
//! Запись идёт один раз, только вперёд: заголовки, таблицы смещений и
//! флаговые слова сначала резервируются нулями, а затем дописываются задним
//! числом, когда реальные значения известны. Все смещения внутри тела
//! записи хранятся относительно корневого объекта.

use byteorder::{LittleEndian, WriteBytesExt};
use carbon_error::{ArchiveError, CarbonResult, StatusCode};
use tracing::{debug, trace};

use super::{
    header::{
        ArchiveHeader, ColumnGroupHeader, ColumnHeader, ObjectHeader, PropHeader, RecordHeader,
    },
    memfile::MemFile,
    oid::OidGenerator,
    packer::Packer,
    strtab::write_string_table,
    tags::{PropFlags, PropKind, RecordFlags, MARKER_OBJECT_END, NUM_PROP_KINDS},
};
use crate::model::{
    ArrayGroup, Column, ColumnGroup, ColumnValues, DocObject, FixedGroup, ScalarType, Sid, Values,
};

/// Строит полный поток архива: заголовок, таблицу строк, заголовок записи
/// и дерево объектов начиная с `model`.
pub fn serialize(
    model: &DocObject,
    strings: &[&str],
    sids: &[Sid],
    packer: &mut Packer,
    oids: &mut dyn OidGenerator,
    flags: RecordFlags,
) -> CarbonResult<MemFile> {
    let mut out = MemFile::with_capacity(4096);

    out.reserve(ArchiveHeader::SIZE)?;
    write_string_table(&mut out, packer, strings, sids)?;
    debug!(end = out.tell(), "string table done");

    let record_pos = out.reserve(RecordHeader::SIZE)?;
    let root = out.tell();
    out.patch(0, |out| ArchiveHeader::new(root).write(out))?;

    {
        let mut writer = ObjectWriter {
            out: &mut out,
            oids,
            root,
        };
        writer.serialize_object(model)?;
    }

    let record_size = out.tell() - root;
    let header = RecordHeader {
        flags: flags.bits(),
        record_size,
    };
    out.patch(record_pos, |out| header.write(out))?;
    out.shrink();

    debug!(root, record_size, total = out.len(), "record serialized");
    Ok(out)
}

/// Флаговое слово: по биту на каждый непустой вид групп.
pub fn prop_flags(obj: &DocObject) -> PropFlags {
    let mut flags = PropFlags::empty();
    for (t, g) in &obj.fixed {
        if !g.keys.is_empty() {
            flags.set(PropKind::Fixed(*t));
        }
    }
    if !obj.objects.is_empty() {
        flags.set(PropKind::Object);
    }
    for (t, g) in &obj.arrays {
        if !g.keys.is_empty() {
            flags.set(PropKind::Array(*t));
        }
    }
    if !obj.object_arrays.is_empty() {
        flags.set(PropKind::ObjectArray);
    }
    flags
}

/// Записывает значения подряд, без длины. `Null` не занимает байт.
pub fn write_values(
    out: &mut MemFile,
    values: &Values,
) -> CarbonResult<()> {
    match values {
        Values::Null(_) => {}
        Values::Bool(v) | Values::UInt8(v) => std::io::Write::write_all(out, v)?,
        Values::Int8(v) => {
            for x in v {
                out.write_i8(*x)?;
            }
        }
        Values::Int16(v) => {
            for x in v {
                out.write_i16::<LittleEndian>(*x)?;
            }
        }
        Values::Int32(v) => {
            for x in v {
                out.write_i32::<LittleEndian>(*x)?;
            }
        }
        Values::Int64(v) => {
            for x in v {
                out.write_i64::<LittleEndian>(*x)?;
            }
        }
        Values::UInt16(v) => {
            for x in v {
                out.write_u16::<LittleEndian>(*x)?;
            }
        }
        Values::UInt32(v) => {
            for x in v {
                out.write_u32::<LittleEndian>(*x)?;
            }
        }
        Values::UInt64(v) | Values::String(v) => {
            for x in v {
                out.write_u64::<LittleEndian>(*x)?;
            }
        }
        Values::Float(v) => {
            for x in v {
                out.write_f32::<LittleEndian>(*x)?;
            }
        }
    }
    Ok(())
}

/// Счётчик формата: не больше `u32::MAX`.
pub(crate) fn count32(
    n: usize,
    what: &str,
) -> CarbonResult<u32> {
    match u32::try_from(n) {
        Ok(v) => Ok(v),
        Err(_) => carbon_error::bail!(StatusCode::SizeLimit, "{} has {} entries", what, n),
    }
}

fn type_mismatch(
    what: &str,
    expected: impl std::fmt::Debug,
    got: impl std::fmt::Debug,
) -> carbon_error::StackError {
    ArchiveError::TypeMismatch {
        what: what.to_string(),
        expected: format!("{expected:?}"),
        got: format!("{got:?}"),
    }
    .into()
}

fn size_mismatch(
    what: &str,
    expected: usize,
    got: usize,
) -> carbon_error::StackError {
    ArchiveError::SizeMismatch {
        what: what.to_string(),
        expected: expected as u64,
        got: got as u64,
    }
    .into()
}

struct ObjectWriter<'a> {
    out: &'a mut MemFile,
    oids: &'a mut dyn OidGenerator,
    root: u64,
}

impl ObjectWriter<'_> {
    /// Смещение курсора относительно корня записи.
    fn rel(&self) -> u64 {
        self.out.tell() - self.root
    }

    fn write_sids(
        &mut self,
        sids: &[Sid],
    ) -> CarbonResult<()> {
        for sid in sids {
            self.out.write_u64::<LittleEndian>(*sid)?;
        }
        Ok(())
    }

    /// Записывает объект и возвращает его относительное смещение и
    /// абсолютную позицию слота «next».
    fn serialize_object(
        &mut self,
        obj: &DocObject,
    ) -> CarbonResult<(u64, u64)> {
        let start = self.out.tell();
        let flags = prop_flags(obj);
        let full = ObjectHeader::full_size(flags) as u64;
        self.out.reserve(full as usize)?;
        let next_slot = start + full - 8;

        let mut offsets = [0u64; NUM_PROP_KINDS];
        for kind in flags.iter() {
            offsets[kind.index()] = self.rel();
            self.write_group(kind, obj)?;
        }
        self.out.write_u8(MARKER_OBJECT_END)?;

        let oid = self.oids.next_oid()?;
        let header = ObjectHeader { oid, flags };
        self.out.patch(start, |out| {
            header.write(out)?;
            for kind in flags.iter() {
                out.write_u64::<LittleEndian>(offsets[kind.index()])?;
            }
            Ok(())
        })?;

        trace!(
            oid,
            offset = start - self.root,
            groups = flags.count(),
            "object serialized"
        );
        Ok((start - self.root, next_slot))
    }

    fn write_group(
        &mut self,
        kind: PropKind,
        obj: &DocObject,
    ) -> CarbonResult<()> {
        match kind {
            PropKind::Fixed(t) => match obj.fixed.get(&t) {
                Some(g) => self.write_fixed(t, g),
                None => Ok(()),
            },
            PropKind::Array(t) => match obj.arrays.get(&t) {
                Some(g) => self.write_array(t, g),
                None => Ok(()),
            },
            PropKind::Object => self.write_objects(&obj.objects),
            PropKind::ObjectArray => self.write_object_arrays(&obj.object_arrays),
        }
    }

    fn write_fixed(
        &mut self,
        t: ScalarType,
        group: &FixedGroup,
    ) -> CarbonResult<()> {
        if group.values.scalar_type() != t {
            return Err(type_mismatch("fixed group", t, group.values.scalar_type()));
        }
        if group.values.len() != group.keys.len() {
            return Err(size_mismatch(
                "fixed group values",
                group.keys.len(),
                group.values.len(),
            ));
        }

        PropHeader {
            kind: PropKind::Fixed(t),
            num_entries: count32(group.keys.len(), "fixed group")?,
        }
        .write(self.out)?;
        self.write_sids(&group.keys)?;
        write_values(self.out, &group.values)
    }

    fn write_array(
        &mut self,
        t: ScalarType,
        group: &ArrayGroup,
    ) -> CarbonResult<()> {
        if group.values.len() != group.keys.len() {
            return Err(size_mismatch(
                "array group values",
                group.keys.len(),
                group.values.len(),
            ));
        }
        if let Some(bad) = group.values.iter().find(|v| v.scalar_type() != t) {
            return Err(type_mismatch("array value", t, bad.scalar_type()));
        }

        PropHeader {
            kind: PropKind::Array(t),
            num_entries: count32(group.keys.len(), "array group")?,
        }
        .write(self.out)?;
        self.write_sids(&group.keys)?;
        for v in &group.values {
            let len = count32(v.len(), "array value")?;
            self.out.write_u32::<LittleEndian>(len)?;
        }
        for v in &group.values {
            write_values(self.out, v)?;
        }
        Ok(())
    }

    fn write_objects(
        &mut self,
        objects: &[(Sid, DocObject)],
    ) -> CarbonResult<()> {
        PropHeader {
            kind: PropKind::Object,
            num_entries: count32(objects.len(), "object group")?,
        }
        .write(self.out)?;
        let keys: Vec<Sid> = objects.iter().map(|(k, _)| *k).collect();
        self.write_sids(&keys)?;

        let column = self.out.reserve(8 * objects.len())?;
        let mut offsets = Vec::with_capacity(objects.len());
        for (_, obj) in objects {
            let (rel, _) = self.serialize_object(obj)?;
            offsets.push(rel);
        }
        self.out.patch_u64_column(column, &offsets)
    }

    fn write_object_arrays(
        &mut self,
        groups: &[ColumnGroup],
    ) -> CarbonResult<()> {
        PropHeader {
            kind: PropKind::ObjectArray,
            num_entries: count32(groups.len(), "object array group")?,
        }
        .write(self.out)?;
        let keys: Vec<Sid> = groups.iter().map(|g| g.key).collect();
        self.write_sids(&keys)?;

        let column = self.out.reserve(8 * groups.len())?;
        let mut offsets = Vec::with_capacity(groups.len());
        for group in groups {
            offsets.push(self.rel());
            self.write_column_group(group)?;
        }
        self.out.patch_u64_column(column, &offsets)
    }

    fn write_column_group(
        &mut self,
        group: &ColumnGroup,
    ) -> CarbonResult<()> {
        ColumnGroupHeader {
            num_columns: count32(group.columns.len(), "column group")?,
            num_objects: group.num_objects,
        }
        .write(self.out)?;

        // По свежему OID на каждую позицию строки.
        for _ in 0..group.num_objects {
            let oid = self.oids.next_oid()?;
            self.out.write_u64::<LittleEndian>(oid)?;
        }

        let column_offsets_pos = self.out.reserve(8 * group.columns.len())?;
        let mut offsets = Vec::with_capacity(group.columns.len());
        for column in &group.columns {
            offsets.push(self.rel());
            self.write_column(column, group.num_objects)?;
        }
        self.out.patch_u64_column(column_offsets_pos, &offsets)
    }

    fn write_column(
        &mut self,
        column: &Column,
        num_objects: u32,
    ) -> CarbonResult<()> {
        ColumnHeader {
            column_name: column.key,
            value_type: column.value_type,
            num_entries: count32(column.entries.len(), "column")?,
        }
        .write(self.out)?;

        let entry_offsets_pos = self.out.reserve(8 * column.entries.len())?;
        for entry in &column.entries {
            if entry.position >= num_objects {
                return Err(ArchiveError::corrupted(format!(
                    "column entry position {} outside of {} rows",
                    entry.position, num_objects
                ))
                .into());
            }
            self.out.write_u32::<LittleEndian>(entry.position)?;
        }

        let mut offsets = Vec::with_capacity(column.entries.len());
        for entry in &column.entries {
            if entry.values.column_type() != column.value_type {
                return Err(type_mismatch(
                    "column entry",
                    column.value_type,
                    entry.values.column_type(),
                ));
            }
            offsets.push(self.rel());
            let count = count32(entry.values.len(), "column entry")?;
            self.out.write_u32::<LittleEndian>(count)?;

            match &entry.values {
                ColumnValues::Scalars(values) => write_values(self.out, values)?,
                ColumnValues::Objects(objects) => {
                    // Объекты одной записи колонки связаны через слот «next».
                    let mut prev_next: Option<u64> = None;
                    for obj in objects {
                        let (rel, next_slot) = self.serialize_object(obj)?;
                        if let Some(slot) = prev_next {
                            self.out.patch_u64(slot, rel)?;
                        }
                        prev_next = Some(next_slot);
                    }
                }
            }
        }
        self.out.patch_u64_column(entry_offsets_pos, &offsets)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::{
            memfile::ByteReader,
            oid::SequentialOids,
            packer::PackerKind,
            strtab::StringTable,
        },
        model::{ColumnEntry, ColumnType, Scalar},
    };

    fn encode(model: &DocObject) -> CarbonResult<Vec<u8>> {
        let strings = ["k", "arr"];
        let mut packer = Packer::new(PackerKind::None);
        let out = serialize(
            model,
            &strings,
            &[1, 2],
            &mut packer,
            &mut SequentialOids::default(),
            RecordFlags::empty(),
        )?;
        Ok(out.into_inner())
    }

    /// Тест проверяет заголовок корня для `{k: 7u8, arr: [1,2,3]}`: ровно два
    /// установленных бита и две записи в таблице смещений.
    #[test]
    fn test_root_header_layout() {
        let mut model = DocObject::new();
        model.push_fixed(1, Scalar::UInt8(7));
        model.push_array(2, Values::UInt8(vec![1, 2, 3]));
        let data = encode(&model).unwrap();

        let header = ArchiveHeader::read(&mut ByteReader::new(&data)).unwrap();
        let root = header.root_object_header_offset;
        let table = StringTable::read(&data, ArchiveHeader::SIZE as u64).unwrap();
        assert_eq!(table.end + RecordHeader::SIZE as u64, root);

        let mut r = ByteReader::at(&data, root).unwrap();
        let obj = ObjectHeader::read(&mut r).unwrap();
        assert_eq!(obj.flags.count(), 2);
        let first = r.read_u64().unwrap();
        let second = r.read_u64().unwrap();
        let next = r.read_u64().unwrap();
        assert_eq!(next, 0);

        // Первая группа начинается сразу после заголовка объекта.
        assert_eq!(first, ObjectHeader::full_size(obj.flags) as u64);
        assert_eq!(data[(root + first) as usize], b'r');
        assert_eq!(data[(root + second) as usize], b'R');
        assert_eq!(*data.last().unwrap(), MARKER_OBJECT_END);

        let mut rh = ByteReader::at(&data, root - RecordHeader::SIZE as u64).unwrap();
        let record = RecordHeader::read(&mut rh).unwrap();
        assert_eq!(record.record_size, data.len() as u64 - root);
    }

    #[test]
    fn test_empty_object() {
        let data = encode(&DocObject::new()).unwrap();
        let header = ArchiveHeader::read(&mut ByteReader::new(&data)).unwrap();
        let root = header.root_object_header_offset as usize;
        assert_eq!(data.len() - root, ObjectHeader::full_size(PropFlags::empty()) + 1);
    }

    #[test]
    fn test_rejects_inconsistent_model() {
        let mut model = DocObject::new();
        model.fixed.insert(
            ScalarType::Int8,
            FixedGroup {
                keys: vec![1, 2],
                values: Values::Int8(vec![1]),
            },
        );
        let err = encode(&model).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SizeMismatch);

        let mut model = DocObject::new();
        model.arrays.insert(
            ScalarType::Int8,
            ArrayGroup {
                keys: vec![1],
                values: vec![Values::UInt8(vec![1])],
            },
        );
        let err = encode(&model).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TypeError);
    }

    /// Тест проверяет, что счётчики больше `u32::MAX` отклоняются, а не
    /// усекаются.
    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_count32_rejects_overflow() {
        assert_eq!(count32(u32::MAX as usize, "entries").unwrap(), u32::MAX);
        let err = count32(u32::MAX as usize + 1, "entries").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SizeLimit);
    }

    #[test]
    fn test_rejects_column_position_out_of_range() {
        let mut model = DocObject::new();
        model.push_object_array(ColumnGroup {
            key: 1,
            num_objects: 1,
            columns: vec![Column {
                key: 2,
                value_type: ColumnType::Scalar(ScalarType::UInt8),
                entries: vec![ColumnEntry {
                    position: 1,
                    values: ColumnValues::Scalars(Values::UInt8(vec![3])),
                }],
            }],
        });
        let err = encode(&model).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CorruptedData);
    }

    #[test]
    fn test_column_entry_type_must_match_column() {
        let mut model = DocObject::new();
        model.push_object_array(ColumnGroup {
            key: 1,
            num_objects: 1,
            columns: vec![Column {
                key: 2,
                value_type: ColumnType::Object,
                entries: vec![ColumnEntry {
                    position: 0,
                    values: ColumnValues::Scalars(Values::UInt8(vec![3])),
                }],
            }],
        });
        let err = encode(&model).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TypeError);
    }
}
