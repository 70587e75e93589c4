//! Строгий разбор потока архива в дерево узлов.
//!
//! Обход ведётся по маркерам: заголовок объекта, разреженная таблица
//! смещений, слот «next», затем группы свойств до маркера `}`. Любое
//! расхождение между сохранённым и фактическим положением структуры
//! считается повреждением.

use carbon_error::{ArchiveError, CarbonResult, ResultExt, StackError};
use tracing::{debug, trace};

use super::{
    header::{
        ArchiveHeader, ColumnGroupHeader, ColumnHeader, ObjectHeader, PropHeader, RecordHeader,
    },
    index::SidIndex,
    memfile::ByteReader,
    strtab::StringTable,
    tags::{PropFlags, PropKind, MARKER_OBJECT_END},
};
use crate::model::{
    ArrayGroup, Column, ColumnEntry, ColumnGroup, ColumnType, ColumnValues, DocObject,
    FixedGroup, Oid, ScalarType, Sid, Values,
};

/// Предельная глубина вложенности объектов.
pub const MAX_DEPTH: usize = 512;

/// Минимальный размер объекта в потоке: заголовок без групп и `}`.
const MIN_OBJECT_SIZE: u64 = (ObjectHeader::SIZE + 8 + 1) as u64;

/// Разобранный объект.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    /// Абсолютное смещение маркера `{`.
    pub offset: u64,
    pub oid: Oid,
    pub flags: PropFlags,
    /// Относительные смещения групп, по одному на установленный бит.
    pub prop_offsets: Vec<u64>,
    /// Относительное смещение следующего объекта цепочки, 0 — нет.
    pub next: u64,
    pub props: Vec<PropNode>,
    /// Абсолютное смещение первого байта после `}`.
    pub end_offset: u64,
}

/// Разобранная группа свойств.
#[derive(Debug, Clone, PartialEq)]
pub struct PropNode {
    pub offset: u64,
    pub kind: PropKind,
    pub keys: Vec<Sid>,
    pub body: PropBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropBody {
    Fixed(Values),
    Array(Vec<Values>),
    Objects {
        offsets: Vec<u64>,
        objects: Vec<ObjectNode>,
    },
    ObjectArray {
        group_offsets: Vec<u64>,
        groups: Vec<ColumnGroupNode>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGroupNode {
    pub offset: u64,
    pub oids: Vec<Oid>,
    pub column_offsets: Vec<u64>,
    pub columns: Vec<ColumnNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnNode {
    pub offset: u64,
    pub name: Sid,
    pub value_type: ColumnType,
    pub entry_offsets: Vec<u64>,
    pub positions: Vec<u32>,
    pub entries: Vec<ColumnEntryNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEntryNode {
    pub offset: u64,
    pub position: u32,
    pub values: ColumnEntryBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnEntryBody {
    Scalars(Values),
    Objects(Vec<ObjectNode>),
}

/// Полностью разобранный архив.
#[derive(Debug, Clone)]
pub struct DecodedArchive {
    pub header: ArchiveHeader,
    pub string_table: StringTable,
    pub record_header: RecordHeader,
    pub root: ObjectNode,
    pub index: Option<SidIndex>,
}

/// Разбирает и проверяет весь поток архива.
pub fn read_archive(data: &[u8]) -> CarbonResult<DecodedArchive> {
    let header = ArchiveHeader::read(&mut ByteReader::new(data)).context("read archive header")?;
    let string_table =
        StringTable::read(data, ArchiveHeader::SIZE as u64).context("read string table")?;

    let mut r = ByteReader::at(data, string_table.end)?;
    let record_header = RecordHeader::read(&mut r).context("read record header")?;
    let root = r.pos();
    if root != header.root_object_header_offset {
        return Err(ArchiveError::OffsetMismatch {
            what: "root object".to_string(),
            stored: header.root_object_header_offset,
            actual: root,
        }
        .into());
    }

    let end = record_end(data, root, record_header.record_size)?;
    let root_node = decode_record(&data[..end as usize], root).context("decode record")?;
    if root_node.end_offset != end {
        return Err(ArchiveError::SizeMismatch {
            what: "record".to_string(),
            expected: record_header.record_size,
            got: root_node.end_offset - root,
        }
        .into());
    }

    let index = match header.string_id_to_offset_index_offset {
        0 => None,
        offset => {
            let mut r = ByteReader::at(data, offset)?;
            Some(SidIndex::deserialize(&mut r).context("read string id index")?)
        }
    };

    debug!(
        strings = string_table.len(),
        record_size = record_header.record_size,
        indexed = index.is_some(),
        "archive decoded"
    );
    Ok(DecodedArchive {
        header,
        string_table,
        record_header,
        root: root_node,
        index,
    })
}

/// Абсолютный конец записи, проверенный на выход за поток.
pub fn record_end(
    data: &[u8],
    root: u64,
    record_size: u64,
) -> CarbonResult<u64> {
    match root.checked_add(record_size) {
        Some(end) if end <= data.len() as u64 => Ok(end),
        _ => Err(ArchiveError::UnexpectedEof {
            context: "record body".to_string(),
            offset: Some(root),
            needed: Some(record_size.saturating_sub(data.len() as u64 - root.min(data.len() as u64))),
        }
        .into()),
    }
}

/// Разбирает дерево объектов, корень которого лежит по абсолютному
/// смещению `root`. Все относительные смещения отсчитываются от него же,
/// поэтому запись можно перенести в другой буфер по любому адресу.
pub fn decode_record(
    data: &[u8],
    root: u64,
) -> CarbonResult<ObjectNode> {
    let decoder = Decoder { data, root };
    let node = decoder.read_object(0, 0)?;
    if node.next != 0 {
        return Err(ArchiveError::corrupted("root object has a successor").into());
    }
    Ok(node)
}

/// Считывает `count` значений типа `t`.
pub fn read_values(
    r: &mut ByteReader<'_>,
    t: ScalarType,
    count: u32,
) -> CarbonResult<Values> {
    r.ensure_available(count as u64 * t.width() as u64, t.name())?;
    let n = count as usize;

    fn collect<T>(
        n: usize,
        mut f: impl FnMut() -> CarbonResult<T>,
    ) -> CarbonResult<Vec<T>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(f()?);
        }
        Ok(out)
    }

    Ok(match t {
        ScalarType::Null => Values::Null(n),
        ScalarType::Bool => Values::Bool(r.bytes(n, "bool values")?.to_vec()),
        ScalarType::UInt8 => Values::UInt8(r.bytes(n, "u8 values")?.to_vec()),
        ScalarType::Int8 => Values::Int8(collect(n, || r.read_i8())?),
        ScalarType::Int16 => Values::Int16(collect(n, || r.read_i16())?),
        ScalarType::Int32 => Values::Int32(collect(n, || r.read_i32())?),
        ScalarType::Int64 => Values::Int64(collect(n, || r.read_i64())?),
        ScalarType::UInt16 => Values::UInt16(collect(n, || r.read_u16())?),
        ScalarType::UInt32 => Values::UInt32(collect(n, || r.read_u32())?),
        ScalarType::UInt64 => Values::UInt64(collect(n, || r.read_u64())?),
        ScalarType::Float => Values::Float(collect(n, || r.read_f32())?),
        ScalarType::String => Values::String(collect(n, || r.read_u64())?),
    })
}

fn read_u64_column(
    r: &mut ByteReader<'_>,
    n: u32,
    what: &str,
) -> CarbonResult<Vec<u64>> {
    r.ensure_available(8 * n as u64, what)?;
    (0..n).map(|_| r.read_u64()).collect()
}

fn read_u32_column(
    r: &mut ByteReader<'_>,
    n: u32,
    what: &str,
) -> CarbonResult<Vec<u32>> {
    r.ensure_available(4 * n as u64, what)?;
    (0..n).map(|_| r.read_u32()).collect()
}

fn check_offset(
    what: impl Into<String>,
    stored: u64,
    actual: u64,
) -> CarbonResult<()> {
    if stored != actual {
        return Err(ArchiveError::OffsetMismatch {
            what: what.into(),
            stored,
            actual,
        }
        .into());
    }
    Ok(())
}

struct Decoder<'a> {
    data: &'a [u8],
    root: u64,
}

impl Decoder<'_> {
    fn abs(
        &self,
        rel: u64,
    ) -> CarbonResult<u64> {
        self.root.checked_add(rel).ok_or_else(|| {
            StackError::from(ArchiveError::corrupted(format!(
                "relative offset {rel} overflows"
            )))
        })
    }

    fn rel(
        &self,
        r: &ByteReader<'_>,
    ) -> u64 {
        r.pos() - self.root
    }

    fn read_object(
        &self,
        rel: u64,
        depth: usize,
    ) -> CarbonResult<ObjectNode> {
        if depth > MAX_DEPTH {
            return Err(ArchiveError::corrupted(format!(
                "object nesting deeper than {MAX_DEPTH}"
            ))
            .into());
        }

        let offset = self.abs(rel)?;
        let mut r = ByteReader::at(self.data, offset)?;
        let header = ObjectHeader::read(&mut r)?;
        let prop_offsets = read_u64_column(&mut r, header.flags.count() as u32, "offset table")?;
        let next = r.read_u64()?;

        let mut props = Vec::with_capacity(prop_offsets.len());
        let mut seen = PropFlags::empty();
        let mut last: Option<PropKind> = None;

        loop {
            let pos = r.pos();
            match r.peek_u8() {
                None => {
                    return Err(ArchiveError::UnexpectedEof {
                        context: "object body".to_string(),
                        offset: Some(pos),
                        needed: Some(1),
                    }
                    .into())
                }
                Some(MARKER_OBJECT_END) => {
                    r.read_u8()?;
                    break;
                }
                Some(_) => {}
            }

            let prop = self.read_prop(&mut r, depth)?;
            let kind = prop.kind;
            if !header.flags.contains(kind) {
                return Err(ArchiveError::corrupted(format!(
                    "{} group at 0x{pos:x} is not announced in the flag word",
                    kind.name()
                ))
                .into());
            }
            if last.is_some_and(|l| l >= kind) {
                return Err(ArchiveError::corrupted(format!(
                    "{} group at 0x{pos:x} breaks canonical order",
                    kind.name()
                ))
                .into());
            }
            let slot = header.flags.iter().position(|k| k == kind).unwrap_or(0);
            check_offset(
                format!("{} group", kind.name()),
                prop_offsets[slot],
                pos - self.root,
            )?;

            seen.set(kind);
            last = Some(kind);
            props.push(prop);
        }

        if seen != header.flags {
            return Err(ArchiveError::corrupted(format!(
                "object at 0x{offset:x} announces groups it does not contain"
            ))
            .into());
        }

        trace!(oid = header.oid, offset, groups = props.len(), "object decoded");
        Ok(ObjectNode {
            offset,
            oid: header.oid,
            flags: header.flags,
            prop_offsets,
            next,
            props,
            end_offset: r.pos(),
        })
    }

    fn read_prop(
        &self,
        r: &mut ByteReader<'_>,
        depth: usize,
    ) -> CarbonResult<PropNode> {
        let offset = r.pos();
        let header = PropHeader::read(r)?;
        let n = header.num_entries;
        let keys = read_u64_column(r, n, "group keys")?;

        let body = match header.kind {
            PropKind::Fixed(t) => PropBody::Fixed(read_values(r, t, n)?),
            PropKind::Array(t) => {
                let lengths = read_u32_column(r, n, "array lengths")?;
                let mut values = Vec::with_capacity(lengths.len());
                for len in lengths {
                    values.push(read_values(r, t, len)?);
                }
                PropBody::Array(values)
            }
            PropKind::Object => {
                let offsets = read_u64_column(r, n, "object offsets")?;
                r.ensure_available(n as u64 * MIN_OBJECT_SIZE, "nested objects")?;
                let mut objects = Vec::with_capacity(offsets.len());
                for stored in &offsets {
                    check_offset("nested object", *stored, self.rel(r))?;
                    let obj = self.read_object(*stored, depth + 1)?;
                    if obj.next != 0 {
                        return Err(ArchiveError::corrupted(format!(
                            "property object at 0x{:x} has a successor",
                            obj.offset
                        ))
                        .into());
                    }
                    r.seek(obj.end_offset)?;
                    objects.push(obj);
                }
                PropBody::Objects { offsets, objects }
            }
            PropKind::ObjectArray => {
                let group_offsets = read_u64_column(r, n, "column group offsets")?;
                let mut groups = Vec::with_capacity(group_offsets.len());
                for stored in &group_offsets {
                    check_offset("column group", *stored, self.rel(r))?;
                    groups.push(self.read_column_group(r, depth)?);
                }
                PropBody::ObjectArray {
                    group_offsets,
                    groups,
                }
            }
        };

        Ok(PropNode {
            offset,
            kind: header.kind,
            keys,
            body,
        })
    }

    fn read_column_group(
        &self,
        r: &mut ByteReader<'_>,
        depth: usize,
    ) -> CarbonResult<ColumnGroupNode> {
        let offset = r.pos();
        let header = ColumnGroupHeader::read(r)?;
        let oids = read_u64_column(r, header.num_objects, "column group oids")?;
        let column_offsets = read_u64_column(r, header.num_columns, "column offsets")?;

        let mut columns = Vec::with_capacity(column_offsets.len());
        for stored in &column_offsets {
            check_offset("column", *stored, self.rel(r))?;
            columns.push(self.read_column(r, header.num_objects, depth)?);
        }

        Ok(ColumnGroupNode {
            offset,
            oids,
            column_offsets,
            columns,
        })
    }

    fn read_column(
        &self,
        r: &mut ByteReader<'_>,
        num_objects: u32,
        depth: usize,
    ) -> CarbonResult<ColumnNode> {
        let offset = r.pos();
        let header = ColumnHeader::read(r)?;
        let n = header.num_entries;
        let entry_offsets = read_u64_column(r, n, "column entry offsets")?;
        let positions = read_u32_column(r, n, "column positions")?;
        if let Some(bad) = positions.iter().find(|p| **p >= num_objects) {
            return Err(ArchiveError::corrupted(format!(
                "column position {bad} outside of {num_objects} rows"
            ))
            .into());
        }

        let mut entries = Vec::with_capacity(entry_offsets.len());
        for (stored, position) in entry_offsets.iter().zip(&positions) {
            let entry_offset = r.pos();
            check_offset("column entry", *stored, self.rel(r))?;
            let count = r.read_u32()?;
            let values = match header.value_type {
                ColumnType::Scalar(t) => ColumnEntryBody::Scalars(read_values(r, t, count)?),
                ColumnType::Object => {
                    ColumnEntryBody::Objects(self.read_object_chain(r, count, depth)?)
                }
            };
            entries.push(ColumnEntryNode {
                offset: entry_offset,
                position: *position,
                values,
            });
        }

        Ok(ColumnNode {
            offset,
            name: header.column_name,
            value_type: header.value_type,
            entry_offsets,
            positions,
            entries,
        })
    }

    /// Читает `count` объектов, связанных через слот «next».
    fn read_object_chain(
        &self,
        r: &mut ByteReader<'_>,
        count: u32,
        depth: usize,
    ) -> CarbonResult<Vec<ObjectNode>> {
        r.ensure_available(count as u64 * MIN_OBJECT_SIZE, "column objects")?;
        let mut objects: Vec<ObjectNode> = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let rel = self.rel(r);
            if let Some(prev) = objects.last() {
                check_offset("next object", prev.next, rel)?;
            }
            let obj = self.read_object(rel, depth + 1)?;
            r.seek(obj.end_offset)?;
            objects.push(obj);
        }
        if let Some(last) = objects.last() {
            check_offset("last object successor", last.next, 0)?;
        }
        Ok(objects)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Восстановление модели
////////////////////////////////////////////////////////////////////////////////

impl ObjectNode {
    /// Восстанавливает модель документа из разобранного дерева.
    pub fn to_model(&self) -> DocObject {
        let mut obj = DocObject::new();
        for prop in &self.props {
            match (&prop.body, prop.kind) {
                (PropBody::Fixed(values), PropKind::Fixed(t)) => {
                    obj.fixed.insert(
                        t,
                        FixedGroup {
                            keys: prop.keys.clone(),
                            values: values.clone(),
                        },
                    );
                }
                (PropBody::Array(values), PropKind::Array(t)) => {
                    obj.arrays.insert(
                        t,
                        ArrayGroup {
                            keys: prop.keys.clone(),
                            values: values.clone(),
                        },
                    );
                }
                (PropBody::Objects { objects, .. }, _) => {
                    for (key, child) in prop.keys.iter().zip(objects) {
                        obj.push_object(*key, child.to_model());
                    }
                }
                (PropBody::ObjectArray { groups, .. }, _) => {
                    for (key, group) in prop.keys.iter().zip(groups) {
                        obj.push_object_array(group.to_model(*key));
                    }
                }
                _ => {}
            }
        }
        obj
    }

    /// Все OID поддерева, включая строки групп колонок.
    pub fn collect_oids(
        &self,
        out: &mut Vec<Oid>,
    ) {
        out.push(self.oid);
        for prop in &self.props {
            match &prop.body {
                PropBody::Objects { objects, .. } => {
                    objects.iter().for_each(|o| o.collect_oids(out));
                }
                PropBody::ObjectArray { groups, .. } => {
                    for group in groups {
                        out.extend_from_slice(&group.oids);
                        for entry in group.columns.iter().flat_map(|c| &c.entries) {
                            if let ColumnEntryBody::Objects(objs) = &entry.values {
                                objs.iter().for_each(|o| o.collect_oids(out));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

impl ColumnGroupNode {
    fn to_model(
        &self,
        key: Sid,
    ) -> ColumnGroup {
        ColumnGroup {
            key,
            num_objects: self.oids.len() as u32,
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    key: c.name,
                    value_type: c.value_type,
                    entries: c
                        .entries
                        .iter()
                        .map(|e| ColumnEntry {
                            position: e.position,
                            values: match &e.values {
                                ColumnEntryBody::Scalars(v) => ColumnValues::Scalars(v.clone()),
                                ColumnEntryBody::Objects(objs) => ColumnValues::Objects(
                                    objs.iter().map(ObjectNode::to_model).collect(),
                                ),
                            },
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
