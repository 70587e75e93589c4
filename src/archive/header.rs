//! Заголовки фиксированного размера.
//!
//! Все целые пишутся в little-endian. Каждый заголовок умеет записать себя в
//! [`MemFile`] и прочитать себя из [`ByteReader`], проверяя маркер.

use byteorder::{LittleEndian, WriteBytesExt};
use carbon_error::{ArchiveError, CarbonResult};

use super::{
    memfile::{ByteReader, MemFile},
    tags::{
        FormatVersion, PropFlags, PropKind, FILE_MAGIC, FORMAT_VERSION, MARKER_COLUMN,
        MARKER_COLUMN_GROUP, MARKER_OBJECT_BEGIN, MARKER_RECORD_HEADER, MARKER_STRING_ENTRY,
        MARKER_STRING_TABLE,
    },
};
use crate::model::{ColumnType, Oid, Sid};

/// Заголовок файла (смещение 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub version: u8,
    /// Абсолютное смещение корневого объекта, не ноль.
    pub root_object_header_offset: u64,
    /// Абсолютное смещение индекса SID → смещение, 0 — индекса нет.
    pub string_id_to_offset_index_offset: u64,
}

impl ArchiveHeader {
    pub const SIZE: usize = 6 + 1 + 8 + 8;

    pub fn new(root_object_header_offset: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            root_object_header_offset,
            string_id_to_offset_index_offset: 0,
        }
    }

    pub fn write(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        std::io::Write::write_all(out, FILE_MAGIC)?;
        out.write_u8(self.version)?;
        out.write_u64::<LittleEndian>(self.root_object_header_offset)?;
        out.write_u64::<LittleEndian>(self.string_id_to_offset_index_offset)?;
        Ok(())
    }

    /// Читает и проверяет заголовок: magic, версию и ненулевой корень.
    pub fn read(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        let magic = r.bytes(FILE_MAGIC.len(), "archive magic")?;
        if magic != FILE_MAGIC {
            return Err(ArchiveError::InvalidMagic {
                got: magic.to_vec(),
            }
            .into());
        }
        let version = FormatVersion::try_from(r.read_u8()?)? as u8;
        let root_object_header_offset = r.read_u64()?;
        let string_id_to_offset_index_offset = r.read_u64()?;
        if root_object_header_offset == 0 {
            return Err(ArchiveError::MissingRoot.into());
        }
        Ok(Self {
            version,
            root_object_header_offset,
            string_id_to_offset_index_offset,
        })
    }
}

/// Заголовок таблицы строк; за ним ровно `compressor_extra_size` байт
/// данных упаковщика.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringTableHeader {
    pub flags: u8,
    pub num_entries: u32,
    pub first_entry: u64,
    pub compressor_extra_size: u64,
}

impl StringTableHeader {
    pub const SIZE: usize = 1 + 1 + 4 + 8 + 8;

    pub fn write(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        out.write_u8(MARKER_STRING_TABLE)?;
        out.write_u8(self.flags)?;
        out.write_u32::<LittleEndian>(self.num_entries)?;
        out.write_u64::<LittleEndian>(self.first_entry)?;
        out.write_u64::<LittleEndian>(self.compressor_extra_size)?;
        Ok(())
    }

    pub fn read(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        r.expect_marker(MARKER_STRING_TABLE, "string table header")?;
        Ok(Self {
            flags: r.read_u8()?,
            num_entries: r.read_u32()?,
            first_entry: r.read_u64()?,
            compressor_extra_size: r.read_u64()?,
        })
    }
}

/// Заголовок записи таблицы строк; за ним упакованные байты строки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringEntryHeader {
    /// Абсолютное смещение следующей записи, 0 — последняя.
    pub next_entry_off: u64,
    pub string_id: Sid,
    /// Длина строки до упаковки.
    pub string_len: u32,
}

impl StringEntryHeader {
    pub const SIZE: usize = 1 + 8 + 8 + 4;

    pub fn write(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        out.write_u8(MARKER_STRING_ENTRY)?;
        out.write_u64::<LittleEndian>(self.next_entry_off)?;
        out.write_u64::<LittleEndian>(self.string_id)?;
        out.write_u32::<LittleEndian>(self.string_len)?;
        Ok(())
    }

    pub fn read(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        r.expect_marker(MARKER_STRING_ENTRY, "string entry header")?;
        Ok(Self {
            next_entry_off: r.read_u64()?,
            string_id: r.read_u64()?,
            string_len: r.read_u32()?,
        })
    }
}

/// Заголовок записи (тела документа).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub flags: u8,
    /// Размер тела, следующего за заголовком.
    pub record_size: u64,
}

impl RecordHeader {
    pub const SIZE: usize = 1 + 1 + 8;

    pub fn write(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        out.write_u8(MARKER_RECORD_HEADER)?;
        out.write_u8(self.flags)?;
        out.write_u64::<LittleEndian>(self.record_size)?;
        Ok(())
    }

    pub fn read(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        r.expect_marker(MARKER_RECORD_HEADER, "record header")?;
        Ok(Self {
            flags: r.read_u8()?,
            record_size: r.read_u64()?,
        })
    }
}

/// Фиксированная часть заголовка объекта. За ней следуют разреженная
/// таблица смещений (по одному `u64` на установленный бит) и слот «next».
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    pub oid: Oid,
    pub flags: PropFlags,
}

impl ObjectHeader {
    pub const SIZE: usize = 1 + 8 + 4;

    /// Полный размер заголовка вместе с таблицей смещений и слотом «next».
    pub fn full_size(flags: PropFlags) -> usize {
        Self::SIZE + 8 * flags.count() + 8
    }

    pub fn write(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        out.write_u8(MARKER_OBJECT_BEGIN)?;
        out.write_u64::<LittleEndian>(self.oid)?;
        out.write_u32::<LittleEndian>(self.flags.bits())?;
        Ok(())
    }

    pub fn read(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        r.expect_marker(MARKER_OBJECT_BEGIN, "object header")?;
        let oid = r.read_u64()?;
        let flags = PropFlags::from_bits(r.read_u32()?)?;
        Ok(Self { oid, flags })
    }
}

/// Заголовок группы свойств: маркер вида и число ключей.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropHeader {
    pub kind: PropKind,
    pub num_entries: u32,
}

impl PropHeader {
    pub const SIZE: usize = 1 + 4;

    pub fn write(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        out.write_u8(self.kind.marker())?;
        out.write_u32::<LittleEndian>(self.num_entries)?;
        Ok(())
    }

    pub fn read(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        let offset = r.pos();
        let marker = r.read_u8()?;
        let kind = PropKind::from_marker(marker).ok_or(ArchiveError::NoSuchType {
            marker,
            offset: Some(offset),
        })?;
        Ok(Self {
            kind,
            num_entries: r.read_u32()?,
        })
    }
}

/// Заголовок группы колонок.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnGroupHeader {
    pub num_columns: u32,
    pub num_objects: u32,
}

impl ColumnGroupHeader {
    pub const SIZE: usize = 1 + 4 + 4;

    pub fn write(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        out.write_u8(MARKER_COLUMN_GROUP)?;
        out.write_u32::<LittleEndian>(self.num_columns)?;
        out.write_u32::<LittleEndian>(self.num_objects)?;
        Ok(())
    }

    pub fn read(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        r.expect_marker(MARKER_COLUMN_GROUP, "column group header")?;
        Ok(Self {
            num_columns: r.read_u32()?,
            num_objects: r.read_u32()?,
        })
    }
}

/// Заголовок колонки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnHeader {
    pub column_name: Sid,
    pub value_type: ColumnType,
    pub num_entries: u32,
}

impl ColumnHeader {
    pub const SIZE: usize = 1 + 8 + 1 + 4;

    pub fn write(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        out.write_u8(MARKER_COLUMN)?;
        out.write_u64::<LittleEndian>(self.column_name)?;
        out.write_u8(self.value_type.marker())?;
        out.write_u32::<LittleEndian>(self.num_entries)?;
        Ok(())
    }

    pub fn read(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        r.expect_marker(MARKER_COLUMN, "column header")?;
        let column_name = r.read_u64()?;
        let offset = r.pos();
        let marker = r.read_u8()?;
        let value_type = ColumnType::from_marker(marker).ok_or(ArchiveError::NoSuchType {
            marker,
            offset: Some(offset),
        })?;
        Ok(Self {
            column_name,
            value_type,
            num_entries: r.read_u32()?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
