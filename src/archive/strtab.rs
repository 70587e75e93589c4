//! Таблица строк: заголовок, служебные данные упаковщика и односвязная
//! цепочка записей.

use carbon_error::{ensure, ArchiveError, CarbonResult};
use tracing::{debug, trace};

use super::{
    encode::count32,
    header::{StringEntryHeader, StringTableHeader},
    memfile::{ByteReader, MemFile},
    packer::{Pack, Packer},
    tags::MARKER_STRING_ENTRY,
};
use crate::model::Sid;

/// Записывает таблицу строк в текущую позицию `out`.
///
/// `strings[i]` хранится под идентификатором `sids[i]`, в порядке входа.
pub fn write_string_table(
    out: &mut MemFile,
    packer: &mut Packer,
    strings: &[&str],
    sids: &[Sid],
) -> CarbonResult<()> {
    ensure!(
        strings.len() == sids.len(),
        ArchiveError::SizeMismatch {
            what: "strings and string ids".to_string(),
            expected: strings.len() as u64,
            got: sids.len() as u64,
        }
    );
    let num_entries = count32(strings.len(), "string table")?;

    let header_pos = out.reserve(StringTableHeader::SIZE)?;

    let extra_start = out.tell();
    packer.write_extra(out, strings)?;
    let compressor_extra_size = out.tell() - extra_start;
    let first_entry = out.tell();

    for (i, (s, sid)) in strings.iter().zip(sids).enumerate() {
        let entry_pos = out.reserve(StringEntryHeader::SIZE)?;
        packer.encode(out, s)?;
        let next_entry_off = if i + 1 < strings.len() {
            out.tell()
        } else {
            0
        };
        let header = StringEntryHeader {
            next_entry_off,
            string_id: *sid,
            string_len: count32(s.len(), "string table entry")?,
        };
        out.patch(entry_pos, |out| header.write(out))?;
    }

    let header = StringTableHeader {
        flags: packer.kind().flags().bits(),
        num_entries,
        first_entry,
        compressor_extra_size,
    };
    out.patch(header_pos, |out| header.write(out))?;

    debug!(
        entries = strings.len(),
        extra = compressor_extra_size,
        packer = %packer.kind(),
        "string table written"
    );
    Ok(())
}

/// Положение одной записи в потоке.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringEntry {
    /// Абсолютное смещение заголовка записи.
    pub offset: u64,
    pub header: StringEntryHeader,
}

impl StringEntry {
    /// Абсолютное смещение упакованных байт.
    pub fn data_offset(&self) -> u64 {
        self.offset + StringEntryHeader::SIZE as u64
    }
}

/// Прочитанная и проверенная таблица строк. Хранит только положения
/// записей; строки декодируются по требованию.
#[derive(Debug, Clone)]
pub struct StringTable {
    pub offset: u64,
    pub header: StringTableHeader,
    pub packer: Packer,
    pub entries: Vec<StringEntry>,
    /// Абсолютное смещение первого байта после таблицы.
    pub end: u64,
}

impl StringTable {
    /// Читает таблицу, начинающуюся в `offset`, проверяя цепочку записей.
    pub fn read(
        data: &[u8],
        offset: u64,
    ) -> CarbonResult<Self> {
        let mut r = ByteReader::at(data, offset)?;
        let header = StringTableHeader::read(&mut r)?;
        let mut packer = Packer::from_flags(header.flags)?;
        packer.read_extra(&mut r, header.compressor_extra_size)?;

        if r.pos() != header.first_entry {
            return Err(ArchiveError::OffsetMismatch {
                what: "first string entry".to_string(),
                stored: header.first_entry,
                actual: r.pos(),
            }
            .into());
        }

        let mut entries: Vec<StringEntry> = Vec::new();
        while r.peek_u8() == Some(MARKER_STRING_ENTRY) {
            let entry_offset = r.pos();
            if let Some(prev) = entries.last() {
                if prev.header.next_entry_off == 0 {
                    return Err(ArchiveError::CorruptedData {
                        reason: "string entry follows the last entry of the chain".to_string(),
                        offset: Some(entry_offset),
                    }
                    .into());
                }
            }

            let entry_header = StringEntryHeader::read(&mut r)?;
            packer.decode(&mut r, entry_header.string_len)?;
            trace!(sid = entry_header.string_id, offset = entry_offset, "string entry");

            if entry_header.next_entry_off != 0 && entry_header.next_entry_off != r.pos() {
                return Err(ArchiveError::OffsetMismatch {
                    what: format!("next entry of string {}", entry_header.string_id),
                    stored: entry_header.next_entry_off,
                    actual: r.pos(),
                }
                .into());
            }
            entries.push(StringEntry {
                offset: entry_offset,
                header: entry_header,
            });
        }

        if entries.len() as u64 != header.num_entries as u64 {
            return Err(ArchiveError::SizeMismatch {
                what: "string table entries".to_string(),
                expected: header.num_entries as u64,
                got: entries.len() as u64,
            }
            .into());
        }
        if let Some(last) = entries.last() {
            if last.header.next_entry_off != 0 {
                return Err(ArchiveError::CorruptedData {
                    reason: "last string entry links to a further entry".to_string(),
                    offset: Some(last.offset),
                }
                .into());
            }
        }

        Ok(Self {
            offset,
            header,
            packer,
            entries,
            end: r.pos(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Размер таблицы в байтах.
    pub fn size(&self) -> u64 {
        self.end - self.offset
    }

    /// Декодирует строку записи.
    pub fn decode(
        &self,
        data: &[u8],
        entry: &StringEntry,
    ) -> CarbonResult<String> {
        let mut r = ByteReader::at(data, entry.data_offset())?;
        self.packer.decode(&mut r, entry.header.string_len)
    }

    /// Читает запись по абсолютному смещению её заголовка.
    pub fn decode_at(
        &self,
        data: &[u8],
        offset: u64,
    ) -> CarbonResult<(StringEntryHeader, String)> {
        let mut r = ByteReader::at(data, offset)?;
        let header = StringEntryHeader::read(&mut r)?;
        let s = self.packer.decode(&mut r, header.string_len)?;
        Ok((header, s))
    }

    /// Линейный поиск записи по SID.
    pub fn find(
        &self,
        sid: Sid,
    ) -> Option<&StringEntry> {
        self.entries.iter().find(|e| e.header.string_id == sid)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Write;

    use carbon_error::StatusCode;
    use rstest::rstest;

    use super::*;
    use crate::archive::packer::PackerKind;

    fn build(
        kind: PackerKind,
        strings: &[&str],
    ) -> Vec<u8> {
        let sids: Vec<Sid> = (1..=strings.len() as Sid).collect();
        let mut out = MemFile::new();
        write_string_table(&mut out, &mut Packer::new(kind), strings, &sids).unwrap();
        out.write_all(b"$").unwrap();
        out.into_inner()
    }

    /// Тест проверяет связность цепочки: от `first_entry` по
    /// `next_entry_off` проходится ровно `num_entries` записей, последняя
    /// ссылается на 0.
    #[rstest]
    #[case(PackerKind::None)]
    #[case(PackerKind::Huffman)]
    fn test_chain_linkage(#[case] kind: PackerKind) {
        let strings = ["alpha", "beta", "", "gamma"];
        let data = build(kind, &strings);

        let header = StringTableHeader::read(&mut ByteReader::new(&data)).unwrap();
        let mut visited = 0;
        let mut pos = header.first_entry;
        loop {
            let h = StringEntryHeader::read(&mut ByteReader::at(&data, pos).unwrap()).unwrap();
            visited += 1;
            if h.next_entry_off == 0 {
                break;
            }
            pos = h.next_entry_off;
        }
        assert_eq!(visited, header.num_entries);

        let table = StringTable::read(&data, 0).unwrap();
        assert_eq!(table.len(), 4);
        for (entry, s) in table.entries.iter().zip(strings) {
            assert_eq!(table.decode(&data, entry).unwrap(), s);
        }
        assert_eq!(data[table.end as usize], b'$');
    }

    #[test]
    fn test_length_mismatch() {
        let mut out = MemFile::new();
        let err = write_string_table(&mut out, &mut Packer::new(PackerKind::None), &["a"], &[])
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SizeMismatch);
    }

    #[test]
    fn test_empty_table() {
        let data = build(PackerKind::Huffman, &[]);
        let table = StringTable::read(&data, 0).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.size(), StringTableHeader::SIZE as u64);
    }

    #[test]
    fn test_broken_link_detected() {
        let mut data = build(PackerKind::None, &["ab", "cd"]);
        // next_entry_off первой записи: сразу после маркера.
        let first = StringTableHeader::SIZE + 1;
        data[first] = data[first].wrapping_add(1);
        let err = StringTable::read(&data, 0).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::OffsetMismatch);
    }

    #[test]
    fn test_count_mismatch_detected() {
        let mut data = build(PackerKind::None, &["ab"]);
        // num_entries: после маркера и флагов.
        data[2] = 5;
        let err = StringTable::read(&data, 0).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SizeMismatch);
    }

    #[test]
    fn test_decode_at_and_find() {
        let data = build(PackerKind::Huffman, &["x", "yy"]);
        let table = StringTable::read(&data, 0).unwrap();
        let entry = table.find(2).unwrap();
        let (h, s) = table.decode_at(&data, entry.offset).unwrap();
        assert_eq!(h.string_id, 2);
        assert_eq!(s, "yy");
        assert!(table.find(9).is_none());
    }
}
