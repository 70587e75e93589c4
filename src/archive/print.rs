//! Построчный текстовый дамп архива.
//!
//! Каждая структурная единица выводится отдельной строкой вида
//! `0x<смещение> [marker: c] [поле: значение] …`; вложенность отражается
//! отступом после смещения.

use std::io::Write;

use carbon_error::CarbonResult;

use super::{
    decode::{
        read_archive, ColumnEntryBody, ColumnGroupNode, ColumnNode, DecodedArchive, ObjectNode,
        PropBody, PropNode,
    },
    header::{PropHeader, RecordHeader, StringTableHeader},
    memfile::ByteReader,
    packer::{Pack, PackerKind},
    tags::{
        PropKind, RecordFlags, FILE_MAGIC, MARKER_COLUMN, MARKER_COLUMN_GROUP, MARKER_INDEX,
        MARKER_OBJECT_BEGIN, MARKER_OBJECT_END, MARKER_RECORD_HEADER, MARKER_STRING_ENTRY,
        MARKER_STRING_TABLE,
    },
};
use crate::model::{ColumnType, Values};

/// Разбирает `data` и печатает его структуру в `w`.
pub fn print_archive(
    w: &mut dyn Write,
    data: &[u8],
) -> CarbonResult<()> {
    let archive = read_archive(data)?;
    Printer { w, data }.print(&archive)
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_hex(items: &[u64]) -> String {
    items
        .iter()
        .map(|x| format!("0x{x:x}"))
        .collect::<Vec<_>>()
        .join(", ")
}

struct Printer<'w, 'd> {
    w: &'w mut dyn Write,
    data: &'d [u8],
}

impl Printer<'_, '_> {
    fn line(
        &mut self,
        offset: u64,
        depth: usize,
        body: std::fmt::Arguments<'_>,
    ) -> CarbonResult<()> {
        writeln!(self.w, "0x{offset:04x} {:width$}{body}", "", width = depth * 3)?;
        Ok(())
    }

    fn print(
        &mut self,
        archive: &DecodedArchive,
    ) -> CarbonResult<()> {
        let header = &archive.header;
        self.line(
            0,
            0,
            format_args!(
                "[magic: {}] [version: {}] [root: 0x{:04x}] [string_id_index: 0x{:04x}]",
                String::from_utf8_lossy(FILE_MAGIC),
                header.version,
                header.root_object_header_offset,
                header.string_id_to_offset_index_offset
            ),
        )?;

        self.print_string_table(archive)?;

        let root = header.root_object_header_offset;
        let record = &archive.record_header;
        let sorted = RecordFlags::from_bits_truncate(record.flags).contains(RecordFlags::SORTED);
        self.line(
            root - RecordHeader::SIZE as u64,
            0,
            format_args!(
                "[marker: {}] [sorted: {}] [record_size: {}]",
                MARKER_RECORD_HEADER as char, sorted, record.record_size
            ),
        )?;
        self.print_object(&archive.root, 1)?;

        if let Some(index) = &archive.index {
            let pairs = index.iter_sorted();
            self.line(
                header.string_id_to_offset_index_offset,
                0,
                format_args!(
                    "[marker: {}] [num_entries: {}]",
                    MARKER_INDEX as char,
                    pairs.len()
                ),
            )?;
            for (sid, offset) in pairs {
                writeln!(self.w, "{:11}[sid: {sid}] [offset: 0x{offset:04x}]", "")?;
            }
        }
        Ok(())
    }

    fn print_string_table(
        &mut self,
        archive: &DecodedArchive,
    ) -> CarbonResult<()> {
        let table = &archive.string_table;
        let kind = PackerKind::from_flags(table.header.flags)?;
        self.line(
            table.offset,
            0,
            format_args!(
                "[marker: {}] [packer: {}] [num_entries: {}] [first_entry: 0x{:04x}] [extra_size: {}]",
                MARKER_STRING_TABLE as char,
                kind,
                table.header.num_entries,
                table.header.first_entry,
                table.header.compressor_extra_size
            ),
        )?;

        let mut r = ByteReader::at(self.data, table.offset + StringTableHeader::SIZE as u64)?;
        table
            .packer
            .print_extra(self.w, &mut r, table.header.compressor_extra_size)?;

        for entry in &table.entries {
            write!(
                self.w,
                "0x{:04x} {:3}[marker: {}] [next: 0x{:04x}] [sid: {}] [len: {}]",
                entry.offset,
                "",
                MARKER_STRING_ENTRY as char,
                entry.header.next_entry_off,
                entry.header.string_id,
                entry.header.string_len
            )?;
            let mut r = ByteReader::at(self.data, entry.data_offset())?;
            table
                .packer
                .print_encoded(self.w, &mut r, entry.header.string_len)?;
            writeln!(self.w)?;
        }
        Ok(())
    }

    fn print_object(
        &mut self,
        obj: &ObjectNode,
        depth: usize,
    ) -> CarbonResult<()> {
        let kinds: Vec<String> = obj.flags.iter().map(PropKind::name).collect();
        self.line(
            obj.offset,
            depth,
            format_args!(
                "[marker: {}] [oid: {}] [flags: 0x{:08x}] [props: {}] [offsets: {}] [next: 0x{:x}]",
                MARKER_OBJECT_BEGIN as char,
                obj.oid,
                obj.flags.bits(),
                kinds.join(", "),
                join_hex(&obj.prop_offsets),
                obj.next
            ),
        )?;
        for prop in &obj.props {
            self.print_prop(prop, depth + 1)?;
        }
        self.line(
            obj.end_offset - 1,
            depth,
            format_args!("[marker: {}]", MARKER_OBJECT_END as char),
        )
    }

    fn print_prop(
        &mut self,
        prop: &PropNode,
        depth: usize,
    ) -> CarbonResult<()> {
        let marker = prop.kind.marker() as char;
        let n = prop.keys.len();
        match &prop.body {
            PropBody::Fixed(values) => self.line(
                prop.offset,
                depth,
                format_args!(
                    "[marker: {marker}] [num_entries: {n}] [keys: {}] [values: {}]",
                    join(&prop.keys),
                    values.render_fixed().join(", ")
                ),
            ),
            PropBody::Array(values) => {
                self.line(
                    prop.offset,
                    depth,
                    format_args!(
                        "[marker: {marker}] [num_entries: {n}] [keys: {}]",
                        join(&prop.keys)
                    ),
                )?;
                // Значения идут сразу за ключами и столбцом длин.
                let mut offset = prop.offset + (PropHeader::SIZE + 12 * n) as u64;
                for v in values {
                    self.print_values(offset, depth + 1, v)?;
                    offset += (v.len() * v.scalar_type().width()) as u64;
                }
                Ok(())
            }
            PropBody::Objects { offsets, objects } => {
                self.line(
                    prop.offset,
                    depth,
                    format_args!(
                        "[marker: {marker}] [num_entries: {n}] [keys: {}] [offsets: {}]",
                        join(&prop.keys),
                        join_hex(offsets)
                    ),
                )?;
                for obj in objects {
                    self.print_object(obj, depth + 1)?;
                }
                Ok(())
            }
            PropBody::ObjectArray {
                group_offsets,
                groups,
            } => {
                self.line(
                    prop.offset,
                    depth,
                    format_args!(
                        "[marker: {marker}] [num_entries: {n}] [keys: {}] [offsets: {}]",
                        join(&prop.keys),
                        join_hex(group_offsets)
                    ),
                )?;
                for group in groups {
                    self.print_column_group(group, depth + 1)?;
                }
                Ok(())
            }
        }
    }

    fn print_values(
        &mut self,
        offset: u64,
        depth: usize,
        values: &Values,
    ) -> CarbonResult<()> {
        self.line(
            offset,
            depth,
            format_args!(
                "[num_entries: {}] [values: {}]",
                values.len(),
                values.render().join(", ")
            ),
        )
    }

    fn print_column_group(
        &mut self,
        group: &ColumnGroupNode,
        depth: usize,
    ) -> CarbonResult<()> {
        self.line(
            group.offset,
            depth,
            format_args!(
                "[marker: {}] [num_columns: {}] [num_objects: {}] [oids: {}] [offsets: {}]",
                MARKER_COLUMN_GROUP as char,
                group.columns.len(),
                group.oids.len(),
                join(&group.oids),
                join_hex(&group.column_offsets)
            ),
        )?;
        for column in &group.columns {
            self.print_column(column, depth + 1)?;
        }
        Ok(())
    }

    fn print_column(
        &mut self,
        column: &ColumnNode,
        depth: usize,
    ) -> CarbonResult<()> {
        let type_name = match column.value_type {
            ColumnType::Scalar(t) => t.name(),
            ColumnType::Object => "object",
        };
        self.line(
            column.offset,
            depth,
            format_args!(
                "[marker: {}] [name: {}] [type: {}] [num_entries: {}] [positions: {}] [offsets: {}]",
                MARKER_COLUMN as char,
                column.name,
                type_name,
                column.entries.len(),
                join(&column.positions),
                join_hex(&column.entry_offsets)
            ),
        )?;
        for entry in &column.entries {
            match &entry.values {
                ColumnEntryBody::Scalars(values) => {
                    self.line(
                        entry.offset,
                        depth + 1,
                        format_args!(
                            "[position: {}] [num_entries: {}] [values: {}]",
                            entry.position,
                            values.len(),
                            values.render().join(", ")
                        ),
                    )?;
                }
                ColumnEntryBody::Objects(objects) => {
                    self.line(
                        entry.offset,
                        depth + 1,
                        format_args!(
                            "[position: {}] [num_entries: {}]",
                            entry.position,
                            objects.len()
                        ),
                    )?;
                    for obj in objects {
                        self.print_object(obj, depth + 2)?;
                    }
                }
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
