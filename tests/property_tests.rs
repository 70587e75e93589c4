//! Property-based тесты архива.
//!
//! Случайные JSON-документы проходят через модель, сериализатор и строгий
//! разбор; проверяются инварианты формата, а не конкретные байты.

use carbon::{
    archive::{
        archive_from_model,
        decode::{read_archive, ObjectNode, PropBody},
        header::{ArchiveHeader, StringEntryHeader},
        packer::{HuffmanPacker, Pack},
        ArchiveOptions, MemFile, PackerKind, SequentialOids,
    },
    model::{object_from_json, DocObject, StringDict, SyncStringDict},
    StatusCode,
};
use proptest::prelude::*;

mod generators;
use generators::*;

const PROPTEST_CASES: u32 = 256;
const DOCUMENT_DEPTH: u32 = 3;

fn packer_strategy() -> impl Strategy<Value = PackerKind> {
    prop_oneof![Just(PackerKind::None), Just(PackerKind::Huffman)]
}

fn build(
    doc: &serde_json::Value,
    compressor: PackerKind,
    bake_index: bool,
) -> (DocObject, SyncStringDict, Vec<u8>) {
    let mut dict = SyncStringDict::new();
    let model = object_from_json(doc, &mut dict).unwrap();
    let options = ArchiveOptions {
        compressor,
        bake_index,
        ..Default::default()
    };
    let data = archive_from_model(&model, &dict, &options, &mut SequentialOids::default())
        .unwrap()
        .into_inner();
    (model, dict, data)
}

/// Рекурсивная проверка разреженного заголовка: одна ячейка таблицы
/// смещений на бит, группы в порядке битов.
fn check_sparse_header(node: &ObjectNode) {
    assert_eq!(node.prop_offsets.len(), node.flags.count());
    let kinds: Vec<_> = node.props.iter().map(|p| p.kind).collect();
    let announced: Vec<_> = node.flags.iter().collect();
    assert_eq!(kinds, announced);

    for prop in &node.props {
        match &prop.body {
            PropBody::Objects { objects, .. } => objects.iter().for_each(check_sparse_header),
            PropBody::ObjectArray { groups, .. } => {
                for group in groups {
                    for column in &group.columns {
                        for entry in &column.entries {
                            if let carbon::archive::decode::ColumnEntryBody::Objects(objs) =
                                &entry.values
                            {
                                objs.iter().for_each(check_sparse_header);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: PROPTEST_CASES,
        .. ProptestConfig::default()
    })]

    /// Модель восстанавливается из архива без потерь при любой упаковке.
    #[test]
    fn prop_model_round_trip(
        doc in document_strategy(DOCUMENT_DEPTH),
        compressor in packer_strategy(),
    ) {
        let (model, _, data) = build(&doc, compressor, false);
        let decoded = read_archive(&data).unwrap();
        prop_assert_eq!(decoded.root.to_model(), model);
    }

    /// Все OID в дереве различны.
    #[test]
    fn prop_oids_unique(doc in document_strategy(DOCUMENT_DEPTH)) {
        let (_, _, data) = build(&doc, PackerKind::None, false);
        let decoded = read_archive(&data).unwrap();
        let mut oids = Vec::new();
        decoded.root.collect_oids(&mut oids);
        let total = oids.len();
        oids.sort_unstable();
        oids.dedup();
        prop_assert_eq!(oids.len(), total);
    }

    /// Запись, перенесённая по другому адресу, разбирается в то же дерево.
    #[test]
    fn prop_record_relocation(
        doc in document_strategy(DOCUMENT_DEPTH),
        shift in 0usize..64,
    ) {
        let (model, _, data) = build(&doc, PackerKind::None, false);
        let root = read_archive(&data).unwrap().header.root_object_header_offset as usize;

        let mut moved = vec![0u8; shift];
        moved.extend_from_slice(&data[root..]);
        let node = carbon::archive::decode_record(&moved, shift as u64).unwrap();
        prop_assert_eq!(node.offset, shift as u64);
        prop_assert_eq!(node.to_model(), model);
    }

    /// Длина таблицы смещений равна числу бит флагового слова, группы идут
    /// в каноническом порядке.
    #[test]
    fn prop_sparse_header(doc in document_strategy(DOCUMENT_DEPTH)) {
        let (_, _, data) = build(&doc, PackerKind::None, false);
        let decoded = read_archive(&data).unwrap();
        check_sparse_header(&decoded.root);
    }

    /// Цепочка записей таблицы строк: каждая ссылается на следующую,
    /// последняя на 0, и покрывает весь словарь.
    #[test]
    fn prop_string_table_linkage(
        doc in document_strategy(DOCUMENT_DEPTH),
        compressor in packer_strategy(),
    ) {
        let (_, dict, data) = build(&doc, compressor, false);
        let decoded = read_archive(&data).unwrap();
        let table = &decoded.string_table;

        prop_assert_eq!(table.len(), dict.num_distinct());
        for pair in table.entries.windows(2) {
            prop_assert_eq!(pair[0].header.next_entry_off, pair[1].offset);
        }
        if let Some(last) = table.entries.last() {
            prop_assert_eq!(last.header.next_entry_off, 0);
            prop_assert_eq!(table.header.first_entry, table.entries[0].offset);
        }

        let (strings, sids) = dict.contents();
        for (s, sid) in strings.iter().zip(&sids) {
            let entry = table.find(*sid).unwrap();
            prop_assert_eq!(&table.decode(&data, entry).unwrap(), s);
        }
    }

    /// Запечённый индекс указывает на запись с тем же SID.
    #[test]
    fn prop_baked_index_is_exact(
        doc in document_strategy(2),
        compressor in packer_strategy(),
    ) {
        let (_, dict, data) = build(&doc, compressor, true);
        let decoded = read_archive(&data).unwrap();
        let index = decoded.index.unwrap();
        prop_assert_eq!(index.len(), dict.num_distinct());

        let header = ArchiveHeader::read(&mut carbon::archive::ByteReader::new(&data)).unwrap();
        prop_assert_eq!(header.string_id_to_offset_index_offset + index.size(), data.len() as u64);

        for (sid, offset) in index.iter_sorted() {
            let (entry, _) = decoded.string_table.decode_at(&data, offset).unwrap();
            prop_assert_eq!(entry.string_id, sid);
        }
    }

    /// Хаффман: decode(encode(s)) == s для строк корпуса.
    #[test]
    fn prop_huffman_idempotent(corpus in corpus_strategy()) {
        let refs: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let packer = HuffmanPacker::from_corpus(&refs).unwrap();

        for s in &refs {
            let mut out = MemFile::new();
            packer.encode(&mut out, s).unwrap();
            let packed = out.into_inner();
            let mut r = carbon::archive::ByteReader::new(&packed);
            prop_assert_eq!(packer.decode(&mut r, s.len() as u32).unwrap(), *s);
            prop_assert!(r.is_eof());
        }
    }

    /// Байт без кода в таблице — ошибка кодирования, а не паника.
    #[test]
    fn prop_huffman_missing_code(corpus in corpus_strategy()) {
        let refs: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let packer = HuffmanPacker::from_corpus(&refs).unwrap();

        let mut out = MemFile::new();
        let err = packer.encode(&mut out, "\u{7f}").unwrap_err();
        prop_assert_eq!(err.status_code(), StatusCode::EncodingError);
    }

    /// Запись таблицы строк без сжатия хранит строку как есть.
    #[test]
    fn prop_plain_entries_store_raw_bytes(doc in document_strategy(1)) {
        let (_, _, data) = build(&doc, PackerKind::None, false);
        let decoded = read_archive(&data).unwrap();
        for entry in &decoded.string_table.entries {
            let start = entry.offset as usize + StringEntryHeader::SIZE;
            let end = start + entry.header.string_len as usize;
            let s = decoded.string_table.decode(&data, entry).unwrap();
            prop_assert_eq!(&data[start..end], s.as_bytes());
        }
    }
}
