#![no_main]

use arbitrary::Arbitrary;
use carbon::{
    archive::{decode::read_archive, print_archive},
    Archive,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    data: Vec<u8>,
    /// Заменить заголовок корректным magic и версией, чтобы разбор
    /// доходил до таблицы строк и записи.
    fix_magic: bool,
}

fuzz_target!(|input: FuzzInput| {
    let mut data = input.data;
    if input.fix_magic && data.len() >= 7 {
        data[..6].copy_from_slice(b"CARBON");
        data[6] = 1;
    }

    // Ни строгий разбор, ни открытие, ни печать не должны паниковать.
    if let Ok(decoded) = read_archive(&data) {
        let model = decoded.root.to_model();
        let mut oids = Vec::new();
        decoded.root.collect_oids(&mut oids);
        assert!(!oids.is_empty());
        let _ = model.is_empty();
    }

    if let Ok(archive) = Archive::from_stream(data.clone()) {
        let _ = archive.root();
        let query = archive.query();
        for info in query.scan_strids() {
            let _ = query.fetch_string_by_id(info.sid);
        }
    }

    let mut sink = Vec::new();
    let _ = print_archive(&mut sink, &data);
});
