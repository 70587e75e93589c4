use std::{fs::File, io::Write};

use carbon_error::{ArchiveError, CarbonResult};

use super::{Pack, PackerKind};
use crate::archive::memfile::{ByteReader, MemFile};

/// Строки хранятся без сжатия; служебных данных нет.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonePacker;

fn expect_no_extra(nbytes: u64) -> CarbonResult<()> {
    if nbytes != 0 {
        return Err(ArchiveError::SizeMismatch {
            what: "uncompressed packer extra data".to_string(),
            expected: 0,
            got: nbytes,
        }
        .into());
    }
    Ok(())
}

impl Pack for NonePacker {
    fn kind(&self) -> PackerKind {
        PackerKind::None
    }

    fn write_extra(
        &mut self,
        _out: &mut MemFile,
        _strings: &[&str],
    ) -> CarbonResult<()> {
        Ok(())
    }

    fn read_extra(
        &mut self,
        _input: &mut ByteReader<'_>,
        nbytes: u64,
    ) -> CarbonResult<()> {
        expect_no_extra(nbytes)
    }

    fn read_extra_from_file(
        &mut self,
        _file: &mut File,
        nbytes: u64,
    ) -> CarbonResult<()> {
        expect_no_extra(nbytes)
    }

    fn encode(
        &self,
        out: &mut MemFile,
        s: &str,
    ) -> CarbonResult<()> {
        out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn decode(
        &self,
        input: &mut ByteReader<'_>,
        string_len: u32,
    ) -> CarbonResult<String> {
        let bytes = input.bytes(string_len as usize, "uncompressed string")?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    fn print_extra(
        &self,
        _w: &mut dyn Write,
        _input: &mut ByteReader<'_>,
        nbytes: u64,
    ) -> CarbonResult<()> {
        expect_no_extra(nbytes)
    }

    fn print_encoded(
        &self,
        w: &mut dyn Write,
        input: &mut ByteReader<'_>,
        string_len: u32,
    ) -> CarbonResult<()> {
        let s = self.decode(input, string_len)?;
        write!(w, " [string: {s:?}]")?;
        Ok(())
    }
}
