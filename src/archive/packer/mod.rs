//! Стратегии упаковки строк таблицы строк.
//!
//! - [`none`] — строки хранятся как есть;
//! - [`huffman`] — канонический код Хаффмана, построенный по всему корпусу.
//!
//! Стратегия выбирается флагами заголовка таблицы строк и хранит своё
//! состояние (например, таблицу кодов) внутри варианта [`Packer`].

pub mod huffman;
pub mod none;

use std::{fmt, fs::File, io::Write, str::FromStr};

use carbon_error::{CarbonResult, PackerError};
use serde::Deserialize;

pub use huffman::HuffmanPacker;
pub use none::NonePacker;

use super::{
    memfile::{ByteReader, MemFile},
    tags::StringTableFlags,
};

/// Интерфейс стратегии упаковки.
pub trait Pack {
    fn kind(&self) -> PackerKind;

    /// Строит и записывает служебные данные стратегии по всему корпусу строк.
    fn write_extra(
        &mut self,
        out: &mut MemFile,
        strings: &[&str],
    ) -> CarbonResult<()>;

    /// Восстанавливает состояние из ровно `nbytes` служебных байт потока.
    fn read_extra(
        &mut self,
        input: &mut ByteReader<'_>,
        nbytes: u64,
    ) -> CarbonResult<()>;

    /// Восстанавливает состояние напрямую из файла.
    fn read_extra_from_file(
        &mut self,
        file: &mut File,
        nbytes: u64,
    ) -> CarbonResult<()>;

    fn encode(
        &self,
        out: &mut MemFile,
        s: &str,
    ) -> CarbonResult<()>;

    /// Декодирует строку исходной длины `string_len`, сдвигая курсор на конец
    /// её упакованных байт.
    fn decode(
        &self,
        input: &mut ByteReader<'_>,
        string_len: u32,
    ) -> CarbonResult<String>;

    fn print_extra(
        &self,
        w: &mut dyn Write,
        input: &mut ByteReader<'_>,
        nbytes: u64,
    ) -> CarbonResult<()>;

    fn print_encoded(
        &self,
        w: &mut dyn Write,
        input: &mut ByteReader<'_>,
        string_len: u32,
    ) -> CarbonResult<()>;
}

/// Идентификатор стратегии.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackerKind {
    None,
    #[default]
    Huffman,
}

impl PackerKind {
    pub fn flags(self) -> StringTableFlags {
        match self {
            PackerKind::None => StringTableFlags::NONE,
            PackerKind::Huffman => StringTableFlags::HUFFMAN,
        }
    }

    /// Ровно один известный бит стратегии.
    pub fn from_flags(bits: u8) -> CarbonResult<Self> {
        match StringTableFlags::from_bits(bits) {
            Some(f) if f == StringTableFlags::NONE => Ok(PackerKind::None),
            Some(f) if f == StringTableFlags::HUFFMAN => Ok(PackerKind::Huffman),
            _ => Err(PackerError::UnknownStrategy {
                name: format!("flags 0x{bits:02X}"),
            }
            .into()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PackerKind::None => "none",
            PackerKind::Huffman => "huffman",
        }
    }
}

impl fmt::Display for PackerKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackerKind {
    type Err = PackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PackerKind::None),
            "huffman" => Ok(PackerKind::Huffman),
            other => Err(PackerError::UnknownStrategy {
                name: other.to_string(),
            }),
        }
    }
}

/// Закрытое множество стратегий.
#[derive(Debug, Clone)]
pub enum Packer {
    None(NonePacker),
    Huffman(HuffmanPacker),
}

impl Packer {
    pub fn new(kind: PackerKind) -> Self {
        match kind {
            PackerKind::None => Packer::None(NonePacker),
            PackerKind::Huffman => Packer::Huffman(HuffmanPacker::new()),
        }
    }

    pub fn from_flags(bits: u8) -> CarbonResult<Self> {
        Ok(Self::new(PackerKind::from_flags(bits)?))
    }

    fn inner(&self) -> &dyn Pack {
        match self {
            Packer::None(p) => p,
            Packer::Huffman(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Pack {
        match self {
            Packer::None(p) => p,
            Packer::Huffman(p) => p,
        }
    }
}

impl Pack for Packer {
    fn kind(&self) -> PackerKind {
        self.inner().kind()
    }

    fn write_extra(
        &mut self,
        out: &mut MemFile,
        strings: &[&str],
    ) -> CarbonResult<()> {
        self.inner_mut().write_extra(out, strings)
    }

    fn read_extra(
        &mut self,
        input: &mut ByteReader<'_>,
        nbytes: u64,
    ) -> CarbonResult<()> {
        self.inner_mut().read_extra(input, nbytes)
    }

    fn read_extra_from_file(
        &mut self,
        file: &mut File,
        nbytes: u64,
    ) -> CarbonResult<()> {
        self.inner_mut().read_extra_from_file(file, nbytes)
    }

    fn encode(
        &self,
        out: &mut MemFile,
        s: &str,
    ) -> CarbonResult<()> {
        self.inner().encode(out, s)
    }

    fn decode(
        &self,
        input: &mut ByteReader<'_>,
        string_len: u32,
    ) -> CarbonResult<String> {
        self.inner().decode(input, string_len)
    }

    fn print_extra(
        &self,
        w: &mut dyn Write,
        input: &mut ByteReader<'_>,
        nbytes: u64,
    ) -> CarbonResult<()> {
        self.inner().print_extra(w, input, nbytes)
    }

    fn print_encoded(
        &self,
        w: &mut dyn Write,
        input: &mut ByteReader<'_>,
        string_len: u32,
    ) -> CarbonResult<()> {
        self.inner().print_encoded(w, input, string_len)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
