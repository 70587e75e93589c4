//! Канонический код Хаффмана по байтам корпуса строк.
//!
//! Таблица кодов записывается как последовательность записей
//! `'d', letter, nbytes, bytes[nbytes]`, где `bytes` — big-endian
//! представление `(1 << len) | code`: старшая единица отмечает длину кода.
//! Строки кодируются побитовой подстановкой (старший бит первым), последний
//! байт дополняется нулями.

use std::{cmp::Reverse, collections::BinaryHeap, fs::File, io::Write};

use carbon_error::{ArchiveError, CarbonResult, PackerError};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{Pack, PackerKind};
use crate::archive::{
    memfile::{ByteReader, MemFile},
    tags::MARKER_HUFFMAN_ENTRY,
};

/// Максимальная длина кода: `(1 << len) | code` должно помещаться в `u64`.
pub const MAX_CODE_LEN: u8 = 63;

/// Код одного байта.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code {
    pub bits: u64,
    pub len: u8,
}

impl Code {
    /// Число байт записи кода в таблице.
    fn nbytes(self) -> usize {
        (self.len as usize + 1).div_ceil(8)
    }

    fn render(self) -> String {
        (0..self.len)
            .rev()
            .map(|i| if (self.bits >> i) & 1 == 1 { '1' } else { '0' })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct HuffmanPacker {
    codes: Box<[Option<Code>; 256]>,
    decode_map: FxHashMap<(u8, u64), u8>,
}

enum Node {
    Leaf(u8),
    Internal(usize, usize),
}

impl HuffmanPacker {
    pub fn new() -> Self {
        Self {
            codes: Box::new([None; 256]),
            decode_map: FxHashMap::default(),
        }
    }

    /// Строит таблицу по корпусу без записи в поток.
    pub fn from_corpus(strings: &[&str]) -> CarbonResult<Self> {
        let mut p = Self::new();
        p.install(build_codes(strings)?)?;
        Ok(p)
    }

    pub fn code_of(
        &self,
        letter: u8,
    ) -> Option<Code> {
        self.codes[letter as usize]
    }

    /// Число байт, имеющих код.
    pub fn num_codes(&self) -> usize {
        self.codes.iter().filter(|c| c.is_some()).count()
    }

    fn install(
        &mut self,
        table: Vec<(u8, Code)>,
    ) -> CarbonResult<()> {
        self.codes = Box::new([None; 256]);
        self.decode_map.clear();
        for (letter, code) in table {
            if self
                .decode_map
                .insert((code.len, code.bits), letter)
                .is_some()
            {
                return Err(PackerError::Corrupted {
                    reason: format!("duplicate code {} in table", code.render()),
                }
                .into());
            }
            self.codes[letter as usize] = Some(code);
        }
        Ok(())
    }

    /// Декодирует `string_len` символов, вызывая `on_symbol` для каждого.
    fn decode_symbols<F>(
        &self,
        input: &mut ByteReader<'_>,
        string_len: u32,
        mut on_symbol: F,
    ) -> CarbonResult<()>
    where
        F: FnMut(u8, Code),
    {
        let mut byte = 0u8;
        let mut bits_left = 0u8;

        for _ in 0..string_len {
            let mut code = 0u64;
            let mut len = 0u8;
            loop {
                if bits_left == 0 {
                    byte = input.read_u8()?;
                    bits_left = 8;
                }
                bits_left -= 1;
                code = (code << 1) | ((byte >> bits_left) & 1) as u64;
                len += 1;

                if let Some(letter) = self.decode_map.get(&(len, code)) {
                    on_symbol(*letter, Code { bits: code, len });
                    break;
                }
                if len >= MAX_CODE_LEN {
                    return Err(PackerError::Corrupted {
                        reason: format!("no code matches bit sequence at 0x{:X}", input.pos()),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl Default for HuffmanPacker {
    fn default() -> Self {
        Self::new()
    }
}

/// Частоты байт → канонические коды, отсортированные по букве.
fn build_codes(strings: &[&str]) -> CarbonResult<Vec<(u8, Code)>> {
    let mut freqs = [0u64; 256];
    for s in strings {
        for b in s.bytes() {
            freqs[b as usize] += 1;
        }
    }

    let symbols: Vec<u8> = (0..=255u8).filter(|b| freqs[*b as usize] > 0).collect();
    match symbols.len() {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![(symbols[0], Code { bits: 0, len: 1 })]),
        _ => {}
    }

    // Узлы: сначала листья по возрастанию байта, затем внутренние в порядке
    // создания. Индекс узла разрешает равенство весов.
    let mut nodes: Vec<Node> = symbols.iter().map(|s| Node::Leaf(*s)).collect();
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = symbols
        .iter()
        .enumerate()
        .map(|(i, s)| Reverse((freqs[*s as usize], i)))
        .collect();

    while let (Some(Reverse((w1, a))), Some(Reverse((w2, b)))) = (heap.pop(), heap.pop()) {
        nodes.push(Node::Internal(a, b));
        heap.push(Reverse((w1 + w2, nodes.len() - 1)));
    }

    let mut lens: Vec<(usize, u8)> = Vec::with_capacity(symbols.len());
    let mut stack = vec![(nodes.len() - 1, 0usize)];
    while let Some((idx, depth)) = stack.pop() {
        match nodes[idx] {
            Node::Leaf(s) => lens.push((depth, s)),
            Node::Internal(a, b) => {
                stack.push((a, depth + 1));
                stack.push((b, depth + 1));
            }
        }
    }

    if let Some(&(len, letter)) = lens.iter().find(|(len, _)| *len > MAX_CODE_LEN as usize) {
        return Err(PackerError::CodeTooLong { letter, len }.into());
    }

    lens.sort();
    let mut table = Vec::with_capacity(lens.len());
    let mut code = 0u64;
    let mut prev_len = 0usize;
    for (k, (len, letter)) in lens.into_iter().enumerate() {
        if k > 0 {
            code = (code + 1) << (len - prev_len);
        }
        prev_len = len;
        table.push((
            letter,
            Code {
                bits: code,
                len: len as u8,
            },
        ));
    }
    table.sort_by_key(|(letter, _)| *letter);
    Ok(table)
}

/// Читает записи таблицы из ровно `nbytes` байт.
fn read_table(
    input: &mut ByteReader<'_>,
    nbytes: u64,
) -> CarbonResult<Vec<(u8, Code)>> {
    input.ensure_available(nbytes, "huffman table")?;
    let end = input.pos() + nbytes;
    let mut table = Vec::new();

    while input.pos() < end {
        input.expect_marker(MARKER_HUFFMAN_ENTRY, "huffman table entry")?;
        let letter = input.read_u8()?;
        let n = input.read_u8()? as usize;
        if n == 0 || n > 8 {
            return Err(PackerError::Corrupted {
                reason: format!("code of byte 0x{letter:02X} spans {n} bytes"),
            }
            .into());
        }
        let value = input
            .bytes(n, "huffman code")?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64);
        if value < 2 {
            return Err(PackerError::Corrupted {
                reason: format!("empty code for byte 0x{letter:02X}"),
            }
            .into());
        }
        let len = (63 - value.leading_zeros()) as u8;
        table.push((
            letter,
            Code {
                bits: value ^ (1 << len),
                len,
            },
        ));
    }

    if input.pos() != end {
        return Err(ArchiveError::SizeMismatch {
            what: "huffman table".to_string(),
            expected: nbytes,
            got: nbytes + (input.pos() - end),
        }
        .into());
    }
    Ok(table)
}

fn render_letter(letter: u8) -> String {
    if letter.is_ascii_graphic() {
        format!("'{}'", letter as char)
    } else {
        format!("0x{letter:02X}")
    }
}

impl Pack for HuffmanPacker {
    fn kind(&self) -> PackerKind {
        PackerKind::Huffman
    }

    fn write_extra(
        &mut self,
        out: &mut MemFile,
        strings: &[&str],
    ) -> CarbonResult<()> {
        let table = build_codes(strings)?;
        debug!(codes = table.len(), "huffman table built");

        for (letter, code) in &table {
            let value = (1u64 << code.len) | code.bits;
            let n = code.nbytes();
            out.write_all(&[MARKER_HUFFMAN_ENTRY, *letter, n as u8])?;
            out.write_all(&value.to_be_bytes()[8 - n..])?;
        }
        self.install(table)
    }

    fn read_extra(
        &mut self,
        input: &mut ByteReader<'_>,
        nbytes: u64,
    ) -> CarbonResult<()> {
        let table = read_table(input, nbytes)?;
        self.install(table)
    }

    fn read_extra_from_file(
        &mut self,
        _file: &mut File,
        _nbytes: u64,
    ) -> CarbonResult<()> {
        Err(PackerError::NotImplemented {
            what: "huffman table reconstruction from a raw file handle",
        }
        .into())
    }

    fn encode(
        &self,
        out: &mut MemFile,
        s: &str,
    ) -> CarbonResult<()> {
        let mut packed = Vec::with_capacity(s.len());
        let mut acc = 0u8;
        let mut nbits = 0u8;

        for letter in s.bytes() {
            let code = self.codes[letter as usize].ok_or(PackerError::NoCode { letter })?;
            for i in (0..code.len).rev() {
                acc = (acc << 1) | ((code.bits >> i) & 1) as u8;
                nbits += 1;
                if nbits == 8 {
                    packed.push(acc);
                    acc = 0;
                    nbits = 0;
                }
            }
        }
        if nbits > 0 {
            packed.push(acc << (8 - nbits));
        }

        out.write_all(&packed)?;
        Ok(())
    }

    fn decode(
        &self,
        input: &mut ByteReader<'_>,
        string_len: u32,
    ) -> CarbonResult<String> {
        let cap = (string_len as usize).min(input.remaining().saturating_mul(8));
        let mut bytes = Vec::with_capacity(cap);
        self.decode_symbols(input, string_len, |letter, _| bytes.push(letter))?;
        Ok(String::from_utf8(bytes)?)
    }

    fn print_extra(
        &self,
        w: &mut dyn Write,
        input: &mut ByteReader<'_>,
        nbytes: u64,
    ) -> CarbonResult<()> {
        let mut offset = input.pos();
        for (letter, code) in read_table(input, nbytes)? {
            writeln!(
                w,
                "0x{offset:04x}     [marker: d] [letter: {}] [nbytes: {}] [path: {}]",
                render_letter(letter),
                code.nbytes(),
                code.render()
            )?;
            offset += 3 + code.nbytes() as u64;
        }
        Ok(())
    }

    fn print_encoded(
        &self,
        w: &mut dyn Write,
        input: &mut ByteReader<'_>,
        string_len: u32,
    ) -> CarbonResult<()> {
        let mut bytes = Vec::new();
        let mut paths = Vec::new();
        self.decode_symbols(input, string_len, |letter, code| {
            bytes.push(letter);
            paths.push(code.render());
        })?;
        write!(
            w,
            " [string: {:?}] [bits: {}]",
            String::from_utf8_lossy(&bytes),
            paths.join(" ")
        )?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
