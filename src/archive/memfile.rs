//! Байтовый буфер с курсором записи и курсор чтения.
//!
//! [`MemFile`] поддерживает схему «зарезервировать → записать тело →
//! дописать заголовок задним числом» (`reserve` / `patch`) без файлового
//! `seek`. [`ByteReader`] — курсор только для чтения поверх неизменяемого
//! потока; все чтения возвращают `UnexpectedEof` со смещением вместо паники.

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use carbon_error::{ArchiveError, CarbonResult};

/// Буфер, которым эксклюзивно владеет писатель.
#[derive(Debug, Default, Clone)]
pub struct MemFile {
    buf: Vec<u8>,
    pos: usize,
}

impl MemFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Оборачивает готовые байты; курсор стоит в конце.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        let pos = buf.len();
        Self { buf, pos }
    }

    /// Текущая позиция курсора.
    pub fn tell(&self) -> u64 {
        self.pos as u64
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn seek_to(
        &mut self,
        pos: u64,
    ) -> CarbonResult<()> {
        let pos = usize::try_from(pos).unwrap_or(usize::MAX);
        if pos > self.buf.len() {
            return Err(ArchiveError::UnexpectedEof {
                context: "seek past end of buffer".to_string(),
                offset: Some(pos as u64),
                needed: Some((pos - self.buf.len()) as u64),
            }
            .into());
        }
        self.pos = pos;
        Ok(())
    }

    pub fn seek_end(&mut self) {
        self.pos = self.buf.len();
    }

    /// Записывает `n` нулевых байт и возвращает позицию их начала.
    pub fn reserve(
        &mut self,
        n: usize,
    ) -> CarbonResult<u64> {
        let start = self.tell();
        self.write_all(&vec![0u8; n])?;
        Ok(start)
    }

    /// Перемещает курсор на `pos`, выполняет `f` и возвращает курсор на
    /// прежнее место.
    pub fn patch<F>(
        &mut self,
        pos: u64,
        f: F,
    ) -> CarbonResult<()>
    where
        F: FnOnce(&mut MemFile) -> CarbonResult<()>,
    {
        let saved = self.tell();
        self.seek_to(pos)?;
        let result = f(self);
        self.pos = saved as usize;
        result
    }

    pub fn patch_u64(
        &mut self,
        pos: u64,
        value: u64,
    ) -> CarbonResult<()> {
        self.patch(pos, |out| {
            out.write_u64::<LittleEndian>(value)?;
            Ok(())
        })
    }

    /// Записывает столбец `u64` по зарезервированной позиции.
    pub fn patch_u64_column(
        &mut self,
        pos: u64,
        values: &[u64],
    ) -> CarbonResult<()> {
        self.patch(pos, |out| {
            for v in values {
                out.write_u64::<LittleEndian>(*v)?;
            }
            Ok(())
        })
    }

    /// Освобождает неиспользуемую ёмкость.
    pub fn shrink(&mut self) {
        self.buf.shrink_to_fit();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Write for MemFile {
    fn write(
        &mut self,
        data: &[u8],
    ) -> io::Result<usize> {
        let end = self.pos + data.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Курсор чтения по неизменяемому потоку.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Курсор, стоящий на позиции `pos`.
    pub fn at(
        data: &'a [u8],
        pos: u64,
    ) -> CarbonResult<Self> {
        let mut r = Self::new(data);
        r.seek(pos)?;
        Ok(r)
    }

    pub fn pos(&self) -> u64 {
        self.pos as u64
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn seek(
        &mut self,
        pos: u64,
    ) -> CarbonResult<()> {
        match usize::try_from(pos) {
            Ok(p) if p <= self.data.len() => {
                self.pos = p;
                Ok(())
            }
            _ => Err(ArchiveError::UnexpectedEof {
                context: "seek past end of stream".to_string(),
                offset: Some(pos),
                needed: None,
            }
            .into()),
        }
    }

    /// Проверяет, что впереди есть ещё `n` байт. Используется перед
    /// выделением памяти под счётчики, прочитанные из потока.
    pub fn ensure_available(
        &self,
        n: u64,
        what: &str,
    ) -> CarbonResult<()> {
        if n > self.remaining() as u64 {
            return Err(ArchiveError::UnexpectedEof {
                context: what.to_string(),
                offset: Some(self.pos()),
                needed: Some(n - self.remaining() as u64),
            }
            .into());
        }
        Ok(())
    }

    /// Берёт следующие `n` байт.
    pub fn bytes(
        &mut self,
        n: usize,
        what: &str,
    ) -> CarbonResult<&'a [u8]> {
        self.ensure_available(n as u64, what)?;
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> CarbonResult<u8> {
        Ok(self.bytes(1, "u8")?[0])
    }

    pub fn read_i8(&mut self) -> CarbonResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> CarbonResult<u16> {
        Ok(LittleEndian::read_u16(self.bytes(2, "u16")?))
    }

    pub fn read_i16(&mut self) -> CarbonResult<i16> {
        Ok(LittleEndian::read_i16(self.bytes(2, "i16")?))
    }

    pub fn read_u32(&mut self) -> CarbonResult<u32> {
        Ok(LittleEndian::read_u32(self.bytes(4, "u32")?))
    }

    pub fn read_i32(&mut self) -> CarbonResult<i32> {
        Ok(LittleEndian::read_i32(self.bytes(4, "i32")?))
    }

    pub fn read_u64(&mut self) -> CarbonResult<u64> {
        Ok(LittleEndian::read_u64(self.bytes(8, "u64")?))
    }

    pub fn read_i64(&mut self) -> CarbonResult<i64> {
        Ok(LittleEndian::read_i64(self.bytes(8, "i64")?))
    }

    pub fn read_f32(&mut self) -> CarbonResult<f32> {
        Ok(LittleEndian::read_f32(self.bytes(4, "f32")?))
    }

    /// Читает маркер и сверяет его с ожидаемым.
    pub fn expect_marker(
        &mut self,
        expected: u8,
        what: &str,
    ) -> CarbonResult<()> {
        let offset = self.pos();
        let got = self.read_u8()?;
        if got != expected {
            return Err(ArchiveError::InvalidMarker {
                expected,
                got,
                what: what.to_string(),
                offset: Some(offset),
            }
            .into());
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use carbon_error::StatusCode;

    use super::*;

    #[test]
    fn test_reserve_and_patch() {
        let mut out = MemFile::new();
        out.write_u8(b'A').unwrap();
        let slot = out.reserve(8).unwrap();
        out.write_u8(b'B').unwrap();
        out.patch_u64(slot, 0x0102).unwrap();

        assert_eq!(out.tell(), 10);
        assert_eq!(out.len(), 10);
        assert_eq!(&out.as_slice()[1..3], &[0x02, 0x01]);
        assert_eq!(out.as_slice()[9], b'B');
    }

    /// Тест проверяет, что курсор возвращается на место даже при ошибке
    /// внутри `patch`.
    #[test]
    fn test_patch_restores_cursor_on_error() {
        let mut out = MemFile::new();
        out.reserve(4).unwrap();
        let res = out.patch(0, |_| Err(ArchiveError::MissingRoot.into()));
        assert!(res.is_err());
        assert_eq!(out.tell(), 4);
        assert!(out.seek_to(5).is_err());
    }

    #[test]
    fn test_overwrite_in_middle_keeps_length() {
        let mut out = MemFile::from_vec(vec![1, 2, 3, 4]);
        out.seek_to(1).unwrap();
        out.write_all(&[9, 9]).unwrap();
        assert_eq!(out.as_slice(), &[1, 9, 9, 4]);
    }

    #[test]
    fn test_reader_typed_reads() {
        let mut out = MemFile::new();
        out.write_u32::<LittleEndian>(7).unwrap();
        out.write_i16::<LittleEndian>(-2).unwrap();
        out.write_f32::<LittleEndian>(1.25).unwrap();
        let data = out.into_inner();

        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u32().unwrap(), 7);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.read_f32().unwrap(), 1.25);
        assert!(r.is_eof());
    }

    #[test]
    fn test_reader_eof_has_offset() {
        let data = [1u8, 2, 3];
        let mut r = ByteReader::new(&data);
        r.read_u8().unwrap();
        let err = r.read_u32().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UnexpectedEof);
        assert!(err.to_string().contains("offset: 0x1"));
    }

    #[test]
    fn test_expect_marker() {
        let data = *b"{}";
        let mut r = ByteReader::new(&data);
        r.expect_marker(b'{', "object begin").unwrap();
        let err = r.expect_marker(b'{', "object begin").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::InvalidMarker { got: b'}', .. })
        ));
    }
}
