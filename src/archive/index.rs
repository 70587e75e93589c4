//! Индекс «SID → смещение записи таблицы строк».
//!
//! Хранится в конце архива как трейлер: маркер `#`, число пар `u32` и пары
//! `(sid: u64, offset: u64)`, отсортированные по SID.

use byteorder::{LittleEndian, WriteBytesExt};
use carbon_error::CarbonResult;
use rustc_hash::FxHashMap;

use super::{
    memfile::{ByteReader, MemFile},
    strtab::StringTable,
    tags::MARKER_INDEX,
};
use crate::model::Sid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidIndex {
    offsets: FxHashMap<Sid, u64>,
}

impl SidIndex {
    const PAIR_SIZE: usize = 16;

    /// Строит индекс по уже прочитанной таблице строк.
    pub fn build(table: &StringTable) -> Self {
        let offsets = table
            .entries
            .iter()
            .map(|e| (e.header.string_id, e.offset))
            .collect();
        Self { offsets }
    }

    /// Абсолютное смещение заголовка записи со строкой `sid`.
    pub fn lookup(
        &self,
        sid: Sid,
    ) -> Option<u64> {
        self.offsets.get(&sid).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Размер трейлера в байтах.
    pub fn size(&self) -> u64 {
        (1 + 4 + Self::PAIR_SIZE * self.offsets.len()) as u64
    }

    pub fn serialize(
        &self,
        out: &mut MemFile,
    ) -> CarbonResult<()> {
        let mut pairs: Vec<(Sid, u64)> = self.offsets.iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort_unstable();

        out.write_u8(MARKER_INDEX)?;
        out.write_u32::<LittleEndian>(pairs.len() as u32)?;
        for (sid, offset) in pairs {
            out.write_u64::<LittleEndian>(sid)?;
            out.write_u64::<LittleEndian>(offset)?;
        }
        Ok(())
    }

    pub fn deserialize(r: &mut ByteReader<'_>) -> CarbonResult<Self> {
        r.expect_marker(MARKER_INDEX, "string id index")?;
        let count = r.read_u32()?;
        r.ensure_available(count as u64 * Self::PAIR_SIZE as u64, "string id index")?;

        let mut offsets = FxHashMap::default();
        offsets.reserve(count as usize);
        for _ in 0..count {
            let sid = r.read_u64()?;
            let offset = r.read_u64()?;
            offsets.insert(sid, offset);
        }
        Ok(Self { offsets })
    }

    /// Пары в порядке возрастания SID.
    pub fn iter_sorted(&self) -> Vec<(Sid, u64)> {
        let mut pairs: Vec<(Sid, u64)> = self.offsets.iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort_unstable();
        pairs
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
