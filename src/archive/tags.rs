//! Маркеры бинарного формата архива.
//!
//! Каждая структурная единица потока начинается с однобайтового
//! ASCII-маркера. Используется в модулях `encode`, `decode` и `print`.

use bitflags::bitflags;
use carbon_error::{ArchiveError, CarbonResult};

use crate::model::{ColumnType, ScalarType};

/// «Магическое» начало файла: ASCII-буквы «CARBON».
pub const FILE_MAGIC: &[u8; 6] = b"CARBON";

/// Поддерживаемые версии формата архива.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    V1 = 1,
}

impl TryFrom<u8> for FormatVersion {
    type Error = ArchiveError;
    fn try_from(value: u8) -> Result<Self, ArchiveError> {
        match value {
            1 => Ok(FormatVersion::V1),
            other => Err(ArchiveError::UnsupportedVersion {
                found: other,
                supported: FORMAT_VERSION,
            }),
        }
    }
}

/// Текущая версия формата, как число.
pub const FORMAT_VERSION: u8 = FormatVersion::V1 as u8;

/// Заголовок таблицы строк
pub const MARKER_STRING_TABLE: u8 = b'D';
/// Запись таблицы строк
pub const MARKER_STRING_ENTRY: u8 = b'-';
/// Запись таблицы кодов Хаффмана
pub const MARKER_HUFFMAN_ENTRY: u8 = b'd';
/// Заголовок записи (record)
pub const MARKER_RECORD_HEADER: u8 = b'$';
/// Начало объекта
pub const MARKER_OBJECT_BEGIN: u8 = b'{';
/// Конец объекта
pub const MARKER_OBJECT_END: u8 = b'}';
/// Группа свойств-объектов
pub const MARKER_OBJECT: u8 = b'o';
/// Группа свойств — массивов объектов
pub const MARKER_OBJECT_ARRAY: u8 = b'O';
/// Группа колонок
pub const MARKER_COLUMN_GROUP: u8 = b'X';
/// Колонка
pub const MARKER_COLUMN: u8 = b'x';
/// Индекс SID → смещение в конце файла
pub const MARKER_INDEX: u8 = b'#';

const FIXED_MARKERS: [u8; 12] = *b"nbcsilrhegft";
const ARRAY_MARKERS: [u8; 12] = *b"NBCSILRHEGFT";

impl ScalarType {
    /// Маркер группы фиксированных свойств этого типа.
    pub fn fixed_marker(self) -> u8 {
        FIXED_MARKERS[self.index()]
    }

    /// Маркер группы свойств-массивов этого типа.
    pub fn array_marker(self) -> u8 {
        ARRAY_MARKERS[self.index()]
    }

    pub fn from_fixed_marker(marker: u8) -> Option<Self> {
        FIXED_MARKERS
            .iter()
            .position(|m| *m == marker)
            .and_then(ScalarType::from_index)
    }
}

impl ColumnType {
    /// Байт типа в заголовке колонки.
    pub fn marker(self) -> u8 {
        match self {
            ColumnType::Scalar(t) => t.fixed_marker(),
            ColumnType::Object => MARKER_OBJECT,
        }
    }

    pub fn from_marker(marker: u8) -> Option<Self> {
        if marker == MARKER_OBJECT {
            return Some(ColumnType::Object);
        }
        ScalarType::from_fixed_marker(marker).map(ColumnType::Scalar)
    }
}

/// Число видов групп свойств (и используемых битов флагового слова).
pub const NUM_PROP_KINDS: usize = 26;

/// Вид группы свойств объекта.
///
/// Порядок вариантов совпадает с каноническим порядком записи групп и с
/// порядком битов флагового слова: 12 фиксированных скаляров, объекты,
/// 12 массивов скаляров, массивы объектов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropKind {
    Fixed(ScalarType),
    Object,
    Array(ScalarType),
    ObjectArray,
}

impl PropKind {
    /// Номер бита во флаговом слове.
    pub fn index(self) -> usize {
        match self {
            PropKind::Fixed(t) => t.index(),
            PropKind::Object => 12,
            PropKind::Array(t) => 13 + t.index(),
            PropKind::ObjectArray => 25,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        match i {
            0..=11 => ScalarType::from_index(i).map(PropKind::Fixed),
            12 => Some(PropKind::Object),
            13..=24 => ScalarType::from_index(i - 13).map(PropKind::Array),
            25 => Some(PropKind::ObjectArray),
            _ => None,
        }
    }

    pub fn marker(self) -> u8 {
        match self {
            PropKind::Fixed(t) => t.fixed_marker(),
            PropKind::Object => MARKER_OBJECT,
            PropKind::Array(t) => t.array_marker(),
            PropKind::ObjectArray => MARKER_OBJECT_ARRAY,
        }
    }

    pub fn from_marker(marker: u8) -> Option<Self> {
        Self::all().find(|k| k.marker() == marker)
    }

    /// Все виды в каноническом порядке.
    pub fn all() -> impl Iterator<Item = PropKind> {
        (0..NUM_PROP_KINDS).filter_map(PropKind::from_index)
    }

    pub fn name(self) -> String {
        match self {
            PropKind::Fixed(t) => t.name().to_string(),
            PropKind::Object => "object".to_string(),
            PropKind::Array(t) => format!("{}[]", t.name()),
            PropKind::ObjectArray => "object[]".to_string(),
        }
    }
}

/// Флаговое слово объекта: бит `k` установлен, если у объекта есть группа
/// вида `PropKind::from_index(k)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropFlags(u32);

impl PropFlags {
    const MASK: u32 = (1 << NUM_PROP_KINDS) - 1;

    pub fn empty() -> Self {
        Self(0)
    }

    /// Проверяет, что установлены только известные биты.
    pub fn from_bits(bits: u32) -> CarbonResult<Self> {
        if bits & !Self::MASK != 0 {
            return Err(ArchiveError::corrupted(format!(
                "object flag word 0x{bits:08X} sets unknown bits"
            ))
            .into());
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn set(
        &mut self,
        kind: PropKind,
    ) {
        self.0 |= 1 << kind.index();
    }

    pub fn contains(
        self,
        kind: PropKind,
    ) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    /// Число установленных битов — длина разреженной таблицы смещений.
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Установленные виды в порядке битов.
    pub fn iter(self) -> impl Iterator<Item = PropKind> {
        PropKind::all().filter(move |k| self.contains(*k))
    }
}

bitflags! {
    /// Флаги заголовка записи.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u8 {
        /// Ключи групп отсортированы по строковому значению.
        const SORTED = 1 << 0;
    }
}

bitflags! {
    /// Стратегия сжатия таблицы строк.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StringTableFlags: u8 {
        const NONE = 1 << 0;
        const HUFFMAN = 1 << 1;
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_prop_kind_index_roundtrip() {
        for i in 0..NUM_PROP_KINDS {
            let k = PropKind::from_index(i).unwrap();
            assert_eq!(k.index(), i);
            assert_eq!(PropKind::from_marker(k.marker()), Some(k));
        }
        assert_eq!(PropKind::from_index(26), None);
    }

    /// Тест проверяет, что порядок `Ord` совпадает с порядком битов.
    #[test]
    fn test_prop_kind_order_matches_bits() {
        let kinds: Vec<PropKind> = PropKind::all().collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert_eq!(kinds[12], PropKind::Object);
        assert_eq!(kinds[25], PropKind::ObjectArray);
    }

    #[test]
    fn test_markers_are_unique() {
        let mut seen = HashSet::new();
        for k in PropKind::all() {
            assert!(seen.insert(k.marker()));
        }
        for m in [
            MARKER_STRING_TABLE,
            MARKER_STRING_ENTRY,
            MARKER_HUFFMAN_ENTRY,
            MARKER_RECORD_HEADER,
            MARKER_OBJECT_BEGIN,
            MARKER_OBJECT_END,
            MARKER_COLUMN_GROUP,
            MARKER_COLUMN,
            MARKER_INDEX,
        ] {
            assert!(seen.insert(m), "duplicate marker {}", m as char);
        }
    }

    #[test]
    fn test_prop_flags() {
        let mut flags = PropFlags::empty();
        flags.set(PropKind::Array(ScalarType::UInt8));
        flags.set(PropKind::Fixed(ScalarType::UInt8));
        assert_eq!(flags.count(), 2);
        let kinds: Vec<PropKind> = flags.iter().collect();
        assert_eq!(
            kinds,
            vec![
                PropKind::Fixed(ScalarType::UInt8),
                PropKind::Array(ScalarType::UInt8)
            ]
        );
        assert!(PropFlags::from_bits(1 << 26).is_err());
        assert_eq!(PropFlags::from_bits(flags.bits()).unwrap(), flags);
    }

    #[test]
    fn test_format_version() {
        assert_eq!(FormatVersion::try_from(1).unwrap(), FormatVersion::V1);
        assert!(matches!(
            FormatVersion::try_from(9),
            Err(ArchiveError::UnsupportedVersion { found: 9, .. })
        ));
    }

    #[test]
    fn test_column_type_marker() {
        assert_eq!(ColumnType::Object.marker(), b'o');
        assert_eq!(
            ColumnType::from_marker(b'i'),
            Some(ColumnType::Scalar(ScalarType::Int32))
        );
        assert_eq!(ColumnType::from_marker(b'Z'), None);
    }
}
