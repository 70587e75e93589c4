//! Колоночная модель документа, из которой строится архив.
//!
//! Все ключи и строковые значения уже интернированы в словаре строк и
//! представлены идентификаторами [`Sid`]. Свойства объекта сгруппированы по
//! виду: фиксированные скаляры (не более одной группы на тип), массивы
//! скаляров, вложенные объекты и массивы объектов, хранящиеся в
//! транспонированном (колоночном) виде.

pub mod dict;
pub mod json;

use std::collections::BTreeMap;

use carbon_error::{ensure, ArchiveError, CarbonResult};

pub use dict::*;
pub use json::*;

/// Идентификатор интернированной строки.
pub type Sid = u64;
/// Идентификатор объекта, уникальный в пределах архива.
pub type Oid = u64;

/// SID, обозначающий `null` внутри строковых массивов и колонок.
pub const NULL_SID: Sid = 0;
/// Значение булевого элемента массива, обозначающее `null`.
pub const NULL_BOOL: u8 = 2;

/// Тип скалярного значения. Порядок вариантов совпадает с каноническим
/// порядком групп свойств в архиве.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarType {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    String,
}

impl ScalarType {
    pub const ALL: [ScalarType; 12] = [
        ScalarType::Null,
        ScalarType::Bool,
        ScalarType::Int8,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::UInt8,
        ScalarType::UInt16,
        ScalarType::UInt32,
        ScalarType::UInt64,
        ScalarType::Float,
        ScalarType::String,
    ];

    /// Позиция типа в каноническом порядке.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    /// Размер одного упакованного значения в байтах.
    pub fn width(self) -> usize {
        match self {
            ScalarType::Null => 0,
            ScalarType::Bool | ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::String => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Null => "null",
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "int8",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt8 => "uint8",
            ScalarType::UInt16 => "uint16",
            ScalarType::UInt32 => "uint32",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float => "float",
            ScalarType::String => "string",
        }
    }
}

/// Одно типизированное скалярное значение.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    String(Sid),
}

impl Scalar {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Scalar::Null => ScalarType::Null,
            Scalar::Bool(_) => ScalarType::Bool,
            Scalar::Int8(_) => ScalarType::Int8,
            Scalar::Int16(_) => ScalarType::Int16,
            Scalar::Int32(_) => ScalarType::Int32,
            Scalar::Int64(_) => ScalarType::Int64,
            Scalar::UInt8(_) => ScalarType::UInt8,
            Scalar::UInt16(_) => ScalarType::UInt16,
            Scalar::UInt32(_) => ScalarType::UInt32,
            Scalar::UInt64(_) => ScalarType::UInt64,
            Scalar::Float(_) => ScalarType::Float,
            Scalar::String(_) => ScalarType::String,
        }
    }
}

/// Типизированный вектор значений одного скалярного типа.
///
/// Внутри массивов и колонок `null` кодируется значением-стражем:
/// `iN::MIN`, `uN::MAX`, `NaN`, [`NULL_BOOL`] и [`NULL_SID`].
#[derive(Debug, Clone)]
pub enum Values {
    Null(usize),
    Bool(Vec<u8>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float(Vec<f32>),
    String(Vec<Sid>),
}

impl Values {
    /// Пустой вектор указанного типа.
    pub fn empty(t: ScalarType) -> Self {
        match t {
            ScalarType::Null => Values::Null(0),
            ScalarType::Bool => Values::Bool(Vec::new()),
            ScalarType::Int8 => Values::Int8(Vec::new()),
            ScalarType::Int16 => Values::Int16(Vec::new()),
            ScalarType::Int32 => Values::Int32(Vec::new()),
            ScalarType::Int64 => Values::Int64(Vec::new()),
            ScalarType::UInt8 => Values::UInt8(Vec::new()),
            ScalarType::UInt16 => Values::UInt16(Vec::new()),
            ScalarType::UInt32 => Values::UInt32(Vec::new()),
            ScalarType::UInt64 => Values::UInt64(Vec::new()),
            ScalarType::Float => Values::Float(Vec::new()),
            ScalarType::String => Values::String(Vec::new()),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Values::Null(_) => ScalarType::Null,
            Values::Bool(_) => ScalarType::Bool,
            Values::Int8(_) => ScalarType::Int8,
            Values::Int16(_) => ScalarType::Int16,
            Values::Int32(_) => ScalarType::Int32,
            Values::Int64(_) => ScalarType::Int64,
            Values::UInt8(_) => ScalarType::UInt8,
            Values::UInt16(_) => ScalarType::UInt16,
            Values::UInt32(_) => ScalarType::UInt32,
            Values::UInt64(_) => ScalarType::UInt64,
            Values::Float(_) => ScalarType::Float,
            Values::String(_) => ScalarType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Values::Null(n) => *n,
            Values::Bool(v) | Values::UInt8(v) => v.len(),
            Values::Int8(v) => v.len(),
            Values::Int16(v) => v.len(),
            Values::Int32(v) => v.len(),
            Values::Int64(v) => v.len(),
            Values::UInt16(v) => v.len(),
            Values::UInt32(v) => v.len(),
            Values::UInt64(v) => v.len(),
            Values::Float(v) => v.len(),
            Values::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Добавляет скаляр. Возвращает `false`, если тип не совпадает.
    pub fn push(
        &mut self,
        value: Scalar,
    ) -> bool {
        match (self, value) {
            (Values::Null(n), Scalar::Null) => *n += 1,
            (Values::Bool(v), Scalar::Bool(b)) => v.push(b as u8),
            (Values::Int8(v), Scalar::Int8(x)) => v.push(x),
            (Values::Int16(v), Scalar::Int16(x)) => v.push(x),
            (Values::Int32(v), Scalar::Int32(x)) => v.push(x),
            (Values::Int64(v), Scalar::Int64(x)) => v.push(x),
            (Values::UInt8(v), Scalar::UInt8(x)) => v.push(x),
            (Values::UInt16(v), Scalar::UInt16(x)) => v.push(x),
            (Values::UInt32(v), Scalar::UInt32(x)) => v.push(x),
            (Values::UInt64(v), Scalar::UInt64(x)) => v.push(x),
            (Values::Float(v), Scalar::Float(x)) => v.push(x),
            (Values::String(v), Scalar::String(x)) => v.push(x),
            _ => return false,
        }
        true
    }

    /// Переставляет элементы согласно `order` (новый i-й элемент = старый
    /// `order[i]`).
    pub fn permute(
        &self,
        order: &[usize],
    ) -> Values {
        fn pick<T: Copy>(
            v: &[T],
            order: &[usize],
        ) -> Vec<T> {
            order.iter().map(|&i| v[i]).collect()
        }

        match self {
            Values::Null(n) => Values::Null(*n),
            Values::Bool(v) => Values::Bool(pick(v, order)),
            Values::Int8(v) => Values::Int8(pick(v, order)),
            Values::Int16(v) => Values::Int16(pick(v, order)),
            Values::Int32(v) => Values::Int32(pick(v, order)),
            Values::Int64(v) => Values::Int64(pick(v, order)),
            Values::UInt8(v) => Values::UInt8(pick(v, order)),
            Values::UInt16(v) => Values::UInt16(pick(v, order)),
            Values::UInt32(v) => Values::UInt32(pick(v, order)),
            Values::UInt64(v) => Values::UInt64(pick(v, order)),
            Values::Float(v) => Values::Float(pick(v, order)),
            Values::String(v) => Values::String(pick(v, order)),
        }
    }

    /// Текстовое представление элементов массива; значения-стражи выводятся
    /// как `null`.
    pub fn render(&self) -> Vec<String> {
        self.render_with(true)
    }

    /// Текстовое представление фиксированных значений: у них нет стражей,
    /// `u8::MAX` или `i8::MIN` здесь настоящие данные.
    pub fn render_fixed(&self) -> Vec<String> {
        self.render_with(false)
    }

    fn render_with(
        &self,
        sentinels: bool,
    ) -> Vec<String> {
        fn show<T: Copy + PartialEq + ToString>(
            v: &[T],
            null: Option<T>,
        ) -> Vec<String> {
            v.iter()
                .map(|x| {
                    if Some(*x) == null {
                        "null".to_string()
                    } else {
                        x.to_string()
                    }
                })
                .collect()
        }

        fn null_of<T>(
            sentinels: bool,
            value: T,
        ) -> Option<T> {
            sentinels.then_some(value)
        }

        match self {
            Values::Null(n) => vec!["null".to_string(); *n],
            Values::Bool(v) => v
                .iter()
                .map(|b| match *b {
                    0 => "false".to_string(),
                    1 => "true".to_string(),
                    _ if sentinels => "null".to_string(),
                    other => other.to_string(),
                })
                .collect(),
            Values::Int8(v) => show(v, null_of(sentinels, i8::MIN)),
            Values::Int16(v) => show(v, null_of(sentinels, i16::MIN)),
            Values::Int32(v) => show(v, null_of(sentinels, i32::MIN)),
            Values::Int64(v) => show(v, null_of(sentinels, i64::MIN)),
            Values::UInt8(v) => show(v, null_of(sentinels, u8::MAX)),
            Values::UInt16(v) => show(v, null_of(sentinels, u16::MAX)),
            Values::UInt32(v) => show(v, null_of(sentinels, u32::MAX)),
            Values::UInt64(v) => show(v, null_of(sentinels, u64::MAX)),
            Values::Float(v) => v
                .iter()
                .map(|f| {
                    if sentinels && f.is_nan() {
                        "null".to_string()
                    } else {
                        f.to_string()
                    }
                })
                .collect(),
            Values::String(v) => show(v, null_of(sentinels, NULL_SID)),
        }
    }
}

impl PartialEq for Values {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        match (self, other) {
            (Values::Null(a), Values::Null(b)) => a == b,
            (Values::Bool(a), Values::Bool(b)) => a == b,
            (Values::Int8(a), Values::Int8(b)) => a == b,
            (Values::Int16(a), Values::Int16(b)) => a == b,
            (Values::Int32(a), Values::Int32(b)) => a == b,
            (Values::Int64(a), Values::Int64(b)) => a == b,
            (Values::UInt8(a), Values::UInt8(b)) => a == b,
            (Values::UInt16(a), Values::UInt16(b)) => a == b,
            (Values::UInt32(a), Values::UInt32(b)) => a == b,
            (Values::UInt64(a), Values::UInt64(b)) => a == b,
            // Побитовое сравнение: NaN-страж равен самому себе.
            (Values::Float(a), Values::Float(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Values::String(a), Values::String(b)) => a == b,
            _ => false,
        }
    }
}

/// Группа фиксированных свойств одного скалярного типа: `keys[i]` ↔
/// `values[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedGroup {
    pub keys: Vec<Sid>,
    pub values: Values,
}

/// Группа свойств-массивов одного скалярного типа.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayGroup {
    pub keys: Vec<Sid>,
    pub values: Vec<Values>,
}

/// Тип значений колонки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Scalar(ScalarType),
    Object,
}

/// Значения одной строки колонки.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Scalars(Values),
    Objects(Vec<DocObject>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Scalars(v) => v.len(),
            ColumnValues::Objects(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValues::Scalars(v) => ColumnType::Scalar(v.scalar_type()),
            ColumnValues::Objects(_) => ColumnType::Object,
        }
    }
}

/// Запись колонки: значения поля в строке `position`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEntry {
    pub position: u32,
    pub values: ColumnValues,
}

/// Колонка: одно поле (пара «ключ, тип») массива объектов.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: Sid,
    pub value_type: ColumnType,
    pub entries: Vec<ColumnEntry>,
}

/// Массив объектов под ключом `key` в колоночном виде.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGroup {
    pub key: Sid,
    pub num_objects: u32,
    pub columns: Vec<Column>,
}

/// Объект документа.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocObject {
    pub fixed: BTreeMap<ScalarType, FixedGroup>,
    pub arrays: BTreeMap<ScalarType, ArrayGroup>,
    pub objects: Vec<(Sid, DocObject)>,
    pub object_arrays: Vec<ColumnGroup>,
}

impl DocObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет фиксированное свойство в группу его типа.
    pub fn push_fixed(
        &mut self,
        key: Sid,
        value: Scalar,
    ) {
        let t = value.scalar_type();
        let group = self.fixed.entry(t).or_insert_with(|| FixedGroup {
            keys: Vec::new(),
            values: Values::empty(t),
        });
        group.keys.push(key);
        group.values.push(value);
    }

    /// Добавляет свойство-массив в группу типа `values`.
    pub fn push_array(
        &mut self,
        key: Sid,
        values: Values,
    ) {
        let group = self
            .arrays
            .entry(values.scalar_type())
            .or_insert_with(|| ArrayGroup {
                keys: Vec::new(),
                values: Vec::new(),
            });
        group.keys.push(key);
        group.values.push(values);
    }

    pub fn push_object(
        &mut self,
        key: Sid,
        object: DocObject,
    ) {
        self.objects.push((key, object));
    }

    pub fn push_object_array(
        &mut self,
        group: ColumnGroup,
    ) {
        self.object_arrays.push(group);
    }

    /// Нет ни одного свойства.
    pub fn is_empty(&self) -> bool {
        self.fixed.values().all(|g| g.keys.is_empty())
            && self.arrays.values().all(|g| g.keys.is_empty())
            && self.objects.is_empty()
            && self.object_arrays.is_empty()
    }

    /// Сортирует ключи каждой группы по их строковому значению (режим
    /// «оптимизировано для чтения»), рекурсивно.
    ///
    /// Группа, у которой число ключей не совпадает с числом значений,
    /// даёт `SizeMismatch`; модель при этом может остаться частично
    /// отсортированной.
    pub fn sort_props(
        &mut self,
        key_of: &dyn Fn(Sid) -> String,
    ) -> CarbonResult<()> {
        for group in self.fixed.values_mut() {
            ensure_group_len("fixed group", group.keys.len(), group.values.len())?;
            let order = sorted_order(&group.keys, key_of);
            group.keys = order.iter().map(|&i| group.keys[i]).collect();
            group.values = group.values.permute(&order);
        }
        for group in self.arrays.values_mut() {
            ensure_group_len("array group", group.keys.len(), group.values.len())?;
            let order = sorted_order(&group.keys, key_of);
            group.keys = order.iter().map(|&i| group.keys[i]).collect();
            group.values = order.iter().map(|&i| group.values[i].clone()).collect();
        }

        self.objects.sort_by_cached_key(|(k, _)| key_of(*k));
        for (_, obj) in self.objects.iter_mut() {
            obj.sort_props(key_of)?;
        }

        self.object_arrays.sort_by_cached_key(|g| key_of(g.key));
        for group in self.object_arrays.iter_mut() {
            group.columns.sort_by_cached_key(|c| key_of(c.key));
            for column in group.columns.iter_mut() {
                for entry in column.entries.iter_mut() {
                    if let ColumnValues::Objects(objs) = &mut entry.values {
                        for obj in objs.iter_mut() {
                            obj.sort_props(key_of)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn ensure_group_len(
    what: &str,
    keys: usize,
    values: usize,
) -> CarbonResult<()> {
    ensure!(
        keys == values,
        ArchiveError::SizeMismatch {
            what: format!("{what} values"),
            expected: keys as u64,
            got: values as u64,
        }
    );
    Ok(())
}

fn sorted_order(
    keys: &[Sid],
    key_of: &dyn Fn(Sid) -> String,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by_cached_key(|&i| key_of(keys[i]));
    order
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
