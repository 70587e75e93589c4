//! Генераторы для property-based тестирования архивов.
//!
//! Документы строятся так, чтобы конвертер JSON → модель их принимал:
//! массивы однородны, а целые в массивах не задевают значения-стражи.

#![allow(dead_code)]

use std::ops::RangeInclusive;

use proptest::{collection::vec, prelude::*, string::string_regex};
use serde_json::{Map, Number, Value};

const SMALL_SIZE: RangeInclusive<usize> = 0..=6;

/// Ключи объектов: короткие, чтобы строки массивов чаще делили колонки.
pub fn key_strategy() -> impl Strategy<Value = String> {
    string_regex("[a-e]{1,3}").unwrap()
}

/// Строковые значения, включая пустую строку и не-ASCII.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        string_regex("[a-zA-Z0-9 ]{1,12}").unwrap(),
        string_regex("[а-яё]{1,8}").unwrap(),
    ]
}

fn float_value(f: f32) -> Value {
    Number::from_f64(f as f64).map_or(Value::Null, Value::Number)
}

/// Одиночное скалярное значение.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        prop_oneof![
            Just(0i64),
            Just(-1i64),
            Just(i64::MIN),
            Just(i64::MAX),
            any::<i64>(),
        ]
        .prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        (-1.0e6f32..1.0e6f32).prop_map(|f| float_value(f + 0.5)),
        text_strategy().prop_map(Value::String),
    ]
}

fn with_nulls<T>(
    item: impl Strategy<Value = T> + 'static,
    to_json: fn(T) -> Value,
) -> impl Strategy<Value = Value>
where
    T: std::fmt::Debug + Clone + 'static,
{
    vec(proptest::option::weighted(0.8, item), SMALL_SIZE).prop_map(move |items| {
        Value::Array(
            items
                .into_iter()
                .map(|x| x.map_or(Value::Null, to_json))
                .collect(),
        )
    })
}

fn bool_value(b: bool) -> Value {
    Value::Bool(b)
}

fn int_value(i: i64) -> Value {
    Value::from(i)
}

fn uint_value(u: u64) -> Value {
    Value::from(u)
}

fn quarter_float(f: f32) -> Value {
    float_value(f + 0.25)
}

fn string_value(s: String) -> Value {
    Value::String(s)
}

/// Однородный массив скаляров, возможно с `null`.
pub fn scalar_array_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        with_nulls(any::<bool>(), bool_value),
        with_nulls(-1000i64..1000, int_value),
        with_nulls(0u64..100_000, uint_value),
        with_nulls(-1.0e3f32..1.0e3f32, quarter_float),
        with_nulls(text_strategy(), string_value),
        vec(Just(Value::Null), SMALL_SIZE).prop_map(Value::Array),
    ]
}

/// Плоский объект из скаляров и массивов скаляров.
pub fn flat_object_strategy() -> impl Strategy<Value = Map<String, Value>> {
    vec(
        (
            key_strategy(),
            prop_oneof![3 => scalar_strategy(), 1 => scalar_array_strategy()],
        ),
        SMALL_SIZE,
    )
    .prop_map(|fields| fields.into_iter().collect())
}

/// Документ с вложенными объектами и массивами объектов.
///
/// Ключи вложенных свойств получают префиксы `o`/`r` и не пересекаются с
/// ключами плоской части.
pub fn document_strategy(depth: u32) -> impl Strategy<Value = Value> {
    let leaf = flat_object_strategy().prop_map(Value::Object);
    leaf.prop_recursive(depth, 64, 6, |inner| {
        (
            flat_object_strategy(),
            vec((key_strategy(), inner.clone()), 0..=2),
            vec((key_strategy(), vec(inner, 1..=3)), 0..=2),
        )
            .prop_map(|(mut base, objects, arrays)| {
                for (key, obj) in objects {
                    base.insert(format!("o{key}"), obj);
                }
                for (key, rows) in arrays {
                    base.insert(format!("r{key}"), Value::Array(rows));
                }
                Value::Object(base)
            })
    })
}

/// Корпус строк для упаковщиков. Байт 0x7F в корпус не попадает.
pub fn corpus_strategy() -> impl Strategy<Value = Vec<String>> {
    vec(
        prop_oneof![
            string_regex("[a-z]{0,16}").unwrap(),
            string_regex("[ -~]{1,24}").unwrap(),
            string_regex("[а-яё]{1,8}").unwrap(),
        ],
        1..=40,
    )
}
