//! Построение модели документа из JSON с транспонированием массивов
//! объектов в колонки.

use carbon_error::CarbonResult;
use rustc_hash::FxHashMap;
use serde_json::{Map, Number, Value};
use tracing::warn;

use super::{
    Column, ColumnEntry, ColumnGroup, ColumnType, ColumnValues, DocObject, Scalar, ScalarType,
    Sid, StringDict, Values, NULL_BOOL, NULL_SID,
};
use crate::error::ModelError;

/// Разбирает JSON-текст и строит модель документа.
pub fn object_from_json_str(
    json: &str,
    dict: &mut dyn StringDict,
) -> CarbonResult<DocObject> {
    let value: Value = serde_json::from_str(json).map_err(ModelError::from)?;
    object_from_json(&value, dict)
}

/// Строит модель документа из уже разобранного JSON. Корень обязан быть
/// объектом.
pub fn object_from_json(
    value: &Value,
    dict: &mut dyn StringDict,
) -> CarbonResult<DocObject> {
    match value {
        Value::Object(map) => convert_object(map, dict),
        _ => {
            warn!("rejecting JSON document: root is not an object");
            Err(ModelError::RootNotObject.into())
        }
    }
}

fn convert_object(
    map: &Map<String, Value>,
    dict: &mut dyn StringDict,
) -> CarbonResult<DocObject> {
    let mut obj = DocObject::new();

    for (key, value) in map {
        let sid = dict.intern(key);
        match value {
            Value::Null => obj.push_fixed(sid, Scalar::Null),
            Value::Bool(b) => obj.push_fixed(sid, Scalar::Bool(*b)),
            Value::Number(n) => obj.push_fixed(sid, fixed_number(n)),
            Value::String(s) => {
                let value_sid = dict.intern(s);
                obj.push_fixed(sid, Scalar::String(value_sid));
            }
            Value::Object(inner) => obj.push_object(sid, convert_object(inner, dict)?),
            Value::Array(items) => match classify_array(key, items, dict)? {
                ArrayShape::Scalars(values) => obj.push_array(sid, values),
                ArrayShape::Objects(rows) => {
                    let group = transpose(sid, key, &rows, dict)?;
                    obj.push_object_array(group);
                }
            },
        }
    }

    Ok(obj)
}

/// Фиксированное число: самый узкий тип, вмещающий значение целиком.
fn fixed_number(n: &Number) -> Scalar {
    if let Some(u) = n.as_u64() {
        if let Ok(v) = u8::try_from(u) {
            Scalar::UInt8(v)
        } else if let Ok(v) = u16::try_from(u) {
            Scalar::UInt16(v)
        } else if let Ok(v) = u32::try_from(u) {
            Scalar::UInt32(v)
        } else {
            Scalar::UInt64(u)
        }
    } else if let Some(i) = n.as_i64() {
        if let Ok(v) = i8::try_from(i) {
            Scalar::Int8(v)
        } else if let Ok(v) = i16::try_from(i) {
            Scalar::Int16(v)
        } else if let Ok(v) = i32::try_from(i) {
            Scalar::Int32(v)
        } else {
            Scalar::Int64(i)
        }
    } else {
        Scalar::Float(n.as_f64().unwrap_or(f64::NAN) as f32)
    }
}

enum ArrayShape<'a> {
    Scalars(Values),
    Objects(Vec<&'a Map<String, Value>>),
}

fn classify_array<'a>(
    key: &str,
    items: &'a [Value],
    dict: &mut dyn StringDict,
) -> CarbonResult<ArrayShape<'a>> {
    if items.iter().any(Value::is_array) {
        warn!(key, "rejecting array of arrays");
        return Err(ModelError::ArrayOfArrays {
            key: key.to_string(),
        }
        .into());
    }

    if items.iter().any(Value::is_object) {
        let rows: Vec<&Map<String, Value>> = items.iter().filter_map(Value::as_object).collect();
        if rows.len() != items.len() {
            warn!(key, "rejecting array mixing objects and scalars");
            return Err(ModelError::MixedTypes {
                key: key.to_string(),
            }
            .into());
        }
        return Ok(ArrayShape::Objects(rows));
    }

    Ok(ArrayShape::Scalars(typed_values(key, items, dict)?))
}

/// Строит типизированный вектор из скаляров (с примесью `null`).
///
/// Тип выбирается так, чтобы настоящие значения не совпадали со
/// значением-стражем `null` этого типа.
fn typed_values(
    key: &str,
    items: &[Value],
    dict: &mut dyn StringDict,
) -> CarbonResult<Values> {
    let has_bool = items.iter().any(Value::is_boolean);
    let has_string = items.iter().any(Value::is_string);
    let has_number = items.iter().any(Value::is_number);

    if [has_bool, has_string, has_number]
        .iter()
        .filter(|b| **b)
        .count()
        > 1
    {
        warn!(key, "rejecting array with mixed element types");
        return Err(ModelError::MixedTypes {
            key: key.to_string(),
        }
        .into());
    }

    if has_bool {
        let v = items
            .iter()
            .map(|x| x.as_bool().map(|b| b as u8).unwrap_or(NULL_BOOL))
            .collect();
        return Ok(Values::Bool(v));
    }

    if has_string {
        let v = items
            .iter()
            .map(|x| match x.as_str() {
                Some(s) => dict.intern(s),
                None => NULL_SID,
            })
            .collect();
        return Ok(Values::String(v));
    }

    if has_number {
        return number_values(key, items);
    }

    Ok(Values::Null(items.len()))
}

fn number_values(
    key: &str,
    items: &[Value],
) -> CarbonResult<Values> {
    let numbers: Vec<Option<&Number>> = items
        .iter()
        .map(|x| match x {
            Value::Number(n) => Some(n),
            _ => None,
        })
        .collect();

    let is_float = numbers
        .iter()
        .flatten()
        .any(|n| n.as_i64().is_none() && n.as_u64().is_none());
    if is_float {
        let v = numbers
            .iter()
            .map(|n| match n {
                Some(n) => n.as_f64().unwrap_or(f64::NAN) as f32,
                None => f32::NAN,
            })
            .collect();
        return Ok(Values::Float(v));
    }

    let ints: Vec<Option<i128>> = numbers
        .iter()
        .map(|n| {
            n.and_then(|n| {
                n.as_i64()
                    .map(i128::from)
                    .or_else(|| n.as_u64().map(i128::from))
            })
        })
        .collect();
    let min = ints.iter().flatten().copied().min().unwrap_or(0);
    let max = ints.iter().flatten().copied().max().unwrap_or(0);

    let Some(t) = strict_int_type(min, max) else {
        warn!(key, min = %min, max = %max, "integer array collides with null sentinel");
        return Err(ModelError::Unrepresentable {
            key: key.to_string(),
            reason: format!("no integer type holds [{min}, {max}] without its null sentinel"),
        }
        .into());
    };

    // Диапазон проверен strict_int_type, касты без потерь.
    let values = match t {
        ScalarType::Int8 => {
            Values::Int8(ints.iter().map(|x| x.map_or(i8::MIN, |v| v as i8)).collect())
        }
        ScalarType::Int16 => {
            Values::Int16(ints.iter().map(|x| x.map_or(i16::MIN, |v| v as i16)).collect())
        }
        ScalarType::Int32 => {
            Values::Int32(ints.iter().map(|x| x.map_or(i32::MIN, |v| v as i32)).collect())
        }
        ScalarType::Int64 => {
            Values::Int64(ints.iter().map(|x| x.map_or(i64::MIN, |v| v as i64)).collect())
        }
        ScalarType::UInt8 => {
            Values::UInt8(ints.iter().map(|x| x.map_or(u8::MAX, |v| v as u8)).collect())
        }
        ScalarType::UInt16 => {
            Values::UInt16(ints.iter().map(|x| x.map_or(u16::MAX, |v| v as u16)).collect())
        }
        ScalarType::UInt32 => {
            Values::UInt32(ints.iter().map(|x| x.map_or(u32::MAX, |v| v as u32)).collect())
        }
        _ => Values::UInt64(ints.iter().map(|x| x.map_or(u64::MAX, |v| v as u64)).collect()),
    };
    Ok(values)
}

/// Самый узкий целочисленный тип, в котором `[min, max]` не задевает
/// значение-страж.
fn strict_int_type(
    min: i128,
    max: i128,
) -> Option<ScalarType> {
    if min < 0 {
        [
            (ScalarType::Int8, i8::MIN as i128, i8::MAX as i128),
            (ScalarType::Int16, i16::MIN as i128, i16::MAX as i128),
            (ScalarType::Int32, i32::MIN as i128, i32::MAX as i128),
            (ScalarType::Int64, i64::MIN as i128, i64::MAX as i128),
        ]
        .into_iter()
        .find(|(_, lo, hi)| min > *lo && max <= *hi)
        .map(|(t, _, _)| t)
    } else {
        [
            (ScalarType::UInt8, u8::MAX as i128),
            (ScalarType::UInt16, u16::MAX as i128),
            (ScalarType::UInt32, u32::MAX as i128),
            (ScalarType::UInt64, u64::MAX as i128),
        ]
        .into_iter()
        .find(|(_, hi)| max < *hi)
        .map(|(t, _)| t)
    }
}

/// Транспонирует массив объектов: по колонке на каждую пару (поле, тип).
fn transpose(
    sid: Sid,
    key: &str,
    rows: &[&Map<String, Value>],
    dict: &mut dyn StringDict,
) -> CarbonResult<ColumnGroup> {
    let num_objects = u32::try_from(rows.len()).map_err(|_| ModelError::Unrepresentable {
        key: key.to_string(),
        reason: format!("{} objects in one array", rows.len()),
    })?;

    let mut columns: Vec<Column> = Vec::new();
    let mut by_identity: FxHashMap<(Sid, ColumnType), usize> = FxHashMap::default();

    for (position, row) in rows.iter().enumerate() {
        for (field, value) in row.iter() {
            let field_sid = dict.intern(field);
            let values = match value {
                Value::Object(inner) => {
                    ColumnValues::Objects(vec![convert_object(inner, dict)?])
                }
                Value::Array(items) => match classify_array(field, items, dict)? {
                    ArrayShape::Scalars(values) => ColumnValues::Scalars(values),
                    ArrayShape::Objects(objs) => ColumnValues::Objects(
                        objs.iter()
                            .map(|m| convert_object(m, dict))
                            .collect::<CarbonResult<Vec<_>>>()?,
                    ),
                },
                scalar => ColumnValues::Scalars(typed_values(
                    field,
                    std::slice::from_ref(scalar),
                    dict,
                )?),
            };

            let identity = (field_sid, values.column_type());
            let idx = *by_identity.entry(identity).or_insert_with(|| {
                columns.push(Column {
                    key: field_sid,
                    value_type: identity.1,
                    entries: Vec::new(),
                });
                columns.len() - 1
            });
            columns[idx].entries.push(ColumnEntry {
                position: position as u32,
                values,
            });
        }
    }

    Ok(ColumnGroup {
        key: sid,
        num_objects,
        columns,
    })
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
