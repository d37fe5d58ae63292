//! The attribute value type.
//!
//! Attributes keep the exact kind they were stored with. Numeric kinds are
//! distinct variants so the typed getters can tell an `i32` from an `i64`,
//! and backends round-trip the tag so a value read back after persistence
//! has the kind it was written with.
//!
//! JSON has no literal for NaN or the infinities, so float variants write
//! them as the strings `"NaN"`, `"inf"` and `"-inf"` and read them back
//! from the same spellings.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single value in a session's attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Absent / JSON null.
    Null,
    /// UTF-8 text.
    String(String),
    /// Boolean flag.
    Bool(bool),
    /// Unsigned byte.
    U8(u8),
    /// 8-bit signed integer.
    I8(i8),
    /// 16-bit signed integer.
    I16(i16),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// Single-precision float.
    F32(#[serde(with = "float_text::single")] f32),
    /// Double-precision float.
    F64(#[serde(with = "float_text::double")] f64),
    /// UTC instant.
    Timestamp(DateTime<Utc>),
    /// Homogeneous list of strings.
    StringSlice(Vec<String>),
    /// Homogeneous list of booleans.
    BoolSlice(Vec<bool>),
    /// Homogeneous list of 32-bit integers.
    I32Slice(Vec<i32>),
    /// Homogeneous list of 64-bit integers.
    I64Slice(Vec<i64>),
    /// Homogeneous list of single-precision floats.
    F32Slice(#[serde(with = "float_text::single_seq")] Vec<f32>),
    /// Homogeneous list of double-precision floats.
    F64Slice(#[serde(with = "float_text::double_seq")] Vec<f64>),
    /// Homogeneous list of UTC instants.
    TimestampSlice(Vec<DateTime<Utc>>),
    /// Heterogeneous list.
    List(Vec<AttributeValue>),
    /// Nested string-keyed structure.
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Short name of the stored kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::String(_) => "string",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::U8(_) => "u8",
            AttributeValue::I8(_) => "i8",
            AttributeValue::I16(_) => "i16",
            AttributeValue::I32(_) => "i32",
            AttributeValue::I64(_) => "i64",
            AttributeValue::F32(_) => "f32",
            AttributeValue::F64(_) => "f64",
            AttributeValue::Timestamp(_) => "timestamp",
            AttributeValue::StringSlice(_) => "[]string",
            AttributeValue::BoolSlice(_) => "[]bool",
            AttributeValue::I32Slice(_) => "[]i32",
            AttributeValue::I64Slice(_) => "[]i64",
            AttributeValue::F32Slice(_) => "[]f32",
            AttributeValue::F64Slice(_) => "[]f64",
            AttributeValue::TimestampSlice(_) => "[]timestamp",
            AttributeValue::List(_) => "list",
            AttributeValue::Map(_) => "map",
        }
    }

    /// Returns `true` for every sequence kind, typed or not.
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            AttributeValue::StringSlice(_)
                | AttributeValue::BoolSlice(_)
                | AttributeValue::I32Slice(_)
                | AttributeValue::I64Slice(_)
                | AttributeValue::F32Slice(_)
                | AttributeValue::F64Slice(_)
                | AttributeValue::TimestampSlice(_)
                | AttributeValue::List(_)
        )
    }

    /// Lifts the elements of any sequence kind into `AttributeValue`s.
    pub fn to_elements(&self) -> Option<Vec<AttributeValue>> {
        fn lift<T: Clone + Into<AttributeValue>>(items: &[T]) -> Vec<AttributeValue> {
            items.iter().cloned().map(Into::into).collect()
        }

        match self {
            AttributeValue::StringSlice(v) => Some(lift(v)),
            AttributeValue::BoolSlice(v) => Some(lift(v)),
            AttributeValue::I32Slice(v) => Some(lift(v)),
            AttributeValue::I64Slice(v) => Some(lift(v)),
            AttributeValue::F32Slice(v) => Some(lift(v)),
            AttributeValue::F64Slice(v) => Some(lift(v)),
            AttributeValue::TimestampSlice(v) => Some(lift(v)),
            AttributeValue::List(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Plain JSON rendering without kind tags. Timestamps become RFC 3339
    /// strings; non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        fn float(f: f64) -> Value {
            serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
        }
        fn ts(t: &DateTime<Utc>) -> Value {
            Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }

        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::String(s) => Value::String(s.clone()),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::U8(n) => Value::from(*n),
            AttributeValue::I8(n) => Value::from(*n),
            AttributeValue::I16(n) => Value::from(*n),
            AttributeValue::I32(n) => Value::from(*n),
            AttributeValue::I64(n) => Value::from(*n),
            AttributeValue::F32(f) => float(f64::from(*f)),
            AttributeValue::F64(f) => float(*f),
            AttributeValue::Timestamp(t) => ts(t),
            AttributeValue::StringSlice(v) => Value::from(v.clone()),
            AttributeValue::BoolSlice(v) => Value::from(v.clone()),
            AttributeValue::I32Slice(v) => Value::from(v.clone()),
            AttributeValue::I64Slice(v) => Value::from(v.clone()),
            AttributeValue::F32Slice(v) => v.iter().map(|f| float(f64::from(*f))).collect(),
            AttributeValue::F64Slice(v) => v.iter().map(|f| float(*f)).collect(),
            AttributeValue::TimestampSlice(v) => v.iter().map(ts).collect(),
            AttributeValue::List(v) => v.iter().map(AttributeValue::to_json).collect(),
            AttributeValue::Map(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Builds a value from untagged JSON. Integers become `I64` (or `F64`
    /// when they do not fit), arrays become `List`, objects become `Map`.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::I64(i),
                None => AttributeValue::F64(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => AttributeValue::String(s),
            Value::Array(items) => {
                AttributeValue::List(items.into_iter().map(AttributeValue::from_json).collect())
            }
            Value::Object(map) => AttributeValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, AttributeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Stores an arbitrary serializable structure as a nested value.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(AttributeValue::from_json)
    }
}

/// Float encoding that survives JSON: finite values stay numbers, the
/// non-finite ones become fixed strings.
mod float_text {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    fn encode(f: f64) -> Repr {
        if f.is_nan() {
            Repr::Text("NaN".to_owned())
        } else if f.is_infinite() {
            Repr::Text(if f > 0.0 { "inf" } else { "-inf" }.to_owned())
        } else {
            Repr::Number(f)
        }
    }

    fn decode<E: serde::de::Error>(repr: Repr) -> Result<f64, E> {
        match repr {
            Repr::Number(f) => Ok(f),
            Repr::Text(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::custom(format!("invalid float literal {other:?}"))),
            },
        }
    }

    pub(super) mod double {
        use super::*;

        pub fn serialize<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
            encode(*v).serialize(s)
        }

        pub fn deserialize<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
            decode(Repr::deserialize(d)?)
        }
    }

    pub(super) mod single {
        use super::*;

        pub fn serialize<S: serde::Serializer>(v: &f32, s: S) -> Result<S::Ok, S::Error> {
            encode(f64::from(*v)).serialize(s)
        }

        pub fn deserialize<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
            decode(Repr::deserialize(d)?).map(|f: f64| f as f32)
        }
    }

    pub(super) mod double_seq {
        use super::*;

        pub fn serialize<S: serde::Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
            s.collect_seq(v.iter().map(|f| encode(*f)))
        }

        pub fn deserialize<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
            Vec::<Repr>::deserialize(d)?.into_iter().map(decode::<D::Error>).collect()
        }
    }

    pub(super) mod single_seq {
        use super::*;

        pub fn serialize<S: serde::Serializer>(v: &[f32], s: S) -> Result<S::Ok, S::Error> {
            s.collect_seq(v.iter().map(|f| encode(f64::from(*f))))
        }

        pub fn deserialize<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
            Vec::<Repr>::deserialize(d)?
                .into_iter()
                .map(|r| decode::<D::Error>(r).map(|f| f as f32))
                .collect()
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(v: $ty) -> Self {
                    AttributeValue::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    String => String,
    bool => Bool,
    u8 => U8,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    DateTime<Utc> => Timestamp,
    Vec<String> => StringSlice,
    Vec<bool> => BoolSlice,
    Vec<i32> => I32Slice,
    Vec<i64> => I64Slice,
    Vec<f32> => F32Slice,
    Vec<f64> => F64Slice,
    Vec<DateTime<Utc>> => TimestampSlice,
    Vec<AttributeValue> => List,
    BTreeMap<String, AttributeValue> => Map,
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_owned())
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(v: Vec<&str>) -> Self {
        AttributeValue::StringSlice(v.into_iter().map(str::to_owned).collect())
    }
}
