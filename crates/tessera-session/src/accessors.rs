//! Typed, non-converting attribute getters.
//!
//! Every getter returns `None` when the key is absent or when the stored kind
//! is not one the getter accepts. Integer getters widen narrower integer
//! kinds by value and never narrow; `get_float64` widens `F32`; slice getters
//! need the exact element kind. Nothing is ever parsed from text.

use crate::session::Session;
use crate::value::AttributeValue;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

impl Session {
    /// Text attribute.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.attribute(key)? {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 32-bit integer attribute. Accepts `U8`, `I8`, `I16` and `I32`.
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match *self.attribute(key)? {
            AttributeValue::U8(n) => Some(i32::from(n)),
            AttributeValue::I8(n) => Some(i32::from(n)),
            AttributeValue::I16(n) => Some(i32::from(n)),
            AttributeValue::I32(n) => Some(n),
            _ => None,
        }
    }

    /// 64-bit integer attribute. Accepts every integer kind.
    pub fn get_int64(&self, key: &str) -> Option<i64> {
        match *self.attribute(key)? {
            AttributeValue::U8(n) => Some(i64::from(n)),
            AttributeValue::I8(n) => Some(i64::from(n)),
            AttributeValue::I16(n) => Some(i64::from(n)),
            AttributeValue::I32(n) => Some(i64::from(n)),
            AttributeValue::I64(n) => Some(n),
            _ => None,
        }
    }

    /// Single-precision attribute. Only an exact `F32` matches.
    pub fn get_float32(&self, key: &str) -> Option<f32> {
        match *self.attribute(key)? {
            AttributeValue::F32(f) => Some(f),
            _ => None,
        }
    }

    /// Double-precision attribute. Accepts `F32` and `F64`.
    pub fn get_float64(&self, key: &str) -> Option<f64> {
        match *self.attribute(key)? {
            AttributeValue::F32(f) => Some(f64::from(f)),
            AttributeValue::F64(f) => Some(f),
            _ => None,
        }
    }

    /// Boolean attribute.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match *self.attribute(key)? {
            AttributeValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Timestamp attribute.
    pub fn get_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        match *self.attribute(key)? {
            AttributeValue::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Any sequence, whatever its element kind, with elements lifted into
    /// [`AttributeValue`]. Scalars and maps do not match.
    pub fn get_slice(&self, key: &str) -> Option<Vec<AttributeValue>> {
        self.attribute(key)?.to_elements()
    }

    /// `[]string` attribute.
    pub fn get_string_slice(&self, key: &str) -> Option<&[String]> {
        match self.attribute(key)? {
            AttributeValue::StringSlice(v) => Some(v),
            _ => None,
        }
    }

    /// `[]bool` attribute.
    pub fn get_bool_slice(&self, key: &str) -> Option<&[bool]> {
        match self.attribute(key)? {
            AttributeValue::BoolSlice(v) => Some(v),
            _ => None,
        }
    }

    /// `[]i32` attribute; an `I64Slice` never matches.
    pub fn get_int32_slice(&self, key: &str) -> Option<&[i32]> {
        match self.attribute(key)? {
            AttributeValue::I32Slice(v) => Some(v),
            _ => None,
        }
    }

    /// `[]i64` attribute; an `I32Slice` never matches.
    pub fn get_int64_slice(&self, key: &str) -> Option<&[i64]> {
        match self.attribute(key)? {
            AttributeValue::I64Slice(v) => Some(v),
            _ => None,
        }
    }

    /// `[]f32` attribute.
    pub fn get_float32_slice(&self, key: &str) -> Option<&[f32]> {
        match self.attribute(key)? {
            AttributeValue::F32Slice(v) => Some(v),
            _ => None,
        }
    }

    /// `[]f64` attribute; an `F32Slice` never matches.
    pub fn get_float64_slice(&self, key: &str) -> Option<&[f64]> {
        match self.attribute(key)? {
            AttributeValue::F64Slice(v) => Some(v),
            _ => None,
        }
    }

    /// `[]timestamp` attribute.
    pub fn get_timestamp_slice(&self, key: &str) -> Option<&[DateTime<Utc>]> {
        match self.attribute(key)? {
            AttributeValue::TimestampSlice(v) => Some(v),
            _ => None,
        }
    }

    /// Decodes a structured attribute into `T` through its untagged JSON
    /// form. Returns `None` when the key is absent or the shape does not fit.
    pub fn get_struct<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_struct_with(key, serde_json::from_value)
    }

    /// Like [`get_struct`](Self::get_struct), with a caller-supplied decoder
    /// for the untagged JSON form. A decoder error yields `None`.
    pub fn get_struct_with<T, E, F>(&self, key: &str, decode: F) -> Option<T>
    where
        F: FnOnce(serde_json::Value) -> Result<T, E>,
    {
        decode(self.attribute(key)?.to_json()).ok()
    }
}
