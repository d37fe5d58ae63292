//! Attribute maps and the flat key/value call convention.

use crate::value::AttributeValue;
use std::collections::HashMap;
use tessera_core::ParseError;

/// A session's attribute bag.
pub type Attributes = HashMap<String, AttributeValue>;

/// An ordered, flat `key, value, key, value, ...` list.
///
/// Keys must be [`AttributeValue::String`]. The list is validated by
/// [`parse_attributes`], so a malformed list is reported rather than silently
/// truncated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValues(Vec<AttributeValue>);

impl KeyValues {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already flattened list without checking it.
    pub fn flat(items: Vec<AttributeValue>) -> Self {
        Self(items)
    }

    /// Appends one key/value pair.
    pub fn pair(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.0.push(AttributeValue::String(key.into()));
        self.0.push(value.into());
        self
    }

    /// Appends a single element (key or value).
    pub fn push(&mut self, item: impl Into<AttributeValue>) {
        self.0.push(item.into());
    }

    /// Number of elements, keys and values counted separately.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the list holds nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<AttributeValue>> for KeyValues {
    fn from(items: Vec<AttributeValue>) -> Self {
        Self::flat(items)
    }
}

impl<K, V> FromIterator<(K, V)> for KeyValues
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(KeyValues::new(), |kv, (k, v)| kv.pair(k, v))
    }
}

/// Turns a flat key/value list into a map. Later duplicates win.
pub fn parse_attributes(args: &KeyValues) -> Result<Attributes, ParseError> {
    if args.len() % 2 != 0 {
        return Err(ParseError::OddArgumentCount { count: args.len() });
    }

    let mut data = Attributes::with_capacity(args.len() / 2);
    for (i, pair) in args.0.chunks_exact(2).enumerate() {
        let key = match &pair[0] {
            AttributeValue::String(key) => key.clone(),
            other => {
                return Err(ParseError::KeyType {
                    position: i * 2,
                    found: other.kind(),
                })
            }
        };
        data.insert(key, pair[1].clone());
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_parses_to_empty_map() {
        assert!(parse_attributes(&KeyValues::new()).unwrap().is_empty());
    }

    #[test]
    fn odd_counts_report_exact_count() {
        let single = KeyValues::flat(vec!["key".into()]);
        assert_eq!(
            parse_attributes(&single).unwrap_err(),
            ParseError::OddArgumentCount { count: 1 }
        );

        let three = KeyValues::flat(vec!["key1".into(), "value1".into(), "key2".into()]);
        assert_eq!(
            parse_attributes(&three).unwrap_err().to_string(),
            "expected even count of key and values, got: 3"
        );
    }

    #[test]
    fn non_string_key_is_rejected() {
        let kv = KeyValues::flat(vec![AttributeValue::I64(1), "value".into()]);
        assert_eq!(
            parse_attributes(&kv).unwrap_err(),
            ParseError::KeyType {
                position: 0,
                found: "i64"
            }
        );

        let mut kv = KeyValues::new().pair("ok", true).pair("fine", 2i32);
        kv.push(false);
        kv.push("v");
        assert_eq!(
            parse_attributes(&kv).unwrap_err(),
            ParseError::KeyType {
                position: 4,
                found: "bool"
            }
        );
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let kv = KeyValues::new()
            .pair("k1", "first")
            .pair("k2", 2i32)
            .pair("k1", "second");
        let data = parse_attributes(&kv).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["k1"], AttributeValue::from("second"));
        assert_eq!(data["k2"], AttributeValue::I32(2));
    }

    #[test]
    fn values_of_every_shape_are_accepted() {
        let kv: KeyValues = vec![
            ("s", AttributeValue::from("string value")),
            ("i", AttributeValue::from(1i64)),
            ("f", AttributeValue::from(1.0f64)),
            ("b", AttributeValue::from(true)),
            ("slice", AttributeValue::from(vec![1i64, 2])),
            ("map", AttributeValue::Map(Default::default())),
        ]
        .into_iter()
        .collect();

        let data = parse_attributes(&kv).unwrap();
        assert_eq!(data.len(), 6);
        assert_eq!(data["slice"], AttributeValue::I64Slice(vec![1, 2]));
    }
}
