use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A tagged-union value as it crosses the telemetry bus or configuration
/// file boundary.
///
/// Replaces the dynamic typing used for settings values and telemetry
/// entries in the original implementation (any Python value could be
/// published or read back) with a closed set of variants, per the
/// REDESIGN FLAG in spec §9. `Serialize`/`Deserialize` are implemented by
/// hand (rather than derived with an enum tag) so that on the wire a
/// `Value` looks like the plain scalar, list, or map it represents —
/// `10.0`, not `{"float": 10.0}` — which is what both a human-edited YAML
/// config file and a telemetry bus client expect.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    BoolArray(Vec<bool>),
    StringArray(Vec<String>),
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s),
            Value::IntArray(v) => v.serialize(serializer),
            Value::FloatArray(v) => v.serialize(serializer),
            Value::BoolArray(v) => v.serialize(serializer),
            Value::StringArray(v) => v.serialize(serializer),
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a bool, number, string, list, or map")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Int(v as i64))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(classify_array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::new();
        while let Some((k, v)) = map.next_entry::<String, Value>()? {
            entries.push((k, v));
        }
        Ok(Value::Map(entries))
    }
}

/// Picks the narrowest homogeneous array variant for a decoded sequence.
/// Falls back to stringifying elements if the sequence is not homogeneous
/// under one of the closed set of typed array variants.
fn classify_array(items: Vec<Value>) -> Value {
    if items.is_empty() {
        return Value::StringArray(Vec::new());
    }
    if items.iter().all(|v| matches!(v, Value::Bool(_))) {
        return Value::BoolArray(items.into_iter().map(|v| v.as_bool().unwrap()).collect());
    }
    if items.iter().all(|v| matches!(v, Value::Int(_))) {
        return Value::IntArray(items.into_iter().map(|v| v.as_int().unwrap()).collect());
    }
    if items.iter().all(|v| matches!(v, Value::Int(_) | Value::Float(_))) {
        return Value::FloatArray(items.iter().map(|v| v.as_f64().unwrap()).collect());
    }
    if items.iter().all(|v| matches!(v, Value::String(_))) {
        return Value::StringArray(
            items
                .into_iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect(),
        );
    }
    Value::StringArray(items.iter().map(|v| format!("{v:?}")).collect())
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_bool_like_strings() {
        assert_eq!(Value::String("on".into()).as_bool(), Some(true));
        assert_eq!(Value::String("0".into()).as_bool(), Some(false));
        assert_eq!(Value::String("nope".into()).as_bool(), None);
    }

    #[test]
    fn numeric_conversions_widen() {
        assert_eq!(Value::Int(4).as_f64(), Some(4.0));
        assert_eq!(Value::Float(4.9).as_int(), Some(4));
    }

    #[test]
    fn round_trips_through_json_as_plain_scalars() {
        let v = Value::Float(3.5);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "3.5");
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Float(3.5));
    }

    #[test]
    fn decodes_homogeneous_int_list() {
        let back: Value = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(back, Value::IntArray(vec![1, 2, 3]));
    }

    #[test]
    fn decodes_map_as_ordered_entries() {
        let back: Value = serde_json::from_str(r#"{"a": 1, "b": "two"}"#).unwrap();
        assert_eq!(
            back,
            Value::Map(vec![("a".into(), Value::Int(1)), ("b".into(), Value::String("two".into()))])
        );
    }
}
