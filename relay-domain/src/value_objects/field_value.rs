// Field value object
// Dynamically typed scalar carried in an event's field map

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single field value of an event or the configured operand of a rule.
///
/// Equality is variant sensitive: `Decimal("100")` and `Integer(100)` are
/// different values. Use [`FieldValue::to_float`] or the `Display` text form
/// when a loose comparison is wanted.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    /// Number kept in the literal form it was received in.
    Decimal(String),
    Bool(bool),
    List(Vec<String>),
}

impl FieldValue {
    /// Converts a decoded webhook payload value.
    ///
    /// Numbers keep their literal text so no precision is lost to an early
    /// float conversion. Nested objects and mixed arrays are kept as compact
    /// JSON text; `null` has no field representation.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(flag) => Some(FieldValue::Bool(flag)),
            Value::Number(number) => Some(FieldValue::Decimal(number.to_string())),
            Value::String(text) => Some(FieldValue::Text(text)),
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    let list = items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::String(text) => Some(text),
                            _ => None,
                        })
                        .collect();
                    Some(FieldValue::List(list))
                } else {
                    Some(FieldValue::Text(Value::Array(items).to_string()))
                }
            }
            other @ Value::Object(_) => Some(FieldValue::Text(other.to_string())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Numeric view of the value, `None` when it has no numeric reading.
    pub fn to_float(&self) -> Option<f64> {
        match self {
            FieldValue::Text(text) => text.trim().parse().ok(),
            FieldValue::Integer(value) => Some(*value as f64),
            FieldValue::Float(value) => Some(*value),
            FieldValue::Decimal(literal) => literal.parse().ok(),
            FieldValue::Bool(_) | FieldValue::List(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Decimal(literal) => f.write_str(literal),
            FieldValue::Bool(flag) => write!(f, "{flag}"),
            FieldValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(text) => serializer.serialize_str(text),
            FieldValue::Integer(value) => serializer.serialize_i64(*value),
            FieldValue::Float(value) => serializer.serialize_f64(*value),
            FieldValue::Decimal(literal) => {
                if let Ok(value) = literal.parse::<i64>() {
                    serializer.serialize_i64(value)
                } else if let Ok(value) = literal.parse::<f64>() {
                    serializer.serialize_f64(value)
                } else {
                    serializer.serialize_str(literal)
                }
            }
            FieldValue::Bool(flag) => serializer.serialize_bool(*flag),
            FieldValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or list of strings")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<FieldValue, E> {
        Ok(FieldValue::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<FieldValue, E> {
        Ok(FieldValue::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<FieldValue, E> {
        match i64::try_from(value) {
            Ok(value) => Ok(FieldValue::Integer(value)),
            Err(_) => Ok(FieldValue::Float(value as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<FieldValue, E> {
        Ok(FieldValue::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(value))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FieldValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or_default());
        while let Some(item) = seq.next_element::<String>()? {
            items.push(item);
        }
        Ok(FieldValue::List(items))
    }
}
