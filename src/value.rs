//! Rust-side values that can cross into the interpreter and back.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::error::{BridgeError, Result};
use crate::proxy::Proxy;

/// A closure living on the Rust side. It can be stored in a [`Value`] but
/// never converted: the interpreter cannot call back into Rust.
pub type HostFunction = Rc<dyn Fn(&[Value]) -> Value>;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Map-like structure with arbitrary keys, in insertion order. This is
    /// the only shape a foreign `dict` is read back as.
    Map(Vec<(Value, Value)>),
    /// Plain keyed structure. Accepted going in, never produced coming out.
    Record(BTreeMap<String, Value>),
    /// An object already living in the interpreter.
    Object(Proxy),
    Function(HostFunction),
}

impl Value {
    /// Host "number" rule: integral values that fit in an `i64` become
    /// `Int` (by truncation), everything else stays `Float`.
    pub fn from_number(n: f64) -> Value {
        const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
        if n.is_finite() && n.fract() == 0.0 && (-LIMIT..LIMIT).contains(&n) {
            Value::Int(n as i64)
        } else {
            Value::Float(n)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Look up `key` in a `Map` (by value equality) or a `Record`.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match (self, key) {
            (Value::Map(pairs), _) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            (Value::Record(fields), Value::Str(name)) => fields.get(name),
            _ => None,
        }
    }

    /// Render as JSON. Interpreter objects, host functions and non-finite
    /// floats have no JSON form.
    pub fn to_json(&self) -> Result<Json> {
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| {
                    BridgeError::UnsupportedConversion(format!("{f} has no JSON form"))
                })?,
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Map(pairs) => {
                let mut object = serde_json::Map::with_capacity(pairs.len());
                for (key, value) in pairs {
                    object.insert(key.json_key()?, value.to_json()?);
                }
                Json::Object(object)
            }
            Value::Record(fields) => {
                let mut object = serde_json::Map::with_capacity(fields.len());
                for (key, value) in fields {
                    object.insert(key.clone(), value.to_json()?);
                }
                Json::Object(object)
            }
            Value::Object(proxy) => {
                return Err(BridgeError::UnsupportedConversion(format!(
                    "{} object has no JSON form",
                    proxy.handle().type_name()
                )))
            }
            Value::Function(_) => {
                return Err(BridgeError::UnsupportedConversion(
                    "host function has no JSON form".into(),
                ))
            }
        })
    }

    fn json_key(&self) -> Result<String> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
                Ok(self.to_json()?.to_string())
            }
            _ => Err(BridgeError::UnsupportedConversion(format!(
                "{self:?} cannot be a JSON object key"
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.handle() == b.handle(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(pairs) => f.debug_tuple("Map").field(pairs).finish(),
            Value::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            Value::Object(proxy) => f.debug_tuple("Object").field(proxy).finish(),
            Value::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Value::Record(fields)
    }
}

impl From<Proxy> for Value {
    fn from(proxy: Proxy) -> Self {
        Value::Object(proxy)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::from_number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_rule_splits_integral_values() {
        assert_eq!(Value::from_number(3.0), Value::Int(3));
        assert_eq!(Value::from_number(-0.0), Value::Int(0));
        assert_eq!(Value::from_number(2.5), Value::Float(2.5));
        assert_eq!(Value::from_number(1e19), Value::Float(1e19));
        assert!(matches!(Value::from_number(f64::NAN), Value::Float(f) if f.is_nan()));
    }

    #[test]
    fn json_objects_become_records() {
        let value = Value::from(json!({"x": 1, "y": [true, null, "s", 1.5]}));
        let Value::Record(fields) = &value else {
            panic!("expected a record, got {value:?}");
        };
        assert_eq!(fields["x"], Value::Int(1));
        assert_eq!(
            fields["y"],
            Value::List(vec![
                Value::Bool(true),
                Value::Null,
                Value::from("s"),
                Value::Float(1.5)
            ])
        );
        assert_eq!(value.get(&Value::from("x")), Some(&Value::Int(1)));
    }

    #[test]
    fn large_unsigned_json_numbers_degrade_to_float() {
        let value = Value::from(json!(u64::MAX));
        assert!(matches!(value, Value::Float(_)));
    }

    #[test]
    fn map_to_json_stringifies_scalar_keys() {
        let map = Value::Map(vec![
            (Value::Int(1), Value::from("one")),
            (Value::from("two"), Value::Int(2)),
            (Value::Bool(true), Value::Null),
        ]);
        assert_eq!(
            map.to_json().unwrap(),
            json!({"1": "one", "two": 2, "true": null})
        );

        let nested_key = Value::Map(vec![(Value::List(vec![]), Value::Null)]);
        assert!(matches!(
            nested_key.to_json(),
            Err(BridgeError::UnsupportedConversion(_))
        ));
    }

    #[test]
    fn functions_and_nan_have_no_json_form() {
        let f: HostFunction = Rc::new(|_| Value::Null);
        assert!(Value::Function(f).to_json().is_err());
        assert!(Value::Float(f64::INFINITY).to_json().is_err());
    }

    #[test]
    fn functions_compare_by_identity() {
        let f: HostFunction = Rc::new(|args| args.first().cloned().unwrap_or(Value::Null));
        let g: HostFunction = Rc::new(|_| Value::Null);
        assert_eq!(Value::Function(f.clone()), Value::Function(f.clone()));
        assert_ne!(Value::Function(f), Value::Function(g));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::from("a"));
    }
}
