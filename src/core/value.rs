use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::{MapperError, Result};

/// A single field value as it travels between entities and tuples.
///
/// Equality is strict: `Unsigned(1)` and `Integer(1)` are different values,
/// which is what the diff engine relies on. Floats compare by bit pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Unsigned(u64),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Array(Vec<Value>),
}

/// Coarse classification used when positional data is matched to a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Numeric,
    Text,
    Boolean,
    Array,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unsigned(_) => "unsigned",
            Self::Integer(_) => "integer",
            Self::Float(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Text(_) => "string",
            Self::Array(_) => "array",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Unsigned(_) | Self::Integer(_) | Self::Float(_) => ValueKind::Numeric,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Text(_) => ValueKind::Text,
            Self::Array(_) => ValueKind::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(u) => Some(*u),
            Self::Integer(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Unsigned(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Unsigned(u) => Some(*u as f64),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Unsigned(a), Self::Unsigned(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => 0u8.hash(state),
            Self::Unsigned(u) => {
                1u8.hash(state);
                u.hash(state);
            }
            Self::Integer(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Self::Float(f) => {
                3u8.hash(state);
                f.to_bits().hash(state);
            }
            Self::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
            Self::Text(s) => {
                5u8.hash(state);
                s.hash(state);
            }
            Self::Array(items) => {
                6u8.hash(state);
                items.hash(state);
            }
        }
    }
}

// Rendered JSON-like so error messages show exactly what was asked for.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Unsigned(u) => write!(f, "{}", u),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::Unsigned(u)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Self::Unsigned(u as u64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// Field type as declared in a space format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Unsigned,
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Any,
}

impl DataType {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "unsigned" | "uint" | "num" => Ok(Self::Unsigned),
            "integer" | "int" => Ok(Self::Integer),
            "number" | "double" | "float" => Ok(Self::Number),
            "string" | "str" => Ok(Self::String),
            "boolean" | "bool" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            "*" | "any" | "scalar" => Ok(Self::Any),
            other => Err(MapperError::Parse(format!("Unknown field type '{}'", other))),
        }
    }

    /// Value used for a non-nullable field that has no declared default.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Unsigned => Value::Unsigned(0),
            Self::Integer => Value::Integer(0),
            Self::Number => Value::Float(0.0),
            Self::String => Value::Text(String::new()),
            Self::Boolean => Value::Boolean(false),
            Self::Array => Value::Array(Vec::new()),
            Self::Any => Value::Null,
        }
    }

    /// Converts `value` into this type's storage representation.
    ///
    /// `Null` always passes through. Only lossless conversions are accepted;
    /// applying `coerce` to its own output returns the same value.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let coerced = match (self, value) {
            (Self::Any, v) => Some(v.clone()),

            (Self::Unsigned, Value::Unsigned(u)) => Some(Value::Unsigned(*u)),
            (Self::Unsigned, Value::Integer(i)) => u64::try_from(*i).ok().map(Value::Unsigned),
            (Self::Unsigned, Value::Float(f)) => {
                (f.is_finite() && f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                    .then(|| Value::Unsigned(*f as u64))
            }
            (Self::Unsigned, Value::Boolean(b)) => Some(Value::Unsigned(*b as u64)),
            (Self::Unsigned, Value::Text(s)) => s.trim().parse::<u64>().ok().map(Value::Unsigned),

            (Self::Integer, Value::Integer(i)) => Some(Value::Integer(*i)),
            (Self::Integer, Value::Unsigned(u)) => i64::try_from(*u).ok().map(Value::Integer),
            (Self::Integer, Value::Float(f)) => {
                (f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .then(|| Value::Integer(*f as i64))
            }
            (Self::Integer, Value::Boolean(b)) => Some(Value::Integer(*b as i64)),
            (Self::Integer, Value::Text(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),

            (Self::Number, Value::Float(f)) => Some(Value::Float(*f)),
            (Self::Number, Value::Unsigned(u)) => Some(Value::Float(*u as f64)),
            (Self::Number, Value::Integer(i)) => Some(Value::Float(*i as f64)),
            (Self::Number, Value::Text(s)) => s.trim().parse::<f64>().ok().map(Value::Float),

            (Self::String, Value::Text(s)) => Some(Value::Text(s.clone())),
            (Self::String, Value::Unsigned(u)) => Some(Value::Text(u.to_string())),
            (Self::String, Value::Integer(i)) => Some(Value::Text(i.to_string())),
            (Self::String, Value::Float(f)) => Some(Value::Text(f.to_string())),
            (Self::String, Value::Boolean(b)) => Some(Value::Text(b.to_string())),

            (Self::Boolean, Value::Boolean(b)) => Some(Value::Boolean(*b)),
            (Self::Boolean, Value::Unsigned(u)) if *u <= 1 => Some(Value::Boolean(*u == 1)),
            (Self::Boolean, Value::Integer(i)) if *i == 0 || *i == 1 => {
                Some(Value::Boolean(*i == 1))
            }
            (Self::Boolean, Value::Text(s)) => match s.as_str() {
                "true" | "1" => Some(Value::Boolean(true)),
                "false" | "0" | "" => Some(Value::Boolean(false)),
                _ => None,
            },

            (Self::Array, Value::Array(items)) => Some(Value::Array(items.clone())),

            _ => None,
        };

        coerced.ok_or_else(|| {
            MapperError::TypeMismatch(format!(
                "cannot store {} {} as {}",
                value.type_name(),
                value,
                self
            ))
        })
    }

    /// Whether a value of this kind can only land in a field of this type
    /// when positional data is matched against a format.
    pub fn accepts_kind(&self, kind: ValueKind) -> bool {
        matches!(
            (self, kind),
            (Self::Unsigned, ValueKind::Numeric)
                | (Self::String, ValueKind::Text)
                | (Self::Any, ValueKind::Array)
        )
    }
}

impl TryFrom<String> for DataType {
    type Error = MapperError;

    fn try_from(name: String) -> Result<Self> {
        Self::parse(&name)
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned => write!(f, "unsigned"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Boolean => write!(f, "boolean"),
            Self::Array => write!(f, "array"),
            Self::Any => write!(f, "*"),
        }
    }
}
