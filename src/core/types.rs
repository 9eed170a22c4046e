use std::fmt;

use super::Value;

/// Positional wire representation of a record; element `i` matches format field `i`.
pub type Tuple = Vec<Value>;

/// Identity key of a record: the primary index values in part order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(Vec<Value>);

impl Key {
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    pub fn into_parts(self) -> Vec<Value> {
        self.0
    }

    /// The single part of a one-part key.
    pub fn scalar(&self) -> Option<&Value> {
        match self.0.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scalar() {
            Some(only) => write!(f, "{}", only),
            None => write!(f, "{}", Value::Array(self.0.clone())),
        }
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Self(vec![Value::Unsigned(value)])
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(vec![Value::from(value)])
    }
}

/// Arguments of a find/remove/create call.
///
/// Field order is kept: two calls naming the same fields in a different
/// order are different cache signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Params {
    Scalar(Value),
    List(Vec<Value>),
    Fields(Vec<(String, Value)>),
}

impl Params {
    /// Empty filter.
    pub fn all() -> Self {
        Self::Fields(Vec::new())
    }

    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Fields(vec![(field.into(), value.into())])
    }

    /// Adds a named value. Scalar and list params are returned unchanged.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Fields(fields) = &mut self {
            fields.push((field.into(), value.into()));
        }
        self
    }

    pub fn fields<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Fields(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::List(values) => values.is_empty(),
            Self::Fields(fields) => fields.is_empty(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Fields(fields) => fields.iter().find(|(name, _)| name == field).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<u64> for Params {
    fn from(value: u64) -> Self {
        Self::Scalar(Value::Unsigned(value))
    }
}

impl From<i64> for Params {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::Integer(value))
    }
}

impl From<&str> for Params {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<String> for Params {
    fn from(value: String) -> Self {
        Self::Scalar(Value::Text(value))
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::List(values)
    }
}

impl From<Key> for Params {
    fn from(key: Key) -> Self {
        let mut parts = key.into_parts();
        if parts.len() == 1 {
            Self::Scalar(parts.remove(0))
        } else {
            Self::List(parts)
        }
    }
}

impl From<&Key> for Params {
    fn from(key: &Key) -> Self {
        Self::from(key.clone())
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{}", value),
            Self::List(values) => write!(f, "{}", Value::Array(values.clone())),
            Self::Fields(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{:?}:{}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(Key::from(5u64).to_string(), "5");
        let composite = Key::new(vec![Value::Unsigned(1), Value::from("a")]);
        assert_eq!(composite.to_string(), r#"[1,"a"]"#);
    }

    #[test]
    fn test_params_display_keeps_order() {
        let params = Params::by("name", "a").and("id", 1u64);
        assert_eq!(params.to_string(), r#"{"name":"a","id":1}"#);
        assert_ne!(params, Params::by("id", 1u64).and("name", "a"));
    }

    #[test]
    fn test_params_emptiness() {
        assert!(Params::all().is_empty());
        assert!(Params::List(vec![]).is_empty());
        assert!(!Params::from(0u64).is_empty());
    }

    #[test]
    fn test_key_into_params() {
        assert_eq!(Params::from(Key::from(3u64)), Params::Scalar(Value::Unsigned(3)));
        let composite = Key::new(vec![Value::Unsigned(1), Value::Unsigned(2)]);
        assert_eq!(
            Params::from(composite),
            Params::List(vec![Value::Unsigned(1), Value::Unsigned(2)])
        );
    }
}
