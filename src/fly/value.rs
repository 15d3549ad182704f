//! Runtime values held by Fly attributes.
//!
//! A [`Value`] is a tagged union over the five Fly value kinds. Every value
//! remembers where it was written so that later stages can point at it.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::TypeMismatch;

use super::position::Position;

/// The kind of a [`Value`], used in type diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// UTF-8 text.
    String,
    /// Double-precision number.
    Number,
    /// Boolean flag.
    Bool,
    /// Ordered sequence.
    List,
    /// Keyed mapping.
    Map,
}

impl ValueType {
    /// Lowercase name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    /// Text value.
    String(String),
    /// Numeric value; integers are stored as whole doubles.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Ordered list, duplicates allowed.
    List(Vec<Value>),
    /// Map from identifier keys to values.
    Map(BTreeMap<String, Value>),
}

/// A positioned Fly value.
///
/// Positions do not participate in equality: two values are equal when their
/// kinds and payloads are equal, recursively. Comparison is type-strict, so
/// `Number(1.0)` never equals `String("1")`.
#[derive(Debug, Clone)]
pub struct Value {
    /// Kind and payload.
    pub kind: ValueKind,
    /// Where the value starts in the source.
    pub position: Position,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Value {
    /// Creates a value from a kind and position.
    #[must_use]
    pub const fn new(kind: ValueKind, position: Position) -> Self {
        Self { kind, position }
    }

    /// Creates a string value.
    #[must_use]
    pub fn string(text: impl Into<String>, position: Position) -> Self {
        Self::new(ValueKind::String(text.into()), position)
    }

    /// Creates a number value.
    #[must_use]
    pub const fn number(number: f64, position: Position) -> Self {
        Self::new(ValueKind::Number(number), position)
    }

    /// Creates a boolean value.
    #[must_use]
    pub const fn bool(flag: bool, position: Position) -> Self {
        Self::new(ValueKind::Bool(flag), position)
    }

    /// Creates a list value.
    #[must_use]
    pub const fn list(items: Vec<Self>, position: Position) -> Self {
        Self::new(ValueKind::List(items), position)
    }

    /// Creates a map value.
    #[must_use]
    pub const fn map(entries: BTreeMap<String, Self>, position: Position) -> Self {
        Self::new(ValueKind::Map(entries), position)
    }

    /// Returns the kind tag of this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self.kind {
            ValueKind::String(_) => ValueType::String,
            ValueKind::Number(_) => ValueType::Number,
            ValueKind::Bool(_) => ValueType::Bool,
            ValueKind::List(_) => ValueType::List,
            ValueKind::Map(_) => ValueType::Map,
        }
    }

    /// Returns the text of a string value.
    ///
    /// # Errors
    ///
    /// Returns a [`TypeMismatch`] if the value is not a string.
    pub fn as_str(&self) -> Result<&str, TypeMismatch> {
        match &self.kind {
            ValueKind::String(s) => Ok(s),
            _ => Err(self.mismatch(ValueType::String)),
        }
    }

    /// Returns the payload of a number value.
    ///
    /// # Errors
    ///
    /// Returns a [`TypeMismatch`] if the value is not a number.
    pub fn as_number(&self) -> Result<f64, TypeMismatch> {
        match self.kind {
            ValueKind::Number(n) => Ok(n),
            _ => Err(self.mismatch(ValueType::Number)),
        }
    }

    /// Returns a number value truncated toward zero.
    ///
    /// # Errors
    ///
    /// Returns a [`TypeMismatch`] if the value is not a number.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_int(&self) -> Result<i64, TypeMismatch> {
        self.as_number().map(|n| n.trunc() as i64)
    }

    /// Returns the flag of a boolean value.
    ///
    /// # Errors
    ///
    /// Returns a [`TypeMismatch`] if the value is not a boolean.
    pub fn as_bool(&self) -> Result<bool, TypeMismatch> {
        match self.kind {
            ValueKind::Bool(b) => Ok(b),
            _ => Err(self.mismatch(ValueType::Bool)),
        }
    }

    /// Returns the items of a list value.
    ///
    /// # Errors
    ///
    /// Returns a [`TypeMismatch`] if the value is not a list.
    pub fn as_list(&self) -> Result<&[Self], TypeMismatch> {
        match &self.kind {
            ValueKind::List(items) => Ok(items),
            _ => Err(self.mismatch(ValueType::List)),
        }
    }

    /// Returns the entries of a map value.
    ///
    /// # Errors
    ///
    /// Returns a [`TypeMismatch`] if the value is not a map.
    pub fn as_map(&self) -> Result<&BTreeMap<String, Self>, TypeMismatch> {
        match &self.kind {
            ValueKind::Map(entries) => Ok(entries),
            _ => Err(self.mismatch(ValueType::Map)),
        }
    }

    fn mismatch(&self, expected: ValueType) -> TypeMismatch {
        TypeMismatch {
            expected,
            actual: self.value_type(),
            position: self.position.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::start_of("test.fly")
    }

    #[test]
    fn test_type_strict_equality() {
        assert_ne!(Value::number(1.0, pos()), Value::string("1", pos()));
        assert_eq!(
            Value::number(1.0, pos()),
            Value::number(1.0, Position::new("other.fly", 9, 9))
        );
    }

    #[test]
    fn test_int_truncates() {
        assert_eq!(Value::number(3.9, pos()).as_int().unwrap(), 3);
        assert_eq!(Value::number(-2.5, pos()).as_int().unwrap(), -2);
    }

    #[test]
    fn test_mismatch_message() {
        let value = Value::string("two", Position::new("egg.fly", 4, 11));
        let err = value.as_number().unwrap_err();
        assert_eq!(err.expected, ValueType::Number);
        assert_eq!(err.actual, ValueType::String);
        assert_eq!(err.to_string(), "expected number, got string at egg.fly:4:11");
    }

    #[test]
    fn test_nested_equality() {
        let mut left = BTreeMap::new();
        left.insert(
            String::from("tags"),
            Value::list(vec![Value::string("docker", pos())], pos()),
        );
        let right = left.clone();
        assert_eq!(Value::map(left, pos()), Value::map(right, pos()));
    }
}
