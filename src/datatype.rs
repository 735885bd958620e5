// used for persistence
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

// used when serializing query results
use serde::Serialize;

// used to print out readable forms of a value
use std::fmt;
// used to indicate that values need to be hashable
use std::hash::{Hash, Hasher};
// used when listing atoms sorted on their value
use std::cmp::Ordering;

use crate::construct::EntityId;
use crate::error::{GraphiteError, Result};

/// The value position of an atom.
///
/// An `Integer` and a `Ref` carrying the same number are equal, so an entity
/// bound in the entity position of one clause joins with a plain number in
/// the value position of another. All other kinds only equal themselves.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    Ref(EntityId),
}

impl Value {
    pub const TEXT: u8 = 1;
    pub const INTEGER: u8 = 2;
    pub const FLOAT: u8 = 3;
    pub const BOOLEAN: u8 = 4;
    pub const BYTES: u8 = 5;
    pub const REF: u8 = 6;

    /// Tag persisted next to the raw value so its kind survives a round trip.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Text(_) => Self::TEXT,
            Value::Integer(_) => Self::INTEGER,
            Value::Float(_) => Self::FLOAT,
            Value::Boolean(_) => Self::BOOLEAN,
            Value::Bytes(_) => Self::BYTES,
            Value::Ref(_) => Self::REF,
        }
    }
    /// Tags of the stored values this value is equal to.
    pub fn matching_tags(&self) -> &'static [u8] {
        match self {
            Value::Text(_) => &[Self::TEXT],
            Value::Integer(_) | Value::Ref(_) => &[Self::INTEGER, Self::REF],
            Value::Float(_) => &[Self::FLOAT],
            Value::Boolean(_) => &[Self::BOOLEAN],
            Value::Bytes(_) => &[Self::BYTES],
        }
    }
    pub fn data_type(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Bytes(_) => "bytes",
            Value::Ref(_) => "ref",
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
    /// Reads the value as an entity id; only references and non-negative integers qualify.
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Value::Ref(e) => Some(*e),
            Value::Integer(i) => EntityId::try_from(*i).ok(),
            _ => None,
        }
    }
    fn integral(&self) -> Option<i128> {
        match self {
            Value::Integer(i) => Some(*i as i128),
            Value::Ref(e) => Some(*e as i128),
            _ => None,
        }
    }
    fn numeric(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Ref(e) => Some(*e as f64),
            Value::Float(f) => Some(*f),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
    /// Orders values the way SQLite orders a column of mixed storage classes:
    /// numbers first, then text, then blobs.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Text(_) => 1,
                Value::Bytes(_) => 2,
                _ => 0,
            }
        }
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => rank(self).cmp(&rank(other)),
            },
        }
    }
    /// Rebuilds a value from its persisted raw form and tag.
    pub fn from_sql(raw: SqlValue, tag: u8) -> Result<Value> {
        let value = match (tag, raw) {
            (Self::TEXT, SqlValue::Text(s)) => Value::Text(s),
            (Self::INTEGER, SqlValue::Integer(i)) => Value::Integer(i),
            (Self::FLOAT, SqlValue::Real(f)) => Value::Float(f),
            (Self::FLOAT, SqlValue::Integer(i)) => Value::Float(i as f64),
            (Self::BOOLEAN, SqlValue::Integer(i)) => Value::Boolean(i != 0),
            (Self::BYTES, SqlValue::Blob(b)) => Value::Bytes(b),
            (Self::REF, SqlValue::Integer(i)) => Value::Ref(EntityId::try_from(i).map_err(|_| {
                GraphiteError::Persistence(format!("negative entity reference {i}"))
            })?),
            (tag, raw) => {
                return Err(GraphiteError::Persistence(format!(
                    "stored value {raw:?} does not match value tag {tag}"
                )));
            }
        };
        Ok(value)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Integer(_) | Value::Ref(_), Value::Integer(_) | Value::Ref(_)) => {
                self.integral() == other.integral()
            }
            _ => false,
        }
    }
}
impl Eq for Value {}
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Text(s) => (Self::TEXT, s).hash(state),
            Value::Float(f) => (Self::FLOAT, f.to_bits()).hash(state),
            Value::Boolean(b) => (Self::BOOLEAN, b).hash(state),
            Value::Bytes(b) => (Self::BYTES, b).hash(state),
            Value::Integer(_) | Value::Ref(_) => (Self::INTEGER, self.integral()).hash(state),
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Bytes(b) => {
                write!(f, "#bytes ")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Ref(e) => write!(f, "#{}", e),
        }
    }
}
impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(x) => ToSqlOutput::Owned(SqlValue::Real(*x)),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Ref(e) => ToSqlOutput::Owned(SqlValue::Integer(
                i64::try_from(*e).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?,
            )),
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn integers_and_references_with_same_number_are_equal() {
        assert_eq!(Value::Integer(42), Value::Ref(42));
        assert_ne!(Value::Integer(-1), Value::Ref(u64::MAX));
        let mut set = HashSet::new();
        set.insert(Value::Ref(7));
        assert!(set.contains(&Value::Integer(7)));
    }

    #[test]
    fn kinds_do_not_mix() {
        assert_ne!(Value::Text("1985".into()), Value::Integer(1985));
        assert_ne!(Value::Boolean(true), Value::Integer(1));
        assert_ne!(Value::Float(1.0), Value::Integer(1));
    }

    #[test]
    fn sql_tags_restore_the_original_kind() {
        let restored = Value::from_sql(SqlValue::Integer(1), Value::BOOLEAN).expect("boolean");
        assert_eq!(restored, Value::Boolean(true));
        let restored = Value::from_sql(SqlValue::Integer(12), Value::REF).expect("ref");
        assert!(matches!(restored, Value::Ref(12)));
        assert!(Value::from_sql(SqlValue::Text("x".into()), Value::INTEGER).is_err());
    }
}
