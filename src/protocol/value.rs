//! Graph value union
//!
//! Values travel as thrift unions: exactly one field is set, and the field id
//! selects the variant. Vertex, edge, path and geography values are not decoded;
//! they are carried as their raw thrift struct bytes in [`Value::Opaque`].

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

/// Named query parameters
pub type ParameterMap = HashMap<String, Value>;

/// Union field ids
pub(crate) mod field {
    pub const NULL: i16 = 1;
    pub const BOOL: i16 = 2;
    pub const INT: i16 = 3;
    pub const FLOAT: i16 = 4;
    pub const STRING: i16 = 5;
    pub const DATE: i16 = 6;
    pub const TIME: i16 = 7;
    pub const DATETIME: i16 = 8;
    pub const VERTEX: i16 = 9;
    pub const EDGE: i16 = 10;
    pub const PATH: i16 = 11;
    pub const LIST: i16 = 12;
    pub const MAP: i16 = 13;
    pub const SET: i16 = 14;
    pub const DATASET: i16 = 15;
    pub const GEOGRAPHY: i16 = 16;
    pub const DURATION: i16 = 17;
}

/// Graph database value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No field set
    #[default]
    Empty,
    /// Null with a reason
    Null(NullType),
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Double
    Float(f64),
    /// Byte string
    String(Bytes),
    /// Calendar date
    Date {
        /// Year
        year: i16,
        /// Month (1-12)
        month: i8,
        /// Day (1-31)
        day: i8,
    },
    /// Time of day
    Time {
        /// Hour
        hour: i8,
        /// Minute
        minute: i8,
        /// Second
        sec: i8,
        /// Microsecond
        microsec: i32,
    },
    /// Date and time
    DateTime {
        /// Year
        year: i16,
        /// Month
        month: i8,
        /// Day
        day: i8,
        /// Hour
        hour: i8,
        /// Minute
        minute: i8,
        /// Second
        sec: i8,
        /// Microsecond
        microsec: i32,
    },
    /// Ordered list
    List(Vec<Value>),
    /// String-keyed map
    Map(BTreeMap<String, Value>),
    /// Set (kept in wire order)
    Set(Vec<Value>),
    /// Nested data set
    DataSet(DataSet),
    /// Duration
    Duration {
        /// Seconds
        seconds: i64,
        /// Microseconds
        microseconds: i32,
        /// Months
        months: i32,
    },
    /// Variant carried as raw thrift bytes (vertex, edge, path, geography)
    Opaque {
        /// Union field id
        field_id: i16,
        /// Encoded struct payload
        raw: Bytes,
    },
}

impl Value {
    /// Union field id of this variant, `None` for [`Value::Empty`]
    pub fn field_id(&self) -> Option<i16> {
        let id = match self {
            Value::Empty => return None,
            Value::Null(_) => field::NULL,
            Value::Bool(_) => field::BOOL,
            Value::Int(_) => field::INT,
            Value::Float(_) => field::FLOAT,
            Value::String(_) => field::STRING,
            Value::Date { .. } => field::DATE,
            Value::Time { .. } => field::TIME,
            Value::DateTime { .. } => field::DATETIME,
            Value::List(_) => field::LIST,
            Value::Map(_) => field::MAP,
            Value::Set(_) => field::SET,
            Value::DataSet(_) => field::DATASET,
            Value::Duration { .. } => field::DURATION,
            Value::Opaque { field_id, .. } => *field_id,
        };
        Some(id)
    }

    /// String contents, if this is a valid UTF-8 string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => std::str::from_utf8(s).ok(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Bytes::copy_from_slice(v.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Bytes::from(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Reason carried by a null value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NullType {
    /// Plain null
    #[default]
    Null,
    /// Not a number
    NaN,
    /// Corrupted data
    BadData,
    /// Type mismatch
    BadType,
    /// Arithmetic overflow
    Overflow,
    /// Unknown property
    UnknownProp,
    /// Division by zero
    DivByZero,
    /// Out of range
    OutOfRange,
    /// Unrecognized reason id
    Other(i32),
}

impl From<i32> for NullType {
    fn from(v: i32) -> Self {
        match v {
            0 => Self::Null,
            1 => Self::NaN,
            2 => Self::BadData,
            3 => Self::BadType,
            4 => Self::Overflow,
            5 => Self::UnknownProp,
            6 => Self::DivByZero,
            7 => Self::OutOfRange,
            other => Self::Other(other),
        }
    }
}

impl From<NullType> for i32 {
    fn from(v: NullType) -> Self {
        match v {
            NullType::Null => 0,
            NullType::NaN => 1,
            NullType::BadData => 2,
            NullType::BadType => 3,
            NullType::Overflow => 4,
            NullType::UnknownProp => 5,
            NullType::DivByZero => 6,
            NullType::OutOfRange => 7,
            NullType::Other(id) => id,
        }
    }
}

/// Tabular result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    /// Column names
    pub column_names: Vec<Bytes>,
    /// Rows, each with one value per column
    pub rows: Vec<Row>,
}

/// Result set row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(7i32), Value::Int(7));
        assert_eq!(Value::from("a").as_str(), Some("a"));
        assert_eq!(Value::from(true).field_id(), Some(field::BOOL));
        assert_eq!(Value::Empty.field_id(), None);
    }

    #[test]
    fn test_null_type_ids() {
        assert_eq!(NullType::from(6), NullType::DivByZero);
        assert_eq!(i32::from(NullType::from(42)), 42);
        assert_eq!(i32::from(NullType::default()), 0);
    }
}
