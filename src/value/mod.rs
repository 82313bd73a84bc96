//! Value Module
//!
//! Typed column values and their byte codec.
//!
//! ## Encoding
//! ```text
//! ┌───────────┬───────────────────────────────────────┐
//! │ Null (1)  │ Body (absent when null)               │
//! └───────────┴───────────────────────────────────────┘
//! ```
//! Fixed-width bodies are big-endian. Varchar/varbinary bodies are a 4-byte
//! length followed by the bytes. Decimals are a sign byte followed by the
//! 16-byte unscaled magnitude.

mod codec;
mod decimal;

use std::fmt;

pub use codec::{decode, decode_tuple, encode, encode_tuple, MAX_VARLEN};
pub use decimal::{Decimal, MAX_INTEGER_DIGITS, MAX_SCALE, MAX_UNSCALED, SCALE_FACTOR};

/// Column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Varchar,
    Varbinary,
    Timestamp,
    Decimal,
    Boolean,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::TinyInt => "tinyint",
            ValueType::SmallInt => "smallint",
            ValueType::Integer => "integer",
            ValueType::BigInt => "bigint",
            ValueType::Double => "double",
            ValueType::Varchar => "varchar",
            ValueType::Varbinary => "varbinary",
            ValueType::Timestamp => "timestamp",
            ValueType::Decimal => "decimal",
            ValueType::Boolean => "boolean",
        }
    }
}

/// A typed column value. `Null` carries the column type it stands in for.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(ValueType),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Varchar(String),
    Varbinary(Vec<u8>),
    Timestamp(i64),
    Decimal(Decimal),
    Boolean(bool),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null(ty) => *ty,
            Value::TinyInt(_) => ValueType::TinyInt,
            Value::SmallInt(_) => ValueType::SmallInt,
            Value::Integer(_) => ValueType::Integer,
            Value::BigInt(_) => ValueType::BigInt,
            Value::Double(_) => ValueType::Double,
            Value::Varchar(_) => ValueType::Varchar,
            Value::Varbinary(_) => ValueType::Varbinary,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Decimal(_) => ValueType::Decimal,
            Value::Boolean(_) => ValueType::Boolean,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }
}

impl fmt::Display for Value {
    /// Debug-style rendering: `type::value`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "<NULL>");
        }
        write!(f, "{}::", self.value_type().name())?;
        match self {
            Value::Null(_) => Ok(()),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) | Value::Timestamp(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Varchar(s) => write!(f, "[{}]\"{}\"", s.len(), s),
            Value::Varbinary(b) => write!(f, "[{}]-bin", b.len()),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}
