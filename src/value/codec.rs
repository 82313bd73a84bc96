//! Value codec
//!
//! Encoding and decoding of single values and whole tuples.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{NvlogError, Result};

use super::{Decimal, Value, ValueType};

const NULL_MARKER: u8 = 1;
const PRESENT_MARKER: u8 = 0;

/// Maximum varchar/varbinary length (16 MB)
pub const MAX_VARLEN: usize = 16 * 1024 * 1024;

// =============================================================================
// Single Values
// =============================================================================

/// Encode a value to bytes. Variable-length values over `MAX_VARLEN`
/// are rejected, matching what `decode` accepts.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf)?;
    Ok(buf.to_vec())
}

/// Decode a value of the given type. The whole input must be consumed.
pub fn decode(bytes: &[u8], value_type: ValueType) -> Result<Value> {
    let mut input = bytes;
    let value = decode_from(&mut input, value_type)?;
    if input.has_remaining() {
        return Err(NvlogError::InvalidValue(format!(
            "{} trailing bytes after {} value",
            input.remaining(),
            value_type.name()
        )));
    }
    Ok(value)
}

// =============================================================================
// Tuples
// =============================================================================

/// Encode a row of values back to back
pub fn encode_tuple(values: &[Value]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    for value in values {
        encode_into(value, &mut buf)?;
    }
    Ok(buf.to_vec())
}

/// Decode a row given its schema
pub fn decode_tuple(bytes: &[u8], schema: &[ValueType]) -> Result<Vec<Value>> {
    let mut input = bytes;
    let mut values = Vec::with_capacity(schema.len());
    for &value_type in schema {
        values.push(decode_from(&mut input, value_type)?);
    }
    if input.has_remaining() {
        return Err(NvlogError::InvalidValue(format!(
            "{} trailing bytes after tuple",
            input.remaining()
        )));
    }
    Ok(values)
}

// =============================================================================
// Internals
// =============================================================================

fn encode_into(value: &Value, buf: &mut BytesMut) -> Result<()> {
    if value.is_null() {
        buf.put_u8(NULL_MARKER);
        return Ok(());
    }
    buf.put_u8(PRESENT_MARKER);

    match value {
        Value::Null(_) => {}
        Value::TinyInt(v) => buf.put_i8(*v),
        Value::SmallInt(v) => buf.put_i16(*v),
        Value::Integer(v) => buf.put_i32(*v),
        Value::BigInt(v) | Value::Timestamp(v) => buf.put_i64(*v),
        Value::Double(v) => buf.put_f64(*v),
        Value::Varchar(s) => {
            buf.put_u32(varlen(s.len(), ValueType::Varchar)?);
            buf.put_slice(s.as_bytes());
        }
        Value::Varbinary(b) => {
            buf.put_u32(varlen(b.len(), ValueType::Varbinary)?);
            buf.put_slice(b);
        }
        Value::Decimal(d) => {
            buf.put_u8(d.is_negative() as u8);
            buf.put_u128(d.magnitude());
        }
        Value::Boolean(b) => buf.put_u8(*b as u8),
    }
    Ok(())
}

fn varlen(len: usize, value_type: ValueType) -> Result<u32> {
    if len > MAX_VARLEN {
        return Err(NvlogError::InvalidValue(format!(
            "{} length {} exceeds maximum {}",
            value_type.name(),
            len,
            MAX_VARLEN
        )));
    }
    Ok(len as u32)
}

fn need(input: &[u8], len: usize, value_type: ValueType) -> Result<()> {
    if input.remaining() < len {
        return Err(NvlogError::InvalidValue(format!(
            "truncated {} value: need {} bytes, have {}",
            value_type.name(),
            len,
            input.remaining()
        )));
    }
    Ok(())
}

fn decode_from(input: &mut &[u8], value_type: ValueType) -> Result<Value> {
    need(input, 1, value_type)?;
    match input.get_u8() {
        NULL_MARKER => return Ok(Value::Null(value_type)),
        PRESENT_MARKER => {}
        other => {
            return Err(NvlogError::InvalidValue(format!(
                "bad null marker 0x{:02x}",
                other
            )))
        }
    }

    let value = match value_type {
        ValueType::TinyInt => {
            need(input, 1, value_type)?;
            Value::TinyInt(input.get_i8())
        }
        ValueType::SmallInt => {
            need(input, 2, value_type)?;
            Value::SmallInt(input.get_i16())
        }
        ValueType::Integer => {
            need(input, 4, value_type)?;
            Value::Integer(input.get_i32())
        }
        ValueType::BigInt => {
            need(input, 8, value_type)?;
            Value::BigInt(input.get_i64())
        }
        ValueType::Timestamp => {
            need(input, 8, value_type)?;
            Value::Timestamp(input.get_i64())
        }
        ValueType::Double => {
            need(input, 8, value_type)?;
            Value::Double(input.get_f64())
        }
        ValueType::Varchar => {
            let bytes = decode_varlen(input, value_type)?;
            let s = String::from_utf8(bytes)
                .map_err(|e| NvlogError::InvalidValue(format!("varchar is not UTF-8: {}", e)))?;
            Value::Varchar(s)
        }
        ValueType::Varbinary => Value::Varbinary(decode_varlen(input, value_type)?),
        ValueType::Decimal => {
            need(input, 17, value_type)?;
            let negative = match input.get_u8() {
                0 => false,
                1 => true,
                other => {
                    return Err(NvlogError::InvalidValue(format!(
                        "bad decimal sign byte 0x{:02x}",
                        other
                    )))
                }
            };
            Value::Decimal(Decimal::from_parts(negative, input.get_u128())?)
        }
        ValueType::Boolean => {
            need(input, 1, value_type)?;
            Value::Boolean(input.get_u8() != 0)
        }
    };
    Ok(value)
}

fn decode_varlen(input: &mut &[u8], value_type: ValueType) -> Result<Vec<u8>> {
    need(input, 4, value_type)?;
    let len = input.get_u32() as usize;
    if len > MAX_VARLEN {
        return Err(NvlogError::InvalidValue(format!(
            "{} length {} exceeds maximum {}",
            value_type.name(),
            len,
            MAX_VARLEN
        )));
    }
    need(input, len, value_type)?;
    let bytes = (*input)[..len].to_vec();
    input.advance(len);
    Ok(bytes)
}
