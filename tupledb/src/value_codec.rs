//! Minimal tag + payload encoding for `Value`, used only to persist a row's
//! non-indexed column data inside the primary table's value slot. This is
//! deliberately not the "tuple serialization library" named as an
//! out-of-scope collaborator (§1) — it exists solely so `table_ops` has
//! something concrete to store and read back in this crate's test suite and
//! examples.

use crate::error::{Error, TdResult};
use crate::value::Value;

const TAG_NULL: u8 = 0;
const TAG_U16: u8 = 1;
const TAG_U32: u8 = 2;
const TAG_U64: u8 = 3;
const TAG_I32: u8 = 4;
const TAG_I64: u8 = 5;
const TAG_F32: u8 = 6;
const TAG_F64: u8 = 7;
const TAG_DATETIME: u8 = 8;
const TAG_FIXED96: u8 = 9;
const TAG_FIXED128: u8 = 10;
const TAG_FIXED160: u8 = 11;
const TAG_FIXED256: u8 = 12;
const TAG_STRING: u8 = 13;
const TAG_OPAQUE: u8 = 14;
const TAG_SHOVED: u8 = 15;

pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Uint16(v) => {
            out.push(TAG_U16);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Uint32(v) => {
            out.push(TAG_U32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Uint64(v) => {
            out.push(TAG_U64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Int32(v) => {
            out.push(TAG_I32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Int64(v) => {
            out.push(TAG_I64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float32(v) => {
            out.push(TAG_F32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float64(v) => {
            out.push(TAG_F64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::DateTime(v) => {
            out.push(TAG_DATETIME);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Fixed96(v) => {
            out.push(TAG_FIXED96);
            out.extend_from_slice(v);
        }
        Value::Fixed128(v) => {
            out.push(TAG_FIXED128);
            out.extend_from_slice(v);
        }
        Value::Fixed160(v) => {
            out.push(TAG_FIXED160);
            out.extend_from_slice(v);
        }
        Value::Fixed256(v) => {
            out.push(TAG_FIXED256);
            out.extend_from_slice(v);
        }
        Value::String(v) => {
            out.push(TAG_STRING);
            out.extend_from_slice(v.as_bytes());
        }
        Value::Opaque(v) => {
            out.push(TAG_OPAQUE);
            out.extend_from_slice(v);
        }
        Value::Shoved(v) => {
            out.push(TAG_SHOVED);
            out.extend_from_slice(v);
        }
    }
    out
}

pub fn decode_value(bytes: &[u8]) -> TdResult<Value> {
    let (tag, rest) = bytes.split_first().ok_or_else(|| Error::Value("empty encoded value".to_string()))?;
    Ok(match *tag {
        TAG_NULL => Value::Null,
        TAG_U16 => Value::Uint16(u16::from_le_bytes(rest.try_into().map_err(|_| bad_len(2, rest.len()))?)),
        TAG_U32 => Value::Uint32(u32::from_le_bytes(rest.try_into().map_err(|_| bad_len(4, rest.len()))?)),
        TAG_U64 => Value::Uint64(u64::from_le_bytes(rest.try_into().map_err(|_| bad_len(8, rest.len()))?)),
        TAG_I32 => Value::Int32(i32::from_le_bytes(rest.try_into().map_err(|_| bad_len(4, rest.len()))?)),
        TAG_I64 => Value::Int64(i64::from_le_bytes(rest.try_into().map_err(|_| bad_len(8, rest.len()))?)),
        TAG_F32 => Value::Float32(f32::from_le_bytes(rest.try_into().map_err(|_| bad_len(4, rest.len()))?)),
        TAG_F64 => Value::Float64(f64::from_le_bytes(rest.try_into().map_err(|_| bad_len(8, rest.len()))?)),
        TAG_DATETIME => Value::DateTime(i64::from_le_bytes(rest.try_into().map_err(|_| bad_len(8, rest.len()))?)),
        TAG_FIXED96 => Value::Fixed96(rest.try_into().map_err(|_| bad_len(12, rest.len()))?),
        TAG_FIXED128 => Value::Fixed128(rest.try_into().map_err(|_| bad_len(16, rest.len()))?),
        TAG_FIXED160 => Value::Fixed160(rest.try_into().map_err(|_| bad_len(20, rest.len()))?),
        TAG_FIXED256 => Value::Fixed256(rest.try_into().map_err(|_| bad_len(32, rest.len()))?),
        TAG_STRING => Value::String(String::from_utf8(rest.to_vec()).map_err(|_| Error::Value("invalid utf8".to_string()))?),
        TAG_OPAQUE => Value::Opaque(rest.to_vec()),
        TAG_SHOVED => Value::Shoved(rest.to_vec()),
        other => return Err(Error::Value(format!("unknown value tag {}", other))),
    })
}

fn bad_len(expected: usize, found: usize) -> Error {
    Error::DataLenMismatch { expected, found }
}
