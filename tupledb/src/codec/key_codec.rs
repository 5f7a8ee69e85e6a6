//! Deterministic conversion of typed column values into byte keys (§4.1).
//!
//! The backing engine sorts every sub-database by plain lexicographic byte
//! order (see `engine::KvEngine`) — there is no pluggable per-tree
//! comparator the way the original relies on. Every ordering trick below is
//! therefore baked directly into the encoded bytes rather than expressed as
//! a comparator function: obverse keys sort correctly under forward
//! `memcmp`, and reverse keys are constructed so that forward `memcmp`
//! reproduces the *reversed* semantic order (bit-complemented for
//! fixed-width numeric encodings, byte-sequence-reversed for raw/byte
//! string encodings — see the inline notes below for why the two need
//! different treatments).

use crate::codec::nil_sentinel::{
    F32_NIL_BITS, F64_NIL_BITS, I32_NIL_BIASED, I64_NIL_BIASED, U16_NIL_BIASED, U32_NIL_BIASED, U64_NIL_BIASED,
};
use crate::codec::{MAX_KEYLEN, PRESENT_MARKER};
use crate::error::{Error, TdResult};
use crate::shove::{ColumnType, IndexKind};
use crate::value::{Row, Value};
use byteorder::{BigEndian, ByteOrder};

/// The (index-kind, column-type) pair `row_to_key`/`composite_row_to_key`
/// need for one column; supplied by `schema::Schema` at call sites.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub kind: IndexKind,
    pub ty: ColumnType,
}

fn type_mismatch(kind_name: &str, ty: ColumnType) -> Error {
    Error::Type(format!("value of kind {} is not accepted by column type {:?}", kind_name, ty))
}

fn bias_signed32(v: i32) -> u32 {
    (v as u32) ^ 0x8000_0000
}
fn bias_signed64(v: i64) -> u64 {
    (v as u64) ^ 0x8000_0000_0000_0000
}
fn bias_float32(v: f32) -> u32 {
    let bits = v.to_bits();
    if bits & 0x8000_0000 != 0 { !bits } else { bits | 0x8000_0000 }
}
fn bias_float64(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & 0x8000_0000_0000_0000 != 0 { !bits } else { bits | 0x8000_0000_0000_0000 }
}
fn unbias_float32(biased: u32) -> f32 {
    if biased & 0x8000_0000 != 0 { f32::from_bits(biased & 0x7fff_ffff) } else { f32::from_bits(!biased) }
}
fn unbias_float64(biased: u64) -> f64 {
    if biased & 0x8000_0000_0000_0000 != 0 {
        f64::from_bits(biased & 0x7fff_ffff_ffff_ffff)
    } else {
        f64::from_bits(!biased)
    }
}

/// Bit-complements a fixed-width big-endian integer buffer in place; used
/// to invert ordering under forward `memcmp` for reverse numeric indexes.
fn complement_bytes(buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b = !*b;
    }
}

/// Encodes a numeric/datetime scalar into its biased big-endian form,
/// applying the column's reverse complement if requested. Returns the
/// sentinel encoding when `value` is `Value::Null` (checked by the caller
/// to be nullable).
fn encode_numeric(ty: ColumnType, value: &Value, reverse: bool) -> TdResult<Vec<u8>> {
    let mut buf = match (ty, value) {
        (ColumnType::Uint16, Value::Null) => U16_NIL_BIASED.to_be_bytes().to_vec(),
        (ColumnType::Uint16, Value::Uint16(v)) => v.to_be_bytes().to_vec(),
        (ColumnType::Uint16, other) => return Err(type_mismatch_value(other, ty)),

        (ColumnType::Uint32, Value::Null) => U32_NIL_BIASED.to_be_bytes().to_vec(),
        (ColumnType::Uint32, Value::Uint32(v)) => v.to_be_bytes().to_vec(),
        (ColumnType::Uint32, other) => return Err(type_mismatch_value(other, ty)),

        (ColumnType::Uint64, Value::Null) => U64_NIL_BIASED.to_be_bytes().to_vec(),
        (ColumnType::Uint64, Value::Uint64(v)) => v.to_be_bytes().to_vec(),
        (ColumnType::Uint64, other) => return Err(type_mismatch_value(other, ty)),

        (ColumnType::Int32, Value::Null) => I32_NIL_BIASED.to_be_bytes().to_vec(),
        (ColumnType::Int32, Value::Int32(v)) => bias_signed32(*v).to_be_bytes().to_vec(),
        (ColumnType::Int32, other) => return Err(type_mismatch_value(other, ty)),

        (ColumnType::Int64, Value::Null) => I64_NIL_BIASED.to_be_bytes().to_vec(),
        (ColumnType::Int64, Value::Int64(v)) => bias_signed64(*v).to_be_bytes().to_vec(),
        (ColumnType::Int64, other) => return Err(type_mismatch_value(other, ty)),

        (ColumnType::Float32, Value::Null) => F32_NIL_BITS.to_be_bytes().to_vec(),
        (ColumnType::Float32, Value::Float32(v)) => {
            if v.is_nan() {
                return Err(Error::Value("NaN is not an admissible float value".to_string()));
            }
            bias_float32(*v).to_be_bytes().to_vec()
        }
        (ColumnType::Float32, other) => return Err(type_mismatch_value(other, ty)),

        (ColumnType::Float64, Value::Null) => F64_NIL_BITS.to_be_bytes().to_vec(),
        (ColumnType::Float64, Value::Float64(v)) => {
            if v.is_nan() {
                return Err(Error::Value("NaN is not an admissible float value".to_string()));
            }
            bias_float64(*v).to_be_bytes().to_vec()
        }
        (ColumnType::Float64, other) => return Err(type_mismatch_value(other, ty)),

        (ColumnType::DateTime, Value::Null) => I64_NIL_BIASED.to_be_bytes().to_vec(),
        (ColumnType::DateTime, Value::DateTime(v)) => bias_signed64(*v).to_be_bytes().to_vec(),
        (ColumnType::DateTime, other) => return Err(type_mismatch_value(other, ty)),

        _ => return Err(Error::Type(format!("{:?} is not a numeric/datetime column type", ty))),
    };
    if reverse {
        complement_bytes(&mut buf);
    }
    Ok(buf)
}

fn type_mismatch_value(value: &Value, ty: ColumnType) -> Error {
    type_mismatch(&format!("{:?}", value.column_type()), ty)
}

fn fixed_blob_bytes(ty: ColumnType, value: &Value) -> TdResult<Vec<u8>> {
    match (ty, value) {
        (ColumnType::Fixed96, Value::Fixed96(b)) => Ok(b.to_vec()),
        (ColumnType::Fixed128, Value::Fixed128(b)) => Ok(b.to_vec()),
        (ColumnType::Fixed160, Value::Fixed160(b)) => Ok(b.to_vec()),
        (ColumnType::Fixed256, Value::Fixed256(b)) => Ok(b.to_vec()),
        (_, other) => Err(type_mismatch_value(other, ty)),
    }
}

/// Encodes the head/tail-hashed "shoved" form of an oversized ordered key,
/// or returns `raw` unchanged if it already fits within `MAX_KEYLEN`.
fn shove_if_oversized(raw: &[u8], reverse: bool) -> Vec<u8> {
    if raw.len() <= MAX_KEYLEN {
        return raw.to_vec();
    }
    log::debug!("shoving oversized key: {} bytes over MAX_KEYLEN={}", raw.len(), MAX_KEYLEN);
    let hasher = ahash::RandomState::with_seed(0x5bd1_e995);
    if !reverse {
        let head = &raw[..MAX_KEYLEN];
        let tail = &raw[MAX_KEYLEN..];
        let hash = hasher.hash_one(tail);
        let mut out = Vec::with_capacity(MAX_KEYLEN + 8);
        out.extend_from_slice(head);
        out.extend_from_slice(&hash.to_be_bytes());
        out
    } else {
        let split = raw.len() - MAX_KEYLEN;
        let head = &raw[..split];
        let tail = &raw[split..];
        let hash = hasher.hash_one(head);
        let mut out = Vec::with_capacity(8 + MAX_KEYLEN);
        out.extend_from_slice(&hash.to_be_bytes());
        out.extend_from_slice(tail);
        out
    }
}

/// Encodes a byte-string-like (`String`/`Opaque`) or fixed-binary value for
/// an ordered index: optional present-marker, then raw bytes, then (for
/// non-shoved reverse keys) a whole-buffer reversal so forward `memcmp`
/// reproduces `IndexOps`'s "last-to-first byte compare" reverse comparator.
fn encode_bytes_like(nullable: bool, reverse: bool, body: Option<Vec<u8>>) -> TdResult<Vec<u8>> {
    let raw = match body {
        None => {
            if !nullable {
                return Err(Error::Value("NIL not allowed for a non-nullable column".to_string()));
            }
            Vec::new()
        }
        Some(bytes) => {
            let mut v = Vec::with_capacity(bytes.len() + 1);
            if nullable {
                v.push(PRESENT_MARKER);
            }
            v.extend_from_slice(&bytes);
            v
        }
    };
    let shoved = raw.len() > MAX_KEYLEN;
    let mut out = shove_if_oversized(&raw, reverse);
    if reverse && !shoved {
        out.reverse();
    }
    Ok(out)
}

/// Encodes a single value for an ordered or unordered index (§4.1's
/// `value_to_key`).
pub fn value_to_key(kind: IndexKind, ty: ColumnType, value: &Value) -> TdResult<Vec<u8>> {
    if !kind.contains(IndexKind::ORDERED) {
        return encode_unordered(ty, value);
    }
    let reverse = kind.contains(IndexKind::REVERSE) && ty.allows_reverse();
    let nullable = kind.contains(IndexKind::NULLABLE);

    match ty {
        ColumnType::String => match value {
            Value::Null => encode_bytes_like(nullable, reverse, None),
            Value::String(s) => encode_bytes_like(nullable, reverse, Some(s.clone().into_bytes())),
            other => Err(type_mismatch_value(other, ty)),
        },
        ColumnType::Opaque => match value {
            Value::Null => encode_bytes_like(nullable, reverse, None),
            Value::Opaque(b) => encode_bytes_like(nullable, reverse, Some(b.clone())),
            other => Err(type_mismatch_value(other, ty)),
        },
        ColumnType::Fixed96 | ColumnType::Fixed128 | ColumnType::Fixed160 | ColumnType::Fixed256 => {
            match value {
                Value::Null => encode_bytes_like(nullable, reverse, None),
                other => encode_bytes_like(nullable, reverse, Some(fixed_blob_bytes(ty, other)?)),
            }
        }
        ColumnType::Uint16
        | ColumnType::Uint32
        | ColumnType::Uint64
        | ColumnType::Int32
        | ColumnType::Int64
        | ColumnType::Float32
        | ColumnType::Float64
        | ColumnType::DateTime => {
            if matches!(value, Value::Null) && !nullable {
                return Err(Error::Value("NIL not allowed for a non-nullable column".to_string()));
            }
            encode_numeric(ty, value, kind.contains(IndexKind::REVERSE))
        }
        ColumnType::Null | ColumnType::Nested => {
            Err(Error::Type(format!("{:?} has no direct key encoding", ty)))
        }
    }
}

/// Encodes a value for an unordered index: a single 64-bit hash, the
/// stand-in for the original's `t1ha`.
fn encode_unordered(ty: ColumnType, value: &Value) -> TdResult<Vec<u8>> {
    let bytes = match ty {
        ColumnType::String | ColumnType::Opaque | ColumnType::Fixed96 | ColumnType::Fixed128
        | ColumnType::Fixed160 | ColumnType::Fixed256 => encode_bytes_like(true, false, match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone().into_bytes()),
            Value::Opaque(b) => Some(b.clone()),
            other => Some(fixed_blob_bytes(ty, other)?),
        })?,
        _ => encode_numeric(ty, value, false)?,
    };
    let hash = ahash::RandomState::with_seed(0x5bd1_e995).hash_one(&bytes);
    Ok(hash.to_be_bytes().to_vec())
}

/// Decodes a key back into a typed value, where the encoding is injective
/// within `MAX_KEYLEN` (§4.1's `key_to_value`). Shoved keys decode to
/// `Value::Shoved`, carrying the raw bytes, never the original value.
pub fn key_to_value(kind: IndexKind, ty: ColumnType, key: &[u8]) -> TdResult<Value> {
    if !kind.contains(IndexKind::ORDERED) {
        return Err(Error::NoImp("unordered indexes do not support key_to_value"));
    }
    let reverse = kind.contains(IndexKind::REVERSE) && ty.allows_reverse();
    let nullable = kind.contains(IndexKind::NULLABLE);

    match ty {
        ColumnType::Uint16 | ColumnType::Uint32 | ColumnType::Uint64 | ColumnType::Int32
        | ColumnType::Int64 | ColumnType::Float32 | ColumnType::Float64 | ColumnType::DateTime => {
            decode_numeric(ty, key, reverse, nullable)
        }
        ColumnType::String | ColumnType::Opaque | ColumnType::Fixed96 | ColumnType::Fixed128
        | ColumnType::Fixed160 | ColumnType::Fixed256 => decode_bytes_like(ty, key, reverse, nullable),
        ColumnType::Null | ColumnType::Nested => {
            Err(Error::Type(format!("{:?} has no direct key decoding", ty)))
        }
    }
}

fn decode_numeric(ty: ColumnType, key: &[u8], reverse: bool, nullable: bool) -> TdResult<Value> {
    let width = ty.fixed_width().expect("numeric types are fixed-width");
    if key.len() != width {
        return Err(Error::IndexCorrupted(format!(
            "expected {}-byte key for {:?}, found {}",
            width,
            ty,
            key.len()
        )));
    }
    let mut buf = key.to_vec();
    if reverse {
        complement_bytes(&mut buf);
    }
    Ok(match ty {
        ColumnType::Uint16 => {
            let v = BigEndian::read_u16(&buf);
            if nullable && v == U16_NIL_BIASED {
                Value::Null
            } else {
                Value::Uint16(v)
            }
        }
        ColumnType::Uint32 => {
            let v = BigEndian::read_u32(&buf);
            if nullable && v == U32_NIL_BIASED {
                Value::Null
            } else {
                Value::Uint32(v)
            }
        }
        ColumnType::Uint64 => {
            let v = BigEndian::read_u64(&buf);
            if nullable && v == U64_NIL_BIASED {
                Value::Null
            } else {
                Value::Uint64(v)
            }
        }
        ColumnType::Int32 => {
            let biased = BigEndian::read_u32(&buf);
            if nullable && biased == I32_NIL_BIASED {
                Value::Null
            } else {
                Value::Int32((biased ^ 0x8000_0000) as i32)
            }
        }
        ColumnType::Int64 => {
            let biased = BigEndian::read_u64(&buf);
            if nullable && biased == I64_NIL_BIASED {
                Value::Null
            } else {
                Value::Int64((biased ^ 0x8000_0000_0000_0000) as i64)
            }
        }
        ColumnType::Float32 => {
            let biased = BigEndian::read_u32(&buf);
            if nullable && biased == F32_NIL_BITS {
                Value::Null
            } else {
                Value::Float32(unbias_float32(biased))
            }
        }
        ColumnType::Float64 => {
            let biased = BigEndian::read_u64(&buf);
            if nullable && biased == F64_NIL_BITS {
                Value::Null
            } else {
                Value::Float64(unbias_float64(biased))
            }
        }
        ColumnType::DateTime => {
            let biased = BigEndian::read_u64(&buf);
            if nullable && biased == I64_NIL_BIASED {
                Value::Null
            } else {
                Value::DateTime((biased ^ 0x8000_0000_0000_0000) as i64)
            }
        }
        _ => unreachable!(),
    })
}

fn decode_bytes_like(ty: ColumnType, key: &[u8], reverse: bool, nullable: bool) -> TdResult<Value> {
    if key.len() == MAX_KEYLEN + 8 {
        return Ok(Value::Shoved(key.to_vec()));
    }
    let mut buf = key.to_vec();
    if reverse {
        buf.reverse();
    }
    if buf.is_empty() {
        if !nullable {
            return Err(Error::IndexCorrupted("empty key for non-nullable column".to_string()));
        }
        return Ok(Value::Null);
    }
    let body = if nullable {
        if buf[0] != PRESENT_MARKER {
            return Err(Error::IndexCorrupted("missing present-marker on nullable key".to_string()));
        }
        &buf[1..]
    } else {
        &buf[..]
    };
    Ok(match ty {
        ColumnType::String => {
            Value::String(String::from_utf8(body.to_vec()).map_err(|e| Error::IndexCorrupted(e.to_string()))?)
        }
        ColumnType::Opaque => Value::Opaque(body.to_vec()),
        ColumnType::Fixed96 => Value::Fixed96(body.try_into().map_err(|_| len_mismatch(12, body.len()))?),
        ColumnType::Fixed128 => Value::Fixed128(body.try_into().map_err(|_| len_mismatch(16, body.len()))?),
        ColumnType::Fixed160 => Value::Fixed160(body.try_into().map_err(|_| len_mismatch(20, body.len()))?),
        ColumnType::Fixed256 => Value::Fixed256(body.try_into().map_err(|_| len_mismatch(32, body.len()))?),
        _ => unreachable!(),
    })
}

fn len_mismatch(expected: usize, found: usize) -> Error {
    Error::DataLenMismatch { expected, found }
}

/// Encodes the indexed field of `row` for column `column_idx` (§4.1's
/// `row_to_key`). `COLUMN_MISSING` is returned, not `NOTFOUND`, when a
/// non-nullable column's field is absent from the row.
pub fn row_to_key(columns: &[ColumnSpec], column_idx: usize, row: &Row) -> TdResult<Vec<u8>> {
    let spec = columns.get(column_idx).ok_or_else(|| Error::Inval("column index out of range".to_string()))?;
    let value = row.get_or_null(column_idx as u16);
    if value.is_null() && !spec.kind.contains(IndexKind::NULLABLE) {
        return Err(Error::ColumnMissing(format!("column {}", column_idx)));
    }
    value_to_key(spec.kind, spec.ty, value)
}

/// Encodes a composite index's key (§4.1's `composite_row_to_key`):
/// concatenates (obverse) or reverse-concatenates (reverse) the encoded
/// member values; for unordered composites, mixes each member into a
/// single accumulator instead (§F's `ahash`-based stand-in for `t1ha`).
pub fn composite_row_to_key(
    columns: &[ColumnSpec],
    members: &[u16],
    composite_kind: IndexKind,
    row: &Row,
) -> TdResult<Vec<u8>> {
    if !composite_kind.contains(IndexKind::ORDERED) {
        return composite_mix_unordered(columns, members, row);
    }
    let reverse = composite_kind.contains(IndexKind::REVERSE);
    let unique_nullable =
        composite_kind.contains(IndexKind::UNIQUE) && composite_kind.contains(IndexKind::NULLABLE);

    let order: Vec<u16> = if reverse { members.iter().rev().copied().collect() } else { members.to_vec() };

    let mut present_any = false;
    let mut parts = Vec::with_capacity(order.len());
    for &idx in &order {
        let spec = columns
            .get(idx as usize)
            .ok_or_else(|| Error::Inval("composite member index out of range".to_string()))?;
        let value = row.get_or_null(idx);
        if !value.is_null() {
            present_any = true;
        }
        parts.push((spec, value));
    }

    let mut out = Vec::new();
    for (spec, value) in parts {
        if value.is_null() {
            if unique_nullable && present_any {
                out.push(if reverse { !PRESENT_MARKER } else { PRESENT_MARKER });
                continue;
            }
        }
        out.extend_from_slice(&value_to_key(spec.kind, spec.ty, value)?);
    }
    Ok(out)
}

/// Absent members XOR-rotate-mix a reserved constant into the accumulator
/// rather than their (nonexistent) hash, per §4.1.
const COMPOSITE_ABSENT_MIX: u64 = 0xDEAD_BEEF_CAFE_F00D;

fn composite_mix_unordered(columns: &[ColumnSpec], members: &[u16], row: &Row) -> TdResult<Vec<u8>> {
    let order: Vec<u16> = members.to_vec();
    let mut acc: u64 = 0;
    for idx in order {
        let spec = columns
            .get(idx as usize)
            .ok_or_else(|| Error::Inval("composite member index out of range".to_string()))?;
        let value = row.get_or_null(idx);
        let shove_contrib = (idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        if value.is_null() {
            acc = (acc.rotate_left(13) ^ COMPOSITE_ABSENT_MIX).wrapping_add(shove_contrib);
        } else {
            let encoded = value_to_key(IndexKind::NULLABLE, spec.ty, value)?;
            let h = ahash::RandomState::with_seed(0x5bd1_e995).hash_one(&encoded);
            acc = ahash::RandomState::with_seed(0x5bd1_e995).hash_one((acc.wrapping_add(shove_contrib), h));
        }
    }
    Ok(acc.to_be_bytes().to_vec())
}
