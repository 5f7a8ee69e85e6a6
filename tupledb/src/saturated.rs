//! Saturated in-place numeric column updates (§4.8): `bottom`/`top` give a
//! column's admissible range (narrowed by one at the NIL end for nullable
//! columns), `confine` clamps a raw value into that range, and `add`/`sub`
//! saturate instead of wrapping or panicking. `cursor_inplace` wires these
//! into a cursor's fetch-modify-write cycle.

use crate::error::{Error, TdResult};
use crate::value::Value;

/// The admissible value range for a column, narrowed by one at the end
/// where that type's NIL sentinel sits when the column is nullable (see
/// `codec::nil_sentinel`). Signed/datetime columns bias their minimum to
/// the reserved pattern, so `bottom` narrows; unsigned columns reserve
/// their maximum instead, so `top` narrows and `bottom` is unaffected.
pub fn bottom(value: &Value, nullable: bool) -> Value {
    match value {
        Value::Uint16(_) => Value::Uint16(0),
        Value::Uint32(_) => Value::Uint32(0),
        Value::Uint64(_) => Value::Uint64(0),
        Value::Int32(_) => Value::Int32(if nullable { i32::MIN + 1 } else { i32::MIN }),
        Value::Int64(_) => Value::Int64(if nullable { i64::MIN + 1 } else { i64::MIN }),
        Value::Float32(_) => Value::Float32(f32::MIN),
        Value::Float64(_) => Value::Float64(f64::MIN),
        Value::DateTime(_) => Value::DateTime(if nullable { i64::MIN + 1 } else { i64::MIN }),
        other => other.clone(),
    }
}

pub fn top(value: &Value, nullable: bool) -> Value {
    match value {
        Value::Uint16(_) => Value::Uint16(if nullable { u16::MAX - 1 } else { u16::MAX }),
        Value::Uint32(_) => Value::Uint32(if nullable { u32::MAX - 1 } else { u32::MAX }),
        Value::Uint64(_) => Value::Uint64(if nullable { u64::MAX - 1 } else { u64::MAX }),
        Value::Int32(_) => Value::Int32(i32::MAX),
        Value::Int64(_) => Value::Int64(i64::MAX),
        Value::Float32(_) => Value::Float32(f32::MAX),
        Value::Float64(_) => Value::Float64(f64::MAX),
        Value::DateTime(_) => Value::DateTime(i64::MAX),
        other => other.clone(),
    }
}

/// Clamps `value` into `[bottom(nullable), top(nullable)]` for its type.
pub fn confine(value: Value, nullable: bool) -> Value {
    let lo = bottom(&value, nullable);
    let hi = top(&value, nullable);
    match (value, lo, hi) {
        (Value::Uint16(v), Value::Uint16(lo), Value::Uint16(hi)) => Value::Uint16(v.clamp(lo, hi)),
        (Value::Uint32(v), Value::Uint32(lo), Value::Uint32(hi)) => Value::Uint32(v.clamp(lo, hi)),
        (Value::Uint64(v), Value::Uint64(lo), Value::Uint64(hi)) => Value::Uint64(v.clamp(lo, hi)),
        (Value::Int32(v), Value::Int32(lo), Value::Int32(hi)) => Value::Int32(v.clamp(lo, hi)),
        (Value::Int64(v), Value::Int64(lo), Value::Int64(hi)) => Value::Int64(v.clamp(lo, hi)),
        (Value::Float32(v), Value::Float32(lo), Value::Float32(hi)) => Value::Float32(v.clamp(lo, hi)),
        (Value::Float64(v), Value::Float64(lo), Value::Float64(hi)) => Value::Float64(v.clamp(lo, hi)),
        (Value::DateTime(v), Value::DateTime(lo), Value::DateTime(hi)) => Value::DateTime(v.clamp(lo, hi)),
        (v, _, _) => v,
    }
}

/// Adds `delta` to `value`, saturating at the column's admissible bounds
/// rather than wrapping (integers) or producing infinities silently
/// (floats use native IEEE saturation, which already clamps to
/// `f32::MAX`/`f64::MAX` instead of overflowing to infinity for finite
/// inputs). Adding zero to an absent (`Null`) field is a no-op that leaves
/// the field absent rather than materializing a zero.
pub fn add(value: &Value, delta: &Value, nullable: bool) -> TdResult<Value> {
    if matches!(value, Value::Null) {
        return match delta {
            Value::Uint16(0) | Value::Uint32(0) | Value::Uint64(0) | Value::Int32(0) | Value::Int64(0) => Ok(Value::Null),
            _ => Err(Error::Inval("cannot add to an absent field".to_string())),
        };
    }
    let result = match (value, delta) {
        (Value::Uint16(a), Value::Uint16(b)) => Value::Uint16(a.saturating_add(*b)),
        (Value::Uint32(a), Value::Uint32(b)) => Value::Uint32(a.saturating_add(*b)),
        (Value::Uint64(a), Value::Uint64(b)) => Value::Uint64(a.saturating_add(*b)),
        (Value::Int32(a), Value::Int32(b)) => Value::Int32(a.saturating_add(*b)),
        (Value::Int64(a), Value::Int64(b)) => Value::Int64(a.saturating_add(*b)),
        (Value::Float32(a), Value::Float32(b)) => {
            reject_nan_f32(*a)?;
            reject_nan_f32(*b)?;
            Value::Float32(clamp_finite_f32(a + b))
        }
        (Value::Float64(a), Value::Float64(b)) => {
            reject_nan_f64(*a)?;
            reject_nan_f64(*b)?;
            Value::Float64(clamp_finite_f64(a + b))
        }
        (Value::DateTime(a), Value::DateTime(b)) => Value::DateTime(a.saturating_add(*b)),
        _ => return Err(Error::Type("value/delta type mismatch".to_string())),
    };
    Ok(confine(result, nullable))
}

pub fn sub(value: &Value, delta: &Value, nullable: bool) -> TdResult<Value> {
    if matches!(value, Value::Null) {
        return match delta {
            Value::Uint16(0) | Value::Uint32(0) | Value::Uint64(0) | Value::Int32(0) | Value::Int64(0) => Ok(Value::Null),
            _ => Err(Error::Inval("cannot subtract from an absent field".to_string())),
        };
    }
    let result = match (value, delta) {
        (Value::Uint16(a), Value::Uint16(b)) => Value::Uint16(a.saturating_sub(*b)),
        (Value::Uint32(a), Value::Uint32(b)) => Value::Uint32(a.saturating_sub(*b)),
        (Value::Uint64(a), Value::Uint64(b)) => Value::Uint64(a.saturating_sub(*b)),
        (Value::Int32(a), Value::Int32(b)) => Value::Int32(a.saturating_sub(*b)),
        (Value::Int64(a), Value::Int64(b)) => Value::Int64(a.saturating_sub(*b)),
        (Value::Float32(a), Value::Float32(b)) => {
            reject_nan_f32(*a)?;
            reject_nan_f32(*b)?;
            Value::Float32(clamp_finite_f32(a - b))
        }
        (Value::Float64(a), Value::Float64(b)) => {
            reject_nan_f64(*a)?;
            reject_nan_f64(*b)?;
            Value::Float64(clamp_finite_f64(a - b))
        }
        (Value::DateTime(a), Value::DateTime(b)) => Value::DateTime(a.saturating_sub(*b)),
        _ => return Err(Error::Type("value/delta type mismatch".to_string())),
    };
    Ok(confine(result, nullable))
}

/// Rejects a NaN operand unless it is exactly the published NIL bit
/// pattern (only ever produced internally by the codec, never a caller's
/// `f32::NAN` literal, whose payload is unspecified on most platforms) —
/// per the nullable-float inplace-op decision.
fn reject_nan_f32(v: f32) -> TdResult<()> {
    if v.is_nan() && v.to_bits() != crate::codec::nil_sentinel::F32_NIL_BITS {
        return Err(Error::Value("NaN is not a valid operand for an inplace float update".to_string()));
    }
    Ok(())
}

fn reject_nan_f64(v: f64) -> TdResult<()> {
    if v.is_nan() && v.to_bits() != crate::codec::nil_sentinel::F64_NIL_BITS {
        return Err(Error::Value("NaN is not a valid operand for an inplace float update".to_string()));
    }
    Ok(())
}

fn clamp_finite_f32(v: f32) -> f32 {
    if v.is_infinite() {
        v.signum() * f32::MAX
    } else {
        v
    }
}

fn clamp_finite_f64(v: f64) -> f64 {
    if v.is_infinite() {
        v.signum() * f64::MAX
    } else {
        v
    }
}

/// Fetch-modify-grow-validate-update cycle for a cursor-bound in-place
/// update (§4.8): `fetch` reads the current value, `modify` computes the
/// saturated result, and `write` persists it only if it differs.
pub fn cursor_inplace<F, M, W>(fetch: F, modify: M, write: W) -> TdResult<()>
where
    F: FnOnce() -> TdResult<Value>,
    M: FnOnce(Value) -> TdResult<Value>,
    W: FnOnce(Value) -> TdResult<()>,
{
    let current = fetch()?;
    let next = modify(current.clone())?;
    if next != current {
        write(next)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_saturates_at_top() {
        let v = Value::Uint16(u16::MAX - 1);
        let result = add(&v, &Value::Uint16(10), false).unwrap();
        assert_eq!(result, Value::Uint16(u16::MAX));
    }

    #[test]
    fn sub_saturates_at_zero_for_nullable_unsigned() {
        let v = Value::Uint32(2);
        let result = sub(&v, &Value::Uint32(10), true).unwrap();
        assert_eq!(result, Value::Uint32(0));
    }

    #[test]
    fn add_saturates_at_nullable_top_minus_one() {
        let v = Value::Uint16(65000);
        let result = add(&v, &Value::Uint16(1000), true).unwrap();
        assert_eq!(result, Value::Uint16(u16::MAX - 1));
    }

    #[test]
    fn adding_zero_to_absent_field_is_a_noop() {
        let result = add(&Value::Null, &Value::Uint32(0), false).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn adding_nonzero_to_absent_field_errors() {
        assert!(add(&Value::Null, &Value::Uint32(1), false).is_err());
    }

    #[test]
    fn nan_operand_is_rejected() {
        assert!(matches!(add(&Value::Float32(f32::NAN), &Value::Float32(1.0), false), Err(Error::Value(_))));
    }

    #[test]
    fn float_add_saturates_instead_of_producing_infinity() {
        let result = add(&Value::Float32(f32::MAX), &Value::Float32(f32::MAX), false).unwrap();
        assert_eq!(result, Value::Float32(f32::MAX));
    }

    #[test]
    fn cursor_inplace_skips_write_when_unchanged() {
        let mut wrote = false;
        cursor_inplace(
            || Ok(Value::Uint32(5)),
            |_| Ok(Value::Uint32(5)),
            |_| {
                wrote = true;
                Ok(())
            },
        )
        .unwrap();
        assert!(!wrote);
    }
}
