//! Tagged filter expression tree for cursor range scans (§4.7). Evaluated
//! directly against a decoded `Row`, short-circuiting `And`/`Or`.

use crate::value::{Row, Value};
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

type RowFn = Arc<dyn Fn(&Row) -> bool + Send + Sync>;
type ColFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Filter {
    Not(Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    /// An opaque predicate over the whole row.
    FnRow(RowFn),
    /// An opaque predicate over a single column's value.
    FnCol(u16, ColFn),
    /// Compares a column's value against a literal using `op`.
    Cmp(u16, CmpOp, Value),
}

impl Filter {
    pub fn not(f: Filter) -> Filter {
        Filter::Not(Box::new(f))
    }

    pub fn and(a: Filter, b: Filter) -> Filter {
        Filter::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: Filter, b: Filter) -> Filter {
        Filter::Or(Box::new(a), Box::new(b))
    }

    pub fn cmp(column: u16, op: CmpOp, value: Value) -> Filter {
        Filter::Cmp(column, op, value)
    }

    pub fn fn_row<F>(f: F) -> Filter
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        Filter::FnRow(Arc::new(f))
    }

    pub fn fn_col<F>(column: u16, f: F) -> Filter
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Filter::FnCol(column, Arc::new(f))
    }

    /// Evaluates the filter against `row`. `And`/`Or` short-circuit; an
    /// incomparable `Cmp` (mismatched types, or either side `Null`) never
    /// matches regardless of `op`, including `Ne`.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Not(inner) => !inner.matches(row),
            Filter::And(a, b) => a.matches(row) && b.matches(row),
            Filter::Or(a, b) => a.matches(row) || b.matches(row),
            Filter::FnRow(f) => f(row),
            Filter::FnCol(col, f) => f(row.get_or_null(*col)),
            Filter::Cmp(col, op, literal) => match compare(row.get_or_null(*col), literal) {
                Some(ordering) => op_matches(*op, ordering),
                None => false,
            },
        }
    }
}

fn op_matches(op: CmpOp, ordering: Ordering) -> bool {
    match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    }
}

/// Compares two values of the same variant; `None` if either is `Null` or
/// they're of different types ("incomparable", §4.7).
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Uint16(x), Value::Uint16(y)) => x.partial_cmp(y),
        (Value::Uint32(x), Value::Uint32(y)) => x.partial_cmp(y),
        (Value::Uint64(x), Value::Uint64(y)) => x.partial_cmp(y),
        (Value::Int32(x), Value::Int32(y)) => x.partial_cmp(y),
        (Value::Int64(x), Value::Int64(y)) => x.partial_cmp(y),
        (Value::Float32(x), Value::Float32(y)) => x.partial_cmp(y),
        (Value::Float64(x), Value::Float64(y)) => x.partial_cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.partial_cmp(y),
        (Value::Fixed96(x), Value::Fixed96(y)) => x.partial_cmp(y),
        (Value::Fixed128(x), Value::Fixed128(y)) => x.partial_cmp(y),
        (Value::Fixed160(x), Value::Fixed160(y)) => x.partial_cmp(y),
        (Value::Fixed256(x), Value::Fixed256(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => x.partial_cmp(y),
        (Value::Opaque(x), Value::Opaque(y)) => x.partial_cmp(y),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(col: u16, value: Value) -> Row {
        let mut row = Row::new();
        row.set(col, value);
        row
    }

    #[test]
    fn cmp_eq_matches_equal_values() {
        let filter = Filter::cmp(0, CmpOp::Eq, Value::Uint32(5));
        assert!(filter.matches(&row_with(0, Value::Uint32(5))));
        assert!(!filter.matches(&row_with(0, Value::Uint32(6))));
    }

    #[test]
    fn incomparable_never_matches_even_for_ne() {
        let filter = Filter::cmp(0, CmpOp::Ne, Value::Uint32(5));
        assert!(!filter.matches(&row_with(0, Value::Null)));
        assert!(!filter.matches(&row_with(0, Value::String("x".to_string()))));
    }

    #[test]
    fn and_or_not_compose() {
        let a = Filter::cmp(0, CmpOp::Gt, Value::Uint32(1));
        let b = Filter::cmp(0, CmpOp::Lt, Value::Uint32(10));
        let between = Filter::and(a, b);
        assert!(between.matches(&row_with(0, Value::Uint32(5))));
        assert!(!between.matches(&row_with(0, Value::Uint32(20))));

        let not_between = Filter::not(between);
        assert!(not_between.matches(&row_with(0, Value::Uint32(20))));
    }

    #[test]
    fn fn_row_and_fn_col_wrap_closures() {
        let row_filter = Filter::fn_row(|row| row.get(0).is_some());
        assert!(row_filter.matches(&row_with(0, Value::Uint32(1))));

        let col_filter = Filter::fn_col(0, |v| matches!(v, Value::Uint32(n) if *n % 2 == 0));
        assert!(col_filter.matches(&row_with(0, Value::Uint32(4))));
        assert!(!col_filter.matches(&row_with(0, Value::Uint32(5))));
    }
}
