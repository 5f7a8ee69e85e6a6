//! The crate's own typed value representation. The "tuple serialization
//! library" (field layout, presence lookup by column-id) is named in the
//! purpose statement as an out-of-scope external collaborator; `Value`/`Row`
//! here are the minimal in-scope stand-in the rest of the store needs to
//! talk about column values and rows at all.

use crate::shove::ColumnType;
use std::collections::BTreeMap;

/// A single typed column value, or `Null` standing for either "absent" (a
/// row has no field for this column) or the decoded NIL sentinel of a
/// nullable index — the two are deliberately not distinguished at this
/// layer; `Schema`/`IndexOps` interpret `Null` against nullability.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Fixed-point 64-bit datetime representation (ticks since epoch).
    DateTime(i64),
    Fixed96([u8; 12]),
    Fixed128([u8; 16]),
    Fixed160([u8; 20]),
    Fixed256([u8; 32]),
    String(String),
    Opaque(Vec<u8>),
    /// The result of decoding a key that was shoved because its source
    /// value exceeded `MAX_KEYLEN`; carries the raw shoved key bytes.
    /// Callers must not treat this as the original value (§4.1).
    Shoved(Vec<u8>),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Null => ColumnType::Null,
            Value::Uint16(_) => ColumnType::Uint16,
            Value::Uint32(_) => ColumnType::Uint32,
            Value::Uint64(_) => ColumnType::Uint64,
            Value::Int32(_) => ColumnType::Int32,
            Value::Int64(_) => ColumnType::Int64,
            Value::Float32(_) => ColumnType::Float32,
            Value::Float64(_) => ColumnType::Float64,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::Fixed96(_) => ColumnType::Fixed96,
            Value::Fixed128(_) => ColumnType::Fixed128,
            Value::Fixed160(_) => ColumnType::Fixed160,
            Value::Fixed256(_) => ColumnType::Fixed256,
            Value::String(_) => ColumnType::String,
            Value::Opaque(_) => ColumnType::Opaque,
            Value::Shoved(_) => ColumnType::Opaque,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A row: column ordinal (index into the table's sorted `columns[]`) to
/// value. Missing entries are treated the same as an explicit `Value::Null`
/// for a nullable column, and as `COLUMN_MISSING` for a required one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: BTreeMap<u16, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self { fields: BTreeMap::new() }
    }

    pub fn set(&mut self, column: u16, value: Value) -> &mut Self {
        self.fields.insert(column, value);
        self
    }

    pub fn get(&self, column: u16) -> Option<&Value> {
        self.fields.get(&column)
    }

    /// A required (non-nullable) field's value, or `Value::Null` if the
    /// caller simply left it unset (the two cases are resolved by the
    /// caller against the column's nullability).
    pub fn get_or_null(&self, column: u16) -> &Value {
        self.fields.get(&column).unwrap_or(&Value::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = u16> + '_ {
        self.fields.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_defaults_missing_fields_to_null() {
        let row = Row::new();
        assert_eq!(row.get_or_null(0), &Value::Null);
    }

    #[test]
    fn row_set_overwrites() {
        let mut row = Row::new();
        row.set(0, Value::Uint32(1));
        row.set(0, Value::Uint32(2));
        assert_eq!(row.get(0), Some(&Value::Uint32(2)));
    }
}
