//! Row-level put/delete/get against a table's primary and secondary
//! indexes (§4.5).

use crate::codec::key_codec::row_to_key;
use crate::engine::KvEngine;
use crate::error::{Error, TdResult};
use crate::index_ops::{secondary_remove, secondary_upsert};
use crate::schema::{index_db_name, Schema};
use crate::shove::IndexKind;
use crate::value::{Row, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutMode {
    /// Fails with `KeyExist` if the primary key is already present.
    Insert,
    /// Fails with `NotFound` if the primary key is absent.
    Update,
    /// Inserts if absent, replaces if present.
    Upsert,
}

fn dbi_name_of(schema: &Schema) -> impl Fn(usize) -> String + '_ {
    move |ordinal| index_db_name(schema.table_shove, ordinal)
}

fn encode_row(schema: &Schema, row: &Row) -> TdResult<(Vec<u8>, Vec<u8>)> {
    let specs = schema.column_specs();
    let pk_key = row_to_key(&specs, 0, row)?;
    let value_bytes = encode_row_bytes(row);
    Ok((pk_key, value_bytes))
}

/// A minimal, self-describing row encoding: column ordinal (u16) + a
/// length-prefixed opaque payload, good enough for round-tripping through
/// `Value` without depending on the external tuple-serialization library
/// this store is designed atop (§1's "out of scope" boundary).
pub(crate) fn encode_row_for_cursor(row: &Row) -> Vec<u8> {
    encode_row_bytes(row)
}

fn encode_row_bytes(row: &Row) -> Vec<u8> {
    let mut out = Vec::new();
    for col in row.columns() {
        let value = row.get_or_null(col);
        let encoded = crate::value_codec::encode_value(value);
        out.extend_from_slice(&col.to_le_bytes());
        out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        out.extend_from_slice(&encoded);
    }
    out
}

pub(crate) fn decode_row_for_cursor(bytes: &[u8]) -> TdResult<Row> {
    decode_row_bytes(bytes)
}

fn decode_row_bytes(bytes: &[u8]) -> TdResult<Row> {
    let mut row = Row::new();
    let mut cursor = 0;
    while cursor < bytes.len() {
        if cursor + 6 > bytes.len() {
            return Err(Error::RowMismatch);
        }
        let col = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]);
        let len = u32::from_le_bytes([bytes[cursor + 2], bytes[cursor + 3], bytes[cursor + 4], bytes[cursor + 5]]) as usize;
        cursor += 6;
        if cursor + len > bytes.len() {
            return Err(Error::RowMismatch);
        }
        let value = crate::value_codec::decode_value(&bytes[cursor..cursor + len])?;
        row.set(col, value);
        cursor += len;
    }
    Ok(row)
}

/// Inserts, updates, or upserts `row` (§4.5's `put`). An exact duplicate —
/// the existing primary value's bytes equal the new row's encoding — is
/// still a `KeyExist` under `Insert` mode; `put` never silently no-ops.
pub fn put(engine: &dyn KvEngine, schema: &Schema, row: &Row, mode: PutMode) -> TdResult<()> {
    let specs = schema.column_specs();
    let (pk_key, new_bytes) = encode_row(schema, row)?;
    let pk_dbi = index_db_name(schema.table_shove, 0);

    let existing = engine.get(&pk_dbi, &pk_key)?;
    match (mode, &existing) {
        (PutMode::Insert, Some(_)) => return Err(Error::KeyExist),
        (PutMode::Update, None) => return Err(Error::NotFound),
        _ => {}
    }

    if let Some(old_bytes) = &existing {
        let old_row = decode_row_bytes(old_bytes)?;
        secondary_remove(engine, schema, &specs, &old_row, &pk_key, dbi_name_of(schema))?;
    }

    secondary_upsert(engine, schema, &specs, row, &pk_key, dbi_name_of(schema))?;
    engine.set(&pk_dbi, &pk_key, new_bytes)
}

/// Deletes the row keyed by its primary value, cleaning up every secondary
/// entry first (needs the old row's bytes to recompute each secondary key,
/// so the primary delete happens last).
pub fn delete(engine: &dyn KvEngine, schema: &Schema, pk_value: &Value) -> TdResult<()> {
    let specs = schema.column_specs();
    let pk_dbi = index_db_name(schema.table_shove, 0);
    let pk_key = crate::codec::key_codec::value_to_key(schema.columns[0].kind, schema.columns[0].ty, pk_value)?;

    let bytes = engine.get(&pk_dbi, &pk_key)?.ok_or(Error::NotFound)?;
    let row = decode_row_bytes(&bytes)?;

    let has_secondaries = schema.columns.iter().any(|c| c.kind.is_secondary()) || !schema.composites.is_empty();
    if has_secondaries {
        secondary_remove(engine, schema, &specs, &row, &pk_key, dbi_name_of(schema))?;
    }
    engine.delete(&pk_dbi, &pk_key)
}

/// Point lookup on the primary key or a unique secondary index (§4.5's
/// `get`). A secondary hit whose primary key no longer resolves is
/// `IndexCorrupted`, not `NotFound` — a non-unique secondary cannot be
/// looked up this way since it may resolve to more than one row.
pub fn get(engine: &dyn KvEngine, schema: &Schema, column_ordinal: usize, key_value: &Value) -> TdResult<Row> {
    let column = schema.columns.get(column_ordinal).ok_or_else(|| Error::Inval("column index out of range".to_string()))?;
    if !column.kind.contains(IndexKind::PRIMARY) && !column.kind.contains(IndexKind::UNIQUE) {
        return Err(Error::Inval("get requires a primary or unique index".to_string()));
    }

    let key = crate::codec::key_codec::value_to_key(column.kind, column.ty, key_value)?;
    let dbi = index_db_name(schema.table_shove, column_ordinal);

    if column.kind.contains(IndexKind::PRIMARY) {
        let bytes = engine.get(&dbi, &key)?.ok_or(Error::NotFound)?;
        return decode_row_bytes(&bytes);
    }

    let pk_bytes = engine.get(&dbi, &key)?.ok_or(Error::NotFound)?;
    let pk_dbi = index_db_name(schema.table_shove, 0);
    let row_bytes = engine
        .get(&pk_dbi, &pk_bytes)?
        .ok_or_else(|| Error::IndexCorrupted(format!("secondary entry for {} has no primary row", column.name)))?;
    decode_row_bytes(&row_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_engine::MemoryEngine;
    use crate::schema::{create_table, Column};
    use crate::shove::ColumnType;

    fn sample_schema_and_engine() -> (MemoryEngine, Schema) {
        let engine = MemoryEngine::new();
        let columns = vec![
            Column::new("id", IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::Uint64),
            Column::new("email", IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::String),
        ];
        let schema = Schema::new("users", columns, Vec::new());
        let schema = create_table(&engine, schema, 1).unwrap();
        (engine, schema)
    }

    #[test]
    fn insert_then_get_round_trips_by_primary_and_secondary() {
        let (engine, schema) = sample_schema_and_engine();
        let mut row = Row::new();
        row.set(0, Value::Uint64(1));
        row.set(1, Value::String("a@example.com".to_string()));
        put(&engine, &schema, &row, PutMode::Insert).unwrap();

        let by_pk = get(&engine, &schema, 0, &Value::Uint64(1)).unwrap();
        assert_eq!(by_pk.get(1), Some(&Value::String("a@example.com".to_string())));

        let by_secondary = get(&engine, &schema, 1, &Value::String("a@example.com".to_string())).unwrap();
        assert_eq!(by_secondary.get(0), Some(&Value::Uint64(1)));
    }

    #[test]
    fn insert_duplicate_primary_is_key_exist() {
        let (engine, schema) = sample_schema_and_engine();
        let mut row = Row::new();
        row.set(0, Value::Uint64(1));
        row.set(1, Value::String("a@example.com".to_string()));
        put(&engine, &schema, &row, PutMode::Insert).unwrap();
        assert!(matches!(put(&engine, &schema, &row, PutMode::Insert), Err(Error::KeyExist)));
    }

    #[test]
    fn update_requires_existing_row() {
        let (engine, schema) = sample_schema_and_engine();
        let mut row = Row::new();
        row.set(0, Value::Uint64(1));
        row.set(1, Value::String("a@example.com".to_string()));
        assert!(matches!(put(&engine, &schema, &row, PutMode::Update), Err(Error::NotFound)));
    }

    #[test]
    fn delete_removes_row_and_secondary_entry() {
        let (engine, schema) = sample_schema_and_engine();
        let mut row = Row::new();
        row.set(0, Value::Uint64(1));
        row.set(1, Value::String("a@example.com".to_string()));
        put(&engine, &schema, &row, PutMode::Insert).unwrap();

        delete(&engine, &schema, &Value::Uint64(1)).unwrap();
        assert!(matches!(get(&engine, &schema, 0, &Value::Uint64(1)), Err(Error::NotFound)));
        assert!(matches!(get(&engine, &schema, 1, &Value::String("a@example.com".to_string())), Err(Error::NotFound)));
    }

    fn composite_schema_and_engine() -> (MemoryEngine, Schema) {
        use crate::schema::Composite;

        let engine = MemoryEngine::new();
        let columns = vec![
            Column::new("id", IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::Uint32),
            Column::new("last", IndexKind::empty(), ColumnType::String),
            Column::new("first", IndexKind::empty(), ColumnType::String),
            Column::new("by_name", IndexKind::ORDERED | IndexKind::UNIQUE, ColumnType::Null),
        ];
        let composites = vec![Composite { column_index: 3, members: vec![1, 2], kind: IndexKind::ORDERED | IndexKind::UNIQUE }];
        let schema = Schema::new("people", columns, composites);
        let schema = create_table(&engine, schema, 1).unwrap();
        (engine, schema)
    }

    /// Ordinals shift under `create_table`'s column sort, so tests look them
    /// up by name rather than assuming the pre-sort column order.
    fn ordinal_of(schema: &Schema, name: &str) -> u16 {
        schema.columns.iter().position(|c| c.name == name).unwrap() as u16
    }

    #[test]
    fn composite_index_maintained_across_put_and_delete() {
        let (engine, schema) = composite_schema_and_engine();
        let (id, last, first) = (ordinal_of(&schema, "id"), ordinal_of(&schema, "last"), ordinal_of(&schema, "first"));
        let mut row = Row::new();
        row.set(id, Value::Uint32(1));
        row.set(last, Value::String("Lovelace".to_string()));
        row.set(first, Value::String("Ada".to_string()));
        put(&engine, &schema, &row, PutMode::Insert).unwrap();

        let specs = schema.column_specs();
        let composite = &schema.composites[0];
        let key = crate::codec::key_codec::composite_row_to_key(&specs, &composite.members, composite.kind, &row).unwrap();
        let dbi = index_db_name(schema.table_shove, composite.column_index as usize);
        assert!(engine.get(&dbi, &key).unwrap().is_some());

        delete(&engine, &schema, &Value::Uint32(1)).unwrap();
        assert!(engine.get(&dbi, &key).unwrap().is_none());
    }

    #[test]
    fn duplicate_composite_key_is_rejected_when_unique() {
        let (engine, schema) = composite_schema_and_engine();
        let (id, last, first) = (ordinal_of(&schema, "id"), ordinal_of(&schema, "last"), ordinal_of(&schema, "first"));
        let mut row = Row::new();
        row.set(id, Value::Uint32(1));
        row.set(last, Value::String("Lovelace".to_string()));
        row.set(first, Value::String("Ada".to_string()));
        put(&engine, &schema, &row, PutMode::Insert).unwrap();

        let mut other = Row::new();
        other.set(id, Value::Uint32(2));
        other.set(last, Value::String("Lovelace".to_string()));
        other.set(first, Value::String("Ada".to_string()));
        assert!(matches!(put(&engine, &schema, &other, PutMode::Insert), Err(Error::KeyExist)));
    }

    #[test]
    fn upsert_replaces_secondary_index_entry() {
        let (engine, schema) = sample_schema_and_engine();
        let mut row = Row::new();
        row.set(0, Value::Uint64(1));
        row.set(1, Value::String("a@example.com".to_string()));
        put(&engine, &schema, &row, PutMode::Insert).unwrap();

        let mut updated = Row::new();
        updated.set(0, Value::Uint64(1));
        updated.set(1, Value::String("b@example.com".to_string()));
        put(&engine, &schema, &updated, PutMode::Upsert).unwrap();

        assert!(matches!(get(&engine, &schema, 1, &Value::String("a@example.com".to_string())), Err(Error::NotFound)));
        let row = get(&engine, &schema, 1, &Value::String("b@example.com".to_string())).unwrap();
        assert_eq!(row.get(0), Some(&Value::Uint64(1)));
    }
}
