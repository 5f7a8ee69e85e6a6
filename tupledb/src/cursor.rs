//! Cursor state machine over a single index (§4.6). `codec::key_codec`
//! already bakes reverse-direction comparison into the encoded key bytes
//! (bit-complement for numerics, whole-buffer reversal for byte-string-like
//! types), so a dbi's forward byte order already matches the index's
//! logical order regardless of its `REVERSE` kind — the cursor itself needs
//! no separate reverse state machine, only a direction flag that decides
//! whether `next`/`prev` walk the underlying engine scan forwards or
//! backwards (the "thin adapter" the design notes call for).

use crate::codec::key_codec::{key_to_value, row_to_key, ColumnSpec};
use crate::engine::KvEngine;
use crate::error::{Error, TdResult};
use crate::filter::Filter;
use crate::index_ops::{secondary_remove, secondary_upsert};
use crate::schema::{index_db_name, Schema};
use crate::shove::IndexKind;
use crate::value::{Row, Value};
use std::ops::Bound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Not yet positioned onto any row (the cursor's initial state).
    Poor,
    At(usize),
    /// Ran off either end of the range.
    Exhausted,
}

/// A navigable, range- and filter-bounded view over one index's entries,
/// each resolved to its full primary row.
pub struct Cursor<'a> {
    engine: &'a dyn KvEngine,
    schema: &'a Schema,
    column_ordinal: usize,
    filter: Option<Filter>,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Position,
}

impl<'a> Cursor<'a> {
    /// Opens a cursor over `column_ordinal`'s index, clamped to
    /// `(lower, upper)` in the index's logical order, keeping only entries
    /// whose resolved row satisfies `filter`.
    pub fn open(
        engine: &'a dyn KvEngine,
        schema: &'a Schema,
        column_ordinal: usize,
        range: (Bound<Vec<u8>>, Bound<Vec<u8>>),
        filter: Option<Filter>,
    ) -> TdResult<Self> {
        let column = schema
            .columns
            .get(column_ordinal)
            .ok_or_else(|| Error::Inval("column index out of range".to_string()))?;
        if column.kind.is_empty() {
            return Err(Error::Inval("column is not indexed".to_string()));
        }

        log::debug!(
            "cursor open on {}.{}: range=({:?}, {:?}), filter={}",
            schema.table_name,
            column.name,
            range.0,
            range.1,
            filter.is_some()
        );
        let dbi = index_db_name(schema.table_shove, column_ordinal);
        let raw: Vec<(Vec<u8>, Vec<u8>)> = engine.scan(&dbi, range)?.collect::<TdResult<Vec<_>>>()?;

        let is_primary = column.kind.contains(IndexKind::PRIMARY);
        let pk_dbi = index_db_name(schema.table_shove, 0);
        let mut entries = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let row_bytes = if is_primary {
                value
            } else {
                engine
                    .get(&pk_dbi, &value)?
                    .ok_or_else(|| Error::IndexCorrupted(format!("secondary entry for {} has no primary row", column.name)))?
            };
            entries.push((key, row_bytes));
        }

        let mut cursor = Cursor { engine, schema, column_ordinal, filter, entries, position: Position::Poor };
        cursor.filter_entries()?;
        Ok(cursor)
    }

    fn filter_entries(&mut self) -> TdResult<()> {
        if self.filter.is_none() {
            return Ok(());
        }
        let filter = self.filter.clone().unwrap();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (key, row_bytes) in std::mem::take(&mut self.entries) {
            let row = crate::table_ops::decode_row_for_cursor(&row_bytes)?;
            if filter.matches(&row) {
                kept.push((key, row_bytes));
            }
        }
        self.entries = kept;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn first(&mut self) -> TdResult<Option<Row>> {
        if self.entries.is_empty() {
            self.position = Position::Exhausted;
            return Ok(None);
        }
        self.position = Position::At(0);
        self.current()
    }

    pub fn last(&mut self) -> TdResult<Option<Row>> {
        if self.entries.is_empty() {
            self.position = Position::Exhausted;
            return Ok(None);
        }
        self.position = Position::At(self.entries.len() - 1);
        self.current()
    }

    pub fn next(&mut self) -> TdResult<Option<Row>> {
        self.position = match self.position {
            Position::Poor => {
                if self.entries.is_empty() {
                    Position::Exhausted
                } else {
                    Position::At(0)
                }
            }
            Position::At(i) if i + 1 < self.entries.len() => Position::At(i + 1),
            _ => Position::Exhausted,
        };
        self.current()
    }

    pub fn prev(&mut self) -> TdResult<Option<Row>> {
        self.position = match self.position {
            Position::Poor => {
                if self.entries.is_empty() {
                    Position::Exhausted
                } else {
                    Position::At(self.entries.len() - 1)
                }
            }
            Position::At(i) if i > 0 => Position::At(i - 1),
            _ => Position::Exhausted,
        };
        self.current()
    }

    pub fn current(&self) -> TdResult<Option<Row>> {
        match self.position {
            Position::At(i) => Ok(Some(crate::table_ops::decode_row_for_cursor(&self.entries[i].1)?)),
            _ => Ok(None),
        }
    }

    /// Updates the row under the cursor in place (§4.6): validates the
    /// caller's expected current value (`ROW_MISMATCH` on a stale read),
    /// requires `new_row` to encode to the same key on this cursor's own
    /// index (changing the field(s) a cursor is positioned on is not an
    /// "update", it's a reposition — also `ROW_MISMATCH`), maintains every
    /// secondary index, and re-derives the primary key if the update
    /// changed it.
    pub fn update(&mut self, expected: &Row, new_row: &Row) -> TdResult<()> {
        let i = match self.position {
            Position::At(i) => i,
            _ => return Err(Error::Cursor("update requires a positioned cursor".to_string())),
        };
        let current = crate::table_ops::decode_row_for_cursor(&self.entries[i].1)?;
        if &current != expected {
            return Err(Error::RowMismatch);
        }

        let specs = self.schema.column_specs();
        let new_own_key = row_to_key(&specs, self.column_ordinal, new_row)?;
        if new_own_key != self.entries[i].0 {
            return Err(Error::RowMismatch);
        }

        let pk_dbi = index_db_name(self.schema.table_shove, 0);
        let old_pk_key = row_to_key(&specs, 0, &current)?;
        let new_pk_key = row_to_key(&specs, 0, new_row)?;

        secondary_remove(self.engine, self.schema, &specs, &current, &old_pk_key, dbi_name_of(self.schema))?;
        if old_pk_key != new_pk_key {
            self.engine.delete(&pk_dbi, &old_pk_key)?;
        }
        secondary_upsert(self.engine, self.schema, &specs, new_row, &new_pk_key, dbi_name_of(self.schema))?;
        self.engine.set(&pk_dbi, &new_pk_key, crate::table_ops::encode_row_for_cursor(new_row))?;

        self.entries[i] = (new_own_key, crate::table_ops::encode_row_for_cursor(new_row));
        Ok(())
    }

    /// Deletes the row under the cursor and every secondary entry, then
    /// steps the cursor so the following `current`/`next` lands on the row
    /// that was after it (secondary stepover).
    pub fn delete(&mut self) -> TdResult<()> {
        let i = match self.position {
            Position::At(i) => i,
            _ => return Err(Error::Cursor("delete requires a positioned cursor".to_string())),
        };
        let row = crate::table_ops::decode_row_for_cursor(&self.entries[i].1)?;
        let specs = self.schema.column_specs();
        let pk_key = row_to_key(&specs, 0, &row)?;
        let pk_dbi = index_db_name(self.schema.table_shove, 0);

        secondary_remove(self.engine, self.schema, &specs, &row, &pk_key, dbi_name_of(self.schema))?;
        self.engine.delete(&pk_dbi, &pk_key)?;

        self.entries.remove(i);
        self.position = if i < self.entries.len() { Position::At(i) } else { Position::Exhausted };
        Ok(())
    }

    #[allow(dead_code)]
    fn decode_key(&self, specs: &[ColumnSpec], bytes: &[u8]) -> TdResult<Value> {
        let spec = specs.get(self.column_ordinal).ok_or_else(|| Error::Inval("column index out of range".to_string()))?;
        key_to_value(spec.kind, spec.ty, bytes)
    }
}

fn dbi_name_of(schema: &Schema) -> impl Fn(usize) -> String + '_ {
    move |ordinal| index_db_name(schema.table_shove, ordinal)
}
