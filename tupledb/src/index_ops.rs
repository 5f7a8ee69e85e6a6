//! Per-index metadata and secondary-index maintenance (§4.4).
//!
//! The backing engines (`sled`, `MemoryEngine`) have no pluggable per-dbi
//! comparator, so ordering and reverse-direction semantics are baked
//! directly into the encoded key bytes by `codec::key_codec` rather than
//! expressed as a comparator function here. `flags_for` therefore produces
//! descriptive metadata only — it documents how a dbi's keys behave, for
//! logging and for `schema::create_table`'s sub-database bookkeeping — it is
//! never handed to the engine.

use crate::codec::key_codec::{composite_row_to_key, row_to_key, ColumnSpec};
use crate::error::{Error, TdResult};
use crate::schema::Schema;
use crate::shove::IndexKind;
use crate::value::Row;

bitflags::bitflags! {
    /// Descriptive per-dbi flags (§6), computed for documentation and for
    /// deciding how `index_ops` itself should treat the dbi — never passed
    /// to the engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DbiFlags: u16 {
        /// Keys sort with duplicate values grouped under one key.
        const DUPSORT    = 0b0000_0001;
        /// Key bytes are a fixed-width packed integer.
        const INTEGERKEY = 0b0000_0010;
        /// Key bytes are compared as if byte-reversed.
        const REVERSEKEY = 0b0000_0100;
        /// Every duplicate value under a key has the same fixed width.
        const DUPFIXED   = 0b0000_1000;
        /// Duplicate values are themselves fixed-width packed integers.
        const INTEGERDUP = 0b0001_0000;
        /// Duplicate values are compared as if byte-reversed.
        const REVERSEDUP = 0b0010_0000;
    }
}

/// Computes the descriptive flag set for a column's index (§6).
pub fn flags_for(kind: IndexKind, fixed_width: Option<usize>) -> DbiFlags {
    let mut flags = DbiFlags::empty();
    if kind.has_duplicates() {
        flags |= DbiFlags::DUPSORT;
        if fixed_width.is_some() {
            flags |= DbiFlags::DUPFIXED;
        }
    }
    if fixed_width.is_some() {
        flags |= DbiFlags::INTEGERKEY;
    }
    if kind.contains(IndexKind::REVERSE) {
        flags |= DbiFlags::REVERSEKEY;
        if kind.has_duplicates() {
            flags |= DbiFlags::REVERSEDUP;
        }
    }
    if kind.has_duplicates() && fixed_width.is_some() {
        flags |= DbiFlags::INTEGERDUP;
    }
    flags
}

/// Inserts or replaces one secondary-index entry for a single column, and
/// for every composite that references it, reflecting the primary key
/// `pk_key` as the indexed value (§4.4: secondary entries store the primary
/// key as their value so a point lookup on the secondary resolves to the
/// primary row).
pub fn secondary_upsert(
    engine: &dyn crate::engine::KvEngine,
    schema: &Schema,
    specs: &[ColumnSpec],
    row: &Row,
    pk_key: &[u8],
    dbi_name_of: impl Fn(usize) -> String,
) -> TdResult<()> {
    for (ordinal, column) in schema.columns.iter().enumerate() {
        if column.kind.is_empty() || column.kind.contains(IndexKind::PRIMARY) || column.ty == crate::shove::ColumnType::Null {
            continue;
        }
        let key = row_to_key(specs, ordinal, row)?;
        let dbi = dbi_name_of(ordinal);
        put_secondary(engine, &dbi, column.kind, &key, pk_key)?;
    }
    for composite in &schema.composites {
        let key = composite_row_to_key(specs, &composite.members, composite.kind, row)?;
        let dbi = dbi_name_of(composite.column_index as usize);
        put_secondary(engine, &dbi, composite.kind, &key, pk_key)?;
    }
    Ok(())
}

fn put_secondary(engine: &dyn crate::engine::KvEngine, dbi: &str, kind: IndexKind, key: &[u8], pk_key: &[u8]) -> TdResult<()> {
    if kind.contains(IndexKind::UNIQUE) {
        if let Some(existing) = engine.get(dbi, key)? {
            if existing != pk_key {
                return Err(Error::KeyExist);
            }
            return Ok(());
        }
        engine.set(dbi, key, pk_key.to_vec())
    } else {
        let mut combined = key.to_vec();
        combined.extend_from_slice(pk_key);
        engine.set(dbi, &combined, pk_key.to_vec())
    }
}

/// Removes every secondary-index entry for `row`, mirroring
/// `secondary_upsert`'s member set.
pub fn secondary_remove(
    engine: &dyn crate::engine::KvEngine,
    schema: &Schema,
    specs: &[ColumnSpec],
    row: &Row,
    pk_key: &[u8],
    dbi_name_of: impl Fn(usize) -> String,
) -> TdResult<()> {
    for (ordinal, column) in schema.columns.iter().enumerate() {
        if column.kind.is_empty() || column.kind.contains(IndexKind::PRIMARY) || column.ty == crate::shove::ColumnType::Null {
            continue;
        }
        let key = row_to_key(specs, ordinal, row)?;
        let dbi = dbi_name_of(ordinal);
        remove_secondary(engine, &dbi, column.kind, &key, pk_key)?;
    }
    for composite in &schema.composites {
        let key = composite_row_to_key(specs, &composite.members, composite.kind, row)?;
        let dbi = dbi_name_of(composite.column_index as usize);
        remove_secondary(engine, &dbi, composite.kind, &key, pk_key)?;
    }
    Ok(())
}

fn remove_secondary(engine: &dyn crate::engine::KvEngine, dbi: &str, kind: IndexKind, key: &[u8], pk_key: &[u8]) -> TdResult<()> {
    if kind.contains(IndexKind::UNIQUE) {
        engine.delete(dbi, key)
    } else {
        let mut combined = key.to_vec();
        combined.extend_from_slice(pk_key);
        engine.delete(dbi, &combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_index_has_no_duplicate_flags() {
        let flags = flags_for(IndexKind::ORDERED | IndexKind::UNIQUE, Some(4));
        assert!(!flags.contains(DbiFlags::DUPSORT));
        assert!(flags.contains(DbiFlags::INTEGERKEY));
    }

    #[test]
    fn non_unique_fixed_width_index_marks_dup_and_fixed() {
        let flags = flags_for(IndexKind::ORDERED, Some(4));
        assert!(flags.contains(DbiFlags::DUPSORT));
        assert!(flags.contains(DbiFlags::DUPFIXED));
        assert!(flags.contains(DbiFlags::INTEGERKEY));
    }

    #[test]
    fn flags_mark_duplicates_and_reverse() {
        let flags = flags_for(IndexKind::ORDERED | IndexKind::REVERSE, Some(8));
        assert!(flags.contains(DbiFlags::REVERSEKEY));
        assert!(flags.contains(DbiFlags::REVERSEDUP));
        assert!(flags.contains(DbiFlags::DUPSORT));
        assert!(flags.contains(DbiFlags::DUPFIXED));
    }

    #[test]
    fn unordered_variable_width_has_no_integer_flags() {
        let flags = flags_for(IndexKind::empty(), None);
        assert!(!flags.contains(DbiFlags::INTEGERKEY));
        assert!(flags.contains(DbiFlags::DUPSORT));
    }
}
