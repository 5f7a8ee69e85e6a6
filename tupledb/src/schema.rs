//! Stored-schema record: serialize/deserialize, validate, checksum, column
//! sort order, composite-index validation, and create/drop table (§3, §4.2,
//! §6's bit-exact wire layout).

use crate::codec::key_codec::ColumnSpec;
use crate::engine::KvEngine;
use crate::error::{Error, TdResult};
use crate::shove::{ColumnType, IndexKind, Shove};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashSet;
use std::sync::Arc;

/// Magic value identifying a stored schema record (§6).
pub const SCHEMA_SIGNATURE: u32 = 1_636_722_823;
/// Seed for the schema checksum, hashed over every byte after the checksum
/// field itself (§6).
pub const SCHEMA_CHECKSUM_SEED: u64 = 67_413_473;
/// Name of the reserved catalog sub-database (§6: "a single sub-database
/// named `@`").
pub const CATALOG_DB: &str = "@";

pub const MAX_COLS: usize = 256;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub shove: Shove,
    pub kind: IndexKind,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: &str, kind: IndexKind, ty: ColumnType) -> Self {
        Column { name: name.to_string(), shove: Shove::new(name, kind, ty), kind, ty }
    }

    fn spec(&self) -> ColumnSpec {
        ColumnSpec { kind: self.kind, ty: self.ty }
    }
}

#[derive(Debug, Clone)]
pub struct Composite {
    /// Ordinal (in `Schema::columns`) of the placeholder column this
    /// composite is attached to.
    pub column_index: u16,
    pub members: Vec<u16>,
    pub kind: IndexKind,
}

/// An in-memory, owned decoding of a table's stored schema record. Per the
/// design notes, nothing downstream ever sees the raw packed bytes again
/// once this has been built.
#[derive(Debug, Clone)]
pub struct Schema {
    pub table_name: String,
    pub table_shove: Shove,
    pub csn: u64,
    pub columns: Vec<Column>,
    pub composites: Vec<Composite>,
}

impl Schema {
    pub fn new(table_name: &str, columns: Vec<Column>, composites: Vec<Composite>) -> Self {
        Schema {
            table_name: table_name.to_string(),
            table_shove: Shove::new(table_name, IndexKind::empty(), ColumnType::Null),
            csn: 0,
            columns,
            composites,
        }
    }

    pub fn column_specs(&self) -> Vec<ColumnSpec> {
        self.columns.iter().map(Column::spec).collect()
    }

    /// The stored-layout member list for a composite attached at
    /// `column_index`, or an empty slice if that column is not a composite
    /// placeholder (§F: `fpta_composite_list`, stubbed `ENOIMP` in the
    /// original, implemented here in full).
    pub fn composite_members(&self, column_index: u16) -> &[u16] {
        self.composites
            .iter()
            .find(|c| c.column_index == column_index)
            .map(|c| c.members.as_slice())
            .unwrap_or(&[])
    }

    /// §3 invariant 1: exactly one primary, in `columns[0]`.
    /// §3 invariant 2: secondaries require a unique primary.
    /// §3 invariant 4: composite members reference existing, plain columns.
    /// §3 invariant 5/6: composite redundancy checks.
    pub fn validate(&self) -> TdResult<()> {
        if self.columns.is_empty() {
            return Err(Error::SchemaCorrupted("table has no columns".to_string()));
        }
        if self.columns.len() > MAX_COLS {
            return Err(Error::SchemaCorrupted(format!("{} columns exceeds MAX_COLS", self.columns.len())));
        }

        let primaries: Vec<usize> =
            (0..self.columns.len()).filter(|&i| self.columns[i].kind.contains(IndexKind::PRIMARY)).collect();
        if primaries.len() != 1 || primaries[0] != 0 {
            return Err(Error::SchemaCorrupted("exactly one primary column, at index 0, is required".to_string()));
        }

        let primary_unique = self.columns[0].kind.contains(IndexKind::UNIQUE);
        let has_secondary = self.columns.iter().any(|c| c.kind.is_secondary());
        if has_secondary && !primary_unique {
            return Err(Error::SchemaCorrupted("secondary indexes require a unique primary".to_string()));
        }

        for composite in &self.composites {
            if composite.members.is_empty() {
                return Err(Error::SchemaCorrupted("composite with no members".to_string()));
            }
            let mut seen = HashSet::new();
            for &m in &composite.members {
                let member = self
                    .columns
                    .get(m as usize)
                    .ok_or_else(|| Error::SchemaCorrupted(format!("composite member {} out of range", m)))?;
                if member.ty == ColumnType::Nested {
                    return Err(Error::SchemaCorrupted("composite member must not be nested".to_string()));
                }
                if m == composite.column_index {
                    return Err(Error::SchemaCorrupted("composite cannot reference its own placeholder column".to_string()));
                }
                if !seen.insert(m) {
                    return Err(Error::SchemaCorrupted("composite has duplicate member".to_string()));
                }
            }
        }

        for (i, a) in self.composites.iter().enumerate() {
            for b in self.composites.iter().skip(i + 1) {
                let same_set: HashSet<u16> = a.members.iter().copied().collect();
                let other_set: HashSet<u16> = b.members.iter().copied().collect();
                let both_ordered = a.kind.contains(IndexKind::ORDERED) && b.kind.contains(IndexKind::ORDERED);
                let disagree_direction = a.kind.contains(IndexKind::REVERSE) != b.kind.contains(IndexKind::REVERSE);
                // An obverse/reverse pair over the identical member set is
                // exactly the legal case invariant 5 carves out; it must
                // not also be flagged as a redundant prefix of itself.
                let is_legal_direction_pair = same_set == other_set && both_ordered && disagree_direction;
                if same_set == other_set && !is_legal_direction_pair {
                    return Err(Error::SimilarIndex(
                        "two composite indexes share a member set without disagreeing on direction".to_string(),
                    ));
                }
                if !is_legal_direction_pair
                    && a.members.len() <= b.members.len()
                    && a.members[..] == b.members[..a.members.len()]
                {
                    return Err(Error::SimilarIndex("composite member ordering is a redundant prefix of another index".to_string()));
                }
            }
        }

        Ok(())
    }

    /// §3 invariant 3: sort `columns[]` by total order (primary >
    /// secondary-indexed > nullable-non-indexed > plain; ties by shove
    /// value), then renumber composite member references to match.
    pub fn sort(&mut self) {
        let old_order: Vec<Shove> = self.columns.iter().map(|c| c.shove).collect();

        fn rank(c: &Column) -> u8 {
            if c.kind.contains(IndexKind::PRIMARY) {
                0
            } else if c.kind.is_secondary() {
                1
            } else if c.kind.contains(IndexKind::NULLABLE) {
                2
            } else {
                3
            }
        }

        self.columns.sort_by(|a, b| rank(a).cmp(&rank(b)).then(a.shove.cmp(&b.shove)));

        fn remap_index(columns: &[Column], old_order: &[Shove], old_idx: u16) -> u16 {
            let shove = old_order[old_idx as usize];
            columns.iter().position(|c| c.shove == shove).expect("column preserved by sort") as u16
        }

        for composite in &mut self.composites {
            composite.column_index = remap_index(&self.columns, &old_order, composite.column_index);
            composite.members =
                composite.members.iter().copied().map(|m| remap_index(&self.columns, &old_order, m)).collect();
        }
    }

    /// Serializes the stored schema record exactly per §6's bit-exact
    /// layout; `checksum` is recomputed over everything after it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut sig_count_csn = [0u8; 16];
        LittleEndian::write_u32(&mut sig_count_csn[0..4], SCHEMA_SIGNATURE);
        LittleEndian::write_u32(&mut sig_count_csn[4..8], self.columns.len() as u32);
        LittleEndian::write_u64(&mut sig_count_csn[8..16], self.csn);
        body.extend_from_slice(&sig_count_csn);
        for c in &self.columns {
            let mut b = [0u8; 8];
            LittleEndian::write_u64(&mut b, c.shove.raw());
            body.extend_from_slice(&b);
        }
        for composite in &self.composites {
            let mut len_buf = [0u8; 2];
            LittleEndian::write_u16(&mut len_buf, composite.members.len() as u16);
            body.extend_from_slice(&len_buf);
            for &m in &composite.members {
                let mut b = [0u8; 2];
                LittleEndian::write_u16(&mut b, m);
                body.extend_from_slice(&b);
            }
        }

        let checksum = checksum_of(&body);
        let mut out = Vec::with_capacity(8 + body.len());
        let mut cs_buf = [0u8; 8];
        LittleEndian::write_u64(&mut cs_buf, checksum);
        out.extend_from_slice(&cs_buf);
        out.extend_from_slice(&body);
        out
    }

    /// Decodes and integrity-checks a stored schema record. The
    /// `composites[]` region is decoded eagerly into owned
    /// `Vec<Composite>` entries rather than left for callers to walk raw
    /// bytes (per the design notes on preferring an owned decode).
    pub fn from_bytes(table_name: &str, table_shove: Shove, data: &[u8]) -> TdResult<Self> {
        if data.len() < 24 {
            return Err(Error::SchemaCorrupted("stored schema shorter than header".to_string()));
        }
        let checksum = LittleEndian::read_u64(&data[0..8]);
        let body = &data[8..];
        if checksum_of(body) != checksum {
            return Err(Error::SchemaCorrupted("checksum mismatch".to_string()));
        }
        let signature = LittleEndian::read_u32(&body[0..4]);
        if signature != SCHEMA_SIGNATURE {
            return Err(Error::SchemaCorrupted("signature mismatch".to_string()));
        }
        let count = LittleEndian::read_u32(&body[4..8]) as usize;
        let csn = LittleEndian::read_u64(&body[8..16]);

        let columns_start = 16;
        let columns_end = columns_start + count * 8;
        if body.len() < columns_end {
            return Err(Error::SchemaCorrupted("stored schema truncated in columns[]".to_string()));
        }

        let mut columns = Vec::with_capacity(count);
        for i in 0..count {
            let off = columns_start + i * 8;
            let raw = LittleEndian::read_u64(&body[off..off + 8]);
            let shove = Shove::from_raw(raw);
            let ty = shove.column_type().ok_or_else(|| Error::SchemaCorrupted("invalid column type bits".to_string()))?;
            let kind = shove
                .index_kind()
                .ok_or_else(|| Error::SchemaCorrupted("invalid index kind bits".to_string()))?;
            columns.push(Column { name: format!("col{}", i), shove, kind, ty });
        }

        let mut composites = Vec::new();
        let mut cursor = columns_end;
        let mut composite_column_iter = columns.iter().enumerate().filter(|(_, c)| c.ty == ColumnType::Null);
        while cursor + 2 <= body.len() {
            let len = LittleEndian::read_u16(&body[cursor..cursor + 2]) as usize;
            cursor += 2;
            if cursor + len * 2 > body.len() {
                return Err(Error::SchemaCorrupted("composites[] truncated".to_string()));
            }
            let mut members = Vec::with_capacity(len);
            for i in 0..len {
                let off = cursor + i * 2;
                members.push(LittleEndian::read_u16(&body[off..off + 2]));
            }
            cursor += len * 2;
            let (column_index, placeholder) = composite_column_iter
                .next()
                .ok_or_else(|| Error::SchemaCorrupted("more composite groups than placeholder columns".to_string()))?;
            composites.push(Composite { column_index: column_index as u16, members, kind: placeholder.kind });
        }

        Ok(Schema { table_name: table_name.to_string(), table_shove, csn, columns, composites })
    }
}

fn checksum_of(body: &[u8]) -> u64 {
    ahash::RandomState::with_seed(SCHEMA_CHECKSUM_SEED as usize).hash_one(body)
}

/// Creates a table in a single schema transaction (§4.2's `create_table`):
/// sort + validate, open every per-index sub-database with create-only
/// semantics to detect name collisions, write the schema record with
/// no-overwrite semantics, and bump `schema_csn`. Rolls back every
/// sub-database it created if any later step fails.
pub fn create_table(engine: &dyn KvEngine, mut schema: Schema, next_csn: u64) -> TdResult<Schema> {
    schema.sort();
    schema.validate()?;

    engine.open_db(CATALOG_DB)?;
    if engine.get(CATALOG_DB, &schema.table_shove.raw().to_le_bytes())?.is_some() {
        return Err(Error::KeyExist);
    }

    let mut created: Vec<String> = Vec::new();
    for (ordinal, column) in schema.columns.iter().enumerate() {
        if column.kind.is_empty() && !is_composite_placeholder(&schema, ordinal) {
            continue;
        }
        let dbi_name = index_db_name(schema.table_shove, ordinal);
        if engine.has_db(&dbi_name)? {
            for name in &created {
                let _ = engine.drop_db(name);
            }
            return Err(Error::SimilarIndex(format!("sub-database {} already exists", dbi_name)));
        }
        if let Err(e) = engine.open_db(&dbi_name) {
            for name in &created {
                let _ = engine.drop_db(name);
            }
            return Err(e);
        }
        created.push(dbi_name);
    }

    schema.csn = next_csn;
    let result = engine.set(CATALOG_DB, &schema.table_shove.raw().to_le_bytes(), schema.to_bytes());
    if let Err(e) = result {
        for name in &created {
            let _ = engine.drop_db(name);
        }
        return Err(e);
    }

    log::info!("create_table {} committed at schema_csn={}", schema.table_name, schema.csn);
    Ok(schema)
}

fn is_composite_placeholder(schema: &Schema, ordinal: usize) -> bool {
    schema.composites.iter().any(|c| c.column_index as usize == ordinal)
}

/// Drops a table (§4.2's `drop_table`): opens (without create) every
/// per-index sub-database, removes the catalog record, then drops each
/// sub-database, tolerating sub-databases that are already missing from a
/// partial prior failure.
pub fn drop_table(engine: &dyn KvEngine, schema: &Schema) -> TdResult<()> {
    engine.open_db(CATALOG_DB)?;
    engine.delete(CATALOG_DB, &schema.table_shove.raw().to_le_bytes())?;
    for ordinal in 0..schema.columns.len() {
        let dbi_name = index_db_name(schema.table_shove, ordinal);
        if engine.has_db(&dbi_name)? {
            engine.drop_db(&dbi_name)?;
        }
    }
    log::info!("drop_table {} committed", schema.table_name);
    Ok(())
}

/// Loads a table's schema from the catalog (§4.2's `load`).
pub fn load(engine: &dyn KvEngine, table_name: &str) -> TdResult<Schema> {
    engine.open_db(CATALOG_DB)?;
    let table_shove = Shove::new(table_name, IndexKind::empty(), ColumnType::Null);
    let key = table_shove.raw().to_le_bytes();
    let bytes = engine.get(CATALOG_DB, &key)?.ok_or(Error::NotFound)?;
    Schema::from_bytes(table_name, table_shove, &bytes)
}

/// The per-index sub-database name for `table`'s column at `ordinal`
/// (§6: "named by a ... packing of the (table-shove + column-ordinal)
/// derived shove").
pub fn index_db_name(table: Shove, ordinal: usize) -> String {
    format!("{:016x}", crate::shove::dbi_shove(table, ordinal))
}

/// An opaque user handle binding a table- or column-name to the schema
/// (§3's "Name"). Holds the shove, a cached column ordinal, a shared
/// pointer to the table-schema snapshot, and the schema version at which
/// it was last resolved.
#[derive(Clone)]
pub struct Name {
    pub shove: Shove,
    pub column_index: Option<u16>,
    pub schema: Arc<Schema>,
    pub schema_version: u64,
}

impl Name {
    pub fn for_table(schema: Arc<Schema>, schema_version: u64) -> Self {
        let shove = schema.table_shove;
        Name { shove, column_index: None, schema, schema_version }
    }

    pub fn for_column(schema: Arc<Schema>, schema_version: u64, column_index: u16) -> Self {
        let shove = schema.columns[column_index as usize].shove;
        Name { shove, column_index: Some(column_index), schema, schema_version }
    }

    /// §4.2's `refresh_name`: no-op if the name's version matches the
    /// transaction's; `SCHEMA_CHANGED` if the name is somehow ahead of the
    /// transaction (should not happen in practice, but guarded); otherwise
    /// reload and rescan by shove to recover a possibly-changed ordinal.
    pub fn refresh(&mut self, engine: &dyn KvEngine, txn_schema_version: u64) -> TdResult<()> {
        if self.schema_version == txn_schema_version {
            return Ok(());
        }
        if self.schema_version > txn_schema_version {
            return Err(Error::SchemaChanged);
        }
        let reloaded = load(engine, &self.schema.table_name)?;
        if self.column_index.is_some() {
            let (idx, column) = reloaded
                .columns
                .iter()
                .enumerate()
                .find(|(_, c)| c.shove.name_hash_bits() == self.shove.name_hash_bits())
                .ok_or_else(|| Error::ColumnMissing(self.schema.table_name.clone()))?;
            self.column_index = Some(idx as u16);
            self.shove = column.shove;
        }
        self.schema = Arc::new(reloaded);
        self.schema_version = txn_schema_version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_engine::MemoryEngine;

    fn sample_schema() -> Schema {
        let columns = vec![
            Column::new("pk", IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::String),
            Column::new("a_uint", IndexKind::empty(), ColumnType::Uint32),
            Column::new("b_fp", IndexKind::empty(), ColumnType::Float64),
        ];
        Schema::new("widgets", columns, Vec::new())
    }

    #[test]
    fn serialize_round_trip_preserves_columns_and_csn() {
        let mut schema = sample_schema();
        schema.sort();
        schema.csn = 7;
        let bytes = schema.to_bytes();
        let decoded = Schema::from_bytes("widgets", schema.table_shove, &bytes).unwrap();
        assert_eq!(decoded.csn, 7);
        assert_eq!(decoded.columns.len(), schema.columns.len());
        assert_eq!(decoded.columns[0].shove, schema.columns[0].shove);
    }

    #[test]
    fn validate_requires_single_primary_at_zero() {
        let columns = vec![Column::new("a", IndexKind::empty(), ColumnType::Uint32)];
        let schema = Schema::new("t", columns, Vec::new());
        assert!(matches!(schema.validate(), Err(Error::SchemaCorrupted(_))));
    }

    #[test]
    fn sort_orders_primary_then_secondary_then_nullable_then_plain() {
        let columns = vec![
            Column::new("plain", IndexKind::empty(), ColumnType::Uint32),
            Column::new("nullable", IndexKind::NULLABLE, ColumnType::Uint32),
            Column::new("pk", IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::Uint64),
            Column::new("sec", IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::Uint32),
        ];
        let mut schema = Schema::new("t", columns, Vec::new());
        schema.sort();
        assert!(schema.columns[0].kind.contains(IndexKind::PRIMARY));
        assert!(schema.columns[1].kind.is_secondary());
        assert!(schema.columns[2].kind.contains(IndexKind::NULLABLE));
        assert_eq!(schema.columns[3].name, "plain");
    }

    #[test]
    fn create_and_drop_table_round_trip_through_catalog() {
        let engine = MemoryEngine::new();
        let schema = sample_schema();
        let created = create_table(&engine, schema, 1).unwrap();
        let loaded = load(&engine, "widgets").unwrap();
        assert_eq!(loaded.csn, created.csn);
        drop_table(&engine, &created).unwrap();
        assert!(matches!(load(&engine, "widgets"), Err(Error::NotFound)));
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let mut schema = sample_schema();
        schema.sort();
        let mut bytes = schema.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Schema::from_bytes("widgets", schema.table_shove, &bytes), Err(Error::SchemaCorrupted(_))));
    }

    fn schema_with_composites(composites: Vec<Composite>) -> Schema {
        let columns = vec![
            Column::new("pk", IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::String),
            Column::new("last", IndexKind::empty(), ColumnType::String),
            Column::new("first", IndexKind::empty(), ColumnType::String),
            Column::new("by_name", IndexKind::ORDERED, ColumnType::Null),
            Column::new("by_name_rev", IndexKind::ORDERED | IndexKind::REVERSE, ColumnType::Null),
        ];
        Schema::new("people", columns, composites)
    }

    #[test]
    fn obverse_and_reverse_composites_over_the_same_members_are_allowed() {
        let schema = schema_with_composites(vec![
            Composite { column_index: 3, members: vec![1, 2], kind: IndexKind::ORDERED },
            Composite { column_index: 4, members: vec![1, 2], kind: IndexKind::ORDERED | IndexKind::REVERSE },
        ]);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn composites_over_the_same_members_and_direction_are_rejected() {
        let schema = schema_with_composites(vec![
            Composite { column_index: 3, members: vec![1, 2], kind: IndexKind::ORDERED },
            Composite { column_index: 4, members: vec![1, 2], kind: IndexKind::ORDERED },
        ]);
        assert!(matches!(schema.validate(), Err(Error::SimilarIndex(_))));
    }

    #[test]
    fn composite_ordering_that_is_a_redundant_prefix_of_another_is_rejected() {
        let schema = schema_with_composites(vec![
            Composite { column_index: 3, members: vec![1], kind: IndexKind::ORDERED },
            Composite { column_index: 4, members: vec![1, 2], kind: IndexKind::ORDERED },
        ]);
        assert!(matches!(schema.validate(), Err(Error::SimilarIndex(_))));
    }
}
