//! The 64-bit packed column descriptor (§3 of the data model: a
//! case-insensitive name-hash in the high bits, a 4-bit column type, and a
//! 5-bit index-kind field in between). Shoves are the stable identity of
//! columns in the stored schema; equality ignores the name-hash bits.

use ahash::RandomState;
use std::hash::{BuildHasher as _, Hash, Hasher};

const TYPE_BITS: u32 = 4;
const KIND_BITS: u32 = 5;
const TYPE_MASK: u64 = (1 << TYPE_BITS) - 1;
const KIND_MASK: u64 = (1 << KIND_BITS) - 1;
const NAME_HASH_SHIFT: u32 = TYPE_BITS + KIND_BITS;

/// Deterministic, fixed-seed hasher for name-hashes, checksum seeds and the
/// unordered-index/oversized-key hash, so that shoves (and the stored
/// schema bytes that embed them) are reproducible across process restarts.
/// `ahash`'s default-constructed state draws from a random per-process seed
/// in general, but `RandomState::with_seeds` pins it.
fn name_hasher() -> ahash::AHasher {
    RandomState::with_seeds(0x9e37_79b9_7f4a_7c15, 0xbf58_476d_1ce4_e5b9, 0x94d0_49bb_1331_11eb, 0x2545_f491_4f6c_dd1d)
        .build_hasher()
}

/// Hashes a column/table name case-insensitively, matching the "name
/// comparisons ignore case" convention carried by every `Name` handle.
pub fn hash_name(name: &str) -> u64 {
    let mut hasher = name_hasher();
    for byte in name.bytes() {
        byte.to_ascii_lowercase().hash(&mut hasher);
    }
    hasher.finish()
}

/// Column type (§3). `Null` is only ever used as the placeholder type for a
/// pure composite column (one that exists solely to name a composite's
/// position in `columns[]` and carries no value of its own).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Null = 0,
    Uint16 = 1,
    Uint32 = 2,
    Uint64 = 3,
    Int32 = 4,
    Int64 = 5,
    Float32 = 6,
    Float64 = 7,
    DateTime = 8,
    Fixed96 = 9,
    Fixed128 = 10,
    Fixed160 = 11,
    Fixed256 = 12,
    String = 13,
    Opaque = 14,
    Nested = 15,
}

impl ColumnType {
    pub fn from_bits(bits: u64) -> Option<Self> {
        Some(match bits & TYPE_MASK {
            0 => ColumnType::Null,
            1 => ColumnType::Uint16,
            2 => ColumnType::Uint32,
            3 => ColumnType::Uint64,
            4 => ColumnType::Int32,
            5 => ColumnType::Int64,
            6 => ColumnType::Float32,
            7 => ColumnType::Float64,
            8 => ColumnType::DateTime,
            9 => ColumnType::Fixed96,
            10 => ColumnType::Fixed128,
            11 => ColumnType::Fixed160,
            12 => ColumnType::Fixed256,
            13 => ColumnType::String,
            14 => ColumnType::Opaque,
            15 => ColumnType::Nested,
            _ => return None,
        })
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Uint16
                | ColumnType::Uint32
                | ColumnType::Uint64
                | ColumnType::Int32
                | ColumnType::Int64
                | ColumnType::Float32
                | ColumnType::Float64
                | ColumnType::DateTime
        )
    }

    /// Fixed encoded width in bytes for types whose value-bytes length never
    /// varies (excludes `String`/`Opaque`/`Nested`/`Null`).
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnType::Uint16 => Some(2),
            ColumnType::Uint32 | ColumnType::Int32 | ColumnType::Float32 => Some(4),
            ColumnType::Uint64 | ColumnType::Int64 | ColumnType::Float64 | ColumnType::DateTime => Some(8),
            ColumnType::Fixed96 => Some(12),
            ColumnType::Fixed128 => Some(16),
            ColumnType::Fixed160 => Some(20),
            ColumnType::Fixed256 => Some(32),
            _ => None,
        }
    }

    /// Whether a reverse direction is permitted for this type (§3: "reverse
    /// meaningful only for widths >= 12 bytes or for sign/endian-sensitive
    /// numeric NIL handling"). Every fixed-width type qualifies on one
    /// ground or the other; variable-length types (`String`/`Opaque`) and
    /// `Nested`/`Null` do not.
    pub fn allows_reverse(self) -> bool {
        self.fixed_width().is_some()
    }
}

bitflags::bitflags! {
    /// Orthogonal index-kind flags (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IndexKind: u8 {
        const PRIMARY    = 0b0000_0001;
        const UNIQUE     = 0b0000_0010;
        const ORDERED    = 0b0000_0100;
        const REVERSE    = 0b0000_1000;
        const NULLABLE   = 0b0001_0000;
    }
}

impl IndexKind {
    pub fn is_secondary(self) -> bool {
        !self.contains(IndexKind::PRIMARY) && !self.is_empty()
    }

    pub fn is_indexed(self) -> bool {
        self.contains(IndexKind::ORDERED) || !self.is_empty()
    }

    pub fn has_duplicates(self) -> bool {
        !self.contains(IndexKind::UNIQUE)
    }

    pub fn to_bits(self) -> u64 {
        self.bits() as u64
    }

    pub fn from_bits_checked(bits: u64) -> Option<Self> {
        IndexKind::from_bits((bits & KIND_MASK) as u8)
    }
}

/// A 64-bit packed column descriptor: `[ name_hash | index_kind | type ]`.
#[derive(Debug, Clone, Copy, Eq)]
pub struct Shove(pub u64);

impl Shove {
    pub fn new(name: &str, kind: IndexKind, ty: ColumnType) -> Self {
        let name_hash = hash_name(name);
        let packed = (name_hash << NAME_HASH_SHIFT)
            | (kind.to_bits() << TYPE_BITS)
            | (ty as u64 & TYPE_MASK);
        Shove(packed)
    }

    pub fn column_type(self) -> Option<ColumnType> {
        ColumnType::from_bits(self.0)
    }

    pub fn index_kind(self) -> Option<IndexKind> {
        IndexKind::from_bits_checked(self.0 >> TYPE_BITS)
    }

    /// The identity bits used for equality/ordering/hashing: name-hash is
    /// excluded from semantic equality per §3 ("Equality of two shoves
    /// ignores the hash bits; name collisions resolve by reserved-bit
    /// pattern") — but we keep the name-hash in the raw representation
    /// since it is what actually disambiguates two columns sharing a type
    /// and index-kind. `identity_bits` is the low `TYPE_BITS + KIND_BITS`.
    fn low_bits(self) -> u64 {
        self.0 & ((1 << NAME_HASH_SHIFT) - 1)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// The name-hash bits alone, used to recognize the same logical column
    /// (or table) across a schema reload even if its type or index-kind
    /// changed underneath a `Name` handle.
    pub fn name_hash_bits(self) -> u64 {
        self.0 >> NAME_HASH_SHIFT
    }

    pub fn from_raw(raw: u64) -> Self {
        Shove(raw)
    }
}

impl PartialEq for Shove {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Hash for Shove {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Shove {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Shove {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

/// Derives the "dbi shove" for a per-index sub-database (§4.3): the table's
/// shove mixed with the column ordinal within the table.
pub fn dbi_shove(table: Shove, column_ordinal: usize) -> u64 {
    let mut hasher = name_hasher();
    table.0.hash(&mut hasher);
    column_ordinal.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_hash_is_case_insensitive() {
        assert_eq!(hash_name("Age"), hash_name("age"));
        assert_eq!(hash_name("AGE"), hash_name("age"));
    }

    #[test]
    fn roundtrips_type_and_kind() {
        let kind = IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED;
        let shove = Shove::new("id", kind, ColumnType::Uint64);
        assert_eq!(shove.column_type(), Some(ColumnType::Uint64));
        assert_eq!(shove.index_kind(), Some(kind));
    }

    #[test]
    fn equality_is_bitwise_not_low_bits_only() {
        let a = Shove::new("id", IndexKind::PRIMARY, ColumnType::Uint64);
        let b = Shove::new("other_name", IndexKind::PRIMARY, ColumnType::Uint64);
        // Different names produce different name-hash bits, so the raw
        // shoves differ even though type/kind coincide.
        assert_ne!(a, b);
        assert_eq!(a.low_bits(), b.low_bits());
    }

    #[test]
    fn dbi_shove_distinguishes_ordinals() {
        let t = Shove::new("t", IndexKind::PRIMARY, ColumnType::Null);
        assert_ne!(dbi_shove(t, 0), dbi_shove(t, 1));
    }
}
