pub mod key_codec;
pub mod nil_sentinel;

pub use key_codec::{composite_row_to_key, key_to_value, row_to_key, value_to_key};

/// Upper bound on an ordered key's encoded length before it must be
/// "shoved" (head/tail-hashed) to fit the engine's page-derived key-size
/// limit. The original implementation keys this off the opened
/// environment's page size; tupledb exposes it as a single constant
/// (see `Database::max_keylen` in `txn.rs`) rather than threading a
/// configurable value through every encode call site.
pub const MAX_KEYLEN: usize = 388;

/// Total length of a shoved key: the untruncated head/tail plus a 64-bit
/// hash of the discarded remainder.
pub const SHOVED_KEYLEN: usize = MAX_KEYLEN + 8;

/// Marks the presence of a value ahead of (obverse) or behind (reverse) the
/// value bytes of a nullable byte-string-like column, so a zero-length
/// value is distinguishable from NIL under byte-wise compare.
pub const PRESENT_MARKER: u8 = 42;
