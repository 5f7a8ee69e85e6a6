//! `tupledb` is an embedded structured-record store: typed tables with a
//! primary key, secondary indexes (unique or duplicate-bearing, ordered or
//! unordered, obverse or reverse), and navigable cursors, all layered atop a
//! transactional, memory-mapped key-value engine.
//!
//! The store owns schema management, key encoding and secondary-index
//! maintenance; it does not own value serialization — callers hand it
//! already-typed [`value::Row`]s and get already-typed rows back.
//!
//! ## Getting started
//!
//! ```rust
//! use tupledb::engine::MemoryEngine;
//! use tupledb::schema::{create_table, Column, Schema};
//! use tupledb::shove::{ColumnType, IndexKind};
//!
//! fn main() -> tupledb::error::TdResult<()> {
//!     let engine = MemoryEngine::new();
//!     let columns = vec![
//!         Column::new("id", IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::Uint64),
//!         Column::new("name", IndexKind::empty(), ColumnType::String),
//!     ];
//!     let schema = Schema::new("widgets", columns, Vec::new());
//!     create_table(&engine, schema, 1)?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod filter;
pub mod handle_cache;
pub mod index_ops;
pub mod saturated;
pub mod schema;
pub mod shove;
pub mod table_ops;
pub mod txn;
pub mod value;
pub mod value_codec;
