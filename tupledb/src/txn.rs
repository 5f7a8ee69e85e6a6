//! Database handle and three-level transactions (§4.9, §D). A `KvEngine` is
//! not itself transactional across sub-databases — `Transaction` layers
//! read/write/schema semantics and the schema read-write lock on top of a
//! plain engine, the way an MVCC layer wraps a storage engine below it.

use crate::engine::KvEngine;
use crate::error::{Error, TdResult};
use crate::handle_cache::HandleCache;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Flush the engine after every committing write transaction.
    Flush,
    /// Let the engine buffer writes; flush only on `Database::flush` or drop.
    Buffered,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// `false` makes schema transactions fail with `Perm`.
    pub alterable: bool,
    /// Defaults to `tables_max * 5`; see `HandleCache`.
    pub handle_cache_capacity: usize,
    pub durability: Durability,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>, tables_max: usize) -> Self {
        DbConfig { path: path.into(), alterable: true, handle_cache_capacity: tables_max * 5, durability: Durability::Flush }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnLevel {
    Read,
    Write,
    /// Exclusive: blocks all other transactions, permitted only when
    /// `DbConfig::alterable` is set.
    Schema,
}

/// The three engine-provided canary words spec.md describes: the current
/// schema change sequence number, a monotonic per-database write sequence,
/// and a free-running "manna" counter used only for liveness diagnostics.
#[derive(Debug, Default)]
struct Canaries {
    schema_csn: AtomicU64,
    db_sequence: AtomicU64,
    manna: AtomicU64,
}

pub struct Database {
    pub engine: Arc<dyn KvEngine>,
    pub config: DbConfig,
    schema_rwlock: RwLock<()>,
    canaries: Canaries,
    pub handle_cache: HandleCache,
}

impl Database {
    pub fn open(engine: Arc<dyn KvEngine>, config: DbConfig) -> Self {
        let handle_cache = HandleCache::new(config.handle_cache_capacity);
        Database { engine, config, schema_rwlock: RwLock::new(()), canaries: Canaries::default(), handle_cache }
    }

    pub fn schema_csn(&self) -> u64 {
        self.canaries.schema_csn.load(Ordering::SeqCst)
    }

    fn bump_schema_csn(&self) -> u64 {
        self.canaries.schema_csn.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_db_sequence(&self) -> u64 {
        self.canaries.db_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn begin_read(&self) -> TdResult<ReadGuard<'_>> {
        let guard = self.schema_rwlock.read().map_err(|_| Error::WannaDie("schema lock poisoned".to_string()))?;
        Ok(ReadGuard { _guard: guard, schema_version_at_open: self.schema_csn() })
    }

    pub fn begin_write(&self) -> TdResult<Transaction<'_>> {
        let guard = self.schema_rwlock.read().map_err(|_| Error::WannaDie("schema lock poisoned".to_string()))?;
        Ok(Transaction {
            db: self,
            level: TxnLevel::Write,
            schema_version_at_open: self.schema_csn(),
            created_dbis: Vec::new(),
            ended: false,
            _read_guard: Some(guard),
            _write_guard: None,
        })
    }

    pub fn begin_schema(&self) -> TdResult<Transaction<'_>> {
        if !self.config.alterable {
            return Err(Error::Perm("database is not alterable; schema transactions are disabled".to_string()));
        }
        let guard = self.schema_rwlock.write().map_err(|_| Error::WannaDie("schema lock poisoned".to_string()))?;
        Ok(Transaction {
            db: self,
            level: TxnLevel::Schema,
            schema_version_at_open: self.schema_csn(),
            created_dbis: Vec::new(),
            ended: false,
            _read_guard: None,
            _write_guard: Some(guard),
        })
    }

    pub fn flush(&self) -> TdResult<()> {
        self.engine.flush()
    }

    /// The raw-key length past which `codec::key_codec` shoves a key into a
    /// head/tail/hash split instead of storing it verbatim. A single
    /// database-wide constant today (`codec::MAX_KEYLEN`); exposed as a
    /// method rather than a bare constant so a future per-database value
    /// (keyed off the backing engine's page size) is not a breaking change.
    pub fn max_keylen(&self) -> usize {
        crate::codec::MAX_KEYLEN
    }
}

/// A read-only transaction: just a shared hold on the schema lock plus the
/// schema version it observed. Its renewal rule (§4.9) is: if the
/// database's `schema_csn` has advanced since `schema_version_at_open`,
/// any `Name` resolved against this transaction must be refreshed before
/// use (`Error::SchemaChanged` otherwise).
pub struct ReadGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    schema_version_at_open: u64,
}

impl<'a> ReadGuard<'a> {
    pub fn schema_version(&self) -> u64 {
        self.schema_version_at_open
    }
}

/// A write or schema transaction. Write transactions hold the schema lock
/// shared (so they can run alongside other writers and readers but not
/// alongside a schema transaction); schema transactions hold it exclusive.
pub struct Transaction<'a> {
    db: &'a Database,
    level: TxnLevel,
    schema_version_at_open: u64,
    /// Dbi shoves created by this transaction, so `internal_abort` can
    /// purge their cache entries (sub-databases are not transactional:
    /// once opened on the engine they stay opened even if the owning
    /// schema transaction is rolled back at the tupledb layer).
    created_dbis: Vec<u64>,
    ended: bool,
    _read_guard: Option<RwLockReadGuard<'a, ()>>,
    _write_guard: Option<RwLockWriteGuard<'a, ()>>,
}

impl<'a> Transaction<'a> {
    pub fn level(&self) -> TxnLevel {
        self.level
    }

    pub fn schema_version(&self) -> u64 {
        self.schema_version_at_open
    }

    pub fn engine(&self) -> &dyn KvEngine {
        self.db.engine.as_ref()
    }

    pub fn note_created_dbi(&mut self, shove: u64) {
        self.created_dbis.push(shove);
    }

    /// The csn a `schema::create_table`/`drop_table` call committed within
    /// this transaction should stamp onto its schema record — one past the
    /// version this transaction observed at open, since `commit` bumps
    /// `schema_csn` by exactly one on a schema-level transaction.
    pub fn next_schema_csn(&self) -> u64 {
        self.schema_version_at_open + 1
    }

    /// Commits the transaction. A schema transaction bumps `schema_csn`,
    /// which invalidates every cached handle database-wide (§4.2/§4.3: any
    /// reader whose handles predate the bump must refresh before its next
    /// use, rather than silently serving stale dbi names).
    pub fn commit(mut self) -> TdResult<()> {
        self.ended = true;
        self.db.next_db_sequence();
        if self.level == TxnLevel::Schema {
            self.db.bump_schema_csn();
            self.db.handle_cache.invalidate_all();
            log::info!("schema transaction committed, schema_csn={}", self.db.schema_csn());
        }
        if self.db.config.durability == Durability::Flush {
            self.db.flush()?;
        }
        Ok(())
    }

    /// Aborts the transaction, purging this transaction's own newly
    /// created sub-database handles from the cache so a retry does not
    /// observe a half-created index (§4.9's `internal_abort`).
    pub fn abort(mut self) -> TdResult<()> {
        self.ended = true;
        if !self.created_dbis.is_empty() {
            log::error!("internal_abort purging {} dbi handle(s) created by this transaction", self.created_dbis.len());
            self.db.handle_cache.invalidate(&self.created_dbis);
        }
        Ok(())
    }
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        if !self.ended {
            if !self.created_dbis.is_empty() {
                self.db.handle_cache.invalidate(&self.created_dbis);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_engine::MemoryEngine;

    fn setup() -> Database {
        let engine: Arc<dyn KvEngine> = Arc::new(MemoryEngine::new());
        Database::open(engine, DbConfig::new("/tmp/unused", 8))
    }

    #[test]
    fn schema_txn_commit_bumps_csn_and_invalidates_cache() {
        let db = setup();
        db.handle_cache.insert(1, "dbi-1".to_string(), db.schema_csn());
        let txn = db.begin_schema().unwrap();
        txn.commit().unwrap();
        assert_eq!(db.schema_csn(), 1);
        assert_eq!(db.handle_cache.get(1, 0), None);
    }

    #[test]
    fn schema_txn_on_non_alterable_db_is_perm() {
        let mut db = setup();
        db.config.alterable = false;
        assert!(matches!(db.begin_schema(), Err(Error::Perm(_))));
    }

    #[test]
    fn write_and_read_transactions_observe_schema_version_at_open() {
        let db = setup();
        let read = db.begin_read().unwrap();
        assert_eq!(read.schema_version(), 0);
        let schema_txn = db.begin_schema().unwrap();
        schema_txn.commit().unwrap();
        assert_eq!(read.schema_version(), 0);
        assert_eq!(db.schema_csn(), 1);
    }

    #[test]
    fn abort_purges_only_this_transactions_created_dbis() {
        let db = setup();
        db.handle_cache.insert(5, "dbi-5".to_string(), db.schema_csn());
        db.handle_cache.insert(6, "dbi-6".to_string(), db.schema_csn());
        let mut txn = db.begin_write().unwrap();
        txn.note_created_dbi(5);
        txn.abort().unwrap();
        assert_eq!(db.handle_cache.get(5, 0), None);
        assert_eq!(db.handle_cache.get(6, 0), Some("dbi-6".to_string()));
    }

    #[test]
    fn committed_write_transaction_does_not_purge_cache_on_drop() {
        let db = setup();
        db.handle_cache.insert(9, "dbi-9".to_string(), db.schema_csn());
        let mut txn = db.begin_write().unwrap();
        txn.note_created_dbi(9);
        txn.commit().unwrap();
        assert_eq!(db.handle_cache.get(9, 0), Some("dbi-9".to_string()));
    }

    #[test]
    fn max_keylen_reports_the_codec_constant() {
        let db = setup();
        assert_eq!(db.max_keylen(), crate::codec::MAX_KEYLEN);
    }

    #[test]
    fn next_schema_csn_is_one_past_the_version_observed_at_open() {
        let db = setup();
        let first = db.begin_schema().unwrap();
        assert_eq!(first.next_schema_csn(), 1);
        first.commit().unwrap();

        let second = db.begin_schema().unwrap();
        assert_eq!(second.next_schema_csn(), 2);
    }
}
