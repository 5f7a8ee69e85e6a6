use std::path::Path;

use crate::engine::{KvEngine, ScanIteratorT, Status};
use crate::error::TdResult;

/// The production `KvEngine`, backed by `sled` — an embedded, memory-mapped,
/// ordered B-tree store. Each named sub-database is a `sled::Tree`; `sled`
/// itself multiplexes all trees onto one on-disk file and one shared page
/// cache, matching the "one environment, many dbis" shape the rest of the
/// crate assumes.
pub struct SledEngine {
    db: sled::Db,
}

impl SledEngine {
    pub fn new<P: AsRef<Path>>(path: P) -> TdResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> TdResult<sled::Tree> {
        Ok(self.db.open_tree(name)?)
    }
}

impl std::fmt::Display for SledEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sled")
    }
}

impl KvEngine for SledEngine {
    type ScanIterator<'a> = SledScanIterator;

    fn open_db(&self, name: &str) -> TdResult<()> {
        self.tree(name)?;
        Ok(())
    }

    fn drop_db(&self, name: &str) -> TdResult<()> {
        self.db.drop_tree(name)?;
        Ok(())
    }

    fn has_db(&self, name: &str) -> TdResult<bool> {
        Ok(self.db.tree_names().iter().any(|n| n == name.as_bytes()))
    }

    fn delete(&self, db: &str, key: &[u8]) -> TdResult<()> {
        self.tree(db)?.remove(key)?;
        Ok(())
    }

    fn flush(&self) -> TdResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn get(&self, db: &str, key: &[u8]) -> TdResult<Option<Vec<u8>>> {
        Ok(self.tree(db)?.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&self, db: &str, key: &[u8], value: Vec<u8>) -> TdResult<()> {
        self.tree(db)?.insert(key, value)?;
        Ok(())
    }

    fn scan(
        &self,
        db: &str,
        range: (std::ops::Bound<Vec<u8>>, std::ops::Bound<Vec<u8>>),
    ) -> TdResult<Box<dyn ScanIteratorT + '_>> {
        let tree = self.tree(db)?;
        Ok(Box::new(SledScanIterator { inner: tree.range(range) }))
    }

    fn status(&self, db: &str) -> TdResult<Status> {
        let tree = self.tree(db)?;
        let mut keys = 0u64;
        let mut size = 0u64;
        for item in tree.iter() {
            let (k, v) = item?;
            keys += 1;
            size += k.len() as u64 + v.len() as u64;
        }
        Ok(Status { name: "sled".to_string(), keys, size })
    }
}

pub struct SledScanIterator {
    inner: sled::Iter,
}

impl Iterator for SledScanIterator {
    type Item = TdResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Into::into))
    }
}

impl DoubleEndedIterator for SledScanIterator {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::kv_engine_contract;

    fn setup() -> SledEngine {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SledEngine::new(dir.path()).expect("open sled");
        // Keep the directory alive for the lifetime of the test process; each
        // test gets its own tempdir and the OS reclaims them on exit.
        std::mem::forget(dir);
        engine
    }

    kv_engine_contract!(setup());
}
