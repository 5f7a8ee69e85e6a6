use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::engine::{KvEngine, ScanIteratorT, Status};
use crate::error::{Error, TdResult};

/// An in-memory, per-named-sub-database engine backed by `BTreeMap`s. Used
/// throughout the test suite so tests do not pay for file I/O and the
/// property tests can run fast and repeatedly; never used in production.
pub struct MemoryEngine {
    dbs: RwLock<HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self { dbs: RwLock::new(HashMap::new()) }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory")
    }
}

impl KvEngine for MemoryEngine {
    type ScanIterator<'a> = MemoryScanIterator;

    fn open_db(&self, name: &str) -> TdResult<()> {
        self.dbs.write().unwrap().entry(name.to_string()).or_default();
        Ok(())
    }

    fn drop_db(&self, name: &str) -> TdResult<()> {
        self.dbs.write().unwrap().remove(name);
        Ok(())
    }

    fn has_db(&self, name: &str) -> TdResult<bool> {
        Ok(self.dbs.read().unwrap().contains_key(name))
    }

    fn delete(&self, db: &str, key: &[u8]) -> TdResult<()> {
        let mut dbs = self.dbs.write().unwrap();
        let tree = dbs.get_mut(db).ok_or_else(|| Error::Name(db.to_string()))?;
        tree.remove(key);
        Ok(())
    }

    fn flush(&self) -> TdResult<()> {
        Ok(())
    }

    fn get(&self, db: &str, key: &[u8]) -> TdResult<Option<Vec<u8>>> {
        let dbs = self.dbs.read().unwrap();
        let tree = dbs.get(db).ok_or_else(|| Error::Name(db.to_string()))?;
        Ok(tree.get(key).cloned())
    }

    fn set(&self, db: &str, key: &[u8], value: Vec<u8>) -> TdResult<()> {
        let mut dbs = self.dbs.write().unwrap();
        let tree = dbs.get_mut(db).ok_or_else(|| Error::Name(db.to_string()))?;
        tree.insert(key.to_vec(), value);
        Ok(())
    }

    fn scan(
        &self,
        db: &str,
        range: (std::ops::Bound<Vec<u8>>, std::ops::Bound<Vec<u8>>),
    ) -> TdResult<Box<dyn ScanIteratorT + '_>> {
        let dbs = self.dbs.read().unwrap();
        let tree = dbs.get(db).ok_or_else(|| Error::Name(db.to_string()))?;
        let items: Vec<TdResult<(Vec<u8>, Vec<u8>)>> =
            tree.range(range).map(|(k, v)| Ok((k.clone(), v.clone()))).collect();
        Ok(Box::new(MemoryScanIterator { inner: items.into_iter() }))
    }

    fn status(&self, db: &str) -> TdResult<Status> {
        let dbs = self.dbs.read().unwrap();
        let tree = dbs.get(db).ok_or_else(|| Error::Name(db.to_string()))?;
        Ok(Status {
            name: "memory".to_string(),
            keys: tree.len() as u64,
            size: tree.iter().fold(0, |size, (k, v)| size + k.len() as u64 + v.len() as u64),
        })
    }
}

/// Owns a materialized snapshot of the scanned range, since `MemoryEngine`
/// takes `&self` (it must be shareable across transactions the way `sled`
/// is) and cannot hand out an iterator borrowing the lock guard.
pub struct MemoryScanIterator {
    inner: std::vec::IntoIter<TdResult<(Vec<u8>, Vec<u8>)>>,
}

impl Iterator for MemoryScanIterator {
    type Item = TdResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl DoubleEndedIterator for MemoryScanIterator {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::kv_engine_contract;

    kv_engine_contract!(MemoryEngine::new());
}
