//! Fixed-capacity cache of resolved sub-database handles, keyed by dbi-shove
//! (§4.3). Avoids re-deriving a dbi name and re-opening it on every cursor
//! and table operation; invalidated wholesale whenever `schema_csn` advances
//! past an entry's recorded version.

use std::sync::Mutex;

const LOAD_FACTOR: usize = 5;

#[derive(Clone, Debug)]
struct Entry {
    shove: u64,
    dbi_name: String,
    csn: u64,
}

/// A locked, linearly-probed hash table. The original design keyed off a
/// lock-free hint slot per bucket; tupledb keeps the whole table behind one
/// mutex; `log::warn!` on a probe chain longer than a few slots so a
/// too-small `tables_max` doesn't degrade silently (see design notes, Open
/// Question 2).
pub struct HandleCache {
    slots: Mutex<Vec<Option<Entry>>>,
    capacity: usize,
}

impl HandleCache {
    /// `capacity` is the final slot count (conventionally `tables_max *
    /// LOAD_FACTOR`; see `DbConfig::new`), not a table count to be scaled
    /// here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(LOAD_FACTOR);
        HandleCache { slots: Mutex::new(vec![None; capacity]), capacity }
    }

    fn bucket(&self, shove: u64) -> usize {
        (shove as usize) % self.capacity
    }

    /// Looks up a cached dbi name for `shove`, valid as of `csn`. A stale
    /// entry (recorded at an older `schema_csn`) is treated as a miss.
    pub fn get(&self, shove: u64, csn: u64) -> Option<String> {
        let slots = self.slots.lock().unwrap();
        let start = self.bucket(shove);
        let mut probes = 0;
        for i in 0..self.capacity {
            let idx = (start + i) % self.capacity;
            match &slots[idx] {
                Some(entry) if entry.shove == shove => {
                    return if entry.csn >= csn { Some(entry.dbi_name.clone()) } else { None };
                }
                None => return None,
                Some(_) => {
                    probes += 1;
                    continue;
                }
            }
        }
        if probes > 4 {
            log::warn!("handle cache probe chain exceeded 4 slots; consider a larger tables_max");
        }
        None
    }

    pub fn insert(&self, shove: u64, dbi_name: String, csn: u64) {
        let mut slots = self.slots.lock().unwrap();
        let start = self.bucket(shove);
        for i in 0..self.capacity {
            let idx = (start + i) % self.capacity;
            match &slots[idx] {
                Some(entry) if entry.shove == shove => {
                    slots[idx] = Some(Entry { shove, dbi_name, csn });
                    return;
                }
                None => {
                    slots[idx] = Some(Entry { shove, dbi_name, csn });
                    return;
                }
                Some(_) => continue,
            }
        }
        log::warn!("handle cache full at capacity {}, dropping insert for shove {:016x}", self.capacity, shove);
    }

    /// Invalidates every entry (a schema-transaction commit advancing
    /// `schema_csn` forces every reader's handles to be re-resolved).
    pub fn invalidate_all(&self) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            *slot = None;
        }
    }

    /// Invalidates only the entries belonging to sub-databases created
    /// within an aborted write transaction (§4.9's `internal_abort`).
    pub fn invalidate(&self, shoves: &[u64]) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            if let Some(entry) = slot {
                if shoves.contains(&entry.shove) {
                    *slot = None;
                }
            }
        }
    }
}
