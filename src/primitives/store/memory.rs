use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use bytes::Bytes;
use dashmap::DashMap;

use super::RecordStore;
use crate::types::{BLinkError, RecId, Result};

/// On-heap record store.
///
/// Records live in a sharded concurrent map so readers never contend with
/// writers on unrelated ids.
pub struct MemoryStore {
    records: DashMap<u64, Bytes>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live records, preallocated ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(BLinkError::Closed);
        }
        Ok(())
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, AtomicOrdering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn preallocate(&self) -> Result<RecId> {
        self.ensure_open()?;
        let id = self.allocate();
        self.records.insert(id, Bytes::new());
        Ok(RecId(id))
    }

    fn put(&self, record: &[u8]) -> Result<RecId> {
        self.ensure_open()?;
        let id = self.allocate();
        self.records.insert(id, Bytes::copy_from_slice(record));
        Ok(RecId(id))
    }

    fn update(&self, id: RecId, record: &[u8]) -> Result<()> {
        self.ensure_open()?;
        match self.records.get_mut(&id.0) {
            Some(mut slot) => {
                *slot = Bytes::copy_from_slice(record);
                Ok(())
            }
            None => Err(BLinkError::corruption(format!(
                "update of unknown recid {id}"
            ))),
        }
    }

    fn get(&self, id: RecId) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.records.get(&id.0).map(|slot| slot.value().clone()))
    }

    fn delete(&self, id: RecId) -> Result<()> {
        self.ensure_open()?;
        match self.records.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(BLinkError::corruption(format!(
                "delete of unknown recid {id}"
            ))),
        }
    }

    fn compare_and_swap(&self, id: RecId, expected: &[u8], new: &[u8]) -> Result<bool> {
        self.ensure_open()?;
        let Some(mut slot) = self.records.get_mut(&id.0) else {
            return Err(BLinkError::corruption(format!(
                "compare-and-swap of unknown recid {id}"
            )));
        };
        if slot.as_ref() != expected {
            return Ok(false);
        }
        *slot = Bytes::copy_from_slice(new);
        Ok(true)
    }

    fn commit(&self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, AtomicOrdering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_update_delete() -> Result<()> {
        let store = MemoryStore::new();
        let id = store.put(b"one")?;
        assert!(!id.is_null());
        assert_eq!(store.get(id)?.as_deref(), Some(&b"one"[..]));
        store.update(id, b"two")?;
        assert_eq!(store.get(id)?.as_deref(), Some(&b"two"[..]));
        store.delete(id)?;
        assert_eq!(store.get(id)?, None);
        assert!(store.delete(id).unwrap_err().is_corruption());
        Ok(())
    }

    #[test]
    fn preallocated_id_reads_empty_until_updated() -> Result<()> {
        let store = MemoryStore::new();
        let id = store.preallocate()?;
        assert_eq!(store.get(id)?.as_deref(), Some(&b""[..]));
        store.update(id, b"root")?;
        assert_eq!(store.get(id)?.as_deref(), Some(&b"root"[..]));
        Ok(())
    }

    #[test]
    fn compare_and_swap_checks_current_value() -> Result<()> {
        let store = MemoryStore::new();
        let id = store.put(b"a")?;
        assert!(!store.compare_and_swap(id, b"b", b"c")?);
        assert!(store.compare_and_swap(id, b"a", b"c")?);
        assert_eq!(store.get(id)?.as_deref(), Some(&b"c"[..]));
        assert!(store
            .compare_and_swap(RecId(999), b"a", b"b")
            .unwrap_err()
            .is_corruption());
        Ok(())
    }

    #[test]
    fn closed_store_rejects_calls() -> Result<()> {
        let store = MemoryStore::new();
        let id = store.put(b"x")?;
        store.close()?;
        assert!(store.is_closed());
        assert!(matches!(store.get(id), Err(BLinkError::Closed)));
        assert!(matches!(store.put(b"y"), Err(BLinkError::Closed)));
        assert!(matches!(store.commit(), Err(BLinkError::Closed)));
        Ok(())
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..256)
                        .map(|i: u32| store.put(&i.to_be_bytes()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<RecId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 4 * 256);
        assert_eq!(store.len(), 4 * 256);
    }
}
