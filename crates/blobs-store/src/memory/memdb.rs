//! A tiny copy-on-write transactional table.
//!
//! Committed state is an immutable snapshot behind an `Arc`. Readers clone
//! the `Arc` and never block writers. Writers are serialized by a mutex and
//! stage their changes in a small overlay on top of the snapshot they
//! started from. [`WriteTxn::commit`] applies the overlay and publishes the
//! result atomically; a write transaction that is dropped without being
//! committed is rolled back.
//!
//! Commit applies the overlay in place when no [`ReadTxn`] still holds the
//! current snapshot, costing `O(k log n)` for `k` staged keys. If a reader is
//! holding it, commit has to copy the whole map first, which is `O(n)`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::error::{StoreError, StoreResult};

type Snapshot<K, V> = Arc<BTreeMap<K, V>>;

/// A single keyed table with one-writer-at-a-time transactions.
pub struct Table<K, V> {
    name: &'static str,
    root: RwLock<Snapshot<K, V>>,
    writer: Mutex<()>,
}

impl<K: Ord + Clone, V: Clone> Table<K, V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            root: RwLock::new(Arc::new(BTreeMap::new())),
            writer: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Start a read-only transaction over the latest committed snapshot.
    pub fn read(&self) -> StoreResult<ReadTxn<K, V>> {
        Ok(ReadTxn {
            snapshot: self.snapshot()?,
        })
    }

    /// Start a read-write transaction. Blocks while another writer is open.
    pub fn write(&self) -> StoreResult<WriteTxn<'_, K, V>> {
        let guard = self
            .writer
            .lock()
            .map_err(|e| StoreError::Txn(format!("{} writer lock poisoned: {e}", self.name)))?;
        Ok(WriteTxn {
            table: self,
            _guard: guard,
            base: self.snapshot()?,
            cleared: false,
            pending: BTreeMap::new(),
        })
    }

    fn snapshot(&self) -> StoreResult<Snapshot<K, V>> {
        let root = self
            .root
            .read()
            .map_err(|e| StoreError::Txn(format!("{} root lock poisoned: {e}", self.name)))?;
        Ok(Arc::clone(&root))
    }
}

/// Read-only view of one committed snapshot.
pub struct ReadTxn<K, V> {
    snapshot: Snapshot<K, V>,
}

impl<K: Ord, V> ReadTxn<K, V> {
    pub fn first(&self, key: &K) -> Option<&V> {
        self.snapshot.get(key)
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.snapshot.iter()
    }
}

/// Exclusive read-write transaction.
///
/// Changes are staged as an overlay on the snapshot the transaction started
/// from. Dropping the handle without calling [`commit`](Self::commit)
/// discards them.
pub struct WriteTxn<'a, K, V> {
    table: &'a Table<K, V>,
    _guard: MutexGuard<'a, ()>,
    base: Snapshot<K, V>,
    /// Set by `truncate`: the base is ignored.
    cleared: bool,
    /// Staged writes; `None` marks a deletion.
    pending: BTreeMap<K, Option<V>>,
}

impl<K: Ord + Clone, V: Clone> WriteTxn<'_, K, V> {
    /// Look up a key, seeing this transaction's own staged changes.
    pub fn first(&self, key: &K) -> Option<&V> {
        match self.pending.get(key) {
            Some(staged) => staged.as_ref(),
            None if self.cleared => None,
            None => self.base.get(key),
        }
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.first(&key).cloned();
        self.pending.insert(key, Some(value));
        previous
    }

    /// Remove a key, returning the removed value.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let previous = self.first(key).cloned()?;
        self.pending.insert(key.clone(), None);
        Some(previous)
    }

    /// Remove every entry.
    pub fn truncate(&mut self) {
        self.cleared = true;
        self.pending.clear();
    }

    /// Publish staged changes. A transaction with no changes commits as a
    /// no-op.
    pub fn commit(self) -> StoreResult<()> {
        let WriteTxn {
            table,
            _guard,
            base,
            cleared,
            pending,
        } = self;
        if !cleared && pending.is_empty() {
            return Ok(());
        }
        // Our own handle on the snapshot would force a copy below.
        drop(base);

        let mut root = table
            .root
            .write()
            .map_err(|e| StoreError::Txn(format!("{} root lock poisoned: {e}", table.name)))?;
        let map = Arc::make_mut(&mut *root);
        if cleared {
            map.clear();
        }
        for (key, value) in pending {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Discard staged changes. Equivalent to dropping the handle.
    pub fn abort(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table<String, u32> {
        Table::new("test")
    }

    #[test]
    fn committed_insert_is_visible() {
        let t = table();
        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.commit().unwrap();

        let read = t.read().unwrap();
        assert_eq!(read.first(&"a".into()), Some(&1));
        assert_eq!(read.len(), 1);
    }

    #[test]
    fn dropped_txn_rolls_back() {
        let t = table();
        {
            let mut txn = t.write().unwrap();
            txn.insert("a".into(), 1);
            assert_eq!(txn.first(&"a".into()), Some(&1));
        }
        assert!(t.read().unwrap().is_empty());
    }

    #[test]
    fn explicit_abort_rolls_back() {
        let t = table();
        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.abort();
        assert!(t.read().unwrap().first(&"a".into()).is_none());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let t = table();
        let before = t.read().unwrap();

        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.commit().unwrap();

        assert!(before.first(&"a".into()).is_none());
        assert_eq!(t.read().unwrap().first(&"a".into()), Some(&1));
    }

    #[test]
    fn delete_missing_key_stages_nothing() {
        let t = table();
        let mut txn = t.write().unwrap();
        assert_eq!(txn.delete(&"nope".into()), None);
        assert!(txn.pending.is_empty());
        txn.commit().unwrap();
    }

    #[test]
    fn staged_changes_shadow_the_base() {
        let t = table();
        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.insert("b".into(), 2);
        txn.commit().unwrap();

        let mut txn = t.write().unwrap();
        assert_eq!(txn.insert("a".into(), 10), Some(1));
        assert_eq!(txn.delete(&"b".into()), Some(2));
        assert_eq!(txn.first(&"a".into()), Some(&10));
        assert_eq!(txn.first(&"b".into()), None);
        assert_eq!(txn.delete(&"b".into()), None);
        txn.commit().unwrap();

        let read = t.read().unwrap();
        assert_eq!(read.first(&"a".into()), Some(&10));
        assert_eq!(read.len(), 1);
    }

    #[test]
    fn commit_without_readers_updates_in_place() {
        let t = table();
        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.commit().unwrap();

        let before = Arc::as_ptr(&t.snapshot().unwrap());
        let mut txn = t.write().unwrap();
        txn.insert("b".into(), 2);
        txn.commit().unwrap();
        let after = Arc::as_ptr(&t.snapshot().unwrap());

        assert_eq!(before, after);
        assert_eq!(t.read().unwrap().len(), 2);
    }

    #[test]
    fn commit_with_live_reader_copies() {
        let t = table();
        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.commit().unwrap();

        let reader = t.read().unwrap();
        let mut txn = t.write().unwrap();
        txn.delete(&"a".into());
        txn.commit().unwrap();

        assert_eq!(reader.first(&"a".into()), Some(&1));
        assert!(t.read().unwrap().is_empty());
    }

    #[test]
    fn truncate_then_insert() {
        let t = table();
        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.commit().unwrap();

        let mut txn = t.write().unwrap();
        txn.truncate();
        assert_eq!(txn.first(&"a".into()), None);
        txn.insert("b".into(), 2);
        txn.commit().unwrap();

        let read = t.read().unwrap();
        let keys: Vec<_> = read.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["b".to_string()]);
    }

    #[test]
    fn delete_then_commit() {
        let t = table();
        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.insert("b".into(), 2);
        txn.commit().unwrap();

        let mut txn = t.write().unwrap();
        assert_eq!(txn.delete(&"a".into()), Some(1));
        txn.commit().unwrap();

        let read = t.read().unwrap();
        let keys: Vec<_> = read.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["b".to_string()]);
    }

    #[test]
    fn truncate_clears_everything() {
        let t = table();
        let mut txn = t.write().unwrap();
        txn.insert("a".into(), 1);
        txn.commit().unwrap();

        let mut txn = t.write().unwrap();
        txn.truncate();
        txn.commit().unwrap();
        assert!(t.read().unwrap().is_empty());
    }

    #[test]
    fn writers_are_serialized() {
        use std::sync::Arc;
        use std::thread;

        let t = Arc::new(table());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut txn = t.write().unwrap();
                        let n = txn.first(&"n".into()).copied().unwrap_or(0);
                        txn.insert("n".into(), n + 1);
                        txn.commit().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(t.read().unwrap().first(&"n".into()), Some(&800));
    }
}
