use std::ops::Bound;

use super::BLinkTree;
use crate::storage::btree::codecs::{KeyCodec, ValCodec};
use crate::storage::btree::cursor::Cursor;
use crate::storage::btree::descending::DescendingCursor;
use crate::types::Result;

impl<K: KeyCodec, V: ValCodec> BLinkTree<K, V> {
    /// Ascending cursor over `(lo, hi)` bounds.
    pub fn range(&self, lo: Bound<K>, hi: Bound<K>) -> Result<Cursor<'_, K, V>> {
        Cursor::new(self, lo, hi)
    }

    /// Descending cursor over `(lo, hi)` bounds; yields the largest key first.
    pub fn range_rev(&self, lo: Bound<K>, hi: Bound<K>) -> Result<DescendingCursor<'_, K, V>> {
        DescendingCursor::new(self, lo, hi)
    }

    /// Ascending cursor over every entry.
    pub fn iter(&self) -> Result<Cursor<'_, K, V>> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }

    /// Descending cursor over every entry.
    pub fn iter_rev(&self) -> Result<DescendingCursor<'_, K, V>> {
        self.range_rev(Bound::Unbounded, Bound::Unbounded)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Result<impl Iterator<Item = Result<K>> + '_> {
        Ok(self.iter()?.map(|entry| entry.map(|(key, _)| key)))
    }

    /// Values in ascending key order.
    pub fn values(&self) -> Result<impl Iterator<Item = Result<V>> + '_> {
        Ok(self.iter()?.map(|entry| entry.map(|(_, value)| value)))
    }

    /// Keys in descending order.
    pub fn keys_rev(&self) -> Result<impl Iterator<Item = Result<K>> + '_> {
        Ok(self.iter_rev()?.map(|entry| entry.map(|(key, _)| key)))
    }

    /// Values in descending key order.
    pub fn values_rev(&self) -> Result<impl Iterator<Item = Result<V>> + '_> {
        Ok(self.iter_rev()?.map(|entry| entry.map(|(_, value)| value)))
    }

    /// Smallest entry.
    pub fn first_entry(&self) -> Result<Option<(K, V)>> {
        self.iter()?.next_entry()
    }

    /// Largest entry.
    pub fn last_entry(&self) -> Result<Option<(K, V)>> {
        self.iter_rev()?.next_entry()
    }

    /// Smallest key.
    pub fn first_key(&self) -> Result<Option<K>> {
        Ok(self.first_entry()?.map(|(key, _)| key))
    }

    /// Largest key.
    pub fn last_key(&self) -> Result<Option<K>> {
        Ok(self.last_entry()?.map(|(key, _)| key))
    }

    /// Smallest entry with a key `>= key`.
    pub fn ceiling_entry(&self, key: &K) -> Result<Option<(K, V)>> {
        self.entry_at_or_after(key, true)
    }

    /// Smallest entry with a key `> key`.
    pub fn higher_entry(&self, key: &K) -> Result<Option<(K, V)>> {
        self.entry_at_or_after(key, false)
    }

    /// Largest entry with a key `<= key`.
    pub fn floor_entry(&self, key: &K) -> Result<Option<(K, V)>> {
        self.entry_at_or_before(key, true)
    }

    /// Largest entry with a key `< key`.
    pub fn lower_entry(&self, key: &K) -> Result<Option<(K, V)>> {
        self.entry_at_or_before(key, false)
    }

    /// Smallest key `>= key`.
    pub fn ceiling_key(&self, key: &K) -> Result<Option<K>> {
        Ok(self.ceiling_entry(key)?.map(|(found, _)| found))
    }

    /// Smallest key `> key`.
    pub fn higher_key(&self, key: &K) -> Result<Option<K>> {
        Ok(self.higher_entry(key)?.map(|(found, _)| found))
    }

    /// Largest key `<= key`.
    pub fn floor_key(&self, key: &K) -> Result<Option<K>> {
        Ok(self.floor_entry(key)?.map(|(found, _)| found))
    }

    /// Largest key `< key`.
    pub fn lower_key(&self, key: &K) -> Result<Option<K>> {
        Ok(self.lower_entry(key)?.map(|(found, _)| found))
    }

    /// Number of entries, counted by walking the leaf level.
    pub fn len(&self) -> Result<usize> {
        let mut total = 0usize;
        let mut node = self.read_node(self.leftmost_leaf()?)?;
        loop {
            total += node.entry_count();
            if node.is_right_edge() {
                return Ok(total);
            }
            node = self.read_node(node.link_or_corrupt()?)?;
        }
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.first_entry()?.is_none())
    }

    fn entry_at_or_after(&self, key: &K, inclusive: bool) -> Result<Option<(K, V)>> {
        let lower = if inclusive {
            Bound::Included(key.clone())
        } else {
            Bound::Excluded(key.clone())
        };
        self.range(lower, Bound::Unbounded)?.next_entry()
    }

    fn entry_at_or_before(&self, key: &K, inclusive: bool) -> Result<Option<(K, V)>> {
        let (_, node) = self.find_leaf(key)?;
        if let Some(position) = node.last_real_at_or_before(key, inclusive) {
            let found = &node.keys[position];
            if let Some(value) = self.read_entry_value(&node, node.value_index(position), found)? {
                return Ok(Some((found.clone(), value)));
            }
        }
        let upper = if inclusive {
            Bound::Included(key.clone())
        } else {
            Bound::Excluded(key.clone())
        };
        self.range_rev(Bound::Unbounded, upper)?.next_entry()
    }
}
