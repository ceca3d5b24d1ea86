use std::cmp::Ordering;
use std::ops::Bound;

use crate::types::Result;

use super::codecs::{KeyCodec, ValCodec};
use super::node::Node;
use super::tree::BLinkTree;

/// Ascending cursor over a key range.
///
/// Each leaf is read once and walked in memory; the cursor then follows the
/// leaf's right link. Entries inserted into leaves not yet visited show up,
/// entries in visited leaves do not.
pub struct Cursor<'a, K: KeyCodec, V: ValCodec> {
    tree: &'a BLinkTree<K, V>,
    lower: Bound<K>,
    upper: Bound<K>,
    leaf: Option<Node<K, V>>,
    index: usize,
    last_key: Option<K>,
    done: bool,
}

impl<'a, K: KeyCodec, V: ValCodec> Cursor<'a, K, V> {
    pub(crate) fn new(tree: &'a BLinkTree<K, V>, lo: Bound<K>, hi: Bound<K>) -> Result<Self> {
        let done = range_is_empty(&lo, &hi);
        let mut cursor = Self {
            tree,
            lower: lo,
            upper: hi,
            leaf: None,
            index: 0,
            last_key: None,
            done,
        };
        if !cursor.done {
            cursor.initialize()?;
        }
        Ok(cursor)
    }

    /// Advances the cursor and returns the next key-value pair, if any.
    pub fn next_entry(&mut self) -> Result<Option<(K, V)>> {
        match self.advance() {
            Ok(entry) => Ok(entry),
            Err(err) => {
                self.finish();
                Err(err)
            }
        }
    }

    fn initialize(&mut self) -> Result<()> {
        let leaf = match &self.lower {
            Bound::Included(key) | Bound::Excluded(key) => self.tree.find_leaf(key)?.1,
            Bound::Unbounded => self.tree.read_node(self.tree.leftmost_leaf()?)?,
        };
        self.index = match &self.lower {
            Bound::Included(key) => leaf
                .first_real_at_or_after(key, true)
                .unwrap_or(leaf.real_range().end),
            Bound::Excluded(key) => leaf
                .first_real_at_or_after(key, false)
                .unwrap_or(leaf.real_range().end),
            Bound::Unbounded => leaf.real_range().start,
        };
        self.leaf = Some(leaf);
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<(K, V)>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some(leaf) = self.leaf.as_ref() else {
                self.finish();
                return Ok(None);
            };
            let real = leaf.real_range();
            self.index = self.index.max(real.start);
            if self.index >= real.end {
                if leaf.is_right_edge() {
                    self.finish();
                    return Ok(None);
                }
                let next = leaf.link_or_corrupt()?;
                let node = self.tree.read_node(next)?;
                self.leaf = Some(node);
                self.index = 0;
                continue;
            }
            let position = self.index;
            self.index += 1;
            let key = &leaf.keys[position];
            if self
                .last_key
                .as_ref()
                .is_some_and(|last| K::compare(key, last) != Ordering::Greater)
            {
                continue;
            }
            if !lower_allows(&self.lower, key) {
                continue;
            }
            if !upper_allows(&self.upper, key) {
                self.finish();
                return Ok(None);
            }
            let Some(value) = self.tree.read_entry_value(leaf, leaf.value_index(position), key)?
            else {
                continue;
            };
            let key = key.clone();
            self.last_key = Some(key.clone());
            return Ok(Some((key, value)));
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.leaf = None;
    }
}

impl<K: KeyCodec, V: ValCodec> Iterator for Cursor<'_, K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

pub(crate) fn lower_allows<K: KeyCodec>(lower: &Bound<K>, key: &K) -> bool {
    match lower {
        Bound::Included(lo) => K::compare(key, lo) != Ordering::Less,
        Bound::Excluded(lo) => K::compare(key, lo) == Ordering::Greater,
        Bound::Unbounded => true,
    }
}

pub(crate) fn upper_allows<K: KeyCodec>(upper: &Bound<K>, key: &K) -> bool {
    match upper {
        Bound::Included(hi) => K::compare(key, hi) != Ordering::Greater,
        Bound::Excluded(hi) => K::compare(key, hi) == Ordering::Less,
        Bound::Unbounded => true,
    }
}

pub(crate) fn range_is_empty<K: KeyCodec>(lower: &Bound<K>, upper: &Bound<K>) -> bool {
    let (lo, lo_inclusive) = match lower {
        Bound::Unbounded => return false,
        Bound::Included(key) => (key, true),
        Bound::Excluded(key) => (key, false),
    };
    let (hi, hi_inclusive) = match upper {
        Bound::Unbounded => return false,
        Bound::Included(key) => (key, true),
        Bound::Excluded(key) => (key, false),
    };
    match K::compare(lo, hi) {
        Ordering::Greater => true,
        Ordering::Equal => !(lo_inclusive && hi_inclusive),
        Ordering::Less => false,
    }
}
