//! Descending cursor.
//!
//! Nodes only link to the right, so the cursor walks top-down instead. At
//! every level it remembers the nodes left of the one it descended into:
//! siblings passed while following links, and the directory children left
//! of the chosen child. Once a leaf is exhausted it pops the nearest
//! remembered node, at the deepest level that still has one, and descends
//! again bounded by the low key of the node it last left at that level.
//! Re-reading with that bound picks up any splits that happened meanwhile.

use std::cmp::Ordering;
use std::ops::Bound;

use crate::types::{BLinkError, RecId, Result};

use super::codecs::{KeyCodec, ValCodec};
use super::cursor::{lower_allows, range_is_empty, upper_allows};
use super::node::Node;
use super::tree::BLinkTree;

struct LevelState<K> {
    /// Unvisited nodes at this level, rightmost last.
    pending: Vec<RecId>,
    /// Low key of the node most recently entered at this level; `None` for a
    /// left edge.
    boundary: Option<K>,
}

impl<K> Default for LevelState<K> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            boundary: None,
        }
    }
}

/// Descending cursor over a key range.
pub struct DescendingCursor<'a, K: KeyCodec, V: ValCodec> {
    tree: &'a BLinkTree<K, V>,
    lower: Bound<K>,
    upper: Bound<K>,
    levels: Vec<LevelState<K>>,
    leaf: Option<Node<K, V>>,
    /// Entries below this key index of `leaf` are still to be visited.
    index: usize,
    last_key: Option<K>,
    done: bool,
}

impl<'a, K: KeyCodec, V: ValCodec> DescendingCursor<'a, K, V> {
    pub(crate) fn new(tree: &'a BLinkTree<K, V>, lo: Bound<K>, hi: Bound<K>) -> Result<Self> {
        let done = range_is_empty(&lo, &hi);
        let mut cursor = Self {
            tree,
            lower: lo,
            upper: hi,
            levels: Vec::new(),
            leaf: None,
            index: 0,
            last_key: None,
            done,
        };
        if !cursor.done {
            let bound = match &cursor.upper {
                Bound::Included(key) | Bound::Excluded(key) => Some(key.clone()),
                Bound::Unbounded => None,
            };
            let root = tree.root_recid()?;
            cursor.descend_into(0, root, bound)?;
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

    fn advance(&mut self) -> Result<Option<(K, V)>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some(leaf) = self.leaf.as_ref() else {
                self.finish();
                return Ok(None);
            };
            if self.index > leaf.real_range().start {
                self.index -= 1;
                let position = self.index;
                let key = &leaf.keys[position];
                if self
                    .last_key
                    .as_ref()
                    .is_some_and(|last| K::compare(key, last) != Ordering::Less)
                {
                    continue;
                }
                if !upper_allows(&self.upper, key) {
                    continue;
                }
                if !lower_allows(&self.lower, key) {
                    self.finish();
                    return Ok(None);
                }
                let Some(value) = self
                    .tree
                    .read_entry_value(leaf, leaf.value_index(position), key)?
                else {
                    continue;
                };
                let key = key.clone();
                self.last_key = Some(key.clone());
                return Ok(Some((key, value)));
            }
            if !self.step_back()? {
                self.finish();
                return Ok(None);
            }
        }
    }

    /// Moves to the leaf left of the current one. Returns false when no
    /// remaining leaf can hold a key inside the range.
    fn step_back(&mut self) -> Result<bool> {
        let Some(leaf_depth) = self.levels.len().checked_sub(1) else {
            return Ok(false);
        };
        match &self.levels[leaf_depth].boundary {
            None => return Ok(false),
            Some(boundary) if !lower_allows(&self.lower, boundary) => return Ok(false),
            Some(_) => {}
        }
        let mut depth = leaf_depth;
        loop {
            let level = &mut self.levels[depth];
            if let Some(recid) = level.pending.pop() {
                let bound = level.boundary.clone();
                self.descend_into(depth, recid, bound)?;
                return Ok(true);
            }
            if depth == 0 {
                return Ok(false);
            }
            depth -= 1;
        }
    }

    /// Enters `recid` at `depth`, follows links until the node covering
    /// `bound` (or the right edge when unbounded), then descends to a leaf
    /// through the child covering `bound`.
    fn descend_into(&mut self, mut depth: usize, mut recid: RecId, bound: Option<K>) -> Result<()> {
        loop {
            let (passed, node) = self.walk_right(recid, bound.as_ref())?;
            let level = self.level_mut(depth);
            level.pending.extend(passed);
            level.boundary = node.low_key().cloned();
            if node.is_leaf() {
                self.index = node.real_range().end;
                self.leaf = Some(node);
                return Ok(());
            }
            let children = node.children();
            let chosen = match bound.as_ref() {
                Some(key) => node.child_index(key),
                None => children
                    .len()
                    .checked_sub(1)
                    .ok_or_else(|| BLinkError::corruption("directory without children"))?,
            };
            recid = children
                .get(chosen)
                .copied()
                .ok_or_else(|| BLinkError::corruption("directory child index out of range"))?;
            depth += 1;
            self.level_mut(depth)
                .pending
                .extend_from_slice(&children[..chosen]);
        }
    }

    /// Follows right links from `start` until a node covers `bound`, or to
    /// the right edge when unbounded. Returns the recids passed on the way
    /// and the final node.
    fn walk_right(&self, start: RecId, bound: Option<&K>) -> Result<(Vec<RecId>, Node<K, V>)> {
        let mut passed = Vec::new();
        let mut current = start;
        loop {
            let node = self.tree.read_node(current)?;
            let stop = match bound {
                Some(key) => node.covers(key),
                None => node.is_right_edge(),
            };
            if stop {
                return Ok((passed, node));
            }
            passed.push(current);
            current = node.link_or_corrupt()?;
        }
    }

    fn level_mut(&mut self, depth: usize) -> &mut LevelState<K> {
        if self.levels.len() <= depth {
            self.levels.resize_with(depth + 1, LevelState::default);
        }
        &mut self.levels[depth]
    }

    fn finish(&mut self) {
        self.done = true;
        self.leaf = None;
        self.levels.clear();
    }
}

impl<K: KeyCodec, V: ValCodec> Iterator for DescendingCursor<'_, K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
