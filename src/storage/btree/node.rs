//! In-memory shape of a B-link node and the array operations the engine
//! performs on it.
//!
//! Key layout. `keys[0]` is the low boundary unless the node is a left edge;
//! `keys[n - 1]` is the high key unless the node is a right edge. The high key
//! of a leaf is a real entry only when `LAST_KEY_DOUBLE` is set. A node owns
//! the half-open range `(low, high]`.

use std::cmp::Ordering;
use std::ops::Range;

use super::codecs::KeyCodec;
use crate::types::{BLinkError, RecId, Result};

/// Edge and boundary flags shared by both node kinds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct NodeFlags(u8);

impl NodeFlags {
    pub(crate) const LEFT_EDGE: u8 = 0b0001;
    pub(crate) const RIGHT_EDGE: u8 = 0b0010;
    pub(crate) const LAST_KEY_DOUBLE: u8 = 0b0100;
    /// Only meaningful in the encoded form; the in-memory kind is the body tag.
    pub(crate) const DIRECTORY: u8 = 0b1000;

    pub(crate) const fn from_bits(bits: u8) -> Self {
        NodeFlags(bits)
    }

    pub(crate) const fn bits(self) -> u8 {
        self.0
    }

    pub(crate) fn edges(left: bool, right: bool) -> Self {
        let mut bits = 0;
        if left {
            bits |= Self::LEFT_EDGE;
        }
        if right {
            bits |= Self::RIGHT_EDGE;
        }
        NodeFlags(bits)
    }

    pub(crate) fn left_edge(self) -> bool {
        self.0 & Self::LEFT_EDGE != 0
    }

    pub(crate) fn right_edge(self) -> bool {
        self.0 & Self::RIGHT_EDGE != 0
    }

    pub(crate) fn last_key_double(self) -> bool {
        self.0 & Self::LAST_KEY_DOUBLE != 0
    }

    pub(crate) fn set_last_key_double(&mut self, on: bool) {
        if on {
            self.0 |= Self::LAST_KEY_DOUBLE;
        } else {
            self.0 &= !Self::LAST_KEY_DOUBLE;
        }
    }

    pub(crate) fn set_right_edge(&mut self, on: bool) {
        if on {
            self.0 |= Self::RIGHT_EDGE;
        } else {
            self.0 &= !Self::RIGHT_EDGE;
        }
    }

    pub(crate) fn set_left_edge(&mut self, on: bool) {
        if on {
            self.0 |= Self::LEFT_EDGE;
        } else {
            self.0 &= !Self::LEFT_EDGE;
        }
    }
}

/// A leaf value slot: the value itself or the recid of its own record.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ValueSlot<V> {
    Inline(V),
    Record(RecId),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum NodeBody<V> {
    Directory { children: Vec<RecId> },
    Leaf { values: Vec<ValueSlot<V>> },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Node<K, V> {
    pub(crate) flags: NodeFlags,
    pub(crate) keys: Vec<K>,
    pub(crate) link: RecId,
    pub(crate) body: NodeBody<V>,
}

/// Where a directory search sends the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Route {
    Child(RecId),
    Link(RecId),
}

/// Outcome of searching a leaf for an exact key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum LeafPosition {
    /// Real entry at this value index.
    Found(usize),
    /// The key is this node's high key and is not stored here.
    HighKey,
    /// The key is beyond the high key.
    Beyond,
    /// The key would be inserted at this key index.
    Absent(usize),
    /// The key equals the low boundary, which belongs to the left sibling.
    LowBoundary,
}

pub(crate) fn search_keys<K: KeyCodec>(keys: &[K], key: &K) -> std::result::Result<usize, usize> {
    keys.binary_search_by(|candidate| K::compare(candidate, key))
}

impl<K: KeyCodec, V: Clone> Node<K, V> {
    /// Root of a brand-new tree: an empty leaf covering the whole key space.
    pub(crate) fn empty_root() -> Self {
        Node {
            flags: NodeFlags::edges(true, true),
            keys: Vec::new(),
            link: RecId::NULL,
            body: NodeBody::Leaf { values: Vec::new() },
        }
    }

    /// Two-child directory created when the root splits.
    pub(crate) fn new_root(separator: K, left: RecId, right: RecId) -> Self {
        Node {
            flags: NodeFlags::edges(true, true),
            keys: vec![separator],
            link: RecId::NULL,
            body: NodeBody::Directory {
                children: vec![left, right],
            },
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf { .. })
    }

    pub(crate) fn is_left_edge(&self) -> bool {
        self.flags.left_edge()
    }

    pub(crate) fn is_right_edge(&self) -> bool {
        self.flags.right_edge()
    }

    pub(crate) fn is_root(&self) -> bool {
        self.is_left_edge() && self.is_right_edge()
    }

    fn left_bit(&self) -> usize {
        usize::from(self.flags.left_edge())
    }

    fn right_bit(&self) -> usize {
        usize::from(self.flags.right_edge())
    }

    fn double_bit(&self) -> usize {
        usize::from(self.flags.last_key_double())
    }

    pub(crate) fn low_key(&self) -> Option<&K> {
        if self.is_left_edge() {
            None
        } else {
            self.keys.first()
        }
    }

    pub(crate) fn high_key(&self) -> Option<&K> {
        if self.is_right_edge() {
            None
        } else {
            self.keys.last()
        }
    }

    /// True when `key` falls at or below this node's high key.
    pub(crate) fn covers(&self, key: &K) -> bool {
        match self.high_key() {
            None => true,
            Some(high) => K::compare(key, high) != Ordering::Greater,
        }
    }

    /// Key indices of the real leaf entries.
    pub(crate) fn real_range(&self) -> Range<usize> {
        let start = 1 - self.left_bit();
        let end = (self.keys.len() + self.right_bit() + self.double_bit()).saturating_sub(1);
        start..end.max(start)
    }

    pub(crate) fn value_index(&self, key_index: usize) -> usize {
        key_index + self.left_bit() - 1
    }

    /// Number of values (leaf) or children (directory) implied by the keys
    /// and flags.
    pub(crate) fn expected_payload_len(&self) -> usize {
        let n = self.keys.len();
        match self.body {
            NodeBody::Leaf { .. } => {
                (n + self.left_bit() + self.right_bit() + self.double_bit()).saturating_sub(2)
            }
            NodeBody::Directory { .. } => (n + self.left_bit() + self.right_bit()).saturating_sub(1),
        }
    }

    pub(crate) fn payload_len(&self) -> usize {
        match &self.body {
            NodeBody::Leaf { values } => values.len(),
            NodeBody::Directory { children } => children.len(),
        }
    }

    pub(crate) fn entry_count(&self) -> usize {
        match &self.body {
            NodeBody::Leaf { values } => values.len(),
            NodeBody::Directory { .. } => 0,
        }
    }

    pub(crate) fn children(&self) -> &[RecId] {
        match &self.body {
            NodeBody::Directory { children } => children,
            NodeBody::Leaf { .. } => &[],
        }
    }

    pub(crate) fn values(&self) -> &[ValueSlot<V>] {
        match &self.body {
            NodeBody::Leaf { values } => values,
            NodeBody::Directory { .. } => &[],
        }
    }

    /// Index into `children` of the child whose range holds `key`. The
    /// caller must already know the node covers `key`.
    pub(crate) fn child_index(&self, key: &K) -> usize {
        let pos = match search_keys(&self.keys, key) {
            Ok(pos) | Err(pos) => pos,
        };
        (pos + self.left_bit()).saturating_sub(1)
    }

    /// Directory step for `key`: a child, or the right sibling when the key
    /// lies past the high key.
    pub(crate) fn route(&self, key: &K) -> Result<Route> {
        let children = self.children();
        if !self.covers(key) {
            return self.link_or_corrupt().map(Route::Link);
        }
        children
            .get(self.child_index(key))
            .copied()
            .map(Route::Child)
            .ok_or_else(|| BLinkError::corruption("directory child index out of range"))
    }

    pub(crate) fn link_or_corrupt(&self) -> Result<RecId> {
        if self.link.is_null() {
            return Err(BLinkError::corruption(
                "node with a high key has no right link",
            ));
        }
        Ok(self.link)
    }

    pub(crate) fn locate_in_leaf(&self, key: &K) -> LeafPosition {
        let real = self.real_range();
        match search_keys(&self.keys, key) {
            Ok(pos) if real.contains(&pos) => LeafPosition::Found(self.value_index(pos)),
            Ok(pos) if pos + 1 == self.keys.len() && !self.is_right_edge() => LeafPosition::HighKey,
            Ok(_) => LeafPosition::LowBoundary,
            Err(pos) if pos == self.keys.len() && !self.is_right_edge() => LeafPosition::Beyond,
            Err(pos) => LeafPosition::Absent(pos),
        }
    }

    /// First real key index whose key is `>= key` (or `> key` when not
    /// inclusive).
    pub(crate) fn first_real_at_or_after(&self, key: &K, inclusive: bool) -> Option<usize> {
        let real = self.real_range();
        let pos = match search_keys(&self.keys, key) {
            Ok(pos) if inclusive => pos,
            Ok(pos) => pos + 1,
            Err(pos) => pos,
        };
        let pos = pos.max(real.start);
        (pos < real.end).then_some(pos)
    }

    /// Last real key index whose key is `<= key` (or `< key` when not
    /// inclusive).
    pub(crate) fn last_real_at_or_before(&self, key: &K, inclusive: bool) -> Option<usize> {
        let real = self.real_range();
        let end = match search_keys(&self.keys, key) {
            Ok(pos) if inclusive => pos + 1,
            Ok(pos) | Err(pos) => pos,
        };
        let end = end.min(real.end);
        (end > real.start).then(|| end - 1)
    }

    pub(crate) fn with_value_replaced(&self, value_index: usize, slot: ValueSlot<V>) -> Result<Self> {
        let mut next = self.clone();
        match &mut next.body {
            NodeBody::Leaf { values } => match values.get_mut(value_index) {
                Some(existing) => *existing = slot,
                None => return Err(BLinkError::corruption("leaf value index out of range")),
            },
            NodeBody::Directory { .. } => {
                return Err(BLinkError::corruption("value update on a directory node"))
            }
        }
        Ok(next)
    }

    /// Copy with `key` spliced in at key index `pos`.
    pub(crate) fn with_inserted(&self, pos: usize, key: K, slot: ValueSlot<V>) -> Result<Self> {
        let mut next = self.clone();
        let value_pos = next.value_index(pos);
        match &mut next.body {
            NodeBody::Leaf { values } if value_pos <= values.len() => {
                values.insert(value_pos, slot);
            }
            _ => return Err(BLinkError::corruption("leaf insert position out of range")),
        }
        next.keys.insert(pos, key);
        Ok(next)
    }

    /// Copy where the high key becomes a real entry holding `slot`.
    pub(crate) fn with_high_key_materialized(&self, slot: ValueSlot<V>) -> Result<Self> {
        let mut next = self.clone();
        match &mut next.body {
            NodeBody::Leaf { values } => values.push(slot),
            NodeBody::Directory { .. } => {
                return Err(BLinkError::corruption("high key materialized on a directory"))
            }
        }
        next.flags.set_last_key_double(true);
        Ok(next)
    }

    /// Copy with the real entry at `value_index` dropped. A doubled high key
    /// stays in the key array and only loses its value.
    pub(crate) fn with_removed(&self, value_index: usize) -> Result<Self> {
        let mut next = self.clone();
        let key_index = value_index + 1 - next.left_bit();
        let doubled_high = next.flags.last_key_double() && key_index + 1 == next.keys.len();
        match &mut next.body {
            NodeBody::Leaf { values } if value_index < values.len() => {
                values.remove(value_index);
            }
            _ => return Err(BLinkError::corruption("leaf remove position out of range")),
        }
        if doubled_high {
            next.flags.set_last_key_double(false);
        } else {
            next.keys.remove(key_index);
        }
        Ok(next)
    }

    /// Copy of a directory with `separator` added and `child` placed to its
    /// right.
    pub(crate) fn with_child_inserted(&self, separator: K, child: RecId) -> Result<Self> {
        let pos = match search_keys(&self.keys, &separator) {
            Ok(_) => {
                return Err(BLinkError::corruption(
                    "separator already present in directory",
                ))
            }
            Err(pos) => pos,
        };
        let mut next = self.clone();
        let child_pos = pos + next.left_bit();
        match &mut next.body {
            NodeBody::Directory { children } if child_pos <= children.len() => {
                children.insert(child_pos, child);
            }
            _ => return Err(BLinkError::corruption("directory insert out of range")),
        }
        next.keys.insert(pos, separator);
        Ok(next)
    }

    /// Cuts the node at its midpoint. The right half inherits the old link
    /// and right-edge status; the left half keeps this node's recid and its
    /// link is left null until the caller has stored the right half. Returns
    /// `(left, right, separator)`, where the separator is the left half's new
    /// high key.
    pub(crate) fn split(&self) -> Result<(Self, Self, K)> {
        let n = self.keys.len();
        if n < 4 {
            return Err(BLinkError::corruption("split of an undersized node"));
        }
        let cut = n / 2;
        let separator = self.keys[cut].clone();
        let left_keys = self.keys[..=cut].to_vec();
        let right_keys = self.keys[cut..].to_vec();

        let mut left_flags = self.flags;
        left_flags.set_right_edge(false);
        let mut right_flags = self.flags;
        right_flags.set_left_edge(false);

        let (left_body, right_body) = match &self.body {
            NodeBody::Leaf { values } => {
                let split_at = self.value_index(cut) + 1;
                if split_at > values.len() {
                    return Err(BLinkError::corruption("leaf split point out of range"));
                }
                left_flags.set_last_key_double(true);
                (
                    NodeBody::Leaf {
                        values: values[..split_at].to_vec(),
                    },
                    NodeBody::Leaf {
                        values: values[split_at..].to_vec(),
                    },
                )
            }
            NodeBody::Directory { children } => {
                let split_at = cut + self.left_bit();
                if split_at > children.len() {
                    return Err(BLinkError::corruption("directory split point out of range"));
                }
                (
                    NodeBody::Directory {
                        children: children[..split_at].to_vec(),
                    },
                    NodeBody::Directory {
                        children: children[split_at..].to_vec(),
                    },
                )
            }
        };

        let left = Node {
            flags: left_flags,
            keys: left_keys,
            link: RecId::NULL,
            body: left_body,
        };
        let right = Node {
            flags: right_flags,
            keys: right_keys,
            link: self.link,
            body: right_body,
        };
        Ok((left, right, separator))
    }

    /// Structural self-check used by the verifier and paranoid builds.
    pub(crate) fn check_invariants(&self) -> Result<()> {
        if self
            .keys
            .windows(2)
            .any(|pair| K::compare(&pair[0], &pair[1]) != Ordering::Less)
        {
            return Err(BLinkError::corruption("node keys are not strictly increasing"));
        }
        if self.payload_len() != self.expected_payload_len() {
            return Err(BLinkError::corruption(format!(
                "node carries {} slots, flags and keys imply {}",
                self.payload_len(),
                self.expected_payload_len()
            )));
        }
        if self.flags.last_key_double() && (self.is_right_edge() || !self.is_leaf()) {
            return Err(BLinkError::corruption(
                "LAST_KEY_DOUBLE set on a right-edge or directory node",
            ));
        }
        if !self.is_right_edge() && self.link.is_null() {
            return Err(BLinkError::corruption("non-right-edge node without link"));
        }
        if self.is_right_edge() && !self.link.is_null() {
            return Err(BLinkError::corruption("right-edge node with a link"));
        }
        let min_keys = 2 - self.left_bit() - self.right_bit();
        if self.keys.len() < min_keys {
            return Err(BLinkError::corruption("node is missing boundary keys"));
        }
        Ok(())
    }
}
