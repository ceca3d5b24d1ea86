use tracing::debug;

use super::point::Ancestors;
use super::BLinkTree;
use crate::storage::btree::codecs::{KeyCodec, ValCodec};
use crate::storage::btree::format::encode_root_pointer;
use crate::storage::btree::node::Node;
use crate::types::{BLinkError, RecId, Result};

impl<K: KeyCodec, V: ValCodec> BLinkTree<K, V> {
    /// Carries the separator of a split at the leaf level upward until a
    /// parent absorbs it or the tree grows a new root.
    ///
    /// The caller has already released the leaf lock. Each parent is split
    /// under its own lock, which is released before the next parent is locked.
    pub(super) fn propagate_split(
        &self,
        mut current: RecId,
        mut separator: K,
        mut right: RecId,
        mut was_root: bool,
        mut ancestors: Ancestors,
    ) -> Result<()> {
        let mut level = 0usize;
        loop {
            if was_root {
                return self.grow_root(current, separator, right, level);
            }

            level += 1;
            let parent = match ancestors.pop() {
                Some(parent) => parent,
                None => self.left_edge(level)?,
            };
            let (parent, parent_guard, parent_node) = self.lock_covering(parent, &separator)?;
            if parent_node.is_leaf() {
                return Err(BLinkError::corruption(format!(
                    "parent {parent} of a level {} split is a leaf",
                    level - 1
                )));
            }
            let next = parent_node.with_child_inserted(separator, right)?;
            if next.keys.len() < self.options.max_node_size {
                self.write_node(parent, &next)?;
                return Ok(());
            }
            (separator, right) = self.split_node(parent, &next, level)?;
            was_root = next.is_root();
            drop(parent_guard);
            current = parent;
        }
    }

    /// Stores the right half under a fresh recid, then rewrites the left half
    /// in place pointing at it. Returns the separator and the right recid.
    pub(super) fn split_node(&self, current: RecId, node: &Node<K, V>, level: usize) -> Result<(K, RecId)> {
        let (mut left, right, separator) = node.split()?;
        let right_recid = self.put_node(&right)?;
        left.link = right_recid;
        self.write_node(current, &left)?;
        if node.is_leaf() {
            self.stats.inc_leaf_splits();
        } else {
            self.stats.inc_directory_splits();
        }
        debug!(
            target: "blinktree::split",
            left = current.0,
            right = right_recid.0,
            level,
            leaf = node.is_leaf(),
            "split node"
        );
        Ok((separator, right_recid))
    }

    /// Publishes a two-child root above the old root `left` and extends the
    /// left-edge cache by one level.
    fn grow_root(&self, left: RecId, separator: K, right: RecId, level: usize) -> Result<()> {
        let _root_guard = self.root_lock.lock();
        let root = Node::<K, V>::new_root(separator, left, right);
        let root_recid = self.put_node(&root)?;
        self.store
            .update(self.root_recid_recid, &encode_root_pointer(root_recid))?;

        let mut left_edges = self.left_edges.write();
        if left_edges.len() != level + 1 {
            return Err(BLinkError::corruption(format!(
                "root split at level {level} but the left-edge cache has {} levels",
                left_edges.len()
            )));
        }
        left_edges.push(root_recid);
        self.stats.inc_root_splits();
        debug!(
            target: "blinktree::split",
            new_root = root_recid.0,
            left = left.0,
            right = right.0,
            height = left_edges.len(),
            "grew new root"
        );
        Ok(())
    }
}
