//! Offline structural verification and a human-readable structure dump.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::codecs::{KeyCodec, ValCodec};
use super::node::{Node, NodeBody};
use super::tree::BLinkTree;
use crate::types::{BLinkError, RecId, Result};

const MAX_FINDINGS: usize = 64;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Non-critical observation.
    Warning,
    /// Broken invariant.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Statistics collected while walking the tree.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Nodes reached from the root.
    pub nodes: u64,
    /// Leaf nodes reached.
    pub leaves: u64,
    /// Directory nodes reached.
    pub directories: u64,
    /// Real entries held by leaves.
    pub entries: u64,
    /// Empty leaves left behind by removals.
    pub empty_leaves: u64,
    /// Number of levels.
    pub height: u64,
}

/// Complete report of a verification pass.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether verification passed without any error finding.
    pub success: bool,
    /// Issues discovered during verification.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the structure examined.
    pub counts: VerifyCounts,
}

struct LevelEntry<K> {
    recid: RecId,
    link: RecId,
    low: Option<K>,
    high: Option<K>,
}

struct Walk<'t, K: KeyCodec, V: ValCodec> {
    tree: &'t BLinkTree<K, V>,
    visited: HashSet<RecId>,
    levels: Vec<Vec<LevelEntry<K>>>,
    leaf_depth: Option<usize>,
    findings: Vec<VerifyFinding>,
    counts: VerifyCounts,
}

impl<'t, K: KeyCodec, V: ValCodec> Walk<'t, K, V> {
    fn error(&mut self, message: impl Into<String>) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(VerifyFinding {
                severity: VerifySeverity::Error,
                message: message.into(),
            });
        }
    }

    fn warning(&mut self, message: impl Into<String>) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(VerifyFinding {
                severity: VerifySeverity::Warning,
                message: message.into(),
            });
        }
    }

    fn visit(&mut self, recid: RecId, depth: usize, low: Option<&K>, high: Option<&K>) -> Result<()> {
        if !self.visited.insert(recid) {
            self.error(format!("node {recid} is reachable more than once"));
            return Ok(());
        }
        let node = match self.tree.read_node(recid) {
            Ok(node) => node,
            Err(err) if err.is_corruption() => {
                self.error(format!("node {recid} cannot be read: {err}"));
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        self.counts.nodes += 1;
        if let Err(err) = node.check_invariants() {
            self.error(format!("node {recid}: {err}"));
        }
        if node.is_left_edge() != low.is_none() {
            self.error(format!(
                "node {recid} left-edge flag is {} but its position says {}",
                node.is_left_edge(),
                low.is_none()
            ));
        }
        if node.is_right_edge() != high.is_none() {
            self.error(format!(
                "node {recid} right-edge flag is {} but its position says {}",
                node.is_right_edge(),
                high.is_none()
            ));
        }
        if !keys_match(node.low_key(), low) {
            self.error(format!("node {recid} low key differs from its parent separator"));
        }
        if !keys_match(node.high_key(), high) {
            self.error(format!("node {recid} high key differs from its parent separator"));
        }

        if self.levels.len() <= depth {
            self.levels.resize_with(depth + 1, Vec::new);
        }
        self.levels[depth].push(LevelEntry {
            recid,
            link: node.link,
            low: node.low_key().cloned(),
            high: node.high_key().cloned(),
        });

        match &node.body {
            NodeBody::Leaf { values } => {
                self.counts.leaves += 1;
                self.counts.entries += values.len() as u64;
                if values.is_empty() && !node.is_root() {
                    self.counts.empty_leaves += 1;
                }
                match self.leaf_depth {
                    None => self.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => self.error(format!(
                        "leaf {recid} sits at depth {depth}, other leaves at {expected}"
                    )),
                    Some(_) => {}
                }
                Ok(())
            }
            NodeBody::Directory { children } => {
                self.counts.directories += 1;
                if children.len() < 2 && !node.is_root() {
                    self.warning(format!("directory {recid} has a single child"));
                }
                for (index, child) in children.iter().enumerate() {
                    let child_low = extended_key(&node, index);
                    let child_high = extended_key(&node, index + 1);
                    self.visit(*child, depth + 1, child_low, child_high)?;
                }
                Ok(())
            }
        }
    }

    fn check_levels(&mut self) {
        let mut problems = Vec::new();
        for (depth, level) in self.levels.iter().enumerate() {
            for pair in level.windows(2) {
                let (left, right) = (&pair[0], &pair[1]);
                if left.link != right.recid {
                    problems.push(format!(
                        "depth {depth}: node {} links to {} but its right neighbour is {}",
                        left.recid, left.link, right.recid
                    ));
                }
                if !keys_match(left.high.as_ref(), right.low.as_ref()) {
                    problems.push(format!(
                        "depth {depth}: high key of node {} differs from low key of node {}",
                        left.recid, right.recid
                    ));
                }
            }
        }
        for problem in problems {
            self.error(problem);
        }
    }

    fn check_left_edges(&mut self) -> Result<()> {
        let mut walked: Vec<RecId> = self
            .levels
            .iter()
            .filter_map(|level| level.first().map(|entry| entry.recid))
            .collect();
        walked.reverse();
        let cached = self.tree.left_edges();
        if cached != walked {
            self.error(format!(
                "left-edge cache {cached:?} differs from the walked left edges {walked:?}"
            ));
        }
        match self.tree.left_spine() {
            Ok(spine) if spine != walked => self.error(format!(
                "left spine {spine:?} differs from the walked left edges {walked:?}"
            )),
            Ok(_) => {}
            Err(err) if err.is_corruption() => self.error(format!("left spine walk failed: {err}")),
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

fn keys_match<K: KeyCodec>(actual: Option<&K>, expected: Option<&K>) -> bool {
    match (actual, expected) {
        (None, None) => true,
        (Some(a), Some(b)) => K::compare(a, b) == Ordering::Equal,
        _ => false,
    }
}

/// Key at `index` of the node's key array extended with -inf on a left edge
/// and +inf on a right edge. Infinities come back as `None`.
fn extended_key<K: KeyCodec, V: ValCodec>(node: &Node<K, V>, index: usize) -> Option<&K> {
    let offset = usize::from(node.is_left_edge());
    index.checked_sub(offset).and_then(|i| node.keys.get(i))
}

impl<K: KeyCodec, V: ValCodec> BLinkTree<K, V> {
    /// Walks the whole tree and checks its structural invariants: key order,
    /// edge flags, boundary keys against parent separators, equal leaf
    /// depth, no shared nodes, link continuity per level and the left-edge
    /// cache.
    ///
    /// Intended for quiescent trees; concurrent writers can produce transient
    /// findings.
    pub fn verify(&self) -> Result<VerifyReport> {
        let root = self.root_recid()?;
        let mut walk = Walk {
            tree: self,
            visited: HashSet::new(),
            levels: Vec::new(),
            leaf_depth: None,
            findings: Vec::new(),
            counts: VerifyCounts::default(),
        };
        walk.visit(root, 0, None, None)?;
        walk.check_levels();
        walk.check_left_edges()?;
        walk.counts.height = walk.levels.len() as u64;

        for finding in &walk.findings {
            warn!(
                target: "blinktree::verify",
                severity = ?finding.severity,
                "{}",
                finding.message
            );
        }
        let success = walk
            .findings
            .iter()
            .all(|finding| finding.severity != VerifySeverity::Error);
        Ok(VerifyReport {
            success,
            findings: walk.findings,
            counts: walk.counts,
        })
    }

    /// Writes one line per node, indented by depth.
    pub fn dump_structure<W: fmt::Write>(&self, out: &mut W) -> Result<()>
    where
        K: fmt::Debug,
    {
        let root = self.root_recid()?;
        self.dump_node(out, root, 0)
    }

    /// [`BLinkTree::dump_structure`] into a string.
    pub fn structure_string(&self) -> Result<String>
    where
        K: fmt::Debug,
    {
        let mut out = String::new();
        self.dump_structure(&mut out)?;
        Ok(out)
    }

    fn dump_node<W: fmt::Write>(&self, out: &mut W, recid: RecId, depth: usize) -> Result<()>
    where
        K: fmt::Debug,
    {
        let node = self.read_node(recid)?;
        let mut flags = String::new();
        flags.push(if node.is_left_edge() { 'L' } else { '-' });
        flags.push(if node.is_right_edge() { 'R' } else { '-' });
        flags.push(if node.flags.last_key_double() { 'D' } else { '-' });
        let kind = if node.is_leaf() { "leaf" } else { "dir" };
        let written = match &node.body {
            NodeBody::Leaf { values } => writeln!(
                out,
                "{:indent$}{kind} #{recid} [{flags}] keys={:?} link={} values={}",
                "",
                node.keys,
                node.link,
                values.len(),
                indent = depth * 2
            ),
            NodeBody::Directory { children } => writeln!(
                out,
                "{:indent$}{kind} #{recid} [{flags}] keys={:?} link={} children={:?}",
                "",
                node.keys,
                node.link,
                children.iter().map(|child| child.0).collect::<Vec<_>>(),
                indent = depth * 2
            ),
        };
        written.map_err(|_| BLinkError::invalid("structure dump writer failed"))?;
        for child in node.children() {
            self.dump_node(out, *child, depth + 1)?;
        }
        Ok(())
    }
}
