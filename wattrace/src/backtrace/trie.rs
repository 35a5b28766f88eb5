//! Energy-weighted merge trie of sampled backtraces.
//!
//! Nodes live in an arena and refer to their children by index. Lookups always
//! start at the roots, so no parent links are kept. Every walk is iterative,
//! deep call chains never recurse.

use serde::Serialize;
use std::collections::HashMap;

use super::model::Backtrace;
use crate::domain::{Address, Energy};
use crate::symbolization::SymbolInfo;

/// Handle of a node in the trie arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct TrieNode {
    address: Address,
    symbol: Option<SymbolInfo>,
    energy: Energy,
    children: Vec<NodeId>,
}

/// What [`BacktraceTrie::insert`] did with a backtrace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Nothing left after trimming sentinel frames; ignored.
    Empty,
    /// Every frame matched an existing path. Energy was added along it.
    FullyContained,
    /// A new chain of `new_nodes` nodes was attached below the matched prefix.
    Extended { new_nodes: usize },
}

/// Deep copy of a trie node and everything below it.
///
/// Children keep insertion order; sort them for display with
/// [`sort_tree_by_energy`](super::view::sort_tree_by_energy).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallTreeNode {
    pub address: Address,
    pub symbol: Option<SymbolInfo>,
    pub energy: Energy,
    pub children: Vec<CallTreeNode>,
}

/// Merge trie folding many backtraces into one tree.
///
/// Paths are keyed root first: two backtraces sharing their outer frames share
/// nodes until their frames first differ. A node's energy is the sum of the
/// energy of every backtrace whose path runs through it.
///
/// Recursion is not detected. The same address at two depths is two nodes, and
/// merging happens purely on address equality at each level.
#[derive(Debug, Default, Clone)]
pub struct BacktraceTrie {
    nodes: Vec<TrieNode>,
    roots: Vec<NodeId>,
    /// (parent, address) → child. `None` parent means a root.
    edges: HashMap<(Option<NodeId>, Address), NodeId>,
}

impl BacktraceTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a backtrace into the trie.
    ///
    /// `symbol_for` is called exactly once for every node created, and never
    /// for nodes that already exist.
    pub fn insert<F>(&mut self, backtrace: &Backtrace, mut symbol_for: F) -> InsertOutcome
    where
        F: FnMut(Address) -> Option<SymbolInfo>,
    {
        let frames = backtrace.frames();
        if frames.is_empty() {
            return InsertOutcome::Empty;
        }
        let energy = backtrace.energy.unwrap_or(0.0);

        // Walk root to leaf along existing nodes, charging energy on the way.
        let mut parent: Option<NodeId> = None;
        let mut remaining = frames;
        while let Some((&next, rest)) = remaining.split_last() {
            let Some(&child) = self.edges.get(&(parent, next)) else {
                break;
            };
            self.nodes[child.0].energy += energy;
            parent = Some(child);
            remaining = rest;
        }

        if remaining.is_empty() {
            return InsertOutcome::FullyContained;
        }

        // The unmatched inner suffix becomes one fresh chain below `parent`.
        for &address in remaining.iter().rev() {
            let id = NodeId(self.nodes.len());
            self.nodes.push(TrieNode {
                address,
                symbol: symbol_for(address),
                energy,
                children: Vec::new(),
            });
            match parent {
                Some(p) => self.nodes[p.0].children.push(id),
                None => self.roots.push(id),
            }
            self.edges.insert((parent, address), id);
            parent = Some(id);
        }

        InsertOutcome::Extended { new_nodes: remaining.len() }
    }

    /// Deep copy of every root and its subtree.
    #[must_use]
    pub fn roots(&self) -> Vec<CallTreeNode> {
        self.snapshot(&self.roots)
    }

    /// Deep copy of the node reached by following `path` (outermost first)
    /// from the roots.
    #[must_use]
    pub fn subtree(&self, path: &[Address]) -> Option<CallTreeNode> {
        let mut parent = None;
        for &address in path {
            parent = Some(*self.edges.get(&(parent, address))?);
        }
        let id = parent?;
        self.snapshot(&[id]).pop()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Energy of every inserted backtrace (sum over the roots).
    #[must_use]
    pub fn total_energy(&self) -> Energy {
        self.roots.iter().map(|id| self.nodes[id.0].energy).sum()
    }

    fn snapshot(&self, tops: &[NodeId]) -> Vec<CallTreeNode> {
        // Pre-order: every parent is listed before its children, so walking
        // the list backwards builds children first.
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = tops.to_vec();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().copied());
        }

        let mut built: HashMap<NodeId, CallTreeNode> = HashMap::with_capacity(order.len());
        for &id in order.iter().rev() {
            let node = &self.nodes[id.0];
            let children = node.children.iter().filter_map(|child| built.remove(child)).collect();
            built.insert(
                id,
                CallTreeNode {
                    address: node.address,
                    symbol: node.symbol.clone(),
                    energy: node.energy,
                    children,
                },
            );
        }

        tops.iter().filter_map(|id| built.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Address = Address(0xa);
    const B: Address = Address(0xb);
    const C: Address = Address(0xc);
    const D: Address = Address(0xd);

    fn bt(addresses: &[Address], energy: f64) -> Backtrace {
        Backtrace::new(addresses.to_vec(), Some(energy))
    }

    fn no_symbols(_: Address) -> Option<SymbolInfo> {
        None
    }

    fn assert_energy(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-12, "expected {expected}, got {actual}");
    }

    #[test]
    fn test_shared_prefix_merges_and_diverges() {
        let mut trie = BacktraceTrie::new();
        // Leaf first: root C, then B, then A / D
        trie.insert(&bt(&[A, B, C], 1.0), no_symbols);
        trie.insert(&bt(&[D, B, C], 2.0), no_symbols);

        let roots = trie.roots();
        assert_eq!(roots.len(), 1);
        let c = &roots[0];
        assert_eq!(c.address, C);
        assert_energy(c.energy, 3.0);

        assert_eq!(c.children.len(), 1);
        let b = &c.children[0];
        assert_eq!(b.address, B);
        assert_energy(b.energy, 3.0);

        assert_eq!(b.children.len(), 2);
        let a = b.children.iter().find(|n| n.address == A).unwrap();
        let d = b.children.iter().find(|n| n.address == D).unwrap();
        assert_energy(a.energy, 1.0);
        assert_energy(d.energy, 2.0);
        assert!(a.children.is_empty() && d.children.is_empty());
        assert_eq!(trie.node_count(), 4);
    }

    #[test]
    fn test_identical_reinsert_adds_energy_without_nodes() {
        let mut trie = BacktraceTrie::new();
        assert_eq!(
            trie.insert(&bt(&[A, B, C], 1.5), no_symbols),
            InsertOutcome::Extended { new_nodes: 3 }
        );
        assert_eq!(trie.insert(&bt(&[A, B, C], 2.5), no_symbols), InsertOutcome::FullyContained);
        assert_eq!(trie.node_count(), 3);

        let roots = trie.roots();
        let c = &roots[0];
        let b = &c.children[0];
        let a = &b.children[0];
        for node in [c, b, a] {
            assert_energy(node.energy, 4.0);
        }
    }

    #[test]
    fn test_prefix_of_existing_path_is_fully_contained() {
        let mut trie = BacktraceTrie::new();
        trie.insert(&bt(&[A, B, C], 1.0), no_symbols);
        // [B, C] stops at B: already present
        assert_eq!(trie.insert(&bt(&[B, C], 2.0), no_symbols), InsertOutcome::FullyContained);

        let c = &trie.roots()[0];
        assert_energy(c.energy, 3.0);
        assert_energy(c.children[0].energy, 3.0);
        assert_energy(c.children[0].children[0].energy, 1.0);
    }

    #[test]
    fn test_extending_a_leaf() {
        let mut trie = BacktraceTrie::new();
        trie.insert(&bt(&[B, C], 1.0), no_symbols);
        assert_eq!(
            trie.insert(&bt(&[A, B, C], 2.0), no_symbols),
            InsertOutcome::Extended { new_nodes: 1 }
        );
        let b = trie.subtree(&[C, B]).unwrap();
        assert_energy(b.energy, 3.0);
        assert_eq!(b.children.len(), 1);
        assert_energy(b.children[0].energy, 2.0);
    }

    #[test]
    fn test_distinct_roots() {
        let mut trie = BacktraceTrie::new();
        trie.insert(&bt(&[A, C], 1.0), no_symbols);
        trie.insert(&bt(&[A, D], 2.0), no_symbols);

        let roots = trie.roots();
        assert_eq!(roots.len(), 2);
        // Same leaf address under two roots stays two nodes
        assert_eq!(trie.node_count(), 4);
        assert_energy(trie.total_energy(), 3.0);
    }

    #[test]
    fn test_empty_and_sentinel_only_backtraces_are_ignored() {
        let mut trie = BacktraceTrie::new();
        assert_eq!(trie.insert(&bt(&[], 1.0), no_symbols), InsertOutcome::Empty);
        assert_eq!(
            trie.insert(&bt(&[Address::NULL, Address::NULL], 1.0), no_symbols),
            InsertOutcome::Empty
        );
        assert!(trie.is_empty());
    }

    #[test]
    fn test_trailing_sentinels_do_not_become_roots() {
        let mut trie = BacktraceTrie::new();
        trie.insert(&bt(&[A, B, Address::NULL, Address::NULL], 1.0), no_symbols);
        let roots = trie.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].address, B);
    }

    #[test]
    fn test_missing_energy_builds_structure_only() {
        let mut trie = BacktraceTrie::new();
        trie.insert(&Backtrace::new(vec![A, B], None), no_symbols);
        assert_eq!(trie.node_count(), 2);
        assert_energy(trie.total_energy(), 0.0);
    }

    #[test]
    fn test_symbols_resolved_once_per_new_node() {
        let mut trie = BacktraceTrie::new();
        let mut calls = Vec::new();
        let mut resolver = |address: Address| {
            calls.push(address);
            Some(SymbolInfo {
                image_name: "app".to_string(),
                offset_in_image: address.0,
                symbol_name: None,
                offset_in_symbol: address.0,
            })
        };
        trie.insert(&bt(&[A, B, C], 1.0), &mut resolver);
        trie.insert(&bt(&[D, B, C], 1.0), &mut resolver);
        trie.insert(&bt(&[D, B, C], 1.0), &mut resolver);

        assert_eq!(calls, vec![C, B, A, D]);
        let b = trie.subtree(&[C, B]).unwrap();
        assert_eq!(b.symbol.unwrap().offset_in_image, 0xb);
    }

    #[test]
    fn test_recursion_creates_nodes_per_depth() {
        let mut trie = BacktraceTrie::new();
        // A calls itself: root A, child A
        trie.insert(&bt(&[A, A], 1.0), no_symbols);
        assert_eq!(trie.node_count(), 2);
        let root = trie.subtree(&[A]).unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].address, A);
    }

    #[test]
    fn test_subtree_unknown_path() {
        let mut trie = BacktraceTrie::new();
        trie.insert(&bt(&[A, B], 1.0), no_symbols);
        assert!(trie.subtree(&[A]).is_none());
        assert!(trie.subtree(&[]).is_none());
    }

    #[test]
    fn test_deep_chain_snapshot_is_iterative() {
        let mut trie = BacktraceTrie::new();
        let frames: Vec<Address> = (1..=5_000).map(Address).collect();
        trie.insert(&Backtrace::new(frames, Some(1.0)), no_symbols);

        let roots = trie.roots();
        let mut depth = 0;
        let mut level = &roots;
        while let Some(node) = level.first() {
            depth += 1;
            level = &node.children;
        }
        assert_eq!(depth, 5_000);
    }
}
