//! Presentation helpers for call trees and flat entries.

use super::attribution::FlatEnergyEntry;
use super::trie::CallTreeNode;
use crate::domain::{Address, Energy};
use crate::symbolization::SymbolInfo;

/// Sort every level of a call tree by energy, highest first.
pub fn sort_tree_by_energy(nodes: &mut [CallTreeNode]) {
    let mut levels: Vec<&mut [CallTreeNode]> = vec![nodes];
    while let Some(level) = levels.pop() {
        level.sort_by(|a, b| b.energy.total_cmp(&a.energy));
        for node in level {
            levels.push(node.children.as_mut_slice());
        }
    }
}

/// The `limit` highest-energy flat entries, highest first.
#[must_use]
pub fn top_flat_entries(mut entries: Vec<FlatEnergyEntry>, limit: usize) -> Vec<FlatEnergyEntry> {
    entries.sort_by(|a, b| b.energy.total_cmp(&a.energy));
    entries.truncate(limit);
    entries
}

/// `part` as a percentage of `total`; 0 when there is no total.
#[must_use]
pub fn energy_share(part: Energy, total: Energy) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Label for a tree node or flat entry: symbol name, image offset, or the
/// raw address.
#[must_use]
pub fn frame_label(address: Address, symbol: Option<&SymbolInfo>) -> String {
    match symbol {
        Some(info) => match &info.symbol_name {
            Some(name) => format!("{name} ({})", info.image_name),
            None => info.display_name(),
        },
        None => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(address: u64, energy: f64) -> CallTreeNode {
        CallTreeNode { address: Address(address), symbol: None, energy, children: Vec::new() }
    }

    #[test]
    fn test_sort_tree_sorts_every_level() {
        let mut tree = vec![
            CallTreeNode {
                address: Address(1),
                symbol: None,
                energy: 1.0,
                children: vec![leaf(10, 0.2), leaf(11, 0.8)],
            },
            leaf(2, 5.0),
        ];
        sort_tree_by_energy(&mut tree);

        assert_eq!(tree[0].address, Address(2));
        assert_eq!(tree[1].children[0].address, Address(11));
        assert_eq!(tree[1].children[1].address, Address(10));
    }

    #[test]
    fn test_top_flat_entries() {
        let entries = [(1, 0.5), (2, 3.0), (3, 1.0)]
            .into_iter()
            .map(|(a, e)| FlatEnergyEntry { address: Address(a), symbol: None, energy: e })
            .collect();
        let top = top_flat_entries(entries, 2);
        assert_eq!(top.iter().map(|e| e.address.0).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_energy_share() {
        assert!((energy_share(1.0, 4.0) - 25.0).abs() < 1e-12);
        assert!(energy_share(1.0, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_frame_label() {
        let mut info = SymbolInfo {
            image_name: "app".to_string(),
            offset_in_image: 0x20,
            symbol_name: Some("app::main".to_string()),
            offset_in_symbol: 4,
        };
        assert_eq!(frame_label(Address(0x1000), Some(&info)), "app::main (app)");
        info.symbol_name = None;
        assert_eq!(frame_label(Address(0x1000), Some(&info)), "0x20, app");
        assert_eq!(frame_label(Address(0x1000), None), Address(0x1000).to_string());
    }
}
