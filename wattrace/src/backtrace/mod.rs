//! # Backtrace Attribution
//!
//! Two views of where sampled energy went:
//!
//! - **Call tree** ([`BacktraceTrie`]): backtraces merged root first, so a node
//!   carries the energy of every stack that passed through it. This is the
//!   inclusive, hierarchical view.
//! - **Flat table** ([`AttributionCache`]): energy per address, each frame
//!   charged the full energy of its backtrace. This answers "which functions
//!   show up in expensive stacks" without regard to depth.
//!
//! ```text
//! [A, B, C] 1 J     C 3 J
//! [D, B, C] 2 J  →  └─ B 3 J
//!                      ├─ A 1 J
//!                      └─ D 2 J
//! ```
//!
//! Both views share one symbol memo held by the attribution cache. Symbols are
//! resolved before the call tree is locked, so a slow resolver never blocks
//! readers of the tree.

pub mod attribution;
pub mod model;
pub mod trie;
pub mod view;

pub use attribution::{AttributionCache, FlatEnergyEntry};
pub use model::Backtrace;
pub use trie::{BacktraceTrie, CallTreeNode, InsertOutcome};
pub use view::{energy_share, frame_label, sort_tree_by_energy, top_flat_entries};
