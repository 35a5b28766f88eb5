//! # Symbol Resolution and Address Translation
//!
//! Backtraces captured by the counter source are lists of raw return
//! addresses like `0x55f3a2b4c780`. To attribute energy to code, each address
//! is translated into a [`SymbolInfo`]:
//! - **Image name**: the executable or shared library it lives in (`libc.so.6`)
//! - **Offset in image**: distance from the image's load base (`0x1780`)
//! - **Symbol name**: the enclosing function, demangled (`my_app::encode`)
//! - **Offset in symbol**: distance from the start of that function
//!
//! ## Address Translation Flow
//!
//! ```text
//! 1. Sampled return address
//!    0x55f3a2b4d780
//!
//! 2. Find the mapping in /proc/<pid>/maps that contains it
//!    55f3a2b4d000-55f3a2b5f000 r-xp 00001000 ... /usr/bin/my-app
//!
//! 3. Convert to a file offset
//!    0x55f3a2b4d780 - 0x55f3a2b4d000 + 0x1000 = 0x1780
//!
//! 4. Convert the file offset to a virtual address through the ELF
//!    program headers, then find the closest preceding symbol
//!    0x1780 → my_app::encode + 0x30
//! ```
//!
//! ## Module Structure
//!
//! - **`resolver`**: [`SymbolInfo`] and the [`SymbolResolver`] seam the core
//!   calls through. Anything that can resolve addresses (a test closure, a
//!   platform facility) plugs in here.
//! - **`memory_maps`**: `/proc/<pid>/maps` parsing.
//! - **`symbolizer`**: [`ProcSymbolizer`], the Linux implementation backed by
//!   ELF symbol tables (`object`) and `rustc-demangle`.
//!
//! ## Caching
//!
//! `ProcSymbolizer` keeps one parsed symbol table per image. Per-address
//! results are memoized one level up, in
//! [`AttributionCache`](crate::backtrace::AttributionCache), so each distinct
//! address reaches the resolver at most once.
//!
//! ## Limitations
//!
//! - Stripped images resolve to an image name and offset only.
//! - The nearest preceding symbol is reported, as `dladdr(3)` does; sizes are
//!   not checked.

pub mod memory_maps;
pub mod resolver;
pub mod symbolizer;

pub use memory_maps::{parse_memory_maps, Mapping, MemoryRange};
pub use resolver::{NullResolver, SymbolInfo, SymbolResolver};
pub use symbolizer::ProcSymbolizer;
