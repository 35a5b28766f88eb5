use anyhow::{Context, Result};
use log::{debug, warn};
use object::{Object, ObjectSegment};
use rustc_demangle::demangle;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::memory_maps::{image_base, parse_memory_maps, Mapping};
use super::resolver::{SymbolInfo, SymbolResolver};
use crate::domain::{Address, Pid};

/// Symbolizer for addresses inside a live process
///
/// Finds the image an address was loaded from through `/proc/<pid>/maps`,
/// then looks the address up in that image's ELF symbol table. Symbol tables
/// are loaded once per image and kept for the lifetime of the symbolizer.
pub struct ProcSymbolizer {
    pid: Pid,
    mappings: Mutex<Vec<Mapping>>,
    /// `None` marks an image whose symbols could not be loaded.
    images: Mutex<HashMap<PathBuf, Option<Arc<ImageSymbols>>>>,
}

impl ProcSymbolizer {
    /// Create a symbolizer for the given process
    ///
    /// # Errors
    /// Returns an error if `/proc/<pid>/maps` cannot be read
    pub fn new(pid: Pid) -> Result<Self> {
        let mappings = parse_memory_maps(pid.0)?;
        Ok(Self { pid, mappings: Mutex::new(mappings), images: Mutex::new(HashMap::new()) })
    }

    /// Demangle a Rust or C++ symbol name
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }

    /// Find the mapping holding `addr` and the load base of its image.
    fn lookup_mapping(&self, addr: u64) -> Option<(Mapping, u64)> {
        let mappings = self.mappings.lock().unwrap_or_else(PoisonError::into_inner);
        let mapping = mappings.iter().find(|m| m.range.contains(addr))?.clone();
        let base = image_base(&mappings, &mapping.path).unwrap_or(mapping.range.start);
        Some((mapping, base))
    }

    /// Re-read the maps file, picking up libraries loaded since the last read.
    fn refresh_mappings(&self) {
        match parse_memory_maps(self.pid.0) {
            Ok(fresh) => {
                *self.mappings.lock().unwrap_or_else(PoisonError::into_inner) = fresh;
            }
            Err(e) => debug!("Failed to refresh memory maps for {}: {e:#}", self.pid),
        }
    }

    fn image_symbols(&self, path: &Path) -> Option<Arc<ImageSymbols>> {
        let mut images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        images
            .entry(path.to_path_buf())
            .or_insert_with(|| match ImageSymbols::load(path) {
                Ok(symbols) => {
                    debug!("Loaded {} symbols from {}", symbols.symbols.len(), path.display());
                    Some(Arc::new(symbols))
                }
                Err(e) => {
                    warn!("No symbols for {}: {e:#}", path.display());
                    None
                }
            })
            .clone()
    }
}

impl SymbolResolver for ProcSymbolizer {
    fn resolve(&self, address: Address) -> Option<SymbolInfo> {
        let addr = address.0;
        let (mapping, base) = match self.lookup_mapping(addr) {
            Some(found) => found,
            None => {
                self.refresh_mappings();
                self.lookup_mapping(addr)?
            }
        };

        let image_name = mapping
            .path
            .file_name()
            .map_or_else(|| mapping.path.display().to_string(), |n| n.to_string_lossy().into());
        let offset_in_image = addr - base;

        let symbol = self.image_symbols(&mapping.path).and_then(|image| {
            let vaddr = image.virtual_address(mapping.file_offset_of(addr))?;
            let (start, name) = image.enclosing_symbol(vaddr)?;
            Some((Self::demangle_symbol(name), vaddr - start))
        });

        Some(match symbol {
            Some((name, offset_in_symbol)) => SymbolInfo {
                image_name,
                offset_in_image,
                symbol_name: Some(name),
                offset_in_symbol,
            },
            None => SymbolInfo {
                image_name,
                offset_in_image,
                symbol_name: None,
                offset_in_symbol: offset_in_image,
            },
        })
    }
}

/// Symbol table and segment layout of one ELF image.
struct ImageSymbols {
    /// (file offset, file size, virtual address) per loadable segment.
    segments: Vec<(u64, u64, u64)>,
    /// (start address, mangled name), sorted by address.
    symbols: Vec<(u64, String)>,
}

impl ImageSymbols {
    fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let obj = object::File::parse(&*data).context("Failed to parse object file")?;

        let segments = obj
            .segments()
            .map(|segment| {
                let (offset, size) = segment.file_range();
                (offset, size, segment.address())
            })
            .collect();

        let symbol_map = obj.symbol_map();
        let mut symbols: Vec<(u64, String)> = symbol_map
            .symbols()
            .iter()
            .map(|symbol| (symbol.address(), symbol.name().to_string()))
            .collect();
        symbols.sort_by_key(|(start, _)| *start);

        Ok(Self { segments, symbols })
    }

    /// Translate a file offset into the image's virtual address space.
    fn virtual_address(&self, file_offset: u64) -> Option<u64> {
        self.segments
            .iter()
            .find(|(offset, size, _)| file_offset >= *offset && file_offset < offset + size)
            .map(|(offset, _, vaddr)| vaddr + (file_offset - offset))
    }

    /// Closest symbol starting at or before `vaddr`.
    fn enclosing_symbol(&self, vaddr: u64) -> Option<(u64, &str)> {
        let idx = self.symbols.partition_point(|(start, _)| *start <= vaddr);
        let (start, name) = self.symbols.get(idx.checked_sub(1)?)?;
        Some((*start, name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demangle_symbol() {
        let demangled =
            ProcSymbolizer::demangle_symbol("_ZN5tokio7runtime4task3raw7RawTask4poll17h0123456789abcdefE");
        assert_eq!(demangled, "tokio::runtime::task::raw::RawTask::poll");
        assert_eq!(ProcSymbolizer::demangle_symbol("main"), "main");
    }

    #[test]
    fn test_enclosing_symbol_lookup() {
        let image = ImageSymbols {
            segments: vec![(0x1000, 0x2000, 0x401000)],
            symbols: vec![(0x401000, "first".to_string()), (0x401100, "second".to_string())],
        };

        assert_eq!(image.virtual_address(0x1180), Some(0x401180));
        assert_eq!(image.virtual_address(0x0800), None);
        assert_eq!(image.enclosing_symbol(0x401180), Some((0x401100, "second")));
        assert_eq!(image.enclosing_symbol(0x401000), Some((0x401000, "first")));
        assert_eq!(image.enclosing_symbol(0x400fff), None);
    }

    #[test]
    fn test_unmapped_address_is_unresolved() {
        let pid = Pid(i32::try_from(std::process::id()).unwrap());
        let symbolizer = ProcSymbolizer::new(pid).unwrap();
        assert!(symbolizer.resolve(Address(0x10)).is_none());
    }
}
