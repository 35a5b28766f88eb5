//! Memory mapping utilities for process address space analysis
//!
//! Parses `/proc/<pid>/maps` so a runtime address can be traced back to the
//! image (executable or shared library) it was loaded from, and to its offset
//! inside that image's file.

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Memory range in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// One line of `/proc/<pid>/maps` that is backed by a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub range: MemoryRange,
    /// Offset into the backing file where this mapping starts.
    pub file_offset: u64,
    pub path: PathBuf,
}

impl Mapping {
    /// File offset of a runtime address inside this mapping.
    #[must_use]
    pub fn file_offset_of(&self, addr: u64) -> u64 {
        addr - self.range.start + self.file_offset
    }
}

/// Read and parse `/proc/<pid>/maps`
///
/// Anonymous mappings and pseudo files (`[heap]`, `[vdso]`, ...) are skipped.
///
/// # Errors
/// Returns an error if the maps file cannot be read or a line is malformed
pub fn parse_memory_maps(pid: i32) -> Result<Vec<Mapping>> {
    let maps_path = format!("/proc/{pid}/maps");
    let maps = fs::read_to_string(&maps_path).context(format!("Failed to read {maps_path}"))?;
    let mappings = parse_maps_content(&maps)?;
    debug!("Parsed {} file-backed mappings from {maps_path}", mappings.len());
    Ok(mappings)
}

/// Parse the text of a maps file
///
/// Line format: "start-end perms offset dev inode pathname"
///
/// # Errors
/// Returns an error if an address range or offset is not valid hex
pub fn parse_maps_content(content: &str) -> Result<Vec<Mapping>> {
    let mut mappings = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        let path = parts[5..].join(" ");
        if !path.starts_with('/') {
            continue;
        }

        let (start, end) = parts[0].split_once('-').context("Malformed address range")?;
        let start = u64::from_str_radix(start, 16).context("Failed to parse range start")?;
        let end = u64::from_str_radix(end, 16).context("Failed to parse range end")?;
        let file_offset =
            u64::from_str_radix(parts[2], 16).context("Failed to parse mapping offset")?;

        mappings.push(Mapping {
            range: MemoryRange { start, end },
            file_offset,
            path: PathBuf::from(path),
        });
    }

    Ok(mappings)
}

/// Lowest address any mapping of `path` starts at (the image's load base).
#[must_use]
pub fn image_base(mappings: &[Mapping], path: &Path) -> Option<u64> {
    mappings.iter().filter(|m| m.path == path).map(|m| m.range.start).min()
}
