//! Symbol metadata and the resolver seam.

use serde::Serialize;

use crate::domain::Address;

/// Where an address lives: which image, and which symbol inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SymbolInfo {
    /// File name of the executable or library containing the address.
    pub image_name: String,
    /// Offset of the address from the image's load base.
    pub offset_in_image: u64,
    /// Demangled name of the enclosing symbol, if the image has one for it.
    pub symbol_name: Option<String>,
    /// Offset of the address from the start of the enclosing symbol.
    ///
    /// Equal to `offset_in_image` when no symbol was found.
    pub offset_in_symbol: u64,
}

impl SymbolInfo {
    /// Summary in the style of a crash report line, e.g. `0x1780, my-app`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("0x{:x}, {}", self.offset_in_image, self.image_name)
    }
}

/// Turns a code address into [`SymbolInfo`].
///
/// `None` means the address cannot be resolved; callers treat that as final.
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, address: Address) -> Option<SymbolInfo>;
}

/// Resolver that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl SymbolResolver for NullResolver {
    fn resolve(&self, _address: Address) -> Option<SymbolInfo> {
        None
    }
}

impl<F> SymbolResolver for F
where
    F: Fn(Address) -> Option<SymbolInfo> + Send + Sync,
{
    fn resolve(&self, address: Address) -> Option<SymbolInfo> {
        self(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let info = SymbolInfo {
            image_name: "my-app".to_string(),
            offset_in_image: 0x1780,
            symbol_name: Some("my_app::main".to_string()),
            offset_in_symbol: 0x10,
        };
        assert_eq!(info.display_name(), "0x1780, my-app");
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |address: Address| {
            (address.0 == 1).then(|| SymbolInfo {
                image_name: "libfoo.so".to_string(),
                offset_in_image: 1,
                symbol_name: None,
                offset_in_symbol: 1,
            })
        };
        assert!(resolver.resolve(Address(1)).is_some());
        assert!(resolver.resolve(Address(2)).is_none());
        assert!(NullResolver.resolve(Address(1)).is_none());
    }
}
