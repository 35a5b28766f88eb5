//! A sampled call stack and the energy attributed to it.

use crate::domain::{Address, Energy};

/// One observed call stack.
///
/// Addresses run leaf (innermost, index 0) to root (outermost caller, last
/// index). Trailing null addresses are unmapped/sentinel frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Backtrace {
    pub addresses: Vec<Address>,
    /// Energy consumed by the sampled thread during the round this stack was
    /// captured in. `None` when the thread had no baseline yet.
    pub energy: Option<Energy>,
}

impl Backtrace {
    #[must_use]
    pub fn new(addresses: Vec<Address>, energy: Option<Energy>) -> Self {
        Self { addresses, energy }
    }

    /// Build a backtrace from raw addresses, masking each with `mask`.
    #[must_use]
    pub fn from_raw(raw: &[u64], mask: u64, energy: Option<Energy>) -> Self {
        let addresses = raw.iter().map(|&addr| Address::masked(addr, mask)).collect();
        Self { addresses, energy }
    }

    /// Frames with trailing null addresses removed.
    ///
    /// Nulls are only stripped from the outer end; a null in the middle stays.
    #[must_use]
    pub fn frames(&self) -> &[Address] {
        let len = self.addresses.iter().rposition(|a| !a.is_null()).map_or(0, |idx| idx + 1);
        &self.addresses[..len]
    }

    /// True when no frames remain after trimming.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(raw: &[u64]) -> Vec<Address> {
        raw.iter().copied().map(Address).collect()
    }

    #[test]
    fn test_trailing_nulls_are_trimmed() {
        let bt = Backtrace::new(addrs(&[0xa, 0xb, 0, 0]), None);
        assert_eq!(bt.frames(), addrs(&[0xa, 0xb]).as_slice());
    }

    #[test]
    fn test_inner_nulls_are_kept() {
        let bt = Backtrace::new(addrs(&[0, 0xa, 0, 0xb]), None);
        assert_eq!(bt.frames(), addrs(&[0, 0xa, 0, 0xb]).as_slice());
    }

    #[test]
    fn test_all_null_backtrace_is_empty() {
        assert!(Backtrace::new(addrs(&[0, 0, 0]), Some(1.0)).is_empty());
        assert!(Backtrace::new(Vec::new(), Some(1.0)).is_empty());
    }

    #[test]
    fn test_from_raw_masks_addresses() {
        let bt = Backtrace::from_raw(&[0xff00_0000_0000_1234], 0x0000_ffff_ffff_ffff, Some(2.0));
        assert_eq!(bt.addresses, vec![Address(0x1234)]);
        assert_eq!(bt.energy, Some(2.0));
    }
}
