//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a TID where a
//! display id is expected, and make function signatures more expressive.

use serde::Serialize;
use std::fmt;

/// Power measurement, always in watts.
pub type Power = f64;

/// Energy measurement, always in watt-hours.
pub type Energy = f64;

/// Bitmask that strips pointer-authentication bits from return addresses
/// captured on arm64e.
pub const PAC_STRIPPING_MASK: u64 = 0x0000_000F_FFFF_FFFF;

/// Address mask applied to raw backtrace addresses when none is configured.
pub const DEFAULT_ADDRESS_MASK: u64 =
    if cfg!(all(target_arch = "aarch64", target_vendor = "apple")) {
        PAC_STRIPPING_MASK
    } else {
        u64::MAX
    };

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    fn from(pid: i32) -> Self {
        Pid(pid)
    }
}

impl From<Pid> for i32 {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

/// Thread ID
///
/// Kernel-assigned thread identifier. Wide enough for Mach thread ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Tid(pub u64);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Display ID (1-indexed)
///
/// Small integer handed out the first time a thread is observed. Stable for
/// the lifetime of the thread id and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DisplayId(pub u32);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread {}", self.0)
    }
}

/// Code address captured while unwinding a thread's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Address(pub u64);

impl Address {
    /// Null frames mark unmapped or sentinel entries at the end of a backtrace.
    pub const NULL: Address = Address(0);

    /// Build an address from a raw value, dropping bits outside `mask`.
    ///
    /// Two raw values are the same address only once masked.
    #[must_use]
    pub fn masked(raw: u64, mask: u64) -> Self {
        Address(raw & mask)
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Processor class on heterogeneous multi-core hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CoreType {
    Performance,
    Efficiency,
}

impl CoreType {
    /// Both core types, in reporting order.
    pub const ALL: [CoreType; 2] = [CoreType::Performance, CoreType::Efficiency];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CoreType::Performance => "Performance",
            CoreType::Efficiency => "Efficiency",
        }
    }

    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            CoreType::Performance => "P",
            CoreType::Efficiency => "E",
        }
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_id_display() {
        assert_eq!(DisplayId(5).to_string(), "Thread 5");
    }

    #[test]
    fn test_pid_conversion() {
        let pid = Pid::from(1234i32);
        assert_eq!(pid.0, 1234);
        let back: i32 = pid.into();
        assert_eq!(back, 1234);
        assert_eq!(pid.to_string(), "PID:1234");
    }

    #[test]
    fn test_address_masking() {
        let tagged = 0x002d_0001_8f3a_2b4c;
        let plain = 0x0000_0001_8f3a_2b4c;
        assert_ne!(Address(tagged), Address(plain));
        assert_eq!(
            Address::masked(tagged, PAC_STRIPPING_MASK),
            Address::masked(plain, PAC_STRIPPING_MASK)
        );
        assert_eq!(Address::masked(tagged, u64::MAX), Address(tagged));
    }

    #[test]
    fn test_address_null_and_display() {
        assert!(Address::NULL.is_null());
        assert!(!Address(0x10).is_null());
        assert_eq!(Address(0x1f).to_string(), "0x000000000000001f");
    }

    #[test]
    fn test_core_type_names() {
        assert_eq!(CoreType::Performance.short_name(), "P");
        assert_eq!(CoreType::Efficiency.name(), "Efficiency");
        assert_eq!(CoreType::ALL.len(), 2);
    }
}
