//! Flat per-address energy attribution and the symbol memo shared with the
//! call tree.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::model::Backtrace;
use crate::domain::{Address, Energy};
use crate::symbolization::{SymbolInfo, SymbolResolver};

/// Energy charged to one address across every backtrace it appeared in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatEnergyEntry {
    pub address: Address,
    pub symbol: Option<SymbolInfo>,
    pub energy: Energy,
}

#[derive(Debug, Default)]
struct FlatTable {
    entries: Vec<FlatEnergyEntry>,
    index: HashMap<Address, usize>,
}

/// Address-keyed energy table, plus a memo in front of the symbol resolver.
///
/// Each frame of a backtrace is charged the backtrace's full energy. A frame
/// seen twice in one backtrace (recursion) is charged twice, so entries do not
/// sum to the energy actually consumed. The call tree gives the exclusive view.
///
/// Resolution results are kept forever, including misses: a given address
/// reaches the resolver at most once per cache under normal use.
pub struct AttributionCache {
    resolver: Arc<dyn SymbolResolver>,
    symbols: Mutex<HashMap<Address, Option<SymbolInfo>>>,
    flat: Mutex<FlatTable>,
}

impl AttributionCache {
    #[must_use]
    pub fn new(resolver: Arc<dyn SymbolResolver>) -> Self {
        Self { resolver, symbols: Mutex::new(HashMap::new()), flat: Mutex::new(FlatTable::default()) }
    }

    /// Resolve one address, consulting the memo first.
    ///
    /// The resolver itself runs without any lock held.
    pub fn resolve(&self, address: Address) -> Option<SymbolInfo> {
        if let Some(hit) = self.symbols.lock().unwrap_or_else(PoisonError::into_inner).get(&address) {
            return hit.clone();
        }

        let info = self.resolver.resolve(address);
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address)
            .or_insert(info)
            .clone()
    }

    /// Resolve every distinct address in `addresses`.
    pub fn resolve_all(&self, addresses: &[Address]) -> HashMap<Address, Option<SymbolInfo>> {
        let mut resolved = HashMap::with_capacity(addresses.len());
        for &address in addresses {
            if !resolved.contains_key(&address) {
                resolved.insert(address, self.resolve(address));
            }
        }
        resolved
    }

    /// Charge a backtrace's energy to each of its frames.
    ///
    /// Backtraces with unknown energy, or nothing left after trimming sentinel
    /// frames, are ignored.
    pub fn accumulate(&self, backtrace: &Backtrace) {
        let Some(energy) = backtrace.energy else {
            return;
        };
        let frames = backtrace.frames();
        if frames.is_empty() {
            return;
        }
        let symbols = self.resolve_all(frames);
        self.accumulate_resolved(frames, energy, &symbols);
    }

    /// Like [`accumulate`](Self::accumulate) with symbols already at hand.
    pub(crate) fn accumulate_resolved(
        &self,
        frames: &[Address],
        energy: Energy,
        symbols: &HashMap<Address, Option<SymbolInfo>>,
    ) {
        let mut flat = self.flat.lock().unwrap_or_else(PoisonError::into_inner);
        let FlatTable { entries, index } = &mut *flat;
        for &address in frames {
            let slot = *index.entry(address).or_insert_with(|| {
                entries.push(FlatEnergyEntry {
                    address,
                    symbol: symbols.get(&address).cloned().flatten(),
                    energy: 0.0,
                });
                entries.len() - 1
            });
            entries[slot].energy += energy;
        }
    }

    /// Energy for one address, if it was ever charged.
    #[must_use]
    pub fn energy_of(&self, address: Address) -> Option<Energy> {
        let flat = self.flat.lock().unwrap_or_else(PoisonError::into_inner);
        flat.index.get(&address).map(|&slot| flat.entries[slot].energy)
    }

    /// Snapshot of every entry, in first-seen order.
    #[must_use]
    pub fn entries(&self) -> Vec<FlatEnergyEntry> {
        self.flat.lock().unwrap_or_else(PoisonError::into_inner).entries.clone()
    }

    /// Number of addresses with a memoized resolution (hit or miss).
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.symbols.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for AttributionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionCache")
            .field("resolved", &self.resolved_count())
            .field("entries", &self.flat.lock().unwrap_or_else(PoisonError::into_inner).entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolization::NullResolver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const A: Address = Address(0xa);
    const B: Address = Address(0xb);

    fn assert_energy(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap();
        assert!((actual - expected).abs() < 1e-12, "expected {expected}, got {actual}");
    }

    #[test]
    fn test_each_frame_gets_full_energy() {
        let cache = AttributionCache::new(Arc::new(NullResolver));
        cache.accumulate(&Backtrace::new(vec![A, B], Some(3.0)));

        assert_energy(cache.energy_of(A), 3.0);
        assert_energy(cache.energy_of(B), 3.0);
    }

    #[test]
    fn test_recursive_frames_count_per_occurrence() {
        let cache = AttributionCache::new(Arc::new(NullResolver));
        cache.accumulate(&Backtrace::new(vec![A, A, B], Some(1.0)));

        assert_energy(cache.energy_of(A), 2.0);
        assert_energy(cache.energy_of(B), 1.0);
    }

    #[test]
    fn test_missing_energy_is_skipped() {
        let cache = AttributionCache::new(Arc::new(NullResolver));
        cache.accumulate(&Backtrace::new(vec![A, B], None));
        assert!(cache.entries().is_empty());
        assert!(cache.energy_of(A).is_none());
    }

    #[test]
    fn test_sentinel_frames_are_not_charged() {
        let cache = AttributionCache::new(Arc::new(NullResolver));
        cache.accumulate(&Backtrace::new(vec![A, Address::NULL], Some(1.0)));
        assert_eq!(cache.entries().len(), 1);
        assert!(cache.energy_of(Address::NULL).is_none());
    }

    #[test]
    fn test_entries_accumulate_in_first_seen_order() {
        let cache = AttributionCache::new(Arc::new(NullResolver));
        cache.accumulate(&Backtrace::new(vec![B], Some(1.0)));
        cache.accumulate(&Backtrace::new(vec![A, B], Some(0.5)));

        let entries = cache.entries();
        assert_eq!(entries.iter().map(|e| e.address).collect::<Vec<_>>(), vec![B, A]);
        assert!((entries[0].energy - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_resolver_called_once_per_address() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolver = move |address: Address| {
            counter.fetch_add(1, Ordering::SeqCst);
            (address == A).then(|| SymbolInfo {
                image_name: "app".to_string(),
                offset_in_image: 0x10,
                symbol_name: Some("app::work".to_string()),
                offset_in_symbol: 0,
            })
        };
        let cache = AttributionCache::new(Arc::new(resolver));

        for _ in 0..3 {
            cache.accumulate(&Backtrace::new(vec![A, B], Some(1.0)));
            assert!(cache.resolve(A).is_some());
            assert!(cache.resolve(B).is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.resolved_count(), 2);
        let entries = cache.entries();
        assert_eq!(entries[0].symbol.as_ref().and_then(|s| s.symbol_name.as_deref()), Some("app::work"));
        assert!(entries[1].symbol.is_none());
    }
}
