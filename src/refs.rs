//! Per-library bookkeeping of outstanding symbol references.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use crate::error::PluginError;
use crate::loader::SymbolAddr;

/// Counts how many times each resolved address is currently borrowed.
///
/// Counts are stored as [`NonZeroUsize`]: an address whose count drops to
/// zero is removed, so "absent" and "zero" are the same state and the map
/// only ever holds addresses that are actually borrowed.
#[derive(Debug, Default)]
pub struct SymbolRefs {
    counts: HashMap<SymbolAddr, NonZeroUsize>,
}

impl SymbolRefs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more reference to `addr` and return its new count.
    pub fn acquire(&mut self, addr: SymbolAddr) -> usize {
        let count = match self.counts.get(&addr) {
            Some(count) => count.saturating_add(1),
            None => NonZeroUsize::MIN,
        };
        self.counts.insert(addr, count);
        count.get()
    }

    /// Drop one reference to `addr` and return how many remain.
    pub fn release(&mut self, addr: SymbolAddr) -> Result<usize, PluginError> {
        let count = self.counts.get(&addr).ok_or(PluginError::SymbolUnknown)?;
        match NonZeroUsize::new(count.get() - 1) {
            Some(remaining) => {
                self.counts.insert(addr, remaining);
                Ok(remaining.get())
            }
            None => {
                self.counts.remove(&addr);
                Ok(0)
            }
        }
    }

    pub fn count(&self, addr: SymbolAddr) -> usize {
        self.counts.get(&addr).map_or(0, |count| count.get())
    }

    /// True while any address has a positive count.
    pub fn is_busy(&self) -> bool {
        !self.counts.is_empty()
    }

    /// Sum of all outstanding references.
    pub fn outstanding(&self) -> usize {
        self.counts.values().map(|count| count.get()).sum()
    }

    /// Number of distinct addresses currently borrowed.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const A: SymbolAddr = SymbolAddr::from_raw(0x1000);
    const B: SymbolAddr = SymbolAddr::from_raw(0x2000);

    #[test]
    fn test_counts_are_additive() {
        let mut refs = SymbolRefs::new();
        assert_eq!(refs.acquire(A), 1);
        assert_eq!(refs.acquire(A), 2);
        assert_eq!(refs.release(A), Ok(1));
        assert!(refs.is_busy());
        assert_eq!(refs.release(A), Ok(0));
        assert!(!refs.is_busy());
    }

    #[test]
    fn test_release_after_drain_is_unknown() {
        let mut refs = SymbolRefs::new();
        refs.acquire(A);
        refs.release(A).unwrap();
        assert_eq!(refs.release(A), Err(PluginError::SymbolUnknown));
        assert_eq!(refs.release(B), Err(PluginError::SymbolUnknown));
        assert_eq!(refs.distinct(), 0);
    }

    #[test]
    fn test_outstanding_spans_addresses() {
        let mut refs = SymbolRefs::new();
        refs.acquire(A);
        refs.acquire(B);
        refs.acquire(B);
        assert_eq!(refs.outstanding(), 3);
        assert_eq!(refs.distinct(), 2);
        assert_eq!(refs.count(B), 2);
        refs.clear();
        assert_eq!(refs.count(B), 0);
    }

    proptest! {
        #[test]
        fn prop_tracker_matches_model(
            ops in proptest::collection::vec((any::<bool>(), 0usize..4), 0..64)
        ) {
            let mut refs = SymbolRefs::new();
            let mut model = [0usize; 4];

            for (acquire, slot) in ops {
                let addr = SymbolAddr::from_raw((slot + 1) * 0x10);
                if acquire {
                    model[slot] += 1;
                    prop_assert_eq!(refs.acquire(addr), model[slot]);
                } else if model[slot] == 0 {
                    prop_assert_eq!(refs.release(addr), Err(PluginError::SymbolUnknown));
                } else {
                    model[slot] -= 1;
                    prop_assert_eq!(refs.release(addr), Ok(model[slot]));
                }
                prop_assert_eq!(refs.is_busy(), model.iter().any(|&n| n > 0));
                prop_assert_eq!(refs.outstanding(), model.iter().sum::<usize>());
                prop_assert_eq!(refs.distinct(), model.iter().filter(|&&n| n > 0).count());
            }
        }
    }
}
