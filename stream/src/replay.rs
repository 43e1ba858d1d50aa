//! Bounded memory of recently processed nonces.

use std::{
    collections::{HashSet, VecDeque},
    num::NonZeroUsize,
};

/// Number of nonces remembered when no other capacity is configured.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Rejects nonces that were already observed.
///
/// Once `capacity` nonces are stored, recording a new one evicts the oldest (first-in,
/// first-out). An evicted nonce is accepted again if it reappears.
#[derive(Debug)]
pub struct ReplayGuard<const N: usize> {
    capacity: usize,
    order: VecDeque<[u8; N]>,
    seen: HashSet<[u8; N]>,
}

impl<const N: usize> ReplayGuard<N> {
    /// Create a new guard remembering at most `capacity` nonces.
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `true` if `nonce` was already remembered (a replay), leaving the history
    /// untouched. Otherwise records `nonce` and returns `false`.
    pub fn observe(&mut self, nonce: [u8; N]) -> bool {
        if !self.seen.insert(nonce) {
            return true;
        }
        self.order.push_back(nonce);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        false
    }

    /// Returns whether `nonce` is currently remembered.
    pub fn contains(&self, nonce: &[u8; N]) -> bool {
        self.seen.contains(nonce)
    }

    /// Number of nonces currently remembered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether no nonce is remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<const N: usize> Default for ReplayGuard<N> {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce(i: u32) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&i.to_be_bytes());
        nonce
    }

    fn with_capacity(capacity: usize) -> ReplayGuard<12> {
        ReplayGuard::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_rejects_duplicate() {
        let mut guard = ReplayGuard::<12>::default();
        assert!(!guard.observe(nonce(1)));
        assert!(guard.observe(nonce(1)));
        assert!(!guard.observe(nonce(2)));
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut guard = with_capacity(3);
        for i in 0..3 {
            assert!(!guard.observe(nonce(i)));
        }

        // Fourth nonce evicts the first
        assert!(!guard.observe(nonce(3)));
        assert_eq!(guard.len(), 3);
        assert!(!guard.contains(&nonce(0)));
        assert!(guard.contains(&nonce(1)));

        // The evicted nonce is accepted again and evicts the next oldest
        assert!(!guard.observe(nonce(0)));
        assert!(!guard.contains(&nonce(1)));
        assert!(guard.observe(nonce(2)));
    }

    #[test]
    fn test_rejected_does_not_reorder() {
        let mut guard = with_capacity(2);
        assert!(!guard.observe(nonce(0)));
        assert!(!guard.observe(nonce(1)));

        // Replaying the oldest does not refresh its position
        assert!(guard.observe(nonce(0)));
        assert!(!guard.observe(nonce(2)));
        assert!(!guard.contains(&nonce(0)));
        assert!(guard.contains(&nonce(1)));
    }

    #[test]
    fn test_default_capacity() {
        let mut guard = ReplayGuard::<12>::default();
        for i in 0..DEFAULT_CAPACITY as u32 {
            assert!(!guard.observe(nonce(i)));
        }
        assert_eq!(guard.len(), DEFAULT_CAPACITY);
        assert!(guard.observe(nonce(0)));

        // One past the capacity forgets the first nonce
        assert!(!guard.observe(nonce(DEFAULT_CAPACITY as u32)));
        assert!(!guard.observe(nonce(0)));
    }

    #[test]
    fn test_smallest_capacity_rejects() {
        let mut guard = with_capacity(1);
        assert!(!guard.observe(nonce(0)));
        assert!(guard.observe(nonce(0)));
        assert!(!guard.observe(nonce(1)));
        assert!(guard.observe(nonce(1)));
        assert_eq!(guard.len(), 1);
    }
}
