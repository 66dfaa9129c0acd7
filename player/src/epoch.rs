/*!
    The shared epoch counter that lets a [`crate::clock::Clock`] observe a
    [`crate::packet_queue::PacketQueue`]'s flush generation without owning it.

    The queue owns the counter and increments it on every `start`/`flush`;
    every clock anchored to that queue holds a clone of the same handle and
    only ever reads it.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A non-owning, shared view of a queue's flush generation.
#[derive(Clone)]
pub struct EpochHandle(Arc<AtomicU64>);

impl EpochHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    /// A handle that never changes, for clocks not anchored to a queue (the
    /// external clock).
    pub fn free_standing() -> Self {
        Self::new()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for EpochHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_increments_and_returns_new_value() {
        let epoch = EpochHandle::new();
        assert_eq!(epoch.get(), 0);
        assert_eq!(epoch.bump(), 1);
        assert_eq!(epoch.get(), 1);
    }

    #[test]
    fn clones_share_the_same_counter() {
        let epoch = EpochHandle::new();
        let clone = epoch.clone();
        epoch.bump();
        assert_eq!(clone.get(), 1);
    }
}
