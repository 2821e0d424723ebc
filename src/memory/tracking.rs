//! Allocation tracking for debug builds.
//!
//! [`TrackingAllocator`] records every block it hands out, keyed by the
//! block address shifted right by four bits. Released blocks stay in the
//! table as [`TrackedBlock::Freed`] tombstones so that a second release of
//! the same address is caught instead of reaching the system allocator.
//! Tombstones are pruned once they exceed a limit, after which a repeated
//! release is still rejected but reported as untracked. Blocks still live
//! when the allocator is dropped are reported through `log` and released.

use super::alloc::AlignedAllocator;
use crate::error::{MemError, Result};
use ahash::AHashMap;
use std::ptr::NonNull;

/// Tombstones kept before the table is pruned
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 1024;

#[inline]
fn key_of(ptr: NonNull<u8>) -> usize {
    (ptr.as_ptr() as usize) >> 4
}

/// State of one tracked block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedBlock {
    /// Block handed out and not yet released
    Live {
        /// Address of the block
        ptr: NonNull<u8>,
        /// Requested size in bytes
        size: usize,
        /// Optional label supplied at allocation time
        tag: Option<String>,
    },
    /// Tombstone for a released block
    Freed,
}

/// Snapshot of the tracking table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingReport {
    /// Live blocks as (address, size, tag)
    pub live: Vec<(usize, usize, Option<String>)>,
    /// Number of tombstones
    pub freed: usize,
}

impl TrackingReport {
    /// Bytes held by live blocks
    pub fn live_bytes(&self) -> usize {
        self.live.iter().map(|(_, size, _)| size).sum()
    }
}

/// Aligned allocator that keeps a table of its blocks
#[derive(Debug)]
pub struct TrackingAllocator {
    inner: AlignedAllocator,
    table: AHashMap<usize, TrackedBlock>,
    freed: usize,
    tombstone_limit: usize,
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new(AlignedAllocator::default())
    }
}

impl TrackingAllocator {
    /// Track blocks from `inner`
    pub fn new(inner: AlignedAllocator) -> Self {
        Self::with_tombstone_limit(inner, DEFAULT_TOMBSTONE_LIMIT)
    }

    /// Track blocks from `inner`, pruning once more than `limit` tombstones
    /// accumulate
    pub fn with_tombstone_limit(inner: AlignedAllocator, limit: usize) -> Self {
        Self {
            inner,
            table: AHashMap::new(),
            freed: 0,
            tombstone_limit: limit,
        }
    }

    /// Allocate and record an untagged block
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        self.record(self.inner.allocate(size)?, size, None)
    }

    /// Allocate and record a block labelled `tag`
    pub fn allocate_tagged(&mut self, size: usize, tag: &str) -> Result<NonNull<u8>> {
        self.record(self.inner.allocate(size)?, size, Some(tag.to_owned()))
    }

    /// Allocate and record a zeroed block
    pub fn allocate_zeroed(&mut self, size: usize) -> Result<NonNull<u8>> {
        self.record(self.inner.allocate_zeroed(size)?, size, None)
    }

    fn record(&mut self, ptr: NonNull<u8>, size: usize, tag: Option<String>) -> Result<NonNull<u8>> {
        // An address reused after release replaces its tombstone
        if let Some(TrackedBlock::Freed) = self.table.insert(key_of(ptr), TrackedBlock::Live { ptr, size, tag }) {
            self.freed -= 1;
        }
        Ok(ptr)
    }

    /// Turn the live entry for `ptr` into a tombstone, returning its size and tag
    fn retire(&mut self, ptr: NonNull<u8>) -> Result<(usize, Option<String>)> {
        let Some(entry) = self.table.get_mut(&key_of(ptr)) else {
            return Err(MemError::invalid_argument(format!("block {:p} is not tracked", ptr)));
        };
        match std::mem::replace(entry, TrackedBlock::Freed) {
            TrackedBlock::Live { size, tag, .. } => {
                self.freed += 1;
                Ok((size, tag))
            }
            TrackedBlock::Freed => {
                log::warn!("double release of {:p} ignored", ptr);
                Err(MemError::invalid_argument(format!("block {:p} already released", ptr)))
            }
        }
    }

    fn prune_if_needed(&mut self) {
        if self.freed > self.tombstone_limit {
            self.prune();
        }
    }

    /// Drop all tombstones, returning how many were removed
    pub fn prune(&mut self) -> usize {
        self.table.retain(|_, block| matches!(block, TrackedBlock::Live { .. }));
        let removed = std::mem::take(&mut self.freed);
        log::debug!("pruned {} allocation tombstones", removed);
        removed
    }

    /// Resize a tracked block to `new_size`, keeping its tag.
    ///
    /// The first `min(size, new_size)` bytes are preserved. As with
    /// [`AlignedAllocator::reallocate`] the input is consumed on every path
    /// once it is known to be live.
    pub fn reallocate(&mut self, ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>> {
        let (size, tag) = self.retire(ptr)?;
        let moved = unsafe { self.inner.reallocate(Some(ptr), size, new_size) };
        self.prune_if_needed();
        self.record(moved?, new_size, tag)
    }

    /// Grow a tracked block by `additional` zeroed bytes, keeping its tag.
    ///
    /// The input is consumed on every path once it is known to be live.
    pub fn extend_zeroed(&mut self, ptr: NonNull<u8>, additional: usize) -> Result<NonNull<u8>> {
        let (size, tag) = self.retire(ptr)?;
        let grown = unsafe { self.inner.extend_zeroed(Some(ptr), size, additional) };
        self.prune_if_needed();
        // The inner allocator rejects an overflowing total, so this sum fits
        self.record(grown?, size + additional, tag)
    }

    /// Release a tracked block and clear `handle`.
    ///
    /// A second release of the same block, or a pointer this allocator
    /// never returned, is reported as an error and leaves memory alone.
    pub fn release(&mut self, handle: &mut Option<NonNull<u8>>) -> Result<()> {
        let Some(ptr) = *handle else {
            return Ok(());
        };
        self.retire(ptr)?;
        unsafe { self.inner.release(handle) };
        self.prune_if_needed();
        Ok(())
    }

    /// Entry for `ptr`, if it was ever handed out
    pub fn lookup(&self, ptr: NonNull<u8>) -> Option<&TrackedBlock> {
        self.table.get(&key_of(ptr))
    }

    /// Number of live blocks
    pub fn live_count(&self) -> usize {
        self.table
            .values()
            .filter(|b| matches!(b, TrackedBlock::Live { .. }))
            .count()
    }

    /// Snapshot of live blocks and tombstones, logged at debug level
    pub fn report(&self) -> TrackingReport {
        let mut report = TrackingReport::default();
        for block in self.table.values() {
            match block {
                TrackedBlock::Live { ptr, size, tag } => {
                    log::debug!(
                        "live block {:p}: {} bytes, tag {}",
                        *ptr,
                        size,
                        tag.as_deref().unwrap_or("-")
                    );
                    report.live.push((ptr.as_ptr() as usize, *size, tag.clone()));
                }
                TrackedBlock::Freed => report.freed += 1,
            }
        }
        report.live.sort_unstable();
        log::debug!(
            "{}/{} tracked entries released manually",
            report.freed,
            self.table.len()
        );
        report
    }

    /// Number of tombstones currently held
    pub fn tombstones(&self) -> usize {
        self.freed
    }

    /// Release every live block and clear the table
    pub fn collect(&mut self) {
        self.freed = 0;
        for (_, block) in self.table.drain() {
            if let TrackedBlock::Live { ptr, .. } = block {
                unsafe { self.inner.release(&mut Some(ptr)) };
            }
        }
    }
}

impl Drop for TrackingAllocator {
    fn drop(&mut self) {
        if self.live_count() > 0 {
            self.report();
        }
        self.collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_release() {
        let mut tracker = TrackingAllocator::default();
        let a = tracker.allocate_tagged(32, "header").unwrap();
        let b = tracker.allocate(64).unwrap();
        assert_eq!(tracker.live_count(), 2);

        let mut handle = Some(a);
        tracker.release(&mut handle).unwrap();
        assert!(handle.is_none());
        assert_eq!(tracker.live_count(), 1);

        let report = tracker.report();
        assert_eq!(report.live, vec![(b.as_ptr() as usize, 64, None)]);
        assert_eq!(report.live_bytes(), 64);
    }

    #[test]
    fn test_double_release_detected() {
        let mut tracker = TrackingAllocator::default();
        let a = tracker.allocate(16).unwrap();
        tracker.release(&mut Some(a)).unwrap();

        let mut again = Some(a);
        let err = tracker.release(&mut again).unwrap_err();
        assert_eq!(err.category(), "argument");
        assert!(again.is_some());
    }

    #[test]
    fn test_untracked_pointer_rejected() {
        let mut tracker = TrackingAllocator::default();
        let mut local = 0u8;
        let mut handle = NonNull::new(&mut local as *mut u8);
        assert!(tracker.release(&mut handle).is_err());
        assert!(tracker.release(&mut None).is_ok());
    }

    #[test]
    fn test_lookup_and_collect() {
        let mut tracker = TrackingAllocator::new(AlignedAllocator::new(64).unwrap());
        let a = tracker.allocate_zeroed(10).unwrap();
        match tracker.lookup(a) {
            Some(TrackedBlock::Live { size, .. }) => assert_eq!(*size, 10),
            other => panic!("unexpected entry {:?}", other),
        }
        tracker.collect();
        assert_eq!(tracker.live_count(), 0);
        assert!(tracker.lookup(a).is_none());
    }

    #[test]
    fn test_tombstones_are_bounded() {
        let mut tracker = TrackingAllocator::with_tombstone_limit(AlignedAllocator::default(), 8);
        let keep = tracker.allocate(8).unwrap();
        for _ in 0..100 {
            let block = tracker.allocate(24).unwrap();
            tracker.release(&mut Some(block)).unwrap();
            assert!(tracker.tombstones() <= 8);
        }
        assert_eq!(tracker.live_count(), 1);
        assert!(tracker.report().freed <= 8);

        let pruned = tracker.prune();
        assert!(pruned <= 8);
        assert_eq!(tracker.tombstones(), 0);
        assert!(tracker.lookup(keep).is_some());
    }

    #[test]
    fn test_reallocate_keeps_tag_and_data() {
        let mut tracker = TrackingAllocator::default();
        let a = tracker.allocate_tagged(4, "frame").unwrap();
        unsafe { std::ptr::copy_nonoverlapping(b"abcd".as_ptr(), a.as_ptr(), 4) };

        let b = tracker.reallocate(a, 64).unwrap();
        let head = unsafe { std::slice::from_raw_parts(b.as_ptr(), 4) };
        assert_eq!(head, b"abcd");
        match tracker.lookup(b) {
            Some(TrackedBlock::Live { size, tag, .. }) => {
                assert_eq!(*size, 64);
                assert_eq!(tag.as_deref(), Some("frame"));
            }
            other => panic!("unexpected entry {:?}", other),
        }
        assert_eq!(tracker.live_count(), 1);

        // The old address is gone
        assert!(tracker.reallocate(a, 8).is_err());

        let c = tracker.extend_zeroed(b, 16).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(c.as_ptr(), 80) };
        assert_eq!(&bytes[..4], b"abcd");
        assert!(bytes[64..].iter().all(|&x| x == 0));
        assert_eq!(tracker.report().live_bytes(), 80);
    }

    #[test]
    fn test_failed_extend_consumes_entry() {
        let mut tracker = TrackingAllocator::default();
        let a = tracker.allocate(16).unwrap();
        let err = tracker.extend_zeroed(a, usize::MAX).unwrap_err();
        assert_eq!(err.category(), "overflow");
        assert_eq!(tracker.live_count(), 0);
        assert_eq!(tracker.lookup(a), Some(&TrackedBlock::Freed));
    }
}
