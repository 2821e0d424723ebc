//! Arena allocator: a chain of bump pools released as a whole.
//!
//! [`ArenaChain`] owns a singly linked list of pools. Requests are served
//! from the last pool; a request that does not fit appends a new pool of
//! at least twice the request and is served there. Individual allocations
//! are never freed. The chain is torn down on drop or by an explicit
//! [`ArenaChain::teardown`], which may be called any number of times.
//!
//! A per-thread chain backs [`arena_alloc`] for callers that want
//! process-lifetime scratch memory without carrying a context around.

use super::align::align_up;
use super::alloc::AlignedAllocator;
use crate::config::MemoryConfig;
use crate::error::{MemError, Result};
use std::cell::RefCell;
use std::ptr::NonNull;

/// Default minimum pool capacity in bytes
pub const DEFAULT_ARENA_SIZE: usize = std::mem::size_of::<usize>() * 2049;

struct ArenaPool {
    pool: NonNull<u8>,
    size: usize,
    offset: usize,
    allocator: AlignedAllocator,
    next: Option<Box<ArenaPool>>,
}

impl ArenaPool {
    fn create(allocator: AlignedAllocator, request: usize, min_size: usize) -> Result<Self> {
        let size = request.saturating_mul(2).max(min_size);
        let pool = allocator.allocate(size)?;
        log::debug!("arena pool created: {} bytes at {:p}", size, pool);
        Ok(Self {
            pool,
            size,
            offset: 0,
            allocator,
            next: None,
        })
    }

    /// Carve `size` bytes at the next aligned offset, if they fit
    fn bump(&mut self, size: usize) -> Option<NonNull<u8>> {
        let start = align_up(self.offset, self.allocator.alignment())?;
        let end = start.checked_add(size)?;
        if end > self.size {
            return None;
        }
        self.offset = end;
        // SAFETY: start < end <= size, inside the pool
        Some(unsafe { NonNull::new_unchecked(self.pool.as_ptr().add(start)) })
    }
}

impl Drop for ArenaPool {
    fn drop(&mut self) {
        let mut handle = Some(self.pool);
        unsafe { self.allocator.release(&mut handle) };
    }
}

/// Usage statistics for an arena chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Number of pools in the chain
    pub pools: usize,
    /// Total pool capacity in bytes
    pub capacity: usize,
    /// Bytes consumed, including alignment padding
    pub used: usize,
}

impl ArenaStats {
    /// Fraction of capacity consumed
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.used as f64 / self.capacity as f64
        }
    }
}

/// A chain of bump pools released as a unit
pub struct ArenaChain {
    root: Option<Box<ArenaPool>>,
    allocator: AlignedAllocator,
    min_pool_size: usize,
}

impl ArenaChain {
    /// Create an empty chain with default alignment and pool size
    pub fn new() -> Self {
        Self::with_allocator(AlignedAllocator::default(), DEFAULT_ARENA_SIZE)
    }

    /// Create an empty chain drawing pools from `allocator`.
    ///
    /// A `min_pool_size` of zero falls back to [`DEFAULT_ARENA_SIZE`].
    pub fn with_allocator(allocator: AlignedAllocator, min_pool_size: usize) -> Self {
        let min_pool_size = if min_pool_size == 0 {
            DEFAULT_ARENA_SIZE
        } else {
            min_pool_size
        };
        Self {
            root: None,
            allocator,
            min_pool_size,
        }
    }

    /// Create an empty chain from a memory configuration
    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        let allocator = AlignedAllocator::from_config(config)?;
        Ok(Self::with_allocator(allocator, config.arena_pool_size))
    }

    /// Alignment of every allocation
    pub fn alignment(&self) -> usize {
        self.allocator.alignment()
    }

    /// Allocate `size` bytes valid until the chain is torn down.
    ///
    /// Zero-sized requests are rejected. Fails only when a new pool is
    /// needed and the allocator cannot provide it.
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(MemError::invalid_argument("arena allocation of zero bytes"));
        }
        let allocator = self.allocator;
        let min_pool_size = self.min_pool_size;

        let tail = match self.root {
            Some(ref mut root) => Self::tail(root),
            None => self
                .root
                .insert(Box::new(ArenaPool::create(allocator, size, min_pool_size)?)),
        };
        if let Some(ptr) = tail.bump(size) {
            return Ok(ptr);
        }

        let next = tail
            .next
            .insert(Box::new(ArenaPool::create(allocator, size, min_pool_size)?));
        next.bump(size).ok_or_else(|| MemError::out_of_memory(size))
    }

    /// Allocate `size` zeroed bytes
    pub fn alloc_zeroed(&mut self, size: usize) -> Result<NonNull<u8>> {
        let ptr = self.alloc(size)?;
        unsafe { super::engine::mem_zero(ptr.as_ptr(), size) };
        Ok(ptr)
    }

    fn tail(mut pool: &mut Box<ArenaPool>) -> &mut Box<ArenaPool> {
        while let Some(ref mut next) = pool.next {
            pool = next;
        }
        pool
    }

    /// Pool count, capacity and consumption across the chain
    pub fn stats(&self) -> ArenaStats {
        let mut stats = ArenaStats::default();
        let mut cur = self.root.as_deref();
        while let Some(pool) = cur {
            stats.pools += 1;
            stats.capacity += pool.size;
            stats.used += pool.offset;
            cur = pool.next.as_deref();
        }
        stats
    }

    /// Whether any pool has been created
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Release every pool. Pointers handed out become dangling.
    ///
    /// Calling this on an empty or already torn-down chain does nothing.
    pub fn teardown(&mut self) {
        let mut next = self.root.take();
        let mut released = 0usize;
        // Unlink iteratively so long chains do not recurse in Drop
        while let Some(mut pool) = next {
            next = pool.next.take();
            released += 1;
        }
        if released > 0 {
            log::debug!("arena chain torn down: {} pools released", released);
        }
    }
}

impl Default for ArenaChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArenaChain {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ArenaChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaChain")
            .field("alignment", &self.allocator.alignment())
            .field("min_pool_size", &self.min_pool_size)
            .field("stats", &self.stats())
            .finish()
    }
}

thread_local! {
    static THREAD_ARENA: RefCell<ArenaChain> = RefCell::new(ArenaChain::new());
}

/// Allocate from this thread's arena chain.
///
/// The memory stays valid until [`arena_teardown`] runs or the thread
/// exits.
pub fn arena_alloc(size: usize) -> Result<NonNull<u8>> {
    THREAD_ARENA.with(|arena| arena.borrow_mut().alloc(size))
}

/// Statistics for this thread's arena chain
pub fn arena_stats() -> ArenaStats {
    THREAD_ARENA.with(|arena| arena.borrow().stats())
}

/// Release this thread's arena chain. Idempotent.
///
/// # Safety
///
/// Every pointer obtained from [`arena_alloc`] on this thread becomes
/// dangling; the caller must ensure none is used afterwards.
pub unsafe fn arena_teardown() {
    THREAD_ARENA.with(|arena| arena.borrow_mut().teardown());
}
