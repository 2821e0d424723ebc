//! Aligned allocator with a hidden back-pointer header.
//!
//! Every block starts at a multiple of the allocator's alignment. The two
//! machine words immediately below the returned address hold the base
//! pointer obtained from the system allocator (at `[-1]`) and the total
//! size of that system allocation (at `[-2]`), which is all
//! [`AlignedAllocator::release`] needs to hand the block back.
//!
//! ```text
//!   base                      user (aligned)
//!   |<-- padding -->|size|base|<------ usable, rounded up ------>|
//! ```
//!
//! Usable sizes are rounded up to a multiple of the alignment, so any
//! aligned word that overlaps a block lies entirely inside it.

use super::align::align_up;
use super::engine::get_global_engine;
use crate::config::MemoryConfig;
use crate::error::{MemError, Result};
use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};

/// Default block alignment: one 128-bit word
pub const DEFAULT_ALIGNMENT: usize = mem::size_of::<u128>();

/// Bytes reserved below each block for the base pointer and total size
const HEADER_SIZE: usize = 2 * mem::size_of::<usize>();

/// Alignment of the underlying system allocation
const SYSTEM_ALIGN: usize = mem::align_of::<usize>();

/// Allocator returning blocks aligned to a fixed power of two.
///
/// The type is `Copy`; every copy manages the same kind of block and any
/// of them may release a block allocated by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedAllocator {
    alignment: usize,
}

impl AlignedAllocator {
    /// Create an allocator for `alignment`.
    ///
    /// Alignments below the pointer width are raised to the pointer width.
    pub fn new(alignment: usize) -> Result<Self> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(MemError::invalid_argument(format!(
                "alignment {} is not a power of two",
                alignment
            )));
        }
        Ok(Self {
            alignment: alignment.max(mem::size_of::<*const u8>()),
        })
    }

    /// Create an allocator from a validated memory configuration
    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        Self::new(config.alignment)
    }

    /// Alignment of every returned block
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// System layout and usable size for a `size` byte request
    fn layout_for(&self, size: usize) -> Result<(Layout, usize)> {
        let overflow = || MemError::capacity_overflow(format!("aligned allocation of {} bytes", size));
        let usable = align_up(size.max(1), self.alignment).ok_or_else(overflow)?;
        let total = usable
            .checked_add(self.alignment - 1)
            .and_then(|t| t.checked_add(HEADER_SIZE))
            .ok_or_else(overflow)?;
        let layout = Layout::from_size_align(total, SYSTEM_ALIGN).map_err(|_| overflow())?;
        Ok((layout, usable))
    }

    fn allocate_impl(&self, size: usize, zeroed: bool) -> Result<NonNull<u8>> {
        let (layout, _) = self.layout_for(size)?;
        let base = unsafe {
            if zeroed {
                alloc::alloc_zeroed(layout)
            } else {
                alloc::alloc(layout)
            }
        };
        if base.is_null() {
            log::debug!("system allocator refused {} bytes", layout.size());
            return Err(MemError::out_of_memory(size));
        }

        let addr = base as usize;
        // Cannot wrap: the system block itself spans these bytes
        let aligned = (addr + HEADER_SIZE + self.alignment - 1) & !(self.alignment - 1);
        unsafe {
            let user = base.add(aligned - addr);
            let header = user as *mut usize;
            (header.sub(1) as *mut *mut u8).write(base);
            header.sub(2).write(layout.size());
            Ok(NonNull::new_unchecked(user))
        }
    }

    /// Allocate at least `size` bytes aligned to [`Self::alignment`]
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        self.allocate_impl(size, false)
    }

    /// Allocate at least `size` zeroed bytes
    pub fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>> {
        self.allocate_impl(size, true)
    }

    /// Release the block held by `handle` and reset the handle to `None`.
    ///
    /// An empty handle is a no-op.
    ///
    /// # Safety
    ///
    /// A present pointer must come from an `AlignedAllocator` and must not
    /// have been released already.
    pub unsafe fn release(&self, handle: &mut Option<NonNull<u8>>) {
        let Some(user) = handle.take() else {
            return;
        };
        unsafe {
            let header = user.as_ptr() as *const usize;
            let base = (header.sub(1) as *const *mut u8).read();
            let total = header.sub(2).read();
            alloc::dealloc(base, Layout::from_size_align_unchecked(total, SYSTEM_ALIGN));
        }
    }

    /// Usable bytes of a block, at least the size that was requested.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live block from an `AlignedAllocator`.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        unsafe {
            let header = ptr.as_ptr() as *const usize;
            let base = (header.sub(1) as *const *mut u8).read();
            let total = header.sub(2).read();
            base as usize + total - ptr.as_ptr() as usize
        }
    }

    /// Move a block into a fresh `new_size` byte block, copying
    /// `min(copy_len, new_size)` bytes and releasing the old block.
    /// On failure the old block is left untouched.
    unsafe fn try_replace(
        &self,
        ptr: Option<NonNull<u8>>,
        copy_len: usize,
        new_size: usize,
        zeroed: bool,
    ) -> Result<NonNull<u8>> {
        let block = self.allocate_impl(new_size, zeroed)?;
        if let Some(src) = ptr {
            let len = copy_len.min(new_size);
            unsafe {
                get_global_engine().copy_raw(block.as_ptr(), src.as_ptr(), len);
                self.release(&mut Some(src));
            }
        }
        Ok(block)
    }

    /// Like [`Self::try_replace`], but the input is released on failure too
    unsafe fn replace_consuming(
        &self,
        ptr: Option<NonNull<u8>>,
        copy_len: usize,
        new_size: usize,
        zeroed: bool,
    ) -> Result<NonNull<u8>> {
        let result = unsafe { self.try_replace(ptr, copy_len, new_size, zeroed) };
        if result.is_err() {
            let mut old = ptr;
            unsafe { self.release(&mut old) };
        }
        result
    }

    /// Resize a block into a zeroed `new_len` byte block, keeping the first
    /// `min(old_len, new_len)` bytes.
    ///
    /// Unlike [`Self::extend`] the input survives a failed call, which is
    /// what growable containers need to keep their contents on exhaustion.
    ///
    /// # Safety
    ///
    /// A present `ptr` must be a live block from an `AlignedAllocator`
    /// with at least `min(old_len, new_len)` readable bytes. On success
    /// `ptr` has been released.
    pub unsafe fn grow_zeroed(&self, ptr: Option<NonNull<u8>>, old_len: usize, new_len: usize) -> Result<NonNull<u8>> {
        unsafe { self.try_replace(ptr, old_len, new_len, true) }
    }

    /// Grow a block by `additional` bytes.
    ///
    /// Allocates `old_len + additional` bytes, copies `old_len` bytes from
    /// `ptr` and releases `ptr`. The input is consumed on every path,
    /// including overflow and allocation failure.
    ///
    /// # Safety
    ///
    /// A present `ptr` must be a live block from an `AlignedAllocator`
    /// with at least `old_len` readable bytes.
    pub unsafe fn extend(&self, ptr: Option<NonNull<u8>>, old_len: usize, additional: usize) -> Result<NonNull<u8>> {
        unsafe { self.extend_impl(ptr, old_len, additional, false) }
    }

    /// [`Self::extend`] with the added tail zeroed
    ///
    /// # Safety
    ///
    /// See [`Self::extend`].
    pub unsafe fn extend_zeroed(
        &self,
        ptr: Option<NonNull<u8>>,
        old_len: usize,
        additional: usize,
    ) -> Result<NonNull<u8>> {
        unsafe { self.extend_impl(ptr, old_len, additional, true) }
    }

    unsafe fn extend_impl(
        &self,
        ptr: Option<NonNull<u8>>,
        old_len: usize,
        additional: usize,
        zeroed: bool,
    ) -> Result<NonNull<u8>> {
        let Some(new_size) = old_len.checked_add(additional) else {
            let mut old = ptr;
            unsafe { self.release(&mut old) };
            return Err(MemError::capacity_overflow(format!(
                "extend {} by {} bytes",
                old_len, additional
            )));
        };
        unsafe { self.replace_consuming(ptr, old_len, new_size, zeroed) }
    }

    /// Move a block into a fresh `new_size` byte block.
    ///
    /// Copies `min(copy_len, new_size)` bytes. `new_size == 0` releases the
    /// input and reports an invalid argument; the input is consumed on
    /// every path.
    ///
    /// # Safety
    ///
    /// A present `ptr` must be a live block from an `AlignedAllocator`
    /// with at least `min(copy_len, new_size)` readable bytes.
    pub unsafe fn reallocate(&self, ptr: Option<NonNull<u8>>, copy_len: usize, new_size: usize) -> Result<NonNull<u8>> {
        unsafe { self.reallocate_impl(ptr, copy_len, new_size, false) }
    }

    /// [`Self::reallocate`] into a zeroed block
    ///
    /// # Safety
    ///
    /// See [`Self::reallocate`].
    pub unsafe fn reallocate_zeroed(
        &self,
        ptr: Option<NonNull<u8>>,
        copy_len: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        unsafe { self.reallocate_impl(ptr, copy_len, new_size, true) }
    }

    unsafe fn reallocate_impl(
        &self,
        ptr: Option<NonNull<u8>>,
        copy_len: usize,
        new_size: usize,
        zeroed: bool,
    ) -> Result<NonNull<u8>> {
        if new_size == 0 {
            let mut old = ptr;
            unsafe { self.release(&mut old) };
            return Err(MemError::invalid_argument("reallocation to zero bytes"));
        }
        unsafe { self.replace_consuming(ptr, copy_len, new_size, zeroed) }
    }

    /// Allocate a block holding a copy of `src`
    pub fn clone_bytes(&self, src: &[u8]) -> Result<NonNull<u8>> {
        let block = self.allocate(src.len())?;
        unsafe { get_global_engine().copy_raw(block.as_ptr(), src.as_ptr(), src.len()) };
        Ok(block)
    }
}

impl Default for AlignedAllocator {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

/// Allocate `size` bytes with the default alignment, null on failure
pub fn aligned_alloc(size: usize) -> *mut u8 {
    AlignedAllocator::default()
        .allocate(size)
        .map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// Release a block from [`aligned_alloc`] and null the caller's pointer.
///
/// # Safety
///
/// `*handle` must be null or a live block from an `AlignedAllocator`.
pub unsafe fn aligned_free(handle: &mut *mut u8) {
    let mut block = NonNull::new(*handle);
    unsafe { AlignedAllocator::default().release(&mut block) };
    *handle = ptr::null_mut();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_validation() {
        assert!(AlignedAllocator::new(0).is_err());
        assert!(AlignedAllocator::new(24).is_err());
        assert_eq!(AlignedAllocator::new(1).unwrap().alignment(), mem::size_of::<usize>());
        assert_eq!(AlignedAllocator::new(128).unwrap().alignment(), 128);
        assert_eq!(AlignedAllocator::default().alignment(), 16);
    }

    #[test]
    fn test_allocate_release_round_trip() {
        for align in [8usize, 16, 64, 128, 4096] {
            let allocator = AlignedAllocator::new(align).unwrap();
            for size in [0usize, 1, 7, 16, 100, 4097] {
                let block = allocator.allocate(size).unwrap();
                assert_eq!(block.as_ptr() as usize % align, 0);
                let usable = unsafe { allocator.usable_size(block) };
                assert!(usable >= size);
                unsafe { std::ptr::write_bytes(block.as_ptr(), 0xAB, usable) };

                let mut handle = Some(block);
                unsafe { allocator.release(&mut handle) };
                assert!(handle.is_none());
                // Releasing an empty handle is a no-op
                unsafe { allocator.release(&mut handle) };
            }
        }
    }

    #[test]
    fn test_allocate_overflow() {
        let allocator = AlignedAllocator::default();
        let err = allocator.allocate(usize::MAX - 4).unwrap_err();
        assert_eq!(err.category(), "overflow");
    }

    #[test]
    fn test_allocate_zeroed() {
        let allocator = AlignedAllocator::new(64).unwrap();
        let block = allocator.allocate_zeroed(300).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 300) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { allocator.release(&mut Some(block)) };
    }

    #[test]
    fn test_extend_preserves_prefix() {
        let allocator = AlignedAllocator::default();
        let block = allocator.clone_bytes(b"prefix").unwrap();
        let grown = unsafe { allocator.extend_zeroed(Some(block), 6, 10) }.unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 16) };
        assert_eq!(&bytes[..6], b"prefix");
        assert!(bytes[6..].iter().all(|&b| b == 0));
        unsafe { allocator.release(&mut Some(grown)) };
    }

    #[test]
    fn test_extend_from_none() {
        let allocator = AlignedAllocator::default();
        let block = unsafe { allocator.extend_zeroed(None, 0, 32) }.unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 32) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { allocator.release(&mut Some(block)) };
    }

    #[test]
    fn test_extend_overflow_consumes_input() {
        let allocator = AlignedAllocator::default();
        let block = allocator.allocate(8).unwrap();
        let err = unsafe { allocator.extend(Some(block), usize::MAX, 2) }.unwrap_err();
        assert_eq!(err.category(), "overflow");
    }

    #[test]
    fn test_reallocate_truncates_and_grows() {
        let allocator = AlignedAllocator::default();
        let block = allocator.clone_bytes(b"0123456789").unwrap();
        let small = unsafe { allocator.reallocate(Some(block), 10, 4) }.unwrap();
        assert_eq!(unsafe { std::slice::from_raw_parts(small.as_ptr(), 4) }, b"0123");

        let big = unsafe { allocator.reallocate_zeroed(Some(small), 4, 12) }.unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(big.as_ptr(), 12) };
        assert_eq!(&bytes[..4], b"0123");
        assert!(bytes[4..].iter().all(|&b| b == 0));

        let err = unsafe { allocator.reallocate(Some(big), 12, 0) }.unwrap_err();
        assert_eq!(err.category(), "argument");
    }

    #[test]
    fn test_grow_zeroed_keeps_input_on_failure() {
        let allocator = AlignedAllocator::default();
        let block = allocator.clone_bytes(b"keep").unwrap();
        assert!(unsafe { allocator.grow_zeroed(Some(block), 4, usize::MAX) }.is_err());
        // Still live and intact
        assert_eq!(unsafe { std::slice::from_raw_parts(block.as_ptr(), 4) }, b"keep");

        let grown = unsafe { allocator.grow_zeroed(Some(block), 4, 8) }.unwrap();
        assert_eq!(unsafe { std::slice::from_raw_parts(grown.as_ptr(), 8) }, b"keep\0\0\0\0");
        unsafe { allocator.release(&mut Some(grown)) };
    }

    #[test]
    fn test_c_style_helpers() {
        let mut p = aligned_alloc(40);
        assert!(!p.is_null());
        assert_eq!(p as usize % DEFAULT_ALIGNMENT, 0);
        unsafe { aligned_free(&mut p) };
        assert!(p.is_null());
        unsafe { aligned_free(&mut p) };
    }

    #[test]
    fn test_from_config() {
        let config = MemoryConfig::builder().alignment(128).build().unwrap();
        let allocator = AlignedAllocator::from_config(&config).unwrap();
        let block = allocator.allocate(1).unwrap();
        assert_eq!(block.as_ptr() as usize % 128, 0);
        unsafe { allocator.release(&mut Some(block)) };
    }
}
