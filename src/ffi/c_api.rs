//! Main C API interface
//!
//! Memory primitives, the aligned allocator and the thread arena with C
//! calling convention. Signatures follow the classic `mem*` shapes; the
//! engine behind them is the process-wide [`MemEngine`](crate::MemEngine).

use super::CResult;
use crate::memory::{self, AlignedAllocator};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::{self, NonNull};

#[inline]
fn out_ptr(result: crate::Result<NonNull<u8>>) -> *mut c_void {
    match result {
        Ok(block) => block.as_ptr() as *mut c_void,
        Err(e) => {
            log::debug!("ffi allocation failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// Initialize the library
///
/// # Safety
///
/// This function is safe to call multiple times.
#[no_mangle]
pub unsafe extern "C" fn lvmem_init() -> CResult {
    crate::init();
    CResult::Success
}

/// Library version as a static C string
#[no_mangle]
pub extern "C" fn lvmem_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// 1 when the engine runs SIMD kernels, 0 otherwise
#[no_mangle]
pub extern "C" fn lvmem_has_simd() -> c_int {
    c_int::from(crate::has_simd_support())
}

/// Copy `n` bytes between non-overlapping regions
///
/// # Safety
///
/// See [`MemEngine::copy_raw`](crate::MemEngine::copy_raw).
#[no_mangle]
pub unsafe extern "C" fn lvmem_memcpy(dst: *mut c_void, src: *const c_void, n: usize) -> *mut c_void {
    unsafe { memory::mem_copy(dst as *mut u8, src as *const u8, n) as *mut c_void }
}

/// Copy `n` bytes between possibly overlapping regions
///
/// # Safety
///
/// See [`MemEngine::move_raw`](crate::MemEngine::move_raw).
#[no_mangle]
pub unsafe extern "C" fn lvmem_memmove(dst: *mut c_void, src: *const c_void, n: usize) -> *mut c_void {
    unsafe { memory::mem_move(dst as *mut u8, src as *const u8, n) as *mut c_void }
}

/// Compare `n` bytes
///
/// # Safety
///
/// See [`MemEngine::compare_raw`](crate::MemEngine::compare_raw).
#[no_mangle]
pub unsafe extern "C" fn lvmem_memcmp(a: *const c_void, b: *const c_void, n: usize) -> c_int {
    unsafe { memory::mem_compare(a as *const u8, b as *const u8, n) }
}

/// Fill `n` bytes with the low byte of `c`
///
/// # Safety
///
/// See [`MemEngine::set_raw`](crate::MemEngine::set_raw).
#[no_mangle]
pub unsafe extern "C" fn lvmem_memset(dst: *mut c_void, c: c_int, n: usize) -> *mut c_void {
    unsafe { memory::mem_set(dst as *mut u8, c as u8, n) as *mut c_void }
}

/// Zero `n` bytes
///
/// # Safety
///
/// See [`MemEngine::set_raw`](crate::MemEngine::set_raw).
#[no_mangle]
pub unsafe extern "C" fn lvmem_bzero(dst: *mut c_void, n: usize) {
    unsafe { memory::mem_zero(dst as *mut u8, n) }
}

/// First occurrence of the low byte of `c` within `n` bytes, or null
///
/// # Safety
///
/// See [`MemEngine::find_byte_raw`](crate::MemEngine::find_byte_raw).
#[no_mangle]
pub unsafe extern "C" fn lvmem_memchr(ptr: *const c_void, c: c_int, n: usize) -> *mut c_void {
    unsafe { memory::mem_find_byte(ptr as *const u8, c as u8, n) as *mut c_void }
}

/// First occurrence of the low byte of `c`, with no length bound
///
/// # Safety
///
/// The byte must be present. See
/// [`MemEngine::find_byte_unchecked`](crate::MemEngine::find_byte_unchecked).
#[no_mangle]
pub unsafe extern "C" fn lvmem_memchr_unchecked(ptr: *const c_void, c: c_int) -> *mut c_void {
    unsafe { memory::mem_find_byte_unchecked(ptr as *const u8, c as u8) as *mut c_void }
}

/// Exchange `n` bytes between two regions. Returns 1 on success.
///
/// # Safety
///
/// See [`MemEngine::swap_raw`](crate::MemEngine::swap_raw).
#[no_mangle]
pub unsafe extern "C" fn lvmem_memswap(a: *mut c_void, b: *mut c_void, n: usize) -> c_int {
    c_int::from(unsafe { memory::mem_swap(a as *mut u8, b as *mut u8, n) })
}

/// Copy `n` bytes out of `src` and zero the source
///
/// # Safety
///
/// See [`MemEngine::take_raw`](crate::MemEngine::take_raw).
#[no_mangle]
pub unsafe extern "C" fn lvmem_memtake(dst: *mut c_void, src: *mut c_void, n: usize) -> *mut c_void {
    unsafe { memory::mem_take(dst as *mut u8, src as *mut u8, n) as *mut c_void }
}

/// Length of a null-terminated string
///
/// # Safety
///
/// `s` must be null-terminated.
#[no_mangle]
pub unsafe extern "C" fn lvmem_strlen(s: *const c_char) -> usize {
    if s.is_null() {
        return 0;
    }
    unsafe { crate::string::strlen(s as *const u8) }
}

/// Allocate `size` bytes aligned to the default alignment, null on failure
#[no_mangle]
pub extern "C" fn lvmem_alloc(size: usize) -> *mut c_void {
    memory::aligned_alloc(size) as *mut c_void
}

/// Allocate `size` zeroed bytes, null on failure
#[no_mangle]
pub extern "C" fn lvmem_calloc(size: usize) -> *mut c_void {
    out_ptr(AlignedAllocator::default().allocate_zeroed(size))
}

/// Release the block at `*handle` and null the handle
///
/// # Safety
///
/// `handle` must be null or point to a pointer that is null or a live
/// block from this library's allocator.
#[no_mangle]
pub unsafe extern "C" fn lvmem_free(handle: *mut *mut c_void) {
    if handle.is_null() {
        return;
    }
    unsafe { memory::aligned_free(&mut *(handle as *mut *mut u8)) }
}

/// Grow a block by `additional` bytes. The input is released on every path.
///
/// # Safety
///
/// See [`AlignedAllocator::extend`].
#[no_mangle]
pub unsafe extern "C" fn lvmem_extend(ptr: *mut c_void, old_len: usize, additional: usize) -> *mut c_void {
    out_ptr(unsafe { AlignedAllocator::default().extend(NonNull::new(ptr as *mut u8), old_len, additional) })
}

/// [`lvmem_extend`] with the added tail zeroed
///
/// # Safety
///
/// See [`AlignedAllocator::extend_zeroed`].
#[no_mangle]
pub unsafe extern "C" fn lvmem_extend_zero(ptr: *mut c_void, old_len: usize, additional: usize) -> *mut c_void {
    out_ptr(unsafe { AlignedAllocator::default().extend_zeroed(NonNull::new(ptr as *mut u8), old_len, additional) })
}

/// Move a block into a new `new_size` byte block, copying `copy_len` bytes.
/// The input is released on every path.
///
/// # Safety
///
/// See [`AlignedAllocator::reallocate`].
#[no_mangle]
pub unsafe extern "C" fn lvmem_realloc(ptr: *mut c_void, copy_len: usize, new_size: usize) -> *mut c_void {
    out_ptr(unsafe { AlignedAllocator::default().reallocate(NonNull::new(ptr as *mut u8), copy_len, new_size) })
}

/// [`lvmem_realloc`] into a zeroed block
///
/// # Safety
///
/// See [`AlignedAllocator::reallocate_zeroed`].
#[no_mangle]
pub unsafe extern "C" fn lvmem_recalloc(ptr: *mut c_void, copy_len: usize, new_size: usize) -> *mut c_void {
    out_ptr(unsafe {
        AlignedAllocator::default().reallocate_zeroed(NonNull::new(ptr as *mut u8), copy_len, new_size)
    })
}

/// New block holding a copy of `size` bytes at `src`
///
/// # Safety
///
/// `src` must be readable for `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn lvmem_memclone(src: *const c_void, size: usize) -> *mut c_void {
    if src.is_null() {
        return ptr::null_mut();
    }
    let bytes = unsafe { std::slice::from_raw_parts(src as *const u8, size) };
    out_ptr(AlignedAllocator::default().clone_bytes(bytes))
}

/// Scratch memory from the calling thread's arena, null on failure
#[no_mangle]
pub extern "C" fn lvmem_arena_alloc(size: usize) -> *mut c_void {
    out_ptr(memory::arena_alloc(size))
}

/// Release the calling thread's arena
///
/// # Safety
///
/// Every pointer from [`lvmem_arena_alloc`] on this thread becomes dangling.
#[no_mangle]
pub unsafe extern "C" fn lvmem_arena_teardown() {
    unsafe { memory::arena_teardown() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_round_trip() {
        let src = b"c api copy";
        let mut dst = [0u8; 10];
        unsafe {
            let out = lvmem_memcpy(dst.as_mut_ptr() as *mut c_void, src.as_ptr() as *const c_void, 10);
            assert_eq!(out, dst.as_mut_ptr() as *mut c_void);
            assert_eq!(lvmem_memcmp(dst.as_ptr() as *const c_void, src.as_ptr() as *const c_void, 10), 0);
            let hit = lvmem_memchr(dst.as_ptr() as *const c_void, b'y' as c_int, 10);
            assert_eq!(hit as usize - dst.as_ptr() as usize, 9);
            assert!(lvmem_memcpy(ptr::null_mut(), src.as_ptr() as *const c_void, 1).is_null());
        }
    }

    #[test]
    fn test_alloc_free_cycle() {
        unsafe {
            let mut block = lvmem_alloc(40);
            assert!(!block.is_null());
            assert_eq!(block as usize % memory::DEFAULT_ALIGNMENT, 0);
            lvmem_memset(block, 0x5A, 40);

            block = lvmem_extend_zero(block, 40, 24);
            let bytes = std::slice::from_raw_parts(block as *const u8, 64);
            assert!(bytes[..40].iter().all(|&b| b == 0x5A));
            assert!(bytes[40..].iter().all(|&b| b == 0));

            lvmem_free(&mut block);
            assert!(block.is_null());
            lvmem_free(&mut block);
            lvmem_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_version_and_strlen() {
        let v = unsafe { std::ffi::CStr::from_ptr(lvmem_version()) };
        assert_eq!(v.to_str().unwrap(), crate::VERSION);

        let padded = *b"seven\0\0\0\0\0\0\0\0\0\0\0";
        assert_eq!(unsafe { lvmem_strlen(padded.as_ptr() as *const c_char) }, 5);
        assert_eq!(unsafe { lvmem_strlen(ptr::null()) }, 0);
    }
}
