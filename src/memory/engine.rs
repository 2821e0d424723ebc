//! # Word-Width Memory Engine
//!
//! Copy, move, compare, set and byte search over raw memory. Each operation
//! probes the alignment of its operands and runs the widest word loop the
//! alignment allows (see [`kernels`](super::kernels)), with SSE2 or AVX2
//! registers standing in for the 128-bit chunks when the CPU has them.
//!
//! ## Layers
//! - **Raw API** (`*_raw`, `mem_*`): C-shaped pointer functions that signal
//!   invalid arguments with null or sentinel returns instead of panicking.
//! - **Safe API**: slice methods on [`MemEngine`] returning [`Result`].
//! - **Convenience functions** (`fast_*`): the safe API on a process-wide
//!   engine selected once from the detected CPU features.

use super::kernels;
use crate::config::MemoryConfig;
use crate::error::{check_range, MemError, Result};
use crate::system::cpu_features::{get_cpu_features, CpuFeatures};
use std::cmp::Ordering;
use std::ptr;
use std::sync::OnceLock;

/// Stack buffer size used when swapping two regions
const SWAP_CHUNK: usize = 512;

/// Register tier used for 128-bit chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdTier {
    /// AVX2 implementation (32-byte registers)
    Avx2,
    /// SSE2 implementation (16-byte registers)
    Sse2,
    /// Plain `u128` loads and stores
    Scalar,
}

impl SimdTier {
    /// Whether `tier` can run on a CPU with `features`
    pub fn supported(tier: SimdTier, features: &CpuFeatures) -> bool {
        match tier {
            SimdTier::Avx2 => features.has_avx2,
            SimdTier::Sse2 => features.has_sse2,
            SimdTier::Scalar => true,
        }
    }

    /// Best tier for `features`
    pub fn best_for(features: &CpuFeatures) -> SimdTier {
        if features.has_avx2 {
            SimdTier::Avx2
        } else if features.has_sse2 {
            SimdTier::Sse2
        } else {
            SimdTier::Scalar
        }
    }
}

/// Alignment-adaptive memory operations dispatcher
#[derive(Debug, Clone, Copy)]
pub struct MemEngine {
    /// Selected register tier for 128-bit chunks
    tier: SimdTier,
    /// CPU features available at runtime
    cpu_features: &'static CpuFeatures,
}

impl MemEngine {
    /// Create an engine using the best tier the CPU supports
    pub fn new() -> Self {
        let cpu_features = get_cpu_features();
        Self {
            tier: SimdTier::best_for(cpu_features),
            cpu_features,
        }
    }

    /// Create an engine with a requested tier.
    ///
    /// A tier the CPU cannot run is replaced by the best supported one
    /// below it, down to [`SimdTier::Scalar`].
    pub fn with_tier(tier: SimdTier) -> Self {
        let cpu_features = get_cpu_features();
        let tier = [tier, SimdTier::Sse2, SimdTier::Scalar]
            .into_iter()
            .find(|t| SimdTier::supported(*t, cpu_features) && *t as u8 >= tier as u8)
            .unwrap_or(SimdTier::Scalar);
        Self { tier, cpu_features }
    }

    /// Create an engine honoring [`MemoryConfig::enable_simd`]
    pub fn from_config(config: &MemoryConfig) -> Self {
        if config.enable_simd {
            Self::new()
        } else {
            Self::with_tier(SimdTier::Scalar)
        }
    }

    /// Get the currently selected SIMD tier
    pub fn tier(&self) -> SimdTier {
        self.tier
    }

    /// Get CPU features
    pub fn cpu_features(&self) -> &CpuFeatures {
        self.cpu_features
    }
}

impl Default for MemEngine {
    fn default() -> Self {
        Self::new()
    }
}

//==============================================================================
// RAW POINTER API
//==============================================================================

impl MemEngine {
    /// Copy `n` bytes from `src` to `dst`, low to high.
    ///
    /// Returns `dst`, or null when either pointer is null or `dst == src`
    /// while `n != 0`. `n == 0` is a no-op that returns `dst`.
    ///
    /// # Safety
    ///
    /// Non-null pointers must be valid for `n` bytes. The regions must not
    /// overlap; use [`MemEngine::move_raw`] for overlapping regions.
    pub unsafe fn copy_raw(&self, dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
        if n == 0 {
            return dst;
        }
        if dst.is_null() || src.is_null() || ptr::eq(dst, src) {
            return ptr::null_mut();
        }
        unsafe { kernels::copy_forward(dst, src, n, self.tier) };
        dst
    }

    /// Copy `n` bytes from `src` to `dst` where the regions may overlap.
    ///
    /// When `src` lies below `dst` and the source range reaches `dst`, the
    /// copy runs from the high end down; otherwise it runs forward. Null
    /// handling matches [`MemEngine::copy_raw`].
    ///
    /// # Safety
    ///
    /// Non-null pointers must be valid for `n` bytes.
    pub unsafe fn move_raw(&self, dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
        if n == 0 {
            return dst;
        }
        if dst.is_null() || src.is_null() || ptr::eq(dst, src) {
            return ptr::null_mut();
        }
        let (d, s) = (dst as usize, src as usize);
        if s < d && s.wrapping_add(n) >= d {
            unsafe { kernels::copy_backward(dst, src, n, self.tier) };
        } else {
            unsafe { kernels::copy_forward(dst, src, n, self.tier) };
        }
        dst
    }

    /// Compare `n` bytes lexicographically.
    ///
    /// Returns `a[i] - b[i]` for the first differing byte, or 0 when the
    /// ranges match, `n == 0`, or `a == b`. If exactly one pointer is null
    /// the result is -1 whichever side it is on.
    ///
    /// # Safety
    ///
    /// Non-null pointers must be valid for `n` bytes.
    pub unsafe fn compare_raw(&self, a: *const u8, b: *const u8, n: usize) -> i32 {
        if n == 0 || ptr::eq(a, b) {
            return 0;
        }
        if a.is_null() || b.is_null() {
            return -1;
        }
        unsafe { kernels::compare(a, b, n) }
    }

    /// Fill `n` bytes at `dst` with `byte`.
    ///
    /// Returns `dst`, or null when `dst` is null and `n != 0`.
    ///
    /// # Safety
    ///
    /// A non-null `dst` must be valid for `n` bytes.
    pub unsafe fn set_raw(&self, dst: *mut u8, byte: u8, n: usize) -> *mut u8 {
        if n == 0 {
            return dst;
        }
        if dst.is_null() {
            return ptr::null_mut();
        }
        unsafe { kernels::fill(dst, byte, n, self.tier) };
        dst
    }

    /// Pointer to the first `byte` within `n` bytes of `ptr`, or null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be valid for `n` bytes.
    pub unsafe fn find_byte_raw(&self, ptr: *const u8, byte: u8, n: usize) -> *const u8 {
        if ptr.is_null() || n == 0 {
            return ptr::null();
        }
        match unsafe { kernels::find(ptr, byte, n) } {
            Some(offset) => unsafe { ptr.add(offset) },
            None => ptr::null(),
        }
    }

    /// Pointer to the first `byte` at or after `ptr`, scanning without a
    /// length bound. Returns null only for a null `ptr`.
    ///
    /// # Safety
    ///
    /// `byte` must occur at or after `ptr` within the same allocation, and
    /// the 8-byte-aligned word containing that occurrence must be readable
    /// in full. Blocks from [`AlignedAllocator`](super::AlignedAllocator)
    /// satisfy the second condition. Violating the first reads out of
    /// bounds; nothing here checks it.
    pub unsafe fn find_byte_unchecked(&self, ptr: *const u8, byte: u8) -> *const u8 {
        if ptr.is_null() {
            return ptr::null();
        }
        unsafe { ptr.add(kernels::find_unbounded(ptr, byte)) }
    }

    /// Swap the contents of two non-overlapping `n` byte regions.
    ///
    /// Returns false without touching memory for null pointers or
    /// overlapping regions.
    ///
    /// # Safety
    ///
    /// Non-null pointers must be valid for `n` bytes.
    pub unsafe fn swap_raw(&self, a: *mut u8, b: *mut u8, n: usize) -> bool {
        if n == 0 {
            return true;
        }
        if a.is_null() || b.is_null() {
            return false;
        }
        let (pa, pb) = (a as usize, b as usize);
        if pa < pb.wrapping_add(n) && pb < pa.wrapping_add(n) {
            return false;
        }
        let mut tmp = [0u8; SWAP_CHUNK];
        let mut done = 0;
        while done < n {
            let len = (n - done).min(SWAP_CHUNK);
            unsafe {
                let (ca, cb) = (a.add(done), b.add(done));
                kernels::copy_forward(tmp.as_mut_ptr(), ca, len, self.tier);
                kernels::copy_forward(ca, cb, len, self.tier);
                kernels::copy_forward(cb, tmp.as_ptr(), len, self.tier);
            }
            done += len;
        }
        true
    }

    /// Copy `n` bytes into `dst`, then zero the source.
    ///
    /// Returns `dst`, or null under the conditions of
    /// [`MemEngine::copy_raw`].
    ///
    /// # Safety
    ///
    /// As for [`MemEngine::copy_raw`]; `src` must also be writable.
    pub unsafe fn take_raw(&self, dst: *mut u8, src: *mut u8, n: usize) -> *mut u8 {
        let out = unsafe { self.copy_raw(dst, src, n) };
        if !out.is_null() {
            unsafe { self.set_raw(src, 0, n) };
        }
        out
    }
}

//==============================================================================
// PUBLIC SAFE APIS
//==============================================================================

impl MemEngine {
    /// Copy `src` into `dst`; lengths must match
    pub fn copy(&self, src: &[u8], dst: &mut [u8]) -> Result<()> {
        if src.len() != dst.len() {
            return Err(MemError::invalid_argument(format!(
                "Source and destination lengths don't match: {} vs {}",
                src.len(),
                dst.len()
            )));
        }
        if src.is_empty() {
            return Ok(());
        }
        unsafe { kernels::copy_forward(dst.as_mut_ptr(), src.as_ptr(), src.len(), self.tier) };
        Ok(())
    }

    /// Move `len` bytes inside `buf` from offset `src` to offset `dst`.
    ///
    /// The ranges may overlap.
    pub fn move_within(&self, buf: &mut [u8], src: usize, dst: usize, len: usize) -> Result<()> {
        let src_end = src
            .checked_add(len)
            .ok_or_else(|| MemError::capacity_overflow("move source range"))?;
        let dst_end = dst
            .checked_add(len)
            .ok_or_else(|| MemError::capacity_overflow("move destination range"))?;
        check_range(src, src_end, buf.len())?;
        check_range(dst, dst_end, buf.len())?;
        if len == 0 || src == dst {
            return Ok(());
        }
        let base = buf.as_mut_ptr();
        unsafe { self.move_raw(base.add(dst), base.add(src), len) };
        Ok(())
    }

    /// Lexicographic comparison.
    ///
    /// Returns:
    /// - `0` if slices are equal
    /// - Negative value if `a` sorts first
    /// - Positive value if `b` sorts first
    ///
    /// A strict prefix sorts before the longer slice.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> i32 {
        let common = a.len().min(b.len());
        let result = unsafe { self.compare_raw(a.as_ptr(), b.as_ptr(), common) };
        if result != 0 {
            return result;
        }
        match a.len().cmp(&b.len()) {
            Ordering::Less => -1,
            Ordering::Greater => 1,
            Ordering::Equal => 0,
        }
    }

    /// Position of the first `needle` in `haystack`
    pub fn find_byte(&self, haystack: &[u8], needle: u8) -> Option<usize> {
        if haystack.is_empty() {
            return None;
        }
        unsafe { kernels::find(haystack.as_ptr(), needle, haystack.len()) }
    }

    /// Fill `slice` with `value`
    pub fn fill(&self, slice: &mut [u8], value: u8) {
        if slice.is_empty() {
            return;
        }
        unsafe { kernels::fill(slice.as_mut_ptr(), value, slice.len(), self.tier) };
    }

    /// Exchange the contents of two equally sized slices
    pub fn swap(&self, a: &mut [u8], b: &mut [u8]) -> Result<()> {
        if a.len() != b.len() {
            return Err(MemError::invalid_argument(format!(
                "Swap lengths don't match: {} vs {}",
                a.len(),
                b.len()
            )));
        }
        unsafe { self.swap_raw(a.as_mut_ptr(), b.as_mut_ptr(), a.len()) };
        Ok(())
    }

    /// Copy `src` into `dst`, then zero `src`
    pub fn take(&self, src: &mut [u8], dst: &mut [u8]) -> Result<()> {
        self.copy(src, dst)?;
        self.fill(src, 0);
        Ok(())
    }
}

//==============================================================================
// GLOBAL ENGINE AND CONVENIENCE FUNCTIONS
//==============================================================================

static GLOBAL_ENGINE: OnceLock<MemEngine> = OnceLock::new();

/// Get the global memory engine instance
pub fn get_global_engine() -> &'static MemEngine {
    GLOBAL_ENGINE.get_or_init(|| {
        let engine = MemEngine::new();
        log::debug!("memory engine initialized with tier {:?}", engine.tier());
        engine
    })
}

/// Install `engine` as the global engine.
///
/// Returns false when the global engine is already initialized.
pub fn set_global_engine(engine: MemEngine) -> bool {
    GLOBAL_ENGINE.set(engine).is_ok()
}

/// Convenience function for slice copy
pub fn fast_copy(src: &[u8], dst: &mut [u8]) -> Result<()> {
    get_global_engine().copy(src, dst)
}

/// Convenience function for an overlapping move inside one buffer
pub fn fast_move(buf: &mut [u8], src: usize, dst: usize, len: usize) -> Result<()> {
    get_global_engine().move_within(buf, src, dst, len)
}

/// Convenience function for comparison
pub fn fast_compare(a: &[u8], b: &[u8]) -> i32 {
    get_global_engine().compare(a, b)
}

/// Convenience function for byte search
pub fn fast_find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    get_global_engine().find_byte(haystack, needle)
}

/// Convenience function for fill
pub fn fast_fill(slice: &mut [u8], value: u8) {
    get_global_engine().fill(slice, value)
}

/// Convenience function for zeroing
pub fn fast_zero(slice: &mut [u8]) {
    get_global_engine().fill(slice, 0)
}

/// [`MemEngine::copy_raw`] on the global engine.
///
/// # Safety
///
/// See [`MemEngine::copy_raw`].
pub unsafe fn mem_copy(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    unsafe { get_global_engine().copy_raw(dst, src, n) }
}

/// [`MemEngine::move_raw`] on the global engine.
///
/// # Safety
///
/// See [`MemEngine::move_raw`].
pub unsafe fn mem_move(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    unsafe { get_global_engine().move_raw(dst, src, n) }
}

/// [`MemEngine::compare_raw`] on the global engine.
///
/// # Safety
///
/// See [`MemEngine::compare_raw`].
pub unsafe fn mem_compare(a: *const u8, b: *const u8, n: usize) -> i32 {
    unsafe { get_global_engine().compare_raw(a, b, n) }
}

/// [`MemEngine::set_raw`] on the global engine.
///
/// # Safety
///
/// See [`MemEngine::set_raw`].
pub unsafe fn mem_set(dst: *mut u8, byte: u8, n: usize) -> *mut u8 {
    unsafe { get_global_engine().set_raw(dst, byte, n) }
}

/// Zero `n` bytes at `dst`.
///
/// # Safety
///
/// See [`MemEngine::set_raw`].
pub unsafe fn mem_zero(dst: *mut u8, n: usize) {
    unsafe { get_global_engine().set_raw(dst, 0, n) };
}

/// [`MemEngine::find_byte_raw`] on the global engine.
///
/// # Safety
///
/// See [`MemEngine::find_byte_raw`].
pub unsafe fn mem_find_byte(ptr: *const u8, byte: u8, n: usize) -> *const u8 {
    unsafe { get_global_engine().find_byte_raw(ptr, byte, n) }
}

/// [`MemEngine::find_byte_unchecked`] on the global engine.
///
/// # Safety
///
/// See [`MemEngine::find_byte_unchecked`].
pub unsafe fn mem_find_byte_unchecked(ptr: *const u8, byte: u8) -> *const u8 {
    unsafe { get_global_engine().find_byte_unchecked(ptr, byte) }
}

/// [`MemEngine::swap_raw`] on the global engine.
///
/// # Safety
///
/// See [`MemEngine::swap_raw`].
pub unsafe fn mem_swap(a: *mut u8, b: *mut u8, n: usize) -> bool {
    unsafe { get_global_engine().swap_raw(a, b, n) }
}

/// [`MemEngine::take_raw`] on the global engine.
///
/// # Safety
///
/// See [`MemEngine::take_raw`].
pub unsafe fn mem_take(dst: *mut u8, src: *mut u8, n: usize) -> *mut u8 {
    unsafe { get_global_engine().take_raw(dst, src, n) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation() {
        let engine = MemEngine::new();
        assert_eq!(engine.tier(), SimdTier::best_for(engine.cpu_features()));
        let scalar = MemEngine::with_tier(SimdTier::Scalar);
        assert_eq!(scalar.tier(), SimdTier::Scalar);
    }

    #[test]
    fn test_simd_flag_matches_dispatch() {
        for has_sse2 in [false, true] {
            for has_avx2 in [false, true] {
                let features = CpuFeatures { has_sse2, has_avx2 };
                let dispatched = SimdTier::best_for(&features) != SimdTier::Scalar;
                assert_eq!(features.has_simd(), dispatched);
            }
        }
    }

    #[test]
    fn test_with_tier_never_exceeds_cpu() {
        let engine = MemEngine::with_tier(SimdTier::Avx2);
        assert!(SimdTier::supported(engine.tier(), engine.cpu_features()));
    }

    #[test]
    fn test_from_config() {
        let config = MemoryConfig::builder().enable_simd(false).build().unwrap();
        assert_eq!(MemEngine::from_config(&config).tier(), SimdTier::Scalar);
    }

    #[test]
    fn test_copy_raw_rejections() {
        let engine = MemEngine::new();
        let mut buf = [1u8; 8];
        let src = [2u8; 8];
        unsafe {
            assert!(engine.copy_raw(ptr::null_mut(), src.as_ptr(), 1).is_null());
            assert!(engine.copy_raw(buf.as_mut_ptr(), ptr::null(), 1).is_null());
            let p = buf.as_mut_ptr();
            assert!(engine.copy_raw(p, p, 1).is_null());
            // Zero length succeeds without touching memory
            assert_eq!(engine.copy_raw(p, src.as_ptr(), 0), p);
            assert!(engine.copy_raw(ptr::null_mut(), ptr::null(), 0).is_null());
        }
        assert_eq!(buf, [1u8; 8]);
    }

    #[test]
    fn test_move_scenario() {
        let engine = MemEngine::new();
        let mut buf = *b"12345\0";
        let base = buf.as_mut_ptr();
        let out = unsafe { engine.move_raw(base.add(1), base, 2) };
        assert_eq!(out, unsafe { base.add(1) });
        assert_eq!(&buf, b"11245\0");
    }

    #[test]
    fn test_move_within() {
        let engine = MemEngine::new();
        let mut buf: Vec<u8> = (0..64).collect();
        engine.move_within(&mut buf, 0, 5, 40).unwrap();
        let expected: Vec<u8> = (0..5).chain(0..40).chain(45..64).collect();
        assert_eq!(buf, expected);

        assert!(engine.move_within(&mut buf, 30, 0, 40).is_err());
        assert!(engine.move_within(&mut buf, usize::MAX, 0, 2).is_err());
        assert!(engine.move_within(&mut buf, 3, 3, 10).is_ok());
    }

    #[test]
    fn test_compare_raw_edges() {
        let engine = MemEngine::new();
        let a = [1u8, 2, 3];
        unsafe {
            assert_eq!(engine.compare_raw(a.as_ptr(), a.as_ptr(), 3), 0);
            assert_eq!(engine.compare_raw(ptr::null(), a.as_ptr(), 0), 0);
            assert_eq!(engine.compare_raw(ptr::null(), a.as_ptr(), 3), -1);
            assert_eq!(engine.compare_raw(a.as_ptr(), ptr::null(), 3), -1);
            assert_eq!(engine.compare_raw(ptr::null(), ptr::null(), 3), 0);
        }
    }

    #[test]
    fn test_safe_compare_lengths() {
        let engine = MemEngine::new();
        assert_eq!(engine.compare(b"abc", b"abc"), 0);
        assert!(engine.compare(b"ab", b"abc") < 0);
        assert!(engine.compare(b"abd", b"abc") > 0);
        assert!(engine.compare(b"", b"a") < 0);
        assert_eq!(engine.compare(b"", b""), 0);
    }

    #[test]
    fn test_set_and_find_raw() {
        let engine = MemEngine::new();
        let mut buf = [0u8; 40];
        unsafe {
            assert!(engine.set_raw(ptr::null_mut(), 1, 4).is_null());
            let p = buf.as_mut_ptr();
            assert_eq!(engine.set_raw(p.add(3), b'z', 30), p.add(3));
            assert_eq!(engine.find_byte_raw(p, b'z', 40), p.add(3) as *const u8);
            assert!(engine.find_byte_raw(p, b'q', 40).is_null());
            assert!(engine.find_byte_raw(p, b'z', 0).is_null());
            assert!(engine.find_byte_raw(ptr::null(), b'z', 10).is_null());
            assert!(engine.find_byte_unchecked(ptr::null(), 0).is_null());
        }
        assert!(buf[3..33].iter().all(|&b| b == b'z'));
        assert_eq!(buf[33], 0);
    }

    #[test]
    fn test_swap_and_take() {
        let engine = MemEngine::new();
        let mut a: Vec<u8> = (0..1300u32).map(|x| x as u8).collect();
        let mut b = vec![0xEEu8; 1300];
        let a_orig = a.clone();
        engine.swap(&mut a, &mut b).unwrap();
        assert!(a.iter().all(|&x| x == 0xEE));
        assert_eq!(b, a_orig);

        let mut dst = vec![0u8; 1300];
        engine.take(&mut b, &mut dst).unwrap();
        assert_eq!(dst, a_orig);
        assert!(b.iter().all(|&x| x == 0));

        let mut short = [0u8; 3];
        assert!(engine.swap(&mut a, &mut short).is_err());
    }

    #[test]
    fn test_swap_raw_rejects_overlap() {
        let engine = MemEngine::new();
        let mut buf = [1u8, 2, 3, 4, 5, 6];
        let p = buf.as_mut_ptr();
        assert!(!unsafe { engine.swap_raw(p, p.add(2), 4) });
        assert!(unsafe { engine.swap_raw(p, p.add(3), 3) });
        assert_eq!(buf, [4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_global_convenience() {
        let src = b"global engine copy";
        let mut dst = vec![0u8; src.len()];
        fast_copy(src, &mut dst).unwrap();
        assert_eq!(fast_compare(src, &dst), 0);
        assert_eq!(fast_find_byte(&dst, b'e'), Some(7));
        fast_fill(&mut dst, b'x');
        assert!(dst.iter().all(|&b| b == b'x'));
        fast_zero(&mut dst);
        assert!(dst.iter().all(|&b| b == 0));
        assert!(std::ptr::eq(get_global_engine(), get_global_engine()));
    }
}
