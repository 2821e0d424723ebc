//! Width-adaptive loops behind [`MemEngine`](super::engine::MemEngine).
//!
//! Every kernel has the same three phases:
//!
//! 1. **Prologue**: single bytes until the operands share a word boundary.
//! 2. **Body**: two words per iteration at the widest common width, then
//!    narrower widths as the remaining length shrinks.
//! 3. **Tail**: the last few bytes one at a time.
//!
//! Pointer validity is the caller's responsibility; the engine filters
//! null and zero-length requests before any kernel runs.

use super::align::{probe_alignment, ChunkWidth};
use super::engine::SimdTier;
use super::word::{find_in_word, Word};

/// Prologue step limit. The co-alignment of two addresses repeats every
/// four offsets, so if none of the first four offsets reaches a 32-bit
/// boundary for both operands, none ever will.
const PROLOGUE_STEPS: usize = ChunkWidth::W32.bytes() - 1;

//==============================================================================
// COPY
//==============================================================================

/// Copy `len` bytes low-to-high.
///
/// Each iteration loads both words before storing, so overlapping ranges
/// with `dst < src` are handled correctly as well.
pub(crate) unsafe fn copy_forward(dst: *mut u8, src: *const u8, len: usize, tier: SimdTier) {
    let (d, s) = (dst as usize, src as usize);
    let mut i = 0;
    let mut n = len;

    let mut width = probe_alignment(d, Some(s), i);
    while width == ChunkWidth::Byte && n > 0 && i < PROLOGUE_STEPS {
        unsafe { *dst.add(i) = *src.add(i) };
        i += 1;
        n -= 1;
        width = probe_alignment(d, Some(s), i);
    }

    unsafe {
        if width >= ChunkWidth::W128 {
            simd_copy_forward(dst, src, &mut i, &mut n, tier);
            copy_words_forward::<u128>(dst, src, &mut i, &mut n);
        }
        if width >= ChunkWidth::W64 {
            copy_words_forward::<u64>(dst, src, &mut i, &mut n);
        }
        if width >= ChunkWidth::W32 {
            copy_words_forward::<u32>(dst, src, &mut i, &mut n);
        }
    }

    while n > 0 {
        unsafe { *dst.add(i) = *src.add(i) };
        i += 1;
        n -= 1;
    }
}

/// Copy `len` bytes high-to-low, for overlapping moves with `src < dst`.
pub(crate) unsafe fn copy_backward(dst: *mut u8, src: *const u8, len: usize, tier: SimdTier) {
    let (d, s) = (dst as usize, src as usize);
    // Bytes [0, n) are still pending
    let mut n = len;
    let mut steps = 0;

    let mut width = probe_alignment(d, Some(s), n);
    while width == ChunkWidth::Byte && n > 0 && steps < PROLOGUE_STEPS {
        n -= 1;
        unsafe { *dst.add(n) = *src.add(n) };
        steps += 1;
        width = probe_alignment(d, Some(s), n);
    }

    unsafe {
        if width >= ChunkWidth::W128 {
            simd_copy_backward(dst, src, &mut n, tier);
            copy_words_backward::<u128>(dst, src, &mut n);
        }
        if width >= ChunkWidth::W64 {
            copy_words_backward::<u64>(dst, src, &mut n);
        }
        if width >= ChunkWidth::W32 {
            copy_words_backward::<u32>(dst, src, &mut n);
        }
    }

    while n > 0 {
        n -= 1;
        unsafe { *dst.add(n) = *src.add(n) };
    }
}

#[inline(always)]
unsafe fn copy_words_forward<W: Word>(dst: *mut u8, src: *const u8, i: &mut usize, n: &mut usize) {
    while *n >= 2 * W::BYTES {
        unsafe {
            let a = W::load(src.add(*i));
            let b = W::load(src.add(*i + W::BYTES));
            a.store(dst.add(*i));
            b.store(dst.add(*i + W::BYTES));
        }
        *i += 2 * W::BYTES;
        *n -= 2 * W::BYTES;
    }
}

#[inline(always)]
unsafe fn copy_words_backward<W: Word>(dst: *mut u8, src: *const u8, n: &mut usize) {
    while *n >= 2 * W::BYTES {
        let hi = *n - W::BYTES;
        let lo = hi - W::BYTES;
        unsafe {
            let a = W::load(src.add(hi));
            let b = W::load(src.add(lo));
            a.store(dst.add(hi));
            b.store(dst.add(lo));
        }
        *n = lo;
    }
}

//==============================================================================
// COMPARE
//==============================================================================

/// Lexicographic comparison of `len` bytes.
///
/// Returns the difference of the first unequal byte pair, so the sign is
/// correct regardless of the host byte order.
pub(crate) unsafe fn compare(a: *const u8, b: *const u8, len: usize) -> i32 {
    let (pa, pb) = (a as usize, b as usize);
    let mut i = 0;
    let mut n = len;

    let mut width = probe_alignment(pa, Some(pb), i);
    while width == ChunkWidth::Byte && n > 0 && i < PROLOGUE_STEPS {
        let (x, y) = unsafe { (*a.add(i), *b.add(i)) };
        if x != y {
            return x as i32 - y as i32;
        }
        i += 1;
        n -= 1;
        width = probe_alignment(pa, Some(pb), i);
    }

    unsafe {
        if width >= ChunkWidth::W128 {
            if let Some(diff) = compare_words::<u128>(a, b, &mut i, &mut n) {
                return diff;
            }
        }
        if width >= ChunkWidth::W64 {
            if let Some(diff) = compare_words::<u64>(a, b, &mut i, &mut n) {
                return diff;
            }
        }
        if width >= ChunkWidth::W32 {
            if let Some(diff) = compare_words::<u32>(a, b, &mut i, &mut n) {
                return diff;
            }
        }
        compare_tail(a.add(i), b.add(i), n)
    }
}

#[inline(always)]
unsafe fn compare_words<W: Word>(a: *const u8, b: *const u8, i: &mut usize, n: &mut usize) -> Option<i32> {
    while *n >= 2 * W::BYTES {
        unsafe {
            let (x0, y0) = (W::load(a.add(*i)), W::load(b.add(*i)));
            let (x1, y1) = (W::load(a.add(*i + W::BYTES)), W::load(b.add(*i + W::BYTES)));
            if x0 != y0 || x1 != y1 {
                return Some(compare_tail(a.add(*i), b.add(*i), 2 * W::BYTES));
            }
        }
        *i += 2 * W::BYTES;
        *n -= 2 * W::BYTES;
    }
    None
}

#[inline]
unsafe fn compare_tail(a: *const u8, b: *const u8, n: usize) -> i32 {
    for k in 0..n {
        let (x, y) = unsafe { (*a.add(k), *b.add(k)) };
        if x != y {
            return x as i32 - y as i32;
        }
    }
    0
}

//==============================================================================
// FILL
//==============================================================================

/// Write `byte` into `len` bytes starting at `dst`.
pub(crate) unsafe fn fill(dst: *mut u8, byte: u8, len: usize, tier: SimdTier) {
    let d = dst as usize;
    let mut i = 0;
    let mut n = len;

    let mut width = probe_alignment(d, None, i);
    while width == ChunkWidth::Byte && n > 0 {
        unsafe { *dst.add(i) = byte };
        i += 1;
        n -= 1;
        width = probe_alignment(d, None, i);
    }

    unsafe {
        if width >= ChunkWidth::W128 {
            simd_fill(dst, byte, &mut i, &mut n, tier);
            fill_words::<u128>(dst, byte, &mut i, &mut n);
        }
        if width >= ChunkWidth::W64 {
            fill_words::<u64>(dst, byte, &mut i, &mut n);
        }
        if width >= ChunkWidth::W32 {
            fill_words::<u32>(dst, byte, &mut i, &mut n);
        }
    }

    while n > 0 {
        unsafe { *dst.add(i) = byte };
        i += 1;
        n -= 1;
    }
}

#[inline(always)]
unsafe fn fill_words<W: Word>(dst: *mut u8, byte: u8, i: &mut usize, n: &mut usize) {
    let word = W::splat(byte);
    while *n >= 2 * W::BYTES {
        unsafe {
            word.store(dst.add(*i));
            word.store(dst.add(*i + W::BYTES));
        }
        *i += 2 * W::BYTES;
        *n -= 2 * W::BYTES;
    }
}

//==============================================================================
// FIND
//==============================================================================

/// Offset of the first `byte` within `len` bytes, if any.
pub(crate) unsafe fn find(ptr: *const u8, byte: u8, len: usize) -> Option<usize> {
    let p = ptr as usize;
    let mut i = 0;
    let mut n = len;

    let mut width = probe_alignment(p, None, i);
    while width == ChunkWidth::Byte && n > 0 {
        if unsafe { *ptr.add(i) } == byte {
            return Some(i);
        }
        i += 1;
        n -= 1;
        width = probe_alignment(p, None, i);
    }

    unsafe {
        if width >= ChunkWidth::W128 {
            if let Some(pos) = find_words::<u128>(ptr, byte, &mut i, &mut n) {
                return Some(pos);
            }
        }
        if width >= ChunkWidth::W64 {
            if let Some(pos) = find_words::<u64>(ptr, byte, &mut i, &mut n) {
                return Some(pos);
            }
        }
        if width >= ChunkWidth::W32 {
            if let Some(pos) = find_words::<u32>(ptr, byte, &mut i, &mut n) {
                return Some(pos);
            }
        }
    }

    while n > 0 {
        if unsafe { *ptr.add(i) } == byte {
            return Some(i);
        }
        i += 1;
        n -= 1;
    }
    None
}

/// Offset of the first `byte` at or after `ptr`, with no length bound.
///
/// After an unaligned prologue the scan reads whole 8-byte-aligned words.
/// An aligned word never straddles a page, but it may extend past the
/// target byte, so the aligned word holding the target must be readable.
pub(crate) unsafe fn find_unbounded(ptr: *const u8, byte: u8) -> usize {
    let p = ptr as usize;
    let mut i = 0;

    while probe_alignment(p, None, i) < ChunkWidth::W64 {
        if unsafe { *ptr.add(i) } == byte {
            return i;
        }
        i += 1;
    }

    let mask = u64::splat(byte);
    loop {
        let word = unsafe { u64::load(ptr.add(i)) };
        if let Some(lane) = find_in_word(word, mask) {
            return i + lane;
        }
        i += u64::BYTES;
    }
}

#[inline(always)]
unsafe fn find_words<W: Word>(ptr: *const u8, byte: u8, i: &mut usize, n: &mut usize) -> Option<usize> {
    let mask = W::splat(byte);
    while *n >= 2 * W::BYTES {
        let (w0, w1) = unsafe { (W::load(ptr.add(*i)), W::load(ptr.add(*i + W::BYTES))) };
        if let Some(lane) = find_in_word(w0, mask) {
            return Some(*i + lane);
        }
        if let Some(lane) = find_in_word(w1, mask) {
            return Some(*i + W::BYTES + lane);
        }
        *i += 2 * W::BYTES;
        *n -= 2 * W::BYTES;
    }
    None
}

//==============================================================================
// SIMD BODIES FOR 128-BIT CHUNKS
//==============================================================================

#[inline(always)]
unsafe fn simd_copy_forward(dst: *mut u8, src: *const u8, i: &mut usize, n: &mut usize, tier: SimdTier) {
    #[cfg(target_arch = "x86_64")]
    match tier {
        SimdTier::Avx2 => unsafe { x86::avx2_copy_forward(dst, src, i, n) },
        SimdTier::Sse2 => unsafe { x86::sse2_copy_forward(dst, src, i, n) },
        SimdTier::Scalar => {}
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = (dst, src, i, n, tier);
}

#[inline(always)]
unsafe fn simd_copy_backward(dst: *mut u8, src: *const u8, n: &mut usize, tier: SimdTier) {
    #[cfg(target_arch = "x86_64")]
    match tier {
        SimdTier::Avx2 => unsafe { x86::avx2_copy_backward(dst, src, n) },
        SimdTier::Sse2 => unsafe { x86::sse2_copy_backward(dst, src, n) },
        SimdTier::Scalar => {}
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = (dst, src, n, tier);
}

#[inline(always)]
unsafe fn simd_fill(dst: *mut u8, byte: u8, i: &mut usize, n: &mut usize, tier: SimdTier) {
    #[cfg(target_arch = "x86_64")]
    match tier {
        SimdTier::Avx2 => unsafe { x86::avx2_fill(dst, byte, i, n) },
        SimdTier::Sse2 => unsafe { x86::sse2_fill(dst, byte, i, n) },
        SimdTier::Scalar => {}
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = (dst, byte, i, n, tier);
}

/// x86_64 register loops. Callers only enter these at a 16-byte boundary
/// common to all operands, so the SSE2 forms use aligned loads and stores.
/// AVX2 registers are 32 bytes wide and use the unaligned forms.
#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn avx2_copy_forward(dst: *mut u8, src: *const u8, i: &mut usize, n: &mut usize) {
        while *n >= 64 {
            unsafe {
                let a = _mm256_loadu_si256(src.add(*i) as *const __m256i);
                let b = _mm256_loadu_si256(src.add(*i + 32) as *const __m256i);
                _mm256_storeu_si256(dst.add(*i) as *mut __m256i, a);
                _mm256_storeu_si256(dst.add(*i + 32) as *mut __m256i, b);
            }
            *i += 64;
            *n -= 64;
        }
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn avx2_copy_backward(dst: *mut u8, src: *const u8, n: &mut usize) {
        while *n >= 64 {
            let hi = *n - 32;
            let lo = hi - 32;
            unsafe {
                let a = _mm256_loadu_si256(src.add(hi) as *const __m256i);
                let b = _mm256_loadu_si256(src.add(lo) as *const __m256i);
                _mm256_storeu_si256(dst.add(hi) as *mut __m256i, a);
                _mm256_storeu_si256(dst.add(lo) as *mut __m256i, b);
            }
            *n = lo;
        }
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn avx2_fill(dst: *mut u8, byte: u8, i: &mut usize, n: &mut usize) {
        let v = _mm256_set1_epi8(byte as i8);
        while *n >= 64 {
            unsafe {
                _mm256_storeu_si256(dst.add(*i) as *mut __m256i, v);
                _mm256_storeu_si256(dst.add(*i + 32) as *mut __m256i, v);
            }
            *i += 64;
            *n -= 64;
        }
    }

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn sse2_copy_forward(dst: *mut u8, src: *const u8, i: &mut usize, n: &mut usize) {
        while *n >= 32 {
            unsafe {
                let a = _mm_load_si128(src.add(*i) as *const __m128i);
                let b = _mm_load_si128(src.add(*i + 16) as *const __m128i);
                _mm_store_si128(dst.add(*i) as *mut __m128i, a);
                _mm_store_si128(dst.add(*i + 16) as *mut __m128i, b);
            }
            *i += 32;
            *n -= 32;
        }
    }

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn sse2_copy_backward(dst: *mut u8, src: *const u8, n: &mut usize) {
        while *n >= 32 {
            let hi = *n - 16;
            let lo = hi - 16;
            unsafe {
                let a = _mm_load_si128(src.add(hi) as *const __m128i);
                let b = _mm_load_si128(src.add(lo) as *const __m128i);
                _mm_store_si128(dst.add(hi) as *mut __m128i, a);
                _mm_store_si128(dst.add(lo) as *mut __m128i, b);
            }
            *n = lo;
        }
    }

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn sse2_fill(dst: *mut u8, byte: u8, i: &mut usize, n: &mut usize) {
        let v = _mm_set1_epi8(byte as i8);
        while *n >= 32 {
            unsafe {
                _mm_store_si128(dst.add(*i) as *mut __m128i, v);
                _mm_store_si128(dst.add(*i + 16) as *mut __m128i, v);
            }
            *i += 32;
            *n -= 32;
        }
    }
}
