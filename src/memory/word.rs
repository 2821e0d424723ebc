//! Word-level bit tricks: zero-byte detection and byte broadcasting.
//!
//! `has_zero_byte_*` use the classic `(x - 0x01..01) & !x & 0x80..80`
//! identity. The result is nonzero iff some byte of `x` is zero, and its
//! lowest set bit always falls in the lowest zero byte (borrows only
//! propagate upward), which is what [`Word::first_zero_lane`] relies on.

use super::align::ChunkWidth;
use std::ops::BitXor;
use std::ptr;

const LO_32: u32 = u32::MAX / 0xFF;
const HI_32: u32 = LO_32 << 7;
const LO_64: u64 = u64::MAX / 0xFF;
const HI_64: u64 = LO_64 << 7;
const LO_128: u128 = u128::MAX / 0xFF;

/// Nonzero iff some byte of `x` is zero
#[inline]
pub const fn has_zero_byte_u32(x: u32) -> u32 {
    x.wrapping_sub(LO_32) & !x & HI_32
}

/// Nonzero iff some byte of `x` is zero
#[inline]
pub const fn has_zero_byte_u64(x: u64) -> u64 {
    x.wrapping_sub(LO_64) & !x & HI_64
}

/// Nonzero iff some byte of `x` is zero.
///
/// Evaluated as two independent 64-bit halves so that a borrow can never
/// cross from the low half into the high half.
#[inline]
pub const fn has_zero_byte_u128(x: u128) -> u128 {
    let lo = has_zero_byte_u64(x as u64) as u128;
    let hi = has_zero_byte_u64((x >> 64) as u64) as u128;
    lo | (hi << 64)
}

/// Replicate `byte` into all sixteen lanes of a 128-bit word
#[inline]
pub const fn broadcast(byte: u8) -> u128 {
    byte as u128 * LO_128
}

/// Replicate `byte` into all eight lanes of a 64-bit word
#[inline]
pub const fn broadcast_u64(byte: u8) -> u64 {
    byte as u64 * LO_64
}

/// Replicate `byte` into all four lanes of a 32-bit word
#[inline]
pub const fn broadcast_u32(byte: u8) -> u32 {
    byte as u32 * LO_32
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
    impl Sealed for u128 {}
}

/// Fixed-width unsigned word the engine loops are generic over.
pub trait Word: Copy + Eq + BitXor<Output = Self> + sealed::Sealed {
    /// Width tag of this word
    const WIDTH: ChunkWidth;
    /// Size in bytes
    const BYTES: usize;

    /// Word with `byte` in every lane
    fn splat(byte: u8) -> Self;

    /// Read a word from `ptr` in native byte order.
    ///
    /// # Safety
    ///
    /// `ptr..ptr + Self::BYTES` must be readable.
    unsafe fn load(ptr: *const u8) -> Self;

    /// Write this word to `ptr` in native byte order.
    ///
    /// # Safety
    ///
    /// `ptr..ptr + Self::BYTES` must be writable.
    unsafe fn store(self, ptr: *mut u8);

    /// Index (in memory order) of the first zero byte of a word obtained
    /// from [`Word::load`], or `None` when every byte is nonzero.
    fn first_zero_lane(self) -> Option<usize>;
}

macro_rules! impl_word {
    ($t:ty, $width:expr, $splat:path, $has_zero:path) => {
        impl Word for $t {
            const WIDTH: ChunkWidth = $width;
            const BYTES: usize = std::mem::size_of::<$t>();

            #[inline(always)]
            fn splat(byte: u8) -> Self {
                $splat(byte)
            }

            #[inline(always)]
            unsafe fn load(ptr: *const u8) -> Self {
                // SAFETY: caller guarantees BYTES readable bytes
                unsafe { ptr::read_unaligned(ptr as *const $t) }
            }

            #[inline(always)]
            unsafe fn store(self, ptr: *mut u8) {
                // SAFETY: caller guarantees BYTES writable bytes
                unsafe { ptr::write_unaligned(ptr as *mut $t, self) }
            }

            #[inline(always)]
            fn first_zero_lane(self) -> Option<usize> {
                // Lowest address becomes least significant on every target
                let lanes = $has_zero(self.to_le());
                if lanes == 0 {
                    None
                } else {
                    Some((lanes.trailing_zeros() / 8) as usize)
                }
            }
        }
    };
}

impl_word!(u32, ChunkWidth::W32, broadcast_u32, has_zero_byte_u32);
impl_word!(u64, ChunkWidth::W64, broadcast_u64, has_zero_byte_u64);
impl_word!(u128, ChunkWidth::W128, broadcast, has_zero_byte_u128);

/// Position of the first `byte` inside `word` (a value from [`Word::load`])
#[inline(always)]
pub fn find_in_word<W: Word>(word: W, mask: W) -> Option<usize> {
    (word ^ mask).first_zero_lane()
}
