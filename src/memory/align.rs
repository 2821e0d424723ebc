//! Alignment probing for the width engine.
//!
//! A memory operation may use a wide word for a step only if every operand
//! address it touches is a multiple of that word's size. [`probe_alignment`]
//! reports the widest such word for a pair of addresses at a running offset.

/// Word width used for one step of a memory operation.
///
/// The discriminant is the width in bits; `Byte` means no common word
/// alignment exists and only single-byte access is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ChunkWidth {
    /// Byte-at-a-time access only
    Byte = 0,
    /// 32-bit words
    W32 = 32,
    /// 64-bit words
    W64 = 64,
    /// 128-bit words (or one SSE2 register)
    W128 = 128,
}

impl ChunkWidth {
    /// Width in bits, 0 for `Byte`
    #[inline]
    pub const fn bits(self) -> usize {
        self as usize
    }

    /// Number of bytes moved per step
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::W32 => 4,
            Self::W64 => 8,
            Self::W128 => 16,
        }
    }

    /// Next narrower width, `Byte` stays `Byte`
    #[inline]
    pub const fn narrower(self) -> Self {
        match self {
            Self::W128 => Self::W64,
            Self::W64 => Self::W32,
            Self::W32 | Self::Byte => Self::Byte,
        }
    }

    /// Widest width whose byte size divides `addr`
    #[inline]
    pub const fn for_address(addr: usize) -> Self {
        if addr % 16 == 0 {
            Self::W128
        } else if addr % 8 == 0 {
            Self::W64
        } else if addr % 4 == 0 {
            Self::W32
        } else {
            Self::Byte
        }
    }
}

/// Widest width at which `a + offset` and `b + offset` are both aligned.
///
/// `b == None` is the single-buffer case (set, find) where only `a`
/// constrains the result. The low bits of `x | y` are zero exactly where
/// both addresses have zero low bits, so one probe covers both operands.
#[inline]
pub fn probe_alignment(a: usize, b: Option<usize>, offset: usize) -> ChunkWidth {
    let a = a.wrapping_add(offset);
    let b = b.map_or(0, |b| b.wrapping_add(offset));
    ChunkWidth::for_address(a | b)
}

/// Round `value` up to the next multiple of `align` (a power of two).
///
/// Returns `None` when the result does not fit in `usize`.
#[inline]
pub fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_sizes() {
        assert_eq!(ChunkWidth::Byte.bits(), 0);
        assert_eq!(ChunkWidth::W128.bits(), 128);
        assert_eq!(ChunkWidth::W32.bytes(), 4);
        assert_eq!(ChunkWidth::W128.bytes(), 16);
        assert_eq!(ChunkWidth::W128.narrower(), ChunkWidth::W64);
        assert_eq!(ChunkWidth::Byte.narrower(), ChunkWidth::Byte);
        assert!(ChunkWidth::W64 > ChunkWidth::W32);
    }

    #[test]
    fn test_probe_pairs() {
        assert_eq!(probe_alignment(0x1000, Some(0x2000), 0), ChunkWidth::W128);
        assert_eq!(probe_alignment(0x1000, Some(0x2008), 0), ChunkWidth::W64);
        assert_eq!(probe_alignment(0x1004, Some(0x2000), 0), ChunkWidth::W32);
        assert_eq!(probe_alignment(0x1001, Some(0x2000), 0), ChunkWidth::Byte);
        // Offsets are added to both operands
        assert_eq!(probe_alignment(0x1003, Some(0x2003), 1), ChunkWidth::W32);
        assert_eq!(probe_alignment(0x100f, Some(0x200f), 1), ChunkWidth::W128);
    }

    #[test]
    fn test_probe_single_buffer() {
        assert_eq!(probe_alignment(0x1000, None, 0), ChunkWidth::W128);
        assert_eq!(probe_alignment(0x1001, None, 7), ChunkWidth::W64);
        assert_eq!(probe_alignment(0x1001, None, 0), ChunkWidth::Byte);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), Some(0));
        assert_eq!(align_up(1, 16), Some(16));
        assert_eq!(align_up(16, 16), Some(16));
        assert_eq!(align_up(17, 8), Some(24));
        assert_eq!(align_up(usize::MAX, 16), None);
    }
}
