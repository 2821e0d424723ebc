//! # lvmem: Alignment-Aware Memory Primitives and Containers
//!
//! Byte-level copy, move, compare, fill and search routines that widen to
//! 32, 64 or 128-bit words (and SSE2/AVX2 registers) as far as the runtime
//! alignment of their operands allows, plus the allocators and containers
//! built on them.
//!
//! ## Key Features
//!
//! - **Memory Engine**: width-adaptive `copy`/`move`/`compare`/`set`/`find`
//!   with overlap-safe moves and sign-correct comparison
//! - **Aligned Allocator**: power-of-two aligned blocks with extend and
//!   reallocate helpers
//! - **Arena**: chained bump pools released as a whole
//! - **Containers**: a type-erased growable vector and a null-terminated
//!   tagged string
//! - **C FFI Support**: C-callable entry points (`ffi` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use lvmem::{fast_compare, fast_copy, fast_find_byte, TaggedStr, ValVec};
//!
//! let src = b"word-width engine";
//! let mut dst = [0u8; 17];
//! fast_copy(src, &mut dst).unwrap();
//! assert_eq!(fast_compare(src, &dst), 0);
//! assert_eq!(fast_find_byte(&dst, b'-'), Some(4));
//!
//! let mut vec = ValVec::for_type::<u32>(4).unwrap();
//! vec.push_values(&[1u32, 2, 3]).unwrap();
//! assert_eq!(vec.get_value::<u32>(2), Some(3));
//!
//! let mut s = TaggedStr::from_slice(b"  padded  ").unwrap();
//! s.trim(b" ");
//! assert_eq!(s.as_bytes(), b"padded");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod containers;
pub mod error;
pub mod memory;
pub mod string;
pub mod system;

#[cfg(feature = "ffi")]
pub mod ffi;

// Re-export core types
pub use config::{Config, MemoryConfig, MemoryConfigBuilder};
pub use containers::{Element, ValVec};
pub use error::{MemError, Result};
pub use string::TaggedStr;
pub use system::CpuFeatures;

pub use memory::{
    aligned_alloc, aligned_free, arena_alloc, arena_stats, arena_teardown, fast_compare, fast_copy, fast_fill,
    fast_find_byte, fast_move, fast_zero, get_global_engine, init_memory_management, mem_compare, mem_copy,
    mem_find_byte, mem_find_byte_unchecked, mem_move, mem_set, mem_swap, mem_take, mem_zero, AlignedAllocator,
    ArenaChain, ArenaStats, ChunkWidth, MemEngine, SimdTier, DEFAULT_ALIGNMENT, DEFAULT_ARENA_SIZE,
};

#[cfg(feature = "alloc-tracking")]
pub use memory::{TrackedBlock, TrackingAllocator, TrackingReport};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Whether the global engine runs SSE2 or AVX2 kernels
pub fn has_simd_support() -> bool {
    get_global_engine().tier() != SimdTier::Scalar
}

/// Initialize the library: detects CPU features and selects the global
/// engine. Safe to call repeatedly.
pub fn init() {
    log::debug!("Initializing lvmem v{}", VERSION);
    let engine = get_global_engine();
    log::debug!("memory engine tier: {:?}", engine.tier());
}
