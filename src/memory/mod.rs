//! Memory primitives and allocators
//!
//! - [`engine`]: width-adaptive copy, move, compare, set and byte search
//! - [`alloc`]: aligned allocation with extend/reallocate helpers
//! - [`arena`]: chained bump pools released as a whole
//! - [`tracking`]: optional allocation table for debugging leaks and
//!   double releases (`alloc-tracking` feature)

pub mod align;
pub mod alloc;
pub mod arena;
pub mod engine;
mod kernels;
#[cfg(feature = "alloc-tracking")]
pub mod tracking;
pub mod word;

pub use align::{probe_alignment, ChunkWidth};
pub use alloc::{aligned_alloc, aligned_free, AlignedAllocator, DEFAULT_ALIGNMENT};
pub use arena::{arena_alloc, arena_stats, arena_teardown, ArenaChain, ArenaStats, DEFAULT_ARENA_SIZE};
pub use engine::{
    fast_compare, fast_copy, fast_fill, fast_find_byte, fast_move, fast_zero, get_global_engine, set_global_engine,
    mem_compare, mem_copy, mem_find_byte, mem_find_byte_unchecked, mem_move, mem_set, mem_swap,
    mem_take, mem_zero, MemEngine, SimdTier,
};
#[cfg(feature = "alloc-tracking")]
pub use tracking::{TrackedBlock, TrackingAllocator, TrackingReport, DEFAULT_TOMBSTONE_LIMIT};
pub use word::{broadcast, has_zero_byte_u128, has_zero_byte_u32, has_zero_byte_u64};

use crate::config::{Config, MemoryConfig};

/// Validate `config` and install the process-wide engine it describes.
///
/// The engine is fixed at first use; later calls only validate.
pub fn init_memory_management(config: &MemoryConfig) -> crate::Result<()> {
    log::debug!("Initializing memory management with config: {:?}", config);
    config.validate()?;
    if !engine::set_global_engine(MemEngine::from_config(config)) {
        log::debug!(
            "global memory engine already initialized with tier {:?}",
            get_global_engine().tier()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_memory_management() {
        assert!(init_memory_management(&MemoryConfig::default()).is_ok());
        let bad = MemoryConfig {
            alignment: 3,
            ..MemoryConfig::default()
        };
        assert!(init_memory_management(&bad).is_err());
    }
}
