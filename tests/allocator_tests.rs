//! Aligned allocator and arena integration tests

use lvmem::{aligned_alloc, aligned_free, AlignedAllocator, ArenaChain, MemoryConfig, DEFAULT_ALIGNMENT};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ptr::NonNull;

fn read(ptr: NonNull<u8>, len: usize) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }.to_vec()
}

proptest! {
    #[test]
    fn prop_allocate_release_round_trip(
        size in 1usize..100_000,
        align_shift in 0u32..13,
    ) {
        let allocator = AlignedAllocator::new(1 << align_shift).unwrap();
        let block = allocator.allocate(size).unwrap();
        prop_assert_eq!(block.as_ptr() as usize % allocator.alignment(), 0);
        let usable = unsafe { allocator.usable_size(block) };
        prop_assert!(usable >= size);

        // The whole requested range is writable
        unsafe { std::ptr::write_bytes(block.as_ptr(), 0xC3, size) };

        let mut handle = Some(block);
        unsafe { allocator.release(&mut handle) };
        prop_assert!(handle.is_none());
    }

    #[test]
    fn prop_extend_preserves_prefix(
        data in prop::collection::vec(any::<u8>(), 1..512),
        additional in 0usize..512,
    ) {
        let allocator = AlignedAllocator::default();
        let block = allocator.clone_bytes(&data).unwrap();
        let grown = unsafe { allocator.extend_zeroed(Some(block), data.len(), additional) }.unwrap();
        let bytes = read(grown, data.len() + additional);
        prop_assert_eq!(&bytes[..data.len()], &data[..]);
        prop_assert!(bytes[data.len()..].iter().all(|&b| b == 0));
        unsafe { allocator.release(&mut Some(grown)) };
    }

    #[test]
    fn prop_arena_blocks_disjoint(sizes in prop::collection::vec(1usize..3000, 1..60)) {
        let mut arena = ArenaChain::new();
        let mut spans: Vec<(usize, usize)> = Vec::new();
        for (i, &size) in sizes.iter().enumerate() {
            let p = arena.alloc(size).unwrap();
            prop_assert_eq!(p.as_ptr() as usize % arena.alignment(), 0);
            unsafe { std::ptr::write_bytes(p.as_ptr(), i as u8, size) };
            spans.push((p.as_ptr() as usize, size));
        }
        // Earlier blocks were not clobbered by later ones
        for (i, &(addr, size)) in spans.iter().enumerate() {
            let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, size) };
            prop_assert!(bytes.iter().all(|&b| b == i as u8));
        }
        let stats = arena.stats();
        prop_assert!(stats.used <= stats.capacity);
    }
}

#[test]
fn test_reallocate_shrink_and_grow() {
    let allocator = AlignedAllocator::new(64).unwrap();
    let block = allocator.clone_bytes(b"0123456789").unwrap();
    let small = unsafe { allocator.reallocate(Some(block), 10, 4) }.unwrap();
    assert_eq!(read(small, 4), b"0123");
    assert_eq!(small.as_ptr() as usize % 64, 0);

    let big = unsafe { allocator.reallocate_zeroed(Some(small), 4, 32) }.unwrap();
    let bytes = read(big, 32);
    assert_eq!(&bytes[..4], b"0123");
    assert!(bytes[4..].iter().all(|&b| b == 0));
    unsafe { allocator.release(&mut Some(big)) };
}

#[test]
fn test_overflow_consumes_input() {
    let allocator = AlignedAllocator::default();
    let block = allocator.allocate(16).unwrap();
    let err = unsafe { allocator.extend(Some(block), 16, usize::MAX) }.unwrap_err();
    assert_eq!(err.category(), "overflow");

    let block = allocator.allocate(16).unwrap();
    assert!(unsafe { allocator.reallocate(Some(block), 16, 0) }.is_err());
}

#[test]
fn test_c_style_handles() {
    let mut p = aligned_alloc(100);
    assert!(!p.is_null());
    assert_eq!(p as usize % DEFAULT_ALIGNMENT, 0);
    unsafe {
        aligned_free(&mut p);
        assert!(p.is_null());
        aligned_free(&mut p);
    }
}

#[test]
fn test_configured_arena() {
    let config = MemoryConfig::builder()
        .alignment(128)
        .arena_pool_size(1024)
        .build()
        .unwrap();
    let mut arena = ArenaChain::from_config(&config).unwrap();
    for _ in 0..32 {
        let p = arena.alloc(100).unwrap();
        assert_eq!(p.as_ptr() as usize % 128, 0);
    }
    let stats = arena.stats();
    assert!(stats.pools > 1);
    assert!(stats.utilization() > 0.5);

    arena.teardown();
    arena.teardown();
    assert!(arena.is_empty());
}

#[test]
fn test_random_grow_release_cycles() {
    let mut rng = StdRng::seed_from_u64(0x1f2e3d4c);
    let allocator = AlignedAllocator::new(32).unwrap();
    let mut blocks: Vec<(NonNull<u8>, Vec<u8>)> = Vec::new();

    for _ in 0..500 {
        match rng.gen_range(0..3) {
            0 => {
                let len = rng.gen_range(1..600);
                let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                blocks.push((allocator.clone_bytes(&data).unwrap(), data));
            }
            1 if !blocks.is_empty() => {
                let i = rng.gen_range(0..blocks.len());
                let (ptr, mut data) = blocks.swap_remove(i);
                let extra = rng.gen_range(0..300);
                let grown = unsafe { allocator.extend_zeroed(Some(ptr), data.len(), extra) }.unwrap();
                data.resize(data.len() + extra, 0);
                assert_eq!(grown.as_ptr() as usize % 32, 0);
                blocks.push((grown, data));
            }
            _ if !blocks.is_empty() => {
                let i = rng.gen_range(0..blocks.len());
                let (ptr, data) = blocks.swap_remove(i);
                assert_eq!(read(ptr, data.len()), data);
                unsafe { allocator.release(&mut Some(ptr)) };
            }
            _ => {}
        }
    }

    for (ptr, data) in blocks {
        assert_eq!(read(ptr, data.len()), data);
        unsafe { allocator.release(&mut Some(ptr)) };
    }
}
