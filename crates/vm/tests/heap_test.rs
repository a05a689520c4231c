use std::sync::Arc;

use types::Addr;
use vm::{Arena, Heap, MemoryError};

fn setup(size: u32) -> (Arc<Arena>, Heap) {
    let arena = Arc::new(Arena::new(8192));
    let heap = Heap::new(Arc::clone(&arena), size).unwrap();
    (arena, heap)
}

#[test]
fn test_logical_address_maps_one_below() {
    let (arena, mut heap) = setup(64);
    let a = heap.malloc(10).unwrap();
    assert_eq!(a, Addr::new(1));

    heap.set_i32(a, 7);
    assert_eq!(heap.get_i32(a), 7);
    assert_eq!(arena.get_i32(heap.base()).unwrap(), 7);
}

#[test]
fn test_out_of_range_access_is_soft() {
    let (_arena, heap) = setup(64);
    assert_eq!(heap.get_u8(Addr::NULL), 0);
    assert_eq!(heap.get_i64(Addr::new(60)), 0);

    heap.set_i64(Addr::new(60), 5);
    heap.set_u8(Addr::NULL, 5);
    assert_eq!(heap.get_i32(Addr::new(57)), 0);

    heap.set_i64(Addr::new(57), -2);
    assert_eq!(heap.get_i64(Addr::new(57)), -2);
}

#[test]
fn test_grows_and_keeps_contents() {
    let (arena, mut heap) = setup(64);
    let a = heap.malloc(10).unwrap();
    heap.set_i32(a, 0x0bad_cafe);
    let old_base = heap.base();

    let b = heap.malloc(64).unwrap();
    assert_eq!(heap.size(), 128);
    assert_ne!(heap.base(), old_base);
    assert_eq!(heap.get_i32(a), 0x0bad_cafe);
    assert_eq!(b, Addr::new(11));

    let snap = arena.snapshot();
    assert_eq!(snap.blocks.allocations, vec![(heap.base(), 128)]);
}

#[test]
fn test_drop_releases_region() {
    let (arena, heap) = setup(64);
    assert_eq!(arena.snapshot().blocks.allocations.len(), 1);
    drop(heap);
    assert!(arena.snapshot().blocks.allocations.is_empty());
}

#[test]
fn test_free_and_reuse() {
    let (_arena, mut heap) = setup(64);
    let a = heap.malloc(8).unwrap();
    let b = heap.malloc(8).unwrap();
    heap.free(a).unwrap();
    assert_eq!(heap.free(a), Err(MemoryError::InvalidPointer(a)));
    assert_eq!(heap.malloc(8).unwrap(), a);
    assert_eq!(heap.size_of(b).unwrap(), 8);

    let snap = heap.snapshot();
    assert_eq!(snap.free_bytes() + snap.allocated_bytes(), 64);
}

#[test]
fn test_calloc_zeroes() {
    let (_arena, mut heap) = setup(64);
    let a = heap.malloc(8).unwrap();
    heap.set_i64(a, -1);
    heap.free(a).unwrap();

    let b = heap.calloc(8, 8).unwrap();
    assert_eq!(heap.get_i64(b), 0);
    assert_eq!(heap.calloc(2, 3), Err(MemoryError::InvalidLength { size: 2, len: 3 }));
}

#[test]
fn test_array_round_trip_through_arena() {
    let (arena, mut heap) = setup(64);
    let literal = arena.allocate(2).unwrap();
    arena.write_bytes(literal, b"hi").unwrap();

    let a = heap.malloc(2).unwrap();
    heap.write_from_arena(a, literal, 2).unwrap();
    assert_eq!(heap.read_array(a).unwrap(), b"hi".to_vec());
    assert!(heap.read_array(Addr::new(40)).is_err());
    assert!(heap.write_from_arena(Addr::new(64), literal, 2).is_err());
}
