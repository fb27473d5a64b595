//! Heap Tests
//!
//! Reachability, weak reference and incremental scenarios for the managed heap.

use alloc::rc::Rc;
use core::cell::Cell;

use crate::{AllocError, Gc, GcPhase, GcVisitor, Heap, Trace};

/// A node that can point at another node through a mutable edge
struct Node {
    value: u64,
    next: Cell<Option<Gc<Node>>>,
}

impl Node {
    fn new(value: u64) -> Node {
        Node {
            value,
            next: Cell::new(None),
        }
    }

    fn linked(value: u64, next: Gc<Node>) -> Node {
        Node {
            value,
            next: Cell::new(Some(next)),
        }
    }
}

impl Trace for Node {
    fn trace<V: GcVisitor>(&self, visitor: &mut V) {
        self.next.trace(visitor);
    }
}

/// Counts how many times it has been dropped
struct DropCounter(Rc<Cell<usize>>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

impl Trace for DropCounter {
    fn trace<V: GcVisitor>(&self, _: &mut V) {}
}

fn chain(heap: &mut Heap, len: u64) -> Gc<Node> {
    let mut head = heap.alloc(Node::new(0)).unwrap();
    heap.root(head);
    for i in 1..len {
        let node = heap.alloc(Node::linked(i, head)).unwrap();
        heap.root(node);
        heap.unroot(head);
        head = node;
    }
    head
}

// ============================================================================
// Basic allocation and collection tests
// ============================================================================

#[test]
fn test_basic_alloc() {
    let mut heap = Heap::new();

    let ptr = heap.alloc(Node::new(42)).unwrap();

    assert_eq!(ptr.value, 42);
    assert_eq!(heap.num_objects(), 1);
    assert!(heap.bytes_allocated() > 0);
}

#[test]
fn test_collect_unreachable() {
    let mut heap = Heap::new();

    for i in 0..10 {
        heap.alloc(Node::new(i)).unwrap();
    }
    assert_eq!(heap.num_objects(), 10);

    heap.start_gc();
    let steps = heap.finish_gc();

    assert_eq!(heap.num_objects(), 0);
    assert_eq!(heap.bytes_allocated(), 0);
    // marking (empty queue) + weak refs + sweeping
    assert_eq!(steps, 3);
    assert_eq!(heap.last_cycle().objects_freed, 10);
}

#[test]
fn test_collect_rooted() {
    let mut heap = Heap::new();

    let root = heap.alloc(Node::new(42)).unwrap();
    heap.root(root);
    for i in 0..10 {
        heap.alloc(Node::new(i)).unwrap();
    }

    let stats = heap.collect();

    assert_eq!(heap.num_objects(), 1);
    assert_eq!(stats.objects_freed, 10);
    assert_eq!(stats.steps, 3);
    assert_eq!(root.value, 42);
}

#[test]
fn test_empty_collect() {
    let mut heap = Heap::new();

    let stats = heap.collect();

    assert_eq!(stats.objects_freed, 0);
    assert_eq!(heap.completed_cycles(), 1);
    assert_eq!(heap.phase(), GcPhase::Idle);
}

#[test]
fn test_overaligned_type_rejected() {
    #[repr(align(16))]
    struct Wide(u8);

    impl Trace for Wide {
        fn trace<V: GcVisitor>(&self, _: &mut V) {}
    }

    let mut heap = Heap::new();
    let result = heap.alloc(Wide(1));

    assert_eq!(result.unwrap_err(), AllocError::Overaligned { align: 16 });
    assert_eq!(heap.num_objects(), 0);
}

// ============================================================================
// Roots and linked structures
// ============================================================================

#[test]
fn test_linked_list_reachable() {
    let mut heap = Heap::new();

    let head = chain(&mut heap, 4);
    heap.collect();

    assert_eq!(heap.num_objects(), 4);
    assert_eq!(head.value, 3);
    assert_eq!(head.next.get().unwrap().value, 2);
}

#[test]
fn test_partial_list_unreachable() {
    let mut heap = Heap::new();

    let head = chain(&mut heap, 3);
    // Disconnect the tail
    head.next.get().unwrap().next.set(None);

    heap.collect();

    assert_eq!(heap.num_objects(), 2);
}

#[test]
fn test_unroot_releases_object() {
    let mut heap = Heap::new();

    let obj = heap.alloc(Node::new(1)).unwrap();
    heap.root(obj);
    heap.root(obj);

    assert!(heap.unroot(obj));
    heap.collect();
    assert_eq!(heap.num_objects(), 1, "object rooted twice needs two unroots");

    assert!(heap.unroot(obj));
    assert!(!heap.is_rooted(obj));
    heap.collect();
    assert_eq!(heap.num_objects(), 0);
}

#[test]
fn test_simple_cycle_collected() {
    let mut heap = Heap::new();

    let a = heap.alloc(Node::new(1)).unwrap();
    heap.root(a);
    let b = heap.alloc(Node::linked(2, a)).unwrap();
    a.next.set(Some(b));
    heap.unroot(a);

    let stats = heap.collect();

    assert_eq!(stats.objects_freed, 2);
    assert_eq!(heap.num_objects(), 0);
}

#[test]
fn test_rooted_cycle_survives() {
    let mut heap = Heap::new();

    let a = heap.alloc(Node::new(1)).unwrap();
    heap.root(a);
    let b = heap.alloc(Node::linked(2, a)).unwrap();
    a.next.set(Some(b));

    heap.collect();
    heap.collect();

    assert_eq!(heap.num_objects(), 2);
    assert_eq!(a.next.get().unwrap().value, 2);
}

// ============================================================================
// Destructors
// ============================================================================

#[test]
fn test_sweep_runs_destructors() {
    let drops = Rc::new(Cell::new(0));
    let mut heap = Heap::new();

    let kept = heap.alloc(DropCounter(drops.clone())).unwrap();
    heap.root(kept);
    for _ in 0..3 {
        heap.alloc(DropCounter(drops.clone())).unwrap();
    }

    heap.collect();
    assert_eq!(drops.get(), 3);

    drop(heap);
    assert_eq!(drops.get(), 4, "dropping the heap frees live objects too");
}

// ============================================================================
// Weak reference tests
// ============================================================================

#[test]
fn test_weak_ref_target_collected() {
    let mut heap = Heap::new();

    let obj = heap.alloc(Node::new(7)).unwrap();
    let weak = heap.downgrade(obj);
    assert_eq!(heap.upgrade(&weak).map(|node| node.value), Some(7));

    let stats = heap.collect();

    assert!(heap.is_cleared(&weak));
    assert_eq!(stats.weak_refs_cleared, 1);
    assert_eq!(stats.objects_freed, 1);
}

#[test]
fn test_weak_ref_target_survives_when_rooted() {
    let mut heap = Heap::new();

    let obj = heap.alloc(Node::new(7)).unwrap();
    heap.root(obj);
    let weak = heap.downgrade(obj);

    heap.collect();
    assert!(!heap.is_cleared(&weak));

    heap.unroot(obj);
    heap.collect();
    assert!(heap.is_cleared(&weak));
}

#[test]
fn test_weak_ref_target_survives_when_reachable() {
    let mut heap = Heap::new();

    let target = heap.alloc(Node::new(1)).unwrap();
    let weak = heap.downgrade(target);
    heap.root(target);
    let holder = heap.alloc(Node::linked(2, target)).unwrap();
    heap.root(holder);
    heap.unroot(target);

    heap.collect();

    assert!(heap.upgrade(&weak).unwrap().ptr_eq(&target));
}

#[test]
fn test_cleared_weak_slots_are_reused() {
    let mut heap = Heap::new();

    for i in 0..10_000 {
        let obj = heap.alloc(Node::new(i)).unwrap();
        let weak = heap.downgrade(obj);
        heap.collect();
        assert!(heap.is_cleared(&weak));
    }

    assert_eq!(heap.num_objects(), 0);
    assert_eq!(heap.num_weak_slots(), 1);
}

#[test]
fn test_stale_weak_ref_stays_cleared_after_slot_reuse() {
    let mut heap = Heap::new();

    let first = heap.alloc(Node::new(1)).unwrap();
    let stale = heap.downgrade(first);
    heap.collect();
    assert!(heap.is_cleared(&stale));

    let second = heap.alloc(Node::new(2)).unwrap();
    heap.root(second);
    let fresh = heap.downgrade(second);

    // Same slot, newer generation
    assert_eq!(heap.num_weak_slots(), 1);
    assert!(heap.is_cleared(&stale));
    assert!(heap.upgrade(&stale).is_none());
    assert_eq!(heap.upgrade(&fresh).map(|node| node.value), Some(2));
}

// ============================================================================
// Incremental GC tests
// ============================================================================

#[test]
fn test_incremental_gc_step_by_step() {
    let mut heap = Heap::new();

    let root = heap.alloc(Node::new(0)).unwrap();
    heap.root(root);
    heap.alloc(Node::new(1)).unwrap();

    heap.start_gc();
    assert_eq!(heap.phase(), GcPhase::Marking);
    assert!(heap.is_marking());

    assert!(heap.gc_step());
    assert_eq!(heap.phase(), GcPhase::WeakRefProcessing);

    assert!(heap.gc_step());
    assert_eq!(heap.phase(), GcPhase::Sweeping);

    assert!(!heap.gc_step());
    assert_eq!(heap.phase(), GcPhase::Idle);
    assert_eq!(heap.num_objects(), 1);

    assert!(!heap.gc_step(), "stepping an idle heap does nothing");
}

#[test]
fn test_alloc_during_marking_survives_cycle() {
    let mut heap = Heap::new();

    chain(&mut heap, 250);
    heap.start_gc();
    assert!(heap.gc_step());
    assert_eq!(heap.phase(), GcPhase::Marking);

    // Advances marking by another step, the chain still isn't fully scanned
    let fresh = heap.alloc(Node::new(999)).unwrap();
    assert_eq!(heap.phase(), GcPhase::Marking);

    heap.finish_gc();
    assert_eq!(heap.num_objects(), 251);
    assert_eq!(fresh.value, 999);

    heap.collect();
    assert_eq!(heap.num_objects(), 250);
}

#[test]
fn test_alloc_during_sweeping_survives_cycle() {
    let mut heap = Heap::new();

    for i in 0..250 {
        heap.alloc(Node::new(i)).unwrap();
    }
    heap.start_gc();
    heap.gc_step();
    heap.gc_step();
    assert_eq!(heap.phase(), GcPhase::Sweeping);

    let fresh = heap.alloc(Node::new(999)).unwrap();
    assert_eq!(heap.phase(), GcPhase::Sweeping);
    heap.root(fresh);

    heap.finish_gc();
    assert_eq!(heap.num_objects(), 1);
    assert_eq!(fresh.value, 999);
}

#[test]
fn test_root_during_marking_is_barriered() {
    let mut heap = Heap::new();

    chain(&mut heap, 150);
    let late = heap.alloc(Node::new(1)).unwrap();

    heap.start_gc();
    heap.root(late);
    heap.finish_gc();

    assert_eq!(heap.num_objects(), 151);
}

#[test]
fn test_write_barrier_during_marking() {
    let mut heap = Heap::new();

    let holder = heap.alloc(Node::new(0)).unwrap();
    heap.root(holder);
    chain(&mut heap, 150);
    let late = heap.alloc(Node::new(1)).unwrap();

    heap.start_gc();
    // The holder is scanned first, the chain keeps marking busy afterwards
    heap.gc_step();
    assert_eq!(heap.phase(), GcPhase::Marking);

    holder.next.set(Some(late));
    heap.write_barrier(late);
    heap.finish_gc();

    assert_eq!(heap.num_objects(), 152);
}

#[test]
fn test_collect_finishes_cycle_in_progress() {
    let mut heap = Heap::new();

    let obj = heap.alloc(Node::new(1)).unwrap();
    heap.root(obj);
    heap.start_gc();
    heap.unroot(obj);

    let stats = heap.collect();

    assert_eq!(stats.objects_freed, 1);
    assert_eq!(heap.num_objects(), 0);
    assert_eq!(heap.completed_cycles(), 2);
}

#[test]
fn test_allocation_starts_cycles() {
    let mut heap = Heap::with_threshold(1024);

    for i in 0..1000 {
        heap.alloc(i as u64).unwrap();
    }

    assert!(heap.completed_cycles() > 0);
    assert!(heap.num_objects() < 1000);
}
