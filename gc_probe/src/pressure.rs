//! Memory pressure for platforms where collection cannot be requested directly.
//!
//! `ChurnBuffer` churns the process allocator. `HeapPressure` churns a managed
//! `Heap`, whose collector advances on its own allocations.

use std::{cell::RefCell, rc::Rc};

use gc_probe_heap::{AllocResult, Gc, GcVisitor, Heap, Trace};
use tracing::{trace, warn};

/// One allocation-churn step of the fallback loop.
pub trait MemoryPressure {
    /// Allocate and transform `size` throwaway elements, releasing whatever the
    /// previous step retained.
    fn apply(&mut self, size: usize);

    /// Release everything retained by previous steps.
    fn reset(&mut self) {}
}

/// Default pressure: a buffer of `size` generated elements, mapped into a
/// fresh buffer on every step. Only the latest buffer is retained.
#[derive(Debug, Default)]
pub struct ChurnBuffer {
    latest: Vec<u32>,
}

impl ChurnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements retained from the last step
    pub fn retained(&self) -> usize {
        self.latest.len()
    }
}

impl MemoryPressure for ChurnBuffer {
    fn apply(&mut self, size: usize) {
        let generated: Vec<u32> = (0..size).map(element).collect();
        // Assigning drops the previous buffer, `generated` is dropped on return
        self.latest = generated.iter().map(|value| value.wrapping_mul(31)).collect();
    }

    fn reset(&mut self) {
        self.latest = Vec::new();
    }
}

/// Value of the `index`th generated element, saturating past `u32::MAX`
#[inline]
fn element(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// One element of a managed pressure chain
struct PressureNode {
    value: u32,
    next: Option<Gc<PressureNode>>,
}

impl Trace for PressureNode {
    fn trace<V: GcVisitor>(&self, visitor: &mut V) {
        visitor.visit_opt(self.next);
    }
}

/// Pressure on a managed heap: each step allocates a chain of `size` elements
/// in the heap, then maps it into a second chain that replaces the one from
/// the previous step.
///
/// Every allocation advances the heap's incremental collector, so this drives
/// collection without a direct trigger. Only the head of the latest chain
/// stays rooted between steps.
pub struct HeapPressure {
    heap: Rc<RefCell<Heap>>,
    latest: Option<Gc<PressureNode>>,
}

impl HeapPressure {
    pub fn new(heap: Rc<RefCell<Heap>>) -> Self {
        HeapPressure { heap, latest: None }
    }

    /// Number of elements retained from the last step
    pub fn retained(&self) -> usize {
        let mut len = 0;
        let mut current = self.latest;
        while let Some(node) = current {
            len += 1;
            current = node.next;
        }
        len
    }

    fn churn(heap: &mut Heap, size: usize) -> AllocResult<Option<Gc<PressureNode>>> {
        let generated = build_chain(heap, (0..size).map(element))?;

        let mut mapped_values = Vec::with_capacity(size);
        let mut current = generated;
        while let Some(node) = current {
            mapped_values.push(node.value.wrapping_mul(31));
            current = node.next;
        }
        let mapped = build_chain(heap, mapped_values.into_iter());

        if let Some(head) = generated {
            heap.unroot(head);
        }
        mapped
    }
}

/// Allocate one node per value, returning the rooted head of the chain.
/// The chain runs from the last value back to the first.
fn build_chain(
    heap: &mut Heap,
    values: impl Iterator<Item = u32>,
) -> AllocResult<Option<Gc<PressureNode>>> {
    let mut head: Option<Gc<PressureNode>> = None;
    for value in values {
        let node = match heap.alloc(PressureNode { value, next: head }) {
            Ok(node) => node,
            Err(err) => {
                if let Some(head) = head {
                    heap.unroot(head);
                }
                return Err(err);
            }
        };
        heap.root(node);
        if let Some(previous) = head {
            heap.unroot(previous);
        }
        head = Some(node);
    }
    Ok(head)
}

impl MemoryPressure for HeapPressure {
    fn apply(&mut self, size: usize) {
        let Ok(mut heap) = self.heap.try_borrow_mut() else {
            warn!("heap is borrowed, skipping memory pressure step");
            return;
        };

        match HeapPressure::churn(&mut heap, size) {
            Ok(mapped) => {
                if let Some(previous) = std::mem::replace(&mut self.latest, mapped) {
                    heap.unroot(previous);
                }
                trace!(
                    size,
                    phase = ?heap.phase(),
                    cycles = heap.completed_cycles(),
                    "applied heap pressure"
                );
            }
            Err(err) => warn!(%err, "heap pressure step failed"),
        }
    }

    fn reset(&mut self) {
        if let Some(latest) = self.latest.take() {
            match self.heap.try_borrow_mut() {
                Ok(mut heap) => {
                    heap.unroot(latest);
                }
                Err(_) => {
                    warn!("heap is borrowed, keeping memory pressure rooted");
                    self.latest = Some(latest);
                }
            }
        }
    }
}

impl Drop for HeapPressure {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Resets the wrapped pressure when dropped, including when the probe is cancelled.
pub(crate) struct ResetOnDrop<'a, P: MemoryPressure>(pub &'a mut P);

impl<P: MemoryPressure> Drop for ResetOnDrop<'_, P> {
    fn drop(&mut self) {
        self.0.reset();
    }
}
