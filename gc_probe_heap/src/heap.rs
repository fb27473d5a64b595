//! Heap - GC-managed memory allocator with incremental collection
//!
//! Design:
//! - Uses alloc::alloc for memory allocation
//! - Maintains a linked list of all allocated objects
//! - Provides incremental tri-color mark-sweep garbage collection
//! - Allocation-driven GC: each alloc() call advances GC work, and starts a
//!   cycle once the allocated byte count crosses the threshold
//!
//! Roots are tracked per object (`Heap::root`), so a collection needs no
//! external context. Weak references live in a slot table owned by the heap and
//! are cleared between marking and sweeping.
//!
//! Sweeping detaches the object list it walks. Objects allocated while a sweep
//! is in progress go onto a fresh list and are never visited by that sweep.

use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::{
    gc_header::{GcColor, GcHeader, GcPhase},
    pointer::{Gc, WeakRef},
    visitor::{GcVisitor, Trace},
};

/// Number of gray objects processed per GC step
const DEFAULT_MARK_STEP_SIZE: usize = 100;
/// Number of objects visited per sweep step
const DEFAULT_SWEEP_STEP_SIZE: usize = 100;

/// Default GC threshold (1MB)
pub const DEFAULT_GC_THRESHOLD: usize = 1024 * 1024;

/// Result type for allocations
pub type AllocResult<T> = Result<T, AllocError>;

/// Allocation error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The system allocator could not satisfy the request
    OutOfMemory,
    /// The type needs a stricter alignment than the heap provides
    Overaligned { align: usize },
}

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AllocError::OutOfMemory => write!(f, "out of memory"),
            AllocError::Overaligned { align } => write!(
                f,
                "type alignment {align} exceeds heap alignment {}",
                GcHeader::ALIGN
            ),
        }
    }
}

/// What one collection cycle reclaimed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub objects_freed: usize,
    pub bytes_freed: usize,
    pub weak_refs_cleared: usize,
    /// Number of `gc_step` calls the cycle took
    pub steps: usize,
}

/// Target of a weak reference, None once cleared.
///
/// The generation is bumped every time a cleared slot is reused, so weak
/// references handed out before the reuse stay cleared.
struct WeakSlot {
    target: Option<NonNull<GcHeader>>,
    generation: u32,
}

/// The managed heap with incremental GC
pub struct Heap {
    /// Head of the all-objects list
    all_objects: Option<NonNull<GcHeader>>,

    bytes_allocated: usize,
    num_objects: usize,

    /// Threshold to start a cycle on allocation (in bytes)
    gc_threshold: usize,
    /// Lower bound the threshold is reset to after each cycle
    min_gc_threshold: usize,

    gray_queue: Vec<NonNull<GcHeader>>,

    weak_slots: Vec<WeakSlot>,
    /// Indices of cleared slots, reused by `downgrade`
    free_weak_slots: Vec<usize>,

    phase: GcPhase,

    /// Remaining part of the detached list being swept
    sweep_current: Option<NonNull<GcHeader>>,
    /// Objects that survived the current sweep, relinked when it finishes
    survivors_head: Option<NonNull<GcHeader>>,
    survivors_tail: Option<NonNull<GcHeader>>,

    cycle: CollectionStats,
    last_cycle: CollectionStats,
    completed_cycles: usize,
}

impl Heap {
    pub const fn new() -> Heap {
        Heap::with_threshold(DEFAULT_GC_THRESHOLD)
    }

    /// Create a heap that starts a cycle once more than `threshold` bytes are allocated
    pub const fn with_threshold(threshold: usize) -> Heap {
        Heap {
            all_objects: None,
            bytes_allocated: 0,
            num_objects: 0,
            gc_threshold: threshold,
            min_gc_threshold: threshold,
            gray_queue: Vec::new(),
            weak_slots: Vec::new(),
            free_weak_slots: Vec::new(),
            phase: GcPhase::Idle,
            sweep_current: None,
            survivors_head: None,
            survivors_tail: None,
            cycle: CollectionStats {
                objects_freed: 0,
                bytes_freed: 0,
                weak_refs_cleared: 0,
                steps: 0,
            },
            last_cycle: CollectionStats {
                objects_freed: 0,
                bytes_freed: 0,
                weak_refs_cleared: 0,
                steps: 0,
            },
            completed_cycles: 0,
        }
    }

    #[inline]
    pub fn phase(&self) -> GcPhase {
        self.phase
    }

    #[inline]
    pub fn gc_in_progress(&self) -> bool {
        self.phase != GcPhase::Idle
    }

    /// Check if we're in marking phase (for the root barrier)
    #[inline]
    pub fn is_marking(&self) -> bool {
        matches!(self.phase, GcPhase::RootScanning | GcPhase::Marking)
    }

    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    #[inline]
    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    #[inline]
    pub fn threshold(&self) -> usize {
        self.gc_threshold
    }

    /// Number of cycles that ran to completion
    #[inline]
    pub fn completed_cycles(&self) -> usize {
        self.completed_cycles
    }

    /// Stats of the most recently completed cycle
    #[inline]
    pub fn last_cycle(&self) -> CollectionStats {
        self.last_cycle
    }

    /// Check if GC should be triggered
    #[inline]
    pub fn should_gc(&self) -> bool {
        if cfg!(feature = "gc_stress_test") {
            return self.phase == GcPhase::Idle;
        }

        self.bytes_allocated > self.gc_threshold && self.phase == GcPhase::Idle
    }

    /// Move `value` into the heap.
    ///
    /// The returned pointer is not a root. Root it (or store it in a rooted
    /// object) before the next allocation if it must survive.
    ///
    /// Objects allocated while marking are gray so they and everything they
    /// point to survive the cycle. Objects allocated while sweeping are white
    /// but live outside the list being swept.
    pub fn alloc<T: Trace + 'static>(&mut self, value: T) -> AllocResult<Gc<T>> {
        let align = core::mem::align_of::<T>();
        if align > GcHeader::ALIGN {
            return Err(AllocError::Overaligned { align });
        }

        if self.gc_in_progress() {
            self.gc_step();
            // Never link a new object in between marking and the sweep list detaching
            if self.phase == GcPhase::WeakRefProcessing {
                self.gc_step();
            }
        } else if self.should_gc() {
            self.start_gc();
        }

        let size = core::mem::size_of::<T>();
        let layout = GcHeader::layout_for_size(size).ok_or(AllocError::OutOfMemory)?;

        unsafe {
            let ptr = alloc::alloc::alloc(layout);
            if ptr.is_null() {
                return Err(AllocError::OutOfMemory);
            }

            let header = ptr as *mut GcHeader;
            header.write(GcHeader::new_for::<T>(size));
            let object_ptr = ptr.add(GcHeader::SIZE) as *mut T;
            object_ptr.write(value);

            let header_nn = NonNull::new_unchecked(header);
            if self.is_marking() {
                (*header).set_color(GcColor::Gray);
                self.gray_queue.push(header_nn);
            }

            (*header).set_next_object(self.all_objects);
            self.all_objects = Some(header_nn);

            self.bytes_allocated += (*header).total_size();
            self.num_objects += 1;

            Ok(Gc::from_non_null(NonNull::new_unchecked(object_ptr)))
        }
    }

    // ========================================================================
    // Roots
    // ========================================================================

    /// Keep `ptr` alive across collections until a matching `unroot`.
    ///
    /// Roots nest: an object rooted twice must be unrooted twice.
    pub fn root<T>(&mut self, ptr: Gc<T>) {
        unsafe {
            let mut header = GcHeader::from_object_ptr(ptr.as_ptr());
            header.as_mut().increment_roots();
            if self.is_marking() {
                self.gray_header(header);
            }
        }
    }

    /// Release one root of `ptr`. Returns false if `ptr` was not rooted.
    pub fn unroot<T>(&mut self, ptr: Gc<T>) -> bool {
        unsafe { GcHeader::from_object_ptr(ptr.as_ptr()).as_mut().decrement_roots() }
    }

    /// Write barrier - call after storing `target` into a `Cell` of an existing object
    ///
    /// During marking this grays the target (Dijkstra-style insertion barrier),
    /// so an edge added from an already scanned object cannot hide it.
    #[inline]
    pub fn write_barrier<T>(&mut self, target: Gc<T>) {
        if self.is_marking() {
            self.gray_header(unsafe { GcHeader::from_object_ptr(target.as_ptr()) });
        }
    }

    #[inline]
    pub fn is_rooted<T>(&self, ptr: Gc<T>) -> bool {
        unsafe { GcHeader::from_object_ptr(ptr.as_ptr()).as_ref().is_rooted() }
    }

    // ========================================================================
    // Weak references
    // ========================================================================

    /// Create a weak reference to `ptr`
    pub fn downgrade<T>(&mut self, ptr: Gc<T>) -> WeakRef<T> {
        let header = unsafe { GcHeader::from_object_ptr(ptr.as_ptr()) };

        if let Some(index) = self.free_weak_slots.pop() {
            let slot = &mut self.weak_slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.target = Some(header);
            return WeakRef::new(index, slot.generation);
        }

        self.weak_slots.push(WeakSlot {
            target: Some(header),
            generation: 0,
        });
        WeakRef::new(self.weak_slots.len() - 1, 0)
    }

    /// Resolve a weak reference, or None if its target has been collected
    pub fn upgrade<T>(&self, weak: &WeakRef<T>) -> Option<Gc<T>> {
        let slot = self.weak_slots.get(weak.slot())?;
        if slot.generation != weak.generation() {
            return None;
        }

        let header = slot.target?;
        let object_ptr = unsafe { header.as_ref().object_ptr() } as *mut T;
        Some(unsafe { Gc::from_ptr(object_ptr) })
    }

    /// Whether the target of `weak` has been found unreachable by a collection
    #[inline]
    pub fn is_cleared<T>(&self, weak: &WeakRef<T>) -> bool {
        self.upgrade(weak).is_none()
    }

    /// Number of weak slots in the table, live or waiting for reuse
    #[inline]
    pub fn num_weak_slots(&self) -> usize {
        self.weak_slots.len()
    }

    fn process_weak_refs(&mut self) {
        for (index, slot) in self.weak_slots.iter_mut().enumerate() {
            if let Some(header) = slot.target {
                if unsafe { header.as_ref().color() } == GcColor::White {
                    slot.target = None;
                    self.free_weak_slots.push(index);
                    self.cycle.weak_refs_cleared += 1;
                }
            }
        }
    }

    // ========================================================================
    // Incremental GC API
    // ========================================================================

    /// Start an incremental GC cycle by graying every rooted object.
    ///
    /// Does nothing if a cycle is already in progress. Use `gc_step()` to
    /// advance the cycle, or `finish_gc()` to complete it synchronously.
    pub fn start_gc(&mut self) {
        if self.gc_in_progress() {
            return;
        }

        self.phase = GcPhase::RootScanning;
        self.cycle = CollectionStats::default();

        let mut current = self.all_objects;
        while let Some(header) = current {
            unsafe {
                if header.as_ref().is_rooted() {
                    self.gray_header(header);
                }
                current = header.as_ref().next_object();
            }
        }

        self.phase = GcPhase::Marking;
    }

    /// Advance the current cycle by one step.
    ///
    /// Returns true if the cycle is still in progress, false if it completed
    /// (or none was running).
    pub fn gc_step(&mut self) -> bool {
        if self.phase == GcPhase::Idle {
            return false;
        }
        self.cycle.steps += 1;

        match self.phase {
            GcPhase::Idle => false,
            GcPhase::RootScanning => {
                // start_gc leaves this phase before returning
                self.phase = GcPhase::Marking;
                true
            }
            GcPhase::Marking => {
                self.mark_step(DEFAULT_MARK_STEP_SIZE);
                true
            }
            GcPhase::WeakRefProcessing => {
                self.process_weak_refs();
                self.phase = GcPhase::Sweeping;
                self.sweep_current = self.all_objects.take();
                true
            }
            GcPhase::Sweeping => {
                self.sweep_step(DEFAULT_SWEEP_STEP_SIZE);
                self.phase != GcPhase::Idle
            }
        }
    }

    /// Run all remaining work of the current cycle. Returns the number of steps executed.
    pub fn finish_gc(&mut self) -> usize {
        let mut steps = 0;
        loop {
            let in_progress = self.gc_step();
            steps += 1;
            if !in_progress {
                break;
            }
        }
        steps
    }

    /// Run a full collection synchronously.
    ///
    /// A cycle already in progress is finished first, then a fresh cycle runs
    /// from root scanning to the end of sweeping, so everything unreachable at
    /// the time of the call is reclaimed.
    pub fn collect(&mut self) -> CollectionStats {
        if self.gc_in_progress() {
            self.finish_gc();
        }

        self.start_gc();
        self.finish_gc();
        self.last_cycle
    }

    fn mark_step(&mut self, work_limit: usize) {
        for _ in 0..work_limit {
            let header_ptr = match self.gray_queue.pop() {
                Some(header_ptr) => header_ptr,
                None => {
                    self.phase = GcPhase::WeakRefProcessing;
                    return;
                }
            };

            unsafe {
                let header = &mut *header_ptr.as_ptr();
                header.set_color(GcColor::Black);

                let mut marker = Marker {
                    gray_queue: &mut self.gray_queue,
                };
                header.trace_object(&mut marker);
            }
        }

        if self.gray_queue.is_empty() {
            self.phase = GcPhase::WeakRefProcessing;
        }
    }

    fn sweep_step(&mut self, work_limit: usize) {
        for _ in 0..work_limit {
            let header_ptr = match self.sweep_current {
                Some(header_ptr) => header_ptr,
                None => {
                    self.finish_sweep();
                    return;
                }
            };

            unsafe {
                let header = &mut *header_ptr.as_ptr();
                self.sweep_current = header.next_object();

                if header.color() == GcColor::White {
                    let total_size = header.total_size();
                    self.bytes_allocated -= total_size;
                    self.num_objects -= 1;
                    self.cycle.bytes_freed += total_size;
                    self.cycle.objects_freed += 1;

                    free_object(header_ptr);
                } else {
                    header.set_color(GcColor::White);
                    header.set_next_object(None);
                    match self.survivors_tail {
                        Some(mut tail) => tail.as_mut().set_next_object(Some(header_ptr)),
                        None => self.survivors_head = Some(header_ptr),
                    }
                    self.survivors_tail = Some(header_ptr);
                }
            }
        }

        if self.sweep_current.is_none() {
            self.finish_sweep();
        }
    }

    fn finish_sweep(&mut self) {
        if let Some(mut tail) = self.survivors_tail.take() {
            unsafe { tail.as_mut().set_next_object(self.all_objects) };
            self.all_objects = self.survivors_head.take();
        }

        // Collect again once the live set has doubled
        self.gc_threshold = (self.bytes_allocated * 2).max(self.min_gc_threshold);

        self.phase = GcPhase::Idle;
        self.last_cycle = self.cycle;
        self.completed_cycles += 1;
    }

    #[inline]
    fn gray_header(&mut self, mut header: NonNull<GcHeader>) {
        unsafe {
            if header.as_ref().color() == GcColor::White {
                header.as_mut().set_color(GcColor::Gray);
                self.gray_queue.push(header);
            }
        }
    }
}

/// Destroy and deallocate one object
///
/// # Safety
/// `header_ptr` must be a live allocation that is no longer linked anywhere
unsafe fn free_object(header_ptr: NonNull<GcHeader>) {
    let header = header_ptr.as_ref();
    let layout = GcHeader::layout_for_size(header.alloc_size())
        .expect("layout was valid when the object was allocated");
    header.drop_object();
    alloc::alloc::dealloc(header_ptr.as_ptr() as *mut u8, layout);
}

/// Free every object on the list starting at `head`
///
/// # Safety
/// Every header on the list must be live and owned by the caller
unsafe fn free_list(head: Option<NonNull<GcHeader>>) {
    let mut current = head;
    while let Some(header_ptr) = current {
        current = header_ptr.as_ref().next_object();
        free_object(header_ptr);
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        unsafe {
            free_list(self.all_objects.take());
            free_list(self.sweep_current.take());
            free_list(self.survivors_head.take());
        }
        self.survivors_tail = None;
    }
}

// ============================================================================
// Marker - implements GcVisitor for the marking phase
// ============================================================================

/// The `GcVisitor` the collector passes to `Trace::trace` while marking.
pub struct Marker<'a> {
    gray_queue: &'a mut Vec<NonNull<GcHeader>>,
}

impl<'a> GcVisitor for Marker<'a> {
    fn visit<T>(&mut self, ptr: Gc<T>) {
        unsafe {
            let mut header = GcHeader::from_object_ptr(ptr.as_ptr());
            if header.as_ref().color() == GcColor::White {
                header.as_mut().set_color(GcColor::Gray);
                self.gray_queue.push(header);
            }
        }
    }
}
