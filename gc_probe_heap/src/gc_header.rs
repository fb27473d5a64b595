//! GC Header for tri-color marking
//!
//! Every managed object has a GcHeader prepended to it.
//! Layout: | GcHeader | object data ... |
//!
//! Besides the mark color, the header carries the object's root count and the
//! type-erased functions the collector needs to trace and destroy the object.

use core::{alloc::Layout, ptr::NonNull};

use crate::{heap::Marker, visitor::Trace};

/// The three colors used in tri-color marking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum GcColor {
    /// Not yet reached. Collected if still white once marking completes.
    #[default]
    White = 0,
    /// Reached, children not yet scanned
    Gray = 1,
    /// Reached and all children scanned
    Black = 2,
}

/// Phase of an incremental collection cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GcPhase {
    /// No cycle in progress
    #[default]
    Idle,
    /// Graying every rooted object
    RootScanning,
    /// Draining the gray queue
    Marking,
    /// Clearing weak references whose targets stayed white
    WeakRefProcessing,
    /// Freeing white objects
    Sweeping,
}

type TraceFn = unsafe fn(*mut u8, &mut Marker<'_>);
type DropFn = unsafe fn(*mut u8);

/// Header prepended to every managed object
#[repr(C)]
pub struct GcHeader {
    color: GcColor,
    _padding: [u8; 3],
    /// Number of outstanding `Heap::root` calls for this object
    root_count: u32,
    /// Size of the object, not including the header
    alloc_size: usize,
    trace: TraceFn,
    drop: DropFn,
    /// Next object in whichever object list this header is linked into
    next_object: Option<NonNull<GcHeader>>,
}

impl GcHeader {
    /// Size of the GC header. Always a multiple of `ALIGN`.
    pub const SIZE: usize = core::mem::size_of::<GcHeader>();

    /// Alignment of every allocation. Types with a larger alignment are rejected.
    pub const ALIGN: usize = 8;

    /// Create the header for an object of type `T`
    #[inline]
    pub fn new_for<T: Trace>(alloc_size: usize) -> GcHeader {
        GcHeader {
            color: GcColor::White,
            _padding: [0; 3],
            root_count: 0,
            alloc_size,
            trace: trace_erased::<T>,
            drop: drop_erased::<T>,
            next_object: None,
        }
    }

    #[inline]
    pub fn color(&self) -> GcColor {
        self.color
    }

    #[inline]
    pub fn set_color(&mut self, color: GcColor) {
        self.color = color;
    }

    #[inline]
    pub fn root_count(&self) -> u32 {
        self.root_count
    }

    #[inline]
    pub fn is_rooted(&self) -> bool {
        self.root_count > 0
    }

    #[inline]
    pub(crate) fn increment_roots(&mut self) {
        self.root_count = self.root_count.saturating_add(1);
    }

    /// Returns false if the object was not rooted
    #[inline]
    pub(crate) fn decrement_roots(&mut self) -> bool {
        if self.root_count == 0 {
            return false;
        }
        self.root_count -= 1;
        true
    }

    /// Get the object allocation size (not including header)
    #[inline]
    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }

    /// Get the total allocation size (including header)
    #[inline]
    pub fn total_size(&self) -> usize {
        Self::SIZE + self.alloc_size
    }

    #[inline]
    pub fn next_object(&self) -> Option<NonNull<GcHeader>> {
        self.next_object
    }

    #[inline]
    pub fn set_next_object(&mut self, next: Option<NonNull<GcHeader>>) {
        self.next_object = next;
    }

    /// Get a pointer to the object data (immediately after the header)
    #[inline]
    pub fn object_ptr(&self) -> *mut u8 {
        unsafe { (self as *const GcHeader as *mut u8).add(Self::SIZE) }
    }

    /// Get the GcHeader from an object pointer
    ///
    /// # Safety
    /// The object_ptr must point to a live object allocated by a `Heap`
    #[inline]
    pub unsafe fn from_object_ptr<T>(object_ptr: *const T) -> NonNull<GcHeader> {
        let header_ptr = (object_ptr as *mut u8).sub(Self::SIZE) as *mut GcHeader;
        NonNull::new_unchecked(header_ptr)
    }

    /// Report the object's outgoing pointers to the marker
    ///
    /// # Safety
    /// The object following this header must be initialized
    #[inline]
    pub(crate) unsafe fn trace_object(&self, marker: &mut Marker<'_>) {
        (self.trace)(self.object_ptr(), marker)
    }

    /// Run the object's destructor in place
    ///
    /// # Safety
    /// The object must be initialized and must not be used afterwards
    #[inline]
    pub(crate) unsafe fn drop_object(&self) {
        (self.drop)(self.object_ptr())
    }

    /// Get the layout for an allocation of the given size, or None on overflow
    #[inline]
    pub fn layout_for_size(size: usize) -> Option<Layout> {
        let total_size = Self::SIZE.checked_add(align_up(size, Self::ALIGN)?)?;
        Layout::from_size_align(total_size, Self::ALIGN).ok()
    }

    /// Check if this object is marked (gray or black)
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.color != GcColor::White
    }

    /// Check if this object needs scanning (is gray)
    #[inline]
    pub fn needs_scanning(&self) -> bool {
        self.color == GcColor::Gray
    }
}

unsafe fn trace_erased<T: Trace>(object_ptr: *mut u8, marker: &mut Marker<'_>) {
    (*(object_ptr as *const T)).trace(marker);
}

unsafe fn drop_erased<T>(object_ptr: *mut u8) {
    core::ptr::drop_in_place(object_ptr as *mut T);
}

#[inline]
fn align_up(value: usize, align: usize) -> Option<usize> {
    Some(value.checked_add(align - 1)? & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_header_size() {
        assert_eq!(GcHeader::SIZE % GcHeader::ALIGN, 0);
    }

    #[test]
    fn test_gc_header_color() {
        let mut header = GcHeader::new_for::<u64>(8);
        assert_eq!(header.color(), GcColor::White);

        header.set_color(GcColor::Gray);
        assert!(header.needs_scanning());

        header.set_color(GcColor::Black);
        assert!(header.is_marked());
        assert!(!header.needs_scanning());
    }

    #[test]
    fn test_gc_header_root_count() {
        let mut header = GcHeader::new_for::<u64>(8);
        assert!(!header.is_rooted());
        assert!(!header.decrement_roots());

        header.increment_roots();
        header.increment_roots();
        assert_eq!(header.root_count(), 2);
        assert!(header.decrement_roots());
        assert!(header.is_rooted());
    }

    #[test]
    fn test_layout_rounds_up_to_alignment() {
        let layout = GcHeader::layout_for_size(3).unwrap();
        assert_eq!(layout.size(), GcHeader::SIZE + 8);
        assert_eq!(layout.align(), GcHeader::ALIGN);
        assert!(GcHeader::layout_for_size(usize::MAX).is_none());
    }
}
