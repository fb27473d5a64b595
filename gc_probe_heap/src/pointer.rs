//! Managed pointer types
//!
//! `Gc<T>` is a pointer to a managed object. It does not keep its target alive:
//! an object survives a collection only while it is rooted (`Heap::root`) or
//! reachable from a rooted object. `WeakRef<T>` names a weak slot owned by the
//! heap, which is cleared once the target is found unreachable.

use core::{marker::PhantomData, ops::Deref, ptr::NonNull};

/// A pointer to a GC-managed object.
///
/// # Safety
/// - Must not be dereferenced after a collection that could have freed the
///   target, unless the target is rooted or reachable from a root
/// - The pointed-to object must have a `GcHeader` immediately before it
#[repr(transparent)]
pub struct Gc<T> {
    ptr: NonNull<T>,
}

impl<T> Gc<T> {
    #[inline]
    pub const fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Create from a raw pointer
    ///
    /// # Safety
    /// The pointer must be non-null and point to an object allocated by a `Heap`
    #[inline]
    pub const unsafe fn from_ptr(ptr: *mut T) -> Gc<T> {
        Gc {
            ptr: NonNull::new_unchecked(ptr),
        }
    }

    #[inline]
    pub(crate) const fn from_non_null(ptr: NonNull<T>) -> Gc<T> {
        Gc { ptr }
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }

}

impl<T> Clone for Gc<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Gc<T> {}

impl<T> PartialEq for Gc<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Gc<T> {}

impl<T> Deref for Gc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> core::fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Gc({:p})", self.ptr)
    }
}

impl<T> core::fmt::Pointer for Gc<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Pointer::fmt(&self.ptr, f)
    }
}

/// A weak reference to a managed object.
///
/// Only meaningful together with the heap that created it. Resolve it with
/// `Heap::upgrade`.
pub struct WeakRef<T> {
    slot: usize,
    generation: u32,
    _marker: PhantomData<*const T>,
}

impl<T> WeakRef<T> {
    #[inline]
    pub(crate) const fn new(slot: usize, generation: u32) -> WeakRef<T> {
        WeakRef {
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for WeakRef<T> {
    #[inline]
    fn clone(&self) -> Self {
        WeakRef::new(self.slot, self.generation)
    }
}

impl<T> core::fmt::Debug for WeakRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "WeakRef(#{}@{})", self.slot, self.generation)
    }
}
