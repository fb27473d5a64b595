//! Managed heap for gc_probe
//!
//! An incremental tri-color mark-sweep garbage collector with strong roots and
//! weak references. It is the host runtime that `gc_probe` triggers
//! collections against.
//!
//! Key types:
//! - `Gc<T>`: A pointer to a GC-managed object
//! - `WeakRef<T>`: A weak reference that is cleared once its target is unreachable
//! - `GcHeader`: Header prepended to each allocation
//! - `Heap`: The managed heap
//!
//! Key traits:
//! - `Trace`: Implemented by managed types to report the pointers they hold
//! - `GcVisitor`: Implemented by the collector's marker, receives those pointers

#![no_std]
extern crate alloc;

mod gc_header;
mod heap;
mod pointer;
mod visitor;

pub use gc_header::{GcColor, GcHeader, GcPhase};
pub use heap::{AllocError, AllocResult, CollectionStats, Heap, Marker, DEFAULT_GC_THRESHOLD};
pub use pointer::{Gc, WeakRef};
pub use visitor::{GcVisitor, Trace};

#[cfg(test)]
mod tests;
