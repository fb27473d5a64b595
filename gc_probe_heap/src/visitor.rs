//! Tracing traits
//!
//! - `Trace`: Implemented by every managed type, reports the `Gc` pointers it holds
//! - `GcVisitor`: Implemented by the collector's `Marker`, receives those pointers

use alloc::{boxed::Box, string::String, vec::Vec};
use core::cell::Cell;

use crate::Gc;

/// GC Visitor trait - implemented by the GC's marking logic
pub trait GcVisitor {
    /// Visit a strongly held pointer. Marks the target gray if it is still white.
    fn visit<T>(&mut self, ptr: Gc<T>);

    /// Visit an optional strongly held pointer
    #[inline]
    fn visit_opt<T>(&mut self, ptr: Option<Gc<T>>) {
        if let Some(p) = ptr {
            self.visit(p);
        }
    }
}

/// Types that can live in the managed heap.
///
/// Implementations must report every `Gc` pointer they hold, otherwise the
/// target may be freed while still referenced.
///
/// # Example
/// ```ignore
/// struct Node {
///     value: u64,
///     next: Option<Gc<Node>>,
/// }
///
/// impl Trace for Node {
///     fn trace<V: GcVisitor>(&self, visitor: &mut V) {
///         visitor.visit_opt(self.next);
///     }
/// }
/// ```
pub trait Trace {
    fn trace<V: GcVisitor>(&self, visitor: &mut V);
}

macro_rules! leaf_trace {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Trace for $ty {
                #[inline]
                fn trace<V: GcVisitor>(&self, _: &mut V) {}
            }
        )*
    };
}

leaf_trace!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
);

impl<T> Trace for Gc<T> {
    #[inline]
    fn trace<V: GcVisitor>(&self, visitor: &mut V) {
        visitor.visit(*self);
    }
}

impl<T: Trace> Trace for Option<T> {
    #[inline]
    fn trace<V: GcVisitor>(&self, visitor: &mut V) {
        if let Some(value) = self {
            value.trace(visitor);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace<V: GcVisitor>(&self, visitor: &mut V) {
        for value in self {
            value.trace(visitor);
        }
    }
}

/// Lets managed objects hold mutable edges, which is the only way to build cycles.
impl<T: Copy + Trace> Trace for Cell<T> {
    #[inline]
    fn trace<V: GcVisitor>(&self, visitor: &mut V) {
        self.get().trace(visitor);
    }
}

impl<T: Trace> Trace for Box<T> {
    #[inline]
    fn trace<V: GcVisitor>(&self, visitor: &mut V) {
        (**self).trace(visitor);
    }
}
