//! Collector triggers
//!
//! A `CollectorTrigger` asks the host collector for an immediate collection,
//! and reports whether doing so means anything on this platform. There are
//! exactly two implementations: `DirectCollectorTrigger`, which forwards to a
//! `Collector`, and `NullCollectorTrigger`, which does nothing.
//!
//! A direct trigger runs the collection synchronously on the calling thread, so
//! it may pause the caller (and any task sharing its scheduler) for as long as
//! the collection takes.

use std::{cell::RefCell, rc::Rc, sync::Arc};

use gc_probe_heap::Heap;
use tracing::{debug, warn};

/// Whether collection can be triggered directly. Fixed for the lifetime of a trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformCapability {
    DirectTriggerSupported,
    DirectTriggerUnsupported,
}

impl PlatformCapability {
    #[inline]
    pub fn is_supported(self) -> bool {
        self == PlatformCapability::DirectTriggerSupported
    }
}

/// The request-collection primitive of a host runtime.
pub trait Collector {
    /// Request a collection pass. Offers no guarantee that anything is reclaimed.
    fn request_collection(&self);
}

/// A `Collector` backed by a closure.
pub struct FnCollector<F>(F);

impl<F: Fn()> FnCollector<F> {
    pub fn new(collect: F) -> Self {
        FnCollector(collect)
    }
}

impl<F: Fn()> Collector for FnCollector<F> {
    #[inline]
    fn request_collection(&self) {
        (self.0)()
    }
}

impl Collector for RefCell<Heap> {
    fn request_collection(&self) {
        // Skipped rather than panicking when the caller holds a borrow across the trigger
        match self.try_borrow_mut() {
            Ok(mut heap) => {
                let stats = heap.collect();
                debug!(
                    objects_freed = stats.objects_freed,
                    bytes_freed = stats.bytes_freed,
                    weak_refs_cleared = stats.weak_refs_cleared,
                    "heap collected"
                );
            }
            Err(_) => warn!("heap is borrowed, skipping requested collection"),
        }
    }
}

impl<C: Collector + ?Sized> Collector for &C {
    #[inline]
    fn request_collection(&self) {
        (**self).request_collection()
    }
}

impl<C: Collector + ?Sized> Collector for Rc<C> {
    #[inline]
    fn request_collection(&self) {
        (**self).request_collection()
    }
}

impl<C: Collector + ?Sized> Collector for Arc<C> {
    #[inline]
    fn request_collection(&self) {
        (**self).request_collection()
    }
}

pub trait CollectorTrigger {
    /// Report what `trigger_collection` would do, without triggering.
    fn capability(&self) -> PlatformCapability;

    /// Request an immediate collection if the platform supports it.
    ///
    /// Returns whether the request was supported. Never fails: an unsupported
    /// platform is an expected outcome.
    fn trigger_collection(&self) -> bool;
}

impl<T: CollectorTrigger + ?Sized> CollectorTrigger for &T {
    #[inline]
    fn capability(&self) -> PlatformCapability {
        (**self).capability()
    }

    #[inline]
    fn trigger_collection(&self) -> bool {
        (**self).trigger_collection()
    }
}

impl<T: CollectorTrigger + ?Sized> CollectorTrigger for Box<T> {
    #[inline]
    fn capability(&self) -> PlatformCapability {
        (**self).capability()
    }

    #[inline]
    fn trigger_collection(&self) -> bool {
        (**self).trigger_collection()
    }
}

/// Triggers collection through a `Collector`.
pub struct DirectCollectorTrigger<C> {
    collector: C,
}

impl<C: Collector> DirectCollectorTrigger<C> {
    pub fn new(collector: C) -> Self {
        DirectCollectorTrigger { collector }
    }
}

impl<F: Fn()> DirectCollectorTrigger<FnCollector<F>> {
    pub fn from_fn(collect: F) -> Self {
        DirectCollectorTrigger::new(FnCollector::new(collect))
    }
}

impl<C: Collector> CollectorTrigger for DirectCollectorTrigger<C> {
    #[inline]
    fn capability(&self) -> PlatformCapability {
        PlatformCapability::DirectTriggerSupported
    }

    fn trigger_collection(&self) -> bool {
        debug!("requesting collection");
        self.collector.request_collection();
        true
    }
}

/// Trigger for platforms without a collection primitive.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCollectorTrigger;

impl CollectorTrigger for NullCollectorTrigger {
    #[inline]
    fn capability(&self) -> PlatformCapability {
        PlatformCapability::DirectTriggerUnsupported
    }

    #[inline]
    fn trigger_collection(&self) -> bool {
        false
    }
}
