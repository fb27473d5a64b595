//! gc_probe
//!
//! Helpers for tests that need to observe collection-dependent outcomes, such
//! as "was this weakly held object reclaimed?", even though collectors run when
//! they please.
//!
//! - `force_collection_if_supported` triggers a collection directly when the
//!   platform has a collector installed.
//! - `try_to_achieve` evaluates a condition a bounded number of times, trying
//!   to get the collector to run in between: directly where supported,
//!   otherwise by suspending and allocating throwaway data.
//!
//! These are testing aids. Nothing here guarantees that anything is collected,
//! so a `false` result means "could not be confirmed", not a failure.
//!
//! ```ignore
//! let heap = Rc::new(RefCell::new(Heap::new()));
//! let weak = { /* allocate, downgrade, drop every root */ };
//!
//! let mut probe = GcProbe::new(DirectCollectorTrigger::new(heap.clone()), ProbeOptions::default());
//! assert!(probe.try_to_achieve(|| heap.borrow().is_cleared(&weak)).await?);
//! ```

mod error;
mod options;
mod orchestrator;
mod platform;
mod pressure;
mod trigger;

pub use error::{ProbeError, ProbeResult};
pub use options::{
    ProbeOptions, ProbeOptionsBuilder, DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_PRESSURE_SIZE,
};
pub use orchestrator::GcProbe;
pub use platform::{
    force_collection, force_collection_if_supported, install_collector, platform_capability,
    platform_trigger, try_to_achieve, try_to_achieve_with, PlatformTrigger,
};
pub use pressure::{ChurnBuffer, HeapPressure, MemoryPressure};
pub use trigger::{
    Collector, CollectorTrigger, DirectCollectorTrigger, FnCollector, NullCollectorTrigger,
    PlatformCapability,
};
