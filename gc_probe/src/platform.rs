//! Process-wide platform collector
//!
//! The platform trigger is chosen once per process. Installing a collector
//! makes it a `DirectCollectorTrigger`; if nothing was installed by the time the
//! platform is first queried, it is fixed to `NullCollectorTrigger`. Either way
//! it never changes afterwards.

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::{
    error::{ProbeError, ProbeResult},
    options::ProbeOptions,
    orchestrator::GcProbe,
    trigger::{
        Collector, CollectorTrigger, DirectCollectorTrigger, NullCollectorTrigger,
        PlatformCapability,
    },
};

pub type PlatformTrigger = dyn CollectorTrigger + Send + Sync;

static PLATFORM: OnceCell<Box<PlatformTrigger>> = OnceCell::new();

/// Install the process-wide collector.
///
/// Fails with `ProbeError::AlreadyInstalled` if a collector was installed
/// before, or if the platform was already queried and fixed as unsupported.
pub fn install_collector<C>(collector: C) -> ProbeResult<()>
where
    C: Collector + Send + Sync + 'static,
{
    PLATFORM
        .set(Box::new(DirectCollectorTrigger::new(collector)))
        .map_err(|_| ProbeError::AlreadyInstalled)?;
    debug!("installed platform collector");
    Ok(())
}

/// The process-wide trigger
pub fn platform_trigger() -> &'static PlatformTrigger {
    &**PLATFORM
        .get_or_init(|| {
            debug!("no platform collector installed, direct triggering unsupported");
            Box::new(NullCollectorTrigger) as Box<PlatformTrigger>
        })
}

pub fn platform_capability() -> PlatformCapability {
    platform_trigger().capability()
}

/// Trigger a collection if the platform supports it, returning whether it does.
///
/// Usable outside any async context. The collection runs synchronously on the
/// calling thread.
pub fn force_collection_if_supported() -> bool {
    platform_trigger().trigger_collection()
}

/// Trigger a collection, failing with `ProbeError::Unsupported` on platforms
/// without a collection primitive.
pub fn force_collection() -> ProbeResult<()> {
    if force_collection_if_supported() {
        Ok(())
    } else {
        Err(ProbeError::Unsupported)
    }
}

/// Run `condition` through `GcProbe::try_to_achieve` against the platform trigger.
pub async fn try_to_achieve<F>(
    max_attempts: i64,
    pressure_size: i64,
    condition: F,
) -> ProbeResult<bool>
where
    F: FnMut() -> bool,
{
    let options = ProbeOptions {
        max_attempts,
        pressure_size,
        ..ProbeOptions::default()
    };
    try_to_achieve_with(options, condition).await
}

/// Like `try_to_achieve`, with every option under the caller's control.
pub async fn try_to_achieve_with<F>(options: ProbeOptions, condition: F) -> ProbeResult<bool>
where
    F: FnMut() -> bool,
{
    GcProbe::new(platform_trigger(), options)
        .try_to_achieve(condition)
        .await
}
