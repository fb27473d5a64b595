//! The platform collector is process-wide and fixed on first use, so each
//! platform scenario runs as its own test binary.

use gc_probe::{
    force_collection, force_collection_if_supported, install_collector, platform_capability,
    try_to_achieve, FnCollector, PlatformCapability, ProbeError,
};

#[tokio::test(start_paused = true)]
async fn platform_without_collector() {
    assert_eq!(
        platform_capability(),
        PlatformCapability::DirectTriggerUnsupported
    );
    assert!(!force_collection_if_supported());
    assert_eq!(force_collection(), Err(ProbeError::Unsupported));

    // Fixed as unsupported once queried
    assert_eq!(
        install_collector(FnCollector::new(|| {})),
        Err(ProbeError::AlreadyInstalled)
    );

    let mut evaluations = 0;
    let achieved = try_to_achieve(5, 0, || {
        evaluations += 1;
        false
    })
    .await;
    assert_eq!(achieved, Ok(false));
    assert_eq!(evaluations, 5);

    let mut evaluations = 0;
    let result = try_to_achieve(1, 0, || {
        evaluations += 1;
        true
    })
    .await;
    assert_eq!(result, Err(ProbeError::InvalidMaxAttempts(1)));
    assert_eq!(evaluations, 0);
}
