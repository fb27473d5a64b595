//! The platform collector is process-wide and fixed on first use, so each
//! platform scenario runs as its own test binary.

use std::cell::RefCell;

use gc_probe::{
    force_collection, force_collection_if_supported, install_collector, platform_capability,
    try_to_achieve, Collector, FnCollector, PlatformCapability, ProbeError,
};
use gc_probe_heap::Heap;

thread_local! {
    static HEAP: RefCell<Heap> = RefCell::new(Heap::new());
}

fn collect_thread_heap() {
    HEAP.with(|heap| heap.request_collection());
}

#[tokio::test]
async fn platform_with_heap_collector() {
    install_collector(FnCollector::new(collect_thread_heap)).unwrap();
    assert_eq!(
        install_collector(FnCollector::new(|| {})),
        Err(ProbeError::AlreadyInstalled)
    );
    assert_eq!(
        platform_capability(),
        PlatformCapability::DirectTriggerSupported
    );

    let weak = HEAP.with(|heap| {
        let mut heap = heap.borrow_mut();
        let object = heap.alloc(vec![1u64, 2, 3]).unwrap();
        heap.downgrade(object)
    });

    let mut evaluations = 0;
    let achieved = try_to_achieve(9, 0, || {
        evaluations += 1;
        HEAP.with(|heap| heap.borrow().is_cleared(&weak))
    })
    .await;
    assert_eq!(achieved, Ok(true));
    assert_eq!(evaluations, 2);

    assert!(force_collection_if_supported());
    assert_eq!(force_collection(), Ok(()));
    assert_eq!(HEAP.with(|heap| heap.borrow().completed_cycles()), 3);
}
