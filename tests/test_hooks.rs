use seqcheck::{Event, FaultSource, TestHook, TestHookRegistry};
use std::time::Duration;

#[test]
fn failure_hooks_fire_the_requested_number_of_times() {
    let registry = TestHookRegistry::new();
    registry.register(TestHook::FailBefore { serial: 4, times: 2 });
    let event = Event::generated(4);

    assert!(registry.fail_before_processing(&event));
    assert_eq!(
        registry.hooks(),
        vec![TestHook::FailBefore { serial: 4, times: 1 }]
    );
    assert!(registry.fail_before_processing(&event));
    assert!(!registry.fail_before_processing(&event));
    assert!(registry.hooks().is_empty());
}

#[test]
fn hooks_only_match_their_serial() {
    let registry = TestHookRegistry::with_hooks([
        TestHook::FailAfter { serial: 2, times: 1 },
        TestHook::Delay {
            serial: 3,
            delay_ms: 250,
        },
    ]);
    let other = Event::generated(9);
    assert!(!registry.fail_before_processing(&other));
    assert!(!registry.fail_after_processing(&other));
    assert_eq!(registry.processing_delay(&other), Duration::ZERO);

    assert!(registry.fail_after_processing(&Event::generated(2)));
    assert!(!registry.fail_after_processing(&Event::generated(2)));
}

#[test]
fn delay_hooks_persist_across_deliveries() {
    let registry = TestHookRegistry::with_hooks([TestHook::Delay {
        serial: 3,
        delay_ms: 250,
    }]);
    let event = Event::generated(3);
    for _ in 0..3 {
        assert_eq!(
            registry.processing_delay(&event),
            Duration::from_millis(250)
        );
    }
    assert_eq!(registry.hooks().len(), 1);
}
