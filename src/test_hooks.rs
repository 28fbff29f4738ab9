use crate::event_model::Event;
use crate::faults::FaultSource;
use parking_lot::Mutex;
use std::time::Duration;

/// Deterministic hook used to alter processor behaviour during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestHook {
    /// Fail the first `times` deliveries of `serial` before processing.
    FailBefore { serial: u64, times: u32 },
    /// Fail the first `times` deliveries of `serial` after the delay.
    FailAfter { serial: u64, times: u32 },
    /// Stall every delivery of `serial` for `delay_ms`.
    Delay { serial: u64, delay_ms: u64 },
}

/// Registry of active hooks, usable as a [`FaultSource`].
///
/// Failure hooks are consumed as they fire, so a scripted failure is followed
/// by a successful redelivery.
#[derive(Debug, Default)]
pub struct TestHookRegistry {
    hooks: Mutex<Vec<TestHook>>,
}

impl TestHookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with `hooks`.
    pub fn with_hooks(hooks: impl IntoIterator<Item = TestHook>) -> Self {
        Self {
            hooks: Mutex::new(hooks.into_iter().collect()),
        }
    }

    /// Registers a new hook.
    pub fn register(&self, hook: TestHook) {
        self.hooks.lock().push(hook);
    }

    /// Returns the hooks that have not fired yet, in registration order.
    pub fn hooks(&self) -> Vec<TestHook> {
        self.hooks.lock().clone()
    }

    fn consume(&self, matches: impl Fn(&TestHook) -> bool) -> bool {
        let mut hooks = self.hooks.lock();
        let Some(idx) = hooks.iter().position(|hook| matches(hook)) else {
            return false;
        };
        match &mut hooks[idx] {
            TestHook::FailBefore { times, .. } | TestHook::FailAfter { times, .. } => {
                *times = times.saturating_sub(1);
                if *times == 0 {
                    hooks.remove(idx);
                }
            }
            TestHook::Delay { .. } => {}
        }
        true
    }
}

impl FaultSource for TestHookRegistry {
    fn fail_before_processing(&self, event: &Event) -> bool {
        self.consume(|hook| {
            matches!(hook, TestHook::FailBefore { serial, times } if *serial == event.serial && *times > 0)
        })
    }

    fn processing_delay(&self, event: &Event) -> Duration {
        self.hooks
            .lock()
            .iter()
            .find_map(|hook| match hook {
                TestHook::Delay { serial, delay_ms } if *serial == event.serial => {
                    Some(Duration::from_millis(*delay_ms))
                }
                _ => None,
            })
            .unwrap_or(Duration::ZERO)
    }

    fn fail_after_processing(&self, event: &Event) -> bool {
        self.consume(|hook| {
            matches!(hook, TestHook::FailAfter { serial, times } if *serial == event.serial && *times > 0)
        })
    }
}
