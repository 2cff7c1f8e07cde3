use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

pub mod error_handle;
pub mod random;

/// Wall-clock source in milliseconds since the unix epoch.
pub trait Timer: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Clone, Default)]
pub struct SystemTimer();

impl Timer for SystemTimer {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}

/// Manually driven clock for tests.
#[derive(Default)]
pub struct MockTimer {
    now_ms: AtomicU64,
}

impl MockTimer {
    pub fn fake(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn forward(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Timer for MockTimer {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::{MockTimer, SystemTimer, Timer};

    #[test]
    fn mock_timer_should_be_driven_manually() {
        let timer = MockTimer::default();
        assert_eq!(timer.now_ms(), 0);
        timer.fake(1000);
        assert_eq!(timer.now_ms(), 1000);
        timer.forward(5);
        assert_eq!(timer.now_ms(), 1005);
    }

    #[test]
    fn system_timer_should_be_after_2019() {
        assert!(SystemTimer().now_ms() > 1_546_300_800_000);
    }
}
