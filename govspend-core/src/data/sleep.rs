//! Sleep abstraction for backoff, pacing and cooldown pauses.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

/// Something that can block the current thread for a duration.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Sleeper that records requested durations instead of waiting.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration requested so far, in call order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.recorded().into_iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Uniform random jitter in `[0, max_secs]`.
pub fn jitter(max_secs: f64) -> Duration {
    if max_secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=max_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sleeper_keeps_order() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(2));
        sleeper.sleep(Duration::from_millis(500));
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(2), Duration::from_millis(500)]
        );
        assert_eq!(sleeper.total(), Duration::from_millis(2500));
    }

    #[test]
    fn jitter_respects_cap() {
        assert_eq!(jitter(0.0), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(0.8) <= Duration::from_secs_f64(0.8));
        }
    }
}
