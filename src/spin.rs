/*!
 * Adaptive Spin Waiting
 *
 * Bounded three-phase backoff used on every contended fast path before
 * a thread commits to blocking: a short burst of pipeline-friendly spin
 * hints, then scheduler yields, then exponentially growing sleeps with
 * a hard cap.
 *
 * # Performance
 *
 * - Phase 1 keeps the waiting thread on-core for waits in the tens of
 *   nanoseconds
 * - Phase 2 gives up the core without giving up the time slice budget
 * - Phase 3 bounds CPU burn for waits that should have blocked
 */

use std::hint;
use std::thread;
use std::time::Duration;

/// Phase boundaries for [`SpinWait`].
#[derive(Debug, Clone, Copy)]
pub struct SpinConfig {
    /// Steps spent issuing `spin_loop` hints
    pub tight: u32,
    /// Steps spent yielding to the scheduler
    pub yields: u32,
    /// Total steps before `spin` reports the budget exhausted
    pub max_steps: u32,
    /// Ceiling for the phase-3 sleep
    pub max_sleep: Duration,
}

impl SpinConfig {
    pub const DEFAULT: SpinConfig = SpinConfig {
        tight: 10,
        yields: 50,
        max_steps: 100,
        max_sleep: Duration::from_millis(1),
    };
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One thread's position in the backoff schedule.
#[derive(Debug)]
pub struct SpinWait {
    step: u32,
    fired: bool,
    config: SpinConfig,
}

impl SpinWait {
    pub const fn new() -> Self {
        Self::with_config(SpinConfig::DEFAULT)
    }

    pub const fn with_config(config: SpinConfig) -> Self {
        Self {
            step: 0,
            fired: false,
            config,
        }
    }

    /// Perform one backoff step. Returns `false` once the budget is
    /// exhausted and the caller should block instead.
    pub fn spin(&mut self) -> bool {
        if self.step >= self.config.max_steps {
            return false;
        }
        self.step += 1;

        if self.step <= self.config.tight {
            hint::spin_loop();
        } else if self.step <= self.config.tight + self.config.yields {
            thread::yield_now();
        } else {
            let over = self.step - self.config.tight - self.config.yields;
            let sleep = Duration::from_micros(1u64 << over.min(10));
            thread::sleep(sleep.min(self.config.max_sleep));
        }
        true
    }

    /// True exactly once per `new`/`reset`, for work that should happen
    /// on the first pass through a retry loop and never again.
    pub fn once(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    /// Rewind to the start of the schedule.
    pub fn reset(&mut self) {
        self.step = 0;
        self.fired = false;
    }
}

impl Default for SpinWait {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausts() {
        let mut spin = SpinWait::with_config(SpinConfig {
            tight: 2,
            yields: 2,
            max_steps: 5,
            max_sleep: Duration::from_micros(10),
        });
        for _ in 0..5 {
            assert!(spin.spin());
        }
        assert!(!spin.spin());
        assert!(!spin.spin());
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut spin = SpinWait::with_config(SpinConfig {
            tight: 1,
            yields: 0,
            max_steps: 1,
            max_sleep: Duration::from_micros(10),
        });
        assert!(spin.spin());
        assert!(!spin.spin());
        spin.reset();
        assert!(spin.spin());
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let mut spin = SpinWait::new();
        assert!(spin.once());
        assert!(!spin.once());
        spin.reset();
        assert!(spin.once());
    }
}
