/*!
 * Spin Backend
 *
 * No OS involvement at all: waiters poll the state word through the
 * adaptive backoff schedule, falling to a fixed idle sleep once the
 * schedule is exhausted. Wakes are free because waiters notice the
 * word change themselves.
 */

use crate::clock::Deadline;
use crate::order::MemOrder;
use crate::raw::{RawAtom, RawU32};
use crate::spin::SpinWait;
use super::{WaitOutcome, WakeResult};
use std::thread;
use std::time::Duration;

const IDLE_SLEEP: Duration = Duration::from_micros(100);

pub(super) fn wait(word: &RawU32, expected: u32, deadline: Option<Deadline>) -> WaitOutcome {
    let mut spin = SpinWait::new();
    loop {
        if word.get(MemOrder::Acquire) != expected {
            return WaitOutcome::Woken;
        }
        if let Some(d) = &deadline {
            if d.has_passed() {
                return WaitOutcome::TimedOut;
            }
        }
        if !spin.spin() {
            thread::sleep(IDLE_SLEEP);
        }
    }
}

pub(super) fn wake(_word: &RawU32) -> WakeResult {
    // pollers wake themselves; there is nobody to count
    WakeResult::NoWaiters
}
