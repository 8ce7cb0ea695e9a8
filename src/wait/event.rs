/*!
 * Per-Primitive Event Backend
 *
 * A private lock + condition pair owned by the primitive itself,
 * created lazily through the init-once cell the first time a thread
 * actually blocks. Wakers take the event lock before notifying, and
 * waiters re-check the state word after taking it, which closes the
 * wake-after-unlock window without help from the kernel.
 */

use crate::clock::Deadline;
use crate::errors::LazyInitError;
use crate::order::MemOrder;
use crate::raw::{RawAtom, RawU32};
use super::{WaitOutcome, WakeResult};
use parking_lot::{Condvar, Mutex};

pub(crate) struct WaitEvent {
    lock: Mutex<()>,
    cond: Condvar,
}

impl WaitEvent {
    pub(crate) fn try_new() -> Result<Self, LazyInitError> {
        Ok(Self {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        })
    }

    pub(crate) fn wait(
        &self,
        word: &RawU32,
        expected: u32,
        deadline: Option<Deadline>,
    ) -> WaitOutcome {
        let mut guard = self.lock.lock();
        // a wake that fired before we took the lock has already changed
        // the word; sleeping now would miss it
        if word.get(MemOrder::Acquire) != expected {
            return WaitOutcome::Woken;
        }
        match deadline {
            Some(d) => {
                if d.has_passed() {
                    return WaitOutcome::TimedOut;
                }
                if self.cond.wait_until(&mut guard, d.instant()).timed_out() {
                    WaitOutcome::TimedOut
                } else {
                    WaitOutcome::Woken
                }
            }
            None => {
                self.cond.wait(&mut guard);
                WaitOutcome::Woken
            }
        }
    }

    pub(crate) fn wake_one(&self) -> WakeResult {
        let _guard = self.lock.lock();
        if self.cond.notify_one() {
            WakeResult::Woken(1)
        } else {
            WakeResult::NoWaiters
        }
    }

    pub(crate) fn wake_all(&self) -> WakeResult {
        let _guard = self.lock.lock();
        let woken = self.cond.notify_all();
        if woken > 0 {
            WakeResult::Woken(woken)
        } else {
            WakeResult::NoWaiters
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_changed_word_short_circuits() {
        let ev = WaitEvent::try_new().unwrap();
        let word = RawU32::new(3);
        assert_eq!(
            ev.wait(&word, 0, Some(Deadline::after(Duration::from_secs(1)))),
            WaitOutcome::Woken
        );
    }

    #[test]
    fn test_wake_one() {
        let ev = Arc::new(WaitEvent::try_new().unwrap());
        let word = Arc::new(RawU32::new(0));

        let ev2 = ev.clone();
        let word2 = word.clone();
        let waiter = thread::spawn(move || {
            ev2.wait(&word2, 0, Some(Deadline::after(Duration::from_secs(5))))
        });

        thread::sleep(Duration::from_millis(50));
        word.set(1, MemOrder::Release);
        assert_eq!(ev.wake_one(), WakeResult::Woken(1));
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Woken);
    }

    #[test]
    fn test_timeout() {
        let ev = WaitEvent::try_new().unwrap();
        let word = RawU32::new(0);
        assert_eq!(
            ev.wait(&word, 0, Some(Deadline::after(Duration::from_millis(50)))),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn test_wake_with_no_waiters() {
        let ev = WaitEvent::try_new().unwrap();
        assert_eq!(ev.wake_one(), WakeResult::NoWaiters);
        assert_eq!(ev.wake_all(), WakeResult::NoWaiters);
    }
}
