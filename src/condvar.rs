/*!
 * Condition Variable
 *
 * Epoch-based condvar paired with [`Mutex`]. A waiter reads the notify
 * epoch while it still holds the mutex, releases the mutex, and then
 * blocks only while the epoch is unchanged. Wakers bump the epoch
 * before waking, so a notification issued in the gap between unlock
 * and block changes the expected value and the backend refuses the
 * sleep. That is the whole lost-wakeup argument; there is no waiter
 * list to maintain.
 */

use crate::clock::Deadline;
use crate::mutex::{MutexGuard, RawMutex};
use crate::order::MemOrder;
use crate::raw::{RawAtom, RawU32, RawUsize};
use crate::wait::{BackendKind, Needs, WaitCell, WakeResult};
use std::fmt;

const CONDVAR_NEEDS: Needs = Needs::TIMEOUT.union(Needs::CONST_INIT);

/// Whether a timed wait returned because of its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeoutResult(bool);

impl WaitTimeoutResult {
    pub fn timed_out(&self) -> bool {
        self.0
    }
}

pub struct Condvar {
    epoch: RawU32,
    waiters: WaitCell,
    // address of the paired mutex; debug pairing check only
    owner: RawUsize,
}

impl Condvar {
    pub const fn new() -> Self {
        Self::with_backend(BackendKind::select_checked(CONDVAR_NEEDS))
    }

    pub const fn with_backend(kind: BackendKind) -> Self {
        Self {
            epoch: RawU32::new(0),
            waiters: WaitCell::with_kind(kind),
            owner: RawUsize::new(0),
        }
    }

    /// Atomically release the mutex and block until notified. Spurious
    /// wakeups reach the caller; loop over a predicate, or use
    /// [`wait_while`](Self::wait_while).
    pub fn wait<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>) {
        self.wait_inner(guard.raw(), None);
    }

    /// As [`wait`](Self::wait) with a deadline. The mutex is re-held on
    /// return either way.
    pub fn wait_deadline<T: ?Sized>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        deadline: Deadline,
    ) -> WaitTimeoutResult {
        WaitTimeoutResult(self.wait_inner(guard.raw(), Some(deadline)))
    }

    /// Block until `condition` returns false, tolerating spurious
    /// wakeups internally.
    pub fn wait_while<T: ?Sized, F>(&self, guard: &mut MutexGuard<'_, T>, mut condition: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            self.wait(guard);
        }
    }

    /// As [`wait_while`](Self::wait_while) with a deadline. Reports a
    /// timeout with the condition possibly still true.
    pub fn wait_while_deadline<T: ?Sized, F>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        deadline: Deadline,
        mut condition: F,
    ) -> WaitTimeoutResult
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            if self.wait_deadline(guard, deadline).timed_out() {
                return WaitTimeoutResult(true);
            }
        }
        WaitTimeoutResult(false)
    }

    fn wait_inner(&self, raw: &RawMutex, deadline: Option<Deadline>) -> bool {
        self.check_pairing(raw);
        // the epoch must be read before the unlock; reading it after
        // would reopen the missed-notification window
        let epoch = self.epoch.get(MemOrder::None);
        raw.unlock();
        let outcome = self.waiters.wait(&self.epoch, epoch, deadline);
        raw.lock();
        outcome.timed_out()
    }

    fn check_pairing(&self, raw: &RawMutex) {
        if cfg!(debug_assertions) {
            let addr = raw as *const RawMutex as usize;
            if !self.owner.compare_set(0, addr, MemOrder::None) {
                debug_assert_eq!(
                    self.owner.get(MemOrder::None),
                    addr,
                    "condvar used with a second mutex"
                );
            }
        }
    }

    /// Wake one waiter, if any.
    pub fn wake_one(&self) -> WakeResult {
        self.epoch.get_add1(MemOrder::Release);
        self.waiters.wake_one(&self.epoch)
    }

    /// Wake every current waiter.
    pub fn wake_all(&self) -> WakeResult {
        self.epoch.get_add1(MemOrder::Release);
        self.waiters.wake_all(&self.epoch)
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar")
            .field("backend", &self.waiters.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::Mutex;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wake_one_releases_a_waiter() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let pair2 = pair.clone();

        let waiter = thread::spawn(move || {
            let (lock, cv) = &*pair2;
            let mut ready = lock.lock();
            cv.wait_while(&mut ready, |ready| !*ready);
            *ready
        });

        thread::sleep(Duration::from_millis(50));
        {
            let (lock, cv) = &*pair;
            *lock.lock() = true;
            cv.wake_one();
        }

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_deadline_expires() {
        let lock = Mutex::new(());
        let cv = Condvar::new();
        let mut guard = lock.lock();
        let result = cv.wait_deadline(&mut guard, Deadline::after(Duration::from_millis(50)));
        assert!(result.timed_out());
        // the mutex is re-held: releasing it must still work
        drop(guard);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_notify_before_wait_is_not_consumed_later() {
        let lock = Mutex::new(());
        let cv = Condvar::new();
        cv.wake_one();
        let mut guard = lock.lock();
        // only the deadline ends this wait
        let result = cv.wait_deadline(&mut guard, Deadline::after(Duration::from_millis(50)));
        assert!(result.timed_out());
    }
}
