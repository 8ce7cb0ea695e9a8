/*!
 * Counting Semaphore
 *
 * Permits and waiter count packed into one 64-bit word so that "take a
 * permit" and "register as a waiter because there are none" are each a
 * single CAS against consistent state. A separate 32-bit epoch word is
 * what waiters actually block on: `up` bumps it after publishing
 * permits, so a permit posted between a waiter's registration and its
 * sleep changes the expected value and the sleep is refused.
 */

use crate::clock::Deadline;
use crate::order::MemOrder;
use crate::raw::{RawAtom, RawU32, RawU64};
use crate::wait::{BackendKind, Needs, WaitCell};
use std::fmt;

const SEM_NEEDS: Needs = Needs::TIMEOUT.union(Needs::CONST_INIT);

const fn pack(permits: u32, waiters: u32) -> u64 {
    ((waiters as u64) << 32) | permits as u64
}

const fn permits_of(state: u64) -> u32 {
    state as u32
}

const fn waiters_of(state: u64) -> u32 {
    (state >> 32) as u32
}

pub struct Semaphore {
    state: RawU64,
    epoch: RawU32,
    waiters: WaitCell,
}

impl Semaphore {
    pub const fn new(permits: u32) -> Self {
        Self::with_backend(permits, BackendKind::select_checked(SEM_NEEDS))
    }

    pub const fn with_backend(permits: u32, kind: BackendKind) -> Self {
        Self {
            state: RawU64::new(pack(permits, 0)),
            epoch: RawU32::new(0),
            waiters: WaitCell::with_kind(kind),
        }
    }

    /// Release `n` permits and wake up to `n` waiters.
    pub fn up(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut s = self.state.get(MemOrder::None);
        loop {
            let permits = permits_of(s);
            debug_assert!(
                permits.checked_add(n).is_some(),
                "semaphore permit count overflow"
            );
            let next = pack(permits.wrapping_add(n), waiters_of(s));
            let seen = self.state.get_compare_set(s, next, MemOrder::Release);
            if seen == s {
                break;
            }
            s = seen;
        }

        let waiting = waiters_of(s);
        if waiting > 0 {
            self.epoch.get_add1(MemOrder::Release);
            if n >= waiting {
                self.waiters.wake_all(&self.epoch);
            } else {
                for _ in 0..n {
                    self.waiters.wake_one(&self.epoch);
                }
            }
        }
    }

    /// Take a permit if one is available right now; a single CAS retry
    /// loop, never a block.
    pub fn try_down(&self) -> bool {
        let mut s = self.state.get(MemOrder::None);
        while permits_of(s) > 0 {
            let next = pack(permits_of(s) - 1, waiters_of(s));
            let seen = self.state.get_compare_set(s, next, MemOrder::Acquire);
            if seen == s {
                return true;
            }
            s = seen;
        }
        false
    }

    /// Take a permit, blocking until one is released.
    pub fn down(&self) {
        let acquired = self.down_inner(None);
        debug_assert!(acquired);
    }

    /// Take a permit before the deadline, or return false.
    pub fn down_deadline(&self, deadline: Deadline) -> bool {
        self.down_inner(Some(deadline))
    }

    fn down_inner(&self, deadline: Option<Deadline>) -> bool {
        loop {
            if self.try_down() {
                return true;
            }

            if !self.register_waiter() {
                // a permit appeared while registering; take it next pass
                continue;
            }
            let epoch = self.epoch.get(MemOrder::None);
            // an up() that lands after registration sees our waiter slot
            // and bumps the epoch before waking, so this re-check plus
            // the expected-value sleep cannot miss it
            let timed_out = permits_of(self.state.get(MemOrder::Acquire)) == 0
                && self
                    .waiters
                    .wait(&self.epoch, epoch, deadline)
                    .timed_out();
            self.deregister_waiter();
            if timed_out {
                return false;
            }
        }
    }

    /// Add a waiter slot unless permits showed up; false means permits
    /// are available instead.
    fn register_waiter(&self) -> bool {
        let mut s = self.state.get(MemOrder::None);
        loop {
            if permits_of(s) > 0 {
                return false;
            }
            debug_assert!(waiters_of(s) < u32::MAX, "semaphore waiter count overflow");
            let next = pack(0, waiters_of(s) + 1);
            let seen = self.state.get_compare_set(s, next, MemOrder::None);
            if seen == s {
                return true;
            }
            s = seen;
        }
    }

    fn deregister_waiter(&self) {
        let mut s = self.state.get(MemOrder::None);
        loop {
            debug_assert!(waiters_of(s) > 0);
            let next = pack(permits_of(s), waiters_of(s) - 1);
            let seen = self.state.get_compare_set(s, next, MemOrder::None);
            if seen == s {
                return;
            }
            s = seen;
        }
    }

    /// Permits available at this instant.
    pub fn permits(&self) -> u32 {
        permits_of(self.state.get(MemOrder::None))
    }

    /// Registered waiters at this instant; approximate under churn.
    pub fn waiter_count(&self) -> u32 {
        waiters_of(self.state.get(MemOrder::None))
    }

    pub const fn backend(&self) -> BackendKind {
        self.waiters.kind()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("permits", &self.permits())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}
