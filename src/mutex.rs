/*!
 * Mutex
 *
 * Three-state word mutex: 0 unlocked, 1 locked, 2 locked with possible
 * waiters. The uncontended path is a single CAS each way; the wait
 * backend is only consulted once a thread has announced contention by
 * swapping the word to 2, and unlock only issues a wake after seeing
 * that announcement.
 *
 * # Performance
 *
 * - lock/unlock without contention: one CAS, one swap, no syscall
 * - `try_lock` is a single CAS attempt, it never spins and never blocks
 * - a waiter that times out may leave the word at 2, costing the next
 *   unlock one spurious wake; it never costs correctness
 */

use crate::clock::Deadline;
use crate::order::MemOrder;
use crate::raw::{RawAtom, RawU32};
use crate::spin::SpinWait;
use crate::wait::{BackendKind, Needs, WaitCell};
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

const MUTEX_NEEDS: Needs = Needs::TIMEOUT.union(Needs::CONST_INIT);

/// The lock itself, without a payload. Building block for [`Mutex`]
/// and for callers that guard something a guard cannot own.
pub struct RawMutex {
    state: RawU32,
    waiters: WaitCell,
}

impl RawMutex {
    pub const fn new() -> Self {
        Self::with_backend(BackendKind::select_checked(MUTEX_NEEDS))
    }

    pub const fn with_backend(kind: BackendKind) -> Self {
        Self {
            state: RawU32::new(UNLOCKED),
            waiters: WaitCell::with_kind(kind),
        }
    }

    /// Single CAS attempt; never spins, never blocks.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_set(UNLOCKED, LOCKED, MemOrder::Acquire)
    }

    #[inline]
    pub fn lock(&self) {
        if !self.try_lock() {
            self.lock_slow(None);
        }
    }

    /// Returns false if the deadline passed before the lock was won.
    #[inline]
    pub fn lock_deadline(&self, deadline: Deadline) -> bool {
        self.try_lock() || self.lock_slow(Some(deadline))
    }

    fn lock_slow(&self, deadline: Option<Deadline>) -> bool {
        let mut spin = SpinWait::new();
        loop {
            let s = self.state.get(MemOrder::None);
            if s == UNLOCKED {
                if self.state.compare_set(UNLOCKED, LOCKED, MemOrder::Acquire) {
                    return true;
                }
                continue;
            }
            // merely locked: worth spinning, the holder may be brief
            if s == LOCKED && spin.spin() {
                continue;
            }
            break;
        }
        // contention announced from here on. Acquire only by swapping in
        // CONTENDED: other waiters slept against that value, and taking
        // the lock at LOCKED would let our unlock skip their wake.
        loop {
            if self.state.get_set(CONTENDED, MemOrder::Acquire) == UNLOCKED {
                return true;
            }
            if self
                .waiters
                .wait(&self.state, CONTENDED, deadline)
                .timed_out()
            {
                return false;
            }
        }
    }

    /// Release the lock. Calling this without holding the lock is a
    /// contract violation, checked in debug builds only.
    #[inline]
    pub fn unlock(&self) {
        let prev = self.state.get_set(UNLOCKED, MemOrder::Release);
        debug_assert_ne!(prev, UNLOCKED, "unlock of an unlocked mutex");
        if prev == CONTENDED {
            self.waiters.wake_one(&self.state);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.get(MemOrder::None) != UNLOCKED
    }

    pub const fn backend(&self) -> BackendKind {
        self.waiters.kind()
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMutex")
            .field("locked", &self.is_locked())
            .field("backend", &self.backend())
            .finish()
    }
}

/// Mutual exclusion around a value, released by guard drop.
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub const fn with_backend(value: T, kind: BackendKind) -> Self {
        Self {
            raw: RawMutex::with_backend(kind),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.lock();
        MutexGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.raw.try_lock().then(|| MutexGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    pub fn lock_deadline(&self, deadline: Deadline) -> Option<MutexGuard<'_, T>> {
        self.raw.lock_deadline(deadline).then(|| MutexGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Exclusive access without locking; `&mut self` proves no other
    /// thread can hold the lock.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("Mutex").field("data", &&*guard).finish(),
            None => f.debug_struct("Mutex").field("data", &"<locked>").finish(),
        }
    }
}

/// RAII lock ownership. Not `Send`: the unlock must happen on the
/// locking thread for every backend to be usable.
pub struct MutexGuard<'a, T: ?Sized> {
    lock: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    pub(crate) fn raw(&self) -> &'a RawMutex {
        &self.lock.raw
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_lock_unlock() {
        let m = Mutex::new(1);
        {
            let mut g = m.lock();
            *g += 1;
            assert!(m.is_locked());
        }
        assert!(!m.is_locked());
        assert_eq!(m.into_inner(), 2);
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let m = Mutex::new(());
        let g = m.lock();
        assert!(m.try_lock().is_none());
        drop(g);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn test_lock_deadline_expires_under_the_holder() {
        let m = Mutex::new(());
        let _g = m.lock();
        assert!(m
            .lock_deadline(Deadline::after(Duration::from_millis(50)))
            .is_none());
    }

    #[test]
    fn test_get_mut_bypasses_the_lock() {
        let mut m = Mutex::new(5);
        *m.get_mut() = 6;
        assert_eq!(*m.lock(), 6);
    }

    #[test]
    fn test_const_construction() {
        static M: Mutex<u32> = Mutex::new(0);
        *M.lock() += 1;
        assert_eq!(*M.lock(), 1);
    }
}
