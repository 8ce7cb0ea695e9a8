/*!
 * Read-Write Lock
 *
 * One 32-bit word: bit 0 is the writer, bit 1 marks a waiting writer,
 * and the reader count lives above them. Writer preference: once a
 * writer announces itself, new readers are refused and the reader count
 * drains; the last reader out wakes the writer.
 *
 * # Performance
 *
 * - uncontended read or write: one CAS in, one atomic op out
 * - writer release always wakes, readers may be queued without a flag
 * - a timed-out writer clears its announcement and wakes the queue, so
 *   readers are never stranded behind a writer that gave up
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

const WRITER: u32 = 1;
const WRITER_WAITING: u32 = 2;
const READER_UNIT: u32 = 4;
const READERS_MASK: u32 = !(WRITER | WRITER_WAITING);

const RWLOCK_NEEDS: Needs = Needs::TIMEOUT.union(Needs::CONST_INIT);

pub struct RwLock<T: ?Sized> {
    state: RawU32,
    waiters: WaitCell,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub const fn new(value: T) -> Self {
        Self::with_backend(value, BackendKind::select_checked(RWLOCK_NEEDS))
    }

    pub const fn with_backend(value: T, kind: BackendKind) -> Self {
        Self {
            state: RawU32::new(0),
            waiters: WaitCell::with_kind(kind),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RwLock<T> {
    /// Shared access; blocks while a writer holds or waits.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        if !self.try_read_raw() {
            self.read_slow(None);
        }
        RwLockReadGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.try_read_raw().then(|| RwLockReadGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    pub fn read_deadline(&self, deadline: Deadline) -> Option<RwLockReadGuard<'_, T>> {
        (self.try_read_raw() || self.read_slow(Some(deadline))).then(|| RwLockReadGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Exclusive access; blocks while readers or another writer hold.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        if !self.try_write_raw() {
            self.write_slow(None);
        }
        RwLockWriteGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Single CAS from the fully idle word; never spins, never blocks.
    /// Refuses even a free lock while another writer is announced.
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.try_write_raw().then(|| RwLockWriteGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    pub fn write_deadline(&self, deadline: Deadline) -> Option<RwLockWriteGuard<'_, T>> {
        (self.try_write_raw() || self.write_slow(Some(deadline))).then(|| RwLockWriteGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Exclusive access without locking; `&mut self` proves no other
    /// thread holds the lock.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Readers currently inside; approximate under churn.
    pub fn reader_count(&self) -> u32 {
        (self.state.get(MemOrder::None) & READERS_MASK) / READER_UNIT
    }

    pub fn is_write_locked(&self) -> bool {
        self.state.get(MemOrder::None) & WRITER != 0
    }

    pub const fn backend(&self) -> BackendKind {
        self.waiters.kind()
    }

    fn try_read_raw(&self) -> bool {
        let mut s = self.state.get(MemOrder::None);
        while s & (WRITER | WRITER_WAITING) == 0 {
            debug_assert!(s & READERS_MASK != READERS_MASK, "reader count overflow");
            let seen = self
                .state
                .get_compare_set(s, s + READER_UNIT, MemOrder::Acquire);
            if seen == s {
                return true;
            }
            s = seen;
        }
        false
    }

    fn read_slow(&self, deadline: Option<Deadline>) -> bool {
        let mut spin = SpinWait::new();
        loop {
            if self.try_read_raw() {
                return true;
            }
            if spin.spin() {
                continue;
            }
            let s = self.state.get(MemOrder::Acquire);
            if s & (WRITER | WRITER_WAITING) == 0 {
                continue;
            }
            if self.waiters.wait(&self.state, s, deadline).timed_out() {
                return false;
            }
            spin.reset();
        }
    }

    fn try_write_raw(&self) -> bool {
        self.state.compare_set(0, WRITER, MemOrder::Acquire)
    }

    fn write_slow(&self, deadline: Option<Deadline>) -> bool {
        let mut spin = SpinWait::new();
        loop {
            let s = self.state.get(MemOrder::None);
            // free apart from our own (or a peer's) announcement: take
            // it, clearing the announcement; a displaced peer re-raises
            if s & (WRITER | READERS_MASK) == 0 {
                if self.state.compare_set(s, WRITER, MemOrder::Acquire) {
                    return true;
                }
                continue;
            }
            if spin.spin() {
                continue;
            }
            let announced = if s & WRITER_WAITING == 0 {
                if !self
                    .state
                    .compare_set(s, s | WRITER_WAITING, MemOrder::None)
                {
                    continue;
                }
                s | WRITER_WAITING
            } else {
                s
            };
            if self
                .waiters
                .wait(&self.state, announced, deadline)
                .timed_out()
            {
                self.retract_announcement();
                return false;
            }
            spin.reset();
        }
    }

    /// Timed-out writer: drop the announcement and rouse the queue so
    /// refused readers do not sleep behind a writer that gave up. A
    /// second waiting writer re-announces on its next pass.
    fn retract_announcement(&self) {
        let mut s = self.state.get(MemOrder::None);
        while s & WRITER_WAITING != 0 {
            let seen = self
                .state
                .get_compare_set(s, s & !WRITER_WAITING, MemOrder::None);
            if seen == s {
                self.waiters.wake_all(&self.state);
                return;
            }
            s = seen;
        }
    }

    fn read_unlock(&self) {
        let prev = self.state.get_subtract(READER_UNIT, MemOrder::Release);
        debug_assert!(prev & READERS_MASK >= READER_UNIT, "read_unlock underflow");
        // last reader out hands off to the announced writer; readers
        // share the wait word, so everyone is roused and re-sorts
        if prev & READERS_MASK == READER_UNIT && prev & WRITER_WAITING != 0 {
            self.waiters.wake_all(&self.state);
        }
    }

    fn write_unlock(&self) {
        let prev = self.state.get_subtract(WRITER, MemOrder::Release);
        debug_assert!(prev & WRITER != 0, "write_unlock without the write lock");
        // readers queue without a flag of their own, so always wake
        self.waiters.wake_all(&self.state);
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_read() {
            Some(guard) => f.debug_struct("RwLock").field("data", &&*guard).finish(),
            None => f.debug_struct("RwLock").field("data", &"<locked>").finish(),
        }
    }
}

/// Shared RAII access. Not `Send`: the release must happen on the
/// acquiring thread for every backend to be usable.
pub struct RwLockReadGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for RwLockReadGuard<'_, T> {}

impl<T: ?Sized> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLockReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Exclusive RAII access.
pub struct RwLockWriteGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for RwLockWriteGuard<'_, T> {}

impl<T: ?Sized> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.write_unlock();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLockWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
