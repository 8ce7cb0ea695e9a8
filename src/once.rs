/*!
 * Init-Once Cell
 *
 * Lazy, at-most-once creation of an OS wait object (or anything else)
 * behind a four-state word: EMPTY -> BUSY -> READY | FAILED. The CAS
 * winner runs the initializer; losers spin while BUSY. FAILED is
 * sticky: once an initializer has failed the cell never runs another,
 * and callers are expected to fall back to spin waiting.
 */

use crate::errors::LazyInitError;
use crate::order::MemOrder;
use crate::raw::{RawAtom, RawU32};
use crate::spin::SpinWait;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::thread;

const EMPTY: u32 = 0;
const BUSY: u32 = 1;
const READY: u32 = 2;
const FAILED: u32 = 3;

/// One-shot lazily initialized slot.
pub struct OnceHandle<T> {
    state: RawU32,
    slot: UnsafeCell<MaybeUninit<T>>,
}

// The slot is written once by the BUSY winner and only read after the
// READY release store is observed with acquire.
unsafe impl<T: Send> Send for OnceHandle<T> {}
unsafe impl<T: Send + Sync> Sync for OnceHandle<T> {}

/// Publishes FAILED if the initializer panics or errors; disarmed by
/// `forget` on the success path.
struct BusyGuard<'a> {
    state: &'a RawU32,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.set(FAILED, MemOrder::Release);
    }
}

impl<T> OnceHandle<T> {
    pub const fn new() -> Self {
        Self {
            state: RawU32::new(EMPTY),
            slot: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// The value, if an initializer has already succeeded.
    pub fn get(&self) -> Option<&T> {
        if self.state.get(MemOrder::Acquire) == READY {
            Some(unsafe { (*self.slot.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Run `init` if no initializer has run yet, then return the value.
    ///
    /// Exactly one caller runs `init`; concurrent callers spin until it
    /// resolves. After a failure every call returns
    /// [`LazyInitError::Poisoned`] without running anything.
    pub fn get_or_init(
        &self,
        init: impl FnOnce() -> Result<T, LazyInitError>,
    ) -> Result<&T, LazyInitError> {
        let mut spin = SpinWait::new();
        loop {
            match self.state.get(MemOrder::Acquire) {
                READY => return Ok(unsafe { (*self.slot.get()).assume_init_ref() }),
                FAILED => return Err(LazyInitError::Poisoned),
                EMPTY if self.state.compare_set(EMPTY, BUSY, MemOrder::Acquire) => {
                    let guard = BusyGuard { state: &self.state };
                    return match init() {
                        Ok(value) => {
                            unsafe { (*self.slot.get()).write(value) };
                            std::mem::forget(guard);
                            self.state.set(READY, MemOrder::Release);
                            Ok(unsafe { (*self.slot.get()).assume_init_ref() })
                        }
                        Err(e) => {
                            drop(guard);
                            Err(e)
                        }
                    };
                }
                // BUSY, or we lost the EMPTY race
                _ => {
                    if !spin.spin() {
                        thread::yield_now();
                    }
                }
            }
        }
    }
}

impl<T> Default for OnceHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OnceHandle<T> {
    fn drop(&mut self) {
        if self.state.get(MemOrder::Acquire) == READY {
            unsafe { (*self.slot.get()).assume_init_drop() };
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for OnceHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnceHandle").field("value", &self.get()).finish()
    }
}
