/*!
 * Wait Backends
 *
 * Futex-shaped waiting on a 32-bit state word: block only while the
 * word holds an expected value, wake by address. Four backends share
 * the contract; which one a primitive gets is decided at compile time
 * from its needs, with dispatch through a fieldless enum match rather
 * than a vtable.
 *
 * # Design
 *
 * Spurious wakeups are part of the contract. Callers must re-check
 * their predicate after every return, which is what lets `TimedOut`
 * mean "the deadline really passed" and nothing else.
 */

mod event;
#[cfg(target_os = "linux")]
mod futex;
mod needs;
mod parker;
mod spin;

pub use needs::{BackendKind, Needs};

use crate::clock::Deadline;
use crate::raw::RawU32;
use event::WaitEvent;
use crate::once::OnceHandle;
use crate::errors::LazyInitError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Why a wait call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken, or returned spuriously; re-check the predicate
    Woken,
    /// The deadline passed
    TimedOut,
}

impl WaitOutcome {
    pub fn timed_out(self) -> bool {
        matches!(self, WaitOutcome::TimedOut)
    }
}

/// What a wake call found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    /// This many threads were woken
    Woken(usize),
    /// Nobody was waiting (spin waiters are never counted)
    NoWaiters,
}

/// One primitive's connection to its wait backend.
///
/// Holds the selected backend kind and, for the event backend, the
/// lazily created wait object. Const-constructible so primitives can
/// live in statics.
pub struct WaitCell {
    kind: BackendKind,
    event: OnceHandle<WaitEvent>,
}

impl WaitCell {
    /// Select a backend for `needs` at compile time.
    pub const fn new(needs: Needs) -> Self {
        Self::with_kind(BackendKind::select_checked(needs))
    }

    /// Use an explicit backend, bypassing selection.
    pub const fn with_kind(kind: BackendKind) -> Self {
        Self {
            kind,
            event: OnceHandle::new(),
        }
    }

    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Block while `word == expected`, until woken, spuriously roused,
    /// or past the deadline. An already expired deadline returns
    /// `TimedOut` without reaching the OS.
    pub fn wait(&self, word: &RawU32, expected: u32, deadline: Option<Deadline>) -> WaitOutcome {
        if let Some(d) = &deadline {
            if d.has_passed() {
                return WaitOutcome::TimedOut;
            }
        }
        match self.kind {
            #[cfg(target_os = "linux")]
            BackendKind::Futex => futex::wait(word, expected, deadline),
            #[cfg(not(target_os = "linux"))]
            BackendKind::Futex => parker::wait(word, expected, deadline),
            BackendKind::Parker => parker::wait(word, expected, deadline),
            BackendKind::Event => match self.event.get_or_init(WaitEvent::try_new) {
                Ok(event) => event.wait(word, expected, deadline),
                Err(e) => {
                    note_degraded(e);
                    spin::wait(word, expected, deadline)
                }
            },
            BackendKind::Spin => spin::wait(word, expected, deadline),
        }
    }

    pub fn wake_one(&self, word: &RawU32) -> WakeResult {
        match self.kind {
            #[cfg(target_os = "linux")]
            BackendKind::Futex => futex::wake_one(word),
            #[cfg(not(target_os = "linux"))]
            BackendKind::Futex => parker::wake_one(word),
            BackendKind::Parker => parker::wake_one(word),
            // an event that was never created has never had a waiter
            BackendKind::Event => match self.event.get() {
                Some(event) => event.wake_one(),
                None => WakeResult::NoWaiters,
            },
            BackendKind::Spin => spin::wake(word),
        }
    }

    pub fn wake_all(&self, word: &RawU32) -> WakeResult {
        match self.kind {
            #[cfg(target_os = "linux")]
            BackendKind::Futex => futex::wake_all(word),
            #[cfg(not(target_os = "linux"))]
            BackendKind::Futex => parker::wake_all(word),
            BackendKind::Parker => parker::wake_all(word),
            BackendKind::Event => match self.event.get() {
                Some(event) => event.wake_all(),
                None => WakeResult::NoWaiters,
            },
            BackendKind::Spin => spin::wake(word),
        }
    }
}

impl std::fmt::Debug for WaitCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitCell").field("kind", &self.kind).finish()
    }
}

/// Warn once per process when wait-object creation fails and waits
/// start spinning instead of blocking.
fn note_degraded(e: LazyInitError) {
    static WARNED: AtomicBool = AtomicBool::new(false);
    if !WARNED.swap(true, Ordering::Relaxed) {
        log::warn!("wait object unavailable ({e}); degrading to spin waits");
    }
}
