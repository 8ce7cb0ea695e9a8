/*!
 * Portable Parker Backend
 *
 * Parks threads in `parking_lot_core`'s process-global table, keyed by
 * the address of the primitive's state word. The validation callback
 * runs under the table's bucket lock and re-checks the word, giving
 * the same no-missed-wakeup guarantee the futex gets from the kernel.
 * `parking_lot_core` reaches the native wait primitive on each
 * platform (futex, `__ulock`, keyed events, pthreads), so this is the
 * cross-platform default.
 */

use crate::clock::Deadline;
use crate::order::MemOrder;
use crate::raw::{RawAtom, RawU32};
use super::{WaitOutcome, WakeResult};
use parking_lot_core::{ParkResult, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

fn key(word: &RawU32) -> usize {
    word.0.as_ptr() as usize
}

pub(super) fn wait(word: &RawU32, expected: u32, deadline: Option<Deadline>) -> WaitOutcome {
    let validate = || word.get(MemOrder::Acquire) == expected;
    let before_sleep = || {};
    let timed_out = |_key, _was_last| {};

    // Safety: the callbacks do not call into the parking lot, and the
    // key is the address of a word that outlives the wait.
    let result = unsafe {
        parking_lot_core::park(
            key(word),
            validate,
            before_sleep,
            timed_out,
            DEFAULT_PARK_TOKEN,
            deadline.map(|d| d.instant()),
        )
    };

    match result {
        ParkResult::Unparked(_) => WaitOutcome::Woken,
        // the word changed before we could park; a wake in spirit
        ParkResult::Invalid => WaitOutcome::Woken,
        ParkResult::TimedOut => WaitOutcome::TimedOut,
    }
}

pub(super) fn wake_one(word: &RawU32) -> WakeResult {
    // Safety: no parking-lot reentry from the callback.
    let result = unsafe { parking_lot_core::unpark_one(key(word), |_| DEFAULT_UNPARK_TOKEN) };
    if result.unparked_threads > 0 {
        WakeResult::Woken(result.unparked_threads)
    } else {
        WakeResult::NoWaiters
    }
}

pub(super) fn wake_all(word: &RawU32) -> WakeResult {
    // Safety: the key is never reused for a different word while
    // waiters exist.
    let unparked = unsafe { parking_lot_core::unpark_all(key(word), DEFAULT_UNPARK_TOKEN) };
    if unparked > 0 {
        WakeResult::Woken(unparked)
    } else {
        WakeResult::NoWaiters
    }
}
