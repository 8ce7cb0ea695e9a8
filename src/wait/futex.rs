/*!
 * Linux Futex Backend
 *
 * Raw `SYS_futex` on the primitive's own state word. The kernel checks
 * `word == expected` atomically with enqueueing the waiter, which is
 * what makes the missed-wakeup window of "check, then sleep" closable
 * without a userspace queue lock.
 */

use crate::clock::Deadline;
use crate::raw::RawU32;
use super::{WaitOutcome, WakeResult};
use std::ptr;

pub(super) fn wait(word: &RawU32, expected: u32, deadline: Option<Deadline>) -> WaitOutcome {
    let ts;
    let ts_ptr = match deadline {
        Some(d) => match d.poll() {
            Some(remaining) => {
                ts = libc::timespec {
                    tv_sec: remaining.as_secs() as libc::time_t,
                    tv_nsec: remaining.subsec_nanos() as libc::c_long,
                };
                &ts as *const libc::timespec
            }
            None => return WaitOutcome::TimedOut,
        },
        None => ptr::null(),
    };

    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.0.as_ptr(),
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            ts_ptr,
        )
    };
    if rc == 0 {
        return WaitOutcome::Woken;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ETIMEDOUT) => WaitOutcome::TimedOut,
        // EAGAIN: the word no longer held `expected` at enqueue time.
        // EINTR: signal. Both are spurious wakes; the caller re-checks.
        _ => WaitOutcome::Woken,
    }
}

pub(super) fn wake_one(word: &RawU32) -> WakeResult {
    wake(word, 1)
}

pub(super) fn wake_all(word: &RawU32) -> WakeResult {
    wake(word, i32::MAX)
}

fn wake(word: &RawU32, count: i32) -> WakeResult {
    let woken = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.0.as_ptr(),
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            count,
        )
    };
    if woken > 0 {
        WakeResult::Woken(woken as usize)
    } else {
        WakeResult::NoWaiters
    }
}
