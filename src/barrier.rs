/*!
 * Barrier
 *
 * Rendezvous point for a fixed number of threads. Arrival count,
 * leaving flag, and round generation live in one 64-bit word, so the
 * CAS that records an arrival also captures which round that arrival
 * belongs to. The last arriver closes the round in a single CAS that
 * bumps the generation and raises the leaving flag; late entrants spin
 * until the previous round has fully drained before they can start the
 * next one.
 */

use crate::order::MemOrder;
use crate::raw::{RawAtom, RawU32, RawU64};
use crate::spin::SpinWait;
use crate::wait::{BackendKind, Needs, WaitCell};
use std::fmt;

const BARRIER_NEEDS: Needs = Needs::CONST_INIT;

const ARRIVALS_MASK: u64 = 0x7FFF_FFFF;
const LEAVING: u64 = 1 << 31;
const GEN_SHIFT: u32 = 32;
const GEN_ONE: u64 = 1 << GEN_SHIFT;

const fn arrivals_of(state: u64) -> u64 {
    state & ARRIVALS_MASK
}

const fn gen_of(state: u64) -> u64 {
    state >> GEN_SHIFT
}

const fn is_leaving(state: u64) -> bool {
    state & LEAVING != 0
}

/// Which role a thread played in the round it just completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    leader: bool,
}

impl BarrierWaitResult {
    /// True for exactly one thread per round, the last to arrive.
    pub fn is_leader(&self) -> bool {
        self.leader
    }
}

pub struct Barrier {
    state: RawU64,
    // round signal; followers block on this, the leader bumps it
    signal: RawU32,
    parties: u64,
    waiters: WaitCell,
}

impl Barrier {
    /// A barrier for `parties` threads. `parties` must be positive and
    /// below 2^31.
    pub const fn new(parties: u32) -> Self {
        Self::with_backend(parties, BackendKind::select_checked(BARRIER_NEEDS))
    }

    pub const fn with_backend(parties: u32, kind: BackendKind) -> Self {
        assert!(parties > 0, "barrier needs at least one party");
        assert!((parties as u64) < LEAVING, "barrier party count too large");
        Self {
            state: RawU64::new(0),
            signal: RawU32::new(0),
            parties: parties as u64,
            waiters: WaitCell::with_kind(kind),
        }
    }

    pub const fn parties(&self) -> u32 {
        self.parties as u32
    }

    pub const fn backend(&self) -> BackendKind {
        self.waiters.kind()
    }

    /// Block until `parties` threads have arrived, then release them
    /// all. One thread per round gets the leader result.
    pub fn wait(&self) -> BarrierWaitResult {
        let round = self.arrive();
        if arrivals_of(round) + 1 == self.parties {
            self.release(round);
            self.leave();
            return BarrierWaitResult { leader: true };
        }

        let my_gen = gen_of(round);
        loop {
            // the generation moved: our round was closed by its leader
            if gen_of(self.state.get(MemOrder::Acquire)) != my_gen {
                break;
            }
            let epoch = self.signal.get(MemOrder::None);
            if gen_of(self.state.get(MemOrder::Acquire)) != my_gen {
                break;
            }
            self.waiters.wait(&self.signal, epoch, None);
        }

        self.leave();
        BarrierWaitResult { leader: false }
    }

    /// Record one arrival and return the state as it was just before,
    /// which fixes both our slot and our round's generation.
    fn arrive(&self) -> u64 {
        let mut spin = SpinWait::new();
        let mut s = self.state.get(MemOrder::None);
        loop {
            // the previous round is still draining, or full; wait for
            // the next round to open
            if is_leaving(s) || arrivals_of(s) >= self.parties {
                if !spin.spin() {
                    std::thread::yield_now();
                }
                s = self.state.get(MemOrder::None);
                continue;
            }
            // full ordering: the arrival both publishes our pre-wait
            // writes and picks up everyone else's
            let seen = self.state.get_compare_set(s, s + 1, MemOrder::Full);
            if seen == s {
                return s;
            }
            s = seen;
        }
    }

    /// Leader only: close the round. Every arrival slot is filled, so
    /// no other thread writes the state word until LEAVING is up.
    fn release(&self, round: u64) {
        let full = (gen_of(round) << GEN_SHIFT) | self.parties;
        let next = ((gen_of(round) + 1) << GEN_SHIFT) | LEAVING | self.parties;
        let swapped = self.state.compare_set(full, next, MemOrder::Release);
        debug_assert!(swapped, "barrier round closed twice");
        self.signal.get_add1(MemOrder::Release);
        self.waiters.wake_all(&self.signal);
    }

    /// Drop our arrival slot; the last thread out lowers LEAVING and
    /// reopens the barrier.
    fn leave(&self) {
        let mut s = self.state.get(MemOrder::None);
        loop {
            debug_assert!(arrivals_of(s) > 0);
            let mut next = s - 1;
            if arrivals_of(next) == 0 {
                next &= !LEAVING;
            }
            let seen = self.state.get_compare_set(s, next, MemOrder::Release);
            if seen == s {
                return;
            }
            s = seen;
        }
    }
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.get(MemOrder::None);
        f.debug_struct("Barrier")
            .field("parties", &self.parties)
            .field("arrived", &arrivals_of(s))
            .field("generation", &gen_of(s))
            .finish()
    }
}
