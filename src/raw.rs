/*!
 * Raw Atomic Surface and Operation Synthesis
 *
 * One sealed implementation per native width, wrapping the std atomic of
 * that width. Operations the target exposes natively delegate straight
 * to std; the rest are derived in `synth` from weaker primitives with
 * fixed retry shapes. Which path a width takes is decided entirely at
 * compile time from the capability table, so the portable surface costs
 * nothing over the native one.
 *
 * # Design
 *
 * The derivations and their preference order:
 *
 * - `get` <- native load, else `get_add(0)`
 * - `get_set` <- loop on `get_compare_set` until the exchange succeeds
 *   against the value most recently observed
 * - `get_compare_set` <- loop on `compare_set`; on failure re-read with
 *   no ordering and retry only while the observed value still equals
 *   `cmp`; return the last observed value
 * - `get_add` <- native fetch-add, else a `get_compare_set` retry loop
 * - `get_add1` / `get_subtract1` <- add/subtract with n = 1
 * - `subtract` <- native fetch-sub, else `add` of the two's complement
 */

use crate::order::MemOrder;
use crate::probe::Caps;

mod sealed {
    pub trait Sealed {}
}

/// Unsigned carrier of one raw atomic word.
pub trait Primitive:
    Copy + PartialEq + Eq + std::fmt::Debug + Send + Sync + 'static
{
    const ZERO: Self;
    const ONE: Self;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_neg(self) -> Self;
}

macro_rules! primitive_impl {
    ($($t:ty),*) => {$(
        impl Primitive for $t {
            const ZERO: Self = 0;
            const ONE: Self = 1;

            fn wrapping_add(self, rhs: Self) -> Self {
                <$t>::wrapping_add(self, rhs)
            }

            fn wrapping_neg(self) -> Self {
                <$t>::wrapping_neg(self)
            }
        }
    )*};
}

primitive_impl!(u8, u16, u32, u64, usize);

/// Portable operation surface over one native atomic width.
///
/// Implemented only for the widths the target can operate on at all; a
/// width with no usable primitive has no impl, so its absence is a
/// compile-time fact rather than a runtime error.
pub trait RawAtom: sealed::Sealed + Send + Sync + Sized + 'static {
    type Prim: Primitive;

    /// Native capability mask for this width on the current target.
    const CAPS: Caps;

    fn new(v: Self::Prim) -> Self;
    fn into_prim(self) -> Self::Prim;

    /// Atomic load.
    fn get(&self, order: MemOrder) -> Self::Prim;

    /// Atomic store.
    fn set(&self, v: Self::Prim, order: MemOrder);

    /// Atomic exchange; returns the previous value.
    fn get_set(&self, v: Self::Prim, order: MemOrder) -> Self::Prim;

    /// Compare-exchange; reports success only.
    fn compare_set(&self, cmp: Self::Prim, set: Self::Prim, order: MemOrder) -> bool;

    /// Compare-exchange; returns the previous value whether or not the
    /// exchange took place.
    fn get_compare_set(&self, cmp: Self::Prim, set: Self::Prim, order: MemOrder) -> Self::Prim;

    /// Single compare-exchange attempt: `Ok(previous)` on success,
    /// `Err(current)` with the value the attempt observed on failure.
    /// Never retries, so unlike `get_compare_set` a spurious failure is
    /// surfaced to the caller.
    fn compare_set_else_get(
        &self,
        cmp: Self::Prim,
        set: Self::Prim,
        order: MemOrder,
    ) -> Result<Self::Prim, Self::Prim>;

    /// Atomic add, result discarded.
    fn add(&self, n: Self::Prim, order: MemOrder);

    /// Atomic add; returns the previous value.
    fn get_add(&self, n: Self::Prim, order: MemOrder) -> Self::Prim;

    /// Increment by one; returns the previous value.
    fn get_add1(&self, order: MemOrder) -> Self::Prim {
        self.get_add(Self::Prim::ONE, order)
    }

    /// Atomic subtract, result discarded.
    fn subtract(&self, n: Self::Prim, order: MemOrder);

    /// Atomic subtract; returns the previous value.
    fn get_subtract(&self, n: Self::Prim, order: MemOrder) -> Self::Prim;

    /// Decrement by one; returns the previous value.
    fn get_subtract1(&self, order: MemOrder) -> Self::Prim {
        self.get_subtract(Self::Prim::ONE, order)
    }
}

/// Derivations of missing operations from weaker ones.
///
/// Kept generic and public to the crate so the retry shapes can be
/// tested directly even on targets where every operation is native and
/// the fallback branches would otherwise never run.
pub(crate) mod synth {
    use super::{Primitive, RawAtom};
    use crate::order::MemOrder;

    /// Exchange from compare-exchange: retry against the value most
    /// recently observed until the exchange lands.
    pub(crate) fn get_set<A: RawAtom>(a: &A, v: A::Prim, order: MemOrder) -> A::Prim {
        let mut old = a.get(MemOrder::None);
        loop {
            let seen = a.get_compare_set(old, v, order);
            if seen == old {
                return seen;
            }
            old = seen;
        }
    }

    /// Previous-value compare-exchange from the success-only form: on
    /// failure re-read without ordering and retry only while the word
    /// still holds `cmp`.
    pub(crate) fn get_compare_set<A: RawAtom>(
        a: &A,
        cmp: A::Prim,
        set: A::Prim,
        order: MemOrder,
    ) -> A::Prim {
        loop {
            if a.compare_set(cmp, set, order) {
                return cmp;
            }
            let seen = a.get(MemOrder::None);
            if seen != cmp {
                return seen;
            }
        }
    }

    /// Load from fetch-add of zero, for widths with RMW but no load.
    pub(crate) fn get<A: RawAtom>(a: &A, order: MemOrder) -> A::Prim {
        a.get_add(A::Prim::ZERO, order)
    }

    /// Fetch-add from a compare-exchange retry loop.
    pub(crate) fn get_add<A: RawAtom>(a: &A, n: A::Prim, order: MemOrder) -> A::Prim {
        let mut old = a.get(MemOrder::None);
        loop {
            let seen = a.get_compare_set(old, old.wrapping_add(n), order);
            if seen == old {
                return old;
            }
            old = seen;
        }
    }

    /// Subtract as addition of the two's complement.
    pub(crate) fn get_subtract<A: RawAtom>(a: &A, n: A::Prim, order: MemOrder) -> A::Prim {
        a.get_add(n.wrapping_neg(), order)
    }
}

macro_rules! raw_atom {
    ($(#[$meta:meta])* $name:ident, $atomic:ty, $prim:ty, $width:expr) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug)]
        pub struct $name(pub(crate) $atomic);

        impl $name {
            pub const fn new(v: $prim) -> Self {
                Self(<$atomic>::new(v))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(0)
            }
        }

        impl sealed::Sealed for $name {}

        impl RawAtom for $name {
            type Prim = $prim;

            const CAPS: Caps = Caps::for_width($width);

            fn new(v: $prim) -> Self {
                Self(<$atomic>::new(v))
            }

            fn into_prim(self) -> $prim {
                self.0.into_inner()
            }

            fn get(&self, order: MemOrder) -> $prim {
                if Self::CAPS.contains(Caps::GET) {
                    self.0.load(order.load())
                } else {
                    synth::get(self, order)
                }
            }

            fn set(&self, v: $prim, order: MemOrder) {
                if Self::CAPS.contains(Caps::SET) {
                    self.0.store(v, order.store());
                } else {
                    synth::get_set(self, v, order);
                }
            }

            fn get_set(&self, v: $prim, order: MemOrder) -> $prim {
                if Self::CAPS.contains(Caps::GET_SET) {
                    self.0.swap(v, order.rmw())
                } else {
                    synth::get_set(self, v, order)
                }
            }

            fn compare_set(&self, cmp: $prim, set: $prim, order: MemOrder) -> bool {
                self.0
                    .compare_exchange(cmp, set, order.rmw(), order.cas_failure())
                    .is_ok()
            }

            fn get_compare_set(&self, cmp: $prim, set: $prim, order: MemOrder) -> $prim {
                if Self::CAPS.contains(Caps::GET_COMPARE_SET) {
                    match self
                        .0
                        .compare_exchange(cmp, set, order.rmw(), order.cas_failure())
                    {
                        Ok(prev) | Err(prev) => prev,
                    }
                } else {
                    synth::get_compare_set(self, cmp, set, order)
                }
            }

            fn compare_set_else_get(
                &self,
                cmp: $prim,
                set: $prim,
                order: MemOrder,
            ) -> Result<$prim, $prim> {
                self.0
                    .compare_exchange(cmp, set, order.rmw(), order.cas_failure())
            }

            fn add(&self, n: $prim, order: MemOrder) {
                if Self::CAPS.contains(Caps::ADD) {
                    self.0.fetch_add(n, order.rmw());
                } else {
                    synth::get_add(self, n, order);
                }
            }

            fn get_add(&self, n: $prim, order: MemOrder) -> $prim {
                if Self::CAPS.contains(Caps::GET_ADD) {
                    self.0.fetch_add(n, order.rmw())
                } else {
                    synth::get_add(self, n, order)
                }
            }

            fn subtract(&self, n: $prim, order: MemOrder) {
                if Self::CAPS.contains(Caps::SUB) {
                    self.0.fetch_sub(n, order.rmw());
                } else {
                    synth::get_subtract(self, n, order);
                }
            }

            fn get_subtract(&self, n: $prim, order: MemOrder) -> $prim {
                if Self::CAPS.contains(Caps::GET_SUB) {
                    self.0.fetch_sub(n, order.rmw())
                } else {
                    synth::get_subtract(self, n, order)
                }
            }
        }
    };
}

#[cfg(target_has_atomic = "8")]
raw_atom!(
    /// Raw atomic byte.
    RawU8,
    std::sync::atomic::AtomicU8,
    u8,
    1
);

#[cfg(target_has_atomic = "16")]
raw_atom!(
    /// Raw 16-bit atomic.
    RawU16,
    std::sync::atomic::AtomicU16,
    u16,
    2
);

#[cfg(target_has_atomic = "32")]
raw_atom!(
    /// Raw 32-bit atomic. Doubles as the wait-backend word type: every
    /// blocking primitive parks on one of these.
    RawU32,
    std::sync::atomic::AtomicU32,
    u32,
    4
);

#[cfg(target_has_atomic = "64")]
raw_atom!(
    /// Raw 64-bit atomic.
    RawU64,
    std::sync::atomic::AtomicU64,
    u64,
    8
);

#[cfg(target_has_atomic = "ptr")]
raw_atom!(
    /// Raw pointer-width atomic.
    RawUsize,
    std::sync::atomic::AtomicUsize,
    usize,
    std::mem::size_of::<usize>()
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_native_roundtrip() {
        let a = RawU32::new(7);
        assert_eq!(a.get(MemOrder::Full), 7);
        a.set(9, MemOrder::Full);
        assert_eq!(RawAtom::into_prim(a), 9);
    }

    #[test]
    fn test_get_set_returns_previous() {
        let a = RawU64::new(1);
        assert_eq!(a.get_set(2, MemOrder::Full), 1);
        assert_eq!(a.get(MemOrder::Full), 2);
    }

    #[test]
    fn test_compare_set_else_get_reports_current() {
        let a = RawU32::new(5);
        assert_eq!(a.compare_set_else_get(5, 6, MemOrder::Full), Ok(5));
        assert_eq!(a.compare_set_else_get(5, 7, MemOrder::Full), Err(6));
        assert_eq!(a.get(MemOrder::Full), 6);
    }

    #[test]
    fn test_by_one_forms() {
        let a = RawU8::new(10);
        assert_eq!(a.get_add1(MemOrder::Full), 10);
        assert_eq!(a.get_subtract1(MemOrder::Full), 11);
        assert_eq!(a.get(MemOrder::Full), 10);
    }

    #[test]
    fn test_wrapping_subtract() {
        let a = RawU16::new(0);
        a.subtract(1, MemOrder::Full);
        assert_eq!(a.get(MemOrder::Full), u16::MAX);
    }

    // The derived forms must agree with the native ones even where the
    // native branch is always taken in production.

    #[test]
    fn test_synth_get_set_matches_native() {
        let a = RawU32::new(3);
        assert_eq!(synth::get_set(&a, 4, MemOrder::Full), 3);
        assert_eq!(a.get(MemOrder::Full), 4);
    }

    #[test]
    fn test_synth_get_compare_set_matches_native() {
        let a = RawU32::new(3);
        assert_eq!(synth::get_compare_set(&a, 3, 4, MemOrder::Full), 3);
        assert_eq!(synth::get_compare_set(&a, 3, 5, MemOrder::Full), 4);
        assert_eq!(a.get(MemOrder::Full), 4);
    }

    #[test]
    fn test_synth_get_add_matches_native() {
        let a = RawU64::new(100);
        assert_eq!(synth::get_add(&a, 5, MemOrder::Full), 100);
        assert_eq!(a.get(MemOrder::Full), 105);
    }

    #[test]
    fn test_synth_get_via_add_zero_is_pure() {
        let a = RawU32::new(41);
        assert_eq!(synth::get(&a, MemOrder::Full), 41);
        assert_eq!(a.get(MemOrder::Full), 41);
    }

    #[test]
    fn test_synth_subtract_is_twos_complement_add() {
        let a = RawU8::new(2);
        assert_eq!(synth::get_subtract(&a, 3, MemOrder::Full), 2);
        assert_eq!(a.get(MemOrder::Full), 255);
    }

    #[test]
    fn test_synth_get_add_under_contention() {
        let a = Arc::new(RawU32::new(0));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let a = a.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        synth::get_add(&*a, 1, MemOrder::Full);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(a.get(MemOrder::Full), 40_000);
    }
}
