/*!
 * Atomic Capability Probe
 *
 * Compile-time fact table recording which portable operations each
 * scalar width supports natively. Absence of a capability is
 * information for the synthesis layer, not a failure.
 */

use bitflags::bitflags;

bitflags! {
    /// Native operation set for one scalar width.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Caps: u32 {
        /// Atomic load
        const GET = 1 << 0;
        /// Atomic store
        const SET = 1 << 1;
        /// Atomic exchange returning the previous value
        const GET_SET = 1 << 2;
        /// Compare-exchange reporting success only
        const COMPARE_SET = 1 << 3;
        /// Compare-exchange returning the previous value
        const GET_COMPARE_SET = 1 << 4;
        /// Atomic add, result discarded
        const ADD = 1 << 5;
        /// Atomic add returning the previous value
        const GET_ADD = 1 << 6;
        /// Increment-by-one returning the previous value
        const GET_ADD1 = 1 << 7;
        /// Atomic subtract, result discarded
        const SUB = 1 << 8;
        /// Atomic subtract returning the previous value
        const GET_SUB = 1 << 9;
        /// Decrement-by-one returning the previous value
        const GET_SUB1 = 1 << 10;
    }
}

impl Caps {
    /// Load and store only.
    pub const LOAD_STORE: Caps = Caps::GET.union(Caps::SET);

    /// The read-modify-write family the mainstream ISAs expose.
    ///
    /// `GET_ADD1`/`GET_SUB1` are never listed as native: targets expose
    /// add-by-n, so the by-one forms are always derived from it.
    pub const RMW: Caps = Caps::GET_SET
        .union(Caps::COMPARE_SET)
        .union(Caps::GET_COMPARE_SET)
        .union(Caps::ADD)
        .union(Caps::GET_ADD)
        .union(Caps::SUB)
        .union(Caps::GET_SUB);

    /// Capability set for a scalar of `width` bytes on the current target.
    pub const fn for_width(width: usize) -> Caps {
        let native = match width {
            1 => cfg!(target_has_atomic = "8"),
            2 => cfg!(target_has_atomic = "16"),
            4 => cfg!(target_has_atomic = "32"),
            8 => cfg!(target_has_atomic = "64"),
            _ => false,
        };
        if native {
            Caps::LOAD_STORE.union(Caps::RMW)
        } else {
            Caps::empty()
        }
    }

    /// Capability set for the pointer-sized word.
    pub const fn word() -> Caps {
        if cfg!(target_has_atomic = "ptr") {
            Caps::LOAD_STORE.union(Caps::RMW)
        } else {
            Caps::empty()
        }
    }
}
