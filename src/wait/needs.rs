/*!
 * Backend Needs and Selection
 *
 * Every primitive states what it needs from its wait backend as a
 * small bitset; every backend advertises what it provides. Matching
 * the two happens at compile time, so an impossible combination is a
 * build failure, never a runtime surprise.
 */

use bitflags::bitflags;

bitflags! {
    /// Requirements a primitive places on its wait backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Needs: u8 {
        /// Waits must honor deadlines
        const TIMEOUT = 1 << 0;
        /// Waiters must actually block in the OS, not burn a core
        const OS_WAIT = 1 << 1;
        /// The primitive must be constructible in a const context
        const CONST_INIT = 1 << 2;
        /// Waiters must never enter the OS at all
        const SPIN_ONLY = 1 << 3;
    }
}

/// The wait backends, in selection preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Raw futex syscalls on the state word (Linux). On other targets
    /// this kind dispatches to the parker.
    Futex,
    /// Process-global parking table keyed by state-word address; maps
    /// to the native wait primitive on every platform.
    Parker,
    /// Per-primitive wait object created lazily on first blocking.
    Event,
    /// No OS involvement; deadline-bounded spinning.
    Spin,
}

impl BackendKind {
    /// What this backend can satisfy.
    pub const fn provides(self) -> Needs {
        match self {
            BackendKind::Futex | BackendKind::Parker | BackendKind::Event => Needs::TIMEOUT
                .union(Needs::OS_WAIT)
                .union(Needs::CONST_INIT),
            BackendKind::Spin => Needs::TIMEOUT
                .union(Needs::CONST_INIT)
                .union(Needs::SPIN_ONLY),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            BackendKind::Futex => "futex",
            BackendKind::Parker => "parker",
            BackendKind::Event => "event",
            BackendKind::Spin => "spin",
        }
    }

    /// Pick the preferred backend for `needs` on this target and build
    /// configuration. Spin is chosen exactly when asked for, by the
    /// needs bit or the `force-spin` feature.
    pub const fn select(needs: Needs) -> BackendKind {
        if needs.bits() & Needs::SPIN_ONLY.bits() != 0 || cfg!(feature = "force-spin") {
            return BackendKind::Spin;
        }
        if cfg!(feature = "force-event") {
            return BackendKind::Event;
        }
        if cfg!(feature = "force-parker") {
            return BackendKind::Parker;
        }
        if cfg!(target_os = "linux") {
            BackendKind::Futex
        } else {
            BackendKind::Parker
        }
    }

    /// As [`select`](Self::select), but a selection that cannot satisfy
    /// `needs` fails the build when evaluated in a const context.
    pub const fn select_checked(needs: Needs) -> BackendKind {
        let kind = Self::select(needs);
        assert!(
            kind.provides().bits() & needs.bits() == needs.bits(),
            "no wait backend satisfies the requested needs"
        );
        kind
    }
}
