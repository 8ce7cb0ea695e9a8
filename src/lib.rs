/*!
 * Portable Sync Library
 * Atomic operations and blocking primitives over pluggable wait backends
 */

pub mod barrier;
pub mod cell;
pub mod clock;
pub mod condvar;
pub mod errors;
pub mod mutex;
pub mod once;
pub mod order;
pub mod probe;
pub mod raw;
pub mod rwlock;
pub mod semaphore;
pub mod spin;
pub mod wait;

// Re-exports
pub use barrier::{Barrier, BarrierWaitResult};
pub use cell::{AtomicCell, BitValid, BitValidInt};
pub use clock::Deadline;
pub use condvar::{Condvar, WaitTimeoutResult};
pub use errors::LazyInitError;
pub use mutex::{Mutex, MutexGuard, RawMutex};
pub use once::OnceHandle;
pub use order::MemOrder;
pub use probe::Caps;
pub use raw::{RawAtom, RawU16, RawU32, RawU64, RawU8, RawUsize};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use semaphore::Semaphore;
pub use spin::{SpinConfig, SpinWait};
pub use wait::{BackendKind, Needs, WaitCell, WaitOutcome, WakeResult};
