/*!
 * Error Taxonomy
 *
 * Timeouts are ordinary return values throughout the crate; the only
 * error condition is failing to create a lazily initialized OS wait
 * object, and primitives survive even that by degrading to spin waits.
 */

use thiserror::Error;

/// Failure to produce the value of an init-once cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LazyInitError {
    /// The initializer run by this call reported failure.
    #[error("wait object creation failed")]
    CreateFailed,
    /// An earlier initializer failed; the cell is permanently failed
    /// and will never run another initializer.
    #[error("wait object creation failed on an earlier attempt")]
    Poisoned,
}
