//! Error taxonomy for the trigger coordinator (spec §7).
//!
//! Mirrors the errno-based taxonomy of the original kernel module: every
//! variant here carries the `libc` errno it corresponds to, so that a VFS
//! adapter translating into a host-specific error type has a single,
//! unambiguous integer to convert from.

use std::fmt;

/// Everything that can go wrong inside the trigger coordinator.
///
/// Variants other than [`AutofsError::Daemon`] are raised by the coordinator
/// itself; `Daemon` carries whatever errno the daemon reported on `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutofsError {
    /// A second daemon tried to open the control channel while one was
    /// already attached.
    Busy,
    /// `daemon_complete` was called with an `id` that does not match any
    /// live request.
    NoSuchRequest,
    /// The request's deadline elapsed before the daemon completed it.
    Timeout,
    /// The owning mount was torn down while the caller was parked.
    GoneAway,
    /// The wait was interrupted by a signal (interruptible mode only).
    Interrupted,
    /// The daemon completed the request with a non-zero error code.
    Daemon(i32),
}

impl AutofsError {
    /// The `libc` errno this error is represented by on the wire / in logs.
    ///
    /// For [`AutofsError::Daemon`] this is simply the code the daemon
    /// supplied, unexamined.
    pub fn errno(self) -> i32 {
        match self {
            AutofsError::Busy => libc::EBUSY,
            AutofsError::NoSuchRequest => libc::ESRCH,
            AutofsError::Timeout => libc::ETIMEDOUT,
            AutofsError::GoneAway => libc::ENXIO,
            AutofsError::Interrupted => libc::EINTR,
            AutofsError::Daemon(errno) => errno,
        }
    }

    /// Builds an error from a raw completion code, as submitted by the
    /// daemon via `daemon_complete`. `0` is not an error and has no
    /// `AutofsError` representation; callers check `error == 0` first.
    pub fn from_daemon_code(errno: i32) -> AutofsError {
        AutofsError::Daemon(errno)
    }

    /// Whether [`crate::trigger`] should retry a failure of this kind.
    ///
    /// Only [`AutofsError::Interrupted`] is excluded: an interrupt is a
    /// user-driven cancellation, not a transient failure, and must be
    /// propagated immediately (spec §7).
    pub fn is_retryable(self) -> bool {
        !matches!(self, AutofsError::Interrupted)
    }
}

impl fmt::Display for AutofsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutofsError::Busy => write!(f, "control channel already open"),
            AutofsError::NoSuchRequest => write!(f, "no such request"),
            AutofsError::Timeout => write!(f, "request timed out"),
            AutofsError::GoneAway => write!(f, "mount was torn down"),
            AutofsError::Interrupted => write!(f, "wait interrupted by signal"),
            AutofsError::Daemon(errno) => write!(f, "daemon reported error {errno}"),
        }
    }
}

impl std::error::Error for AutofsError {}
