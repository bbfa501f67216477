//! Runtime-tunable knobs (spec §6), exposed the way `original_source`'s
//! `autofs_sysctl` does: one independently readable/writable value per
//! knob, read without locking.
//!
//! Each knob is its own atomic rather than fields behind a shared lock,
//! because the spec is explicit that these are "read without locking" on
//! every access from the hot path (`is_cached`, `trigger`, the timeout
//! timers). A `RwLock<Struct>` would force every reader through a lock a
//! writer could be holding; plain atomics give independent, wait-free
//! access per knob, matching the sysctl model it's drawn from.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Verbosity level for `log::debug!` call sites throughout the crate.
/// Kept as a knob (rather than relying solely on the host's log filter)
/// because the original gates its most chatty `AUTOFS_DEBUG` messages
/// behind `autofs_debug > 1`, distinct from `AUTOFS_WARN`'s `> 0`.
pub const DEFAULT_DEBUG: i64 = 1;
/// `stat(2)` on a mountpoint does not trigger by default.
pub const DEFAULT_MOUNT_ON_STAT: bool = false;
/// Seconds before an outstanding request is forcibly timed out.
pub const DEFAULT_TIMEOUT_SECS: i64 = 30;
/// Seconds a successful trigger result stays cached.
pub const DEFAULT_CACHE_SECS: i64 = 600;
/// Maximum consecutive retries `trigger()` performs before giving up.
pub const DEFAULT_RETRY_ATTEMPTS: i64 = 3;
/// Seconds to sleep between retries.
pub const DEFAULT_RETRY_DELAY_SECS: i64 = 1;
/// Whether a signal may interrupt a parked waiter.
pub const DEFAULT_INTERRUPTIBLE: bool = true;

/// The full set of runtime tunables, shared by reference across mounts and
/// the coordinator.
///
/// `Tunables::default()` matches spec.md §6's defaults exactly.
#[derive(Debug)]
pub struct Tunables {
    debug: AtomicI64,
    mount_on_stat: AtomicBool,
    timeout_secs: AtomicI64,
    cache_secs: AtomicI64,
    retry_attempts: AtomicI64,
    retry_delay_secs: AtomicI64,
    interruptible: AtomicBool,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            debug: AtomicI64::new(DEFAULT_DEBUG),
            mount_on_stat: AtomicBool::new(DEFAULT_MOUNT_ON_STAT),
            timeout_secs: AtomicI64::new(DEFAULT_TIMEOUT_SECS),
            cache_secs: AtomicI64::new(DEFAULT_CACHE_SECS),
            retry_attempts: AtomicI64::new(DEFAULT_RETRY_ATTEMPTS),
            retry_delay_secs: AtomicI64::new(DEFAULT_RETRY_DELAY_SECS),
            interruptible: AtomicBool::new(DEFAULT_INTERRUPTIBLE),
        }
    }
}

macro_rules! int_knob {
    ($get:ident, $set:ident, $field:ident) => {
        /// Current value of this knob.
        pub fn $get(&self) -> i64 {
            self.$field.load(Ordering::Relaxed)
        }

        /// Updates this knob. Takes effect for the next read; in-flight
        /// waits are not retroactively affected.
        pub fn $set(&self, value: i64) {
            self.$field.store(value, Ordering::Relaxed);
        }
    };
}

macro_rules! bool_knob {
    ($get:ident, $set:ident, $field:ident) => {
        /// Current value of this knob.
        pub fn $get(&self) -> bool {
            self.$field.load(Ordering::Relaxed)
        }

        /// Updates this knob.
        pub fn $set(&self, value: bool) {
            self.$field.store(value, Ordering::Relaxed);
        }
    };
}

impl Tunables {
    int_knob!(debug, set_debug, debug);
    bool_knob!(mount_on_stat, set_mount_on_stat, mount_on_stat);
    int_knob!(timeout_secs, set_timeout_secs, timeout_secs);
    int_knob!(cache_secs, set_cache_secs, cache_secs);
    int_knob!(retry_attempts, set_retry_attempts, retry_attempts);
    int_knob!(retry_delay_secs, set_retry_delay_secs, retry_delay_secs);
    bool_knob!(interruptible, set_interruptible, interruptible);

    /// Convenience accessor used by the retry loop; negative values (which
    /// would make no sense for a count) are floored to zero rather than
    /// panicking, since these are host-writable at any time.
    pub fn retry_attempts_usize(&self) -> usize {
        self.retry_attempts().max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let t = Tunables::default();
        assert_eq!(t.debug(), 1);
        assert!(!t.mount_on_stat());
        assert_eq!(t.timeout_secs(), 30);
        assert_eq!(t.cache_secs(), 600);
        assert_eq!(t.retry_attempts(), 3);
        assert_eq!(t.retry_delay_secs(), 1);
        assert!(t.interruptible());
    }

    #[test]
    fn knobs_are_independently_writable() {
        let t = Tunables::default();
        t.set_cache_secs(0);
        t.set_timeout_secs(5);
        assert_eq!(t.cache_secs(), 0);
        assert_eq!(t.timeout_secs(), 5);
        assert_eq!(t.retry_attempts(), 3);
    }
}
