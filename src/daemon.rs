//! The daemon control channel (spec §3 "Daemon channel", §4.4 "Daemon
//! channel operations", §4.6 "Self-trigger suppression").
//!
//! `original_source` exposes this as a character device (`/dev/autofs`)
//! that a single userland daemon opens and issues `ioctl`s against. The
//! device-open/ioctl boundary is a VFS-adapter concern; what lives here is
//! the session bookkeeping and the open/close/fetch/done operations
//! themselves, grounded in `autofs_ioctl_request`, `autofs_ioctl_done`, and
//! `autofs_ioctl_open`/`autofs_ioctl_close`.

use std::sync::Arc;

use crate::error::AutofsError;
use crate::request::{Coordinator, Interrupt};
use crate::wire::{RequestDone, RequestFetch};

/// Identifies the thread or task that currently holds the daemon channel
/// open, so the trigger path can recognize and skip requests the daemon
/// itself would make (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a host-supplied identifier (a thread id, a PID, a task handle)
    /// as a `SessionId`. The coordinator never interprets this value; it
    /// only compares it for equality.
    pub fn from_raw(id: u64) -> SessionId {
        SessionId(id)
    }
}

/// A handle to the single open daemon channel for one [`Coordinator`].
/// Opening a second channel while one is already open fails with
/// [`AutofsError::Busy`] (`original_source`'s `autofs_ioctl_open`: "only
/// one daemon may have the device open").
#[derive(Debug)]
pub struct DaemonChannel {
    coordinator: Arc<Coordinator>,
    session: SessionId,
}

impl DaemonChannel {
    /// `open` (spec §4.4): claims the single daemon slot for `session`.
    pub fn open(coordinator: Arc<Coordinator>, session: SessionId) -> Result<DaemonChannel, AutofsError> {
        if coordinator.daemon_open() {
            return Err(AutofsError::Busy);
        }
        coordinator.set_daemon_open(true);
        log::info!("daemon channel opened");
        Ok(DaemonChannel { coordinator, session })
    }

    /// `close` (spec §4.4). Does not touch outstanding requests: those are
    /// drained by the mount's own unmount sweep, not by the daemon going
    /// away (a fresh daemon reopening the channel can still serve them).
    pub fn close(self) {
        self.coordinator.set_daemon_open(false);
        log::info!("daemon channel closed");
    }

    /// `fetch` (spec §4.4): blocks until a request is available, or until
    /// `interrupt` is raised.
    pub fn fetch(&self, interrupt: &Interrupt) -> Result<RequestFetch, AutofsError> {
        self.coordinator.daemon_fetch(self.session, interrupt)
    }

    /// `done` (spec §4.4): reports the outcome of a previously fetched
    /// request.
    pub fn done(&self, done: RequestDone) -> Result<(), AutofsError> {
        self.coordinator.daemon_complete(done.id as u64, done.error, done.wildcards)
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

/// Self-trigger suppression (spec §4.6): the daemon's own lookups inside an
/// automounted tree must never block on the request they'd themselves be
/// asked to resolve. The VFS adapter calls this before triggering, on the
/// same thread identity it used to construct the fetch's session.
pub fn is_daemon_thread(coordinator: &Coordinator, current_thread: SessionId) -> bool {
    coordinator.daemon_open() && coordinator.daemon_session() == Some(current_thread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Coordinator;

    #[test]
    fn only_one_daemon_channel_may_be_open() {
        let coordinator = Arc::new(Coordinator::new());
        let first = DaemonChannel::open(Arc::clone(&coordinator), SessionId::from_raw(1)).unwrap();
        let err = DaemonChannel::open(Arc::clone(&coordinator), SessionId::from_raw(2)).unwrap_err();
        assert_eq!(err, AutofsError::Busy);
        first.close();
        DaemonChannel::open(coordinator, SessionId::from_raw(3)).unwrap();
    }

    #[test]
    fn fetch_and_done_round_trip() {
        let coordinator = Arc::new(Coordinator::new());
        let mount = crate::mount::Mount::new(Arc::clone(&coordinator), "maps.home", "/mnt/home", "", "");
        let root = mount.root();
        let handle = coordinator.submit_or_join(&mount, &root, Some("joe"));

        let channel = DaemonChannel::open(Arc::clone(&coordinator), SessionId::from_raw(42)).unwrap();
        let interrupt = Interrupt::new();
        let fetched = channel.fetch(&interrupt).unwrap();
        assert_eq!(fetched.key, "joe");

        channel.done(RequestDone { id: fetched.id, error: 0, wildcards: false }).unwrap();
        let outcome = coordinator.wait(&root, handle, &Interrupt::new());
        assert!(outcome.result.is_ok());
    }

    #[test]
    fn session_identifies_the_daemon_thread() {
        let coordinator = Arc::new(Coordinator::new());
        let session = SessionId::from_raw(7);
        let mount = crate::mount::Mount::new(Arc::clone(&coordinator), "maps.home", "/mnt/home", "", "");
        let root = mount.root();
        coordinator.submit_or_join(&mount, &root, Some("x"));

        let channel = DaemonChannel::open(Arc::clone(&coordinator), session).unwrap();
        assert!(!is_daemon_thread(&coordinator, session), "session is only recorded once a fetch completes");
        channel.fetch(&Interrupt::new()).unwrap();
        assert!(is_daemon_thread(&coordinator, session));
        assert!(!is_daemon_thread(&coordinator, SessionId::from_raw(99)));
    }

    #[test]
    fn closed_channel_stops_suppressing_its_stale_session() {
        let coordinator = Arc::new(Coordinator::new());
        let session = SessionId::from_raw(7);
        let mount = crate::mount::Mount::new(Arc::clone(&coordinator), "maps.home", "/mnt/home", "", "");
        let root = mount.root();
        coordinator.submit_or_join(&mount, &root, Some("x"));

        let channel = DaemonChannel::open(Arc::clone(&coordinator), session).unwrap();
        channel.fetch(&Interrupt::new()).unwrap();
        assert!(is_daemon_thread(&coordinator, session));

        channel.close();
        // The coordinator still remembers `session` as the last daemon
        // session, but with no channel open nobody should be suppressed,
        // even if a later unrelated caller is assigned the same id.
        assert!(!is_daemon_thread(&coordinator, session));
    }
}
