//! The public trigger coordinator entry point (spec §4.3 "Trigger
//! coordinator", §4.5 "Cache test with root-wildcard exception").
//!
//! Everything in [`Coordinator`]/[`Node`] is plumbing; `trigger` is the
//! operation a VFS adapter actually calls on a lookup/readdir/getattr miss.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::AutofsError;
use crate::mount::Mount;
use crate::node::Node;
use crate::request::Interrupt;

/// `is_cached` (spec §4.5). Applies the root-wildcard exception on top of
/// the node's plain `cached` flag: a wildcard root stays willing to
/// re-trigger for any component it hasn't seen yet, even while otherwise
/// cached.
pub fn is_cached(node: &Arc<Node>, component: Option<&str>) -> bool {
    if node.is_root() {
        if let Some(component) = component {
            if node.wildcards() && Node::find(node, component).is_none() {
                return false;
            }
        }
    }
    node.is_cached_flag()
}

/// `trigger` (spec §4.3): submits (or joins) a request for `(node,
/// component)`, parks the caller until it completes, and retries transient
/// failures up to `retry_attempts` times before giving up.
///
/// The VFS adapter must have released any vnode lock before calling this
/// (spec §5) and must have already checked [`crate::daemon::is_daemon_thread`]
/// (spec §4.4) — `trigger` itself does not consult self-trigger
/// suppression.
pub fn trigger(
    mount: &Arc<Mount>,
    node: &Arc<Node>,
    component: Option<&str>,
    interrupt: &Interrupt,
) -> Result<(), AutofsError> {
    let coordinator = mount.coordinator();
    let tunables = coordinator.tunables();
    let retry_attempts = tunables.retry_attempts_usize();

    let mut attempts = 0usize;
    loop {
        let handle = coordinator.submit_or_join(mount, node, component);
        let outcome = coordinator.wait(node, handle, interrupt);

        match outcome.result {
            Ok(()) => {
                node.reset_retries();
                if let Some(cache_duration) = mount.cache_duration() {
                    node.set_wildcards(outcome.wildcards);
                    node.mark_cached();
                    node.arm_cache_timer(cache_duration);
                }
                return Ok(());
            }
            Err(err) if !err.is_retryable() => {
                node.reset_retries();
                return Err(err);
            }
            Err(err) => {
                attempts += 1;
                node.increment_retries();
                if attempts >= retry_attempts.max(1) {
                    node.reset_retries();
                    log::warn!(
                        "trigger for {} gave up after {attempts} attempt(s): {err}",
                        node.name()
                    );
                    return Err(err);
                }
                let delay = Duration::from_secs(tunables.retry_delay_secs().max(0) as u64);
                log::debug!(
                    "trigger for {} failed ({err}), retrying in {delay:?} (attempt {attempts}/{retry_attempts})",
                    node.name()
                );
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Coordinator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn setup() -> Arc<Mount> {
        Mount::new(Arc::new(Coordinator::new()), "maps.home", "/mnt/home", "", "")
    }

    #[test]
    fn success_clears_retries_and_caches_node() {
        let mount = setup();
        let root = mount.root();
        let coordinator = mount.coordinator();

        let m = Arc::clone(&mount);
        let handle = thread::spawn(move || {
            loop {
                if m.coordinator().request_count() > 0 {
                    break;
                }
                thread::sleep(StdDuration::from_millis(5));
            }
            let id = {
                let interrupt = Interrupt::new();
                let fetched = m
                    .coordinator()
                    .daemon_fetch(crate::daemon::SessionId::from_raw(1), &interrupt)
                    .unwrap();
                fetched.id as u64
            };
            m.coordinator().daemon_complete(id, 0, true).unwrap();
        });

        let interrupt = Interrupt::new();
        let result = trigger(&mount, &root, Some("joe"), &interrupt);
        handle.join().unwrap();

        assert!(result.is_ok());
        assert_eq!(root.retries(), 0);
        assert!(root.is_cached_flag());
        assert!(root.wildcards());
        assert_eq!(coordinator.request_count(), 0);
    }

    #[test]
    fn exhausted_retries_surface_the_last_error() {
        let tunables = Arc::new(crate::config::Tunables::default());
        tunables.set_timeout_secs(0);
        tunables.set_retry_attempts(2);
        tunables.set_retry_delay_secs(0);
        let coordinator = Arc::new(Coordinator::with_tunables(tunables));
        let mount = Mount::new(coordinator, "maps.home", "/mnt/home", "", "");
        let root = mount.root();

        let interrupt = Interrupt::new();
        let result = trigger(&mount, &root, Some("joe"), &interrupt);
        assert_eq!(result.unwrap_err(), AutofsError::Timeout);
        assert_eq!(root.retries(), 0, "retries reset after giving up");
        assert!(!root.is_cached_flag());
    }

    #[test]
    fn interrupt_returns_immediately_without_retrying() {
        let mount = setup();
        let root = mount.root();
        let coordinator = mount.coordinator();
        let attempts_before_interrupt = Arc::new(AtomicUsize::new(0));

        let interrupt = Interrupt::new();
        let raise_interrupt = interrupt.clone();
        let coordinator_for_signal = Arc::clone(&coordinator);
        let attempts = Arc::clone(&attempts_before_interrupt);
        let signaller = thread::spawn(move || {
            while coordinator_for_signal.request_count() == 0 {
                thread::sleep(StdDuration::from_millis(5));
            }
            attempts.fetch_add(1, Ordering::SeqCst);
            raise_interrupt.raise(&coordinator_for_signal);
        });

        let result = trigger(&mount, &root, Some("joe"), &interrupt);
        signaller.join().unwrap();

        assert_eq!(result.unwrap_err(), AutofsError::Interrupted);
        assert_eq!(root.retries(), 0);
        assert_eq!(attempts_before_interrupt.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn root_wildcard_forces_retrigger_for_unknown_components() {
        let mount = setup();
        let root = mount.root();
        root.set_wildcards(true);
        root.mark_cached();
        assert!(is_cached(&root, Some("unseen")) == false);
        assert!(is_cached(&root, None));
        mount.new_child(&root, "seen");
        assert!(is_cached(&root, Some("seen")));
    }

    #[test]
    fn non_root_node_ignores_wildcard_flag() {
        let mount = setup();
        let root = mount.root();
        let child = mount.new_child(&root, "a");
        child.set_wildcards(true);
        child.mark_cached();
        assert!(is_cached(&child, Some("anything")));
    }
}
