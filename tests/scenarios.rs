//! End-to-end scenarios S1-S6 from spec.md §8, driving `autofs-core`'s
//! public API the same way `fuser`'s `tests/integration_tests.rs` drives a
//! real session: `thread::spawn` standing in for the daemon and
//! concurrent callers, `std::time::Duration` for timing.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use autofs_core::{AutofsError, Coordinator, DaemonChannel, Interrupt, Mount, RequestDone, SessionId, Tunables};

fn mount_with_tunables(tunables: Tunables) -> (Arc<Coordinator>, Arc<Mount>) {
    let coordinator = Arc::new(Coordinator::with_tunables(Arc::new(tunables)));
    let mount = Mount::new(Arc::clone(&coordinator), "maps.home", "/mnt/home", "", "");
    (coordinator, mount)
}

/// S1 Single trigger succeeds.
#[test]
fn s1_single_trigger_succeeds() {
    let (coordinator, mount) = mount_with_tunables(Tunables::default());
    let root = mount.root();

    let daemon = DaemonChannel::open(Arc::clone(&coordinator), SessionId::from_raw(1)).unwrap();
    let daemon_interrupt = Interrupt::new();
    let fetched = daemon.fetch(&daemon_interrupt).unwrap();
    assert_eq!(fetched.key, "home");
    assert_eq!(fetched.path, "/mnt/home/");
    mount.new_child(&root, "home");
    daemon.done(RequestDone { id: fetched.id, error: 0, wildcards: false }).unwrap();

    let caller_interrupt = Interrupt::new();
    let result = autofs_core::trigger(&mount, &root, Some("home"), &caller_interrupt);
    assert!(result.is_ok());
    assert!(root.is_cached_flag());
    assert!(!root.wildcards());

    // A second trigger for the same key returns immediately from cache,
    // without submitting a fresh request.
    assert!(autofs_core::is_cached(&root, Some("home")));
    assert_eq!(coordinator.request_count(), 0);
}

/// S2 Wildcard root.
#[test]
fn s2_wildcard_root_forces_retrigger_for_unknown_names() {
    let (coordinator, mount) = mount_with_tunables(Tunables::default());
    let root = mount.root();

    let daemon = DaemonChannel::open(Arc::clone(&coordinator), SessionId::from_raw(1)).unwrap();
    let fetched = daemon.fetch(&Interrupt::new()).unwrap();
    mount.new_child(&root, "home");
    daemon.done(RequestDone { id: fetched.id, error: 0, wildcards: true }).unwrap();

    let result = autofs_core::trigger(&mount, &root, Some("home"), &Interrupt::new());
    assert!(result.is_ok());
    assert!(root.is_cached_flag());
    assert!(root.wildcards());

    // is_cached must still report false for names that aren't children
    // yet, even though the root's plain cached flag is true.
    assert!(!autofs_core::is_cached(&root, Some("other")));
    assert!(autofs_core::is_cached(&root, Some("home")));
}

/// S3 Coalescing.
#[test]
fn s3_coalescing_concurrent_callers_share_one_request() {
    let (coordinator, mount) = mount_with_tunables(Tunables::default());
    let root = mount.root();

    let daemon = DaemonChannel::open(Arc::clone(&coordinator), SessionId::from_raw(1)).unwrap();
    let daemon_mount = Arc::clone(&mount);
    let daemon_thread = thread::spawn(move || {
        let fetched = daemon.fetch(&Interrupt::new()).unwrap();
        daemon_mount.new_child(&daemon_mount.root(), &fetched.key);
        daemon.done(RequestDone { id: fetched.id, error: 0, wildcards: false }).unwrap();
    });

    let mount1 = Arc::clone(&mount);
    let root1 = Arc::clone(&root);
    let caller1 = thread::spawn(move || autofs_core::trigger(&mount1, &root1, Some("x"), &Interrupt::new()));
    let mount2 = Arc::clone(&mount);
    let root2 = Arc::clone(&root);
    let caller2 = thread::spawn(move || autofs_core::trigger(&mount2, &root2, Some("x"), &Interrupt::new()));

    assert!(caller1.join().unwrap().is_ok());
    assert!(caller2.join().unwrap().is_ok());
    daemon_thread.join().unwrap();
    assert_eq!(coordinator.request_count(), 0);
}

/// S4 Timeout then retry.
#[test]
fn s4_timeout_then_retry_gives_up_after_retry_attempts() {
    let mut tunables = Tunables::default();
    tunables.set_timeout_secs(0);
    tunables.set_retry_attempts(3);
    tunables.set_retry_delay_secs(0);
    let (_coordinator, mount) = mount_with_tunables(tunables);
    let root = mount.root();

    // Nobody ever consumes the fetch queue: every attempt times out.
    let result = autofs_core::trigger(&mount, &root, Some("x"), &Interrupt::new());
    assert_eq!(result.unwrap_err(), AutofsError::Timeout);
    assert_eq!(root.retries(), 0, "retry counter resets once trigger gives up");
    assert!(!root.is_cached_flag());
}

/// S5 Interrupted.
#[test]
fn s5_interrupted_caller_detaches_second_caller_still_succeeds() {
    let (coordinator, mount) = mount_with_tunables(Tunables::default());
    let root = mount.root();

    let interrupt1 = Interrupt::new();
    let mount1 = Arc::clone(&mount);
    let root1 = Arc::clone(&root);
    let interrupt1_for_caller = interrupt1.clone();
    let caller1 = thread::spawn(move || autofs_core::trigger(&mount1, &root1, Some("x"), &interrupt1_for_caller));

    let mount2 = Arc::clone(&mount);
    let root2 = Arc::clone(&root);
    let caller2 = thread::spawn(move || autofs_core::trigger(&mount2, &root2, Some("x"), &Interrupt::new()));

    // Wait until both callers have joined the same request, then signal
    // the first one out.
    while coordinator.request_count() < 1 {
        thread::sleep(Duration::from_millis(5));
    }
    thread::sleep(Duration::from_millis(20));
    interrupt1.raise(&coordinator);

    let result1 = caller1.join().unwrap();
    assert_eq!(result1.unwrap_err(), AutofsError::Interrupted);

    let daemon = DaemonChannel::open(Arc::clone(&coordinator), SessionId::from_raw(1)).unwrap();
    let fetched = daemon.fetch(&Interrupt::new()).unwrap();
    mount.new_child(&root, &fetched.key);
    daemon.done(RequestDone { id: fetched.id, error: 0, wildcards: false }).unwrap();

    let result2 = caller2.join().unwrap();
    assert!(result2.is_ok());
    assert_eq!(coordinator.request_count(), 0);
}

/// S6 Unmount sweep.
#[test]
fn s6_unmount_sweep_fails_parked_callers() {
    let (coordinator, mount) = mount_with_tunables(Tunables::default());
    let root = mount.root();

    let mount_for_caller = Arc::clone(&mount);
    let root_for_caller = Arc::clone(&root);
    let caller = thread::spawn(move || autofs_core::trigger(&mount_for_caller, &root_for_caller, Some("x"), &Interrupt::new()));

    while coordinator.request_count() < 1 {
        thread::sleep(Duration::from_millis(5));
    }
    let mount_id = mount.id();
    coordinator.teardown_sweep(mount_id);

    let result = caller.join().unwrap();
    assert_eq!(result.unwrap_err(), AutofsError::GoneAway);
    assert_eq!(coordinator.request_count(), 0);

    mount.teardown_tree();
}
