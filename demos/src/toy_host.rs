//! A minimal host loop exercising `autofs-core`'s public API end to end:
//! opens the daemon channel, installs a toy [`AutomountHost`], and drives
//! a couple of lookups against an in-memory root while a background
//! "daemon" thread answers them — the same shape as `fuser`'s `hello.rs`
//! exercising `Filesystem` without a real kernel mount.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use autofs_core::{AutomountHost, Coordinator, DaemonChannel, Interrupt, Mount, Node, SessionId};
use clap::Parser;

#[derive(Parser)]
#[command(version, about = "Drives autofs-core's public API against an in-memory map")]
struct Args {
    /// Map keys to resolve against the root, in order.
    #[clap(default_value = "home,scratch")]
    keys: String,
}

/// The toy host's view of vnode state: nothing is ever "already mounted
/// here," there is one interrupt source per process for simplicity, and
/// the host's own thread is never the daemon thread.
struct ToyHost {
    session: SessionId,
}

impl AutomountHost for ToyHost {
    fn already_mounted_here(&self, _node: &Arc<Node>) -> bool {
        false
    }

    fn interrupt(&self) -> Interrupt {
        Interrupt::new()
    }

    fn session(&self) -> SessionId {
        self.session
    }

    fn release_vnode_lock(&self, _node: &Arc<Node>) {
        // No vnode lock in this toy host: nothing to release.
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let coordinator = Arc::new(Coordinator::new());
    let mount = Mount::new(Arc::clone(&coordinator), "maps.home", "/mnt/home", "", "");

    let daemon_session = SessionId::from_raw(1);
    let daemon = DaemonChannel::open(Arc::clone(&coordinator), daemon_session).unwrap();
    let shutdown = Interrupt::new();
    let daemon_thread = {
        let mount = Arc::clone(&mount);
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            loop {
                let fetched = match daemon.fetch(&shutdown) {
                    Ok(fetched) => fetched,
                    Err(_) => break,
                };
                log::info!("daemon fetched request {} for key {:?}", fetched.id, fetched.key);
                mount.new_child(&mount.root(), &fetched.key);
                daemon
                    .done(autofs_core::RequestDone { id: fetched.id, error: 0, wildcards: false })
                    .unwrap();
            }
        })
    };

    let host = ToyHost { session: SessionId::from_raw(99) };
    let root = mount.root();
    for key in args.keys.split(',') {
        let outcome = autofs_core::adapter::trigger_event(&mount, &root, Some(key), &host);
        match outcome {
            Ok(()) => log::info!("trigger for {key:?} succeeded"),
            Err(err) => log::warn!("trigger for {key:?} failed: {err}"),
        }
    }

    // Give the demo a moment before tearing the daemon channel down.
    thread::sleep(Duration::from_millis(50));
    shutdown.raise(&coordinator);
    daemon_thread.join().unwrap();
}
