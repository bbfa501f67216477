//! A single deferred-callback worker shared by request timeouts (spec
//! §4.2's "Timeout timer") and node cache-expiry timers (spec §4.1's
//! "Cache timer").
//!
//! `original_source` uses two different BSD mechanisms for these: a kernel
//! `timeout(9)` for the lightweight node cache-expiry (`autofs_node_timeout`
//! just flips a bool, safe from any context), and a dedicated `taskq`
//! (`autofs_tmo_tq`) for request timeouts, which need full thread context
//! because they take a sleepable lock. Userspace threads have no
//! interrupt-context restriction, so both collapse here into one
//! delay-queue abstraction backed by a single worker thread.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    deadline: Instant,
    id: u64,
}

// BinaryHeap is a max-heap; we want the earliest deadline out first.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.deadline.cmp(&self.deadline).then(other.id.cmp(&self.id))
    }
}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for Scheduled {}

struct Inner {
    heap: BinaryHeap<Reverse<Scheduled>>,
    pending: HashMap<u64, Callback>,
    shutdown: bool,
}

/// Background delay-queue. Cheap to clone-share via `Arc`; the worker
/// thread lives as long as any handle does.
pub struct Timers {
    inner: Mutex<Inner>,
    condvar: Condvar,
    next_id: AtomicU64,
}

/// A handle to a scheduled callback. Cancelling is idempotent: cancelling
/// twice, or cancelling after the callback already fired, is a no-op
/// (spec §4.1: "must be idempotent against a concurrent timer fire").
#[derive(Clone)]
pub struct TimerHandle {
    id: u64,
    timers: Arc<Timers>,
}

impl TimerHandle {
    /// Prevents the callback from firing, if it hasn't already.
    pub fn cancel(&self) {
        let mut inner = self.timers.inner.lock().unwrap();
        inner.pending.remove(&self.id);
        // The id stays in `heap` as a dangling entry; the worker discards
        // it (no matching `pending` entry) when it's popped. We don't
        // bother scanning the heap to remove it early - the heap entry is
        // tiny and this keeps cancellation O(1).
    }
}

impl Timers {
    fn new() -> Arc<Timers> {
        let timers = Arc::new(Timers {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                pending: HashMap::new(),
                shutdown: false,
            }),
            condvar: Condvar::new(),
            next_id: AtomicU64::new(1),
        });
        let worker_timers = Arc::clone(&timers);
        thread::Builder::new()
            .name("autofs-timers".into())
            .spawn(move || worker_timers.run())
            .expect("failed to spawn autofs-timers thread");
        timers
    }

    /// The process-wide timer worker (spec §9: "Process-wide singleton").
    pub fn global() -> Arc<Timers> {
        static TIMERS: OnceLock<Arc<Timers>> = OnceLock::new();
        Arc::clone(TIMERS.get_or_init(Timers::new))
    }

    /// Schedules `callback` to run after `delay`. Returns a handle that can
    /// cancel it before it fires.
    pub fn schedule(self: &Arc<Self>, delay: Duration, callback: impl FnOnce() + Send + 'static) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + delay;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.insert(id, Box::new(callback));
            inner.heap.push(Reverse(Scheduled { deadline, id }));
        }
        self.condvar.notify_one();
        TimerHandle { id, timers: Arc::clone(self) }
    }

    fn run(self: Arc<Self>) {
        loop {
            let due = {
                let mut inner = self.inner.lock().unwrap();
                loop {
                    if inner.shutdown {
                        return;
                    }
                    match inner.heap.peek() {
                        None => {
                            inner = self.condvar.wait(inner).unwrap();
                        }
                        Some(Reverse(scheduled)) => {
                            let now = Instant::now();
                            if scheduled.deadline <= now {
                                let Reverse(scheduled) = inner.heap.pop().unwrap();
                                break inner.pending.remove(&scheduled.id);
                            }
                            let (guard, _timeout) = self
                                .condvar
                                .wait_timeout(inner, scheduled.deadline - now)
                                .unwrap();
                            inner = guard;
                        }
                    }
                }
            };
            if let Some(callback) = due {
                callback();
            }
        }
    }
}

impl std::fmt::Debug for Timers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timers").finish_non_exhaustive()
    }
}
