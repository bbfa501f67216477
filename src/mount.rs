//! A mounted automount subtree (spec §3 "Mount").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

use crate::node::Node;
use crate::request::Coordinator;

static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-process-lifetime identity for a [`Mount`], used by the
/// request table's unmount sweep to match requests against the mount being
/// torn down without holding a strong reference to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountId(u64);

impl MountId {
    fn fresh() -> MountId {
        MountId(NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One automounted subtree: the root of a node tree plus the identifying
/// strings every request against it carries (spec §3).
pub struct Mount {
    id: MountId,
    from: String,
    on: String,
    options: String,
    prefix: String,
    last_ino: AtomicU64,
    root: Arc<Node>,
    self_weak: std::sync::Weak<Mount>,
    /// Guards structural changes to the tree (insertion order, concurrent
    /// finds-during-insert). Node-local `Mutex`es already make individual
    /// field writes memory-safe; this lock is the contract surface spec §5
    /// describes ("one reader-writer lock per mount").
    tree_lock: RwLock<()>,
    coordinator: Arc<Coordinator>,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("from", &self.from)
            .field("on", &self.on)
            .finish_non_exhaustive()
    }
}

impl Mount {
    /// Creates a mount with a freshly allocated root node (inode 1).
    pub fn new(
        coordinator: Arc<Coordinator>,
        from: impl Into<String>,
        on: impl Into<String>,
        options: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Arc<Mount> {
        Arc::new_cyclic(|weak_mount| Mount {
            id: MountId::fresh(),
            from: from.into(),
            on: on.into(),
            options: options.into(),
            prefix: prefix.into(),
            last_ino: AtomicU64::new(crate::node::ROOT_INO + 1),
            root: Node::new_root(weak_mount.clone(), SystemTime::now()),
            self_weak: weak_mount.clone(),
            tree_lock: RwLock::new(()),
            coordinator,
        })
    }

    pub fn id(&self) -> MountId {
        self.id
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn on(&self) -> &str {
        &self.on
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn root(&self) -> Arc<Node> {
        Arc::clone(&self.root)
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    /// `new_node` (spec §4.1), scoped to this mount: draws the next inode
    /// and inserts under `parent`.
    pub fn new_child(&self, parent: &Arc<Node>, name: &str) -> Arc<Node> {
        let _guard = self.tree_lock.write();
        let inode = self.last_ino.fetch_add(1, Ordering::Relaxed);
        Node::new_child(parent, self.self_weak.clone(), name, inode, SystemTime::now())
    }

    /// `delete` (spec §4.1). Panics in debug builds if `node` still has
    /// children (the caller's precondition to uphold).
    pub fn delete_child(&self, node: &Arc<Node>) {
        let _guard = self.tree_lock.write();
        Node::delete(node);
    }

    /// `find` (spec §4.1), taking the tree lock in shared mode.
    pub fn find_child(&self, parent: &Arc<Node>, name: &str) -> Option<Arc<Node>> {
        let _guard = self.tree_lock.read();
        Node::find(parent, name)
    }

    /// Bulk eager cache flush, used on `MNT_UPDATE` remounts (spec §10.1,
    /// grounded in `original_source`'s `autofs_flush`): clears `cached` on
    /// the root and every direct child. Unlike the lazy per-node cache
    /// timer, this doesn't wait for expiry.
    pub fn flush(&self) {
        let _guard = self.tree_lock.write();
        for child in self.root.children() {
            child.mark_uncached();
        }
        self.root.mark_uncached();
        log::debug!("{}: mount flushed", self.on());
    }

    /// Tears the tree down bottom-up (spec §4.1 "Unmount"): repeatedly
    /// delete any leaf child of the root until only the root remains, then
    /// delete the root. Handles arbitrarily deep trees built by indirect
    /// maps even though ordinary directory removal is never supported.
    ///
    /// Callers must first drain the request table of this mount's requests
    /// (see [`Coordinator::teardown_sweep`]) so no new children can appear
    /// mid-teardown.
    pub fn teardown_tree(&self) {
        let _guard = self.tree_lock.write();
        loop {
            let mut node = match self.root.children().into_iter().next() {
                Some(child) => child,
                None => break,
            };
            loop {
                match node.children().into_iter().next() {
                    Some(grandchild) => node = grandchild,
                    None => break,
                }
            }
            Node::delete(&node);
        }
        Node::delete(&self.root);
    }

    /// Default cache duration (spec §4.2 "Success cache"), read from the
    /// coordinator's tunables.
    pub fn cache_duration(&self) -> Option<Duration> {
        let secs = self.coordinator.tunables().cache_secs();
        (secs > 0).then(|| Duration::from_secs(secs as u64))
    }
}
