//! The automount node tree (spec §3 "Node", §4.1 "Node tree").
//!
//! A node is reached only through `Arc<Node>`: the VFS adapter keeps
//! non-owning weak references to nodes while a vnode refers to one (spec §9
//! "Weak back-pointers"), and a node's own `parent` pointer is likewise
//! `Weak` so the tree has no reference cycles. Mutable per-node state
//! (`cached`, `wildcards`, `retries`) lives in atomics rather than behind a
//! lock of its own: the spec calls these "plain flag writes" protected by
//! the *mount's* lock, and atomics give the same torn-write-free guarantee
//! without forcing every reader through that lock, matching `is_cached`
//! being callable with no lock held at all (`original_source`'s
//! `autofs_cached` asserts the mount lock is *unlocked* on entry).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::mount::Mount;
use crate::timer::TimerHandle;

/// Root inode number (spec §3: "root inode is 1").
pub const ROOT_INO: u64 = 1;

/// Logical block size reported in [`NodeAttr`], matching
/// `original_source`'s `S_BLKSIZE`.
pub const BLOCK_SIZE: u64 = 512;

/// Fixed link count reported for every automount directory
/// (`original_source`'s `autofs_getattr` sets `va_nlink = 3` unconditionally
/// rather than counting children).
pub const DIR_NLINK: u32 = 3;

/// Fixed directory mode reported for every automount directory.
pub const DIR_MODE: u32 = 0o755;

/// One directory entry in the automount tree.
pub struct Node {
    name: String,
    inode: u64,
    parent: Option<Weak<Node>>,
    mount: Weak<Mount>,
    children: Mutex<BTreeMap<String, Arc<Node>>>,
    cached: AtomicBool,
    wildcards: AtomicBool,
    retries: AtomicU32,
    ctime: SystemTime,
    cache_timer: Mutex<Option<TimerHandle>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("inode", &self.inode)
            .field("cached", &self.cached.load(Ordering::Relaxed))
            .field("wildcards", &self.wildcards.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A point-in-time snapshot of a node's synthetic attributes, shaped after
/// `original_source`'s `autofs_getattr` (spec §10.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    /// Equal to the node's inode.
    pub inode: u64,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub block_size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl Node {
    pub(crate) fn new_root(mount: Weak<Mount>, now: SystemTime) -> Arc<Node> {
        Arc::new(Node {
            name: ".".to_string(),
            inode: ROOT_INO,
            parent: None,
            mount,
            children: Mutex::new(BTreeMap::new()),
            cached: AtomicBool::new(false),
            wildcards: AtomicBool::new(false),
            retries: AtomicU32::new(0),
            ctime: now,
            cache_timer: Mutex::new(None),
        })
    }

    /// `new_node` (spec §4.1). Allocates a node with inode `inode`,
    /// inserting it into `parent`'s children. The caller (`Mount`) is
    /// responsible for holding the mount's tree lock exclusively and for
    /// drawing `inode` from the mount's monotonic counter.
    ///
    /// Panics in debug builds if a sibling already uses `name`, mirroring
    /// the original's `KASSERT(autofs_node_find(...) == ENOENT)`.
    pub(crate) fn new_child(
        parent: &Arc<Node>,
        mount: Weak<Mount>,
        name: &str,
        inode: u64,
        now: SystemTime,
    ) -> Arc<Node> {
        let child = Arc::new(Node {
            name: name.to_string(),
            inode,
            parent: Some(Arc::downgrade(parent)),
            mount,
            children: Mutex::new(BTreeMap::new()),
            cached: AtomicBool::new(false),
            wildcards: AtomicBool::new(false),
            retries: AtomicU32::new(0),
            ctime: now,
            cache_timer: Mutex::new(None),
        });
        let mut children = parent.children.lock();
        debug_assert!(
            !children.contains_key(name),
            "new_node precondition violated: sibling {name:?} already exists"
        );
        children.insert(name.to_string(), Arc::clone(&child));
        child
    }

    /// `find` (spec §4.1): lexicographic lookup of a direct child by name.
    pub fn find(parent: &Arc<Node>, name: &str) -> Option<Arc<Node>> {
        parent.children.lock().get(name).cloned()
    }

    /// All direct children, in lexicographic (`name`) order, for readdir
    /// adapters.
    pub fn children(self: &Arc<Node>) -> Vec<Arc<Node>> {
        self.children.lock().values().cloned().collect()
    }

    /// `"."`  lookup shortcut (spec §10.3): returns the same node, never
    /// triggers.
    pub fn dot(self: &Arc<Node>) -> Arc<Node> {
        Arc::clone(self)
    }

    /// `".."` lookup shortcut (spec §10.3): returns the parent, or `None`
    /// at the root (an error to the VFS adapter, never a trigger).
    pub fn dotdot(self: &Arc<Node>) -> Option<Arc<Node>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// `delete` (spec §4.1). Caller must hold the mount tree lock
    /// exclusively and guarantee `children` is empty.
    pub(crate) fn delete(node: &Arc<Node>) {
        debug_assert!(
            node.children.lock().is_empty(),
            "delete precondition violated: node still has children"
        );
        if let Some(handle) = node.cache_timer.lock().take() {
            handle.cancel();
        }
        if let Some(parent) = node.parent.as_ref().and_then(Weak::upgrade) {
            parent.children.lock().remove(&node.name);
        }
    }

    /// `mark_cached` (spec §4.1).
    pub(crate) fn mark_cached(&self) {
        self.cached.store(true, Ordering::Release);
    }

    /// `mark_uncached` (spec §4.1), also used directly as the cache
    /// timer's fire callback.
    pub(crate) fn mark_uncached(&self) {
        self.cached.store(false, Ordering::Release);
    }

    /// Arms (replacing any previous) one-shot cache-expiry timer that calls
    /// `mark_uncached` on fire.
    pub(crate) fn arm_cache_timer(self: &Arc<Node>, delay: std::time::Duration) {
        let timers = crate::timer::Timers::global();
        let weak = Arc::downgrade(self);
        let handle = timers.schedule(delay, move || {
            if let Some(node) = weak.upgrade() {
                node.mark_uncached();
            }
        });
        let mut slot = self.cache_timer.lock();
        if let Some(previous) = slot.replace(handle) {
            previous.cancel();
        }
    }

    /// Whether the node is currently cached, ignoring the root-wildcard
    /// exception ([`crate::trigger::is_cached`] applies that on top).
    pub fn is_cached_flag(&self) -> bool {
        self.cached.load(Ordering::Acquire)
    }

    pub fn wildcards(&self) -> bool {
        self.wildcards.load(Ordering::Acquire)
    }

    pub(crate) fn set_wildcards(&self, value: bool) {
        self.wildcards.store(value, Ordering::Release);
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_retries(&self) {
        self.retries.store(0, Ordering::Relaxed);
    }

    pub(crate) fn increment_retries(&self) -> u32 {
        self.retries.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn mount_weak(&self) -> &Weak<Mount> {
        &self.mount
    }

    pub fn mount(&self) -> Option<Arc<Mount>> {
        self.mount.upgrade()
    }

    /// Attribute snapshot for a `getattr`-shaped VFS call (spec §10.2).
    pub fn attr(&self) -> NodeAttr {
        NodeAttr {
            inode: self.inode,
            mode: DIR_MODE,
            nlink: DIR_NLINK,
            size: BLOCK_SIZE,
            block_size: BLOCK_SIZE,
            atime: self.ctime,
            mtime: self.ctime,
            ctime: self.ctime,
        }
    }
}
