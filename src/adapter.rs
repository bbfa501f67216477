//! The VFS adapter boundary (spec §2 "VFS adapter (interface only)", §10
//! items 3-5).
//!
//! This module owns no state and drives no I/O; it is the thin seam a host
//! VFS would implement to turn lookup/readdir/getattr dispatch into calls
//! against [`crate::trigger`] and the node tree. `autofs-core` ships it as
//! a trait plus a couple of pure helpers so a host only has to supply the
//! handful of decisions that genuinely depend on vnode state it doesn't
//! expose to us (an already-mounted-here check, an interrupt source, a
//! session identity) — never to reimplement the coordinator's own rules.

use std::sync::Arc;

use crate::error::AutofsError;
use crate::mount::Mount;
use crate::node::Node;
use crate::request::Interrupt;

/// The outcome of a directory-entry lookup, before any triggering happens
/// (spec §10 item 4, "`EJUSTRETURN`-shaped create-intent lookup").
///
/// A plain `Option<Node>` can't distinguish "doesn't exist" from "doesn't
/// exist yet, but the caller intends to create it" — the second case skips
/// triggering entirely and tells the VFS layer to proceed with its own
/// create path, mirroring `autofs_lookup`'s `EJUSTRETURN` for `CREATE`
/// lookups.
pub enum LookupOutcome {
    /// The child already exists; no trigger is needed.
    Found(Arc<Node>),
    /// The child does not exist and the lookup was not for creation: the
    /// caller should trigger.
    Absent,
    /// The child does not exist and the lookup intends to create it: the
    /// caller should skip triggering and let the VFS layer create the
    /// entry itself.
    AbsentForCreate,
}

/// Looks up `name` under `parent`, applying the create-intent shortcut.
/// Does not trigger; callers combine this with [`crate::trigger::is_cached`]
/// and [`crate::trigger::trigger`] to decide whether to block.
pub fn lookup(mount: &Mount, parent: &Arc<Node>, name: &str, for_create: bool) -> LookupOutcome {
    match mount.find_child(parent, name) {
        Some(node) => LookupOutcome::Found(node),
        None if for_create => LookupOutcome::AbsentForCreate,
        None => LookupOutcome::Absent,
    }
}

/// A host-supplied view of whatever vnode state the core itself does not
/// own: whether a real filesystem is already mounted at this point (spec
/// §10 item 5, `autofs_trigger_vn`'s "already mounted here" short-circuit),
/// an interrupt source for a blocking wait, and the identity to check
/// self-trigger suppression against.
///
/// `autofs-core` never constructs this itself; a VFS adapter implements it
/// against its own vnode/thread types and passes it to [`trigger_event`].
pub trait AutomountHost {
    /// Whether a real filesystem is already mounted on top of `node`. When
    /// true, [`trigger_event`] returns `Ok(())` immediately without
    /// submitting a request — the coordinator's contract is simply that
    /// `trigger()` is idempotent to call again once a mount has appeared,
    /// but a host that already knows need not pay for the round trip.
    fn already_mounted_here(&self, node: &Arc<Node>) -> bool;

    /// The interrupt source the current call should wait against.
    fn interrupt(&self) -> Interrupt;

    /// The calling thread/process's session identity, for self-trigger
    /// suppression (spec §4.4).
    fn session(&self) -> crate::daemon::SessionId;

    /// Releases whatever vnode-level lock the adapter is holding on
    /// `node`. Called immediately before a blocking wait, never while the
    /// coordinator lock is held (spec §5: "the VFS adapter must release
    /// any vnode lock before calling `trigger()`").
    fn release_vnode_lock(&self, node: &Arc<Node>);
}

/// Turns a lookup/readdir/getattr miss on `(node, component)` into a
/// trigger call, applying self-trigger suppression (spec §4.4) and the
/// already-mounted-here short-circuit (spec §10 item 5) first.
///
/// This is the one function a VFS adapter's lookup/readdir/getattr hooks
/// should call; it is the full answer to "should I block, and on what."
pub fn trigger_event(
    mount: &Arc<Mount>,
    node: &Arc<Node>,
    component: Option<&str>,
    host: &impl AutomountHost,
) -> Result<(), AutofsError> {
    if host.already_mounted_here(node) {
        return Ok(());
    }
    if crate::daemon::is_daemon_thread(&mount.coordinator(), host.session()) {
        log::debug!("skipping trigger for {}: daemon thread walking its own mount", node.name());
        return Ok(());
    }
    if crate::trigger::is_cached(node, component) {
        return Ok(());
    }
    host.release_vnode_lock(node);
    let interrupt = host.interrupt();
    crate::trigger::trigger(mount, node, component, &interrupt)
}
