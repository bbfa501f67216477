//! In-kernel trigger coordinator and node tree for an automounter
//! filesystem.
//!
//! This crate is the half of an autofs-style filesystem that is safe to
//! model without a real kernel boundary: a per-mount [`node`] tree of
//! directory entries, a process-wide [`request`] table that coalesces
//! concurrent lookups of the same map key into one outstanding request,
//! and the [`trigger`] entry point a host VFS calls on a cache miss. A
//! single-reader [`daemon`] channel stands in for the character device a
//! real kernel module would expose to the automount daemon.
//!
//! What this crate does *not* do: directory lookup/readdir/getattr
//! dispatch, mount/unmount syscall handling, or talking to naming
//! services. Those live in the host; this crate exposes [`adapter`] as the
//! seam a host implements against.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod adapter;
pub mod config;
pub mod daemon;
pub mod error;
pub mod mount;
pub mod node;
pub mod request;
mod timer;
pub mod trigger;
pub mod wire;

pub use crate::adapter::{AutomountHost, LookupOutcome};
pub use crate::config::Tunables;
pub use crate::daemon::{DaemonChannel, SessionId};
pub use crate::error::AutofsError;
pub use crate::mount::{Mount, MountId};
pub use crate::node::{Node, NodeAttr};
pub use crate::request::{Coordinator, Interrupt, RequestHandle, WaitOutcome};
pub use crate::trigger::{is_cached, trigger};
pub use crate::wire::{RequestDone, RequestFetch, MAX_PATH};
