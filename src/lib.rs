//! # weir: control-plane leader for a multi-process dataplane
//!
//! A weir instance runs one **leader** process and any number of
//! **follower** workers. The leader owns the authoritative configuration
//! of the running app graph; followers execute the graph and never parse
//! configuration themselves.
//!
//! ## Control plane
//! Clients speak length-prefixed frames (`<ascii len>\n<payload>`) over a
//! local stream socket; payloads follow the `weir-config-leader-v1` JSON
//! convention ([`rpc`]). The method surface is `describe`, `get-config`,
//! `set-config`, `add-config` and `remove-config`, all path-addressed and
//! schema-checked by the mutators in [`weir_config`].
//!
//! ## Data plane hand-off
//! Every accepted mutation re-runs the user's `setup_fn` and diffs the new
//! app graph against the old one ([`graph`]). The resulting actions are
//! encoded ([`action`]) and shipped to each follower over a bounded
//! lock-free shared-memory ring ([`weir_shm::Ring`]), with per-follower
//! FIFO outboxes absorbing backpressure.
//!
//! ## Scheduling
//! The leader is single-threaded and cooperative: an embedding engine
//! calls [`Leader::pull`] once per iteration, and everything inside the
//! tick is non-blocking. A stalled client or an unborn follower channel
//! costs one state-machine visit per tick, nothing more.
#![warn(missing_docs)]

pub mod action;
pub mod follower;
pub mod graph;
pub mod leader;
pub mod rpc;

pub use crate::action::{decode, encode, Action, CodecError};
pub use crate::follower::{Follower, CHANNEL_NAME};
pub use crate::graph::{compute_config_actions, AppGraph, AppSpec};
pub use crate::leader::{Leader, LeaderOptions, SetupFn};
pub use crate::rpc::{Peer, PeerState, MAX_FRAME_LEN, PROTOCOL};
pub use weir_config::{
    ConfigError, Grammar, Path, Registry, ScalarKind, Schema, Value,
};
