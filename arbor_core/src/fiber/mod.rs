// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fibers and the arena that owns them.
//!
//! Both the current tree and the work-in-progress tree live in one
//! [`FiberArena`]. Tree links (`return_fiber`, `child`, `sibling`) and the
//! `alternate` pairing between the two trees are plain [`FiberId`] fields,
//! so cyclic structure never needs shared ownership.
//!
//! Pairing is reciprocal and lazy: a fiber gets a counterpart the first time
//! [`FiberArena::create_work_in_progress`] is called for it, and from then
//! on the two fibers swap roles at every commit.

mod arena;
mod id;
mod node;
mod traverse;

pub use arena::FiberArena;
pub use id::FiberId;
pub use node::{EffectFlags, Fiber, MemoizedState, RootQueue, UpdateSlot, WorkTag};
pub use traverse::{Children, Descendants};
