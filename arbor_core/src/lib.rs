// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental fiber reconciliation.
//!
//! `arbor_core` keeps a persistent output tree in line with a declarative
//! description of it. It is `no_std` compatible (with `alloc`) and stores
//! both the committed tree and the work-in-progress tree in one
//! generational arena, addressed by [`FiberId`](fiber::FiberId) handles.
//!
//! # Architecture
//!
//! ```text
//!   update_container / set_state
//!       │   raise expiration times up to the root
//!       ▼
//!   perform_work(scheduler)
//!       │
//!       ▼
//!   ┌──────────── render (interruptible) ────────────┐
//!   │ begin_work ──► child ──► begin_work ...         │
//!   │     │ bailout: prune, or clone children         │
//!   │     ▼                                           │
//!   │ complete_work ──► sibling / parent ...          │
//!   │     effect list spliced bottom-up               │
//!   └─────────────────────────────────────────────────┘
//!       │   yields between units unless SYNC
//!       ▼
//!   commit: placement, update, deletion, refs ──► HostConfig
//! ```
//!
//! **[`fiber`]**: the fiber record, effect flags and the arena that owns
//! both trees, with reciprocal `alternate` pairing.
//!
//! **[`stack`]**: the push/pop ledger and the [`StackCursor`](stack::StackCursor)
//! every ancestor-scoped value is threaded through.
//!
//! **[`host_context`]**: root container and host context cursors.
//!
//! **[`context`]**: context values, per-fiber dependency lists, provider
//! value stack and change propagation.
//!
//! **[`work_loop`]**: the render session and the unit-of-work driver;
//! begin, complete and unwind live in private modules next to it.
//!
//! **[`reconciler`]**: the [`Reconciler`](reconciler::Reconciler) facade that
//! owns a host, its tree and the session.
//!
//! **[`element`]**, **[`hooks`]**, **[`update_queue`]**: the component model
//! rendered into fibers.
//!
//! **[`expiration`]**, **[`scheduler`]**: priorities and the yield
//! collaborator.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) and the zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod context;
pub mod element;
pub mod error;
pub mod expiration;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod host_context;
pub mod reconciler;
pub mod root;
pub mod scheduler;
pub mod stack;
pub mod trace;
pub mod update_queue;
pub mod work_loop;

mod begin_work;
mod child_fiber;
mod commit;
mod complete_work;
mod unwind_work;

#[cfg(test)]
mod testing;
