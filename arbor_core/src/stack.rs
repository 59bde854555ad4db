// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stack cursors: ancestor-scoped values threaded through the traversal.
//!
//! A [`StackCursor`] holds one current value. Pushing saves the old value and
//! overwrites it; popping restores it. Every push and pop is also recorded in
//! one shared [`FiberStack`] ledger, tagged with the fiber that performed it,
//! so the traversal can verify that pushes and pops nest exactly:
//!
//! ```text
//!   begin(A) push ──┐
//!     begin(B) push ──┐
//!     complete(B) pop ┘
//!   complete(A) pop ──┘
//! ```
//!
//! A pop on an empty ledger, or by a fiber that does not own the top frame,
//! is logged and ignored. The traversal checks [`FiberStack::is_empty`] once
//! a render completes and reports an unbalanced ledger as an invariant
//! violation.

use alloc::vec::Vec;

use crate::error::InvariantViolation;
use crate::fiber::FiberId;

/// The shared push/pop ledger for every cursor in a render session.
#[derive(Clone, Debug, Default)]
pub struct FiberStack {
    frames: Vec<FiberId>,
    pushes: u64,
    pops: u64,
}

impl FiberStack {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if every push has been matched by a pop.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of unmatched pushes.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The fiber that performed the most recent unmatched push.
    #[must_use]
    pub fn top(&self) -> Option<FiberId> {
        self.frames.last().copied()
    }

    /// Total pushes since the last reset.
    #[must_use]
    pub fn pushes(&self) -> u64 {
        self.pushes
    }

    /// Total pops since the last reset.
    #[must_use]
    pub fn pops(&self) -> u64 {
        self.pops
    }

    /// Discards every frame and counter.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.pushes = 0;
        self.pops = 0;
    }

    fn record_push(&mut self, fiber: FiberId) {
        self.frames.push(fiber);
        self.pushes += 1;
    }

    /// Checks that `fiber` owns the top frame. Logs and returns `false` if not.
    fn can_pop(&self, fiber: FiberId) -> bool {
        match self.top() {
            None => {
                tracing::error!(%fiber, "unexpected pop on an empty stack");
                false
            }
            Some(top) if top != fiber => {
                tracing::error!(%fiber, %top, "unexpected fiber popped");
                false
            }
            Some(_) => true,
        }
    }

    fn record_pop(&mut self) {
        self.frames.pop();
        self.pops += 1;
    }
}

/// A single-slot value holder with save/restore semantics.
#[derive(Clone, Debug)]
pub struct StackCursor<T> {
    current: T,
    default: T,
    saved: Vec<T>,
}

impl<T: Clone> StackCursor<T> {
    /// Creates a cursor holding `default`.
    #[must_use]
    pub fn new(default: T) -> Self {
        Self {
            current: default.clone(),
            default,
            saved: Vec::new(),
        }
    }

    /// The current value.
    #[inline]
    #[must_use]
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Saves the current value and replaces it with `value`.
    pub fn push(&mut self, stack: &mut FiberStack, value: T, fiber: FiberId) {
        let prev = core::mem::replace(&mut self.current, value);
        self.saved.push(prev);
        stack.record_push(fiber);
    }

    /// Restores the value saved by `fiber`'s matching push.
    ///
    /// A no-op (with an error logged) if the ledger is empty, if `fiber` does
    /// not own the top frame, or if this cursor has nothing saved.
    pub fn pop(&mut self, stack: &mut FiberStack, fiber: FiberId) {
        if !stack.can_pop(fiber) {
            return;
        }
        let Some(prev) = self.saved.pop() else {
            tracing::error!(%fiber, "pop on a cursor with no saved value");
            return;
        };
        self.current = prev;
        stack.record_pop();
    }

    /// Number of values saved by unmatched pushes on this cursor.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Drops every saved value and restores the default.
    pub fn reset(&mut self) {
        self.saved.clear();
        self.current = self.default.clone();
    }
}

impl<T: Clone> StackCursor<Option<T>> {
    /// Returns the current value, or `err` if nothing has been pushed.
    pub fn require(&self, err: InvariantViolation) -> Result<&T, InvariantViolation> {
        self.current.as_ref().ok_or(err)
    }
}
