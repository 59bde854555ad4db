// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Prioritized update queues.
//!
//! An [`UpdateQueue`] holds a base state and an ordered list of pending
//! updates, each tagged with the [`ExpirationTime`] it was scheduled at.
//! Processing at a render expiration time applies every update with enough
//! priority, in order. An update without enough priority is skipped, and so
//! is everything after it (even updates that would qualify), so that the
//! final state is always the result of applying the whole list in order once
//! the skipped work is rendered. The base state is rebased onto the state
//! just before the first skipped update.
//!
//! ```text
//!   base=0   [+1 @Sync] [+10 @Idle] [+100 @Sync]     render at Sync
//!   state=101 (applies +1 and +100)
//!   new base=1, queue=[+10 @Idle] [+100 @Sync]       remaining=Idle
//! ```

use alloc::vec::Vec;

use crate::expiration::ExpirationTime;

/// One pending update.
#[derive(Clone, Debug)]
pub struct Update<P> {
    /// Priority this update was scheduled at.
    pub expiration_time: ExpirationTime,
    /// What to apply.
    pub payload: P,
}

/// A base state plus pending updates.
#[derive(Clone, Debug)]
pub struct UpdateQueue<S, P> {
    base_state: S,
    updates: Vec<Update<P>>,
}

impl<S: Clone, P> UpdateQueue<S, P> {
    /// Creates a queue with no pending updates.
    #[must_use]
    pub fn new(base_state: S) -> Self {
        Self {
            base_state,
            updates: Vec::new(),
        }
    }

    /// The state before any pending update.
    #[must_use]
    pub fn base_state(&self) -> &S {
        &self.base_state
    }

    /// Pending updates in application order.
    #[must_use]
    pub fn updates(&self) -> &[Update<P>] {
        &self.updates
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Appends an update.
    pub fn enqueue(&mut self, update: Update<P>) {
        self.updates.push(update);
    }

    /// Applies every update with enough priority for `render_time`.
    ///
    /// Returns the resulting state and the most urgent expiration time among
    /// updates left in the queue ([`ExpirationTime::NO_WORK`] if none).
    pub fn process(
        &mut self,
        render_time: ExpirationTime,
        mut reduce: impl FnMut(&S, &P) -> S,
    ) -> (S, ExpirationTime) {
        let mut state = self.base_state.clone();
        let mut first_skipped: Option<usize> = None;
        let mut new_base = None;
        let mut remaining = ExpirationTime::NO_WORK;

        for (i, update) in self.updates.iter().enumerate() {
            if update.expiration_time < render_time {
                if first_skipped.is_none() {
                    first_skipped = Some(i);
                    new_base = Some(state.clone());
                }
                remaining = remaining.max(update.expiration_time);
            } else {
                state = reduce(&state, &update.payload);
            }
        }

        match first_skipped {
            Some(i) => {
                self.updates.drain(..i);
                if let Some(base) = new_base {
                    self.base_state = base;
                }
            }
            None => {
                self.updates.clear();
                self.base_state = state.clone();
            }
        }
        (state, remaining)
    }
}
