// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The yield collaborator consulted between units of work.
//!
//! The work loop never blocks. Between two fiber units it asks a
//! [`WorkScheduler`] whether the host wants control back; if so, the loop
//! stops at the exact next unit and resumes there on the next call to
//! [`Reconciler::perform_work`](crate::reconciler::Reconciler::perform_work).
//! Synchronous renders never consult the scheduler.

/// Decides when the work loop should hand control back to the host.
pub trait WorkScheduler {
    /// Called before each unit of work. Returning `true` pauses the render.
    fn should_yield(&mut self) -> bool;
}

/// A scheduler that never yields.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverYield;

impl WorkScheduler for NeverYield {
    fn should_yield(&mut self) -> bool {
        false
    }
}

/// A scheduler that grants a fixed number of units, then yields.
#[derive(Clone, Copy, Debug)]
pub struct UnitBudget {
    remaining: u32,
    spent: u32,
}

impl UnitBudget {
    /// Creates a budget allowing `units` units of work.
    #[must_use]
    pub const fn new(units: u32) -> Self {
        Self {
            remaining: units,
            spent: 0,
        }
    }

    /// Grants `units` more units.
    pub fn refill(&mut self, units: u32) {
        self.remaining = self.remaining.saturating_add(units);
    }

    /// Units still available.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Units consumed so far.
    #[must_use]
    pub const fn spent(&self) -> u32 {
        self.spent
    }
}

impl WorkScheduler for UnitBudget {
    fn should_yield(&mut self) -> bool {
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        self.spent += 1;
        false
    }
}

impl<S: WorkScheduler + ?Sized> WorkScheduler for &mut S {
    fn should_yield(&mut self) -> bool {
        (**self).should_yield()
    }
}
