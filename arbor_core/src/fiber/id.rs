// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generational fiber handles.

use core::fmt;

/// A handle to a fiber in a [`FiberArena`](super::FiberArena).
///
/// Uses a generational index to detect stale handles: if a fiber is freed and
/// its slot reused, the old `FiberId` will have a mismatched generation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl FiberId {
    /// Rebuilds a handle from its parts, as read back from a recording.
    ///
    /// The arena still checks the generation on every access.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            idx: index,
            generation,
        }
    }

    /// Returns the slot index of this handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation of this handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FiberId({}@{})", self.idx, self.generation)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.idx)
    }
}
