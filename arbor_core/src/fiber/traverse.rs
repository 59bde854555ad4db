// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use alloc::vec::Vec;

use super::FiberId;
use super::arena::FiberArena;
use crate::host::HostConfig;

/// An iterator over the direct children of a fiber.
///
/// Created by [`FiberArena::children`].
pub struct Children<'a, H: HostConfig> {
    arena: &'a FiberArena<H>,
    current: Option<FiberId>,
}

impl<'a, H: HostConfig> Children<'a, H> {
    pub(crate) fn new(arena: &'a FiberArena<H>, first: Option<FiberId>) -> Self {
        Self {
            arena,
            current: first,
        }
    }
}

impl<H: HostConfig> core::fmt::Debug for Children<'_, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Children")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl<H: HostConfig> Iterator for Children<'_, H> {
    type Item = FiberId;

    fn next(&mut self) -> Option<FiberId> {
        let id = self.current?;
        self.current = self.arena[id].sibling;
        Some(id)
    }
}

/// A depth-first pre-order iterator over a subtree, root included.
///
/// Follows `child` and `sibling` links only, so it is safe on subtrees whose
/// `return_fiber` links still point into the other tree.
///
/// Created by [`FiberArena::descendants`].
pub struct Descendants<'a, H: HostConfig> {
    arena: &'a FiberArena<H>,
    pending: Vec<FiberId>,
}

impl<'a, H: HostConfig> Descendants<'a, H> {
    pub(crate) fn new(arena: &'a FiberArena<H>, root: FiberId) -> Self {
        Self {
            arena,
            pending: alloc::vec![root],
        }
    }
}

impl<H: HostConfig> core::fmt::Debug for Descendants<'_, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Descendants")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl<H: HostConfig> Iterator for Descendants<'_, H> {
    type Item = FiberId;

    fn next(&mut self) -> Option<FiberId> {
        let id = self.pending.pop()?;
        let start = self.pending.len();
        self.pending.extend(Children::new(self.arena, self.arena[id].child));
        self.pending[start..].reverse();
        Some(id)
    }
}
