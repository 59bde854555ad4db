// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage for fibers.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use super::node::{EffectFlags, Fiber, WorkTag};
use super::traverse::{Children, Descendants};
use super::FiberId;
use crate::element::{Element, Props};
use crate::expiration::ExpirationTime;
use crate::host::HostConfig;

struct Slot<H: HostConfig> {
    generation: u32,
    fiber: Option<Fiber<H>>,
}

/// Owns every fiber of both trees, addressed by [`FiberId`].
///
/// Freed slots are reused with a bumped generation, so handles to freed
/// fibers fail validation instead of aliasing a new fiber. Indexing with a
/// stale handle panics; [`get`](Self::get) returns `None` instead.
pub struct FiberArena<H: HostConfig> {
    slots: Vec<Slot<H>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<H: HostConfig> core::fmt::Debug for FiberArena<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FiberArena")
            .field("slots", &self.slots.len())
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl<H: HostConfig> Default for FiberArena<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HostConfig> FiberArena<H> {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    // -- Allocation API --

    /// Stores a fiber and returns its handle.
    pub fn alloc(&mut self, fiber: Fiber<H>) -> FiberId {
        self.live += 1;
        if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.fiber = Some(fiber);
            return FiberId {
                idx,
                generation: slot.generation,
            };
        }
        let idx = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            fiber: Some(fiber),
        });
        FiberId { idx, generation: 0 }
    }

    /// Frees one fiber. A no-op for stale handles.
    pub fn free(&mut self, id: FiberId) -> Option<Fiber<H>> {
        let slot = self.slots.get_mut(id.idx as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let fiber = slot.fiber.take()?;
        // Bump generation so old handles immediately fail validation.
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.idx);
        self.live -= 1;
        Some(fiber)
    }

    /// Frees `root`, every descendant, and their alternates.
    pub fn free_subtree(&mut self, root: FiberId) {
        // (fiber, whether its sibling belongs to the subtree)
        let mut pending = alloc::vec![(root, false)];
        while let Some((id, inner)) = pending.pop() {
            let Some(fiber) = self.free(id) else {
                continue;
            };
            if let Some(child) = fiber.child {
                pending.push((child, true));
            }
            if let Some(sibling) = fiber.sibling.filter(|_| inner) {
                pending.push((sibling, true));
            }
            if let Some(alternate) = fiber.alternate {
                pending.push((alternate, inner));
            }
        }
    }

    /// Returns whether the handle refers to a live fiber.
    #[must_use]
    pub fn is_alive(&self, id: FiberId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live fibers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if no fiber is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns the fiber, or `None` for a stale handle.
    #[must_use]
    pub fn get(&self, id: FiberId) -> Option<&Fiber<H>> {
        self.slots
            .get(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.fiber.as_ref())
    }

    /// Returns the fiber mutably, or `None` for a stale handle.
    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber<H>> {
        self.slots
            .get_mut(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.fiber.as_mut())
    }

    /// Iterates the direct children of `id`.
    #[must_use]
    pub fn children(&self, id: FiberId) -> Children<'_, H> {
        Children::new(self, self[id].child)
    }

    /// Iterates `id` and everything below it in pre-order.
    #[must_use]
    pub fn descendants(&self, id: FiberId) -> Descendants<'_, H> {
        Descendants::new(self, id)
    }

    // -- Construction API --

    /// Allocates a root fiber.
    pub fn create_host_root(&mut self) -> FiberId {
        self.alloc(Fiber::new(WorkTag::HostRoot, None, None))
    }

    /// Allocates a fiber for `element`, with pending work at `expiration_time`.
    pub fn create_from_element(
        &mut self,
        element: &Element,
        expiration_time: ExpirationTime,
    ) -> FiberId {
        let mut fiber = Fiber::new(
            element.ty.initial_tag(),
            Some(element.props.clone()),
            element.key.clone(),
        );
        fiber.ty = Some(element.ty.clone());
        fiber.ref_handle = element.ref_handle.clone();
        fiber.expiration_time = expiration_time;
        self.alloc(fiber)
    }

    /// Returns the work-in-progress counterpart of `current`, creating it on
    /// first use.
    ///
    /// The counterpart is reused if it exists. Either way it starts with no
    /// effects and a copy of `current`'s committed fields; the caller links
    /// its `return_fiber`.
    pub fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: Option<Rc<Props>>,
    ) -> FiberId {
        let wip = match self[current].alternate {
            Some(wip) => {
                let fiber = &mut self[wip];
                fiber.pending_props = pending_props;
                fiber.flags = EffectFlags::NONE;
                fiber.next_effect = None;
                fiber.first_effect = None;
                fiber.last_effect = None;
                wip
            }
            None => {
                let c = &self[current];
                let mut fiber = Fiber::new(c.tag, pending_props, c.key.clone());
                fiber.ty = c.ty.clone();
                fiber.state_node = c.state_node.clone();
                let wip = self.alloc(fiber);
                self[wip].alternate = Some(current);
                self[current].alternate = Some(wip);
                wip
            }
        };

        let c = &self[current];
        let copied = (
            c.tag,
            c.ty.clone(),
            c.child_expiration_time,
            c.expiration_time,
            c.child,
            c.memoized_props.clone(),
            c.memoized_state.clone(),
            c.update_queue.clone(),
            c.dependencies.clone(),
            c.sibling,
            c.index,
            c.ref_handle.clone(),
        );
        let w = &mut self[wip];
        (
            w.tag,
            w.ty,
            w.child_expiration_time,
            w.expiration_time,
            w.child,
            w.memoized_props,
            w.memoized_state,
            w.update_queue,
            w.dependencies,
            w.sibling,
            w.index,
            w.ref_handle,
        ) = copied;
        wip
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    fn validate(&self, id: FiberId) -> usize {
        let idx = id.idx as usize;
        assert!(
            self.slots
                .get(idx)
                .is_some_and(|s| s.generation == id.generation && s.fiber.is_some()),
            "stale FiberId: {id:?} (current gen: {})",
            self.slots.get(idx).map_or(u32::MAX, |s| s.generation)
        );
        idx
    }
}

impl<H: HostConfig> Index<FiberId> for FiberArena<H> {
    type Output = Fiber<H>;

    fn index(&self, id: FiberId) -> &Fiber<H> {
        let idx = self.validate(id);
        match &self.slots[idx].fiber {
            Some(f) => f,
            None => unreachable!("validated slot is occupied"),
        }
    }
}

impl<H: HostConfig> IndexMut<FiberId> for FiberArena<H> {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber<H> {
        let idx = self.validate(id);
        match &mut self.slots[idx].fiber {
            Some(f) => f,
            None => unreachable!("validated slot is occupied"),
        }
    }
}
