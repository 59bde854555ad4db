// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Child reconciliation: matching a new list of elements against the current
//! children of a fiber.
//!
//! Children are matched by explicit key, or by sibling index when unkeyed.
//! A match of the same element type reuses the current fiber through
//! [`FiberArena::create_work_in_progress`]; anything else gets a fresh fiber.
//! When side effects are tracked, new and moved fibers are flagged
//! `PLACEMENT` and unmatched current fibers are flagged `DELETION` and
//! appended to the parent's effect list right away, ahead of the effects its
//! children will add during completion.
//!
//! Mounts do not track side effects: a new subtree is placed once, at its
//! root.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::element::Element;
use crate::error::InvariantViolation;
use crate::expiration::ExpirationTime;
use crate::fiber::{EffectFlags, FiberArena, FiberId};
use crate::host::HostConfig;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ChildKey {
    Key(Rc<str>),
    Index(u32),
}

impl ChildKey {
    fn of(key: Option<&Rc<str>>, index: u32) -> Self {
        match key {
            Some(key) => Self::Key(key.clone()),
            None => Self::Index(index),
        }
    }
}

/// Reconciles one parent's children.
pub(crate) struct ChildReconciler<'a, H: HostConfig> {
    arena: &'a mut FiberArena<H>,
    return_fiber: FiberId,
    render_time: ExpirationTime,
    track_side_effects: bool,
    created: Vec<FiberId>,
}

impl<'a, H: HostConfig> ChildReconciler<'a, H> {
    pub(crate) fn new(
        arena: &'a mut FiberArena<H>,
        return_fiber: FiberId,
        render_time: ExpirationTime,
        track_side_effects: bool,
    ) -> Self {
        Self {
            arena,
            return_fiber,
            render_time,
            track_side_effects,
            created: Vec::new(),
        }
    }

    /// Fibers allocated from elements, with no current counterpart.
    pub(crate) fn into_created(self) -> Vec<FiberId> {
        self.created
    }

    /// Builds the new child list and returns its first fiber.
    pub(crate) fn reconcile(
        &mut self,
        current_first_child: Option<FiberId>,
        new_children: &[Element],
    ) -> Option<FiberId> {
        let mut first: Option<FiberId> = None;
        let mut previous: Option<FiberId> = None;
        let mut old_fiber = current_first_child;
        let mut last_placed_index = 0;
        let mut new_idx = 0;

        // Walk both lists in step while slots keep matching.
        while let Some(old) = old_fiber {
            let Some(element) = new_children.get(new_idx) else {
                break;
            };
            let (slot, next_old) = if self.arena[old].index as usize > new_idx {
                (None, Some(old))
            } else {
                (Some(old), self.arena[old].sibling)
            };
            let Some(new_fiber) = self.update_slot(slot, element) else {
                old_fiber = slot.or(next_old);
                break;
            };
            if let Some(old) = slot {
                if self.arena[new_fiber].alternate.is_none() {
                    self.delete_child(old);
                }
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, new_idx);
            self.link(&mut first, &mut previous, new_fiber);
            old_fiber = next_old;
            new_idx += 1;
        }

        if new_idx == new_children.len() {
            self.delete_remaining_children(old_fiber);
            return first;
        }

        let Some(old) = old_fiber else {
            for (i, element) in new_children.iter().enumerate().skip(new_idx) {
                let fiber = self.create_child(element);
                last_placed_index = self.place_child(fiber, last_placed_index, i);
                self.link(&mut first, &mut previous, fiber);
            }
            return first;
        };

        let mut existing = self.map_remaining_children(old);
        for (i, element) in new_children.iter().enumerate().skip(new_idx) {
            let key = ChildKey::of(element.key.as_ref(), index_u32(i));
            let matched = existing.get(&key).copied();
            let fiber = self.update_element(matched, element);
            if self.track_side_effects && self.arena[fiber].alternate.is_some() {
                existing.remove(&key);
            }
            last_placed_index = self.place_child(fiber, last_placed_index, i);
            self.link(&mut first, &mut previous, fiber);
        }
        if self.track_side_effects {
            for (_, fiber) in existing {
                self.delete_child(fiber);
            }
        }
        first
    }

    fn link(&mut self, first: &mut Option<FiberId>, previous: &mut Option<FiberId>, fiber: FiberId) {
        match *previous {
            Some(prev) => self.arena[prev].sibling = Some(fiber),
            None => *first = Some(fiber),
        }
        *previous = Some(fiber);
    }

    /// `None` if the slot's key does not match the element.
    fn update_slot(&mut self, old: Option<FiberId>, element: &Element) -> Option<FiberId> {
        let old_key = old.and_then(|o| self.arena[o].key.clone());
        if element.key != old_key {
            return None;
        }
        Some(self.update_element(old, element))
    }

    fn update_element(&mut self, current: Option<FiberId>, element: &Element) -> FiberId {
        let reusable = current.filter(|&c| {
            self.arena[c]
                .ty
                .as_ref()
                .is_some_and(|ty| ty.same_type(&element.ty))
        });
        match reusable {
            Some(current) => {
                let fiber = self.use_fiber(current, element);
                self.arena[fiber].return_fiber = Some(self.return_fiber);
                fiber
            }
            None => self.create_child(element),
        }
    }

    fn use_fiber(&mut self, current: FiberId, element: &Element) -> FiberId {
        let clone = self
            .arena
            .create_work_in_progress(current, Some(element.props.clone()));
        let fiber = &mut self.arena[clone];
        fiber.index = 0;
        fiber.sibling = None;
        fiber.ty = Some(element.ty.clone());
        fiber.ref_handle = element.ref_handle.clone();
        clone
    }

    fn create_child(&mut self, element: &Element) -> FiberId {
        let fiber = self.arena.create_from_element(element, self.render_time);
        self.arena[fiber].return_fiber = Some(self.return_fiber);
        self.created.push(fiber);
        fiber
    }

    fn place_child(&mut self, fiber: FiberId, last_placed_index: u32, new_index: usize) -> u32 {
        let f = &mut self.arena[fiber];
        f.index = index_u32(new_index);
        if !self.track_side_effects {
            return last_placed_index;
        }
        let Some(current) = f.alternate else {
            f.flags.insert(EffectFlags::PLACEMENT);
            return last_placed_index;
        };
        let old_index = self.arena[current].index;
        if old_index < last_placed_index {
            self.arena[fiber].flags.insert(EffectFlags::PLACEMENT);
            last_placed_index
        } else {
            old_index
        }
    }

    fn delete_child(&mut self, child: FiberId) {
        if !self.track_side_effects {
            return;
        }
        let parent = self.return_fiber;
        match self.arena[parent].last_effect {
            Some(last) => self.arena[last].next_effect = Some(child),
            None => self.arena[parent].first_effect = Some(child),
        }
        self.arena[parent].last_effect = Some(child);
        let c = &mut self.arena[child];
        c.next_effect = None;
        c.flags = EffectFlags::DELETION;
    }

    fn delete_remaining_children(&mut self, first: Option<FiberId>) {
        if !self.track_side_effects {
            return;
        }
        let mut child = first;
        while let Some(c) = child {
            child = self.arena[c].sibling;
            self.delete_child(c);
        }
    }

    fn map_remaining_children(&self, first: FiberId) -> BTreeMap<ChildKey, FiberId> {
        let mut map = BTreeMap::new();
        let mut child = Some(first);
        while let Some(c) = child {
            let f = &self.arena[c];
            map.insert(ChildKey::of(f.key.as_ref(), f.index), c);
            child = f.sibling;
        }
        map
    }
}

fn index_u32(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

/// Copies `current`'s children onto `wip` without re-rendering them.
///
/// Fails if `wip`'s child list was replaced since it was cloned from
/// `current`.
pub(crate) fn clone_child_fibers<H: HostConfig>(
    arena: &mut FiberArena<H>,
    current: Option<FiberId>,
    wip: FiberId,
) -> Result<(), InvariantViolation> {
    if let Some(current) = current {
        if arena[wip].child != arena[current].child {
            return Err(InvariantViolation::ResumingWork(wip));
        }
    }
    let Some(mut current_child) = arena[wip].child else {
        return Ok(());
    };
    let props = arena[current_child].pending_props.clone();
    let mut new_child = arena.create_work_in_progress(current_child, props);
    arena[wip].child = Some(new_child);
    arena[new_child].return_fiber = Some(wip);
    while let Some(next) = arena[current_child].sibling {
        current_child = next;
        let props = arena[current_child].pending_props.clone();
        let cloned = arena.create_work_in_progress(current_child, props);
        arena[new_child].sibling = Some(cloned);
        arena[cloned].return_fiber = Some(wip);
        new_child = cloned;
    }
    arena[new_child].sibling = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Props;
    use crate::testing::TestHost;

    fn keyed(key: &str) -> Element {
        Element::host("li", Props::new()).with_key(key)
    }

    /// A committed parent with children built from `elements`.
    fn committed(arena: &mut FiberArena<TestHost>, elements: &[Element]) -> FiberId {
        let parent = arena.create_from_element(&Element::host("ul", Props::new()), ExpirationTime::NO_WORK);
        let first = ChildReconciler::new(arena, parent, ExpirationTime::SYNC, false).reconcile(None, elements);
        arena[parent].child = first;
        let mut child = first;
        while let Some(c) = child {
            arena[c].memoized_props = arena[c].pending_props.clone();
            child = arena[c].sibling;
        }
        parent
    }

    fn rerender(arena: &mut FiberArena<TestHost>, parent: FiberId, elements: &[Element]) -> (FiberId, Vec<FiberId>) {
        let wip = arena.create_work_in_progress(parent, None);
        let current_child = arena[parent].child;
        let first = ChildReconciler::new(arena, wip, ExpirationTime::SYNC, true).reconcile(current_child, elements);
        arena[wip].child = first;
        (wip, arena.children(wip).collect())
    }

    fn deletions(arena: &FiberArena<TestHost>, parent: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut effect = arena[parent].first_effect;
        while let Some(e) = effect {
            assert!(arena[e].flags.contains(EffectFlags::DELETION), "only deletions");
            out.push(e);
            effect = arena[e].next_effect;
        }
        out
    }

    #[test]
    fn mount_does_not_track_effects() {
        let mut arena = FiberArena::<TestHost>::new();
        let parent = committed(&mut arena, &[keyed("a"), keyed("b")]);
        let kids: Vec<_> = arena.children(parent).collect();
        assert_eq!(kids.len(), 2);
        assert!(kids.iter().all(|&k| arena[k].flags.is_empty()));
        assert!(kids.iter().all(|&k| arena[k].return_fiber == Some(parent)));
        assert_eq!(arena[kids[1]].index, 1);
        assert_eq!(arena[kids[0]].expiration_time, ExpirationTime::SYNC);
    }

    #[test]
    fn only_fresh_fibers_are_reported_as_created() {
        let mut arena = FiberArena::<TestHost>::new();
        let parent = committed(&mut arena, &[keyed("a")]);
        let wip = arena.create_work_in_progress(parent, None);
        let current_child = arena[parent].child;
        let mut reconciler = ChildReconciler::new(&mut arena, wip, ExpirationTime::SYNC, true);
        let first = reconciler.reconcile(current_child, &[keyed("a"), keyed("b")]);
        let created = reconciler.into_created();
        let second = first.and_then(|f| arena[f].sibling);
        assert_eq!(created, second.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn same_keys_reuse_fibers_without_placement() {
        let mut arena = FiberArena::<TestHost>::new();
        let parent = committed(&mut arena, &[keyed("a"), keyed("b")]);
        let old: Vec<_> = arena.children(parent).collect();
        let (wip, kids) = rerender(&mut arena, parent, &[keyed("a"), keyed("b")]);
        assert_eq!(arena[kids[0]].alternate, Some(old[0]));
        assert_eq!(arena[kids[1]].alternate, Some(old[1]));
        assert!(kids.iter().all(|&k| arena[k].flags.is_empty()));
        assert!(deletions(&arena, wip).is_empty());
    }

    #[test]
    fn moved_fiber_is_placed_and_removed_key_is_deleted() {
        let mut arena = FiberArena::<TestHost>::new();
        let parent = committed(&mut arena, &[keyed("a"), keyed("b"), keyed("c")]);
        let old: Vec<_> = arena.children(parent).collect();
        let (wip, kids) = rerender(&mut arena, parent, &[keyed("c"), keyed("a")]);

        assert_eq!(arena[kids[0]].alternate, Some(old[2]));
        assert!(arena[kids[0]].flags.is_empty(), "c stays; a moves after it");
        assert_eq!(arena[kids[1]].alternate, Some(old[0]));
        assert!(arena[kids[1]].flags.contains(EffectFlags::PLACEMENT));
        assert_eq!(deletions(&arena, wip), [old[1]]);
    }

    #[test]
    fn type_change_replaces_the_fiber() {
        let mut arena = FiberArena::<TestHost>::new();
        let parent = committed(&mut arena, &[Element::text("x")]);
        let old = arena[parent].child.unwrap();
        let (wip, kids) = rerender(&mut arena, parent, &[Element::host("b", Props::new())]);
        assert!(arena[kids[0]].alternate.is_none());
        assert!(arena[kids[0]].flags.contains(EffectFlags::PLACEMENT));
        assert_eq!(deletions(&arena, wip), [old]);
    }

    #[test]
    fn appended_children_are_placed_and_extra_children_deleted() {
        let mut arena = FiberArena::<TestHost>::new();
        let parent = committed(&mut arena, &[Element::text("1")]);
        let (_, kids) = rerender(&mut arena, parent, &[Element::text("1"), Element::text("2")]);
        assert!(arena[kids[0]].flags.is_empty());
        assert!(arena[kids[1]].flags.contains(EffectFlags::PLACEMENT));

        let parent = committed(&mut arena, &[Element::text("1"), Element::text("2")]);
        let old: Vec<_> = arena.children(parent).collect();
        let (wip, kids) = rerender(&mut arena, parent, &[Element::text("1")]);
        assert_eq!(kids.len(), 1);
        assert_eq!(deletions(&arena, wip), [old[1]]);
    }

    #[test]
    fn clone_child_fibers_pairs_every_child() {
        let mut arena = FiberArena::<TestHost>::new();
        let parent = committed(&mut arena, &[keyed("a"), keyed("b")]);
        let old: Vec<_> = arena.children(parent).collect();
        let wip = arena.create_work_in_progress(parent, None);
        clone_child_fibers(&mut arena, Some(parent), wip).unwrap();
        let kids: Vec<_> = arena.children(wip).collect();
        assert_eq!(kids.len(), 2);
        for (new, old) in kids.iter().zip(&old) {
            assert_ne!(new, old, "fresh identity");
            assert_eq!(arena[*new].alternate, Some(*old));
            assert_eq!(arena[*old].alternate, Some(*new));
            assert_eq!(arena[*new].key, arena[*old].key);
            assert!(Rc::ptr_eq(
                arena[*new].pending_props.as_ref().unwrap(),
                arena[*old].memoized_props.as_ref().unwrap()
            ));
            assert_eq!(arena[*new].return_fiber, Some(wip));
        }
    }

    #[test]
    fn clone_child_fibers_rejects_a_replaced_child_list() {
        let mut arena = FiberArena::<TestHost>::new();
        let parent = committed(&mut arena, &[keyed("a")]);
        let wip = arena.create_work_in_progress(parent, None);
        arena[wip].child = None;
        assert_eq!(
            clone_child_fibers(&mut arena, Some(parent), wip),
            Err(InvariantViolation::ResumingWork(wip))
        );
    }
}
