// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Applying a finished work-in-progress tree.
//!
//! Commit walks the effect list twice. The mutation pass detaches old refs
//! and applies placements, updates and deletions through the host. The
//! finished tree then becomes current, and the layout pass attaches new
//! refs. Deleted subtrees are freed last.
//!
//! A failed effect does not stop the mutation pass. The remaining effects
//! are still applied and the finished tree still becomes current, so the
//! arena matches every host mutation that did happen. The first error is
//! returned once the commit is done. Nothing is retried: the host node of a
//! failed placement stays detached until a later render replaces it.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::complete_work::host_children;
use crate::error::{InvariantViolation, ReconcileError};
use crate::expiration::ExpirationTime;
use crate::fiber::{EffectFlags, FiberId, UpdateSlot, WorkTag};
use crate::host::HostConfig;
use crate::reconciler::Reconciler;
use crate::trace::{CommitEvent, Tracer};
use crate::work_loop::{WorkResult, WorkStatus};

/// Where placed host nodes go.
enum HostParent<H: HostConfig> {
    Instance(H::Instance),
    Container(H::Container),
}

impl<H: HostConfig> Reconciler<H> {
    pub(crate) fn commit_root(
        &mut self,
        expiration_time: ExpirationTime,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<WorkStatus, H> {
        let Some(finished) = self.session.work_in_progress_root else {
            return Ok(WorkStatus::Idle);
        };
        self.session.reset();

        let mut effects = Vec::new();
        let mut next = self.arena[finished].first_effect;
        while let Some(effect) = next {
            let fiber = self
                .arena
                .get(effect)
                .ok_or(InvariantViolation::StaleFiber(effect))?;
            effects.push(effect);
            next = fiber.next_effect;
        }
        if self.arena[finished].flags.has_commit_effect() {
            effects.push(finished);
        }

        let mut deletions = Vec::new();
        let mut first_error = None;
        for &effect in &effects {
            if let Err(err) = self.commit_mutation_effect(effect, &mut deletions) {
                tracing::error!(fiber = %effect, "commit effect failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        self.root.current = finished;

        for &effect in &effects {
            self.commit_attach_ref(effect);
        }
        for &effect in &effects {
            if let Some(f) = self.arena.get_mut(effect) {
                f.next_effect = None;
            }
        }
        let root = &mut self.arena[finished];
        root.first_effect = None;
        root.last_effect = None;
        for deleted in deletions {
            self.arena.free_subtree(deleted);
        }

        let root = &self.arena[finished];
        let remaining = root.expiration_time.max(root.child_expiration_time);
        self.root.mark_finished(expiration_time, remaining);
        tracing::debug!(
            ?expiration_time,
            effects = effects.len(),
            ?remaining,
            live = self.arena.len(),
            "committed"
        );
        tracer.commit(&CommitEvent {
            expiration_time,
            effects: effects.len(),
            remaining,
        });
        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(WorkStatus::Committed {
            expiration_time,
            effects: effects.len(),
            remaining,
        })
    }

    fn commit_mutation_effect(
        &mut self,
        effect: FiberId,
        deletions: &mut Vec<FiberId>,
    ) -> WorkResult<(), H> {
        let flags = self.arena[effect].flags;
        if flags.contains(EffectFlags::REF) {
            if let Some(current) = self.arena[effect].alternate {
                if let Some(handle) = &self.arena[current].ref_handle {
                    handle.detach();
                }
            }
        }
        if flags.contains(EffectFlags::DELETION) {
            deletions.push(effect);
            return self.commit_deletion(effect);
        }
        if flags.contains(EffectFlags::PLACEMENT) {
            self.arena[effect].flags.remove(EffectFlags::PLACEMENT);
            self.commit_placement(effect)?;
        }
        if flags.contains(EffectFlags::UPDATE) {
            self.commit_work(effect)?;
        }
        Ok(())
    }

    fn commit_attach_ref(&mut self, effect: FiberId) {
        let Some(f) = self.arena.get(effect) else {
            return;
        };
        if !f.flags.contains(EffectFlags::REF) || f.tag != WorkTag::HostComponent {
            return;
        }
        if let (Some(handle), Some(instance)) = (&f.ref_handle, &f.state_node) {
            handle.attach(Box::new(instance.clone()));
        }
    }

    // -- Placement --

    fn host_parent(&self, fiber: FiberId) -> Result<HostParent<H>, InvariantViolation> {
        let mut node = self.arena[fiber].return_fiber;
        while let Some(n) = node {
            let f = &self.arena[n];
            match f.tag {
                WorkTag::HostComponent => {
                    let instance = f
                        .state_node
                        .clone()
                        .ok_or(InvariantViolation::MissingInstance(n))?;
                    return Ok(HostParent::Instance(instance));
                }
                WorkTag::HostRoot => return Ok(HostParent::Container(self.root.container.clone())),
                _ => node = f.return_fiber,
            }
        }
        Err(InvariantViolation::MissingHostParent(fiber))
    }

    /// The host node that `fiber`'s host nodes must be inserted before, or
    /// `None` to append. Skips siblings that are being placed themselves.
    fn host_sibling(&mut self, fiber: FiberId) -> Option<H::Instance> {
        let mut node = fiber;
        'siblings: loop {
            while self.arena[node].sibling.is_none() {
                let parent = self.arena[node].return_fiber?;
                if self.arena[parent].is_host_parent() {
                    return None;
                }
                node = parent;
            }
            let parent = self.arena[node].return_fiber;
            let Some(sibling) = self.arena[node].sibling else {
                return None;
            };
            self.arena[sibling].return_fiber = parent;
            node = sibling;

            while !self.arena[node].is_host() {
                if self.arena[node].flags.contains(EffectFlags::PLACEMENT) {
                    continue 'siblings;
                }
                let Some(child) = self.arena[node].child else {
                    continue 'siblings;
                };
                self.arena[child].return_fiber = Some(node);
                node = child;
            }
            if !self.arena[node].flags.contains(EffectFlags::PLACEMENT) {
                return self.arena[node].state_node.clone();
            }
        }
    }

    fn commit_placement(&mut self, fiber: FiberId) -> WorkResult<(), H> {
        let parent = self.host_parent(fiber)?;
        let before = self.host_sibling(fiber);
        let nodes = if self.arena[fiber].is_host() {
            alloc::vec![fiber]
        } else {
            host_children(&self.arena, fiber)
        };
        for node in nodes {
            let child = self.arena[node]
                .state_node
                .clone()
                .ok_or(InvariantViolation::MissingInstance(node))?;
            let result = match (&parent, &before) {
                (HostParent::Instance(p), Some(b)) => self.host.insert_before(p, &child, b),
                (HostParent::Instance(p), None) => self.host.append_child(p, &child),
                (HostParent::Container(c), Some(b)) => {
                    self.host.insert_in_container_before(c, &child, b)
                }
                (HostParent::Container(c), None) => self.host.append_child_to_container(c, &child),
            };
            result.map_err(ReconcileError::Host)?;
        }
        Ok(())
    }

    // -- Update --

    fn commit_work(&mut self, fiber: FiberId) -> WorkResult<(), H> {
        let current = self.arena[fiber].alternate;
        match self.arena[fiber].tag {
            WorkTag::HostComponent => {
                let UpdateSlot::Host(payload) =
                    core::mem::take(&mut self.arena[fiber].update_queue)
                else {
                    return Ok(());
                };
                let f = &self.arena[fiber];
                let instance = f
                    .state_node
                    .clone()
                    .ok_or(InvariantViolation::MissingInstance(fiber))?;
                let new_props = self.pending_props(fiber, "commit")?;
                let old_props = current
                    .and_then(|c| self.arena[c].memoized_props.clone())
                    .unwrap_or_else(|| new_props.clone());
                let ty = f.host_type().unwrap_or_default();
                self.host
                    .commit_update(&instance, &payload, ty, &old_props, &new_props)
                    .map_err(ReconcileError::Host)?;
            }
            WorkTag::HostText => {
                let f = &self.arena[fiber];
                let instance = f
                    .state_node
                    .clone()
                    .ok_or(InvariantViolation::MissingInstance(fiber))?;
                let new_text = f
                    .memoized_props
                    .as_ref()
                    .and_then(|p| p.text.clone())
                    .unwrap_or_default();
                let old_text = current
                    .and_then(|c| self.arena[c].memoized_props.as_ref())
                    .and_then(|p| p.text.clone())
                    .unwrap_or_else(|| new_text.clone());
                self.host
                    .commit_text_update(&instance, &old_text, &new_text)
                    .map_err(ReconcileError::Host)?;
            }
            _ => {}
        }
        Ok(())
    }

    // -- Deletion --

    /// Detaches every ref in the subtree and removes its top-level host
    /// nodes from their host parent.
    fn commit_deletion(&mut self, fiber: FiberId) -> WorkResult<(), H> {
        for node in self.arena.descendants(fiber) {
            let f = &self.arena[node];
            if f.tag == WorkTag::HostComponent {
                if let Some(handle) = &f.ref_handle {
                    handle.detach();
                }
            }
        }

        let parent = self.host_parent(fiber)?;
        let removed = if self.arena[fiber].is_host() {
            alloc::vec![fiber]
        } else {
            host_children(&self.arena, fiber)
        };
        for node in removed {
            let child = self.arena[node]
                .state_node
                .clone()
                .ok_or(InvariantViolation::MissingInstance(node))?;
            let result = match &parent {
                HostParent::Instance(p) => self.host.remove_child(p, &child),
                HostParent::Container(c) => self.host.remove_child_from_container(c, &child),
            };
            result.map_err(ReconcileError::Host)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use crate::element::{Element, Props, RefHandle};
    use crate::expiration::ExpirationTime;
    use crate::fiber::FiberId;
    use crate::reconciler::Reconciler;
    use crate::testing::{
        CONTAINER, TestHost, TestHostError, assert_alternates_reciprocal, mount, render_sync,
    };
    use crate::work_loop::WorkStatus;

    fn keyed_list(keys: &[&str]) -> Element {
        let items = keys
            .iter()
            .map(|k| {
                Element::host("li", Props::new().children(vec![Element::text(k)])).with_key(k)
            })
            .collect();
        Element::host("ul", Props::new().children(items))
    }

    fn keyed(r: &Reconciler<TestHost>, key: &str) -> Vec<FiberId> {
        let arena = r.arena();
        arena
            .descendants(r.current_root())
            .filter(|&f| arena[f].key.as_deref() == Some(key))
            .collect()
    }

    #[test]
    fn keyed_reorder_moves_and_deletes() {
        let mut r = mount(keyed_list(&["a", "b", "c"]));
        r.host_mut().take_log();

        let status = render_sync(&mut r, keyed_list(&["c", "a"]));
        assert!(matches!(status, WorkStatus::Committed { effects: 2, .. }));
        assert_eq!(
            r.host_mut().take_log(),
            ["remove #6 -> #3", "append #6 <- #1"]
        );
        assert_eq!(r.host().render(CONTAINER), "<ul><li>c</li><li>a</li></ul>");
        assert_alternates_reciprocal(&r);
    }

    #[test]
    fn keyed_insert_goes_before_the_next_stable_sibling() {
        let mut r = mount(keyed_list(&["a", "b", "c"]));
        r.host_mut().take_log();

        render_sync(&mut r, keyed_list(&["d", "a", "b", "c"]));
        assert_eq!(
            r.host_mut().take_log(),
            [
                "create_text \"d\" #7",
                "create li #8",
                "append_initial #8 <- #7",
                "insert #6 <- #8 before #1",
            ]
        );
        assert_eq!(
            r.host().render(CONTAINER),
            "<ul><li>d</li><li>a</li><li>b</li><li>c</li></ul>"
        );
    }

    #[test]
    fn sibling_search_skips_new_siblings_and_enters_fragments() {
        let stable = || Element::host("li", Props::new()).with_key("z");
        let mut r = mount(Element::host("div", Props::new().children(vec![stable()])));
        r.host_mut().take_log();

        render_sync(
            &mut r,
            Element::host(
                "div",
                Props::new().children(vec![
                    Element::fragment(vec![Element::host("span", Props::new())]).with_key("f"),
                    Element::host("b", Props::new()).with_key("b"),
                    stable(),
                ]),
            ),
        );
        assert_eq!(
            r.host_mut().take_log(),
            [
                "create span #2",
                "create b #3",
                "insert #1 <- #2 before #0",
                "insert #1 <- #3 before #0",
            ]
        );
        assert_eq!(
            r.host().render(CONTAINER),
            "<div><span></span><b></b><li></li></div>"
        );
    }

    #[test]
    fn failed_placement_still_swaps_the_tree() {
        let mut r = mount(Element::host("div", Props::new()));
        assert_eq!(r.arena().len(), 3);
        r.host_mut().placements_left = Some(1);

        r.update_container(
            Some(Element::host(
                "div",
                Props::new().children(vec![
                    Element::host("span", Props::new()),
                    Element::host("b", Props::new()),
                ]),
            )),
            ExpirationTime::SYNC,
        );
        let err = r.perform_sync_work().unwrap_err();
        assert!(matches!(err.as_host(), Some(TestHostError::PlacementRefused(2))));
        assert_eq!(r.host().render(CONTAINER), "<div><span></span></div>");
        assert_eq!(r.arena().len(), 6, "created fibers joined the committed tree");
        assert!(r.session().is_torn_down());
        assert_alternates_reciprocal(&r);

        r.host_mut().placements_left = None;
        assert_eq!(r.perform_sync_work().unwrap(), WorkStatus::Idle);
        assert_eq!(r.host().node_count(), 3, "no instance created twice");
        assert_eq!(r.host().render(CONTAINER), "<div><span></span></div>");
        assert_eq!(r.arena().len(), 6);
    }

    #[test]
    fn deleted_fibers_are_freed() {
        let mut r = mount(keyed_list(&["a", "b", "c"]));
        let doomed: Vec<FiberId> = keyed(&r, "b").into_iter().chain(keyed(&r, "c")).collect();
        assert_eq!(doomed.len(), 2);

        render_sync(&mut r, keyed_list(&["a"]));
        for fiber in doomed {
            assert!(!r.arena().is_alive(fiber));
        }
        assert_eq!(keyed(&r, "a").len(), 1);
        assert_eq!(r.host().render(CONTAINER), "<ul><li>a</li></ul>");
    }

    #[test]
    fn refs_follow_the_host_instance() {
        let first = RefHandle::new();
        let second = RefHandle::new();
        let tree = |handle: &RefHandle| {
            Element::host(
                "div",
                Props::new().children(vec![Element::host("span", Props::new()).with_ref(handle)]),
            )
        };

        let mut r = mount(tree(&first));
        assert_eq!(first.get::<u32>(), Some(0));

        render_sync(&mut r, tree(&first));
        assert_eq!(first.get::<u32>(), Some(0));

        render_sync(&mut r, tree(&second));
        assert!(!first.is_attached());
        assert_eq!(second.get::<u32>(), Some(0));

        r.host_mut().take_log();
        render_sync(&mut r, Element::host("div", Props::new()));
        assert_eq!(r.host_mut().take_log(), ["remove #1 -> #0"]);
        assert!(!second.is_attached());
    }
}
