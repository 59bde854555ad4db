// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bottom-up half of a unit of work: pops what begin pushed and
//! prepares host instances.

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::element::{ElementType, ref_eq};
use crate::error::{InvariantViolation, ReconcileError};
use crate::fiber::{EffectFlags, FiberArena, FiberId, UpdateSlot, WorkTag};
use crate::host::HostConfig;
use crate::reconciler::Reconciler;
use crate::work_loop::WorkResult;

impl<H: HostConfig> Reconciler<H> {
    pub(crate) fn complete_work(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
    ) -> WorkResult<(), H> {
        match self.arena[wip].tag {
            WorkTag::HostRoot => {
                self.session
                    .host_context
                    .pop_host_container(&mut self.session.stack, wip);
            }
            WorkTag::HostComponent => self.complete_host_component(current, wip)?,
            WorkTag::HostText => self.complete_host_text(current, wip)?,
            WorkTag::ContextProvider => {
                let Some(ElementType::Provider(ctx)) = self.arena[wip].ty else {
                    return Err(self.missing_type(wip).into());
                };
                self.session.context.pop_provider(
                    &mut self.session.stack,
                    &mut self.contexts,
                    wip,
                    ctx,
                )?;
            }
            WorkTag::IndeterminateComponent
            | WorkTag::FunctionComponent
            | WorkTag::MemoComponent
            | WorkTag::Fragment
            | WorkTag::ContextConsumer => {}
        }
        Ok(())
    }

    fn complete_host_component(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
    ) -> WorkResult<(), H> {
        self.session
            .host_context
            .pop_host_context(&mut self.session.stack, wip);

        let ty: Rc<str> = match &self.arena[wip].ty {
            Some(ElementType::Host(ty)) => ty.clone(),
            _ => return Err(self.missing_type(wip).into()),
        };
        let new_props = self.pending_props(wip, "complete")?;
        let container = self.session.host_context.root_host_container(wip)?.clone();
        let host_context = self.session.host_context.host_context(wip)?.clone();

        let existing = current.zip(self.arena[wip].state_node.clone());
        if let Some((c, instance)) = existing {
            let old_props = self.arena[c].memoized_props.clone().ok_or(
                InvariantViolation::MissingProps {
                    fiber: c,
                    tag: WorkTag::HostComponent,
                    phase: "complete",
                },
            )?;
            // Identical props: nothing changed here, whatever happened below.
            if !Rc::ptr_eq(&old_props, &new_props) {
                let payload = self
                    .host
                    .prepare_update(&instance, &ty, &old_props, &new_props, &container, &host_context)
                    .map_err(ReconcileError::Host)?;
                if let Some(payload) = payload {
                    let f = &mut self.arena[wip];
                    f.update_queue = UpdateSlot::Host(payload);
                    f.flags.insert(EffectFlags::UPDATE);
                }
            }
            if !ref_eq(
                self.arena[c].ref_handle.as_ref(),
                self.arena[wip].ref_handle.as_ref(),
            ) {
                self.arena[wip].flags.insert(EffectFlags::REF);
            }
            return Ok(());
        }

        let instance = self
            .host
            .create_instance(&ty, &new_props, &container, &host_context, wip)
            .map_err(ReconcileError::Host)?;
        for child in host_children(&self.arena, wip) {
            let child_instance = self.arena[child]
                .state_node
                .clone()
                .ok_or(InvariantViolation::MissingInstance(child))?;
            self.host
                .append_initial_child(&instance, &child_instance)
                .map_err(ReconcileError::Host)?;
        }
        self.arena[wip].state_node = Some(instance.clone());
        let needs_commit = self
            .host
            .finalize_initial_children(&instance, &ty, &new_props, &container, &host_context)
            .map_err(ReconcileError::Host)?;

        let f = &mut self.arena[wip];
        if needs_commit {
            f.flags.insert(EffectFlags::UPDATE);
        }
        if f.ref_handle.is_some() {
            f.flags.insert(EffectFlags::REF);
        }
        Ok(())
    }

    fn complete_host_text(&mut self, current: Option<FiberId>, wip: FiberId) -> WorkResult<(), H> {
        let new_props = self.pending_props(wip, "complete")?;
        let new_text = new_props.text.clone().unwrap_or_default();

        if let (Some(c), true) = (current, self.arena[wip].state_node.is_some()) {
            let old_text = self.arena[c]
                .memoized_props
                .as_ref()
                .and_then(|p| p.text.clone())
                .unwrap_or_default();
            if old_text != new_text {
                self.arena[wip].flags.insert(EffectFlags::UPDATE);
            }
            return Ok(());
        }

        let container = self.session.host_context.root_host_container(wip)?.clone();
        let host_context = self.session.host_context.host_context(wip)?.clone();
        let instance = self
            .host
            .create_text_instance(&new_text, &container, &host_context, wip)
            .map_err(ReconcileError::Host)?;
        self.arena[wip].state_node = Some(instance);
        Ok(())
    }
}

/// The nearest host descendants of `fiber`, in tree order. Non-host fibers
/// are looked through; host fibers are not descended into.
pub(crate) fn host_children<H: HostConfig>(arena: &FiberArena<H>, fiber: FiberId) -> Vec<FiberId> {
    let mut found = Vec::new();
    let mut pending: Vec<FiberId> = arena.children(fiber).collect();
    pending.reverse();
    while let Some(node) = pending.pop() {
        if arena[node].is_host() {
            found.push(node);
        } else {
            let start = pending.len();
            pending.extend(arena.children(node));
            pending[start..].reverse();
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Component, Element, Props};
    use crate::expiration::ExpirationTime;
    use crate::testing::{TestHost, mount};
    use alloc::string::ToString;
    use alloc::vec;
    use core::cell::RefCell;

    #[test]
    fn host_children_look_through_fragments_only() {
        let mut arena = FiberArena::<TestHost>::new();
        let t = ExpirationTime::SYNC;
        let parent = arena.create_from_element(&Element::host("div", Props::new()), t);
        let a = arena.create_from_element(&Element::text("a"), t);
        let frag = arena.create_from_element(&Element::fragment(vec![]), t);
        let b = arena.create_from_element(&Element::host("b", Props::new()), t);
        let nested = arena.create_from_element(&Element::text("inside b"), t);
        let c = arena.create_from_element(&Element::text("c"), t);

        arena[parent].child = Some(a);
        arena[a].sibling = Some(frag);
        arena[frag].sibling = Some(c);
        arena[frag].child = Some(b);
        arena[b].child = Some(nested);

        assert_eq!(host_children(&arena, parent), [a, b, c]);
        assert_eq!(host_children(&arena, frag), [b]);
        assert!(host_children(&arena, nested).is_empty());
    }

    #[test]
    fn identical_host_props_skip_the_update_when_a_descendant_changes() {
        let setter = Rc::new(RefCell::new(None));
        let slot = setter.clone();
        let counter = Component::new("Counter", move |scope, _| {
            let (count, set) = scope.use_state(|| 1_u32);
            *slot.borrow_mut() = Some(set);
            Element::text(&count.to_string())
        });
        let mut r = mount(Element::host(
            "span",
            Props::new().children(vec![Element::component(&counter, Props::new())]),
        ));
        r.host_mut().take_log();

        let set = setter.borrow().clone().unwrap();
        assert!(r.set_state(&set, 2, ExpirationTime::SYNC));
        r.perform_sync_work().unwrap();

        let span = r.arena()[r.current_root()].child.unwrap();
        assert_eq!(r.arena()[span].host_type(), Some("span"));
        assert!(!r.arena()[span].flags.contains(EffectFlags::UPDATE));
        assert_eq!(r.host_mut().take_log(), ["text #0 \"1\" -> \"2\""]);
    }
}
