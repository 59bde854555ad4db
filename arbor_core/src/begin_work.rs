// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The top-down half of a unit of work.
//!
//! [`begin_work`](Reconciler::begin_work) decides whether a fiber must run
//! its own logic at the current render expiration time. If not, it pushes
//! whatever ancestor-scoped state its tag would have pushed and bails out:
//! the subtree is either pruned or its children are cloned so traversal can
//! reach deeper pending work.

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::child_fiber::{ChildReconciler, clone_child_fibers};
use crate::context::{ALL_BITS, ContextId, propagate_context_change};
use crate::element::{AnyValue, Component, Element, ElementType, Props, child_list, ref_eq};
use crate::error::InvariantViolation;
use crate::expiration::ExpirationTime;
use crate::fiber::{EffectFlags, FiberId, MemoizedState, UpdateSlot, WorkTag};
use crate::hooks::{Hook, RenderScope};
use crate::host::HostConfig;
use crate::reconciler::Reconciler;
use crate::trace::{BailoutEvent, PropagationEvent, Tracer};
use crate::work_loop::WorkResult;

fn same_props(a: Option<&Rc<Props>>, b: Option<&Rc<Props>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl<H: HostConfig> Reconciler<H> {
    /// Begins `wip`. Returns the child to work on next, or `None` to
    /// complete `wip` right away.
    pub(crate) fn begin_work(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<Option<FiberId>, H> {
        let render_time = self.session.render_expiration_time;
        let update_time = self.arena[wip].expiration_time;

        if let Some(c) = current {
            let unchanged = same_props(
                self.arena[c].memoized_props.as_ref(),
                self.arena[wip].pending_props.as_ref(),
            );
            if !unchanged {
                self.session.did_receive_update = true;
            } else if update_time < render_time {
                self.session.did_receive_update = false;
                self.push_bailout_context(wip)?;
                return self.bailout_on_already_finished_work(current, wip, tracer);
            } else {
                self.session.did_receive_update = false;
            }
        } else {
            self.session.did_receive_update = false;
        }

        self.arena[wip].expiration_time = ExpirationTime::NO_WORK;

        let tag = self.arena[wip].tag;
        match tag {
            WorkTag::IndeterminateComponent => self.mount_indeterminate_component(wip),
            WorkTag::FunctionComponent => self.update_function_component(current, wip, tracer),
            WorkTag::MemoComponent => self.update_memo_component(current, wip, update_time, tracer),
            WorkTag::HostRoot => self.update_host_root(current, wip, tracer),
            WorkTag::HostComponent => self.update_host_component(current, wip),
            WorkTag::HostText => Ok(None),
            WorkTag::Fragment => {
                let props = self.pending_props(wip, "begin")?;
                self.reconcile_children(current, wip, &props.children)
            }
            WorkTag::ContextProvider => self.update_context_provider(current, wip, tracer),
            WorkTag::ContextConsumer => self.update_context_consumer(current, wip),
        }
    }

    /// Pushes what `wip`'s tag pushes when it does its own work, so the
    /// matching pop in `complete_work` stays balanced.
    fn push_bailout_context(&mut self, wip: FiberId) -> Result<(), InvariantViolation> {
        match self.arena[wip].tag {
            WorkTag::HostRoot => self.push_host_root(wip),
            WorkTag::HostComponent => self.push_host_component(wip)?,
            WorkTag::ContextProvider => {
                let (ctx, value, _) = self.provider_parts(wip)?;
                self.push_provider(wip, ctx, value)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn bailout_on_already_finished_work(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<Option<FiberId>, H> {
        if let Some(c) = current {
            self.arena[wip].dependencies = self.arena[c].dependencies.clone();
        }
        let update_time = self.arena[wip].expiration_time;
        if !update_time.is_no_work() {
            self.session.mark_unprocessed(update_time);
        }

        let tag = self.arena[wip].tag;
        let pruned = self.arena[wip].child_expiration_time < self.session.render_expiration_time;
        tracing::debug!(fiber = %wip, ?tag, pruned, "bailout");
        tracer.bailout(&BailoutEvent {
            fiber: wip,
            tag,
            pruned,
        });
        if pruned {
            return Ok(None);
        }
        clone_child_fibers(&mut self.arena, current, wip)?;
        Ok(self.arena[wip].child)
    }

    // -- Components --

    fn mount_indeterminate_component(&mut self, wip: FiberId) -> WorkResult<Option<FiberId>, H> {
        let component = self.component_of(wip)?;
        let element = self.render_with_hooks(None, wip, &component)?;
        let f = &mut self.arena[wip];
        f.flags.insert(EffectFlags::PERFORMED_WORK);
        f.tag = WorkTag::FunctionComponent;
        self.reconcile_children(None, wip, child_list(&element))
    }

    fn update_function_component(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<Option<FiberId>, H> {
        let component = self.component_of(wip)?;
        let element = self.render_with_hooks(current, wip, &component)?;
        if current.is_some() && !self.session.did_receive_update {
            self.bailout_hooks(current, wip);
            return self.bailout_on_already_finished_work(current, wip, tracer);
        }
        self.arena[wip].flags.insert(EffectFlags::PERFORMED_WORK);
        self.reconcile_children(current, wip, child_list(&element))
    }

    fn update_memo_component(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        update_time: ExpirationTime,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<Option<FiberId>, H> {
        if let Some(c) = current {
            let next = self.pending_props(wip, "begin")?;
            let equal = match (&self.arena[c].memoized_props, &self.arena[wip].ty) {
                (Some(prev), Some(ElementType::Memo { compare, .. })) => match compare {
                    Some(compare) => compare(prev, &next),
                    None => prev.shallow_equal(&next),
                },
                _ => false,
            };
            let same_ref = ref_eq(
                self.arena[c].ref_handle.as_ref(),
                self.arena[wip].ref_handle.as_ref(),
            );
            if equal && same_ref {
                self.session.did_receive_update = false;
                if update_time < self.session.render_expiration_time {
                    return self.bailout_on_already_finished_work(current, wip, tracer);
                }
            }
        }
        self.update_function_component(current, wip, tracer)
    }

    /// Renders `wip`'s component against its hook list and records the
    /// contexts it read.
    fn render_with_hooks(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        component: &Component,
    ) -> WorkResult<Element, H> {
        let render_time = self.session.render_expiration_time;
        let props = self.pending_props(wip, "begin")?;

        let mut dependencies = self.arena[wip].dependencies.take();
        if self
            .session
            .context
            .prepare_to_read_context(wip, &mut dependencies, render_time)
        {
            self.session.did_receive_update = true;
        }

        // The current fiber's hooks are the previous render's; the render
        // reads them in place and builds a fresh list for `wip`.
        let mut previous: Option<Vec<Hook>> = current.map(|c| {
            match core::mem::take(&mut self.arena[c].memoized_state) {
                MemoizedState::Hooks(hooks) => hooks,
                other => {
                    self.arena[c].memoized_state = other;
                    Vec::new()
                }
            }
        });

        let (element, outcome) = {
            let mut scope = RenderScope::new(
                wip,
                component.name(),
                render_time,
                &self.contexts,
                &mut self.session.context,
                &mut dependencies,
                previous.as_mut(),
            );
            let element = component.render(&mut scope, &props);
            (element, scope.finish())
        };
        self.session.context.finish_render();

        if let (Some(c), Some(hooks)) = (current, previous) {
            if matches!(self.arena[c].memoized_state, MemoizedState::None) {
                self.arena[c].memoized_state = MemoizedState::Hooks(hooks);
            }
        }
        let f = &mut self.arena[wip];
        f.dependencies = dependencies;
        f.memoized_state = MemoizedState::Hooks(outcome.hooks);
        f.expiration_time = outcome.remaining;

        if let Some(err) = outcome.error {
            return Err(err.into());
        }
        if outcome.did_update_state {
            self.session.did_receive_update = true;
        }
        Ok(element)
    }

    fn bailout_hooks(&mut self, current: Option<FiberId>, wip: FiberId) {
        let Some(c) = current else {
            return;
        };
        if let MemoizedState::Hooks(hooks) = &self.arena[c].memoized_state {
            self.arena[wip].memoized_state = MemoizedState::Hooks(hooks.clone());
        }
        let render_time = self.session.render_expiration_time;
        let f = &mut self.arena[c];
        if f.expiration_time <= render_time {
            f.expiration_time = ExpirationTime::NO_WORK;
        }
    }

    // -- Host --

    fn update_host_root(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<Option<FiberId>, H> {
        self.push_host_root(wip);
        let render_time = self.session.render_expiration_time;

        let previous = self.arena[wip].root_element().cloned();
        let f = &mut self.arena[wip];
        let (next, remaining) = match &mut f.update_queue {
            UpdateSlot::Root(queue) => queue.process(render_time, |_, element| element.clone()),
            _ => (previous.clone(), ExpirationTime::NO_WORK),
        };
        f.memoized_state = MemoizedState::Root(next.clone());
        f.expiration_time = remaining;

        let unchanged = match (&previous, &next) {
            (Some(a), Some(b)) => a.same_identity(b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return self.bailout_on_already_finished_work(current, wip, tracer);
        }
        let children = next.as_ref().map_or(&[][..], child_list);
        self.reconcile_children(current, wip, children)
    }

    fn update_host_component(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
    ) -> WorkResult<Option<FiberId>, H> {
        self.push_host_component(wip)?;
        let props = self.pending_props(wip, "begin")?;
        self.reconcile_children(current, wip, &props.children)
    }

    fn push_host_root(&mut self, wip: FiberId) {
        let container = self.root.container.clone();
        self.session.host_context.push_host_container(
            &mut self.session.stack,
            &self.host,
            wip,
            container,
        );
    }

    fn push_host_component(&mut self, wip: FiberId) -> Result<(), InvariantViolation> {
        let f = &self.arena[wip];
        let ty = f.host_type().ok_or(InvariantViolation::MissingType {
            fiber: wip,
            tag: f.tag,
        })?;
        self.session.host_context.push_host_context(
            &mut self.session.stack,
            &self.host,
            wip,
            ty,
        )
    }

    // -- Context --

    fn update_context_provider(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<Option<FiberId>, H> {
        let (ctx, value, next_props) = self.provider_parts(wip)?;
        let old_props = self.arena[wip].memoized_props.clone();
        self.push_provider(wip, ctx, value.clone())?;

        if let Some(old_props) = old_props {
            let changed_bits = match &old_props.value {
                Some(old_value) => self.contexts.changed_bits(ctx, old_value, &value)?,
                None => ALL_BITS,
            };
            if changed_bits == 0 {
                if Rc::ptr_eq(&old_props.children, &next_props.children) {
                    return self.bailout_on_already_finished_work(current, wip, tracer);
                }
            } else {
                let render_time = self.session.render_expiration_time;
                let matched =
                    propagate_context_change(&mut self.arena, wip, ctx, changed_bits, render_time);
                tracer.context_propagation(&PropagationEvent {
                    provider: wip,
                    context: ctx,
                    changed_bits,
                    matched,
                });
            }
        }
        self.reconcile_children(current, wip, &next_props.children)
    }

    fn update_context_consumer(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
    ) -> WorkResult<Option<FiberId>, H> {
        let props = self.pending_props(wip, "begin")?;
        let ctx = match &self.arena[wip].ty {
            Some(ElementType::Consumer(ctx)) => *ctx,
            _ => return Err(self.missing_type(wip).into()),
        };
        let render = props.render.clone().ok_or(InvariantViolation::MissingProps {
            fiber: wip,
            tag: WorkTag::ContextConsumer,
            phase: "begin",
        })?;

        let render_time = self.session.render_expiration_time;
        let mut dependencies = self.arena[wip].dependencies.take();
        if self
            .session
            .context
            .prepare_to_read_context(wip, &mut dependencies, render_time)
        {
            self.session.did_receive_update = true;
        }
        let value = self.session.context.read_context(
            &self.contexts,
            &mut dependencies,
            ctx,
            props.observed_bits,
        );
        self.session.context.finish_render();
        self.arena[wip].dependencies = dependencies;

        let element = render(&value?);
        self.arena[wip].flags.insert(EffectFlags::PERFORMED_WORK);
        self.reconcile_children(current, wip, child_list(&element))
    }

    fn push_provider(
        &mut self,
        wip: FiberId,
        ctx: ContextId,
        value: AnyValue,
    ) -> Result<(), InvariantViolation> {
        self.session.context.push_provider(
            &mut self.session.stack,
            &mut self.contexts,
            wip,
            ctx,
            value,
        )
    }

    fn provider_parts(
        &self,
        wip: FiberId,
    ) -> Result<(ContextId, AnyValue, Rc<Props>), InvariantViolation> {
        let f = &self.arena[wip];
        let Some(ElementType::Provider(ctx)) = &f.ty else {
            return Err(self.missing_type(wip));
        };
        let props = self.pending_props(wip, "begin")?;
        let value = props.value.clone().ok_or(InvariantViolation::MissingProps {
            fiber: wip,
            tag: f.tag,
            phase: "begin",
        })?;
        Ok((*ctx, value, props))
    }

    // -- Helpers --

    /// Reconciles `children` against the current children of `wip` and
    /// installs the result as `wip.child`.
    fn reconcile_children(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        children: &[Element],
    ) -> WorkResult<Option<FiberId>, H> {
        let render_time = self.session.render_expiration_time;
        let current_child = current.and_then(|c| self.arena[c].child);
        let mut reconciler =
            ChildReconciler::new(&mut self.arena, wip, render_time, current.is_some());
        let first = reconciler.reconcile(current_child, children);
        self.session.created.extend(reconciler.into_created());
        self.arena[wip].child = first;
        Ok(first)
    }

    pub(crate) fn pending_props(
        &self,
        fiber: FiberId,
        phase: &'static str,
    ) -> Result<Rc<Props>, InvariantViolation> {
        let f = &self.arena[fiber];
        f.pending_props.clone().ok_or(InvariantViolation::MissingProps {
            fiber,
            tag: f.tag,
            phase,
        })
    }

    fn component_of(&self, wip: FiberId) -> Result<Component, InvariantViolation> {
        match &self.arena[wip].ty {
            Some(ElementType::Function(component) | ElementType::Memo { component, .. }) => {
                Ok(component.clone())
            }
            _ => Err(self.missing_type(wip)),
        }
    }

    pub(crate) fn missing_type(&self, fiber: FiberId) -> InvariantViolation {
        InvariantViolation::MissingType {
            fiber,
            tag: self.arena[fiber].tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use rstest::rstest;

    use super::*;
    use crate::testing::{TestHost, mount};

    /// Mounts `<div><span/></div>`, then begins a work-in-progress `div`
    /// that shares its committed props, with `child_time` pending below it.
    /// Returns the reconciler, the committed `span` and what `begin_work`
    /// handed back.
    fn begin_unchanged_div(
        child_time: ExpirationTime,
    ) -> (Reconciler<TestHost>, FiberId, Option<FiberId>) {
        let mut r = mount(Element::host(
            "div",
            Props::new().children(vec![Element::host("span", Props::new()).with_key("s")]),
        ));
        let div = r.arena[r.current_root()].child.unwrap();
        let span = r.arena[div].child.unwrap();
        r.arena[div].child_expiration_time = child_time;

        let mut tracer = Tracer::none();
        r.prepare_fresh_stack(ExpirationTime::SYNC, &mut tracer);
        let root = r.session.work_in_progress.unwrap();
        r.push_host_root(root);
        let props = r.arena[div].memoized_props.clone();
        let wip = r.arena.create_work_in_progress(div, props);
        r.arena[wip].return_fiber = Some(root);

        let next = r.begin_work(Some(div), wip, &mut tracer).unwrap();
        (r, span, next)
    }

    #[rstest]
    #[case::nothing_pending(ExpirationTime::NO_WORK)]
    #[case::less_urgent_work(ExpirationTime(100))]
    fn unchanged_props_without_urgent_child_work_prune(#[case] child_time: ExpirationTime) {
        let (r, _, next) = begin_unchanged_div(child_time);
        assert_eq!(next, None);
        assert!(!r.session.did_receive_update);
    }

    #[test]
    fn unchanged_props_with_child_work_clone_the_children() {
        let (r, span, next) = begin_unchanged_div(ExpirationTime::SYNC);
        let clone = next.unwrap();
        assert_ne!(clone, span, "clone has a fresh identity");

        let (a, b) = (&r.arena[clone], &r.arena[span]);
        assert_eq!(a.alternate, Some(span));
        assert_eq!(a.tag, b.tag);
        assert_eq!(a.key, b.key);
        assert_eq!(a.host_type(), Some("span"));
        assert!(Rc::ptr_eq(
            a.pending_props.as_ref().unwrap(),
            b.memoized_props.as_ref().unwrap()
        ));
    }
}
