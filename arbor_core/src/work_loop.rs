// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The work driver.
//!
//! One render pass walks the work-in-progress tree depth first. Each fiber
//! is begun on the way down ([`begin_work`](crate::begin_work)) and
//! completed on the way up ([`complete_work`](crate::complete_work)):
//!
//! ```text
//!   perform_unit_of_work(f)
//!     begin_work(f) ──> Some(child) ──> next unit is child
//!                  └──> None ──> complete_unit_of_work(f)
//!                                  complete f, splice its effects into the
//!                                  parent, then next unit is f's sibling,
//!                                  or complete the parent and repeat
//! ```
//!
//! Every piece of per-render state lives in one [`RenderSession`]. A pass
//! may pause between units; a more urgent update arriving meanwhile
//! discards the unfinished pass, unwinding the stacks it pushed, and starts
//! over from the root. Nothing in the committed tree changes until the
//! finished pass is handed to [`commit`](crate::commit).

use alloc::vec::Vec;

use crate::context::ContextSession;
use crate::error::{InvariantViolation, ReconcileError};
use crate::expiration::ExpirationTime;
use crate::fiber::{EffectFlags, FiberArena, FiberId, WorkTag};
use crate::host::HostConfig;
use crate::host_context::HostContextStack;
use crate::reconciler::Reconciler;
use crate::scheduler::WorkScheduler;
use crate::stack::FiberStack;
use crate::trace::{RenderStartEvent, Tracer, UnitEvent, YieldEvent};

/// Result type of the work loop.
pub(crate) type WorkResult<T, H> = Result<T, ReconcileError<<H as HostConfig>::Error>>;

/// What a call to [`Reconciler::perform_work`] achieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkStatus {
    /// Nothing was scheduled.
    Idle,
    /// The scheduler asked for control back. Call again to resume at the
    /// exact next unit.
    Yielded {
        /// Expiration time of the paused pass.
        expiration_time: ExpirationTime,
        /// Units performed by this call.
        units: u32,
    },
    /// A pass finished and was committed.
    Committed {
        /// Expiration time of the committed pass.
        expiration_time: ExpirationTime,
        /// Number of fibers on the effect list.
        effects: usize,
        /// Most urgent work left over.
        remaining: ExpirationTime,
    },
}

/// Per-render state, threaded through every phase.
pub struct RenderSession<H: HostConfig> {
    pub(crate) stack: FiberStack,
    pub(crate) host_context: HostContextStack<H>,
    pub(crate) context: ContextSession,
    pub(crate) did_receive_update: bool,
    pub(crate) render_expiration_time: ExpirationTime,
    pub(crate) work_in_progress: Option<FiberId>,
    pub(crate) work_in_progress_root: Option<FiberId>,
    pub(crate) unprocessed_time: ExpirationTime,
    pub(crate) created: Vec<FiberId>,
}

impl<H: HostConfig> core::fmt::Debug for RenderSession<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderSession")
            .field("stack", &self.stack)
            .field("host_context", &self.host_context)
            .field("context", &self.context)
            .field("render_expiration_time", &self.render_expiration_time)
            .field("work_in_progress", &self.work_in_progress)
            .field("work_in_progress_root", &self.work_in_progress_root)
            .finish_non_exhaustive()
    }
}

impl<H: HostConfig> Default for RenderSession<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HostConfig> RenderSession<H> {
    /// Creates an idle session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: FiberStack::new(),
            host_context: HostContextStack::new(),
            context: ContextSession::new(),
            did_receive_update: false,
            render_expiration_time: ExpirationTime::NO_WORK,
            work_in_progress: None,
            work_in_progress_root: None,
            unprocessed_time: ExpirationTime::NO_WORK,
            created: Vec::new(),
        }
    }

    /// Drops every piece of per-render state.
    pub fn reset(&mut self) {
        self.stack.reset();
        self.host_context.reset();
        self.context.reset();
        self.did_receive_update = false;
        self.render_expiration_time = ExpirationTime::NO_WORK;
        self.work_in_progress = None;
        self.work_in_progress_root = None;
        self.unprocessed_time = ExpirationTime::NO_WORK;
        self.created.clear();
    }

    /// Returns `true` if no render is in progress and nothing from the last
    /// one remains.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.stack.is_empty()
            && self.host_context.depth() == 0
            && self.context.is_idle()
            && self.work_in_progress.is_none()
            && self.work_in_progress_root.is_none()
    }

    /// Returns `true` while a pass is started but not committed.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.work_in_progress_root.is_some()
    }

    /// Expiration time of the current pass.
    #[must_use]
    pub fn render_expiration_time(&self) -> ExpirationTime {
        self.render_expiration_time
    }

    /// The next fiber the loop will work on.
    #[must_use]
    pub fn next_unit_of_work(&self) -> Option<FiberId> {
        self.work_in_progress
    }

    /// Most urgent work skipped by bailouts in the current pass.
    #[must_use]
    pub fn unprocessed_time(&self) -> ExpirationTime {
        self.unprocessed_time
    }

    /// The push/pop ledger.
    #[must_use]
    pub fn stack(&self) -> &FiberStack {
        &self.stack
    }

    pub(crate) fn mark_unprocessed(&mut self, t: ExpirationTime) {
        self.unprocessed_time = self.unprocessed_time.max(t);
    }
}

/// Raises `fiber`'s expiration time and the child expiration time of every
/// ancestor, on both trees. Returns the host root reached, if any.
pub(crate) fn mark_update_time_from_fiber_to_root<H: HostConfig>(
    arena: &mut FiberArena<H>,
    fiber: FiberId,
    t: ExpirationTime,
) -> Option<FiberId> {
    let raise = |arena: &mut FiberArena<H>, id: FiberId| {
        let f = &mut arena[id];
        f.expiration_time = f.expiration_time.max(t);
    };
    raise(arena, fiber);
    if let Some(alt) = arena[fiber].alternate {
        raise(arena, alt);
    }

    let mut node = fiber;
    loop {
        let Some(parent) = arena[node].return_fiber else {
            return (arena[node].tag == WorkTag::HostRoot).then_some(node);
        };
        let p = &mut arena[parent];
        p.child_expiration_time = p.child_expiration_time.max(t);
        if let Some(alt) = p.alternate {
            let a = &mut arena[alt];
            a.child_expiration_time = a.child_expiration_time.max(t);
        }
        node = parent;
    }
}

impl<H: HostConfig> Reconciler<H> {
    /// Marks `fiber` and its ancestors and records pending work on the root.
    /// Returns `false` if `fiber` is not attached to this tree.
    pub(crate) fn schedule_update_on_fiber(&mut self, fiber: FiberId, t: ExpirationTime) -> bool {
        let Some(root_fiber) = mark_update_time_from_fiber_to_root(&mut self.arena, fiber, t) else {
            tracing::warn!(%fiber, "update on a detached fiber ignored");
            return false;
        };
        let current = self.root.current;
        if root_fiber != current && self.arena[current].alternate != Some(root_fiber) {
            tracing::warn!(%fiber, "update on a fiber of another tree ignored");
            return false;
        }
        self.root.mark_pending(t);
        true
    }

    pub(crate) fn work_on_root(
        &mut self,
        scheduler: &mut impl WorkScheduler,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<WorkStatus, H> {
        let t = self.root.first_pending_time;
        if t.is_no_work() {
            return Ok(WorkStatus::Idle);
        }
        if !self.session.is_rendering() || self.session.render_expiration_time != t {
            self.prepare_fresh_stack(t, tracer);
        }

        let sync = t == ExpirationTime::SYNC;
        let mut units = 0_u32;
        while let Some(unit) = self.session.work_in_progress {
            if !sync && scheduler.should_yield() {
                tracing::debug!(?t, units, next = %unit, "render yielded");
                tracer.yielded(&YieldEvent {
                    expiration_time: t,
                    units,
                });
                return Ok(WorkStatus::Yielded {
                    expiration_time: t,
                    units,
                });
            }
            if let Err(err) = self.perform_unit_of_work(unit, tracer) {
                let failed = self.session.work_in_progress.unwrap_or(unit);
                self.abort_render(failed, tracer);
                return Err(err);
            }
            units = units.saturating_add(1);
        }

        let leftover = self.session.stack.depth();
        if leftover != 0 {
            tracing::error!(leftover, "render finished with an unbalanced stack");
            self.discard_render();
            return Err(InvariantViolation::UnbalancedStack(leftover).into());
        }
        self.commit_root(t, tracer)
    }

    /// Starts a pass at `t` from the root, unwinding any unfinished pass.
    pub(crate) fn prepare_fresh_stack(&mut self, t: ExpirationTime, tracer: &mut Tracer<'_>) {
        let restarted = self.session.is_rendering();
        if let Some(next) = self.session.work_in_progress {
            tracing::warn!(
                interrupted = ?self.session.render_expiration_time,
                next = ?t,
                "unfinished render discarded"
            );
            let mut node = self.arena[next].return_fiber;
            while let Some(n) = node {
                self.unwind_work(n, tracer);
                node = self.arena[n].return_fiber;
            }
        }
        self.discard_render();

        let root = self.arena.create_work_in_progress(self.root.current, None);
        self.session.work_in_progress_root = Some(root);
        self.session.work_in_progress = Some(root);
        self.session.render_expiration_time = t;
        tracing::debug!(%root, ?t, restarted, "render started");
        tracer.render_start(&RenderStartEvent {
            root,
            expiration_time: t,
            restarted,
        });
    }

    /// Begins `unit` and, if it has no child to descend into, completes it
    /// and as many ancestors as possible.
    pub(crate) fn perform_unit_of_work(
        &mut self,
        unit: FiberId,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<(), H> {
        let current = self.arena[unit].alternate;
        let tag = self.arena[unit].tag;
        tracing::trace!(fiber = %unit, ?tag, "begin");
        tracer.begin_unit(&UnitEvent { fiber: unit, tag });

        let next = self.begin_work(current, unit, tracer)?;
        let f = &mut self.arena[unit];
        f.memoized_props = f.pending_props.clone();
        match next {
            Some(child) => self.session.work_in_progress = Some(child),
            None => self.complete_unit_of_work(unit, tracer)?,
        }
        Ok(())
    }

    /// Completes `unit`, then its ancestors until one has a sibling left to
    /// begin.
    pub(crate) fn complete_unit_of_work(
        &mut self,
        unit: FiberId,
        tracer: &mut Tracer<'_>,
    ) -> WorkResult<(), H> {
        let mut wip = unit;
        loop {
            self.session.work_in_progress = Some(wip);
            let current = self.arena[wip].alternate;
            let return_fiber = self.arena[wip].return_fiber;

            self.complete_work(current, wip)?;
            let tag = self.arena[wip].tag;
            tracing::trace!(fiber = %wip, ?tag, "complete");
            tracer.complete_unit(&UnitEvent { fiber: wip, tag });
            self.reset_child_expiration_time(wip);

            if let Some(parent) = return_fiber {
                splice_effects(&mut self.arena, parent, wip);
            }

            if let Some(sibling) = self.arena[wip].sibling {
                self.session.work_in_progress = Some(sibling);
                return Ok(());
            }
            match return_fiber {
                Some(parent) => wip = parent,
                None => {
                    self.session.work_in_progress = None;
                    return Ok(());
                }
            }
        }
    }

    /// Recomputes `wip.child_expiration_time` from its children.
    pub(crate) fn reset_child_expiration_time(&mut self, wip: FiberId) {
        let mut most_urgent = ExpirationTime::NO_WORK;
        let mut child = self.arena[wip].child;
        while let Some(c) = child {
            let f = &self.arena[c];
            most_urgent = most_urgent
                .max(f.expiration_time)
                .max(f.child_expiration_time);
            child = f.sibling;
        }
        self.arena[wip].child_expiration_time = most_urgent;
    }

    /// Abandons the pass after `failed` raised an error: unwinds `failed` and
    /// every ancestor still holding stack frames, then discards the pass.
    pub(crate) fn abort_render(&mut self, failed: FiberId, tracer: &mut Tracer<'_>) {
        tracing::warn!(fiber = %failed, "render failed; unwinding");
        self.arena[failed].flags.insert(EffectFlags::INCOMPLETE);
        let mut node = Some(failed);
        while let Some(n) = node {
            if self.session.stack.top() == Some(n) {
                self.unwind_work(n, tracer);
            }
            node = self.arena[n].return_fiber;
        }
        self.discard_render();
    }

    /// Resets the session and frees fibers created by the discarded pass.
    pub(crate) fn discard_render(&mut self) {
        for fiber in core::mem::take(&mut self.session.created) {
            self.arena.free(fiber);
        }
        self.session.reset();
        self.contexts.reset_to_defaults();
    }
}

/// Appends `child`'s effect list, then `child` itself if it carries a commit
/// effect, to `parent`'s effect list.
fn splice_effects<H: HostConfig>(arena: &mut FiberArena<H>, parent: FiberId, child: FiberId) {
    let (first, last, flags) = {
        let c = &arena[child];
        (c.first_effect, c.last_effect, c.flags)
    };
    if arena[parent].first_effect.is_none() {
        arena[parent].first_effect = first;
    }
    if let Some(last) = last {
        if let Some(parent_last) = arena[parent].last_effect {
            arena[parent_last].next_effect = first;
        }
        arena[parent].last_effect = Some(last);
    }
    if flags.has_commit_effect() {
        match arena[parent].last_effect {
            Some(parent_last) => arena[parent_last].next_effect = Some(child),
            None => arena[parent].first_effect = Some(child),
        }
        arena[parent].last_effect = Some(child);
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::vec;

    use rstest::rstest;

    use super::*;
    use crate::element::{Element, Props};
    use crate::scheduler::UnitBudget;
    use crate::testing::{
        CONTAINER, Namespace, TestHost, TestHostError, assert_alternates_reciprocal, mount,
        render_sync,
    };

    const LOW: ExpirationTime = ExpirationTime(100);

    fn reconciler() -> Reconciler<TestHost> {
        Reconciler::new(TestHost::new(), CONTAINER)
    }

    fn list(items: &[&str]) -> Element {
        let children = items
            .iter()
            .map(|item| Element::host("li", Props::new().children(vec![Element::text(item)])))
            .collect();
        Element::host("ul", Props::new().children(children))
    }

    #[test]
    fn mount_creates_bottom_up_and_places_once() {
        let mut r = reconciler();
        let app = Element::host(
            "div",
            Props::new().attr("id", "a").children(vec![Element::text("hello")]),
        );
        r.update_container(Some(app), ExpirationTime::SYNC);
        let status = r.perform_sync_work().unwrap();

        assert_eq!(
            status,
            WorkStatus::Committed {
                expiration_time: ExpirationTime::SYNC,
                effects: 1,
                remaining: ExpirationTime::NO_WORK,
            }
        );
        assert_eq!(
            r.host_mut().take_log(),
            [
                "create_text \"hello\" #0",
                "create div #1",
                "append_initial #1 <- #0",
                "append container 0 <- #1",
            ]
        );
        assert_eq!(r.host().render(CONTAINER), "<div id=\"a\">hello</div>");
        assert!(r.session().is_torn_down());
        assert!(!r.has_pending_work());
        assert_eq!(r.root().commit_count(), 1);
        assert_alternates_reciprocal(&r);
    }

    #[test]
    fn nothing_scheduled_is_idle() {
        let mut r = reconciler();
        assert_eq!(r.perform_sync_work().unwrap(), WorkStatus::Idle);
        assert!(r.host().log.is_empty());
    }

    #[test]
    fn async_render_resumes_at_the_next_unit() {
        let mut r = reconciler();
        let app = Element::host(
            "div",
            Props::new().children(vec![Element::text("a"), Element::text("b")]),
        );
        r.update_container(Some(app), LOW);

        let mut budget = UnitBudget::new(2);
        assert_eq!(
            r.perform_work(&mut budget).unwrap(),
            WorkStatus::Yielded {
                expiration_time: LOW,
                units: 2
            }
        );
        assert!(r.host().log.is_empty());
        assert!(r.session().is_rendering());
        assert_eq!(r.session().render_expiration_time(), LOW);
        assert!(r.session().next_unit_of_work().is_some());

        budget.refill(1);
        assert_eq!(
            r.perform_work(&mut budget).unwrap(),
            WorkStatus::Yielded {
                expiration_time: LOW,
                units: 1
            }
        );
        assert_eq!(r.host_mut().take_log(), ["create_text \"a\" #0"]);

        budget.refill(10);
        assert!(matches!(
            r.perform_work(&mut budget).unwrap(),
            WorkStatus::Committed { expiration_time: LOW, .. }
        ));
        assert_eq!(r.host().render(CONTAINER), "<div>ab</div>");
        assert!(r.session().is_torn_down());
    }

    #[test]
    fn sync_work_ignores_the_scheduler() {
        let mut r = reconciler();
        r.update_container(Some(list(&["a", "b"])), ExpirationTime::SYNC);
        let status = r.perform_work(&mut UnitBudget::new(0)).unwrap();
        assert!(matches!(status, WorkStatus::Committed { .. }));
        assert_eq!(r.host().render(CONTAINER), "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn urgent_update_restarts_and_skipped_update_is_rebased() {
        let mut r = reconciler();
        r.update_container(Some(Element::text("low")), LOW);
        assert!(matches!(
            r.perform_work(&mut UnitBudget::new(1)).unwrap(),
            WorkStatus::Yielded { units: 1, .. }
        ));
        let live_while_paused = r.arena().len();

        r.update_container(Some(Element::host("b", Props::new())), ExpirationTime::SYNC);
        let status = r.perform_sync_work().unwrap();
        assert!(matches!(
            status,
            WorkStatus::Committed {
                expiration_time: ExpirationTime::SYNC,
                remaining: LOW,
                ..
            }
        ));
        assert_eq!(r.host().render(CONTAINER), "<b></b>");
        assert!(r.has_pending_work());
        assert_eq!(r.root().first_pending_time(), LOW);
        // The abandoned pass's child was freed, not leaked.
        assert!(r.arena().len() <= live_while_paused);

        // Replaying both updates in order lands on the same element.
        assert!(matches!(
            r.perform_sync_work().unwrap(),
            WorkStatus::Committed {
                expiration_time: LOW,
                remaining: ExpirationTime::NO_WORK,
                ..
            }
        ));
        assert_eq!(r.host().render(CONTAINER), "<b></b>");
        assert!(!r.has_pending_work());
        assert_alternates_reciprocal(&r);
    }

    #[test]
    fn host_error_abandons_the_render_and_keeps_work_pending() {
        let mut r = reconciler();
        r.host_mut().refuse = Some(String::from("span"));
        let app = Element::host(
            "div",
            Props::new().children(vec![Element::host(
                "span",
                Props::new().children(vec![Element::text("x")]),
            )]),
        );
        r.update_container(Some(app), ExpirationTime::SYNC);

        let err = r.perform_sync_work().unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Host(TestHostError::Refused(ref ty)) if ty == "span"
        ));
        assert_eq!(r.host_mut().take_log(), ["create_text \"x\" #0"]);
        assert!(r.session().is_torn_down());
        assert!(r.has_pending_work());
        assert_eq!(r.root().commit_count(), 0);
        assert_eq!(r.host().render(CONTAINER), "");

        r.host_mut().refuse = None;
        assert!(matches!(
            r.perform_sync_work().unwrap(),
            WorkStatus::Committed { .. }
        ));
        assert_eq!(r.host().render(CONTAINER), "<div><span>x</span></div>");
    }

    #[test]
    fn every_push_is_popped_before_commit() {
        let mut r = reconciler();
        let theme = r.create_context(0_u8);
        let app = theme.provider(
            1,
            vec![Element::host(
                "svg",
                Props::new().children(vec![Element::host("circle", Props::new())]),
            )],
        );
        r.update_container(Some(app), ExpirationTime::SYNC);

        let mut tracer = Tracer::none();
        r.prepare_fresh_stack(ExpirationTime::SYNC, &mut tracer);
        let mut deepest = 0;
        while let Some(unit) = r.session.work_in_progress {
            r.perform_unit_of_work(unit, &mut tracer).unwrap();
            deepest = deepest.max(r.session.stack.depth());
        }
        // Container (3), provider (1) and the svg namespace (2).
        assert_eq!(deepest, 6);
        assert_eq!(r.session.stack.depth(), 0);
        assert_eq!(r.session.stack.pushes(), 6);
        assert_eq!(r.session.stack.pushes(), r.session.stack.pops());

        r.commit_root(ExpirationTime::SYNC, &mut tracer).unwrap();
        assert!(r.session().is_torn_down());
        assert_eq!(r.host().namespace(0), Namespace::Svg);
        assert_eq!(r.host().namespace(1), Namespace::Svg);
    }

    #[test]
    fn scheduling_marks_every_ancestor_on_both_trees() {
        let mut r = mount(Element::host(
            "div",
            Props::new().children(vec![Element::host(
                "span",
                Props::new().children(vec![Element::text("x")]),
            )]),
        ));
        render_sync(
            &mut r,
            Element::host(
                "div",
                Props::new().children(vec![Element::host(
                    "span",
                    Props::new().children(vec![Element::text("y")]),
                )]),
            ),
        );
        let text = r
            .arena()
            .descendants(r.current_root())
            .find(|&f| r.arena()[f].tag == WorkTag::HostText)
            .unwrap();

        assert!(r.schedule_update_on_fiber(text, LOW));
        assert_eq!(r.root().first_pending_time(), LOW);
        assert!(r.arena()[text].expiration_time >= LOW);

        let mut ancestors = Vec::new();
        let mut node = r.arena()[text].return_fiber;
        while let Some(n) = node {
            ancestors.push(n);
            node = r.arena()[n].return_fiber;
        }
        assert_eq!(ancestors.len(), 3);
        for fiber in ancestors {
            assert!(r.arena()[fiber].child_expiration_time >= LOW);
            let alternate = r.arena()[fiber].alternate.unwrap();
            assert!(r.arena()[alternate].child_expiration_time >= LOW);
        }
    }

    #[test]
    fn scheduling_on_a_detached_fiber_is_ignored() {
        let mut r = reconciler();
        let stray = r
            .arena
            .create_from_element(&Element::text("stray"), ExpirationTime::NO_WORK);
        assert!(!r.schedule_update_on_fiber(stray, LOW));
        assert!(!r.has_pending_work());
    }

    #[test]
    fn alternates_stay_paired_across_renders() {
        let mut r = mount(list(&["a", "b", "c"]));
        for items in [&["a", "c"][..], &["x", "a", "c", "y"], &[], &["b"]] {
            render_sync(&mut r, list(items));
            assert_alternates_reciprocal(&r);
            assert!(r.session().is_torn_down());
        }
        assert_eq!(r.host().render(CONTAINER), "<ul><li>b</li></ul>");
    }

    #[rstest]
    #[case::one_unit_per_call(1)]
    #[case::three_units(3)]
    #[case::whole_tree(100)]
    fn any_budget_commits_the_same_tree(#[case] units: u32) {
        let mut r = reconciler();
        r.update_container(Some(list(&["a", "b"])), LOW);
        let mut calls = 0;
        loop {
            calls += 1;
            match r.perform_work(&mut UnitBudget::new(units)).unwrap() {
                WorkStatus::Yielded { units: done, .. } => assert_eq!(done, units),
                WorkStatus::Committed { .. } => break,
                WorkStatus::Idle => panic!("work vanished"),
            }
        }
        assert!(calls >= 1);
        assert_eq!(r.host().render(CONTAINER), "<ul><li>a</li><li>b</li></ul>");
        assert!(!r.has_pending_work());
    }
}
