// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The public entry point.
//!
//! A [`Reconciler`] owns everything one rendered tree needs: the host, the
//! fiber arena holding both trees, the [`FiberRoot`], the context table and
//! the render session. Callers schedule work with
//! [`update_container`](Reconciler::update_container) or a hook's
//! [`StateSetter`], then drive it with
//! [`perform_work`](Reconciler::perform_work).

use crate::context::{Context, ContextTable};
use crate::element::Element;
use crate::error::ReconcileError;
use crate::expiration::ExpirationTime;
use crate::fiber::{Fiber, FiberArena, FiberId, MemoizedState, RootQueue, UpdateSlot};
use crate::hooks::{StateSetter, replace_action, update_action};
use crate::host::HostConfig;
use crate::root::FiberRoot;
use crate::scheduler::{NeverYield, WorkScheduler};
use crate::trace::Tracer;
use crate::update_queue::Update;
use crate::work_loop::{RenderSession, WorkStatus};

/// Owns one tree and drives its work loop.
pub struct Reconciler<H: HostConfig> {
    pub(crate) host: H,
    pub(crate) arena: FiberArena<H>,
    pub(crate) root: FiberRoot<H>,
    pub(crate) contexts: ContextTable,
    pub(crate) session: RenderSession<H>,
}

impl<H: HostConfig> core::fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reconciler")
            .field("arena", &self.arena)
            .field("root", &self.root)
            .field("contexts", &self.contexts)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<H: HostConfig> Reconciler<H> {
    /// Creates an empty tree rendering into `container`.
    pub fn new(host: H, container: H::Container) -> Self {
        let mut arena = FiberArena::new();
        let current = arena.create_host_root();
        arena[current].memoized_state = MemoizedState::Root(None);
        arena[current].update_queue = UpdateSlot::Root(RootQueue::new(None));
        Self {
            host,
            arena,
            root: FiberRoot::new(container, current),
            contexts: ContextTable::new(),
            session: RenderSession::new(),
        }
    }

    /// Creates a context whose value changes whenever it is unequal.
    pub fn create_context<T: PartialEq + 'static>(&mut self, default: T) -> Context<T> {
        self.contexts.create(default)
    }

    /// Creates a context with a custom changed-bits function (`0` means
    /// unchanged).
    pub fn create_context_with_changed_bits<T: 'static>(
        &mut self,
        default: T,
        changed_bits: impl Fn(&T, &T) -> u32 + 'static,
    ) -> Context<T> {
        self.contexts.create_with_changed_bits(default, changed_bits)
    }

    /// Schedules rendering `element` into the container. `None` unmounts.
    pub fn update_container(&mut self, element: Option<Element>, expiration_time: ExpirationTime) {
        let current = self.root.current;
        let update = Update {
            expiration_time,
            payload: element,
        };
        let targets = [Some(current), self.arena[current].alternate];
        for fiber in targets.into_iter().flatten() {
            match &mut self.arena[fiber].update_queue {
                UpdateSlot::Root(queue) => queue.enqueue(update.clone()),
                slot => {
                    let mut queue = RootQueue::new(None);
                    queue.enqueue(update.clone());
                    *slot = UpdateSlot::Root(queue);
                }
            }
        }
        tracing::debug!(root = %current, ?expiration_time, "container update scheduled");
        self.schedule_update_on_fiber(current, expiration_time);
    }

    /// Replaces a `use_state` value. Returns `false` if the owning fiber is
    /// gone.
    pub fn set_state<T: Clone + PartialEq + 'static>(
        &mut self,
        setter: &StateSetter<T>,
        value: T,
        expiration_time: ExpirationTime,
    ) -> bool {
        self.dispatch(setter, expiration_time, || replace_action(value))
    }

    /// Derives a new `use_state` value from the previous one. Returns `false`
    /// if the owning fiber is gone.
    pub fn update_state<T: 'static>(
        &mut self,
        setter: &StateSetter<T>,
        f: impl Fn(&T) -> T + 'static,
        expiration_time: ExpirationTime,
    ) -> bool {
        self.dispatch(setter, expiration_time, || update_action(f))
    }

    fn dispatch<T>(
        &mut self,
        setter: &StateSetter<T>,
        expiration_time: ExpirationTime,
        action: impl FnOnce() -> crate::hooks::StateAction,
    ) -> bool {
        let fiber = setter.fiber();
        if !self.arena.is_alive(fiber) {
            tracing::warn!(%fiber, "state update on an unmounted component ignored");
            return false;
        }
        setter.enqueue(expiration_time, action());
        self.schedule_update_on_fiber(fiber, expiration_time)
    }

    /// Performs pending work, consulting `scheduler` between units.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantViolation`](crate::error::InvariantViolation) or
    /// a host error. A failure while rendering abandons the render and
    /// leaves the committed tree untouched. A failure during commit is
    /// returned after the commit finishes, with the new tree in place.
    pub fn perform_work(
        &mut self,
        scheduler: &mut impl WorkScheduler,
    ) -> Result<WorkStatus, ReconcileError<H::Error>> {
        self.perform_work_traced(scheduler, &mut Tracer::none())
    }

    /// Like [`perform_work`](Self::perform_work), reporting to `tracer`.
    ///
    /// # Errors
    ///
    /// See [`perform_work`](Self::perform_work).
    pub fn perform_work_traced(
        &mut self,
        scheduler: &mut impl WorkScheduler,
        tracer: &mut Tracer<'_>,
    ) -> Result<WorkStatus, ReconcileError<H::Error>> {
        self.work_on_root(scheduler, tracer)
    }

    /// Renders and commits the most urgent pending work without yielding.
    ///
    /// # Errors
    ///
    /// See [`perform_work`](Self::perform_work).
    pub fn perform_sync_work(&mut self) -> Result<WorkStatus, ReconcileError<H::Error>> {
        self.perform_work(&mut NeverYield)
    }

    // -- Accessors --

    /// The root bookkeeping.
    #[must_use]
    pub fn root(&self) -> &FiberRoot<H> {
        &self.root
    }

    /// The root fiber of the committed tree.
    #[must_use]
    pub fn current_root(&self) -> FiberId {
        self.root.current
    }

    /// A fiber of either tree, or `None` for a stale handle.
    #[must_use]
    pub fn fiber(&self, id: FiberId) -> Option<&Fiber<H>> {
        self.arena.get(id)
    }

    /// The fiber arena.
    #[must_use]
    pub fn arena(&self) -> &FiberArena<H> {
        &self.arena
    }

    /// The host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The context table.
    #[must_use]
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// The render session.
    #[must_use]
    pub fn session(&self) -> &RenderSession<H> {
        &self.session
    }

    /// Returns `true` if any work is scheduled.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.root.first_pending_time.is_no_work()
    }
}
