// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The hook list of function components.
//!
//! A function component receives a [`RenderScope`] and calls hooks on it in
//! a fixed order. Each call lines up with one [`Hook`] in the fiber's
//! memoized state. On re-render the hook is cloned from the current fiber
//! and its queued updates are processed at the render expiration time.
//!
//! Updates issued through a [`StateSetter`] land in a pending list shared by
//! the fiber and its alternate. The next render moves them into the current
//! hook's queue before cloning, so an interrupted render never loses them.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData;

use crate::context::{Context, ContextId, ContextSession, ContextTable, Dependencies};
use crate::element::AnyValue;
use crate::error::InvariantViolation;
use crate::expiration::ExpirationTime;
use crate::fiber::FiberId;
use crate::update_queue::{Update, UpdateQueue};

/// A state transition queued on a hook.
pub type StateAction = Rc<dyn Fn(&AnyValue) -> AnyValue>;

type PendingUpdates = Rc<RefCell<Vec<Update<StateAction>>>>;

/// One hook slot.
#[derive(Clone)]
pub struct Hook {
    memoized_state: AnyValue,
    queue: UpdateQueue<AnyValue, StateAction>,
    pending: PendingUpdates,
}

impl Hook {
    fn mount(state: AnyValue) -> Self {
        Self {
            memoized_state: state.clone(),
            queue: UpdateQueue::new(state),
            pending: PendingUpdates::default(),
        }
    }

    /// The state produced by the last render.
    #[must_use]
    pub fn state(&self) -> &AnyValue {
        &self.memoized_state
    }

    /// Updates queued but not yet moved into the hook's queue.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Updates skipped by the last render, kept for a later one.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.updates().len()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("queued", &self.queued_len())
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

/// Handle for scheduling updates to one `use_state` hook.
///
/// Pass it to [`Reconciler::set_state`](crate::reconciler::Reconciler::set_state)
/// or [`Reconciler::update_state`](crate::reconciler::Reconciler::update_state).
pub struct StateSetter<T> {
    fiber: FiberId,
    pending: PendingUpdates,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            fiber: self.fiber,
            pending: self.pending.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("fiber", &self.fiber)
            .finish_non_exhaustive()
    }
}

impl<T> StateSetter<T> {
    /// The fiber that owns the hook.
    #[must_use]
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    pub(crate) fn enqueue(&self, expiration_time: ExpirationTime, action: StateAction) {
        self.pending.borrow_mut().push(Update {
            expiration_time,
            payload: action,
        });
    }
}

/// What a component render left behind.
pub(crate) struct HookOutcome {
    pub(crate) hooks: Vec<Hook>,
    pub(crate) remaining: ExpirationTime,
    pub(crate) did_update_state: bool,
    pub(crate) error: Option<InvariantViolation>,
}

/// The API a function component renders against.
pub struct RenderScope<'a> {
    fiber: FiberId,
    component: &'static str,
    render_time: ExpirationTime,
    contexts: &'a ContextTable,
    session: &'a mut ContextSession,
    dependencies: &'a mut Option<Dependencies>,
    previous: Option<&'a mut Vec<Hook>>,
    hooks: Vec<Hook>,
    remaining: ExpirationTime,
    did_update_state: bool,
    error: Option<InvariantViolation>,
}

impl fmt::Debug for RenderScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScope")
            .field("fiber", &self.fiber)
            .field("component", &self.component)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl<'a> RenderScope<'a> {
    pub(crate) fn new(
        fiber: FiberId,
        component: &'static str,
        render_time: ExpirationTime,
        contexts: &'a ContextTable,
        session: &'a mut ContextSession,
        dependencies: &'a mut Option<Dependencies>,
        previous: Option<&'a mut Vec<Hook>>,
    ) -> Self {
        Self {
            fiber,
            component,
            render_time,
            contexts,
            session,
            dependencies,
            previous,
            hooks: Vec::new(),
            remaining: ExpirationTime::NO_WORK,
            did_update_state: false,
            error: None,
        }
    }

    /// The fiber being rendered.
    #[must_use]
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    /// The expiration time this render runs at.
    #[must_use]
    pub fn render_expiration_time(&self) -> ExpirationTime {
        self.render_time
    }

    /// A piece of state, initialized by `init` on the first render.
    pub fn use_state<T: 'static>(&mut self, init: impl FnOnce() -> T) -> (Rc<T>, StateSetter<T>) {
        let index = self.hooks.len();
        let previous = self.previous.as_deref_mut().and_then(|hooks| hooks.get_mut(index));

        let Some(prev) = previous else {
            if self.previous.is_some() {
                self.record(InvariantViolation::HookOrderChanged {
                    component: self.component,
                    index,
                });
            }
            let value = Rc::new(init());
            return self.push_hook(Hook::mount(value.clone()), value);
        };

        let drained: Vec<_> = prev.pending.borrow_mut().drain(..).collect();
        for update in drained {
            prev.queue.enqueue(update);
        }
        let mut hook = prev.clone();
        let (state, remaining) = hook.queue.process(self.render_time, |s, action| action(s));
        if !Rc::ptr_eq(&state, &hook.memoized_state) {
            self.did_update_state = true;
        }
        hook.memoized_state = state;
        self.remaining = self.remaining.max(remaining);

        match hook.memoized_state.clone().downcast::<T>() {
            Ok(value) => self.push_hook(hook, value),
            Err(_) => {
                self.record(InvariantViolation::HookOrderChanged {
                    component: self.component,
                    index,
                });
                let value = Rc::new(init());
                self.push_hook(Hook::mount(value.clone()), value)
            }
        }
    }

    /// Reads `ctx`, subscribing to every change.
    pub fn use_context<T: 'static>(&mut self, ctx: &Context<T>) -> Rc<T> {
        self.use_context_observing(ctx, None)
    }

    /// Reads `ctx`, subscribing only to `observed_bits` (`None` for all).
    pub fn use_context_observing<T: 'static>(
        &mut self,
        ctx: &Context<T>,
        observed_bits: Option<u32>,
    ) -> Rc<T> {
        match self.read_context(ctx.id(), observed_bits) {
            Some(value) => ctx.downcast(value),
            None => ctx.default_value().clone(),
        }
    }

    /// Reads a context by id. `None` if the read violated an invariant; the
    /// render then fails once the component returns.
    pub fn read_context(&mut self, ctx: ContextId, observed_bits: Option<u32>) -> Option<AnyValue> {
        match self
            .session
            .read_context(self.contexts, self.dependencies, ctx, observed_bits)
        {
            Ok(value) => Some(value),
            Err(err) => {
                self.record(err);
                None
            }
        }
    }

    pub(crate) fn finish(self) -> HookOutcome {
        let mut error = self.error;
        if let Some(previous) = &self.previous {
            if error.is_none() && previous.len() != self.hooks.len() {
                error = Some(InvariantViolation::HookOrderChanged {
                    component: self.component,
                    index: previous.len().min(self.hooks.len()),
                });
            }
        }
        HookOutcome {
            hooks: self.hooks,
            remaining: self.remaining,
            did_update_state: self.did_update_state,
            error,
        }
    }

    fn push_hook<T>(&mut self, hook: Hook, value: Rc<T>) -> (Rc<T>, StateSetter<T>) {
        let setter = StateSetter {
            fiber: self.fiber,
            pending: hook.pending.clone(),
            marker: PhantomData,
        };
        self.hooks.push(hook);
        (value, setter)
    }

    fn record(&mut self, err: InvariantViolation) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

/// Wraps a typed "replace the state" update.
pub(crate) fn replace_action<T: Clone + PartialEq + 'static>(value: T) -> StateAction {
    Rc::new(move |prev: &AnyValue| match prev.downcast_ref::<T>() {
        Some(p) if *p == value => prev.clone(),
        _ => Rc::new(value.clone()),
    })
}

/// Wraps a typed "derive from the previous state" update.
pub(crate) fn update_action<T: 'static>(f: impl Fn(&T) -> T + 'static) -> StateAction {
    Rc::new(move |prev: &AnyValue| match prev.downcast_ref::<T>() {
        Some(p) => Rc::new(f(p)),
        None => prev.clone(),
    })
}
