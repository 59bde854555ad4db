// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Context values, dependency tracking and change propagation.
//!
//! A context is a value supplied by a provider fiber to its whole subtree.
//! The [`ContextTable`] holds the active value of every context; providers
//! swap it in on the way down and restore it on the way up through one
//! shared value cursor:
//!
//! ```text
//!   begin(Provider A=2)   push_provider  table[A]=2  saved: [1]
//!     begin(Consumer)     read_context   -> 2, dependency on A recorded
//!   complete(Provider)    pop_provider   table[A]=1  saved: []
//! ```
//!
//! Every context read is recorded on the reading fiber's [`Dependencies`].
//! When a provider's value changes, [`propagate_context_change`] walks the
//! provider's subtree, finds every fiber whose last render read the context,
//! and raises its expiration time (and its ancestors' child expiration time)
//! so the traversal visits it even where a bailout would otherwise prune.
//!
//! Whether a value changed is decided by the context's changed-bits
//! function: it returns a bitmask, `0` meaning "unchanged". Consumers may
//! observe only some bits; a consumer is scheduled only if the bits it
//! observes intersect the changed bits.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use crate::element::{AnyValue, ConsumerRender, Element, ElementType, Props};
use crate::error::InvariantViolation;
use crate::expiration::ExpirationTime;
use crate::fiber::{FiberArena, FiberId, WorkTag};
use crate::host::HostConfig;
use crate::stack::{FiberStack, StackCursor};

/// Every observable bit.
pub const ALL_BITS: u32 = 0x3FFF_FFFF;

/// Identity of a context within one [`ContextTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub(crate) u32);

impl ContextId {
    /// Rebuilds an id from [`index`](Self::index).
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Creation order of the context within its table.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// A typed handle to a context.
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
        }
    }
}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.id).finish()
    }
}

impl<T: 'static> Context<T> {
    /// The untyped identity of this context.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The value read when no provider is above the reader.
    #[must_use]
    pub fn default_value(&self) -> &Rc<T> {
        &self.default
    }

    /// A provider supplying `value` to `children`.
    #[must_use]
    pub fn provider(&self, value: T, children: Vec<Element>) -> Element {
        self.provider_rc(Rc::new(value), children)
    }

    /// A provider supplying a shared value. Re-rendering with the same `Rc`
    /// never counts as a change.
    #[must_use]
    pub fn provider_rc(&self, value: Rc<T>, children: Vec<Element>) -> Element {
        let value: AnyValue = value;
        let props = Props {
            value: Some(value),
            ..Props::new().children(children)
        };
        Element::new(ElementType::Provider(self.id), props)
    }

    /// A consumer rendering `render` with the active value.
    #[must_use]
    pub fn consumer(&self, render: impl Fn(&T) -> Element + 'static) -> Element {
        self.consumer_props(None, render)
    }

    /// A consumer that only re-renders when `observed_bits` change.
    #[must_use]
    pub fn consumer_observing(
        &self,
        observed_bits: u32,
        render: impl Fn(&T) -> Element + 'static,
    ) -> Element {
        self.consumer_props(Some(observed_bits), render)
    }

    fn consumer_props(
        &self,
        observed_bits: Option<u32>,
        render: impl Fn(&T) -> Element + 'static,
    ) -> Element {
        let default = self.default.clone();
        let render: ConsumerRender = Rc::new(move |value: &AnyValue| {
            let value = value.clone().downcast::<T>().unwrap_or_else(|_| default.clone());
            render(&value)
        });
        let props = Props {
            render: Some(render),
            observed_bits,
            ..Props::new()
        };
        Element::new(ElementType::Consumer(self.id), props)
    }

    /// Downcasts a value read from this context.
    pub(crate) fn downcast(&self, value: AnyValue) -> Rc<T> {
        value.downcast::<T>().unwrap_or_else(|_| self.default.clone())
    }
}

type ChangedBitsFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> u32>;

struct ContextSlot {
    default: AnyValue,
    current: AnyValue,
    changed_bits: ChangedBitsFn,
}

/// Active values of every context.
#[derive(Default)]
pub struct ContextTable {
    slots: Vec<ContextSlot>,
}

impl fmt::Debug for ContextTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextTable")
            .field("contexts", &self.slots.len())
            .finish()
    }
}

impl ContextTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context whose value changes whenever it is unequal.
    pub fn create<T: PartialEq + 'static>(&mut self, default: T) -> Context<T> {
        self.create_with_changed_bits(default, |a: &T, b: &T| if a == b { 0 } else { ALL_BITS })
    }

    /// Creates a context with a custom changed-bits function.
    pub fn create_with_changed_bits<T: 'static>(
        &mut self,
        default: T,
        changed_bits: impl Fn(&T, &T) -> u32 + 'static,
    ) -> Context<T> {
        let id = ContextId(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        let default = Rc::new(default);
        let erased: AnyValue = default.clone();
        let changed_bits: ChangedBitsFn = Rc::new(move |old: &dyn Any, new: &dyn Any| {
            match (old.downcast_ref::<T>(), new.downcast_ref::<T>()) {
                (Some(old), Some(new)) => changed_bits(old, new),
                _ => ALL_BITS,
            }
        });
        self.slots.push(ContextSlot {
            default: erased.clone(),
            current: erased,
            changed_bits,
        });
        Context { id, default }
    }

    /// Number of contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no context was created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The active value of `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::UnknownContext`] if `ctx` was created by
    /// another table.
    pub fn current(&self, ctx: ContextId) -> Result<&AnyValue, InvariantViolation> {
        Ok(&self.slot(ctx)?.current)
    }

    /// Bits that changed between two values of `ctx`. Identical values
    /// never change.
    ///
    /// # Errors
    ///
    /// See [`current`](Self::current).
    pub fn changed_bits(
        &self,
        ctx: ContextId,
        old: &AnyValue,
        new: &AnyValue,
    ) -> Result<u32, InvariantViolation> {
        let slot = self.slot(ctx)?;
        if Rc::ptr_eq(old, new) {
            return Ok(0);
        }
        Ok((slot.changed_bits)(&**old, &**new) & ALL_BITS)
    }

    /// Restores every context to its default value.
    pub fn reset_to_defaults(&mut self) {
        for slot in &mut self.slots {
            slot.current = slot.default.clone();
        }
    }

    pub(crate) fn set_current(
        &mut self,
        ctx: ContextId,
        value: AnyValue,
    ) -> Result<(), InvariantViolation> {
        self.slot_mut(ctx)?.current = value;
        Ok(())
    }

    fn slot(&self, ctx: ContextId) -> Result<&ContextSlot, InvariantViolation> {
        self.slots
            .get(ctx.0 as usize)
            .ok_or(InvariantViolation::UnknownContext(ctx))
    }

    fn slot_mut(&mut self, ctx: ContextId) -> Result<&mut ContextSlot, InvariantViolation> {
        self.slots
            .get_mut(ctx.0 as usize)
            .ok_or(InvariantViolation::UnknownContext(ctx))
    }
}

/// One context read recorded on a fiber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextItem {
    /// The context read.
    pub context: ContextId,
    /// Bits the reader observes.
    pub observed_bits: u32,
}

/// The contexts a fiber read during its last render.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Most urgent pending work triggered by a change to one of these.
    pub expiration_time: ExpirationTime,
    pub(crate) items: Vec<ContextItem>,
}

impl Dependencies {
    /// The reads, in first-read order, one entry per context.
    #[must_use]
    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    /// Returns `true` if `ctx` was read.
    #[must_use]
    pub fn reads(&self, ctx: ContextId) -> bool {
        self.items.iter().any(|item| item.context == ctx)
    }
}

/// Per-render state of the context subsystem.
#[derive(Debug)]
pub struct ContextSession {
    value_cursor: StackCursor<Option<AnyValue>>,
    currently_rendering_fiber: Option<FiberId>,
    last_context_dependency: Option<ContextId>,
    last_context_with_all_bits_observed: Option<ContextId>,
}

impl Default for ContextSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextSession {
    /// Creates an idle session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value_cursor: StackCursor::new(None),
            currently_rendering_fiber: None,
            last_context_dependency: None,
            last_context_with_all_bits_observed: None,
        }
    }

    /// The fiber whose render is reading contexts, if any.
    #[must_use]
    pub fn currently_rendering_fiber(&self) -> Option<FiberId> {
        self.currently_rendering_fiber
    }

    /// Number of provider values currently pushed.
    #[must_use]
    pub fn provider_depth(&self) -> usize {
        self.value_cursor.depth()
    }

    /// Returns `true` once nothing from a render remains.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.value_cursor.depth() == 0
            && self.currently_rendering_fiber.is_none()
            && self.last_context_dependency.is_none()
            && self.last_context_with_all_bits_observed.is_none()
    }

    /// Drops every pushed value and per-render field.
    pub fn reset(&mut self) {
        self.value_cursor.reset();
        self.finish_render();
    }

    /// Prepares `fiber` to record a fresh dependency list.
    ///
    /// Returns `true` if the previous list recorded pending work at
    /// `render_time`, meaning the fiber must re-render even if its props
    /// did not change.
    pub fn prepare_to_read_context(
        &mut self,
        fiber: FiberId,
        dependencies: &mut Option<Dependencies>,
        render_time: ExpirationTime,
    ) -> bool {
        self.currently_rendering_fiber = Some(fiber);
        self.last_context_dependency = None;
        self.last_context_with_all_bits_observed = None;

        let Some(deps) = dependencies else {
            return false;
        };
        if deps.items.is_empty() {
            return false;
        }
        deps.items.clear();
        deps.expiration_time >= render_time
    }

    /// Clears the per-fiber fields once a render is done.
    pub fn finish_render(&mut self) {
        self.currently_rendering_fiber = None;
        self.last_context_dependency = None;
        self.last_context_with_all_bits_observed = None;
    }

    /// Reads the active value of `ctx` and records the read on the rendering
    /// fiber's `dependencies`.
    ///
    /// `observed_bits: None` observes every bit; `Some(0)` reads without
    /// recording a dependency. Repeated reads of one context merge into one
    /// entry.
    pub fn read_context(
        &mut self,
        table: &ContextTable,
        dependencies: &mut Option<Dependencies>,
        ctx: ContextId,
        observed_bits: Option<u32>,
    ) -> Result<AnyValue, InvariantViolation> {
        if self.currently_rendering_fiber.is_none() {
            return Err(InvariantViolation::ContextReadOutsideRender);
        }
        let value = table.current(ctx)?.clone();
        if self.last_context_with_all_bits_observed == Some(ctx) {
            return Ok(value);
        }
        let observed = match observed_bits {
            Some(0) => return Ok(value),
            None | Some(ALL_BITS..) => {
                self.last_context_with_all_bits_observed = Some(ctx);
                ALL_BITS
            }
            Some(bits) => bits,
        };

        let item = ContextItem {
            context: ctx,
            observed_bits: observed,
        };
        match (self.last_context_dependency, dependencies.as_mut()) {
            (Some(_), Some(deps)) => {
                match deps.items.iter_mut().find(|i| i.context == ctx) {
                    Some(existing) => existing.observed_bits |= observed,
                    None => deps.items.push(item),
                }
            }
            _ => {
                // First read of this render allocates the list head.
                *dependencies = Some(Dependencies {
                    expiration_time: ExpirationTime::NO_WORK,
                    items: alloc::vec![item],
                });
            }
        }
        self.last_context_dependency = Some(ctx);
        Ok(value)
    }

    /// Makes `value` the active value of `ctx` for `provider`'s subtree.
    /// Nothing is pushed if `ctx` is unknown to `table`.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::UnknownContext`] if `ctx` was created by
    /// another table.
    pub fn push_provider(
        &mut self,
        stack: &mut FiberStack,
        table: &mut ContextTable,
        provider: FiberId,
        ctx: ContextId,
        value: AnyValue,
    ) -> Result<(), InvariantViolation> {
        let prev = table.current(ctx)?.clone();
        self.value_cursor.push(stack, Some(prev), provider);
        table.set_current(ctx, value)
    }

    /// Restores the value `ctx` had before `provider` pushed.
    ///
    /// # Errors
    ///
    /// See [`push_provider`](Self::push_provider). The stack frame is popped
    /// either way.
    pub fn pop_provider(
        &mut self,
        stack: &mut FiberStack,
        table: &mut ContextTable,
        provider: FiberId,
        ctx: ContextId,
    ) -> Result<(), InvariantViolation> {
        let saved = self.value_cursor.current().clone();
        let depth = self.value_cursor.depth();
        self.value_cursor.pop(stack, provider);
        match saved {
            Some(prev) if self.value_cursor.depth() < depth => table.set_current(ctx, prev),
            _ => Ok(()),
        }
    }
}

/// Marks every fiber below `provider` that read `ctx` with the changed bits.
///
/// Returns the number of fibers scheduled. Nested providers of the same
/// context are not entered.
pub fn propagate_context_change<H: HostConfig>(
    arena: &mut FiberArena<H>,
    provider: FiberId,
    ctx: ContextId,
    changed_bits: u32,
    render_time: ExpirationTime,
) -> u32 {
    let mut matched = 0;
    let mut fiber = arena[provider].child;
    if let Some(first) = fiber {
        arena[first].return_fiber = Some(provider);
    }

    while let Some(node) = fiber {
        let f = &arena[node];
        let hit = f.dependencies.as_ref().map(|deps| {
            deps.items
                .iter()
                .any(|item| item.context == ctx && item.observed_bits & changed_bits != 0)
        });
        let same_provider = f.tag == WorkTag::ContextProvider
            && matches!(&f.ty, Some(ElementType::Provider(c)) if *c == ctx);
        let child = f.child;

        let next = match hit {
            Some(true) => {
                schedule_fiber(arena, node, render_time);
                schedule_work_on_parent_path(arena, arena[node].return_fiber, render_time);
                if let Some(deps) = &mut arena[node].dependencies {
                    deps.expiration_time = deps.expiration_time.max(render_time);
                }
                matched += 1;
                child
            }
            Some(false) => child,
            None if same_provider => None,
            None => child,
        };

        fiber = match next {
            Some(child) => {
                arena[child].return_fiber = Some(node);
                Some(child)
            }
            None => next_outside(arena, provider, node),
        };
    }

    if matched > 0 {
        tracing::debug!(%provider, ?ctx, changed_bits, matched, "propagated context change");
    }
    matched
}

/// Next fiber after `node`'s subtree, without leaving `root`.
fn next_outside<H: HostConfig>(
    arena: &mut FiberArena<H>,
    root: FiberId,
    node: FiberId,
) -> Option<FiberId> {
    let mut node = node;
    loop {
        if node == root {
            return None;
        }
        let parent = arena[node].return_fiber;
        if let Some(sibling) = arena[node].sibling {
            arena[sibling].return_fiber = parent;
            return Some(sibling);
        }
        node = parent?;
    }
}

fn schedule_fiber<H: HostConfig>(arena: &mut FiberArena<H>, fiber: FiberId, t: ExpirationTime) {
    let f = &mut arena[fiber];
    f.expiration_time = f.expiration_time.max(t);
    if let Some(alt) = f.alternate {
        let a = &mut arena[alt];
        a.expiration_time = a.expiration_time.max(t);
    }
}

/// Raises `child_expiration_time` to at least `t` on `parent` and every
/// ancestor above it, and on their alternates.
///
/// Stops at the first ancestor whose value, and its alternate's, already
/// reach `t`: everything above it is then marked too.
pub fn schedule_work_on_parent_path<H: HostConfig>(
    arena: &mut FiberArena<H>,
    parent: Option<FiberId>,
    t: ExpirationTime,
) {
    let mut node = parent;
    while let Some(n) = node {
        let alternate = arena[n].alternate;
        let alt_behind = alternate.is_some_and(|a| arena[a].child_expiration_time < t);
        if arena[n].child_expiration_time < t {
            arena[n].child_expiration_time = t;
        } else if !alt_behind {
            break;
        }
        if let (Some(a), true) = (alternate, alt_behind) {
            arena[a].child_expiration_time = t;
        }
        node = arena[n].return_fiber;
    }
}
