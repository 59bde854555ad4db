// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The fiber record: one tree position plus its pending side effects.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use super::FiberId;
use crate::context::Dependencies;
use crate::element::{Element, ElementType, Props, RefHandle};
use crate::expiration::ExpirationTime;
use crate::hooks::Hook;
use crate::host::HostConfig;
use crate::update_queue::UpdateQueue;

/// What kind of work a fiber performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkTag {
    /// A function component that has rendered at least once.
    FunctionComponent,
    /// A function component that has not rendered yet.
    IndeterminateComponent,
    /// The root of a tree.
    HostRoot,
    /// A host node.
    HostComponent,
    /// A host text node.
    HostText,
    /// A fragment.
    Fragment,
    /// A context provider.
    ContextProvider,
    /// A context consumer.
    ContextConsumer,
    /// A memoized function component.
    MemoComponent,
}

/// Bitmask of side effects a fiber carries to commit.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectFlags(u16);

impl EffectFlags {
    /// No effect.
    pub const NONE: Self = Self(0);
    /// The component rendered. Not a commit effect on its own.
    pub const PERFORMED_WORK: Self = Self(1);
    /// Insert the host nodes of this subtree.
    pub const PLACEMENT: Self = Self(1 << 1);
    /// Apply an update payload.
    pub const UPDATE: Self = Self(1 << 2);
    /// Remove the host nodes of this subtree.
    pub const DELETION: Self = Self(1 << 3);
    /// Reset text content.
    pub const CONTENT_RESET: Self = Self(1 << 4);
    /// Run commit callbacks.
    pub const CALLBACK: Self = Self(1 << 5);
    /// Attach or detach a ref.
    pub const REF: Self = Self(1 << 7);
    /// Has passive effects.
    pub const PASSIVE: Self = Self(1 << 9);
    /// The fiber's work was abandoned.
    pub const INCOMPLETE: Self = Self(1 << 11);

    const NAMES: [(Self, &'static str); 9] = [
        (Self::PERFORMED_WORK, "PerformedWork"),
        (Self::PLACEMENT, "Placement"),
        (Self::UPDATE, "Update"),
        (Self::DELETION, "Deletion"),
        (Self::CONTENT_RESET, "ContentReset"),
        (Self::CALLBACK, "Callback"),
        (Self::REF, "Ref"),
        (Self::PASSIVE, "Passive"),
        (Self::INCOMPLETE, "Incomplete"),
    ];

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` if no bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sets the bits of `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Returns `true` if the flags carry a commit effect, i.e. anything
    /// beyond `PERFORMED_WORK`.
    #[inline]
    #[must_use]
    pub const fn has_commit_effect(self) -> bool {
        self.0 > Self::PERFORMED_WORK.0
    }
}

impl BitOr for EffectFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EffectFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EffectFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NoEffect");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The memoized state of a fiber.
#[derive(Clone, Debug, Default)]
pub enum MemoizedState {
    /// No state.
    #[default]
    None,
    /// A root's current element.
    Root(Option<Element>),
    /// A function component's hook list, in call order.
    Hooks(Vec<Hook>),
}

/// Queue of pending root updates.
pub type RootQueue = UpdateQueue<Option<Element>, Option<Element>>;

/// The update queue slot of a fiber.
#[derive(Clone, Debug, Default)]
pub enum UpdateSlot<P> {
    /// Nothing queued.
    #[default]
    None,
    /// A root's element updates.
    Root(RootQueue),
    /// A host node's prepared update payload.
    Host(P),
}

/// One unit of work.
///
/// Fields are public for inspection; the reconciler hands out shared
/// references only.
pub struct Fiber<H: HostConfig> {
    /// Kind of work.
    pub tag: WorkTag,
    /// Element type. `None` for roots.
    pub ty: Option<ElementType>,
    /// Identity among siblings.
    pub key: Option<Rc<str>>,
    /// The host instance, for host fibers.
    pub state_node: Option<H::Instance>,
    /// Input for the next render.
    pub pending_props: Option<Rc<Props>>,
    /// Input of the last completed render.
    pub memoized_props: Option<Rc<Props>>,
    /// Hooks or root state.
    pub memoized_state: MemoizedState,
    /// Pending updates.
    pub update_queue: UpdateSlot<H::UpdatePayload>,
    /// Contexts read during the last render.
    pub dependencies: Option<Dependencies>,
    /// Side effects for commit.
    pub flags: EffectFlags,
    /// This fiber's own pending-work priority.
    pub expiration_time: ExpirationTime,
    /// Most urgent pending work in the subtree.
    pub child_expiration_time: ExpirationTime,
    /// Parent.
    pub return_fiber: Option<FiberId>,
    /// First child.
    pub child: Option<FiberId>,
    /// Next sibling.
    pub sibling: Option<FiberId>,
    /// Position among siblings.
    pub index: u32,
    /// Ref to attach the host instance to.
    pub ref_handle: Option<RefHandle>,
    /// The counterpart in the other tree.
    pub alternate: Option<FiberId>,
    /// Next fiber in the effect list.
    pub next_effect: Option<FiberId>,
    /// Head of this subtree's effect list.
    pub first_effect: Option<FiberId>,
    /// Tail of this subtree's effect list.
    pub last_effect: Option<FiberId>,
}

impl<H: HostConfig> Fiber<H> {
    /// Creates a detached fiber.
    #[must_use]
    pub fn new(tag: WorkTag, pending_props: Option<Rc<Props>>, key: Option<Rc<str>>) -> Self {
        Self {
            tag,
            ty: None,
            key,
            state_node: None,
            pending_props,
            memoized_props: None,
            memoized_state: MemoizedState::None,
            update_queue: UpdateSlot::None,
            dependencies: None,
            flags: EffectFlags::NONE,
            expiration_time: ExpirationTime::NO_WORK,
            child_expiration_time: ExpirationTime::NO_WORK,
            return_fiber: None,
            child: None,
            sibling: None,
            index: 0,
            ref_handle: None,
            alternate: None,
            next_effect: None,
            first_effect: None,
            last_effect: None,
        }
    }

    /// Returns `true` for host component and host text fibers.
    #[must_use]
    pub fn is_host(&self) -> bool {
        matches!(self.tag, WorkTag::HostComponent | WorkTag::HostText)
    }

    /// Returns `true` for fibers that can parent host nodes.
    #[must_use]
    pub fn is_host_parent(&self) -> bool {
        matches!(self.tag, WorkTag::HostComponent | WorkTag::HostRoot)
    }

    /// The host type name, for host components.
    #[must_use]
    pub fn host_type(&self) -> Option<&str> {
        self.ty.as_ref().and_then(ElementType::host_type)
    }

    /// The root element, for host roots.
    #[must_use]
    pub fn root_element(&self) -> Option<&Element> {
        match &self.memoized_state {
            MemoizedState::Root(element) => element.as_ref(),
            _ => None,
        }
    }
}

impl<H: HostConfig> fmt::Debug for Fiber<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("tag", &self.tag)
            .field("ty", &self.ty)
            .field("key", &self.key)
            .field("flags", &self.flags)
            .field("expiration_time", &self.expiration_time)
            .field("child_expiration_time", &self.child_expiration_time)
            .field("return_fiber", &self.return_fiber)
            .field("child", &self.child)
            .field("sibling", &self.sibling)
            .field("index", &self.index)
            .field("alternate", &self.alternate)
            .finish_non_exhaustive()
    }
}
