// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ancestor-scoped host environment.
//!
//! Three cursors move together: the root container, the host context, and
//! the fiber that provided the current host context. A container boundary
//! pushes all three. A host component pushes only when its child context
//! differs from the current one, and its pop is skipped unless it was the
//! fiber that provided the current context.

use crate::error::InvariantViolation;
use crate::fiber::FiberId;
use crate::host::HostConfig;
use crate::stack::{FiberStack, StackCursor};

/// The host container and host context cursors.
pub struct HostContextStack<H: HostConfig> {
    root_instance: StackCursor<Option<H::Container>>,
    context: StackCursor<Option<H::HostContext>>,
    context_fiber: StackCursor<Option<FiberId>>,
}

impl<H: HostConfig> core::fmt::Debug for HostContextStack<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostContextStack")
            .field("depth", &self.context.depth())
            .field("context_fiber", self.context_fiber.current())
            .finish_non_exhaustive()
    }
}

impl<H: HostConfig> Default for HostContextStack<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HostConfig> HostContextStack<H> {
    /// Creates the cursors with nothing pushed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root_instance: StackCursor::new(None),
            context: StackCursor::new(None),
            context_fiber: StackCursor::new(None),
        }
    }

    /// Enters a container boundary at `fiber`.
    pub fn push_host_container(
        &mut self,
        stack: &mut FiberStack,
        host: &H,
        fiber: FiberId,
        container: H::Container,
    ) {
        let root_context = host.get_root_host_context(&container);
        self.root_instance.push(stack, Some(container), fiber);
        self.context_fiber.push(stack, Some(fiber), fiber);
        self.context.push(stack, Some(root_context), fiber);
    }

    /// Leaves the container boundary entered at `fiber`.
    pub fn pop_host_container(&mut self, stack: &mut FiberStack, fiber: FiberId) {
        self.context.pop(stack, fiber);
        self.context_fiber.pop(stack, fiber);
        self.root_instance.pop(stack, fiber);
    }

    /// Derives the child context of a host node of type `ty` and pushes it
    /// if it differs from the current one.
    pub fn push_host_context(
        &mut self,
        stack: &mut FiberStack,
        host: &H,
        fiber: FiberId,
        ty: &str,
    ) -> Result<(), InvariantViolation> {
        let container = self
            .root_instance
            .require(InvariantViolation::MissingRootContainer(fiber))?;
        let current = self
            .context
            .require(InvariantViolation::MissingHostContext(fiber))?;
        let next = host.get_child_host_context(current, ty, container);
        if *current == next {
            return Ok(());
        }
        self.context_fiber.push(stack, Some(fiber), fiber);
        self.context.push(stack, Some(next), fiber);
        Ok(())
    }

    /// Pops the context pushed by `fiber`, if it pushed one.
    pub fn pop_host_context(&mut self, stack: &mut FiberStack, fiber: FiberId) {
        if *self.context_fiber.current() != Some(fiber) {
            return;
        }
        self.context.pop(stack, fiber);
        self.context_fiber.pop(stack, fiber);
    }

    /// The current host context.
    pub fn host_context(&self, fiber: FiberId) -> Result<&H::HostContext, InvariantViolation> {
        self.context
            .require(InvariantViolation::MissingHostContext(fiber))
    }

    /// The current root container.
    pub fn root_host_container(
        &self,
        fiber: FiberId,
    ) -> Result<&H::Container, InvariantViolation> {
        self.root_instance
            .require(InvariantViolation::MissingRootContainer(fiber))
    }

    /// Number of host contexts pushed.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.context.depth()
    }

    /// Drops every pushed value.
    pub fn reset(&mut self) {
        self.root_instance.reset();
        self.context.reset();
        self.context_fiber.reset();
    }
}
