// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host contract for output-tree integrations.
//!
//! The reconciler never touches real output. Everything that creates,
//! mutates, or removes an output node goes through a [`HostConfig`]:
//!
//! - **Render phase**: [`create_instance`], [`create_text_instance`],
//!   [`append_initial_child`], [`finalize_initial_children`] and
//!   [`prepare_update`] are called from `complete_work` while the
//!   work-in-progress tree is built. Instances created here are detached
//!   until commit places them.
//!
//! - **Host context**: [`get_root_host_context`] and
//!   [`get_child_host_context`] derive the ancestor-scoped environment (for
//!   example an XML namespace) threaded through the traversal.
//!
//! - **Commit phase**: the mutation methods apply the effect list to the
//!   container. They are never called for a render that is abandoned.
//!
//! Errors from any method propagate unchanged to the caller of the work
//! loop as [`ReconcileError::Host`](crate::error::ReconcileError::Host).
//!
//! [`create_instance`]: HostConfig::create_instance
//! [`create_text_instance`]: HostConfig::create_text_instance
//! [`append_initial_child`]: HostConfig::append_initial_child
//! [`finalize_initial_children`]: HostConfig::finalize_initial_children
//! [`prepare_update`]: HostConfig::prepare_update
//! [`get_root_host_context`]: HostConfig::get_root_host_context
//! [`get_child_host_context`]: HostConfig::get_child_host_context

use crate::element::Props;
use crate::fiber::FiberId;

/// Applies reconciliation decisions to a host output tree.
///
/// Both real backends and test doubles implement this trait.
///
/// # Work loop pseudocode
///
/// ```rust,ignore
/// let mut reconciler = Reconciler::new(host, container);
/// reconciler.update_container(Some(app()), ExpirationTime::SYNC);
/// loop {
///     match reconciler.perform_work(&mut budget)? {
///         WorkStatus::Yielded { .. } => wait_for_idle(),
///         WorkStatus::Committed { .. } | WorkStatus::Idle => break,
///     }
/// }
/// ```
pub trait HostConfig {
    /// Handle to one output node.
    type Instance: Clone + 'static;
    /// Handle to the root container.
    type Container: Clone;
    /// Ancestor-scoped environment.
    type HostContext: Clone + PartialEq;
    /// Opaque description of a pending update, computed by
    /// [`prepare_update`](Self::prepare_update).
    type UpdatePayload: Clone;
    /// Error raised by host operations.
    type Error: core::error::Error + 'static;

    /// Context at the root container.
    fn get_root_host_context(&self, container: &Self::Container) -> Self::HostContext;

    /// Context for the children of a host node of type `ty`.
    fn get_child_host_context(
        &self,
        parent: &Self::HostContext,
        ty: &str,
        container: &Self::Container,
    ) -> Self::HostContext;

    /// Creates a detached host node.
    fn create_instance(
        &mut self,
        ty: &str,
        props: &Props,
        container: &Self::Container,
        host_context: &Self::HostContext,
        fiber: FiberId,
    ) -> Result<Self::Instance, Self::Error>;

    /// Appends `child` to a node that has not been placed yet.
    fn append_initial_child(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Applies initial properties. Returns `true` if the node needs a commit
    /// `Update` pass.
    fn finalize_initial_children(
        &mut self,
        instance: &Self::Instance,
        ty: &str,
        props: &Props,
        container: &Self::Container,
        host_context: &Self::HostContext,
    ) -> Result<bool, Self::Error>;

    /// Diffs `old_props` against `new_props`. `None` means nothing to update.
    fn prepare_update(
        &mut self,
        instance: &Self::Instance,
        ty: &str,
        old_props: &Props,
        new_props: &Props,
        container: &Self::Container,
        host_context: &Self::HostContext,
    ) -> Result<Option<Self::UpdatePayload>, Self::Error>;

    /// Creates a detached text node.
    fn create_text_instance(
        &mut self,
        text: &str,
        container: &Self::Container,
        host_context: &Self::HostContext,
        fiber: FiberId,
    ) -> Result<Self::Instance, Self::Error>;

    // -- Commit mutations --

    /// Appends `child` as the last child of `parent`.
    fn append_child(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Appends `child` as the last child of the container.
    fn append_child_to_container(
        &mut self,
        container: &Self::Container,
        child: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Inserts `child` into `parent` before `before`.
    fn insert_before(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
        before: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Inserts `child` into the container before `before`.
    fn insert_in_container_before(
        &mut self,
        container: &Self::Container,
        child: &Self::Instance,
        before: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Removes `child` from `parent`.
    fn remove_child(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Removes `child` from the container.
    fn remove_child_from_container(
        &mut self,
        container: &Self::Container,
        child: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Applies a payload computed by [`prepare_update`](Self::prepare_update).
    fn commit_update(
        &mut self,
        instance: &Self::Instance,
        payload: &Self::UpdatePayload,
        ty: &str,
        old_props: &Props,
        new_props: &Props,
    ) -> Result<(), Self::Error>;

    /// Replaces the content of a text node.
    fn commit_text_update(
        &mut self,
        instance: &Self::Instance,
        old_text: &str,
        new_text: &str,
    ) -> Result<(), Self::Error>;
}
