// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for the work loop.
//!
//! Two kinds of failure leave a render: [`InvariantViolation`] is an engine
//! bug or a misuse of the component API and always aborts the render, and
//! [`ReconcileError::Host`] carries an error raised by the host collaborator
//! unchanged. Work deferred for lack of priority is not an error; it stays
//! recorded on the tree and is reported through
//! [`WorkStatus`](crate::work_loop::WorkStatus).

use thiserror::Error;

use crate::context::ContextId;
use crate::fiber::{FiberId, WorkTag};

/// A broken engine invariant. Fatal for the render that observed it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvariantViolation {
    /// A host context was read with no host context pushed.
    #[error("expected host context to exist while working on {0}")]
    MissingHostContext(FiberId),
    /// The root container was read with no container pushed.
    #[error("expected a root container to be pushed while working on {0}")]
    MissingRootContainer(FiberId),
    /// `read_context` was called while no component was rendering.
    #[error("context can only be read while a component is rendering")]
    ContextReadOutsideRender,
    /// A fiber reached a phase without the props that phase requires.
    #[error("{tag:?} fiber {fiber} has no props during {phase}")]
    MissingProps {
        /// The fiber missing its props.
        fiber: FiberId,
        /// Its work tag.
        tag: WorkTag,
        /// The phase that needed them.
        phase: &'static str,
    },
    /// A fiber reached a phase without the element type that phase requires.
    #[error("{tag:?} fiber {fiber} has no element type")]
    MissingType {
        /// The fiber missing its type.
        fiber: FiberId,
        /// Its work tag.
        tag: WorkTag,
    },
    /// A context id created by another context table.
    #[error("unknown context {0:?}")]
    UnknownContext(ContextId),
    /// A handle outlived the fiber it named.
    #[error("stale fiber handle {0:?}")]
    StaleFiber(FiberId),
    /// Children were cloned onto a work-in-progress whose child list no
    /// longer matches the current tree.
    #[error("resuming work on {0} is not implemented")]
    ResumingWork(FiberId),
    /// A component called a different number or kind of hooks than in its
    /// previous render.
    #[error("component `{component}` changed its hook order (hook {index})")]
    HookOrderChanged {
        /// Name of the component.
        component: &'static str,
        /// Index of the first hook that no longer lines up.
        index: usize,
    },
    /// A host fiber reached commit without a host instance.
    #[error("host fiber {0} has no host instance")]
    MissingInstance(FiberId),
    /// A placed or deleted fiber has no host parent above it.
    #[error("fiber {0} has no host parent")]
    MissingHostParent(FiberId),
    /// The fiber stack still held frames after a complete traversal.
    #[error("stack ledger holds {0} unpopped frame(s) after the traversal")]
    UnbalancedStack(usize),
}

/// Error returned by the work loop.
#[derive(Debug, Error)]
pub enum ReconcileError<E> {
    /// A broken engine invariant.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    /// The host collaborator failed.
    #[error("host operation failed: {0}")]
    Host(#[source] E),
}

impl<E> ReconcileError<E> {
    /// Returns the invariant violation, if this is one.
    #[must_use]
    pub fn as_invariant(&self) -> Option<&InvariantViolation> {
        match self {
            Self::Invariant(v) => Some(v),
            Self::Host(_) => None,
        }
    }

    /// Returns the host error, if this is one.
    #[must_use]
    pub fn as_host(&self) -> Option<&E> {
        match self {
            Self::Invariant(_) => None,
            Self::Host(e) => Some(e),
        }
    }
}
