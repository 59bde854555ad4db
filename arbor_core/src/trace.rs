// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instrumentation events for the work loop.
//!
//! [`TraceSink`] has one method per event, each defaulting to a no-op, so a
//! sink implements only what it needs. [`Tracer`] wraps an optional
//! `&mut dyn TraceSink`; with the `trace` feature **off** its methods compile
//! to nothing, with it **on** each call costs one `Option` branch.
//!
//! Events arrive in traversal order:
//!
//! ```text
//! render_start
//!   begin_unit(root) begin_unit(child) .. bailout .. complete_unit(child) ..
//!   [context_propagation]   (from inside a provider's begin)
//!   [yield]                 (render paused; resumes with begin_unit)
//!   [unwind ..]             (render abandoned)
//! commit
//! ```
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies.

use crate::context::ContextId;
use crate::expiration::ExpirationTime;
use crate::fiber::{FiberId, WorkTag};

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a render pass starts from the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderStartEvent {
    /// The work-in-progress root fiber.
    pub root: FiberId,
    /// Expiration time the pass renders at.
    pub expiration_time: ExpirationTime,
    /// Whether an unfinished pass was thrown away to start this one.
    pub restarted: bool,
}

/// Emitted when a fiber enters or leaves the traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitEvent {
    /// The work-in-progress fiber.
    pub fiber: FiberId,
    /// Its work tag.
    pub tag: WorkTag,
}

/// Emitted when a fiber skips its own work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BailoutEvent {
    /// The fiber that bailed out.
    pub fiber: FiberId,
    /// Its work tag.
    pub tag: WorkTag,
    /// `true` if the whole subtree was skipped, `false` if its children were
    /// cloned for traversal.
    pub pruned: bool,
}

/// Emitted when a provider's value change was propagated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropagationEvent {
    /// The provider fiber.
    pub provider: FiberId,
    /// The context that changed.
    pub context: ContextId,
    /// Changed bits reported by the context's comparator.
    pub changed_bits: u32,
    /// Number of fibers scheduled.
    pub matched: u32,
}

/// Emitted when the render hands control back to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YieldEvent {
    /// Expiration time of the paused pass.
    pub expiration_time: ExpirationTime,
    /// Units performed since the previous resume.
    pub units: u32,
}

/// Emitted after a finished tree was committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitEvent {
    /// Expiration time of the committed pass.
    pub expiration_time: ExpirationTime,
    /// Number of fibers on the effect list.
    pub effects: usize,
    /// Most urgent work left after the commit.
    pub remaining: ExpirationTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the work loop.
///
/// Every method has a no-op default.
pub trait TraceSink {
    /// A render pass started.
    fn on_render_start(&mut self, e: &RenderStartEvent) {
        _ = e;
    }

    /// A fiber's begin phase started.
    fn on_begin_unit(&mut self, e: &UnitEvent) {
        _ = e;
    }

    /// A fiber bailed out of its own work.
    fn on_bailout(&mut self, e: &BailoutEvent) {
        _ = e;
    }

    /// A fiber's complete phase finished.
    fn on_complete_unit(&mut self, e: &UnitEvent) {
        _ = e;
    }

    /// A context change was propagated.
    fn on_context_propagation(&mut self, e: &PropagationEvent) {
        _ = e;
    }

    /// A fiber of an abandoned pass was unwound.
    fn on_unwind(&mut self, e: &UnitEvent) {
        _ = e;
    }

    /// The render yielded.
    fn on_yield(&mut self, e: &YieldEvent) {
        _ = e;
    }

    /// A tree was committed.
    fn on_commit(&mut self, e: &CommitEvent) {
        _ = e;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($(#[$doc:meta] $name:ident => $method:ident($ty:ty);)*) => {
        $(
            #[$doc]
            #[inline]
            pub fn $name(&mut self, e: &$ty) {
                #[cfg(feature = "trace")]
                if let Some(s) = &mut self.sink {
                    s.$method(e);
                }
                #[cfg(not(feature = "trace"))]
                {
                    _ = e;
                }
            }
        )*
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to `sink`.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    dispatch! {
        /// Emits a [`RenderStartEvent`].
        render_start => on_render_start(RenderStartEvent);
        /// Emits a begin [`UnitEvent`].
        begin_unit => on_begin_unit(UnitEvent);
        /// Emits a [`BailoutEvent`].
        bailout => on_bailout(BailoutEvent);
        /// Emits a complete [`UnitEvent`].
        complete_unit => on_complete_unit(UnitEvent);
        /// Emits a [`PropagationEvent`].
        context_propagation => on_context_propagation(PropagationEvent);
        /// Emits an unwind [`UnitEvent`].
        unwind => on_unwind(UnitEvent);
        /// Emits a [`YieldEvent`].
        yielded => on_yield(YieldEvent);
        /// Emits a [`CommitEvent`].
        commit => on_commit(CommitEvent);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> UnitEvent {
        UnitEvent {
            fiber: FiberId {
                idx: 3,
                generation: 1,
            },
            tag: WorkTag::HostComponent,
        }
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        sink.on_begin_unit(&unit());
        sink.on_complete_unit(&unit());
        sink.on_yield(&YieldEvent {
            expiration_time: ExpirationTime::SYNC,
            units: 0,
        });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.begin_unit(&unit());
        tracer.unwind(&unit());
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        #[derive(Default)]
        struct Counting {
            begins: Vec<WorkTag>,
            commits: usize,
        }
        impl TraceSink for Counting {
            fn on_begin_unit(&mut self, e: &UnitEvent) {
                self.begins.push(e.tag);
            }
            fn on_commit(&mut self, _: &CommitEvent) {
                self.commits += 1;
            }
        }

        let mut sink = Counting::default();
        let mut tracer = Tracer::new(&mut sink);
        tracer.begin_unit(&unit());
        tracer.commit(&CommitEvent {
            expiration_time: ExpirationTime::SYNC,
            effects: 2,
            remaining: ExpirationTime::NO_WORK,
        });
        drop(tracer);
        assert_eq!(sink.begins, [WorkTag::HostComponent]);
        assert_eq!(sink.commits, 1);
    }
}
