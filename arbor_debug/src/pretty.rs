// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Unit events
//! are indented by their depth in the traversal.

use std::io::Write;

use arbor_core::trace::{
    BailoutEvent, CommitEvent, PropagationEvent, RenderStartEvent, TraceSink, UnitEvent,
    YieldEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    depth: usize,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self::with_writer(writer)
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer, depth: 0 }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth)
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_render_start(&mut self, e: &RenderStartEvent) {
        self.depth = 0;
        let restarted = if e.restarted { " (restarted)" } else { "" };
        let _ = writeln!(
            self.writer,
            "[render] root={} at={}{restarted}",
            e.root, e.expiration_time,
        );
    }

    fn on_begin_unit(&mut self, e: &UnitEvent) {
        let _ = writeln!(self.writer, "{}[begin] {} {:?}", self.indent(), e.fiber, e.tag);
        self.depth += 1;
    }

    fn on_bailout(&mut self, e: &BailoutEvent) {
        let what = if e.pruned { "pruned" } else { "cloned children" };
        let _ = writeln!(self.writer, "{}[bailout] {} {what}", self.indent(), e.fiber);
    }

    fn on_complete_unit(&mut self, e: &UnitEvent) {
        self.depth = self.depth.saturating_sub(1);
        let _ = writeln!(self.writer, "{}[complete] {} {:?}", self.indent(), e.fiber, e.tag);
    }

    fn on_context_propagation(&mut self, e: &PropagationEvent) {
        let _ = writeln!(
            self.writer,
            "{}[propagate] provider={} context={} bits={:#b} matched={}",
            self.indent(),
            e.provider,
            e.context.index(),
            e.changed_bits,
            e.matched,
        );
    }

    fn on_unwind(&mut self, e: &UnitEvent) {
        self.depth = self.depth.saturating_sub(1);
        let _ = writeln!(self.writer, "{}[unwind] {} {:?}", self.indent(), e.fiber, e.tag);
    }

    fn on_yield(&mut self, e: &YieldEvent) {
        let _ = writeln!(
            self.writer,
            "[yield] at={} after {} units",
            e.expiration_time, e.units,
        );
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.depth = 0;
        let _ = writeln!(
            self.writer,
            "[commit] at={} effects={} remaining={}",
            e.expiration_time, e.effects, e.remaining,
        );
    }
}
