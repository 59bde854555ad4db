// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! The work loop has no clock, so each event's timestamp is its position in
//! the recording: one event per microsecond. Units become nested duration
//! slices; everything else is an instant.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for (ts, recorded) in decode(bytes).enumerate() {
        let event = match recorded {
            RecordedEvent::RenderStart(e) => json!({
                "ph": "i",
                "name": "RenderStart",
                "cat": "Render",
                "ts": ts,
                "pid": 0,
                "tid": 0,
                "s": "g",
                "args": {
                    "root": e.root.to_string(),
                    "expiration_time": e.expiration_time.0,
                    "restarted": e.restarted,
                }
            }),
            RecordedEvent::BeginUnit(e) => json!({
                "ph": "B",
                "name": format!("{:?}", e.tag),
                "cat": "Unit",
                "ts": ts,
                "pid": 0,
                "tid": 0,
                "args": {
                    "fiber": e.fiber.to_string(),
                }
            }),
            RecordedEvent::CompleteUnit(e) => json!({
                "ph": "E",
                "name": format!("{:?}", e.tag),
                "cat": "Unit",
                "ts": ts,
                "pid": 0,
                "tid": 0,
            }),
            RecordedEvent::Bailout(e) => json!({
                "ph": "i",
                "name": "Bailout",
                "cat": "Unit",
                "ts": ts,
                "pid": 0,
                "tid": 0,
                "s": "t",
                "args": {
                    "fiber": e.fiber.to_string(),
                    "pruned": e.pruned,
                }
            }),
            RecordedEvent::Propagation(e) => json!({
                "ph": "i",
                "name": "ContextPropagation",
                "cat": "Context",
                "ts": ts,
                "pid": 0,
                "tid": 0,
                "s": "t",
                "args": {
                    "provider": e.provider.to_string(),
                    "context": e.context.index(),
                    "changed_bits": e.changed_bits,
                    "matched": e.matched,
                }
            }),
            RecordedEvent::Unwind(e) => json!({
                "ph": "i",
                "name": "Unwind",
                "cat": "Render",
                "ts": ts,
                "pid": 0,
                "tid": 0,
                "s": "t",
                "args": {
                    "fiber": e.fiber.to_string(),
                    "tag": format!("{:?}", e.tag),
                }
            }),
            RecordedEvent::Yield(e) => json!({
                "ph": "i",
                "name": "Yield",
                "cat": "Render",
                "ts": ts,
                "pid": 0,
                "tid": 0,
                "s": "g",
                "args": {
                    "expiration_time": e.expiration_time.0,
                    "units": e.units,
                }
            }),
            RecordedEvent::Commit(e) => json!({
                "ph": "i",
                "name": "Commit",
                "cat": "Commit",
                "ts": ts,
                "pid": 0,
                "tid": 0,
                "s": "g",
                "args": {
                    "expiration_time": e.expiration_time.0,
                    "effects": e.effects,
                    "remaining": e.remaining.0,
                }
            }),
        };
        events.push(event);
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}
