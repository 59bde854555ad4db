// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records, one tag byte each. [`decode`]
//! reads them back as an iterator of [`RecordedEvent`].

use arbor_core::context::ContextId;
use arbor_core::expiration::ExpirationTime;
use arbor_core::fiber::{FiberId, WorkTag};
use arbor_core::trace::{
    BailoutEvent, CommitEvent, PropagationEvent, RenderStartEvent, TraceSink, UnitEvent,
    YieldEvent,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_RENDER_START: u8 = 1;
const TAG_BEGIN_UNIT: u8 = 2;
const TAG_BAILOUT: u8 = 3;
const TAG_COMPLETE_UNIT: u8 = 4;
const TAG_PROPAGATION: u8 = 5;
const TAG_UNWIND: u8 = 6;
const TAG_YIELD: u8 = 7;
const TAG_COMMIT: u8 = 8;

const WORK_TAGS: [WorkTag; 9] = [
    WorkTag::FunctionComponent,
    WorkTag::IndeterminateComponent,
    WorkTag::HostRoot,
    WorkTag::HostComponent,
    WorkTag::HostText,
    WorkTag::Fragment,
    WorkTag::ContextProvider,
    WorkTag::ContextConsumer,
    WorkTag::MemoComponent,
];

fn work_tag_code(tag: WorkTag) -> u8 {
    match tag {
        WorkTag::FunctionComponent => 0,
        WorkTag::IndeterminateComponent => 1,
        WorkTag::HostRoot => 2,
        WorkTag::HostComponent => 3,
        WorkTag::HostText => 4,
        WorkTag::Fragment => 5,
        WorkTag::ContextProvider => 6,
        WorkTag::ContextConsumer => 7,
        WorkTag::MemoComponent => 8,
    }
}

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_fiber(&mut self, fiber: FiberId) {
        self.write_u32(fiber.index());
        self.write_u32(fiber.generation());
    }

    fn write_unit(&mut self, tag: u8, e: &UnitEvent) {
        self.write_u8(tag);
        self.write_fiber(e.fiber);
        self.write_u8(work_tag_code(e.tag));
    }
}

impl TraceSink for RecorderSink {
    fn on_render_start(&mut self, e: &RenderStartEvent) {
        self.write_u8(TAG_RENDER_START);
        self.write_fiber(e.root);
        self.write_u32(e.expiration_time.0);
        self.write_u8(u8::from(e.restarted));
    }

    fn on_begin_unit(&mut self, e: &UnitEvent) {
        self.write_unit(TAG_BEGIN_UNIT, e);
    }

    fn on_bailout(&mut self, e: &BailoutEvent) {
        self.write_u8(TAG_BAILOUT);
        self.write_fiber(e.fiber);
        self.write_u8(work_tag_code(e.tag));
        self.write_u8(u8::from(e.pruned));
    }

    fn on_complete_unit(&mut self, e: &UnitEvent) {
        self.write_unit(TAG_COMPLETE_UNIT, e);
    }

    fn on_context_propagation(&mut self, e: &PropagationEvent) {
        self.write_u8(TAG_PROPAGATION);
        self.write_fiber(e.provider);
        self.write_u32(e.context.index());
        self.write_u32(e.changed_bits);
        self.write_u32(e.matched);
    }

    fn on_unwind(&mut self, e: &UnitEvent) {
        self.write_unit(TAG_UNWIND, e);
    }

    fn on_yield(&mut self, e: &YieldEvent) {
        self.write_u8(TAG_YIELD);
        self.write_u32(e.expiration_time.0);
        self.write_u32(e.units);
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.write_u8(TAG_COMMIT);
        self.write_u32(e.expiration_time.0);
        self.write_u64(e.effects as u64);
        self.write_u32(e.remaining.0);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`RenderStartEvent`].
    RenderStart(RenderStartEvent),
    /// A begin [`UnitEvent`].
    BeginUnit(UnitEvent),
    /// A [`BailoutEvent`].
    Bailout(BailoutEvent),
    /// A complete [`UnitEvent`].
    CompleteUnit(UnitEvent),
    /// A [`PropagationEvent`].
    Propagation(PropagationEvent),
    /// An unwind [`UnitEvent`].
    Unwind(UnitEvent),
    /// A [`YieldEvent`].
    Yield(YieldEvent),
    /// A [`CommitEvent`].
    Commit(CommitEvent),
}

impl RecordedEvent {
    /// Replays this event into `sink`.
    pub fn replay(&self, sink: &mut dyn TraceSink) {
        match self {
            Self::RenderStart(e) => sink.on_render_start(e),
            Self::BeginUnit(e) => sink.on_begin_unit(e),
            Self::Bailout(e) => sink.on_bailout(e),
            Self::CompleteUnit(e) => sink.on_complete_unit(e),
            Self::Propagation(e) => sink.on_context_propagation(e),
            Self::Unwind(e) => sink.on_unwind(e),
            Self::Yield(e) => sink.on_yield(e),
            Self::Commit(e) => sink.on_commit(e),
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events. Stops at the first unknown or truncated
/// record.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|v| v != 0)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<ExpirationTime> {
        self.read_u32().map(ExpirationTime)
    }

    fn read_fiber(&mut self) -> Option<FiberId> {
        let index = self.read_u32()?;
        let generation = self.read_u32()?;
        Some(FiberId::from_raw(index, generation))
    }

    fn read_work_tag(&mut self) -> Option<WorkTag> {
        WORK_TAGS.get(usize::from(self.read_u8()?)).copied()
    }

    fn read_unit(&mut self) -> Option<UnitEvent> {
        Some(UnitEvent {
            fiber: self.read_fiber()?,
            tag: self.read_work_tag()?,
        })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let event = match self.read_u8()? {
            TAG_RENDER_START => RecordedEvent::RenderStart(RenderStartEvent {
                root: self.read_fiber()?,
                expiration_time: self.read_time()?,
                restarted: self.read_bool()?,
            }),
            TAG_BEGIN_UNIT => RecordedEvent::BeginUnit(self.read_unit()?),
            TAG_BAILOUT => RecordedEvent::Bailout(BailoutEvent {
                fiber: self.read_fiber()?,
                tag: self.read_work_tag()?,
                pruned: self.read_bool()?,
            }),
            TAG_COMPLETE_UNIT => RecordedEvent::CompleteUnit(self.read_unit()?),
            TAG_PROPAGATION => RecordedEvent::Propagation(PropagationEvent {
                provider: self.read_fiber()?,
                context: ContextId::from_raw(self.read_u32()?),
                changed_bits: self.read_u32()?,
                matched: self.read_u32()?,
            }),
            TAG_UNWIND => RecordedEvent::Unwind(self.read_unit()?),
            TAG_YIELD => RecordedEvent::Yield(YieldEvent {
                expiration_time: self.read_time()?,
                units: self.read_u32()?,
            }),
            TAG_COMMIT => RecordedEvent::Commit(CommitEvent {
                expiration_time: self.read_time()?,
                effects: usize::try_from(self.read_u64()?).unwrap_or(usize::MAX),
                remaining: self.read_time()?,
            }),
            _ => return None,
        };
        Some(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: u32, tag: WorkTag) -> UnitEvent {
        UnitEvent {
            fiber: FiberId::from_raw(index, 2),
            tag,
        }
    }

    #[test]
    fn work_tag_codes_index_the_table() {
        for tag in WORK_TAGS {
            assert_eq!(WORK_TAGS[usize::from(work_tag_code(tag))], tag);
        }
    }

    #[test]
    fn decode_reads_back_a_render() {
        let mut rec = RecorderSink::new();
        let start = RenderStartEvent {
            root: FiberId::from_raw(1, 0),
            expiration_time: ExpirationTime(100),
            restarted: true,
        };
        let propagation = PropagationEvent {
            provider: FiberId::from_raw(4, 1),
            context: ContextId::from_raw(3),
            changed_bits: 0b101,
            matched: 2,
        };
        let commit = CommitEvent {
            expiration_time: ExpirationTime::SYNC,
            effects: 7,
            remaining: ExpirationTime::NO_WORK,
        };
        rec.on_render_start(&start);
        rec.on_begin_unit(&unit(1, WorkTag::HostRoot));
        rec.on_context_propagation(&propagation);
        rec.on_bailout(&BailoutEvent {
            fiber: FiberId::from_raw(9, 0),
            tag: WorkTag::MemoComponent,
            pruned: true,
        });
        rec.on_complete_unit(&unit(1, WorkTag::HostRoot));
        rec.on_commit(&commit);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], RecordedEvent::RenderStart(start));
        assert_eq!(
            events[1],
            RecordedEvent::BeginUnit(unit(1, WorkTag::HostRoot))
        );
        assert_eq!(events[2], RecordedEvent::Propagation(propagation));
        assert!(matches!(
            events[3],
            RecordedEvent::Bailout(BailoutEvent { pruned: true, .. })
        ));
        assert_eq!(events[5], RecordedEvent::Commit(commit));
    }

    #[test]
    fn truncated_record_stops_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_yield(&YieldEvent {
            expiration_time: ExpirationTime(100),
            units: 3,
        });
        rec.on_unwind(&unit(5, WorkTag::ContextProvider));
        let bytes = rec.into_bytes();

        let events: Vec<_> = decode(&bytes[..bytes.len() - 1]).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RecordedEvent::Yield(YieldEvent { units: 3, .. })));
    }

    #[test]
    fn unknown_tag_stops_decoding() {
        let events: Vec<_> = decode(&[0xFF, 1, 2, 3]).collect();
        assert!(events.is_empty());
    }
}
