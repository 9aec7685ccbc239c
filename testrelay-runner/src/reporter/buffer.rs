// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::EventSink;
use testrelay_events::TestEvent;

/// Buffers events for an underlying sink until flushed.
///
/// Decouples event production rate from reporter latency: the buffer absorbs
/// events on the serial event context, and [`flush`](Self::flush) delivers
/// them to the inner sink atomically, in order, at a point where blocking is
/// acceptable.
pub struct EventBuffer<S> {
    sink: S,
    events: Vec<TestEvent>,
}

impl<S: EventSink> EventBuffer<S> {
    /// Wraps `sink` in a buffer.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            events: Vec::new(),
        }
    }

    /// The events buffered so far.
    pub fn events(&self) -> &[TestEvent] {
        &self.events
    }

    /// Delivers all buffered events into the underlying sink, in order.
    pub fn flush(&mut self) {
        for event in self.events.drain(..) {
            self.sink.handle_event(&event);
        }
    }

    /// Consumes the buffer, returning the inner sink.
    ///
    /// Buffered events that were never flushed are dropped.
    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S: EventSink> EventSink for EventBuffer<S> {
    fn handle_event(&mut self, event: &TestEvent) {
        self.events.push(event.clone());
    }
}
