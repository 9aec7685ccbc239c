// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publishing test events to reporter sinks.
//!
//! Reporters that turn the event stream into human- or machine-readable
//! output are external executables; within this crate a sink is just
//! something that accepts events one at a time. Sinks are invoked
//! synchronously on the serial event context, so a slow consumer stalls
//! event processing -- wrap it in an [`EventBuffer`] to accumulate events and
//! flush them atomically later.

mod buffer;
mod json_lines;

pub use buffer::EventBuffer;
pub use json_lines::JsonLinesSink;

use testrelay_events::TestEvent;

/// A consumer of test events.
///
/// One entry point covers every event kind; implementations switch on
/// [`TestEvent::kind`] for the cases they care about.
pub trait EventSink {
    /// Handles one event.
    fn handle_event(&mut self, event: &TestEvent);
}

/// Publishes one event to every sink, in order.
pub fn broadcast(sinks: &mut [&mut dyn EventSink], event: &TestEvent) {
    for sink in sinks.iter_mut() {
        sink.handle_event(event);
    }
}

/// A sink that retains every event it sees, for summaries and tests.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    events: Vec<TestEvent>,
}

impl CollectingSink {
    /// Creates an empty collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The events seen so far, in arrival order.
    pub fn events(&self) -> &[TestEvent] {
        &self.events
    }

    /// Consumes the sink, returning the collected events.
    pub fn into_events(self) -> Vec<TestEvent> {
        self.events
    }
}

impl EventSink for CollectingSink {
    fn handle_event(&mut self, event: &TestEvent) {
        self.events.push(event.clone());
    }
}
