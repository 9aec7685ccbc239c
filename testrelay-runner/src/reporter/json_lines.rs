// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::EventSink;
use std::io::Write;
use testrelay_events::TestEvent;
use tracing::warn;

/// Serializes each event as one JSON object per line.
///
/// This is the boundary with external reporter processes: they are separate
/// executables fed this newline-delimited stream on stdin and expected to
/// consume it incrementally.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    /// Creates a sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn handle_event(&mut self, event: &TestEvent) {
        // A write failure must not abort event processing; the run's result
        // does not depend on any one reporter staying healthy.
        let mut write_line = || -> std::io::Result<()> {
            serde_json::to_writer(&mut self.writer, event)?;
            self.writer.write_all(b"\n")?;
            self.writer.flush()
        };
        if let Err(error) = write_line() {
            warn!(%error, "failed to write event to reporter stream");
        }
    }
}
