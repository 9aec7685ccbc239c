// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding of structured event lines.
//!
//! Each line a test-bundle process writes is either one self-describing JSON
//! event or free-form noise (crash logs, `printf` debugging, dynamic-linker
//! chatter). Noise must never abort decoding of subsequent well-formed
//! events, so failures here degrade to passthrough output instead of
//! erroring.

use testrelay_events::TestEvent;

/// The result of decoding one line of child-process output.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedLine {
    /// The line was a well-formed structured event.
    Event(TestEvent),

    /// The line was free-form output, ANSI escapes stripped. It belongs to
    /// whichever test is currently open, or to the pre-bundle output stream
    /// otherwise -- attribution is the caller's job, since the decoder is
    /// stateless.
    Output(String),
}

/// Decodes one line of child-process output.
///
/// Decoding is stateless and idempotent: feeding the same well-formed line
/// twice yields two equal events, with no dedup by content.
pub fn decode_line(line: &str) -> DecodedLine {
    match serde_json::from_str::<TestEvent>(line) {
        Ok(event) => DecodedLine::Event(event),
        Err(_) => DecodedLine::Output(strip_ansi_escapes::strip_str(line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testrelay_events::{TestEventKind, Timestamp};

    #[test]
    fn well_formed_event_decodes() {
        let line = r#"{"event":"begin-test-suite","timestamp":1400000000.0,"suite":"MyTests"}"#;
        let decoded = decode_line(line);
        assert_eq!(
            decoded,
            DecodedLine::Event(TestEvent::new(
                Timestamp::from_secs_f64(1400000000.0),
                TestEventKind::BeginTestSuite {
                    suite: "MyTests".to_owned(),
                },
            )),
        );
    }

    #[test]
    fn malformed_json_passes_through() {
        assert_eq!(
            decode_line("objc[1234]: Class X is implemented in both..."),
            DecodedLine::Output("objc[1234]: Class X is implemented in both...".to_owned()),
        );
    }

    #[test]
    fn json_without_event_key_passes_through() {
        let line = r#"{"timestamp":1400000000.0,"note":"not an event"}"#;
        assert_eq!(decode_line(line), DecodedLine::Output(line.to_owned()));
    }

    #[test]
    fn unknown_discriminator_passes_through() {
        let line = r#"{"event":"begin-warp-drive","timestamp":1400000000.0}"#;
        assert_eq!(decode_line(line), DecodedLine::Output(line.to_owned()));
    }

    #[test]
    fn passthrough_strips_ansi_escapes() {
        assert_eq!(
            decode_line("\x1b[31merror:\x1b[0m something broke"),
            DecodedLine::Output("error: something broke".to_owned()),
        );
    }

    #[test]
    fn decode_is_idempotent() {
        let line = r#"{"event":"test-output","timestamp":5.0,"output":"hi\n"}"#;
        let first = decode_line(line);
        let second = decode_line(line);
        assert_eq!(first, second);
        assert!(matches!(first, DecodedLine::Event(_)));
    }

    #[test]
    fn empty_line_passes_through_as_empty_output() {
        assert_eq!(decode_line(""), DecodedLine::Output(String::new()));
    }
}
