// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::TestResultParseError, test_name::TestName};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The name reported for the implicit suite that encloses every test in a
/// bundle, when the underlying framework doesn't name one itself.
pub const TOP_LEVEL_SUITE_NAME: &str = "Toplevel Test Suite";

/// A single event in a test run's lifecycle.
///
/// On the wire this is one JSON object per line: the `timestamp` field plus
/// the flattened [`TestEventKind`], whose `event` tag discriminates the
/// object. Events are immutable records -- they are the sole channel of truth
/// between a running test process and its observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestEvent {
    /// The time at which this event was generated, as fractional seconds
    /// since the Unix epoch.
    pub timestamp: Timestamp,

    /// The kind of event this is, including kind-specific fields.
    #[serde(flatten)]
    pub kind: TestEventKind,
}

impl TestEvent {
    /// Creates a new event with the given timestamp.
    pub fn new(timestamp: Timestamp, kind: TestEventKind) -> Self {
        Self { timestamp, kind }
    }

    /// Creates a new event stamped with the current time.
    pub fn now(kind: TestEventKind) -> Self {
        Self::new(Timestamp::now(), kind)
    }
}

/// The kind of test event, along with its kind-specific fields.
///
/// Discriminators are kebab-case on the wire, field names camelCase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum TestEventKind {
    /// A top-level action (e.g. a whole `run-tests` invocation) started.
    BeginAction {
        /// The action name.
        name: String,
    },

    /// A top-level action completed.
    EndAction {
        /// The action name.
        name: String,
        /// Whether the action as a whole succeeded.
        succeeded: bool,
        /// Wall-clock duration of the action in seconds.
        #[serde(default)]
        duration: f64,
    },

    /// A test-bundle process is about to run.
    BeginTestBundle {
        /// The bundle's name.
        bundle_name: String,
    },

    /// A test-bundle process finished (or failed to start).
    EndTestBundle {
        /// The bundle's name.
        bundle_name: String,
        /// Whether every test in the bundle ran and passed.
        succeeded: bool,
        /// Diagnostic text, set when the bundle failed before reporting any
        /// structured events.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A (possibly nested) test suite started.
    BeginTestSuite {
        /// The suite name.
        suite: String,
    },

    /// A test suite completed.
    EndTestSuite {
        /// The suite name.
        suite: String,
        /// Number of test cases that finished within this suite.
        #[serde(default)]
        test_case_count: u32,
        /// Number of tests that finished unsuccessfully with a plain failure.
        #[serde(default)]
        total_failure_count: u32,
        /// Number of tests that finished with an unexpected exception.
        #[serde(default)]
        unexpected_exception_count: u32,
        /// Summed duration of the suite's tests, in seconds.
        #[serde(default)]
        test_duration: f64,
        /// Wall-clock duration of the suite including overhead, in seconds.
        #[serde(default)]
        total_duration: f64,
    },

    /// An individual test case started.
    BeginTest {
        /// The full `ClassName/methodName` identifier.
        test: TestName,
        /// The class component, duplicated for convenience of stream
        /// consumers.
        class_name: String,
        /// The method component.
        method_name: String,
    },

    /// An individual test case completed.
    EndTest {
        /// The full `ClassName/methodName` identifier.
        test: TestName,
        /// The class component.
        class_name: String,
        /// The method component.
        method_name: String,
        /// Whether the test passed.
        succeeded: bool,
        /// The coarse result classification.
        result: TestResult,
        /// Wall-clock duration of the test, in seconds.
        #[serde(default)]
        total_duration: f64,
        /// Output captured while the test ran.
        #[serde(default)]
        output: String,
        /// Failure details, one entry per recorded exception or assertion.
        #[serde(default)]
        exceptions: Vec<TestException>,
    },

    /// Free-form output attributed to the currently running test.
    TestOutput {
        /// The output text.
        output: String,
    },

    /// Free-form output seen before the test bundle reported any structured
    /// event.
    OutputBeforeTestBundleStarts {
        /// The output text.
        output: String,
    },

    /// A long-running status message began.
    BeginStatus {
        /// The message text.
        message: String,
        /// The message severity.
        level: StatusLevel,
    },

    /// A long-running status message ended.
    EndStatus {
        /// The message text.
        message: String,
        /// The message severity.
        level: StatusLevel,
    },

    /// A static-analyzer finding surfaced by the toolchain.
    AnalyzerResult {
        /// Path of the file the finding is in.
        file: String,
        /// 1-based line number.
        line: u64,
        /// 1-based column number.
        col: u64,
        /// Human-readable description of the finding.
        description: String,
        /// The analyzer category (e.g. "Logic error").
        category: String,
        /// The finding type.
        #[serde(rename = "type")]
        kind: String,
    },
}

impl TestEventKind {
    /// Builds a `begin-test` event kind from a test name, keeping the
    /// duplicated class/method fields consistent.
    pub fn begin_test(test: &TestName) -> Self {
        TestEventKind::BeginTest {
            test: test.clone(),
            class_name: test.class_name().to_owned(),
            method_name: test.method_name().to_owned(),
        }
    }

    /// Builds an `end-test` event kind from a test name and its outcome.
    pub fn end_test(
        test: &TestName,
        succeeded: bool,
        result: TestResult,
        total_duration: f64,
        output: String,
        exceptions: Vec<TestException>,
    ) -> Self {
        TestEventKind::EndTest {
            test: test.clone(),
            class_name: test.class_name().to_owned(),
            method_name: test.method_name().to_owned(),
            succeeded,
            result,
            total_duration,
            output,
            exceptions,
        }
    }
}

/// One recorded failure within a test: an assertion or exception with its
/// source location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestException {
    /// Path of the source file the failure was reported at, relative to the
    /// project, or a placeholder when unknown.
    pub file_path_in_project: String,

    /// Line number of the failure, or 0 when unknown.
    #[serde(default)]
    pub line_number: u64,

    /// The failure reason.
    pub reason: String,
}

/// The coarse classification of a finished test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    /// The test passed.
    Success,

    /// An assertion failed.
    Failure,

    /// The test raised an unexpected exception, or was terminated by
    /// something other than an ordinary assertion failure.
    Error,
}

impl TestResult {
    /// Returns true if this result represents a passing test.
    pub fn is_success(self) -> bool {
        matches!(self, TestResult::Success)
    }

    pub(crate) fn to_static_str(self) -> &'static str {
        match self {
            TestResult::Success => "success",
            TestResult::Failure => "failure",
            TestResult::Error => "error",
        }
    }
}

impl FromStr for TestResult {
    type Err = TestResultParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TestResult::Success),
            "failure" => Ok(TestResult::Failure),
            "error" => Ok(TestResult::Error),
            other => Err(TestResultParseError::new(other)),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

/// Severity of a status event.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    /// Debugging chatter, normally hidden.
    Debug,

    /// Verbose progress detail.
    Verbose,

    /// Routine progress information.
    Info,

    /// Something looks off but the run continues.
    Warning,

    /// Something went wrong.
    Error,
}

impl StatusLevel {
    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 5] {
        ["debug", "verbose", "info", "warning", "error"]
    }
}

/// A wall-clock instant, carried on the wire as fractional seconds since the
/// Unix epoch.
///
/// Microsecond precision is preserved through a round-trip; anything finer is
/// below what the producing frameworks report.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Creates a timestamp from fractional seconds since the Unix epoch.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(secs)
    }

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_datetime(Local::now())
    }

    /// Creates a timestamp from a chrono datetime.
    pub fn from_datetime<Tz: TimeZone>(datetime: DateTime<Tz>) -> Self {
        Self(datetime.timestamp_micros() as f64 / 1_000_000.0)
    }

    /// Returns the raw fractional seconds since the Unix epoch.
    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// Converts to a local datetime, if the value is within chrono's
    /// representable range.
    pub fn to_datetime(self) -> Option<DateTime<Local>> {
        let micros = (self.0 * 1_000_000.0).round();
        Utc.timestamp_micros(micros as i64)
            .single()
            .map(|dt| dt.with_timezone(&Local))
    }

    /// Returns the elapsed seconds from `earlier` to `self`, clamped to be
    /// non-negative.
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_name(s: &str) -> TestName {
        s.parse().expect("valid test name")
    }

    #[test]
    fn begin_test_wire_format() {
        let event = TestEvent::new(
            Timestamp::from_secs_f64(1400000000.5),
            TestEventKind::begin_test(&test_name("MyTests/testExample")),
        );
        let json = serde_json::to_value(&event).expect("serializes");
        assert_eq!(
            json,
            serde_json::json!({
                "event": "begin-test",
                "timestamp": 1400000000.5,
                "test": "MyTests/testExample",
                "className": "MyTests",
                "methodName": "testExample",
            })
        );
    }

    #[test]
    fn end_test_suite_round_trip() {
        let line = r#"{"event":"end-test-suite","timestamp":1400000010.25,"suite":"Toplevel Test Suite","testCaseCount":3,"totalFailureCount":1,"unexpectedExceptionCount":0,"testDuration":0.25,"totalDuration":0.5}"#;
        let event: TestEvent = serde_json::from_str(line).expect("deserializes");
        match &event.kind {
            TestEventKind::EndTestSuite {
                suite,
                test_case_count,
                total_failure_count,
                ..
            } => {
                assert_eq!(suite, TOP_LEVEL_SUITE_NAME);
                assert_eq!(*test_case_count, 3);
                assert_eq!(*total_failure_count, 1);
            }
            other => panic!("unexpected event kind: {other:?}"),
        }
        let reserialized = serde_json::to_string(&event).expect("serializes");
        let back: TestEvent = serde_json::from_str(&reserialized).expect("round-trips");
        assert_eq!(back, event);
    }

    #[test]
    fn end_test_defaults_apply_to_missing_fields() {
        // Producers on fatal-error paths can omit duration, output, and
        // exceptions entirely.
        let line = r#"{"event":"end-test","timestamp":10.0,"test":"C/m","className":"C","methodName":"m","succeeded":false,"result":"error"}"#;
        let event: TestEvent = serde_json::from_str(line).expect("deserializes");
        match event.kind {
            TestEventKind::EndTest {
                total_duration,
                output,
                exceptions,
                result,
                ..
            } => {
                assert_eq!(total_duration, 0.0);
                assert_eq!(output, "");
                assert_eq!(exceptions, vec![]);
                assert_eq!(result, TestResult::Error);
            }
            other => panic!("unexpected event kind: {other:?}"),
        }
    }

    #[test]
    fn exception_wire_format() {
        let exception = TestException {
            file_path_in_project: "MyTests.m".to_owned(),
            line_number: 42,
            reason: "assertion failed".to_owned(),
        };
        let json = serde_json::to_value(&exception).expect("serializes");
        assert_eq!(
            json,
            serde_json::json!({
                "filePathInProject": "MyTests.m",
                "lineNumber": 42,
                "reason": "assertion failed",
            })
        );
    }

    #[test]
    fn test_result_strings() {
        for (input, expected) in [
            ("success", TestResult::Success),
            ("failure", TestResult::Failure),
            ("error", TestResult::Error),
        ] {
            let parsed: TestResult = input.parse().expect("parses");
            assert_eq!(parsed, expected);
            assert_eq!(parsed.to_string(), input);
        }
        "crash".parse::<TestResult>().expect_err("unknown result");
    }

    #[test]
    fn timestamp_datetime_round_trip() {
        let ts = Timestamp::from_secs_f64(1400000000.123456);
        let datetime = ts.to_datetime().expect("in range");
        let back = Timestamp::from_datetime(datetime);
        assert!((back.as_secs_f64() - ts.as_secs_f64()).abs() < 1e-6);
    }

    #[test]
    fn seconds_since_clamps_negative() {
        let earlier = Timestamp::from_secs_f64(100.0);
        let later = Timestamp::from_secs_f64(101.5);
        assert_eq!(later.seconds_since(earlier), 1.5);
        assert_eq!(earlier.seconds_since(later), 0.0);
    }
}
