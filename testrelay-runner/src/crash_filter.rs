// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synthesizing completion events for runs that die early.
//!
//! When a test process crashes, the usual stream of events never arrives --
//! the process just dies, leaving suites and a test open. [`CrashFilter`]
//! watches the same event stream as everything else and, when the stream
//! terminates with state still open, fabricates the missing `end-test` and
//! `end-test-suite` events so that downstream consumers never see a dangling
//! lifecycle. Reporters are shielded from this entirely: synthetic events
//! travel the same broadcast path as genuine ones.
//!
//! Bookkeeping here is deliberately independent of
//! [`RunState`](crate::run_state::RunState); the filter trusts only what the
//! stream actually opened.

use crate::crash_reports::CrashReport;
use testrelay_events::{TestEvent, TestEventKind, TestException, TestName, TestResult, Timestamp};
use tracing::warn;

const UNKNOWN_FILE: &str = "Unknown File";

struct OpenSuite {
    name: String,
    begin: Timestamp,
    test_count: u32,
    failure_count: u32,
    error_count: u32,
    test_duration: f64,
}

struct OpenTest {
    name: TestName,
    begin: Timestamp,
}

/// Watches the event stream and closes out state left open by an abnormal
/// process exit.
pub struct CrashFilter {
    // Suites nest, so this is a stack; top = innermost.
    suite_stack: Vec<OpenSuite>,
    open_test: Option<OpenTest>,
    // Output seen since the open test began, attached to its synthetic
    // failure.
    current_output: String,
}

impl CrashFilter {
    /// Creates a filter with no open state.
    pub fn new() -> Self {
        Self {
            suite_stack: Vec::new(),
            open_test: None,
            current_output: String::new(),
        }
    }

    /// Observes one event from the stream.
    pub fn handle_event(&mut self, event: &TestEvent) {
        match &event.kind {
            TestEventKind::BeginTestSuite { suite } => {
                self.suite_stack.push(OpenSuite {
                    name: suite.clone(),
                    begin: event.timestamp,
                    test_count: 0,
                    failure_count: 0,
                    error_count: 0,
                    test_duration: 0.0,
                });
            }
            TestEventKind::EndTestSuite { suite, .. } => match self.suite_stack.pop() {
                Some(open) => {
                    if open.name != *suite {
                        warn!(
                            expected = %open.name,
                            got = %suite,
                            "end-test-suite does not match innermost open suite"
                        );
                    }
                }
                None => warn!(%suite, "end-test-suite with no open suite"),
            },
            TestEventKind::BeginTest { test, .. } => {
                self.open_test = Some(OpenTest {
                    name: test.clone(),
                    begin: event.timestamp,
                });
                self.current_output.clear();
            }
            TestEventKind::EndTest {
                succeeded,
                result,
                total_duration,
                ..
            } => {
                self.open_test = None;
                self.current_output.clear();
                self.record_finished_test(*succeeded, *result, *total_duration);
            }
            TestEventKind::TestOutput { output } => {
                if self.open_test.is_some() {
                    self.current_output.push_str(output);
                }
            }
            _ => {}
        }
    }

    // Every open suite contains the finished test, nested ones included.
    fn record_finished_test(&mut self, succeeded: bool, result: TestResult, duration: f64) {
        for suite in &mut self.suite_stack {
            suite.test_count += 1;
            if !succeeded {
                if result == TestResult::Error {
                    suite.error_count += 1;
                } else {
                    suite.failure_count += 1;
                }
            }
            suite.test_duration += duration.max(0.0);
        }
    }

    /// True if the stream left a suite or test open.
    pub fn has_open_state(&self) -> bool {
        !self.suite_stack.is_empty() || self.open_test.is_some()
    }

    /// The test that was mid-flight when the stream ended, if any.
    pub fn open_test(&self) -> Option<&TestName> {
        self.open_test.as_ref().map(|open| &open.name)
    }

    /// Closes out all open state, innermost to outermost.
    ///
    /// Synthesizes one failed `end-test` for the open test -- its reason
    /// names the process exit, with any newly discovered crash-report text
    /// attached verbatim -- followed by one `end-test-suite` per open suite
    /// with aggregates from whatever children were recorded before the
    /// crash. States that never opened produce nothing.
    pub fn finish(
        &mut self,
        at: Timestamp,
        reason: &str,
        crash_reports: &[CrashReport],
        mut emit: impl FnMut(TestEvent),
    ) {
        if let Some(open) = self.open_test.take() {
            let mut full_reason = reason.to_owned();
            for report in crash_reports {
                full_reason.push_str("\n\n");
                full_reason.push_str(report.path.as_str());
                full_reason.push_str(":\n");
                full_reason.push_str(&report.contents);
            }

            let duration = at.seconds_since(open.begin);
            self.record_finished_test(false, TestResult::Error, duration);

            let kind = TestEventKind::end_test(
                &open.name,
                false,
                TestResult::Error,
                duration,
                std::mem::take(&mut self.current_output),
                vec![TestException {
                    file_path_in_project: UNKNOWN_FILE.to_owned(),
                    line_number: 0,
                    reason: full_reason,
                }],
            );
            emit(TestEvent::new(at, kind));
        }

        while let Some(suite) = self.suite_stack.pop() {
            emit(TestEvent::new(
                at,
                TestEventKind::EndTestSuite {
                    suite: suite.name,
                    test_case_count: suite.test_count,
                    total_failure_count: suite.failure_count,
                    unexpected_exception_count: suite.error_count,
                    test_duration: suite.test_duration,
                    total_duration: at.seconds_since(suite.begin),
                },
            ));
        }
    }
}

impl Default for CrashFilter {
    fn default() -> Self {
        Self::new()
    }
}
