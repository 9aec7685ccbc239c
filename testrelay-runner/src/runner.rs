// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestrates one test-bundle process run end to end.
//!
//! [`BundleRunner`] owns the plumbing between the collaborators: it launches
//! the bundle process, multiplexes its output streams into the decoder, feeds
//! every decoded event to the state machine, the crash filter, and the
//! caller's sinks, and -- when the process dies with state still open -- lets
//! the crash filter close the run out so that every expected test is
//! represented exactly once in the final event stream.

use crate::{
    crash_filter::CrashFilter,
    crash_reports::{CrashReport, CrashReportLocator, CrashReportSnapshot},
    decoder::{DecodedLine, decode_line},
    errors::RunError,
    reporter::EventSink,
    run_state::RunState,
    test_command::{ExitStatusSummary, TestCommand},
    test_output::{LineSource, read_lines_and_feed},
    time,
};
use std::time::Duration;
use testrelay_events::{TestEvent, TestEventKind, TestName, Timestamp};
use tracing::{debug, warn};

/// Runs one test bundle and reconstructs its results.
pub struct BundleRunner {
    bundle_name: String,
    command: TestCommand,
    expected_tests: Vec<TestName>,
    crash_report_locator: Option<Box<dyn CrashReportLocator>>,
}

impl BundleRunner {
    /// Creates a runner for the given bundle and command.
    pub fn new(bundle_name: impl Into<String>, command: TestCommand) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            command,
            expected_tests: Vec::new(),
            crash_report_locator: None,
        }
    }

    /// Supplies the full list of tests expected to run, enabling never-run
    /// accounting when the process dies before referencing some of them.
    pub fn with_expected_tests(mut self, tests: Vec<TestName>) -> Self {
        self.expected_tests = tests;
        self
    }

    /// Supplies a crash-report locator whose new reports get attached to
    /// synthetic failures.
    pub fn with_crash_report_locator(mut self, locator: Box<dyn CrashReportLocator>) -> Self {
        self.crash_report_locator = Some(locator);
        self
    }

    /// Runs the bundle to completion, publishing every event (genuine and
    /// synthetic) to `sinks` in order.
    pub async fn run(self, sinks: &mut [&mut dyn EventSink]) -> Result<RunSummary, RunError> {
        let stopwatch = time::stopwatch();
        debug!(
            bundle = %self.bundle_name,
            program = %self.command.program(),
            start_time = %stopwatch.start_time(),
            "starting test bundle"
        );

        let baseline = self.crash_baseline();
        let mut state = RunState::with_expected_tests(self.expected_tests.clone());
        let mut filter = CrashFilter::new();

        // Spawn before publishing anything: a spawn failure is a rejected
        // invocation, not a run, and must not leave sinks with a dangling
        // begin-test-bundle.
        let mut child = self.command.spawn().map_err(RunError::Command)?;
        let sources = vec![
            LineSource::stdout(child.take_stdout().expect("stdout is piped at spawn")),
            LineSource::stderr(child.take_stderr().expect("stderr is piped at spawn")),
        ];

        dispatch(
            &mut state,
            &mut filter,
            sinks,
            &TestEvent::now(TestEventKind::BeginTestBundle {
                bundle_name: self.bundle_name.clone(),
            }),
        );

        let mut saw_structured_event = false;
        let exit_status = {
            let on_line = |_source, line: &str| match decode_line(line) {
                DecodedLine::Event(event) => {
                    saw_structured_event = true;
                    dispatch(&mut state, &mut filter, sinks, &event);
                }
                DecodedLine::Output(text) => {
                    // Restore the newline the multiplexer stripped, so output
                    // buffers keep their line structure.
                    let output = format!("{text}\n");
                    let kind = if state.running_test().is_some() || state.open_suite_depth() > 0 {
                        TestEventKind::TestOutput { output }
                    } else {
                        TestEventKind::OutputBeforeTestBundleStarts { output }
                    };
                    dispatch(&mut state, &mut filter, sinks, &TestEvent::now(kind));
                }
            };
            read_lines_and_feed(sources, on_line, child.wait(), true).await?
        };

        // The streams are at EOF: anything still open will never close on its
        // own.
        if filter.has_open_state() {
            let crash_reports = self.new_crash_reports(baseline.as_ref());
            let reason = format!("Test process {exit_status} before the test finished");
            let mut synthesized = Vec::new();
            filter.finish(Timestamp::now(), &reason, &crash_reports, |event| {
                synthesized.push(event);
            });
            debug!(
                count = synthesized.len(),
                "synthesizing completion events for crashed run"
            );
            for event in &synthesized {
                // Not routed back through the filter: its open state is
                // already drained.
                state.handle_event(event);
                for sink in sinks.iter_mut() {
                    sink.handle_event(event);
                }
            }
        }

        let never_run = state.never_run_tests();
        let succeeded =
            exit_status.is_success() && state.all_tests_passed() && never_run.is_empty();

        // A bundle that died without reporting a single structured event
        // never got as far as running tests; surface whatever it printed as
        // the startup error.
        let message = if !succeeded && !saw_structured_event {
            Some(state.pre_test_output().to_owned())
        } else {
            None
        };
        dispatch(
            &mut state,
            &mut filter,
            sinks,
            &TestEvent::now(TestEventKind::EndTestBundle {
                bundle_name: self.bundle_name.clone(),
                succeeded,
                message,
            }),
        );

        Ok(RunSummary {
            succeeded,
            exit_status,
            finished_tests: state.finished_test_count(),
            total_failures: state.total_failures(),
            total_errors: state.total_errors(),
            never_run,
            duration: stopwatch.elapsed(),
        })
    }

    fn crash_baseline(&self) -> Option<CrashReportSnapshot> {
        let locator = self.crash_report_locator.as_ref()?;
        match locator.snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!(%error, "failed to snapshot crash reports before the run");
                None
            }
        }
    }

    fn new_crash_reports(&self, baseline: Option<&CrashReportSnapshot>) -> Vec<CrashReport> {
        let (Some(locator), Some(baseline)) = (self.crash_report_locator.as_ref(), baseline)
        else {
            return Vec::new();
        };
        match locator.new_reports_since(baseline) {
            Ok(reports) => reports,
            Err(error) => {
                warn!(%error, "failed to collect crash reports after the run");
                Vec::new()
            }
        }
    }
}

fn dispatch(
    state: &mut RunState,
    filter: &mut CrashFilter,
    sinks: &mut [&mut dyn EventSink],
    event: &TestEvent,
) {
    state.handle_event(event);
    filter.handle_event(event);
    for sink in sinks.iter_mut() {
        sink.handle_event(event);
    }
}

/// The outcome of one bundle run.
///
/// Every expected test is represented exactly once: as a genuine result, a
/// synthetic crash-attributed failure, or an entry in
/// [`never_run`](Self::never_run).
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// True if the process exited cleanly, every started test passed, and no
    /// expected test was left unrun.
    pub succeeded: bool,

    /// How the bundle process terminated.
    pub exit_status: ExitStatusSummary,

    /// Number of tests that finished (genuine or synthetic).
    pub finished_tests: u32,

    /// Number of plain assertion failures.
    pub total_failures: u32,

    /// Number of unexpected-exception failures, synthetic crash failures
    /// included.
    pub total_errors: u32,

    /// Expected tests the stream never referenced; the caller decides whether
    /// to retry or report them.
    pub never_run: Vec<TestName>,

    /// Wall-clock duration of the whole run.
    pub duration: Duration,
}
