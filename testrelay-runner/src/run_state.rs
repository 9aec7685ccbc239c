// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming state for test suites and test cases.
//!
//! [`RunState`] consumes the decoded event feed and maintains the nested
//! running state of one bundle process: an explicit stack of open suites, at
//! most one running test, and a buffer for output seen before any test
//! starts. It is deliberately defensive -- real producers emit `end-test`
//! without `begin-test` on fatal-error paths, close suites out of order, and
//! repeat events -- and recovers from all of those without ever dropping a
//! test's result.
//!
//! This type is single-writer: it must only be mutated from the serial event
//! context (see [`crate::test_output`]).

use indexmap::IndexMap;
use testrelay_events::{
    TOP_LEVEL_SUITE_NAME, TestEvent, TestEventKind, TestName, TestResult, Timestamp,
};
use tracing::warn;

/// The lifecycle record of one test case.
#[derive(Clone, Debug)]
pub struct TestCaseState {
    name: TestName,
    started: bool,
    finished: bool,
    succeeded: bool,
    result: Option<TestResult>,
    duration: f64,
    output: String,
    published: bool,
}

impl TestCaseState {
    /// Creates a new, not-yet-started state for the given test.
    pub fn new(name: TestName) -> Self {
        Self {
            name,
            started: false,
            finished: false,
            succeeded: false,
            result: None,
            duration: 0.0,
            output: String::new(),
            published: false,
        }
    }

    /// Returns the test's `ClassName/methodName` identity.
    pub fn name(&self) -> &TestName {
        &self.name
    }

    /// True once a `begin-test` (explicit or implicit) has been seen.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True once the test has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True if the test is currently running.
    pub fn is_running(&self) -> bool {
        self.started && !self.finished
    }

    /// True if the test finished successfully.
    pub fn is_successful(&self) -> bool {
        self.succeeded
    }

    /// The coarse result classification, once finished.
    pub fn result(&self) -> Option<TestResult> {
        self.result
    }

    /// The test's duration in seconds (0 until finished).
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Output accumulated while the test ran.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// True once the test's completion has been recorded; a duplicate
    /// `end-test` never re-publishes.
    pub fn is_published(&self) -> bool {
        self.published
    }

    fn begin(&mut self) {
        if self.started {
            warn!(test = %self.name, "duplicate begin-test, ignoring");
            return;
        }
        self.started = true;
    }

    /// Finalizes the test. A duplicate `end-test` is dropped: the first
    /// recorded outcome wins and is never re-published.
    fn end(&mut self, succeeded: bool, result: TestResult, duration: f64, output: &str) {
        if self.finished {
            warn!(test = %self.name, "duplicate end-test, ignoring");
            return;
        }
        // Implicit begin: fatal-error paths can emit end without begin.
        self.started = true;
        self.finished = true;
        self.succeeded = succeeded;
        self.result = Some(result);
        self.duration = duration.max(0.0);
        if self.output.is_empty() && !output.is_empty() {
            self.output.push_str(output);
        }
        self.published = true;
    }

    fn append_output(&mut self, output: &str) {
        if !self.is_running() {
            warn!(test = %self.name, "output for a test that is not running, dropping");
            return;
        }
        self.output.push_str(output);
    }
}

/// The lifecycle record of one (possibly nested) test suite.
///
/// Children are kept in first-seen order, not alphabetical.
#[derive(Clone, Debug)]
pub struct TestSuiteState {
    name: String,
    started: bool,
    finished: bool,
    begin_timestamp: Option<Timestamp>,
    end_timestamp: Option<Timestamp>,
    tests: IndexMap<String, TestCaseState>,
}

impl TestSuiteState {
    /// Creates a new, not-yet-started suite.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: false,
            finished: false,
            begin_timestamp: None,
            end_timestamp: None,
            tests: IndexMap::new(),
        }
    }

    /// Creates a suite pre-seeded with a known full test list, so that a run
    /// which dies before ever referencing a test can still account for it.
    pub fn with_tests(name: impl Into<String>, tests: impl IntoIterator<Item = TestName>) -> Self {
        let mut suite = Self::new(name);
        for test in tests {
            suite.add_test(TestCaseState::new(test));
        }
        suite
    }

    /// Returns the suite name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once `begin-test-suite` has been seen.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True once the suite has been closed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Adds a child test. A test already present under the same name is kept
    /// as-is.
    pub fn add_test(&mut self, test: TestCaseState) {
        self.tests.entry(test.name().as_str().to_owned()).or_insert(test);
    }

    /// Looks up a child test by its full `ClassName/methodName`.
    pub fn test(&self, name: &str) -> Option<&TestCaseState> {
        self.tests.get(name)
    }

    fn test_mut(&mut self, name: &str) -> Option<&mut TestCaseState> {
        self.tests.get_mut(name)
    }

    fn test_entry(&mut self, name: &TestName) -> &mut TestCaseState {
        self.tests
            .entry(name.as_str().to_owned())
            .or_insert_with(|| TestCaseState::new(name.clone()))
    }

    /// Iterates over children in first-seen order.
    pub fn tests(&self) -> impl Iterator<Item = &TestCaseState> {
        self.tests.values()
    }

    /// The currently running child, if any.
    pub fn running_test(&self) -> Option<&TestCaseState> {
        self.tests.values().find(|test| test.is_running())
    }

    /// Children that never started.
    pub fn unstarted_tests(&self) -> Vec<&TestCaseState> {
        self.tests.values().filter(|t| !t.is_started()).collect()
    }

    /// Children that ran to completion.
    pub fn finished_tests(&self) -> Vec<&TestCaseState> {
        self.tests.values().filter(|t| t.is_finished()).collect()
    }

    /// Children that started but never finished.
    pub fn unfinished_tests(&self) -> Vec<&TestCaseState> {
        self.tests.values().filter(|t| t.is_running()).collect()
    }

    /// Number of finished test cases.
    pub fn test_count(&self) -> u32 {
        self.tests.values().filter(|t| t.is_finished()).count() as u32
    }

    /// Number of finished tests that failed with a plain assertion failure.
    pub fn total_failures(&self) -> u32 {
        self.tests
            .values()
            .filter(|t| {
                t.is_finished() && !t.is_successful() && t.result() != Some(TestResult::Error)
            })
            .count() as u32
    }

    /// Number of finished tests that failed with an unexpected exception.
    pub fn total_errors(&self) -> u32 {
        self.tests
            .values()
            .filter(|t| {
                t.is_finished() && !t.is_successful() && t.result() == Some(TestResult::Error)
            })
            .count() as u32
    }

    /// Summed duration of the suite's finished tests, in seconds.
    pub fn test_duration(&self) -> f64 {
        self.tests
            .values()
            .filter(|t| t.is_finished())
            .map(TestCaseState::duration)
            .sum()
    }

    /// Wall-clock duration of the suite including suite-level overhead.
    ///
    /// Falls back to [`test_duration`](Self::test_duration) when the suite
    /// was never closed cleanly.
    pub fn total_duration(&self) -> f64 {
        match (self.begin_timestamp, self.end_timestamp) {
            (Some(begin), Some(end)) => end.seconds_since(begin),
            _ => self.test_duration(),
        }
    }

    fn begin(&mut self, timestamp: Timestamp) {
        self.started = true;
        self.begin_timestamp = Some(timestamp);
    }

    fn end(&mut self, timestamp: Timestamp) {
        self.finished = true;
        self.end_timestamp = Some(timestamp);
    }
}

/// Tracks the full suite/test state of one bundle run from its event feed.
pub struct RunState {
    // stack[0] is the top-level suite and is always present; nested suites
    // are pushed above it.
    stack: Vec<TestSuiteState>,
    finished_suites: Vec<TestSuiteState>,
    running_test: Option<TestName>,
    pre_test_output: String,
    expected: Vec<TestName>,
}

impl RunState {
    /// Creates a run state with an empty top-level suite.
    pub fn new() -> Self {
        Self::with_expected_tests(Vec::new())
    }

    /// Creates a run state whose top-level suite is pre-seeded with the full
    /// list of tests expected to run.
    pub fn with_expected_tests(expected: Vec<TestName>) -> Self {
        let root = TestSuiteState::with_tests(TOP_LEVEL_SUITE_NAME, expected.iter().cloned());
        Self {
            stack: vec![root],
            finished_suites: Vec::new(),
            running_test: None,
            pre_test_output: String::new(),
            expected,
        }
    }

    /// Applies one decoded event.
    pub fn handle_event(&mut self, event: &TestEvent) {
        let timestamp = event.timestamp;
        match &event.kind {
            TestEventKind::BeginTestSuite { suite } => {
                self.begin_suite(suite, timestamp);
            }
            TestEventKind::EndTestSuite { suite, .. } => {
                self.end_suite(suite, timestamp);
            }
            TestEventKind::BeginTest { test, .. } => {
                self.begin_test(test);
            }
            TestEventKind::EndTest {
                test,
                succeeded,
                result,
                total_duration,
                output,
                ..
            } => {
                self.end_test(test, *succeeded, *result, *total_duration, output);
            }
            TestEventKind::TestOutput { output } => {
                self.append_output(output);
            }
            TestEventKind::OutputBeforeTestBundleStarts { output } => {
                self.pre_test_output.push_str(output);
            }
            // Action, bundle, status, and analyzer events carry no suite/test
            // state transitions.
            _ => {}
        }
    }

    fn begin_suite(&mut self, suite: &str, timestamp: Timestamp) {
        let root = &mut self.stack[0];
        if !root.is_started() && suite == root.name() {
            root.begin(timestamp);
            return;
        }
        let mut nested = TestSuiteState::new(suite);
        nested.begin(timestamp);
        self.stack.push(nested);
    }

    fn end_suite(&mut self, suite: &str, timestamp: Timestamp) {
        if self.stack.len() > 1 {
            let mut finished = self.stack.pop().expect("stack length checked above");
            if finished.name() != suite {
                warn!(
                    expected = finished.name(),
                    got = suite,
                    "end-test-suite does not match innermost open suite"
                );
            }
            finished.end(timestamp);
            self.finished_suites.push(finished);
            return;
        }

        let root = &mut self.stack[0];
        if root.is_started() && !root.is_finished() {
            root.end(timestamp);
        } else {
            warn!(suite, "end-test-suite without matching begin-test-suite, ignoring");
        }
    }

    fn begin_test(&mut self, test: &TestName) {
        if let Some(running) = &self.running_test {
            warn!(
                running = %running,
                beginning = %test,
                "begin-test while another test is still running"
            );
        }
        match self.find_test_index(test.as_str()) {
            Some(idx) => self.stack[idx].test_entry(test).begin(),
            None => {
                let top = self.stack.last_mut().expect("stack is never empty");
                top.test_entry(test).begin();
            }
        }
        self.running_test = Some(test.clone());
    }

    fn end_test(
        &mut self,
        test: &TestName,
        succeeded: bool,
        result: TestResult,
        duration: f64,
        output: &str,
    ) {
        let idx = match self.find_test_index(test.as_str()) {
            Some(idx) => idx,
            None => {
                // Some frameworks emit end without begin under fatal-error
                // paths; record the test as if it began at the end timestamp
                // with zero duration.
                warn!(test = %test, "end-test without begin-test, recording defensively");
                self.stack.len() - 1
            }
        };
        self.stack[idx]
            .test_entry(test)
            .end(succeeded, result, duration, output);

        match &self.running_test {
            Some(running) if running == test => self.running_test = None,
            Some(running) => {
                warn!(running = %running, ended = %test, "end-test for a test that was not running");
            }
            None => {}
        }
    }

    fn append_output(&mut self, output: &str) {
        match self.running_test.clone() {
            Some(name) => {
                if let Some(idx) = self.find_test_index(name.as_str()) {
                    self.stack[idx].test_entry(&name).append_output(output);
                }
            }
            None => self.pre_test_output.push_str(output),
        }
    }

    // Innermost-first lookup; pre-seeded tests live in the top-level suite at
    // the bottom of the stack.
    fn find_test_index(&self, name: &str) -> Option<usize> {
        self.stack.iter().rposition(|suite| suite.test(name).is_some())
    }

    /// The currently running test, if any.
    pub fn running_test(&self) -> Option<&TestCaseState> {
        let name = self.running_test.as_ref()?;
        let idx = self.find_test_index(name.as_str())?;
        self.stack[idx].test(name.as_str())
    }

    /// Number of suites that are open (started and not yet finished).
    pub fn open_suite_depth(&self) -> usize {
        self.stack
            .iter()
            .filter(|s| s.is_started() && !s.is_finished())
            .count()
    }

    /// Iterates over all suites observed so far: finished nested suites in
    /// completion order, then the still-open stack outermost-first.
    pub fn suites(&self) -> impl Iterator<Item = &TestSuiteState> {
        self.finished_suites.iter().chain(self.stack.iter())
    }

    /// Total finished tests across all suites.
    pub fn finished_test_count(&self) -> u32 {
        self.suites().map(TestSuiteState::test_count).sum()
    }

    /// Total plain failures across all suites.
    pub fn total_failures(&self) -> u32 {
        self.suites().map(TestSuiteState::total_failures).sum()
    }

    /// Total unexpected-exception failures across all suites.
    pub fn total_errors(&self) -> u32 {
        self.suites().map(TestSuiteState::total_errors).sum()
    }

    /// Output seen before any test was running.
    pub fn pre_test_output(&self) -> &str {
        &self.pre_test_output
    }

    /// True if every finished test passed and no started test was left
    /// unfinished.
    ///
    /// Tests that never started are not counted here; see
    /// [`never_run_tests`](Self::never_run_tests).
    pub fn all_tests_passed(&self) -> bool {
        self.suites().all(|suite| {
            suite
                .tests()
                .all(|test| !test.is_started() || (test.is_finished() && test.is_successful()))
        })
    }

    /// Tests from the expected full list that the observed stream never
    /// referenced at all.
    ///
    /// The stream is authoritative for what ran; the expected list is
    /// authoritative for what should have. Callers retry or report these as
    /// never-run -- no synthetic events are fabricated for them.
    pub fn never_run_tests(&self) -> Vec<TestName> {
        self.expected
            .iter()
            .filter(|name| {
                !self
                    .suites()
                    .any(|suite| suite.test(name.as_str()).is_some_and(TestCaseState::is_started))
            })
            .cloned()
            .collect()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
