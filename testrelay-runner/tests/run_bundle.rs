// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests driving [`BundleRunner`] against real child processes.

#![cfg(unix)]

use testrelay_events::{TestEventKind, TestName, TestResult};
use testrelay_runner::{
    crash_reports::DiskCrashReportLocator,
    reporter::{CollectingSink, EventSink},
    runner::BundleRunner,
    test_command::{ExitStatusSummary, TestCommand},
};

fn shell(script: &str) -> TestCommand {
    TestCommand::new("/bin/sh").arg("-c").arg(script)
}

fn name(s: &str) -> TestName {
    s.parse().expect("valid test name")
}

async fn run_and_collect(
    runner: BundleRunner,
) -> (testrelay_runner::runner::RunSummary, Vec<testrelay_events::TestEvent>) {
    let mut collector = CollectingSink::new();
    let summary = {
        let mut sinks: Vec<&mut dyn EventSink> = vec![&mut collector];
        runner.run(&mut sinks).await.expect("run completes")
    };
    (summary, collector.into_events())
}

#[tokio::test]
async fn clean_run_reconstructs_results() {
    let script = r#"
echo 'dyld: some startup noise'
printf '%s\n' \
  '{"event":"begin-test-suite","timestamp":1.0,"suite":"Toplevel Test Suite"}' \
  '{"event":"begin-test","timestamp":2.0,"test":"MyTests/testOne","className":"MyTests","methodName":"testOne"}' \
  '{"event":"test-output","timestamp":2.1,"output":"hello from the test\n"}' \
  '{"event":"end-test","timestamp":2.5,"test":"MyTests/testOne","className":"MyTests","methodName":"testOne","succeeded":true,"result":"success","totalDuration":0.5,"output":"","exceptions":[]}' \
  '{"event":"end-test-suite","timestamp":3.0,"suite":"Toplevel Test Suite","testCaseCount":1,"totalFailureCount":0,"unexpectedExceptionCount":0,"testDuration":0.5,"totalDuration":2.0}'
"#;
    let (summary, events) =
        run_and_collect(BundleRunner::new("MyTests.bundle", shell(script))).await;

    assert!(summary.succeeded);
    assert_eq!(summary.exit_status, ExitStatusSummary::Exited { code: 0 });
    assert_eq!(summary.finished_tests, 1);
    assert_eq!(summary.total_failures, 0);
    assert_eq!(summary.never_run, vec![]);

    assert!(matches!(
        events.first().map(|e| &e.kind),
        Some(TestEventKind::BeginTestBundle { .. })
    ));
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(TestEventKind::EndTestBundle {
            succeeded: true,
            message: None,
            ..
        })
    ));

    // The startup noise was re-published as pre-bundle output.
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        TestEventKind::OutputBeforeTestBundleStarts { output }
            if output.contains("startup noise")
    )));
}

#[tokio::test]
async fn crashed_run_is_closed_out_exactly_once() {
    let script = r#"
printf '%s\n' \
  '{"event":"begin-test-suite","timestamp":1.0,"suite":"Toplevel Test Suite"}' \
  '{"event":"begin-test","timestamp":2.0,"test":"MyTests/testBoom","className":"MyTests","methodName":"testBoom"}' \
  '{"event":"test-output","timestamp":2.1,"output":"about to crash\n"}'
kill -9 $$
"#;
    let (summary, events) =
        run_and_collect(BundleRunner::new("MyTests.bundle", shell(script))).await;

    assert!(!summary.succeeded);
    assert_eq!(summary.exit_status, ExitStatusSummary::Signaled { signal: 9 });
    assert_eq!(summary.finished_tests, 1);
    assert_eq!(summary.total_errors, 1);

    let end_tests: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.kind {
            TestEventKind::EndTest {
                test,
                succeeded,
                result,
                exceptions,
                ..
            } => Some((test.clone(), *succeeded, *result, exceptions.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(end_tests.len(), 1, "exactly one end-test is synthesized");
    let (test, succeeded, result, exceptions) = &end_tests[0];
    assert_eq!(test, &name("MyTests/testBoom"));
    assert!(!succeeded);
    assert_eq!(*result, TestResult::Error);
    assert!(
        exceptions[0].reason.contains("was terminated by signal 9"),
        "reason names the process exit: {}",
        exceptions[0].reason
    );

    let end_suites = events
        .iter()
        .filter(|e| matches!(&e.kind, TestEventKind::EndTestSuite { .. }))
        .count();
    assert_eq!(end_suites, 1, "exactly one end-test-suite is synthesized");
}

#[tokio::test]
async fn expected_tests_never_referenced_are_reported_never_run() {
    let script = r#"
printf '%s\n' \
  '{"event":"begin-test-suite","timestamp":1.0,"suite":"Toplevel Test Suite"}' \
  '{"event":"end-test-suite","timestamp":2.0,"suite":"Toplevel Test Suite","testCaseCount":0,"totalFailureCount":0,"unexpectedExceptionCount":0,"testDuration":0.0,"totalDuration":1.0}'
"#;
    let runner = BundleRunner::new("MyTests.bundle", shell(script))
        .with_expected_tests(vec![name("MyTests/testGhost")]);
    let (summary, events) = run_and_collect(runner).await;

    assert!(!summary.succeeded, "an unrun expected test fails the bundle");
    assert_eq!(summary.exit_status, ExitStatusSummary::Exited { code: 0 });
    assert_eq!(summary.never_run, vec![name("MyTests/testGhost")]);

    // No synthetic events are fabricated for tests that never even started.
    assert!(!events.iter().any(|e| matches!(
        &e.kind,
        TestEventKind::EndTest { test, .. } if test == &name("MyTests/testGhost")
    )));
}

#[tokio::test]
async fn startup_failure_surfaces_captured_output() {
    let script = "echo 'bundle could not load'; exit 64";
    let (summary, events) =
        run_and_collect(BundleRunner::new("MyTests.bundle", shell(script))).await;

    assert!(!summary.succeeded);
    assert_eq!(summary.exit_status, ExitStatusSummary::Exited { code: 64 });
    assert_eq!(summary.finished_tests, 0);

    match &events.last().expect("end-test-bundle is always emitted").kind {
        TestEventKind::EndTestBundle {
            succeeded, message, ..
        } => {
            assert!(!succeeded);
            let message = message.as_deref().expect("startup error carries a message");
            assert!(message.contains("bundle could not load"));
        }
        other => panic!("expected end-test-bundle, got {other:?}"),
    }
}

#[tokio::test]
async fn new_crash_reports_are_attached_to_the_synthetic_failure() {
    let dir = camino_tempfile::tempdir().expect("tempdir created");
    std::fs::write(dir.path().join("MyApp_stale.crash"), "old crash").expect("write succeeds");

    let script = r#"
printf '%s\n' \
  '{"event":"begin-test-suite","timestamp":1.0,"suite":"Toplevel Test Suite"}' \
  '{"event":"begin-test","timestamp":2.0,"test":"MyTests/testBoom","className":"MyTests","methodName":"testBoom"}'
echo 'Exception Type: EXC_BAD_ACCESS' > "$CRASH_DIR/MyApp_fresh.crash"
kill -9 $$
"#;
    let runner = BundleRunner::new(
        "MyTests.bundle",
        shell(script).env("CRASH_DIR", dir.path().as_str()),
    )
    .with_crash_report_locator(Box::new(DiskCrashReportLocator::new(dir.path(), "MyApp")));
    let (_, events) = run_and_collect(runner).await;

    let reason = events
        .iter()
        .find_map(|e| match &e.kind {
            TestEventKind::EndTest { exceptions, .. } => {
                Some(exceptions.first().expect("synthetic exception").reason.clone())
            }
            _ => None,
        })
        .expect("synthetic end-test emitted");
    assert!(reason.contains("MyApp_fresh.crash"));
    assert!(reason.contains("Exception Type: EXC_BAD_ACCESS"));
    assert!(!reason.contains("old crash"), "stale reports are not attached");
}
