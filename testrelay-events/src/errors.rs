// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while parsing a [`TestName`](crate::TestName) from a
/// string.
///
/// Test names are written as `ClassName/methodName`, with exactly one `/`
/// separating two non-empty components.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestNameError {
    input: String,
}

impl TestNameError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for TestNameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "test name '{}' is not in the form ClassName/methodName",
            self.input
        )
    }
}

impl error::Error for TestNameError {}

/// An error that occurs while parsing a [`TestResult`](crate::TestResult)
/// from a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestResultParseError {
    input: String,
}

impl TestResultParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for TestResultParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unrecognized test result '{}' (known values: success, failure, error)",
            self.input
        )
    }
}

impl error::Error for TestResultParseError {}
