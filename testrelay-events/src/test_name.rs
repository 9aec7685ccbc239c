// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::TestNameError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A fully qualified test identifier in the form `ClassName/methodName`.
///
/// This is the identity used throughout the event stream and by the
/// bucketizing functions. The string representation is canonical: parsing and
/// re-displaying a name round-trips exactly.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestName {
    full: String,
    // Byte offset of the '/' separator within `full`.
    slash: usize,
}

impl TestName {
    /// Creates a new test name from class and method components.
    ///
    /// Returns an error if either component is empty or contains a `/`.
    pub fn new(
        class_name: impl AsRef<str>,
        method_name: impl AsRef<str>,
    ) -> Result<Self, TestNameError> {
        let class_name = class_name.as_ref();
        let method_name = method_name.as_ref();
        format!("{class_name}/{method_name}").parse()
    }

    /// Returns the class component of this test name.
    pub fn class_name(&self) -> &str {
        &self.full[..self.slash]
    }

    /// Returns the method component of this test name.
    pub fn method_name(&self) -> &str {
        &self.full[self.slash + 1..]
    }

    /// Returns the full `ClassName/methodName` form.
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl FromStr for TestName {
    type Err = TestNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut slashes = s.match_indices('/');
        let slash = match (slashes.next(), slashes.next()) {
            (Some((idx, _)), None) => idx,
            _ => return Err(TestNameError::new(s)),
        };
        if slash == 0 || slash == s.len() - 1 {
            return Err(TestNameError::new(s));
        }
        Ok(Self {
            full: s.to_owned(),
            slash,
        })
    }
}

impl TryFrom<String> for TestName {
    type Error = TestNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TestName> for String {
    fn from(name: TestName) -> Self {
        name.full
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.full)
    }
}
