// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for partitioning an ordered test list into buckets for parallel
//! execution.
//!
//! Buckets are consumed upstream of process launch: each bucket becomes the
//! set of tests one worker process is told to run. Partitioning never
//! reorders -- concatenating the buckets always reproduces the input list
//! exactly.

use crate::errors::{BucketByParseError, InvalidBucketSize};
use std::{fmt, str::FromStr};
use testrelay_events::TestName;

/// The granularity at which a test list is broken into buckets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BucketBy {
    /// Bucket by individual test case (the most granular option). Test cases
    /// within the same class may be broken into separate buckets.
    ///
    /// When parallelizing, 2 or more test cases from the same test class may
    /// be running at the same time, so it's important they don't use the same
    /// resources at the same time.
    TestCase,

    /// Bucket by class name. All consecutive test cases for a given class end
    /// up in the same bucket, and the bucket size counts classes rather than
    /// individual tests.
    TestClass,
}

impl BucketBy {
    pub(crate) fn variants() -> [&'static str; 2] {
        ["case", "class"]
    }
}

impl FromStr for BucketBy {
    type Err = BucketByParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "case" => Ok(BucketBy::TestCase),
            "class" => Ok(BucketBy::TestClass),
            other => Err(BucketByParseError::new(other)),
        }
    }
}

impl fmt::Display for BucketBy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BucketBy::TestCase => f.write_str("case"),
            BucketBy::TestClass => f.write_str("class"),
        }
    }
}

/// Partitions `tests` into buckets at the given granularity.
///
/// Dispatches to [`bucketize_by_test_case`] or [`bucketize_by_test_class`].
pub fn bucketize(
    tests: &[TestName],
    bucket_size: usize,
    by: BucketBy,
) -> Result<Vec<Vec<TestName>>, InvalidBucketSize> {
    match by {
        BucketBy::TestCase => bucketize_by_test_case(tests, bucket_size),
        BucketBy::TestClass => bucketize_by_test_class(tests, bucket_size),
    }
}

/// Breaks test cases into groups of up to `bucket_size` test cases.
///
/// Test methods in the same test class may be broken into separate buckets.
///
/// e.g. `["Cls1/test1", "Cls1/test2", "Cls2/test1"]` with `bucket_size = 2`
/// would be broken into `[["Cls1/test1", "Cls1/test2"], ["Cls2/test1"]]`.
pub fn bucketize_by_test_case(
    tests: &[TestName],
    bucket_size: usize,
) -> Result<Vec<Vec<TestName>>, InvalidBucketSize> {
    if bucket_size == 0 {
        return Err(InvalidBucketSize::new(bucket_size));
    }
    Ok(tests.chunks(bucket_size).map(<[_]>::to_vec).collect())
}

/// Breaks test cases into groups of up to `bucket_size` test *classes*.
///
/// Once a class starts a bucket, every consecutive test of that class joins
/// the bucket before the size check applies to the next class, so a
/// contiguous class is never split across buckets.
///
/// e.g. `["Cls1/test1", "Cls1/test2", "Cls1/test3", "Cls2/test2",
/// "Cls3/test1"]` with `bucket_size = 2` would be broken into
/// `[["Cls1/test1", "Cls1/test2", "Cls1/test3", "Cls2/test2"],
/// ["Cls3/test1"]]`.
pub fn bucketize_by_test_class(
    tests: &[TestName],
    bucket_size: usize,
) -> Result<Vec<Vec<TestName>>, InvalidBucketSize> {
    if bucket_size == 0 {
        return Err(InvalidBucketSize::new(bucket_size));
    }

    let mut buckets = Vec::new();
    let mut current = Vec::new();
    let mut classes_in_current = 0;
    let mut last_class: Option<&str> = None;

    for test in tests {
        if last_class != Some(test.class_name()) {
            if classes_in_current == bucket_size {
                buckets.push(std::mem::take(&mut current));
                classes_in_current = 0;
            }
            classes_in_current += 1;
        }
        current.push(test.clone());
        last_class = Some(test.class_name());
    }
    if !current.is_empty() {
        buckets.push(current);
    }

    Ok(buckets)
}
