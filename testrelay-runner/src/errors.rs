// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testrelay.

use crate::partition::BucketBy;
use camino::Utf8PathBuf;
use thiserror::Error;

/// An error that occurs when a bucketizing function is given an invalid
/// bucket size.
///
/// Bucket sizes must be positive. This is rejected before any test process is
/// launched.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("bucket size must be positive, got {size}")]
pub struct InvalidBucketSize {
    size: usize,
}

impl InvalidBucketSize {
    pub(crate) fn new(size: usize) -> Self {
        Self { size }
    }

    /// Returns the rejected size.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// An error that occurs while parsing a [`BucketBy`] value from a string.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error(
    "unrecognized value for bucket-by: {input}\n(known values: {})",
    BucketBy::variants().join(", "),
)]
pub struct BucketByParseError {
    input: String,
}

impl BucketByParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while launching or waiting on a test-bundle process.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process failed to spawn.
    #[error("failed to spawn test process `{program}`")]
    Spawn {
        /// The executable that failed to spawn.
        program: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Waiting for the process to exit failed.
    #[error("failed to wait for test process `{program}`")]
    Wait {
        /// The executable being waited on.
        program: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurs while snapshotting or reading crash reports.
#[derive(Debug, Error)]
pub enum CrashReportError {
    /// Listing the crash-report directory failed.
    #[error("failed to scan crash report directory `{dir}`")]
    Scan {
        /// The directory being scanned.
        dir: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Reading an individual crash report failed.
    #[error("failed to read crash report `{path}`")]
    Read {
        /// The report being read.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurs while orchestrating a bundle run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Launching or waiting on the bundle process failed.
    #[error(transparent)]
    Command(#[from] CommandError),
}
