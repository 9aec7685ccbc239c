// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovering crash-report artifacts written while a test bundle ran.
//!
//! The crash filter only wants reports that are *new*: a baseline snapshot is
//! taken before the run starts, and anything that appears (or is rewritten)
//! between then and the post-run check is attached to the synthetic failure
//! for diagnostic value. Detection is a timestamp/identity diff -- nothing
//! here parses report contents.

use crate::errors::CrashReportError;
use camino::Utf8PathBuf;
use std::{collections::BTreeMap, fs, time::SystemTime};
use tracing::warn;

/// One crash-report artifact, with its contents read verbatim.
#[derive(Clone, Debug)]
pub struct CrashReport {
    /// Where the report was found.
    pub path: Utf8PathBuf,

    /// The report text, decoded lossily.
    pub contents: String,
}

/// A point-in-time record of which crash reports existed, keyed by path and
/// modification time.
#[derive(Clone, Debug, Default)]
pub struct CrashReportSnapshot {
    seen: BTreeMap<Utf8PathBuf, SystemTime>,
}

impl CrashReportSnapshot {
    fn is_new(&self, path: &Utf8PathBuf, modified: SystemTime) -> bool {
        match self.seen.get(path) {
            None => true,
            Some(baseline) => modified > *baseline,
        }
    }
}

/// A collaborator that can list crash-report artifacts for a product.
///
/// The core treats this as an opaque capability: the runner takes a baseline
/// before launch and asks for the diff after an abnormal exit.
pub trait CrashReportLocator {
    /// Records which reports exist right now.
    fn snapshot(&self) -> Result<CrashReportSnapshot, CrashReportError>;

    /// Returns reports that appeared or changed since `baseline`, contents
    /// included.
    fn new_reports_since(
        &self,
        baseline: &CrashReportSnapshot,
    ) -> Result<Vec<CrashReport>, CrashReportError>;
}

/// Scans a directory for crash reports whose file names start with the
/// product name (the convention used by host diagnostic-report directories).
pub struct DiskCrashReportLocator {
    dir: Utf8PathBuf,
    product_name: String,
}

impl DiskCrashReportLocator {
    /// Creates a locator over `dir` for reports belonging to `product_name`.
    pub fn new(dir: impl Into<Utf8PathBuf>, product_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            product_name: product_name.into(),
        }
    }

    fn scan(&self) -> Result<BTreeMap<Utf8PathBuf, SystemTime>, CrashReportError> {
        let mut seen = BTreeMap::new();
        let entries = fs::read_dir(&self.dir).map_err(|error| CrashReportError::Scan {
            dir: self.dir.clone(),
            error,
        })?;
        for entry in entries {
            let entry = entry.map_err(|error| CrashReportError::Scan {
                dir: self.dir.clone(),
                error,
            })?;
            let path = match Utf8PathBuf::from_path_buf(entry.path()) {
                Ok(path) => path,
                Err(path) => {
                    warn!(path = %path.display(), "skipping non-UTF-8 crash report path");
                    continue;
                }
            };
            let file_name = match path.file_name() {
                Some(name) => name,
                None => continue,
            };
            if !file_name.starts_with(&self.product_name) {
                continue;
            }
            let metadata = entry.metadata().map_err(|error| CrashReportError::Scan {
                dir: self.dir.clone(),
                error,
            })?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            seen.insert(path, modified);
        }
        Ok(seen)
    }
}

impl CrashReportLocator for DiskCrashReportLocator {
    fn snapshot(&self) -> Result<CrashReportSnapshot, CrashReportError> {
        Ok(CrashReportSnapshot { seen: self.scan()? })
    }

    fn new_reports_since(
        &self,
        baseline: &CrashReportSnapshot,
    ) -> Result<Vec<CrashReport>, CrashReportError> {
        let mut reports = Vec::new();
        for (path, modified) in self.scan()? {
            if !baseline.is_new(&path, modified) {
                continue;
            }
            let bytes = fs::read(&path).map_err(|error| CrashReportError::Read {
                path: path.clone(),
                error,
            })?;
            reports.push(CrashReport {
                path,
                contents: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(reports)
    }
}
