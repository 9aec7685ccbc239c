// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Launching test-bundle processes.
//!
//! The runner needs only a narrow capability from the process layer: start an
//! executable with arguments and environment, expose its stdout/stderr as
//! readable streams, and report how it terminated -- including death by
//! signal, which is what distinguishes a crash from a failing exit code.

use crate::errors::CommandError;
use camino::{Utf8Path, Utf8PathBuf};
use std::{fmt, process::Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// A test-bundle invocation: executable, arguments, and environment.
#[derive(Clone, Debug)]
pub struct TestCommand {
    program: Utf8PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl TestCommand {
    /// Creates a command for the given executable.
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets one environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Returns the executable path.
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Spawns the child with piped stdout/stderr.
    ///
    /// The child is killed if its handle is dropped before it exits, so an
    /// interrupted caller doesn't leave test processes behind.
    pub fn spawn(&self) -> Result<TestChild, CommandError> {
        let mut command = Command::new(self.program.as_str());
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|error| CommandError::Spawn {
            program: self.program.clone(),
            error,
        })?;
        let stdout = child.stdout.take().expect("stdout was requested as a pipe");
        let stderr = child.stderr.take().expect("stderr was requested as a pipe");
        Ok(TestChild {
            program: self.program.clone(),
            child,
            stdout: Some(stdout),
            stderr: Some(stderr),
        })
    }
}

/// A running test-bundle process.
#[derive(Debug)]
pub struct TestChild {
    program: Utf8PathBuf,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl TestChild {
    /// Takes the child's standard output stream. Returns `None` if already
    /// taken.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Takes the child's standard error stream. Returns `None` if already
    /// taken.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Waits for the child to exit and summarizes how it terminated.
    pub async fn wait(&mut self) -> Result<ExitStatusSummary, CommandError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|error| CommandError::Wait {
                program: self.program.clone(),
                error,
            })?;
        Ok(status.into())
    }
}

/// How a test process terminated: a normal exit or death by signal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitStatusSummary {
    /// The process exited normally with a code.
    Exited {
        /// The exit code.
        code: i32,
    },

    /// The process was terminated by a signal (unix only).
    Signaled {
        /// The signal number.
        signal: i32,
    },

    /// The platform reported neither an exit code nor a signal.
    Unknown,
}

impl ExitStatusSummary {
    /// True for a normal exit with code 0.
    pub fn is_success(self) -> bool {
        matches!(self, ExitStatusSummary::Exited { code: 0 })
    }
}

impl From<std::process::ExitStatus> for ExitStatusSummary {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitStatusSummary::Exited { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatusSummary::Signaled { signal };
            }
        }
        ExitStatusSummary::Unknown
    }
}

impl fmt::Display for ExitStatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitStatusSummary::Exited { code } => write!(f, "exited with code {code}"),
            ExitStatusSummary::Signaled { signal } => write!(f, "was terminated by signal {signal}"),
            ExitStatusSummary::Unknown => f.write_str("terminated for an unknown reason"),
        }
    }
}
