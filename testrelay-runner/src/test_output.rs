// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utilities for reading line output from several child-process streams at
//! once.
//!
//! The multiplexer reads every source concurrently and feeds complete lines,
//! tagged with the source they came from, to a single callback -- while a
//! caller-supplied unit of work (typically waiting on the child process to
//! exit) runs concurrently.

use bstr::ByteSlice;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use std::{fmt, future::Future, pin::pin};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

/// The size of each buffered reader's buffer.
///
/// This size is not totally arbitrary, but rather the (normal) page size on
/// most linux, windows, and macos systems.
const CHUNK_SIZE: usize = 4 * 1024;

/// Identifies which stream a line was read from.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum OutputSource {
    /// The child process's standard output.
    Stdout,

    /// The child process's standard error.
    Stderr,

    /// Some other descriptor, identified by a caller-chosen tag.
    Fd(u32),
}

impl fmt::Display for OutputSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputSource::Stdout => f.write_str("stdout"),
            OutputSource::Stderr => f.write_str("stderr"),
            OutputSource::Fd(fd) => write!(f, "fd {fd}"),
        }
    }
}

/// One readable stream to be multiplexed, tagged with its source.
pub struct LineSource {
    source: OutputSource,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl LineSource {
    /// Creates a new tagged source from any async reader.
    pub fn new(source: OutputSource, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            source,
            reader: Box::new(reader),
        }
    }

    /// Tags a child process's standard output stream.
    pub fn stdout(reader: tokio::process::ChildStdout) -> Self {
        Self::new(OutputSource::Stdout, reader)
    }

    /// Tags a child process's standard error stream.
    pub fn stderr(reader: tokio::process::ChildStderr) -> Self {
        Self::new(OutputSource::Stderr, reader)
    }

    /// Turns this source into a stream of complete, decoded lines.
    fn into_stream(self) -> BoxStream<'static, (OutputSource, String)> {
        let Self { source, reader } = self;
        let reader = BufReader::with_capacity(CHUNK_SIZE, reader);
        stream::unfold(
            (reader, Vec::with_capacity(256)),
            move |(mut reader, mut buf)| async move {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    // A read of zero bytes is EOF: a stream whose data ends
                    // with a newline produces no trailing empty line.
                    Ok(0) => None,
                    Ok(_) => {
                        let line = decode_line(&buf);
                        Some(((source, line), (reader, buf)))
                    }
                    Err(error) => {
                        warn!(%source, %error, "read error on output stream, treating as EOF");
                        None
                    }
                }
            },
        )
        .boxed()
    }
}

/// Strips the line terminator and decodes opportunistically.
///
/// Child processes can emit arbitrary bytes, including multibyte glyphs
/// broken across write boundaries; undecodable sequences become U+FFFD
/// replacement characters rather than errors.
fn decode_line(buf: &[u8]) -> String {
    let mut line = buf;
    if line.last() == Some(&b'\n') {
        line = &line[..line.len() - 1];
    }
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    line.to_str_lossy().into_owned()
}

/// Reads all `sources` concurrently, feeding each complete line to `on_line`
/// as soon as it is available, while `work` runs concurrently.
///
/// Lines from any one source are delivered in exactly the order they were
/// written; interleaving across sources is arrival order. `on_line` is always
/// invoked from this function's own task, one line at a time, so downstream
/// consumers see a serial, deterministic callback sequence.
///
/// Returns `work`'s output as soon as `work` completes; with
/// `wait_until_eof`, waits until `work` has completed *and* every source has
/// reached end-of-stream. A final partial line without a terminating newline
/// is still delivered; a read error on a source is logged and treated as EOF
/// for that source only.
///
/// There is no cancellation handle: callers needing early termination close
/// the underlying descriptors or kill the child process, which unblocks the
/// readers.
pub async fn read_lines_and_feed<F, W>(
    sources: Vec<LineSource>,
    mut on_line: F,
    work: W,
    wait_until_eof: bool,
) -> W::Output
where
    F: FnMut(OutputSource, &str),
    W: Future,
{
    let streams: Vec<_> = sources.into_iter().map(LineSource::into_stream).collect();
    let mut lines = stream::select_all(streams);
    let mut work = pin!(work);

    if wait_until_eof {
        let mut work_output = None;
        loop {
            tokio::select! {
                output = &mut work, if work_output.is_none() => {
                    work_output = Some(output);
                }
                maybe_line = lines.next() => match maybe_line {
                    Some((source, line)) => on_line(source, &line),
                    None => break,
                },
            }
        }
        match work_output {
            Some(output) => output,
            None => work.await,
        }
    } else {
        loop {
            tokio::select! {
                output = &mut work => return output,
                maybe_line = lines.next() => match maybe_line {
                    Some((source, line)) => on_line(source, &line),
                    None => break,
                },
            }
        }
        // Every source hit EOF first; nothing is left to read, so just wait
        // out the unit of work.
        work.await
    }
}
