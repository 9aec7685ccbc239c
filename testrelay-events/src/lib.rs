// Copyright (c) The testrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Event types for the testrelay machine-readable output stream.
//!
//! A test-bundle process reports its progress as newline-delimited JSON: one
//! self-describing object per line, each carrying an `event` discriminator and
//! a numeric `timestamp`. This crate defines those objects once, for both
//! sides of the pipe -- the runner that decodes them and external reporter
//! executables that consume the re-broadcast stream incrementally.
//!
//! The serialized form is the compatibility contract. Field names are
//! camelCase on the wire, event discriminators are kebab-case, and timestamps
//! are fractional seconds since the Unix epoch.

mod errors;
mod events;
mod test_name;

pub use errors::*;
pub use events::*;
pub use test_name::*;
