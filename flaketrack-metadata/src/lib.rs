// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Wire formats for [flaketrack](https://crates.io/crates/flaketrack-runner).
//!
//! This crate defines the JSON types exchanged with the quarantine service
//! (manifest fetches and run-report uploads) as well as the documented exit
//! codes produced by the engine. It is deliberately light on dependencies so
//! that host integrations and worker processes can depend on it without
//! pulling in the full engine.

mod exit_codes;
mod manifest;
mod report;

pub use exit_codes::*;
pub use manifest::*;
pub use report::*;
