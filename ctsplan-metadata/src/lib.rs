// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Documented exit codes and machine-readable output for `ctsplan`.

mod exit_codes;
mod summary;

pub use exit_codes::*;
pub use summary::*;
