// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generates CTS package descriptions and the test plans built from them.
//!
//! `ctsplan` first runs the description generator over every test package under the test
//! root, then reads the descriptions back and writes one plan document per configured plan.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter, StderrStyles};
