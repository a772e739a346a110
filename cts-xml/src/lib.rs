// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generate and read CTS test plan and test package documents.

mod deserialize;
mod errors;
mod package;
mod plan;
mod serialize;

pub use errors::*;
pub use package::*;
pub use plan::*;
