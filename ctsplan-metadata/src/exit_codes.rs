// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `ctsplan` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum CtsPlanExitCode {}

impl CtsPlanExitCode {
    /// No errors occurred and ctsplan exited normally.
    pub const OK: i32 = 0;

    /// Description generation failed and the combined status of the failed tasks does not fit
    /// in a process exit code.
    ///
    /// If the combined status is between 1 and 255, it is used as the exit code directly.
    pub const DESCRIPTION_GENERATION_FAILED: i32 = 100;

    /// The package descriptions could not be turned into a package pool.
    pub const DISCOVERY_FAILED: i32 = 104;

    /// A plan could not be constructed, for example because overrides conflict or the stable
    /// and flaky plans do not complement each other.
    pub const PLAN_CONSTRUCTION_FAILED: i32 = 105;

    /// Writing a plan document produced an error.
    pub const PLAN_WRITE_FAILED: i32 = 106;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a ctsplan invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// A plan pattern is not a valid regular expression.
    pub const INVALID_PATTERN: i32 = 94;

    /// Maps the combined status of description generation to a process exit code.
    pub fn from_generation_status(status: i64) -> i32 {
        match status {
            0 => Self::OK,
            1..=255 => status as i32,
            _ => Self::DESCRIPTION_GENERATION_FAILED,
        }
    }
}
