// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Root element for the JSON summary printed by `ctsplan --message-format json`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct PlanWriteSummary {
    /// The number of packages in the pool every plan was built from.
    pub pool_size: usize,

    /// The plans that were written, in the order they were written.
    pub plans: Vec<PlanSummary>,
}

impl PlanWriteSummary {
    /// Creates a new summary.
    pub fn new(pool_size: usize, plans: Vec<PlanSummary>) -> Self {
        Self { pool_size, plans }
    }

    /// Parses JSON output.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }
}

/// One written plan.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlanSummary {
    /// The plan name.
    pub name: String,

    /// Where the plan document was written.
    pub path: Utf8PathBuf,

    /// The number of packages the plan selects at least one test from.
    pub package_count: usize,

    /// The number of packages restricted to an explicit list of tests.
    pub restricted_count: usize,

    /// The number of tests explicitly left out of otherwise selected packages.
    pub excluded_test_count: usize,
}
