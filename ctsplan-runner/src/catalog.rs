// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

/// Tests known to fail non-deterministically, keyed by package.
///
/// The catalog is a plain value: it is loaded from configuration and handed to the plan
/// policy, which never modifies it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlakyTestCatalog {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl FlakyTestCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds flaky tests for `package`, merging with any tests already listed.
    ///
    /// A package is only listed once it has at least one test: adding an empty list for an
    /// unlisted package leaves the catalog unchanged.
    pub fn add<I, S>(&mut self, package: impl Into<String>, tests: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tests = tests.into_iter().map(Into::into).peekable();
        if tests.peek().is_some() {
            self.entries.entry(package.into()).or_default().extend(tests);
        }
        self
    }

    /// Returns the number of packages with at least one entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog lists nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the total number of flaky tests.
    pub fn test_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    /// Returns the flaky tests of `package`.
    pub fn tests(&self, package: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(package)
    }

    /// Iterates over packages and their flaky tests, in package order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> + '_ {
        self.entries
            .iter()
            .map(|(package, tests)| (package.as_str(), tests))
    }

    /// Iterates over every `(package, test)` pair.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.iter()
            .flat_map(|(package, tests)| tests.iter().map(move |test| (package, test.as_str())))
    }
}

impl<P, I, S> FromIterator<(P, I)> for FlakyTestCatalog
where
    P: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (P, I)>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for (package, tests) in iter {
            catalog.add(package, tests);
        }
        catalog
    }
}
