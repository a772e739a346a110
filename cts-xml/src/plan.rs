// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    DeserializeError, SerializeError, deserialize::deserialize_plan, serialize::serialize_plan,
};
use std::io;

/// The root element of a test plan document.
///
/// A plan lists the packages it selects. Each entry may narrow its package down to a list of
/// tests (`include`) or carve tests out of it (`exclude`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlanDocument {
    /// The format version, serialized as the `version` attribute.
    pub version: String,

    /// The selected packages, in document order.
    pub entries: Vec<PlanEntry>,
}

impl PlanDocument {
    /// The version written by this crate.
    pub const VERSION: &'static str = "1.0";

    /// Creates an empty document at the current version.
    pub fn new() -> Self {
        Self {
            version: Self::VERSION.to_owned(),
            entries: vec![],
        }
    }

    /// Adds an entry.
    pub fn add_entry(&mut self, entry: PlanEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Adds several entries.
    pub fn add_entries(&mut self, entries: impl IntoIterator<Item = PlanEntry>) -> &mut Self {
        for entry in entries {
            self.add_entry(entry);
        }
        self
    }

    /// Serialize this document to the given writer.
    pub fn serialize(&self, writer: impl io::Write) -> Result<(), SerializeError> {
        serialize_plan(self, writer)
    }

    /// Serialize this document to a byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        let mut buf: Vec<u8> = vec![];
        self.serialize(&mut buf)?;
        Ok(buf)
    }

    /// Serialize this document to a string.
    pub fn to_string(&self) -> Result<String, SerializeError> {
        let buf = self.to_bytes()?;
        String::from_utf8(buf).map_err(|err| {
            SerializeError::Io(io::Error::new(io::ErrorKind::InvalidData, err))
        })
    }

    /// Reads a document from XML text.
    pub fn parse(input: &str) -> Result<Self, DeserializeError> {
        deserialize_plan(input)
    }
}

impl Default for PlanDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// One selected package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlanEntry {
    /// The package name.
    pub name: String,

    /// If non-empty, only these tests of the package are selected.
    pub include: Vec<String>,

    /// Tests of the package that are not selected.
    pub exclude: Vec<String>,
}

impl PlanEntry {
    /// The separator between test names in the `include` and `exclude` attributes.
    pub const TEST_SEPARATOR: char = ';';

    /// Creates an entry that selects every test in `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            include: vec![],
            exclude: vec![],
        }
    }

    /// Sets the tests this entry is restricted to.
    pub fn set_include(&mut self, tests: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.include = tests.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tests this entry leaves out.
    pub fn set_exclude(&mut self, tests: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.exclude = tests.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn join_tests(tests: &[String]) -> String {
        let mut out = String::new();
        for (i, test) in tests.iter().enumerate() {
            if i > 0 {
                out.push(Self::TEST_SEPARATOR);
            }
            out.push_str(test);
        }
        out
    }

    pub(crate) fn split_tests(value: &str) -> Vec<String> {
        value
            .split(Self::TEST_SEPARATOR)
            .filter(|test| !test.is_empty())
            .map(str::to_owned)
            .collect()
    }
}
