// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scrapes `NAME := value` assignments out of `Android.mk` files.
//!
//! This is not a make parser. Only simple assignments are recognized; a value continues
//! onto the next line when the line ends with a backslash.

use crate::errors::MakefileError;
use camino::Utf8Path;
use regex::Regex;
use std::{collections::BTreeMap, fs, sync::LazyLock};

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^\s*([^:#=\s]+)\s*:=\s*(.*?[^\\])$").expect("assignment regex is valid")
});

/// The simple variable assignments in a makefile.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MakefileVars {
    vars: BTreeMap<String, String>,
}

impl MakefileVars {
    /// Extracts the assignments from makefile text. A later assignment to the same name wins.
    pub fn parse(contents: &str) -> Self {
        let vars = ASSIGNMENT
            .captures_iter(contents)
            .map(|captures| (captures[1].to_owned(), captures[2].to_owned()))
            .collect();
        Self { vars }
    }

    /// Returns the value assigned to `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Iterates over all assignments, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.vars
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Reads and scrapes the makefile at `path`.
pub fn makefile_vars(path: &Utf8Path) -> Result<MakefileVars, MakefileError> {
    let contents = fs::read_to_string(path).map_err(|error| MakefileError::new(path, error))?;
    Ok(MakefileVars::parse(&contents))
}
