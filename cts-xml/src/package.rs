// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    DeserializeError, SerializeError, deserialize::deserialize_package_header,
    serialize::serialize_package,
};
use indexmap::IndexMap;
use std::io;

/// The root element of a test package description.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestPackageDescription {
    /// The name of the package, usually the name of the APK or JAR it is built into.
    pub name: String,

    /// The Java package of the application under test. Plans refer to packages by this name.
    pub app_package_name: String,

    /// Other attributes, such as `runner` or `signatureCheck`, in insertion order.
    pub extra: IndexMap<String, String>,

    /// The tests in this package, in insertion order.
    pub tests: Vec<TestMethod>,
}

impl TestPackageDescription {
    /// Creates a description with no tests.
    pub fn new(name: impl Into<String>, app_package_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_package_name: app_package_name.into(),
            extra: IndexMap::new(),
            tests: vec![],
        }
    }

    /// Adds an attribute to the root element.
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Adds a test given its fully qualified name, e.g. `android.tests.sigtest.SignatureTest.testSignature`.
    ///
    /// Names without at least a class and a method component are ignored.
    pub fn add_test(&mut self, qualified_name: &str) -> &mut Self {
        if let Some(test) = TestMethod::parse(qualified_name) {
            self.tests.push(test);
        }
        self
    }

    /// Serialize this description to the given writer.
    pub fn serialize(&self, writer: impl io::Write) -> Result<(), SerializeError> {
        serialize_package(self, writer)
    }

    /// Serialize this description to a byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        let mut buf: Vec<u8> = vec![];
        self.serialize(&mut buf)?;
        Ok(buf)
    }
}

/// The attributes of a `TestPackage` root element, read without descending into its tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestPackageHeader {
    /// The `name` attribute, if present.
    pub name: Option<String>,

    /// The `appPackageName` attribute.
    pub app_package_name: String,
}

impl TestPackageHeader {
    /// Reads the root element of a test package description.
    pub fn parse(input: &str) -> Result<Self, DeserializeError> {
        deserialize_package_header(input)
    }
}

/// A single test method, located by its suite path and class.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TestMethod {
    /// The package components leading to the class, e.g. `["android", "tests", "sigtest"]`.
    pub suite_path: Vec<String>,

    /// The simple class name.
    pub class_name: String,

    /// The method name.
    pub method_name: String,
}

impl TestMethod {
    /// Splits a fully qualified test name into suites, class and method.
    pub fn parse(qualified_name: &str) -> Option<Self> {
        let mut components: Vec<&str> = qualified_name.split('.').collect();
        if components.len() < 2 || components.iter().any(|c| c.is_empty()) {
            return None;
        }
        let method_name = components.pop()?.to_owned();
        let class_name = components.pop()?.to_owned();
        Some(Self {
            suite_path: components.into_iter().map(str::to_owned).collect(),
            class_name,
            method_name,
        })
    }
}
