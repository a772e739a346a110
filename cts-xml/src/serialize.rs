// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialize plan documents and package descriptions.

use crate::{PlanDocument, PlanEntry, SerializeError, TestMethod, TestPackageDescription};
use indexmap::IndexMap;
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, Event},
};
use std::io;

static TEST_PLAN_TAG: &str = "TestPlan";
static ENTRY_TAG: &str = "Entry";
static TEST_PACKAGE_TAG: &str = "TestPackage";
static TEST_SUITE_TAG: &str = "TestSuite";
static TEST_CASE_TAG: &str = "TestCase";
static TEST_TAG: &str = "Test";

const INDENT: usize = 2;

pub(crate) fn serialize_plan(
    plan: &PlanDocument,
    mut writer: impl io::Write,
) -> Result<(), SerializeError> {
    let mut xml = Writer::new_with_indent(&mut writer, b' ', INDENT);
    serialize_decl(&mut xml)?;

    // Use the destructuring syntax to ensure that all fields are handled.
    let PlanDocument { version, entries } = plan;

    let mut plan_tag = BytesStart::new(TEST_PLAN_TAG);
    plan_tag.push_attribute(("version", version.as_str()));
    xml.write_event(Event::Start(plan_tag))?;

    for entry in entries {
        serialize_entry(entry, &mut xml)?;
    }

    serialize_end_tag(TEST_PLAN_TAG, &mut xml)?;

    // Add a trailing newline.
    writer.write_all(b"\n")?;
    Ok(())
}

fn serialize_entry(
    entry: &PlanEntry,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    let PlanEntry {
        name,
        include,
        exclude,
    } = entry;

    let mut entry_tag = BytesStart::new(ENTRY_TAG);
    entry_tag.push_attribute(("name", name.as_str()));
    if !exclude.is_empty() {
        entry_tag.push_attribute(("exclude", PlanEntry::join_tests(exclude).as_str()));
    }
    if !include.is_empty() {
        entry_tag.push_attribute(("include", PlanEntry::join_tests(include).as_str()));
    }
    writer.write_event(Event::Empty(entry_tag))?;
    Ok(())
}

pub(crate) fn serialize_package(
    package: &TestPackageDescription,
    mut writer: impl io::Write,
) -> Result<(), SerializeError> {
    let mut xml = Writer::new_with_indent(&mut writer, b' ', INDENT);
    serialize_decl(&mut xml)?;

    let TestPackageDescription {
        name,
        app_package_name,
        extra,
        tests,
    } = package;

    let mut package_tag = BytesStart::new(TEST_PACKAGE_TAG);
    package_tag.push_attribute(("name", name.as_str()));
    package_tag.push_attribute(("appPackageName", app_package_name.as_str()));
    for (k, v) in extra {
        package_tag.push_attribute((k.as_str(), v.as_str()));
    }
    xml.write_event(Event::Start(package_tag))?;

    let tree = SuiteNode::from_tests(tests);
    tree.serialize_children(&mut xml)?;

    serialize_end_tag(TEST_PACKAGE_TAG, &mut xml)?;

    writer.write_all(b"\n")?;
    Ok(())
}

/// Tests grouped by suite path, preserving the order in which suites were first seen.
#[derive(Debug, Default)]
struct SuiteNode<'a> {
    suites: IndexMap<&'a str, SuiteNode<'a>>,
    cases: IndexMap<&'a str, Vec<&'a str>>,
}

impl<'a> SuiteNode<'a> {
    fn from_tests(tests: &'a [TestMethod]) -> Self {
        let mut root = SuiteNode::default();
        for test in tests {
            let mut node = &mut root;
            for suite in &test.suite_path {
                node = node.suites.entry(suite.as_str()).or_default();
            }
            node.cases
                .entry(test.class_name.as_str())
                .or_default()
                .push(test.method_name.as_str());
        }
        root
    }

    fn serialize_children(
        &self,
        writer: &mut Writer<impl io::Write>,
    ) -> Result<(), SerializeError> {
        for (name, suite) in &self.suites {
            let mut suite_tag = BytesStart::new(TEST_SUITE_TAG);
            suite_tag.push_attribute(("name", *name));
            writer.write_event(Event::Start(suite_tag))?;
            suite.serialize_children(writer)?;
            serialize_end_tag(TEST_SUITE_TAG, writer)?;
        }

        for (class_name, methods) in &self.cases {
            let mut case_tag = BytesStart::new(TEST_CASE_TAG);
            case_tag.push_attribute(("name", *class_name));
            writer.write_event(Event::Start(case_tag))?;
            for method in methods {
                let mut test_tag = BytesStart::new(TEST_TAG);
                test_tag.push_attribute(("name", *method));
                writer.write_event(Event::Empty(test_tag))?;
            }
            serialize_end_tag(TEST_CASE_TAG, writer)?;
        }

        Ok(())
    }
}

fn serialize_decl(writer: &mut Writer<impl io::Write>) -> Result<(), SerializeError> {
    let decl = BytesDecl::new("1.0", Some("UTF-8"), None);
    writer.write_event(Event::Decl(decl))?;
    Ok(())
}

fn serialize_end_tag(
    tag_name: &'static str,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    writer.write_event(Event::End(BytesEnd::new(tag_name)))?;
    Ok(())
}
