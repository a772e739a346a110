// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read plan documents and package description headers.

use crate::{DeserializeError, PlanDocument, PlanEntry, TestPackageHeader};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

static TEST_PLAN_TAG: &str = "TestPlan";
static ENTRY_TAG: &str = "Entry";
static TEST_PACKAGE_TAG: &str = "TestPackage";

pub(crate) fn deserialize_plan(input: &str) -> Result<PlanDocument, DeserializeError> {
    let mut reader = Reader::from_str(input);
    let mut plan: Option<PlanDocument> = None;

    loop {
        match reader.read_event()? {
            Event::Start(tag) | Event::Empty(tag) => match &mut plan {
                None => {
                    check_root(&tag, TEST_PLAN_TAG)?;
                    let version = required_attribute(&tag, TEST_PLAN_TAG, "version")?;
                    plan = Some(PlanDocument {
                        version,
                        entries: vec![],
                    });
                }
                Some(plan) => {
                    if tag.name().as_ref() == ENTRY_TAG.as_bytes() {
                        plan.entries.push(deserialize_entry(&tag)?);
                    }
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }

    plan.ok_or(DeserializeError::MissingRoot {
        expected: TEST_PLAN_TAG,
    })
}

fn deserialize_entry(tag: &BytesStart<'_>) -> Result<PlanEntry, DeserializeError> {
    let mut name = None;
    let mut entry = PlanEntry::new(String::new());
    for attr in tag.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"name" => name = Some(value.into_owned()),
            b"include" => entry.include = PlanEntry::split_tests(&value),
            b"exclude" => entry.exclude = PlanEntry::split_tests(&value),
            _ => {}
        }
    }
    entry.name = name.ok_or(DeserializeError::MissingAttribute {
        element: ENTRY_TAG,
        attribute: "name",
    })?;
    Ok(entry)
}

pub(crate) fn deserialize_package_header(
    input: &str,
) -> Result<TestPackageHeader, DeserializeError> {
    let mut reader = Reader::from_str(input);

    loop {
        match reader.read_event()? {
            Event::Start(tag) | Event::Empty(tag) => {
                check_root(&tag, TEST_PACKAGE_TAG)?;
                let name = optional_attribute(&tag, "name")?;
                let app_package_name =
                    required_attribute(&tag, TEST_PACKAGE_TAG, "appPackageName")?;
                return Ok(TestPackageHeader {
                    name,
                    app_package_name,
                });
            }
            Event::Eof => {
                return Err(DeserializeError::MissingRoot {
                    expected: TEST_PACKAGE_TAG,
                });
            }
            _ => {}
        }
    }
}

fn check_root(tag: &BytesStart<'_>, expected: &'static str) -> Result<(), DeserializeError> {
    if tag.name().as_ref() == expected.as_bytes() {
        Ok(())
    } else {
        Err(DeserializeError::UnexpectedRoot {
            expected,
            found: String::from_utf8_lossy(tag.name().as_ref()).into_owned(),
        })
    }
}

fn optional_attribute(
    tag: &BytesStart<'_>,
    attribute: &'static str,
) -> Result<Option<String>, DeserializeError> {
    match tag.try_get_attribute(attribute)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn required_attribute(
    tag: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, DeserializeError> {
    optional_attribute(tag, attribute)?
        .ok_or(DeserializeError::MissingAttribute { element, attribute })
}
