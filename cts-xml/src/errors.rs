// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io;
use thiserror::Error;

/// An error that occurs while serializing a [`PlanDocument`](crate::PlanDocument) or a
/// [`TestPackageDescription`](crate::TestPackageDescription).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SerializeError {
    /// The XML writer failed.
    #[error("error serializing XML")]
    Xml(#[from] quick_xml::Error),

    /// The underlying writer failed.
    #[error("error writing XML")]
    Io(#[from] io::Error),
}

/// An error that occurs while reading a document back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeserializeError {
    /// The input is not well-formed XML.
    #[error("malformed XML")]
    Xml(#[from] quick_xml::Error),

    /// An attribute could not be parsed.
    #[error("malformed attribute")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// The document does not start with the expected root element.
    #[error("expected root element `{expected}`, found `{found}`")]
    UnexpectedRoot {
        /// The element that was expected.
        expected: &'static str,
        /// The element that was found.
        found: String,
    },

    /// The document has no root element at all.
    #[error("no `{expected}` element found")]
    MissingRoot {
        /// The element that was expected.
        expected: &'static str,
    },

    /// A required attribute is absent.
    #[error("element `{element}` is missing required attribute `{attribute}`")]
    MissingAttribute {
        /// The element being read.
        element: &'static str,
        /// The attribute that was not found.
        attribute: &'static str,
    },
}
