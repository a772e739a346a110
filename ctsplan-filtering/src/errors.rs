// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while building filter rules.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// An invalid regular expression was passed to `include` or `exclude`.
///
/// Rendered through miette, the label points at the part of the pattern the regex parser
/// rejected.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("invalid pattern `{pattern}`")]
#[non_exhaustive]
pub struct PatternError {
    /// The pattern as supplied by the caller.
    #[source_code]
    pub pattern: String,

    /// What the regex parser complained about.
    pub message: String,

    /// The part of `pattern` the message refers to.
    #[label("{}", message)]
    pub span: SourceSpan,
}

impl PatternError {
    pub(crate) fn new(pattern: &str, fallback: regex::Error) -> Self {
        // Use regex-syntax to parse the input so that we get a message and a span.
        let (message, span) = match regex_syntax::Parser::new().parse(pattern) {
            Ok(_) => (fallback.to_string(), (0, pattern.len()).into()),
            Err(err) => {
                let (message, span) = match &err {
                    regex_syntax::Error::Parse(err) => (format!("{}", err.kind()), *err.span()),
                    regex_syntax::Error::Translate(err) => {
                        (format!("{}", err.kind()), *err.span())
                    }
                    _ => {
                        return Self {
                            pattern: pattern.to_owned(),
                            message: err.to_string(),
                            span: (0, pattern.len()).into(),
                        };
                    }
                };
                let start = span.start.offset;
                let end = span.end.offset.max(start);
                (message, (start, end - start).into())
            }
        };

        Self {
            pattern: pattern.to_owned(),
            message,
            span,
        }
    }
}
