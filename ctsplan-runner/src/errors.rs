// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by ctsplan.

use camino::Utf8PathBuf;
use config::ConfigError;
use cts_xml::{DeserializeError, SerializeError};
use std::{fmt, io};
use thiserror::Error;

pub use ctsplan_filtering::errors::PatternError;

/// The same test was both included and excluded for one package.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "tests in package `{package}` would be both included and excluded: {}",
    .tests.join(", ")
)]
pub struct ConflictingOverrideError {
    package: String,
    tests: Vec<String>,
}

impl ConflictingOverrideError {
    pub(crate) fn new(package: impl Into<String>, tests: Vec<String>) -> Self {
        Self {
            package: package.into(),
            tests,
        }
    }

    /// Returns the package the overrides were registered for.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the tests that appear in both overrides, sorted.
    pub fn tests(&self) -> &[String] {
        &self.tests
    }
}

/// A test override could not be registered.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestOverrideError {
    /// The same test was both included and excluded.
    #[error(transparent)]
    Conflicting(#[from] ConflictingOverrideError),

    /// A test name cannot be written to a plan document.
    #[error("invalid test name `{test}` in package `{package}`: {reason}")]
    InvalidTestName {
        /// The package the override was registered for.
        package: String,
        /// The offending name.
        test: String,
        /// Why the name was rejected.
        reason: &'static str,
    },
}

impl TestOverrideError {
    /// Returns the package the override was registered for.
    pub fn package(&self) -> &str {
        match self {
            TestOverrideError::Conflicting(error) => error.package(),
            TestOverrideError::InvalidTestName { package, .. } => package,
        }
    }
}

/// An error that occurred while building a named plan.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum PlanConstructError {
    /// A recipe step has an invalid pattern.
    #[error("invalid pattern in plan `{plan}`")]
    Pattern {
        /// The plan being built.
        plan: String,
        /// The underlying error.
        #[source]
        error: PatternError,
    },

    /// A recipe step registers an invalid or conflicting test override.
    #[error("invalid test overrides in plan `{plan}`")]
    TestOverride {
        /// The plan being built.
        plan: String,
        /// The underlying error.
        #[source]
        error: TestOverrideError,
    },

    /// The stable and flaky plans do not partition the pool.
    #[error("plans `{}` and `{}` are not complementary", .0.stable, .0.flaky)]
    Complement(#[from] ComplementViolation),
}

/// How a [`ComplementViolation`] breaks the partition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ViolationKind {
    /// Both plans select the same test.
    Overlap,

    /// Neither plan selects the test.
    Gap,

    /// The stable plan owns a quarantined package, or the flaky plan owns one that is not.
    Misassigned,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Overlap => write!(f, "selected by both plans"),
            ViolationKind::Gap => write!(f, "selected by neither plan"),
            ViolationKind::Misassigned => write!(f, "assigned to the wrong plan"),
        }
    }
}

/// The stable and flaky plans were found not to be exact complements of each other.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{} {kind}", match .test {
    Some(test) => format!("test `{test}` in package `{package}` is"),
    None => format!("unlisted tests in package `{package}` are"),
})]
pub struct ComplementViolation {
    /// The name of the stable plan.
    pub stable: String,

    /// The name of the flaky plan.
    pub flaky: String,

    /// The package in question.
    pub package: String,

    /// The catalog test in question, or `None` for the tests the catalog does not list.
    pub test: Option<String>,

    /// What went wrong.
    pub kind: ViolationKind,
}

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse ctsplan config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// The plan recipes in the config are inconsistent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecipeError {
    /// Two recipes share a name.
    #[error("plan `{name}` is defined more than once")]
    DuplicatePlan {
        /// The duplicated name.
        name: String,
    },

    /// A recipe inherits from a plan that does not exist.
    #[error("plan `{plan}` inherits from unknown plan `{parent}`")]
    UnknownParent {
        /// The plan with the bad reference.
        plan: String,
        /// The missing parent.
        parent: String,
    },

    /// Following `inherits` leads back to where it started.
    #[error("inheritance cycle detected: {}", .chain.join(" -> "))]
    InheritanceCycle {
        /// The plans on the cycle, starting and ending with the same plan.
        chain: Vec<String>,
    },
}

/// An error that occurred while writing a plan document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlanWriteError {
    /// The directory for the plan could not be created.
    #[error("error creating plan directory `{path}`")]
    CreateDir {
        /// The directory.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The plan could not be rendered.
    #[error("error serializing plan `{path}`")]
    Serialize {
        /// The destination.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: SerializeError,
    },

    /// The plan could not be written out.
    #[error("error writing plan to `{path}`")]
    Write {
        /// The destination.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while reading a plan document back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlanReadError {
    /// The file could not be read.
    #[error("error reading plan `{path}`")]
    Read {
        /// The file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The file is not a plan document.
    #[error("error parsing plan `{path}`")]
    Parse {
        /// The file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: DeserializeError,
    },
}

/// An error that occurred while building the package pool from description documents.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The description directory could not be listed.
    #[error("error listing test descriptions in `{dir}`")]
    ReadDir {
        /// The directory.
        dir: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The directory holds no description documents.
    #[error("no test descriptions found in `{dir}`")]
    NoDescriptions {
        /// The directory.
        dir: Utf8PathBuf,
    },

    /// A description document could not be read.
    #[error("error reading test description `{path}`")]
    Read {
        /// The file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A description document is malformed or lacks `appPackageName`.
    #[error("malformed test description `{path}`")]
    Malformed {
        /// The file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: DeserializeError,
    },

    /// Two description documents claim the same package.
    #[error("package `{package}` is described by both `{first}` and `{second}`")]
    DuplicatePackage {
        /// The package name.
        package: String,
        /// The first document seen.
        first: Utf8PathBuf,
        /// The second document seen.
        second: Utf8PathBuf,
    },
}

/// An error that occurred while reading a makefile.
#[derive(Debug, Error)]
#[error("error reading makefile `{path}`")]
pub struct MakefileError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl MakefileError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }

    /// Returns the makefile that could not be read.
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }
}

/// An error that occurred while looking for test packages under the test root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestPackageScanError {
    /// The test root could not be walked.
    #[error("error walking test root `{root}`")]
    Walk {
        /// The test root.
        root: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A path under the test root is not valid UTF-8.
    #[error("path under test root is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// A makefile could not be read.
    #[error(transparent)]
    Makefile(#[from] MakefileError),

    /// Two makefiles define the same package name.
    #[error("test package `{name}` is defined in both `{first}` and `{second}`")]
    DuplicatePackage {
        /// The package name.
        name: String,
        /// The first makefile seen.
        first: Utf8PathBuf,
        /// The second makefile seen.
        second: Utf8PathBuf,
    },
}

/// An error that occurred while generating one package description.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DescriptionGenerateError {
    /// The output directory could not be created.
    #[error("error creating directory `{path}`")]
    CreateDir {
        /// The directory.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The description could not be rendered.
    #[error("error serializing description for `{package}`")]
    Serialize {
        /// The package.
        package: String,
        /// The underlying error.
        #[source]
        error: SerializeError,
    },

    /// The description could not be written out.
    #[error("error writing description to `{path}`")]
    Write {
        /// The destination.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The sources of a package could not be listed.
    #[error("error listing sources of `{package}` in `{dir}`")]
    ScanSources {
        /// The package.
        package: String,
        /// The source directory.
        dir: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// The doclet could not be started.
    #[error("error executing `{command}` for `{package}`")]
    DocletExec {
        /// The package.
        package: String,
        /// The command line.
        command: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The doclet exited unsuccessfully.
    #[error("`{command}` failed for `{package}` ({})", match .exit_code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    })]
    DocletFailed {
        /// The package.
        package: String,
        /// The command line.
        command: String,
        /// The exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The doclet exited successfully but did not produce a description.
    #[error("doclet did not write a description for `{package}` to `{path}`")]
    OutputMissing {
        /// The package.
        package: String,
        /// The expected output.
        path: Utf8PathBuf,
    },
}

impl DescriptionGenerateError {
    /// Returns the status this failure contributes to the combined result.
    ///
    /// A doclet that exited with a non-zero code contributes that code; anything else
    /// contributes 1.
    pub fn status_code(&self) -> i64 {
        match self {
            Self::DocletFailed {
                exit_code: Some(code),
                ..
            } if *code > 0 => i64::from(*code),
            _ => 1,
        }
    }
}

/// An error that occurred while building a [`DescriptionGenerator`](crate::generator::DescriptionGenerator).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GeneratorBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),
}

/// An error that occurred while creating the repository layout.
#[derive(Debug, Error)]
#[error("error creating repository directory `{dir}`")]
pub struct RepositoryCreateError {
    dir: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl RepositoryCreateError {
    pub(crate) fn new(dir: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            dir: dir.into(),
            error,
        }
    }

    /// Returns the directory that could not be created.
    pub fn dir(&self) -> &Utf8PathBuf {
        &self.dir
    }
}
