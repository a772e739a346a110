// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use ctsplan_metadata::CtsPlanExitCode;
use ctsplan_runner::{
    errors::*,
    generator::{GenerationResult, TaskStatus},
};
use itertools::Itertools;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

// The #[error()] strings are placeholders: errors are meant to be printed with
// display_to_stderr, which adds color and the chain of causes.

/// An expected failure: bad input, a failed doclet, or an inconsistent plan.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("recipe error")]
    RecipeError {
        #[from]
        err: RecipeError,
    },
    #[error("repository create error")]
    RepositoryCreateError {
        #[from]
        err: RepositoryCreateError,
    },
    #[error("test package scan error")]
    TestPackageScanError {
        #[from]
        err: TestPackageScanError,
    },
    #[error("generator build error")]
    GeneratorBuildError {
        #[from]
        err: GeneratorBuildError,
    },
    #[error("description generation failed")]
    DescriptionGenerationFailed { result: GenerationResult },
    #[error("discovery error")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("plan construct error")]
    PlanConstructError {
        #[from]
        err: PlanConstructError,
    },
    #[error("plan write error")]
    PlanWriteError {
        #[from]
        err: PlanWriteError,
    },
    #[error("error writing output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn write_output(err: impl Into<std::io::Error>) -> Self {
        Self::WriteOutput { err: err.into() }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. }
            | Self::RecipeError { .. }
            | Self::RepositoryCreateError { .. }
            | Self::TestPackageScanError { .. }
            | Self::GeneratorBuildError { .. } => CtsPlanExitCode::SETUP_ERROR,
            Self::DescriptionGenerationFailed { result } => {
                CtsPlanExitCode::from_generation_status(result.status())
            }
            Self::DiscoveryError { .. } => CtsPlanExitCode::DISCOVERY_FAILED,
            Self::PlanConstructError {
                err: PlanConstructError::Pattern { .. },
            } => CtsPlanExitCode::INVALID_PATTERN,
            Self::PlanConstructError { .. } => CtsPlanExitCode::PLAN_CONSTRUCTION_FAILED,
            Self::PlanWriteError { .. } => CtsPlanExitCode::PLAN_WRITE_FAILED,
            Self::WriteOutput { .. } => CtsPlanExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let next_error = match self {
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse ctsplan config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::RecipeError { err } => {
                error!("invalid plan configuration: {err}");
                None
            }
            Self::RepositoryCreateError { err } => {
                error!(
                    "failed to create repository directory `{}`",
                    err.dir().style(styles.bold)
                );
                err.source()
            }
            Self::TestPackageScanError { err } => {
                error!("failed to find test packages");
                Some(err as &dyn Error)
            }
            Self::GeneratorBuildError { err } => {
                error!("failed to set up description generation");
                Some(err as &dyn Error)
            }
            Self::DescriptionGenerationFailed { result } => {
                display_generation_failures(result, styles);
                None
            }
            Self::DiscoveryError { err } => {
                error!("failed to discover test packages");
                Some(err as &dyn Error)
            }
            Self::PlanConstructError { err } => display_construct_error(err, styles),
            Self::PlanWriteError { err } => {
                error!("failed to write test plans");
                Some(err as &dyn Error)
            }
            Self::WriteOutput { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
        };

        display_causes(next_error);
    }
}

fn display_generation_failures(result: &GenerationResult, styles: &StderrStyles) {
    for failure in result.failures() {
        let package = failure.package.style(styles.bold);
        match &failure.status {
            TaskStatus::Failed(err) => {
                error!("failed to generate description for `{package}`: {err}");
                display_causes(err.source());
                if let DescriptionGenerateError::DocletFailed { stderr, .. } = err
                    && !stderr.trim().is_empty()
                {
                    error!(target: NO_HEADING, "\n--- stderr ---\n{}", stderr.trim_end());
                }
            }
            TaskStatus::Panicked(message) => {
                error!("description task for `{package}` panicked: {message}");
            }
            TaskStatus::Succeeded => {}
        }
    }

    let failed = result.failures().map(|f| f.package.as_str()).join(", ");
    error!(
        "{} of {} descriptions failed ({failed}), combined status {}",
        result.failures().count(),
        result.outcomes().len(),
        result.status(),
    );
}

fn display_construct_error<'a>(
    err: &'a PlanConstructError,
    styles: &StderrStyles,
) -> Option<&'a dyn Error> {
    match err {
        PlanConstructError::Pattern { plan, error } => {
            let report = miette::Report::new(error.clone());
            error!(target: NO_HEADING, "{report:?}");
            error!("invalid pattern in plan `{}`", plan.style(styles.bold));
            None
        }
        PlanConstructError::TestOverride { plan, error } => {
            error!(
                "invalid test overrides in plan `{}`: {error}",
                plan.style(styles.bold)
            );
            None
        }
        PlanConstructError::Complement(violation) => {
            error!(
                "plans `{}` and `{}` do not complement each other: {violation}",
                violation.stable.style(styles.bold),
                violation.flaky.style(styles.bold),
            );
            error!(
                target: NO_HEADING,
                "{}",
                "(hint: check the quarantine pattern and the flaky-tests catalog)"
                    .style(styles.warning_text)
            );
            None
        }
        other => {
            error!("{other}");
            other.source()
        }
    }
}

fn display_causes(mut next_error: Option<&dyn Error>) {
    while let Some(err) = next_error {
        error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
        next_error = err.source();
    }
}
