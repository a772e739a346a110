// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layout of the generated repository under the output directory.

use crate::errors::RepositoryCreateError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing::debug;

/// The directories ctsplan writes into.
///
/// ```text
/// <out>/repository/testcases   package descriptions
/// <out>/repository/plans       plan documents
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepositoryLayout {
    root: Utf8PathBuf,
}

impl RepositoryLayout {
    /// The repository directory under the output directory.
    pub const REPOSITORY_DIR: &'static str = "repository";

    /// The description directory under the repository.
    pub const TESTCASES_DIR: &'static str = "testcases";

    /// The plan directory under the repository.
    pub const PLANS_DIR: &'static str = "plans";

    /// Creates the layout for `out_dir`. Nothing is created on disk.
    pub fn new(out_dir: &Utf8Path) -> Self {
        Self {
            root: out_dir.join(Self::REPOSITORY_DIR),
        }
    }

    /// Returns `<out>/repository`.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the directory holding one description document per package.
    pub fn test_repository(&self) -> Utf8PathBuf {
        self.root.join(Self::TESTCASES_DIR)
    }

    /// Returns the directory holding one document per plan.
    pub fn plan_dir(&self) -> Utf8PathBuf {
        self.root.join(Self::PLANS_DIR)
    }

    /// Creates both directories if they don't exist yet.
    pub fn create_dirs(&self) -> Result<(), RepositoryCreateError> {
        for dir in [self.test_repository(), self.plan_dir()] {
            debug!("creating {dir}");
            fs::create_dir_all(&dir).map_err(|error| RepositoryCreateError::new(&dir, error))?;
        }
        Ok(())
    }
}
