// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds the package pool from the description documents in the test repository.

use crate::{errors::DiscoveryError, plan::PackagePool};
use camino::{Utf8Path, Utf8PathBuf};
use cts_xml::TestPackageHeader;
use std::{collections::BTreeMap, fs};
use tracing::{debug, info};

/// Reads every `*.xml` description in `test_repository` and returns the pool of the
/// `appPackageName`s they declare.
///
/// A document that cannot be read or parsed stops discovery: every package is either in the
/// pool or reported.
pub fn discover_packages(test_repository: &Utf8Path) -> Result<PackagePool, DiscoveryError> {
    let descriptions = list_descriptions(test_repository)?;
    if descriptions.is_empty() {
        return Err(DiscoveryError::NoDescriptions {
            dir: test_repository.to_owned(),
        });
    }

    let mut packages: BTreeMap<String, Utf8PathBuf> = BTreeMap::new();
    for path in descriptions {
        let contents = fs::read_to_string(&path).map_err(|error| DiscoveryError::Read {
            path: path.clone(),
            error,
        })?;
        let header = TestPackageHeader::parse(&contents).map_err(|error| {
            DiscoveryError::Malformed {
                path: path.clone(),
                error,
            }
        })?;

        debug!("{path} describes package {}", header.app_package_name);
        if let Some(first) = packages.get(&header.app_package_name) {
            return Err(DiscoveryError::DuplicatePackage {
                package: header.app_package_name,
                first: first.clone(),
                second: path,
            });
        }
        packages.insert(header.app_package_name, path);
    }

    info!(
        "discovered {} test packages in {test_repository}",
        packages.len()
    );
    Ok(PackagePool::new(packages.into_keys()))
}

fn list_descriptions(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
    let read_dir_err = |error| DiscoveryError::ReadDir {
        dir: dir.to_owned(),
        error,
    };

    let mut paths = Vec::new();
    for entry in dir.read_dir_utf8().map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        let is_file = entry.file_type().map_err(read_dir_err)?.is_file();
        if is_file && entry.path().extension() == Some("xml") {
            paths.push(entry.into_path());
        }
    }
    // Sorted, so that a duplicate is always reported against the same pair of files.
    paths.sort();
    Ok(paths)
}
