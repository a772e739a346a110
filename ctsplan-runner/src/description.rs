// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tasks that each write one package description into the test repository.

use crate::{
    errors::{DescriptionGenerateError, TestPackageScanError},
    makefile::makefile_vars,
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use cts_xml::TestPackageDescription;
use std::{borrow::Cow, collections::BTreeMap, ffi::OsStr, fmt, fs, io::Write};
use tracing::{debug, info, trace};
use walkdir::WalkDir;

/// Produces the description document of one package.
///
/// Tasks run concurrently, so each task must write only to its own
/// [`output_path`](Self::output_path).
pub trait DescriptionTask: fmt::Debug + Send + Sync {
    /// The name of the package, for logging.
    fn package_name(&self) -> &str;

    /// The file this task writes.
    fn output_path(&self) -> &Utf8Path;

    /// Generates the description. Called once, on a blocking thread.
    fn generate(&self) -> Result<(), DescriptionGenerateError>;
}

/// Writes the description for the API signature check, which has no sources to document.
#[derive(Clone, Debug)]
pub struct SignatureCheckTask {
    output_path: Utf8PathBuf,
}

impl SignatureCheckTask {
    /// The package the signature check runs as.
    pub const PACKAGE: &'static str = "android.tests.sigtest";

    /// The file name of the description within the test repository.
    pub const FILE_NAME: &'static str = "SignatureTest.xml";

    /// Creates a task writing into `test_repository`.
    pub fn new(test_repository: &Utf8Path) -> Self {
        Self {
            output_path: test_repository.join(Self::FILE_NAME),
        }
    }

    /// Returns the description this task writes.
    pub fn description() -> TestPackageDescription {
        let mut package = TestPackageDescription::new("SignatureTest", Self::PACKAGE);
        package
            .add_attribute("appNameSpace", Self::PACKAGE)
            .add_attribute("signatureCheck", "true")
            .add_attribute("runner", ".InstrumentationRunner")
            .add_test("android.tests.sigtest.SignatureTest.testSignature");
        package
    }
}

impl DescriptionTask for SignatureCheckTask {
    fn package_name(&self) -> &str {
        Self::PACKAGE
    }

    fn output_path(&self) -> &Utf8Path {
        &self.output_path
    }

    fn generate(&self) -> Result<(), DescriptionGenerateError> {
        info!("generating test description for package {}", Self::PACKAGE);
        write_description(&Self::description(), &self.output_path)
    }
}

/// Writes `description` to `path` atomically, creating the parent directory if needed.
pub fn write_description(
    description: &TestPackageDescription,
    path: &Utf8Path,
) -> Result<(), DescriptionGenerateError> {
    let bytes = description
        .to_bytes()
        .map_err(|error| DescriptionGenerateError::Serialize {
            package: description.app_package_name.clone(),
            error,
        })?;

    if let Some(parent) = path.parent()
        && !parent.as_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|error| DescriptionGenerateError::CreateDir {
            path: parent.to_owned(),
            error,
        })?;
    }

    let file = AtomicFile::new(path, OverwriteBehavior::AllowOverwrite);
    file.write(|f| f.write_all(&bytes))
        .map_err(|error| DescriptionGenerateError::Write {
            path: path.to_owned(),
            error: match error {
                atomicwrites::Error::Internal(err) => err,
                atomicwrites::Error::User(err) => err,
            },
        })
}

/// A test package found under the test root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestPackageSource {
    /// The `LOCAL_PACKAGE_NAME` from the package's makefile.
    pub name: String,

    /// The directory containing the makefile.
    pub dir: Utf8PathBuf,
}

impl TestPackageSource {
    /// The suffix of `LOCAL_PACKAGE_NAME` that marks a test package.
    pub const NAME_SUFFIX: &'static str = "TestCases";

    /// The makefile that defines a package.
    pub const MAKEFILE: &'static str = "Android.mk";
}

/// Walks `test_root` for `Android.mk` files that define a test package.
///
/// A makefile defines a test package if it assigns a `LOCAL_PACKAGE_NAME` ending in
/// [`TestPackageSource::NAME_SUFFIX`]. The result is sorted by package name.
pub fn find_test_packages(
    test_root: &Utf8Path,
) -> Result<Vec<TestPackageSource>, TestPackageScanError> {
    let mut found: BTreeMap<String, (Utf8PathBuf, TestPackageSource)> = BTreeMap::new();

    let walker = WalkDir::new(test_root).sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|error| TestPackageScanError::Walk {
            root: test_root.to_owned(),
            error,
        })?;
        if !entry.file_type().is_file()
            || entry.file_name() != OsStr::new(TestPackageSource::MAKEFILE)
        {
            continue;
        }
        let makefile = Utf8PathBuf::try_from(entry.into_path())
            .map_err(|err| TestPackageScanError::NonUtf8Path(err.into_path_buf()))?;

        let vars = makefile_vars(&makefile)?;
        let Some(name) = vars.get("LOCAL_PACKAGE_NAME") else {
            continue;
        };
        if !name.ends_with(TestPackageSource::NAME_SUFFIX) {
            trace!("{makefile}: {name} is not a test package");
            continue;
        }
        if let Some((first, _)) = found.get(name) {
            return Err(TestPackageScanError::DuplicatePackage {
                name: name.to_owned(),
                first: first.clone(),
                second: makefile,
            });
        }

        let dir = makefile
            .parent()
            .map_or_else(|| test_root.to_owned(), Utf8Path::to_owned);
        let source = TestPackageSource {
            name: name.to_owned(),
            dir,
        };
        debug!("found test package {} in {}", source.name, source.dir);
        found.insert(name.to_owned(), (makefile, source));
    }

    Ok(found.into_values().map(|(_, source)| source).collect())
}

/// Runs the `DescriptionGenerator` javadoc doclet over the sources of one test package.
#[derive(Clone, Debug)]
pub struct DocletTask {
    source: TestPackageSource,
    output_path: Utf8PathBuf,
    scratch_dir: Utf8PathBuf,
    android_root: Utf8PathBuf,
    doclet_path: Utf8PathBuf,
    javadoc: Utf8PathBuf,
}

impl DocletTask {
    /// The doclet class.
    pub const DOCLET: &'static str = "DescriptionGenerator";

    /// Creates a task that writes `<test_repository>/<name>.xml`, working in a scratch
    /// directory of its own under `temp_dir`.
    pub fn new(
        source: TestPackageSource,
        test_repository: &Utf8Path,
        temp_dir: &Utf8Path,
        android_root: &Utf8Path,
        doclet_path: &Utf8Path,
    ) -> Self {
        let output_path = test_repository.join(format!("{}.xml", source.name));
        let scratch_dir = temp_dir.join(&source.name);
        Self {
            source,
            output_path,
            scratch_dir,
            android_root: android_root.to_owned(),
            doclet_path: doclet_path.to_owned(),
            javadoc: Utf8PathBuf::from("javadoc"),
        }
    }

    /// Uses a different `javadoc` executable.
    pub fn with_javadoc(mut self, javadoc: impl Into<Utf8PathBuf>) -> Self {
        self.javadoc = javadoc.into();
        self
    }

    /// Returns the arguments passed to `javadoc`.
    pub fn args(&self) -> Result<Vec<Cow<'_, str>>, DescriptionGenerateError> {
        let src_dir = self.source.dir.join("src");
        let sourcepath = format!(
            "{src_dir}:{}",
            self.android_root.join("frameworks/base/core/java")
        );

        let mut args: Vec<Cow<'_, str>> = vec![
            "-o".into(),
            self.output_path.as_str().into(),
            "-d".into(),
            self.scratch_dir.as_str().into(),
            "-doclet".into(),
            Self::DOCLET.into(),
            "-docletpath".into(),
            self.doclet_path.as_str().into(),
            "-sourcepath".into(),
            sourcepath.into(),
        ];
        args.extend(self.java_sources(&src_dir)?.into_iter().map(Cow::Owned));
        Ok(args)
    }

    fn java_sources(&self, src_dir: &Utf8Path) -> Result<Vec<String>, DescriptionGenerateError> {
        let mut sources = Vec::new();
        for entry in WalkDir::new(src_dir).sort_by_file_name() {
            let entry = entry.map_err(|error| DescriptionGenerateError::ScanSources {
                package: self.source.name.clone(),
                dir: src_dir.to_owned(),
                error,
            })?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "java") {
                sources.push(path.to_string_lossy().into_owned());
            }
        }
        Ok(sources)
    }

    fn to_expression(&self, args: &[Cow<'_, str>]) -> duct::Expression {
        duct::cmd(self.javadoc.as_str(), args.iter().map(|arg| &**arg))
            .dir(self.scratch_dir.as_std_path())
    }
}

impl DescriptionTask for DocletTask {
    fn package_name(&self) -> &str {
        &self.source.name
    }

    fn output_path(&self) -> &Utf8Path {
        &self.output_path
    }

    fn generate(&self) -> Result<(), DescriptionGenerateError> {
        info!("generating test description for package {}", self.source.name);
        fs::create_dir_all(&self.scratch_dir).map_err(|error| {
            DescriptionGenerateError::CreateDir {
                path: self.scratch_dir.clone(),
                error,
            }
        })?;
        if let Some(parent) = self.output_path.parent() {
            fs::create_dir_all(parent).map_err(|error| DescriptionGenerateError::CreateDir {
                path: parent.to_owned(),
                error,
            })?;
        }

        let args = self.args()?;
        let expression = self.to_expression(&args);
        let command = format!("{} {}", self.javadoc, Self::DOCLET);
        trace!("executing command: {:?}", expression);

        let output = expression
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|error| DescriptionGenerateError::DocletExec {
                package: self.source.name.clone(),
                command: command.clone(),
                error,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            debug!("{command} failed with {}, stderr:\n{stderr}", output.status);
            return Err(DescriptionGenerateError::DocletFailed {
                package: self.source.name.clone(),
                command,
                exit_code: output.status.code(),
                stderr,
            });
        }

        if !self.output_path.is_file() {
            return Err(DescriptionGenerateError::OutputMissing {
                package: self.source.name.clone(),
                path: self.output_path.clone(),
            });
        }
        Ok(())
    }
}
