// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use ctsplan_metadata::{CtsPlanExitCode, PlanWriteSummary};
use ctsplan_runner::{
    config::CtsPlanConfig,
    description::{DescriptionTask, DocletTask, SignatureCheckTask, find_test_packages},
    discovery::discover_packages,
    generator::DescriptionGeneratorBuilder,
    repository::RepositoryLayout,
};
use std::io::Write;
use tracing::{debug, info};

/// Generates CTS package descriptions and test plans.
///
/// Descriptions are generated for every test package under TEST_ROOT and written to
/// OUT_DIR/repository/testcases. Once all of them are written, the descriptions are read
/// back and one plan document per configured plan is written to OUT_DIR/repository/plans.
#[derive(Debug, Parser)]
#[command(version, name = "ctsplan")]
pub struct CtsPlanApp {
    /// Directory scanned for test packages (Android.mk files)
    #[arg(value_name = "TEST_ROOT")]
    test_root: Utf8PathBuf,

    /// Directory the repository is written to
    #[arg(value_name = "OUT_DIR")]
    out_dir: Utf8PathBuf,

    /// Directory for scratch files
    #[arg(value_name = "TEMP_DIR")]
    temp_dir: Utf8PathBuf,

    /// Root of the Android source tree
    #[arg(value_name = "ANDROID_ROOT")]
    android_root: Utf8PathBuf,

    /// Classpath of the description doclet
    #[arg(value_name = "DOCLET_PATH")]
    doclet_path: Utf8PathBuf,

    /// Config file [default: ANDROID_ROOT/.config/ctsplan.toml]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// The javadoc executable used to run the doclet
    #[arg(long, value_name = "PATH", default_value = "javadoc", env = "CTSPLAN_JAVADOC")]
    javadoc: Utf8PathBuf,

    /// Format of the summary printed once the plans are written
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormat,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    /// A line per plan
    #[default]
    Human,
    /// A JSON summary of every written plan
    Json,
}

impl CtsPlanApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output_writer: &mut OutputWriter) -> Result<i32, ExpectedError> {
        let output = OutputContext {
            verbose: self.output.verbose,
            color: self.output.color,
        };

        let config = CtsPlanConfig::from_sources(&self.android_root, self.config_file.as_deref())?;
        // Recipes are checked before the slow part starts.
        let policy = config.policy()?;

        let layout = RepositoryLayout::new(&self.out_dir);
        layout.create_dirs()?;
        let test_repository = layout.test_repository();

        let sources = find_test_packages(&self.test_root)?;
        let mut tasks: Vec<Box<dyn DescriptionTask>> = Vec::with_capacity(sources.len() + 1);
        tasks.push(Box::new(SignatureCheckTask::new(&test_repository)));
        for source in sources {
            let task = DocletTask::new(
                source,
                &test_repository,
                &self.temp_dir,
                &self.android_root,
                &self.doclet_path,
            )
            .with_javadoc(&self.javadoc);
            tasks.push(Box::new(task));
        }

        let mut builder = DescriptionGeneratorBuilder::new();
        builder.set_workers(config.workers());
        let result = builder.build()?.generate(tasks);
        if !result.is_success() {
            return Err(ExpectedError::DescriptionGenerationFailed { result });
        }
        debug!("all {} descriptions written", result.outcomes().len());

        let pool = discover_packages(&test_repository)?;
        let plans = policy.build(&pool)?;
        let plan_dir = layout.plan_dir();
        let summaries = plans.write_all(&plan_dir)?;
        info!("wrote {} plans to {plan_dir}", summaries.len());

        let summary = PlanWriteSummary::new(pool.len(), summaries);
        write_summary(&summary, self.message_format, output, output_writer)?;

        Ok(CtsPlanExitCode::OK)
    }
}

fn write_summary(
    summary: &PlanWriteSummary,
    format: MessageFormat,
    output: OutputContext,
    output_writer: &mut OutputWriter,
) -> Result<(), ExpectedError> {
    let mut writer = output_writer.stdout_writer();
    match format {
        MessageFormat::Human => {
            for plan in &summary.plans {
                write!(writer, "{:<24} {:>4} packages", plan.name, plan.package_count)
                    .map_err(ExpectedError::write_output)?;
                if output.verbose {
                    write!(
                        writer,
                        ", {} restricted, {} tests excluded, {}",
                        plan.restricted_count, plan.excluded_test_count, plan.path
                    )
                    .map_err(ExpectedError::write_output)?;
                }
                writeln!(writer).map_err(ExpectedError::write_output)?;
            }
        }
        MessageFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, summary)
                .map_err(ExpectedError::write_output)?;
            writeln!(writer).map_err(ExpectedError::write_output)?;
        }
    }
    writer.flush().map_err(ExpectedError::write_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn verify_app() {
        CtsPlanApp::command().debug_assert();
    }

    #[test]
    fn five_positionals_are_required() {
        let err = CtsPlanApp::try_parse_from(["ctsplan", "tests", "out", "tmp", "src"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let app = CtsPlanApp::try_parse_from([
            "ctsplan",
            "tests",
            "out",
            "tmp",
            "src",
            "doclet.jar",
            "--message-format",
            "json",
        ])
        .unwrap();
        assert_eq!(app.test_root.as_str(), "tests");
        assert_eq!(app.doclet_path.as_str(), "doclet.jar");
        assert_eq!(app.message_format, MessageFormat::Json);
        assert_eq!(app.javadoc.as_str(), "javadoc");
    }

    #[test]
    fn signature_check_only_repository() {
        let temp = Utf8TempDir::new().unwrap();
        let test_root = temp.path().join("tests");
        let out_dir = temp.path().join("out");
        fs::create_dir(&test_root).unwrap();

        let app = CtsPlanApp::try_parse_from([
            "ctsplan",
            test_root.as_str(),
            out_dir.as_str(),
            temp.path().join("tmp").as_str(),
            temp.path().as_str(),
            "doclet.jar",
            "--message-format=json",
        ])
        .unwrap();

        let mut output_writer = OutputWriter::Test { stdout: Vec::new() };
        let code = app.exec(&mut output_writer).unwrap();
        assert_eq!(code, CtsPlanExitCode::OK);

        let OutputWriter::Test { stdout } = output_writer else {
            unreachable!("test writer");
        };
        let summary = PlanWriteSummary::parse_json(String::from_utf8(stdout).unwrap()).unwrap();
        assert_eq!(summary.pool_size, 1);
        assert_eq!(summary.plans.len(), 12);

        let signature = summary
            .plans
            .iter()
            .find(|plan| plan.name == "Signature")
            .unwrap();
        assert_eq!(signature.package_count, 1);
        assert_eq!(
            signature.path,
            out_dir.join("repository/plans/Signature.xml")
        );
        assert!(signature.path.is_file());
        assert!(out_dir.join("repository/testcases/SignatureTest.xml").is_file());
    }
}
