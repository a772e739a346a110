// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs the whole pipeline against a temporary repository: generate descriptions, discover
//! the pool, build every plan and write it out.

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use cts_xml::TestPackageDescription;
use ctsplan_runner::{
    config::CtsPlanConfig,
    description::{DescriptionTask, SignatureCheckTask, write_description},
    discovery::discover_packages,
    errors::DescriptionGenerateError,
    generator::DescriptionGeneratorBuilder,
    plan::{PackageSelection, ResolvedPlan},
    repository::RepositoryLayout,
};
use indoc::indoc;
use maplit::btreeset;
use pretty_assertions::assert_eq;
use std::{fs, num::NonZeroUsize};

/// Writes a fixed description, standing in for the doclet.
#[derive(Debug)]
struct FixedDescriptionTask {
    description: TestPackageDescription,
    output_path: Utf8PathBuf,
}

impl FixedDescriptionTask {
    fn boxed(test_repository: &Utf8Path, name: &str, package: &str) -> Box<dyn DescriptionTask> {
        let mut description = TestPackageDescription::new(name, package);
        description.add_test(&format!("{package}.cts.SmokeTest.testSmoke"));
        Box::new(Self {
            description,
            output_path: test_repository.join(format!("{name}.xml")),
        })
    }
}

impl DescriptionTask for FixedDescriptionTask {
    fn package_name(&self) -> &str {
        &self.description.app_package_name
    }

    fn output_path(&self) -> &Utf8Path {
        &self.output_path
    }

    fn generate(&self) -> Result<(), DescriptionGenerateError> {
        write_description(&self.description, &self.output_path)
    }
}

/// Generates descriptions for three packages plus the signature check.
fn generate_repository(out_dir: &Utf8Path) -> RepositoryLayout {
    let layout = RepositoryLayout::new(out_dir);
    layout.create_dirs().unwrap();
    let test_repository = layout.test_repository();

    let tasks = vec![
        Box::new(SignatureCheckTask::new(&test_repository)) as Box<dyn DescriptionTask>,
        FixedDescriptionTask::boxed(&test_repository, "CtsAppTestCases", "android.app"),
        FixedDescriptionTask::boxed(&test_repository, "CtsDisplayTestCases", "android.display"),
        FixedDescriptionTask::boxed(&test_repository, "CtsSecurityTestCases", "android.security"),
    ];

    let mut builder = DescriptionGeneratorBuilder::new();
    builder.set_workers(NonZeroUsize::new(2).unwrap());
    let result = builder.build().unwrap().generate(tasks);
    assert!(result.is_success(), "generation failed: {result:?}");
    layout
}

#[test]
fn default_policy_writes_every_plan() {
    let temp = Utf8TempDir::new().unwrap();
    let layout = generate_repository(temp.path());

    let pool = discover_packages(&layout.test_repository()).unwrap();
    assert_eq!(
        pool.iter().collect::<Vec<_>>(),
        vec!["android.app", "android.display", "android.security", "android.tests.sigtest"]
    );

    let config = CtsPlanConfig::from_sources(temp.path(), None).unwrap();
    let plans = config.policy().unwrap().build(&pool).unwrap();
    let summaries = plans.write_all(&layout.plan_dir()).unwrap();

    let names: Vec<_> = summaries.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "CTS",
            "CTS-TF",
            "CTS-No-Media-Stream",
            "SDK",
            "Android",
            "Java",
            "VM-TF",
            "Signature",
            "AppSecurity",
            "PDK",
            "CTS-stable",
            "CTS-flaky",
        ]
    );
    for summary in &summaries {
        assert!(summary.path.is_file(), "{} was written", summary.path);
    }

    let signature = ResolvedPlan::read(&layout.plan_dir().join("Signature.xml")).unwrap();
    assert_eq!(
        signature.iter().collect::<Vec<_>>(),
        vec![("android.tests.sigtest", &PackageSelection::All)]
    );

    let android = ResolvedPlan::read(&layout.plan_dir().join("Android.xml")).unwrap();
    assert!(!android.selects_package("android.tests.sigtest"));
    assert!(android.selects_package("android.app"));

    // The default catalog lists flaky tests in android.app.
    let stable = ResolvedPlan::read(&layout.plan_dir().join("CTS-stable.xml")).unwrap();
    let flaky = ResolvedPlan::read(&layout.plan_dir().join("CTS-flaky.xml")).unwrap();
    let flaky_app_test = "cts.AlertDialogTest#testAlertDialogCancelable";
    assert!(!stable.selects_test("android.app", flaky_app_test));
    assert!(flaky.selects_test("android.app", flaky_app_test));
    assert!(!stable.selects_package("android.display"));
    assert_eq!(flaky.selection("android.display"), Some(&PackageSelection::All));
}

#[test]
fn hand_written_plans_match_the_derived_complement() {
    let temp = Utf8TempDir::new().unwrap();
    let layout = generate_repository(temp.path());

    let config_file = temp.path().join("ctsplan.toml");
    fs::write(
        &config_file,
        indoc! {r#"
            [[plan]]
            name = "stable"
            steps = [
                { exclude = 'android\.display' },
                { exclude-tests = { package = "android.app", tests = ["T1", "T2"] } },
            ]

            [[plan]]
            name = "flaky"
            steps = [
                { exclude = '.*' },
                { include = 'android\.display' },
                { include = 'android\.app' },
                { include-tests = { package = "android.app", tests = ["T1", "T2"] } },
            ]

            [complement]
            stable = "CTS-stable"
            flaky = "CTS-flaky"
            quarantine = 'android\.display'

            [[flaky-tests]]
            package = "android.app"
            tests = ["T1", "T2"]
        "#},
    )
    .unwrap();

    let pool = discover_packages(&layout.test_repository()).unwrap();
    let config = CtsPlanConfig::from_sources(temp.path(), Some(&config_file)).unwrap();
    let plans = config.policy().unwrap().build(&pool).unwrap();
    plans.write_all(&layout.plan_dir()).unwrap();

    let read = |name: &str| fs::read_to_string(layout.plan_dir().join(format!("{name}.xml"))).unwrap();
    assert_eq!(read("stable"), read("CTS-stable"));
    assert_eq!(read("flaky"), read("CTS-flaky"));

    let stable = plans.get("stable").unwrap();
    let flaky = plans.get("flaky").unwrap();
    let t1_t2 = btreeset! {"T1".to_owned(), "T2".to_owned()};
    assert_eq!(
        stable.selection("android.app"),
        Some(&PackageSelection::AllExcept(t1_t2.clone()))
    );
    assert_eq!(stable.selection("android.security"), Some(&PackageSelection::All));
    assert_eq!(flaky.selection("android.app"), Some(&PackageSelection::Only(t1_t2)));
    assert_eq!(flaky.selection("android.display"), Some(&PackageSelection::All));

    for test in ["T1", "T2", "T3"] {
        assert_ne!(
            stable.selects_test("android.app", test),
            flaky.selects_test("android.app", test),
            "exactly one plan selects {test}"
        );
    }
}

#[test]
fn rerunning_produces_identical_plans() {
    let temp = Utf8TempDir::new().unwrap();
    let layout = generate_repository(temp.path());
    let pool = discover_packages(&layout.test_repository()).unwrap();
    let policy = CtsPlanConfig::default_config().unwrap().policy().unwrap();

    let first = policy.build(&pool).unwrap();
    first.write_all(&layout.plan_dir()).unwrap();
    let before = fs::read(layout.plan_dir().join("CTS-stable.xml")).unwrap();

    let second = policy.build(&pool).unwrap();
    assert_eq!(first, second);
    second.write_all(&layout.plan_dir()).unwrap();
    let after = fs::read(layout.plan_dir().join("CTS-stable.xml")).unwrap();
    assert_eq!(before, after);
}
