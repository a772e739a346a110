// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for ctsplan: plan recipes, the complement pair, the flaky test catalog and
//! the description generator.

use crate::{
    catalog::FlakyTestCatalog,
    errors::{ConfigParseError, ConfigParseErrorKind, RecipeError},
    policy::{ComplementRecipe, PlanPolicy, PlanRecipe, PlanStep},
};
use camino::Utf8Path;
use config::{
    Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState,
};
use ctsplan_filtering::PlanSeed;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    num::NonZeroUsize,
};
use tracing::warn;

/// Overall configuration for ctsplan.
#[derive(Clone, Debug)]
pub struct CtsPlanConfig {
    workers: NonZeroUsize,
    recipes: Vec<RecipeConfig>,
    complement: Option<ComplementConfig>,
    flaky_tests: Vec<FlakyTestsConfig>,
}

impl CtsPlanConfig {
    /// The default location of the config within the source tree.
    pub const CONFIG_PATH: &'static str = ".config/ctsplan.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The worker count used if no config sets one.
    pub const DEFAULT_WORKERS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(1);

    /// Reads the config for the source tree at `android_root`.
    ///
    /// If `config_file` is given it must exist. Otherwise the config is read from
    /// [`Self::CONFIG_PATH`] under `android_root`, if present.
    pub fn from_sources(
        android_root: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let default = Self::deserialize_default()?;

        let (config_file, required) = match config_file {
            Some(file) => (file.to_owned(), true),
            None => (android_root.join(Self::CONFIG_PATH), false),
        };
        let user = Self::deserialize_source(
            Config::builder()
                .add_source(File::new(config_file.as_str(), FileFormat::Toml).required(required)),
            &config_file,
        )?;

        Ok(Self::merge(default, user))
    }

    /// Returns the config embedded in the binary, with no repository-specific changes.
    pub fn default_config() -> Result<Self, ConfigParseError> {
        let default = Self::deserialize_default()?;
        Ok(Self::merge(default, CtsPlanConfigDeserialize::default()))
    }

    /// Returns the number of descriptions generated at the same time.
    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    /// Returns the flaky test catalog.
    pub fn catalog(&self) -> FlakyTestCatalog {
        self.flaky_tests
            .iter()
            .map(|entry| (entry.package.as_str(), entry.tests.iter().map(String::as_str)))
            .collect()
    }

    /// Resolves plan inheritance and returns the policy that builds every configured plan.
    pub fn policy(&self) -> Result<PlanPolicy, RecipeError> {
        let recipes = resolve_recipes(&self.recipes)?;
        let complement = self
            .complement
            .as_ref()
            .map(|c| ComplementRecipe::new(&c.stable, &c.flaky, &c.quarantine));
        PlanPolicy::new(recipes, complement, self.catalog())
    }

    fn merge(default: CtsPlanConfigDeserialize, user: CtsPlanConfigDeserialize) -> Self {
        // Sections replace each other as a whole: merging lists element by element would
        // leave stale entries from the default config behind.
        Self {
            workers: user
                .generator
                .workers
                .or(default.generator.workers)
                .unwrap_or(Self::DEFAULT_WORKERS),
            recipes: user.plan.or(default.plan).unwrap_or_default(),
            complement: user.complement.or(default.complement),
            flaky_tests: user.flaky_tests.or(default.flaky_tests).unwrap_or_default(),
        }
    }

    fn deserialize_default() -> Result<CtsPlanConfigDeserialize, ConfigParseError> {
        Self::deserialize_source(
            Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml)),
            Utf8Path::new("<default config>"),
        )
    }

    fn deserialize_source(
        builder: ConfigBuilder<DefaultState>,
        path: &Utf8Path,
    ) -> Result<CtsPlanConfigDeserialize, ConfigParseError> {
        let config = builder
            .build()
            .map_err(|error| {
                ConfigParseError::new(path, ConfigParseErrorKind::BuildError(Box::new(error)))
            })?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: CtsPlanConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate reports the key as well; drop it so the key is only
                // reported once.
                let key_path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseError::new(
                    path,
                    ConfigParseErrorKind::DeserializeError(Box::new(
                        serde_path_to_error::Error::new(key_path, error),
                    )),
                )
            })?;

        for key in ignored {
            warn!("ignoring unknown configuration key `{key}` in {path}");
        }
        Ok(config)
    }
}

fn resolve_recipes(recipes: &[RecipeConfig]) -> Result<Vec<PlanRecipe>, RecipeError> {
    let mut by_name = BTreeMap::new();
    for recipe in recipes {
        if by_name.insert(recipe.name.as_str(), recipe).is_some() {
            return Err(RecipeError::DuplicatePlan {
                name: recipe.name.clone(),
            });
        }
    }

    recipes
        .iter()
        .map(|recipe| resolve_recipe(recipe, &by_name))
        .collect()
}

fn resolve_recipe(
    recipe: &RecipeConfig,
    by_name: &BTreeMap<&str, &RecipeConfig>,
) -> Result<PlanRecipe, RecipeError> {
    // chain[0] is the recipe itself, the last element is the root of the inheritance chain.
    let mut chain = vec![recipe];
    let mut current = recipe;
    while let Some(parent) = &current.inherits {
        let Some(&parent_recipe) = by_name.get(parent.as_str()) else {
            return Err(RecipeError::UnknownParent {
                plan: current.name.clone(),
                parent: parent.clone(),
            });
        };
        if let Some(pos) = chain.iter().position(|r| r.name == parent_recipe.name) {
            let mut cycle: Vec<String> = chain[pos..].iter().map(|r| r.name.clone()).collect();
            cycle.push(parent_recipe.name.clone());
            return Err(RecipeError::InheritanceCycle { chain: cycle });
        }
        chain.push(parent_recipe);
        current = parent_recipe;
    }

    // The nearest explicit seed wins.
    let seed = chain
        .iter()
        .find_map(|r| r.seed)
        .unwrap_or_default();
    let steps = chain
        .iter()
        .rev()
        .flat_map(|r| r.steps.iter().map(StepConfig::to_step));
    Ok(PlanRecipe::new(&recipe.name, seed).steps(steps))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CtsPlanConfigDeserialize {
    #[serde(default)]
    generator: GeneratorConfig,
    plan: Option<Vec<RecipeConfig>>,
    complement: Option<ComplementConfig>,
    flaky_tests: Option<Vec<FlakyTestsConfig>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct GeneratorConfig {
    workers: Option<NonZeroUsize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RecipeConfig {
    name: String,
    #[serde(default)]
    seed: Option<PlanSeed>,
    #[serde(default)]
    inherits: Option<String>,
    #[serde(default)]
    steps: Vec<StepConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum StepConfig {
    Include(String),
    Exclude(String),
    IncludeTests(TestsConfig),
    ExcludeTests(TestsConfig),
}

impl StepConfig {
    fn to_step(&self) -> PlanStep {
        match self {
            StepConfig::Include(pattern) => PlanStep::Include(pattern.clone()),
            StepConfig::Exclude(pattern) => PlanStep::Exclude(pattern.clone()),
            StepConfig::IncludeTests(t) => PlanStep::IncludeTests {
                package: t.package.clone(),
                tests: t.tests.clone(),
            },
            StepConfig::ExcludeTests(t) => PlanStep::ExcludeTests {
                package: t.package.clone(),
                tests: t.tests.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
struct TestsConfig {
    package: String,
    tests: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct ComplementConfig {
    stable: String,
    flaky: String,
    quarantine: String,
}

#[derive(Clone, Debug, Deserialize)]
struct FlakyTestsConfig {
    package: String,
    tests: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{PlanConstructError, TestOverrideError},
        plan::{PackagePool, PackageSelection},
    };
    use camino::Utf8PathBuf;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write_config(dir: &Utf8TempDir, contents: &str) -> Utf8PathBuf {
        let path = dir.path().join(CtsPlanConfig::CONFIG_PATH);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn default_config_is_valid() {
        let config = CtsPlanConfig::default_config().expect("default config is valid");
        assert_eq!(config.workers().get(), 2);

        let policy = config.policy().expect("default recipes resolve");
        let names: Vec<_> = policy.recipes().iter().map(PlanRecipe::name).collect();
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
            ]
        );
        let complement = policy.complement().expect("complement is configured");
        assert_eq!(complement.stable_name(), "CTS-stable");
        assert_eq!(complement.flaky_name(), "CTS-flaky");
        assert_eq!(complement.quarantine(), "android\\.display");

        let catalog = policy.catalog();
        assert_eq!(catalog.len(), 8);
        // One camera test is listed twice.
        assert_eq!(catalog.test_count(), 71);
        assert!(
            catalog
                .tests("android.widget")
                .unwrap()
                .contains("cts.GridViewTest#testSetNumColumns")
        );
    }

    #[test]
    fn inherited_recipes_run_parent_steps_first() {
        let policy = CtsPlanConfig::default_config().unwrap().policy().unwrap();
        let android = policy
            .recipes()
            .iter()
            .find(|r| r.name() == "Android")
            .unwrap();
        assert_eq!(android.seed(), PlanSeed::All);
        assert_eq!(
            android.step_list(),
            [
                PlanStep::Exclude("android\\.performance.*".to_owned()),
                PlanStep::Exclude("android\\.tests\\.sigtest".to_owned()),
                PlanStep::Exclude("android\\.core.*".to_owned()),
            ]
        );
    }

    #[test]
    fn user_sections_replace_defaults() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(
            &dir,
            indoc! {r#"
                [generator]
                workers = 4

                [[plan]]
                name = "Net"
                seed = "empty"
                steps = [
                    { include = 'android\.net' },
                    { exclude-tests = { package = "android.net", tests = ["cts.DnsTest#testDnsWorks"] } },
                ]
            "#},
        );

        let config = CtsPlanConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(config.workers().get(), 4);
        let policy = config.policy().unwrap();
        assert_eq!(policy.recipes().len(), 1);
        assert_eq!(policy.recipes()[0].seed(), PlanSeed::Empty);
        assert_eq!(
            policy.recipes()[0].step_list()[1],
            PlanStep::ExcludeTests {
                package: "android.net".to_owned(),
                tests: vec!["cts.DnsTest#testDnsWorks".to_owned()],
            }
        );
        // Sections the user config does not mention come from the default config.
        assert_eq!(policy.catalog().len(), 8);
        assert!(policy.complement().is_some());
    }

    #[test]
    fn flaky_entries_without_tests_are_dropped() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(
            &dir,
            indoc! {r#"
                [[flaky-tests]]
                package = "android.app"
                tests = []

                [[flaky-tests]]
                package = "android.net"
                tests = ["cts.DnsTest#testDnsWorks"]
            "#},
        );

        let config = CtsPlanConfig::from_sources(dir.path(), None).unwrap();
        let catalog = config.catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.tests("android.app"), None);

        let pool = PackagePool::new(["android.app", "android.display", "android.net"]);
        let plans = config.policy().unwrap().build(&pool).unwrap();
        let stable = plans
            .plans()
            .iter()
            .find(|named| named.name == "CTS-stable")
            .unwrap();
        assert_eq!(
            stable.plan.selection("android.app"),
            Some(&PackageSelection::All)
        );
    }

    #[test]
    fn unwritable_test_names_fail_the_build() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(
            &dir,
            indoc! {r#"
                [[plan]]
                name = "Net"
                steps = [
                    { exclude-tests = { package = "android.net", tests = ["cts.A;cts.B"] } },
                ]
            "#},
        );

        let policy = CtsPlanConfig::from_sources(dir.path(), None)
            .unwrap()
            .policy()
            .unwrap();
        let err = policy
            .build(&PackagePool::new(["android.net"]))
            .unwrap_err();
        assert!(
            matches!(
                &err,
                PlanConstructError::TestOverride {
                    plan,
                    error: TestOverrideError::InvalidTestName { .. },
                } if plan == "Net"
            ),
            "{err:?}"
        );
    }

    #[test]
    fn unknown_seed_is_an_error() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(&dir, "[[plan]]\nname = \"Net\"\nseed = \"some\"\n");
        let err = CtsPlanConfig::from_sources(dir.path(), None).unwrap_err();
        let ConfigParseErrorKind::DeserializeError(error) = err.kind() else {
            panic!("expected deserialize error, got {err:?}");
        };
        assert!(error.path().to_string().ends_with("seed"), "{error}");
    }

    #[test]
    fn missing_default_location_is_fine() {
        let dir = Utf8TempDir::new().unwrap();
        let config = CtsPlanConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(config.workers(), CtsPlanConfig::DEFAULT_WORKERS);
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = Utf8TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = CtsPlanConfig::from_sources(dir.path(), Some(&missing)).unwrap_err();
        assert_eq!(err.config_file(), &missing);
        assert!(matches!(err.kind(), ConfigParseErrorKind::BuildError(_)));
    }

    #[test]
    fn zero_workers_is_an_error() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(&dir, "[generator]\nworkers = 0\n");
        let err = CtsPlanConfig::from_sources(dir.path(), None).unwrap_err();
        let ConfigParseErrorKind::DeserializeError(error) = err.kind() else {
            panic!("expected deserialize error, got {err:?}");
        };
        assert_eq!(error.path().to_string(), "generator.workers");
    }

    #[test]
    fn inheritance_errors() {
        let recipe = |name: &str, inherits: Option<&str>| RecipeConfig {
            name: name.to_owned(),
            seed: None,
            inherits: inherits.map(str::to_owned),
            steps: vec![],
        };

        let err = resolve_recipes(&[recipe("A", Some("B"))]).unwrap_err();
        assert_eq!(
            err,
            RecipeError::UnknownParent {
                plan: "A".to_owned(),
                parent: "B".to_owned()
            }
        );

        let err = resolve_recipes(&[recipe("A", Some("A"))]).unwrap_err();
        assert_eq!(
            err,
            RecipeError::InheritanceCycle {
                chain: vec!["A".to_owned(), "A".to_owned()]
            }
        );

        let err = resolve_recipes(&[
            recipe("A", Some("B")),
            recipe("B", Some("C")),
            recipe("C", Some("B")),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            RecipeError::InheritanceCycle {
                chain: vec!["B".to_owned(), "C".to_owned(), "B".to_owned()]
            }
        );

        let err = resolve_recipes(&[recipe("A", None), recipe("A", None)]).unwrap_err();
        assert_eq!(
            err,
            RecipeError::DuplicatePlan {
                name: "A".to_owned()
            }
        );
    }
}
