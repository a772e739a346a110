// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named plan recipes and the stable/flaky complement pair.

use crate::{
    catalog::FlakyTestCatalog,
    errors::{
        ComplementViolation, PatternError, PlanConstructError, PlanWriteError, RecipeError,
        TestOverrideError, ViolationKind,
    },
    plan::{PackagePool, PackageSelection, ResolvedPlan, TestPlan},
};
use camino::Utf8Path;
use ctsplan_filtering::{FilterRule, PlanSeed};
use ctsplan_metadata::PlanSummary;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// One construction step of a recipe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PlanStep {
    /// Include packages matching a pattern.
    Include(String),

    /// Exclude packages matching a pattern.
    Exclude(String),

    /// Restrict a package to these tests.
    IncludeTests {
        /// The package.
        package: String,
        /// The tests.
        tests: Vec<String>,
    },

    /// Leave these tests out of a package.
    ExcludeTests {
        /// The package.
        package: String,
        /// The tests.
        tests: Vec<String>,
    },
}

impl PlanStep {
    fn apply(&self, plan: &mut TestPlan, name: &str) -> Result<(), PlanConstructError> {
        match self {
            PlanStep::Include(pattern) => {
                plan.include(pattern.as_str())
                    .map_err(|error| pattern_err(name, error))?;
            }
            PlanStep::Exclude(pattern) => {
                plan.exclude(pattern.as_str())
                    .map_err(|error| pattern_err(name, error))?;
            }
            PlanStep::IncludeTests { package, tests } => {
                plan.include_tests(package, tests)
                    .map_err(|error| override_err(name, error))?;
            }
            PlanStep::ExcludeTests { package, tests } => {
                plan.exclude_tests(package, tests)
                    .map_err(|error| override_err(name, error))?;
            }
        }
        Ok(())
    }
}

/// How to build one named plan: a seed followed by steps, applied in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlanRecipe {
    name: String,
    seed: PlanSeed,
    steps: Vec<PlanStep>,
}

impl PlanRecipe {
    /// Creates a recipe with no steps.
    pub fn new(name: impl Into<String>, seed: PlanSeed) -> Self {
        Self {
            name: name.into(),
            seed,
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends several steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = PlanStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Returns the plan name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the seed.
    pub fn seed(&self) -> PlanSeed {
        self.seed
    }

    /// Returns the steps.
    pub fn step_list(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Builds and resolves this plan over `pool`.
    pub fn build(&self, pool: &PackagePool) -> Result<ResolvedPlan, PlanConstructError> {
        let mut plan = TestPlan::new(pool.clone(), self.seed);
        for step in &self.steps {
            step.apply(&mut plan, &self.name)?;
        }
        Ok(plan.resolve())
    }
}

/// A pair of plans that split the pool between them: the flaky plan holds the quarantined
/// packages and the catalogued flaky tests, the stable plan holds everything else.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComplementRecipe {
    stable: String,
    flaky: String,
    quarantine: String,
}

impl ComplementRecipe {
    /// Creates a new recipe. `quarantine` is a package pattern.
    pub fn new(
        stable: impl Into<String>,
        flaky: impl Into<String>,
        quarantine: impl Into<String>,
    ) -> Self {
        Self {
            stable: stable.into(),
            flaky: flaky.into(),
            quarantine: quarantine.into(),
        }
    }

    /// Returns the name of the stable plan.
    pub fn stable_name(&self) -> &str {
        &self.stable
    }

    /// Returns the name of the flaky plan.
    pub fn flaky_name(&self) -> &str {
        &self.flaky
    }

    /// Returns the quarantine pattern.
    pub fn quarantine(&self) -> &str {
        &self.quarantine
    }

    fn quarantine_rule(&self) -> Result<FilterRule, PlanConstructError> {
        FilterRule::include(self.quarantine.as_str())
            .map_err(|error| pattern_err(&self.stable, error))
    }

    /// Builds both plans from one pass over `catalog`, then checks that they are complements.
    ///
    /// Returns `(stable, flaky)`.
    pub fn build(
        &self,
        pool: &PackagePool,
        catalog: &FlakyTestCatalog,
    ) -> Result<(ResolvedPlan, ResolvedPlan), PlanConstructError> {
        let quarantine = self.quarantine_rule()?;
        let mut builder = ComplementBuilder::new(self, pool);
        builder.quarantine(&quarantine)?;
        for (package, tests) in catalog.iter() {
            if quarantine.is_match(package) {
                // The flaky plan already owns the whole package.
                builder.stable_only(package, tests)?;
            } else {
                builder.split(package, tests)?;
            }
        }

        let (stable, flaky) = builder.resolve();
        self.verify(pool, catalog, &stable, &flaky)?;
        Ok((stable, flaky))
    }

    /// Checks that `stable` and `flaky` partition `pool`.
    ///
    /// Every catalogued test of a pool package must be selected by exactly one plan. For
    /// every pool package, exactly one plan must select the tests the catalog does not list,
    /// and that plan must be the flaky one iff the package matches the quarantine pattern.
    pub fn verify(
        &self,
        pool: &PackagePool,
        catalog: &FlakyTestCatalog,
        stable: &ResolvedPlan,
        flaky: &ResolvedPlan,
    ) -> Result<(), PlanConstructError> {
        let quarantine = self.quarantine_rule()?;
        let violation = |package: &str, test: Option<&str>, kind| ComplementViolation {
            stable: self.stable.clone(),
            flaky: self.flaky.clone(),
            package: package.to_owned(),
            test: test.map(str::to_owned),
            kind,
        };

        for (package, test) in catalog.pairs() {
            if !pool.contains(package) {
                continue;
            }
            match (
                stable.selects_test(package, test),
                flaky.selects_test(package, test),
            ) {
                (true, true) => {
                    return Err(violation(package, Some(test), ViolationKind::Overlap).into());
                }
                (false, false) => {
                    return Err(violation(package, Some(test), ViolationKind::Gap).into());
                }
                _ => {}
            }
        }

        for package in pool.iter() {
            let in_stable = stable.selects_unlisted(package);
            let in_flaky = flaky.selects_unlisted(package);
            let kind = match (in_stable, in_flaky) {
                (true, true) => Some(ViolationKind::Overlap),
                (false, false) => Some(ViolationKind::Gap),
                _ if in_flaky != quarantine.is_match(package) => Some(ViolationKind::Misassigned),
                _ => None,
            };
            if let Some(kind) = kind {
                return Err(violation(package, None, kind).into());
            }
        }

        debug!(
            stable = %self.stable,
            flaky = %self.flaky,
            "verified complement over {} packages",
            pool.len(),
        );
        Ok(())
    }
}

/// Emits each complement operation into both plans at once.
struct ComplementBuilder<'a> {
    recipe: &'a ComplementRecipe,
    stable: TestPlan,
    flaky: TestPlan,
}

impl<'a> ComplementBuilder<'a> {
    fn new(recipe: &'a ComplementRecipe, pool: &PackagePool) -> Self {
        Self {
            recipe,
            stable: TestPlan::new(pool.clone(), PlanSeed::All),
            flaky: TestPlan::new(pool.clone(), PlanSeed::All),
        }
    }

    fn quarantine(&mut self, rule: &FilterRule) -> Result<(), PlanConstructError> {
        let recipe = self.recipe;
        self.stable
            .exclude(rule.pattern())
            .map_err(|error| pattern_err(&recipe.stable, error))?;
        self.flaky
            .exclude(".*")
            .and_then(|plan| plan.include(rule.pattern()))
            .map_err(|error| pattern_err(&recipe.flaky, error))?;
        Ok(())
    }

    fn stable_only(
        &mut self,
        package: &str,
        tests: &BTreeSet<String>,
    ) -> Result<(), PlanConstructError> {
        let recipe = self.recipe;
        self.stable
            .exclude_tests(package, tests)
            .map_err(|error| override_err(&recipe.stable, error))?;
        Ok(())
    }

    fn split(&mut self, package: &str, tests: &BTreeSet<String>) -> Result<(), PlanConstructError> {
        let recipe = self.recipe;
        self.stable_only(package, tests)?;
        self.flaky
            .include(regex::escape(package))
            .map_err(|error| pattern_err(&recipe.flaky, error))?;
        self.flaky
            .include_tests(package, tests)
            .map_err(|error| override_err(&recipe.flaky, error))?;
        Ok(())
    }

    fn resolve(self) -> (ResolvedPlan, ResolvedPlan) {
        (self.stable.resolve(), self.flaky.resolve())
    }
}

fn pattern_err(plan: &str, error: PatternError) -> PlanConstructError {
    PlanConstructError::Pattern {
        plan: plan.to_owned(),
        error,
    }
}

fn override_err(plan: &str, error: TestOverrideError) -> PlanConstructError {
    PlanConstructError::TestOverride {
        plan: plan.to_owned(),
        error,
    }
}

/// The full set of plans to generate.
#[derive(Clone, Debug)]
pub struct PlanPolicy {
    recipes: Vec<PlanRecipe>,
    complement: Option<ComplementRecipe>,
    catalog: FlakyTestCatalog,
}

impl PlanPolicy {
    /// Creates a new policy, checking that plan names are unique.
    pub fn new(
        recipes: Vec<PlanRecipe>,
        complement: Option<ComplementRecipe>,
        catalog: FlakyTestCatalog,
    ) -> Result<Self, RecipeError> {
        let mut seen = BTreeSet::new();
        let complement_names = complement
            .iter()
            .flat_map(|c| [c.stable.as_str(), c.flaky.as_str()]);
        for name in recipes.iter().map(PlanRecipe::name).chain(complement_names) {
            if !seen.insert(name) {
                return Err(RecipeError::DuplicatePlan {
                    name: name.to_owned(),
                });
            }
        }

        Ok(Self {
            recipes,
            complement,
            catalog,
        })
    }

    /// Returns the recipes, in the order their plans are built.
    pub fn recipes(&self) -> &[PlanRecipe] {
        &self.recipes
    }

    /// Returns the complement pair, if any.
    pub fn complement(&self) -> Option<&ComplementRecipe> {
        self.complement.as_ref()
    }

    /// Returns the flaky test catalog.
    pub fn catalog(&self) -> &FlakyTestCatalog {
        &self.catalog
    }

    /// Builds every plan over `pool`.
    ///
    /// Nothing is written: a failure in any plan means no plan is produced.
    pub fn build(&self, pool: &PackagePool) -> Result<BuiltPlans, PlanConstructError> {
        let mut plans = Vec::with_capacity(self.recipes.len() + 2);
        for recipe in &self.recipes {
            let plan = recipe.build(pool)?;
            debug!("built plan {} with {} packages", recipe.name(), plan.len());
            plans.push(NamedPlan::new(recipe.name(), plan));
        }

        if let Some(complement) = &self.complement {
            let (stable, flaky) = complement.build(pool, &self.catalog)?;
            debug!(
                "built complement plans {} ({} packages) and {} ({} packages)",
                complement.stable,
                stable.len(),
                complement.flaky,
                flaky.len(),
            );
            plans.push(NamedPlan::new(&complement.stable, stable));
            plans.push(NamedPlan::new(&complement.flaky, flaky));
        }

        Ok(BuiltPlans { plans })
    }
}

/// A resolved plan and its name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamedPlan {
    /// The plan name; the document is written to `<name>.xml`.
    pub name: String,

    /// The resolved selection.
    pub plan: ResolvedPlan,
}

impl NamedPlan {
    fn new(name: impl Into<String>, plan: ResolvedPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }

    /// Returns the file name for this plan.
    pub fn file_name(&self) -> String {
        format!("{}.xml", self.name)
    }

    /// Summarizes this plan as written to `path`.
    pub fn summary(&self, path: &Utf8Path) -> PlanSummary {
        let mut restricted_count = 0;
        let mut excluded_test_count = 0;
        for (_, selection) in self.plan.iter() {
            match selection {
                PackageSelection::All => {}
                PackageSelection::AllExcept(tests) => excluded_test_count += tests.len(),
                PackageSelection::Only(_) => restricted_count += 1,
            }
        }
        PlanSummary {
            name: self.name.clone(),
            path: path.to_owned(),
            package_count: self.plan.len(),
            restricted_count,
            excluded_test_count,
        }
    }
}

/// Every plan produced by a [`PlanPolicy`], ready to be written.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuiltPlans {
    plans: Vec<NamedPlan>,
}

impl BuiltPlans {
    /// Returns the plans in build order.
    pub fn plans(&self) -> &[NamedPlan] {
        &self.plans
    }

    /// Returns the plan called `name`.
    pub fn get(&self, name: &str) -> Option<&ResolvedPlan> {
        self.plans
            .iter()
            .find(|plan| plan.name == name)
            .map(|plan| &plan.plan)
    }

    /// Writes every plan to `<plan_dir>/<name>.xml`.
    pub fn write_all(&self, plan_dir: &Utf8Path) -> Result<Vec<PlanSummary>, PlanWriteError> {
        let mut summaries = Vec::with_capacity(self.plans.len());
        for named in &self.plans {
            let path = plan_dir.join(named.file_name());
            named.plan.write(&path)?;
            info!("wrote plan {} ({} packages) to {path}", named.name, named.plan.len());
            summaries.push(named.summary(&path));
        }
        Ok(summaries)
    }
}
