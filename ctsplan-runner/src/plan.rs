// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test plans: a package pool, an ordered rule log and per-test overrides.
//!
//! A [`TestPlan`] is built up by appending rules and registering overrides, then resolved
//! into a [`ResolvedPlan`]. Resolution consumes the plan, so a plan cannot change after it
//! has been written.

use crate::errors::{
    ConflictingOverrideError, PatternError, PlanReadError, PlanWriteError, TestOverrideError,
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::Utf8Path;
use cts_xml::{PlanDocument, PlanEntry};
use ctsplan_filtering::{PatternFilter, PlanSeed, RuleKind};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    sync::Arc,
};
use tracing::{trace, warn};

/// The master list of package names that every plan is built from.
///
/// Packages are kept sorted and unique. Cloning is cheap: clones share the same list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackagePool {
    packages: Arc<[String]>,
}

impl PackagePool {
    /// Creates a pool from package names, sorting them and dropping duplicates.
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages: BTreeSet<String> = packages.into_iter().map(Into::into).collect();
        Self {
            packages: packages.into_iter().collect(),
        }
    }

    /// Returns the number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns true if the pool has no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Returns true if `package` is in the pool.
    pub fn contains(&self, package: &str) -> bool {
        self.packages
            .binary_search_by(|p| p.as_str().cmp(package))
            .is_ok()
    }

    /// Iterates over the packages in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.packages.iter().map(String::as_str)
    }
}

/// Explicit per-test inclusions and exclusions for one package.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestOverrides {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl TestOverrides {
    /// The tests the package is restricted to, if any.
    pub fn include(&self) -> &BTreeSet<String> {
        &self.include
    }

    /// The tests carved out of the package.
    pub fn exclude(&self) -> &BTreeSet<String> {
        &self.exclude
    }

    fn tests(&self, kind: RuleKind) -> &BTreeSet<String> {
        match kind {
            RuleKind::Include => &self.include,
            RuleKind::Exclude => &self.exclude,
        }
    }

    fn tests_mut(&mut self, kind: RuleKind) -> &mut BTreeSet<String> {
        match kind {
            RuleKind::Include => &mut self.include,
            RuleKind::Exclude => &mut self.exclude,
        }
    }

    fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// A plan under construction.
#[derive(Clone, Debug)]
pub struct TestPlan {
    pool: PackagePool,
    filter: PatternFilter,
    overrides: BTreeMap<String, TestOverrides>,
}

impl TestPlan {
    /// Creates a plan over `pool` where every package starts out as `seed` says.
    pub fn new(pool: PackagePool, seed: PlanSeed) -> Self {
        Self {
            pool,
            filter: PatternFilter::new(seed),
            overrides: BTreeMap::new(),
        }
    }

    /// Returns the pool this plan selects from.
    pub fn pool(&self) -> &PackagePool {
        &self.pool
    }

    /// Returns the package-level rule log.
    pub fn filter(&self) -> &PatternFilter {
        &self.filter
    }

    /// Returns the overrides registered for `package`.
    pub fn overrides(&self, package: &str) -> Option<&TestOverrides> {
        self.overrides.get(package)
    }

    /// Appends a rule that includes every package matching `pattern`.
    pub fn include(&mut self, pattern: impl Into<String>) -> Result<&mut Self, PatternError> {
        self.filter.include(pattern)?;
        Ok(self)
    }

    /// Appends a rule that excludes every package matching `pattern`.
    pub fn exclude(&mut self, pattern: impl Into<String>) -> Result<&mut Self, PatternError> {
        self.filter.exclude(pattern)?;
        Ok(self)
    }

    /// Restricts `package` to exactly `tests`, whether or not the package itself is included.
    ///
    /// Replaces any earlier list. An empty list removes the restriction. Test names must be
    /// non-empty and must not contain [`PlanEntry::TEST_SEPARATOR`].
    pub fn include_tests<I, S>(
        &mut self,
        package: &str,
        tests: I,
    ) -> Result<&mut Self, TestOverrideError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_overrides(package, RuleKind::Include, tests)
    }

    /// Leaves `tests` out of `package` when the package is included.
    ///
    /// Replaces any earlier list. An empty list removes the exclusions.
    pub fn exclude_tests<I, S>(
        &mut self,
        package: &str,
        tests: I,
    ) -> Result<&mut Self, TestOverrideError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_overrides(package, RuleKind::Exclude, tests)
    }

    fn set_overrides<I, S>(
        &mut self,
        package: &str,
        kind: RuleKind,
        tests: I,
    ) -> Result<&mut Self, TestOverrideError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tests: BTreeSet<String> = tests.into_iter().map(Into::into).collect();
        if let Some(error) = tests.iter().find_map(|test| invalid_test_name(package, test)) {
            return Err(error);
        }

        if let Some(existing) = self.overrides.get(package) {
            let conflicts: Vec<String> = tests
                .intersection(existing.tests(kind.inverse()))
                .cloned()
                .collect();
            if !conflicts.is_empty() {
                return Err(ConflictingOverrideError::new(package, conflicts).into());
            }
        }

        if tests.is_empty() {
            if let Some(existing) = self.overrides.get_mut(package) {
                existing.tests_mut(kind).clear();
                if existing.is_empty() {
                    self.overrides.remove(package);
                }
            }
            return Ok(self);
        }

        if !self.pool.contains(package) {
            warn!(
                "{kind} override for package `{package}` ignored: \
                 package is not in the pool"
            );
        }
        *self
            .overrides
            .entry(package.to_owned())
            .or_default()
            .tests_mut(kind) = tests;
        Ok(self)
    }

    /// Replays the rule log and the overrides over every package in the pool.
    pub fn resolve(mut self) -> ResolvedPlan {
        let mut packages = BTreeMap::new();
        for package in self.pool.iter() {
            let decided = self.filter.filter_match(package);
            let overrides = self.overrides.remove(package).unwrap_or_default();
            let selection = if !overrides.include.is_empty() {
                Some(PackageSelection::Only(overrides.include))
            } else if decided.is_match() {
                Some(PackageSelection::all_except(overrides.exclude))
            } else {
                None
            };
            trace!(package, ?decided, ?selection, "resolved package");
            if let Some(selection) = selection {
                packages.insert(package.to_owned(), selection);
            }
        }
        ResolvedPlan { packages }
    }

    /// Resolves the plan and writes it to `path`.
    pub fn write(self, path: &Utf8Path) -> Result<ResolvedPlan, PlanWriteError> {
        let resolved = self.resolve();
        resolved.write(path)?;
        Ok(resolved)
    }
}

// A name that is empty or contains the separator would not read back from the document.
fn invalid_test_name(package: &str, test: &str) -> Option<TestOverrideError> {
    let reason = if test.is_empty() {
        "test names must not be empty"
    } else if test.contains(PlanEntry::TEST_SEPARATOR) {
        "test names must not contain `;`"
    } else {
        return None;
    };
    Some(TestOverrideError::InvalidTestName {
        package: package.to_owned(),
        test: test.to_owned(),
        reason,
    })
}

/// Which tests of a package a resolved plan selects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PackageSelection {
    /// Every test.
    All,

    /// Every test except these.
    AllExcept(BTreeSet<String>),

    /// Exactly these tests.
    Only(BTreeSet<String>),
}

impl PackageSelection {
    fn all_except(tests: BTreeSet<String>) -> Self {
        if tests.is_empty() {
            Self::All
        } else {
            Self::AllExcept(tests)
        }
    }

    /// Returns true if `test` is selected.
    pub fn selects(&self, test: &str) -> bool {
        match self {
            Self::All => true,
            Self::AllExcept(tests) => !tests.contains(test),
            Self::Only(tests) => tests.contains(test),
        }
    }

    /// Returns true if tests that this selection does not name are selected.
    pub fn selects_unlisted(&self) -> bool {
        !matches!(self, Self::Only(_))
    }

    fn to_entry(&self, package: &str) -> PlanEntry {
        let mut entry = PlanEntry::new(package);
        match self {
            Self::All => {}
            Self::AllExcept(tests) => {
                entry.set_exclude(tests);
            }
            Self::Only(tests) => {
                entry.set_include(tests);
            }
        }
        entry
    }

    fn from_entry(entry: &PlanEntry) -> Self {
        if !entry.include.is_empty() {
            Self::Only(entry.include.iter().cloned().collect())
        } else {
            Self::all_except(entry.exclude.iter().cloned().collect())
        }
    }
}

/// A plan that has been resolved against its pool. Only selected packages are present.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvedPlan {
    packages: BTreeMap<String, PackageSelection>,
}

impl ResolvedPlan {
    /// Returns the number of selected packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns true if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterates over the selected packages in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PackageSelection)> + '_ {
        self.packages
            .iter()
            .map(|(package, selection)| (package.as_str(), selection))
    }

    /// Returns the selection for `package`, or `None` if nothing in it is selected.
    pub fn selection(&self, package: &str) -> Option<&PackageSelection> {
        self.packages.get(package)
    }

    /// Returns true if at least one test of `package` may be selected.
    pub fn selects_package(&self, package: &str) -> bool {
        self.packages.contains_key(package)
    }

    /// Returns true if `test` in `package` is selected.
    pub fn selects_test(&self, package: &str, test: &str) -> bool {
        self.selection(package)
            .is_some_and(|selection| selection.selects(test))
    }

    /// Returns true if the tests of `package` that no override names are selected.
    pub fn selects_unlisted(&self, package: &str) -> bool {
        self.selection(package)
            .is_some_and(PackageSelection::selects_unlisted)
    }

    /// Converts this plan into its document form.
    pub fn to_document(&self) -> PlanDocument {
        let mut document = PlanDocument::new();
        document.add_entries(
            self.packages
                .iter()
                .map(|(package, selection)| selection.to_entry(package)),
        );
        document
    }

    /// Reads a plan back from its document form.
    ///
    /// If a package appears more than once, the last entry wins.
    pub fn from_document(document: &PlanDocument) -> Self {
        let packages = document
            .entries
            .iter()
            .map(|entry| (entry.name.clone(), PackageSelection::from_entry(entry)))
            .collect();
        Self { packages }
    }

    /// Writes this plan to `path`, replacing any existing file atomically.
    ///
    /// The parent directory is created if necessary.
    pub fn write(&self, path: &Utf8Path) -> Result<(), PlanWriteError> {
        let bytes = self
            .to_document()
            .to_bytes()
            .map_err(|error| PlanWriteError::Serialize {
                path: path.to_owned(),
                error,
            })?;

        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|error| PlanWriteError::CreateDir {
                path: parent.to_owned(),
                error,
            })?;
        }

        let file = AtomicFile::new(path, OverwriteBehavior::AllowOverwrite);
        file.write(|f| f.write_all(&bytes))
            .map_err(|error| PlanWriteError::Write {
                path: path.to_owned(),
                error: match error {
                    atomicwrites::Error::Internal(err) => err,
                    atomicwrites::Error::User(err) => err,
                },
            })
    }

    /// Reads a plan document from `path`.
    pub fn read(path: &Utf8Path) -> Result<Self, PlanReadError> {
        let contents = fs::read_to_string(path).map_err(|error| PlanReadError::Read {
            path: path.to_owned(),
            error,
        })?;
        let document = PlanDocument::parse(&contents).map_err(|error| PlanReadError::Parse {
            path: path.to_owned(),
            error,
        })?;
        Ok(Self::from_document(&document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;
    use test_strategy::proptest;

    fn pool() -> PackagePool {
        PackagePool::new(["android.security", "android.app", "android.display"])
    }

    #[test]
    fn pool_is_sorted_and_unique() {
        let pool = PackagePool::new(["b", "a", "b", "c"]);
        assert_eq!(pool.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(pool.contains("b"));
        assert!(!pool.contains("d"));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn exclude_after_include_excludes() {
        let mut plan = TestPlan::new(pool(), PlanSeed::Empty);
        plan.include("android\\.app")
            .unwrap()
            .exclude("android\\.app")
            .unwrap();
        assert!(!plan.resolve().selects_package("android.app"));

        let mut plan = TestPlan::new(pool(), PlanSeed::Empty);
        plan.exclude("android\\.app")
            .unwrap()
            .include("android\\.app")
            .unwrap();
        assert!(plan.resolve().selects_package("android.app"));
    }

    #[test]
    fn include_override_pulls_tests_from_excluded_package() {
        let mut plan = TestPlan::new(pool(), PlanSeed::Empty);
        plan.include_tests("android.app", ["cts.T1"]).unwrap();
        let resolved = plan.resolve();

        assert!(resolved.selects_test("android.app", "cts.T1"));
        assert!(!resolved.selects_test("android.app", "cts.T2"));
        assert!(!resolved.selects_unlisted("android.app"));
        assert!(!resolved.selects_package("android.security"));
    }

    #[test]
    fn include_override_restricts_included_package() {
        let mut plan = TestPlan::new(pool(), PlanSeed::All);
        plan.include_tests("android.app", ["cts.T1", "cts.T2"])
            .unwrap();
        let resolved = plan.resolve();
        assert_eq!(
            resolved.selection("android.app"),
            Some(&PackageSelection::Only(btreeset! {
                "cts.T1".to_owned(),
                "cts.T2".to_owned(),
            }))
        );
        assert_eq!(
            resolved.selection("android.security"),
            Some(&PackageSelection::All)
        );
    }

    #[test]
    fn exclude_override_carves_out_tests() {
        let mut plan = TestPlan::new(pool(), PlanSeed::All);
        plan.exclude_tests("android.app", ["cts.T1"]).unwrap();
        let resolved = plan.resolve();
        assert!(!resolved.selects_test("android.app", "cts.T1"));
        assert!(resolved.selects_test("android.app", "cts.T2"));
        assert!(resolved.selects_unlisted("android.app"));
    }

    #[test]
    fn exclude_override_on_excluded_package_selects_nothing() {
        let mut plan = TestPlan::new(pool(), PlanSeed::Empty);
        plan.exclude_tests("android.app", ["cts.T1"]).unwrap();
        assert!(plan.resolve().is_empty());
    }

    #[test]
    fn conflicting_overrides_are_rejected() {
        let mut plan = TestPlan::new(pool(), PlanSeed::All);
        plan.exclude_tests("android.app", ["cts.T1", "cts.T2"])
            .unwrap();
        let err = plan
            .include_tests("android.app", ["cts.T2", "cts.T3"])
            .unwrap_err();
        assert_eq!(err.package(), "android.app");
        let TestOverrideError::Conflicting(err) = err else {
            panic!("expected a conflict, got {err:?}");
        };
        assert_eq!(err.tests(), ["cts.T2".to_owned()]);

        // The plan is unchanged.
        let overrides = plan.overrides("android.app").unwrap();
        assert!(overrides.include().is_empty());
        assert_eq!(overrides.exclude().len(), 2);
    }

    #[test_case(""; "empty name")]
    #[test_case("cts.T1;cts.T2"; "name with separator")]
    fn unwritable_test_names_are_rejected(test: &str) {
        let mut plan = TestPlan::new(pool(), PlanSeed::All);
        plan.exclude_tests("android.app", ["cts.T3"]).unwrap();

        let err = plan
            .include_tests("android.app", ["cts.T1", test])
            .unwrap_err();
        assert!(
            matches!(
                &err,
                TestOverrideError::InvalidTestName { package, test: name, .. }
                    if package == "android.app" && name == test
            ),
            "{err:?}"
        );
        plan.exclude_tests("android.display", [test]).unwrap_err();

        // The plan is unchanged.
        assert_eq!(
            plan.overrides("android.app").unwrap().exclude(),
            &btreeset! {"cts.T3".to_owned()}
        );
        assert!(plan.overrides("android.app").unwrap().include().is_empty());
        assert_eq!(plan.overrides("android.display"), None);
    }

    #[test]
    fn later_override_replaces_and_empty_clears() {
        let mut plan = TestPlan::new(pool(), PlanSeed::All);
        plan.exclude_tests("android.app", ["cts.T1"]).unwrap();
        plan.exclude_tests("android.app", ["cts.T2"]).unwrap();
        assert_eq!(
            plan.overrides("android.app").unwrap().exclude(),
            &btreeset! {"cts.T2".to_owned()}
        );

        plan.exclude_tests("android.app", Vec::<String>::new())
            .unwrap();
        assert_eq!(plan.overrides("android.app"), None);
    }

    #[test]
    fn overrides_outside_pool_are_not_resolved() {
        let mut plan = TestPlan::new(pool(), PlanSeed::All);
        plan.include_tests("com.example.missing", ["cts.T1"])
            .unwrap();
        let resolved = plan.resolve();
        assert!(!resolved.selects_package("com.example.missing"));
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn write_then_read_recovers_selection() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("plans").join("CTS.xml");

        let mut plan = TestPlan::new(pool(), PlanSeed::All);
        plan.exclude("android\\.display")
            .unwrap()
            .exclude_tests("android.app", ["cts.T2", "cts.T1", "cts.T1"])
            .unwrap();
        let resolved = plan.write(&path).expect("write succeeds");

        let contents = fs::read_to_string(&path).unwrap();
        assert!(
            contents.contains(r#"<Entry name="android.app" exclude="cts.T1;cts.T2"/>"#),
            "{contents}"
        );
        assert!(!contents.contains("android.display"));
        assert_eq!(ResolvedPlan::read(&path).unwrap(), resolved);

        // Writing again gives the same bytes.
        resolved.write(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), contents);
    }

    fn test_name() -> impl Strategy<Value = String> {
        "cts\\.[A-Z][a-z]{0,4}Test#test[A-Z][a-z]{0,4}"
    }

    // Mostly valid names, with the occasional one that cannot be written to a document.
    fn any_test_name() -> impl Strategy<Value = String> {
        prop_oneof![
            8 => test_name(),
            1 => Just(String::new()),
            1 => "cts\\.[A-Z][a-z]{0,4};[a-z]{0,4}",
        ]
    }

    fn package_name() -> impl Strategy<Value = String> {
        "android\\.[a-z]{1,6}"
    }

    #[proptest]
    fn document_round_trip(
        #[strategy(proptest::collection::btree_set(package_name(), 1..6))] packages: BTreeSet<
            String,
        >,
        #[strategy(proptest::collection::vec((any::<u8>(), proptest::collection::btree_set(any_test_name(), 0..4)), 6))]
        overrides: Vec<(u8, BTreeSet<String>)>,
    ) {
        let pool = PackagePool::new(packages.iter().cloned());
        let mut plan = TestPlan::new(pool, PlanSeed::All);
        for (package, (choice, tests)) in packages.iter().zip(&overrides) {
            let writable = tests
                .iter()
                .all(|test| !test.is_empty() && !test.contains(PlanEntry::TEST_SEPARATOR));
            let result = match choice % 3 {
                0 => plan.include_tests(package, tests).map(|_| ()),
                1 => plan.exclude_tests(package, tests).map(|_| ()),
                _ => {
                    plan.exclude(regex::escape(package)).unwrap();
                    continue;
                }
            };
            if writable {
                prop_assert!(result.is_ok(), "{result:?}");
            } else {
                prop_assert!(
                    matches!(result, Err(TestOverrideError::InvalidTestName { .. })),
                    "{result:?}"
                );
                prop_assert_eq!(plan.overrides(package), None);
            }
        }
        let resolved = plan.resolve();
        let xml = resolved.to_document().to_string().unwrap();
        let parsed = PlanDocument::parse(&xml).unwrap();
        prop_assert_eq!(ResolvedPlan::from_document(&parsed), resolved);
    }
}
