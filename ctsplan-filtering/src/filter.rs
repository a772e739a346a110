// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::PatternError;
use regex::Regex;
use serde::Deserialize;
use std::fmt;

/// The membership every identifier has before any rule is applied.
///
/// In configuration, this is written as `"all"` or `"empty"`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanSeed {
    /// Every identifier starts out included.
    ///
    /// This is the default: most plans start from the whole pool and narrow it down.
    #[default]
    All,

    /// Every identifier starts out excluded.
    Empty,
}

impl PlanSeed {
    /// Returns the membership this seed grants.
    pub fn is_included(self) -> bool {
        match self {
            PlanSeed::All => true,
            PlanSeed::Empty => false,
        }
    }
}

impl fmt::Display for PlanSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanSeed::All => write!(f, "all"),
            PlanSeed::Empty => write!(f, "empty"),
        }
    }
}

/// Whether a rule adds or removes the identifiers it matches.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RuleKind {
    /// Matching identifiers become members.
    Include,

    /// Matching identifiers stop being members.
    Exclude,
}

impl RuleKind {
    /// Returns the membership a match of this kind produces.
    pub fn is_include(self) -> bool {
        matches!(self, RuleKind::Include)
    }

    /// Returns the opposite kind.
    pub fn inverse(self) -> Self {
        match self {
            RuleKind::Include => RuleKind::Exclude,
            RuleKind::Exclude => RuleKind::Include,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Include => write!(f, "include"),
            RuleKind::Exclude => write!(f, "exclude"),
        }
    }
}

/// A single include or exclude rule.
///
/// The pattern is matched against the whole identifier: `android\.app` matches `android.app`
/// but not `android.apps`.
#[derive(Clone, Debug)]
pub struct FilterRule {
    kind: RuleKind,
    pattern: String,
    regex: Regex,
}

impl FilterRule {
    /// Compiles a new rule, failing immediately if `pattern` is not a valid regex.
    pub fn new(kind: RuleKind, pattern: impl Into<String>) -> Result<Self, PatternError> {
        let pattern = pattern.into();
        // Validate the pattern on its own first: wrapping it in a group can hide stray
        // parentheses.
        if let Err(err) = Regex::new(&pattern) {
            return Err(PatternError::new(&pattern, err));
        }
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|err| PatternError::new(&pattern, err))?;
        Ok(Self {
            kind,
            pattern,
            regex,
        })
    }

    /// Shorthand for an include rule.
    pub fn include(pattern: impl Into<String>) -> Result<Self, PatternError> {
        Self::new(RuleKind::Include, pattern)
    }

    /// Shorthand for an exclude rule.
    pub fn exclude(pattern: impl Into<String>) -> Result<Self, PatternError> {
        Self::new(RuleKind::Exclude, pattern)
    }

    /// Returns the kind of this rule.
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// Returns the pattern as it was supplied.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns true if the pattern matches all of `identifier`.
    pub fn is_match(&self, identifier: &str) -> bool {
        self.regex.is_match(identifier)
    }
}

impl PartialEq for FilterRule {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.pattern == other.pattern
    }
}

impl Eq for FilterRule {}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.pattern)
    }
}

/// Evaluates `identifier` against `rules` starting from an excluded state.
///
/// Every rule is evaluated; the last one that matches decides.
pub fn matches(identifier: &str, rules: &[FilterRule]) -> bool {
    rules.iter().fold(false, |member, rule| {
        if rule.is_match(identifier) {
            rule.kind.is_include()
        } else {
            member
        }
    })
}

/// Describes what decided an identifier's membership.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterMatch {
    /// No rule matched: the seed decided.
    Seed(PlanSeed),

    /// The rule at `index` was the last one to match.
    Rule {
        /// Position of the rule in the log.
        index: usize,
        /// The kind of that rule.
        kind: RuleKind,
    },
}

impl FilterMatch {
    /// Returns true if the identifier ends up included.
    pub fn is_match(&self) -> bool {
        match self {
            FilterMatch::Seed(seed) => seed.is_included(),
            FilterMatch::Rule { kind, .. } => kind.is_include(),
        }
    }
}

/// An append-only log of rules on top of a seed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PatternFilter {
    seed: PlanSeed,
    rules: Vec<FilterRule>,
}

impl PatternFilter {
    /// Creates a filter with no rules.
    pub fn new(seed: PlanSeed) -> Self {
        Self {
            seed,
            rules: Vec::new(),
        }
    }

    /// Returns the seed.
    pub fn seed(&self) -> PlanSeed {
        self.seed
    }

    /// Returns the rules in the order they were added.
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Appends a rule.
    pub fn push(&mut self, rule: FilterRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Compiles and appends an include rule.
    pub fn include(&mut self, pattern: impl Into<String>) -> Result<&mut Self, PatternError> {
        let rule = FilterRule::include(pattern)?;
        Ok(self.push(rule))
    }

    /// Compiles and appends an exclude rule.
    pub fn exclude(&mut self, pattern: impl Into<String>) -> Result<&mut Self, PatternError> {
        let rule = FilterRule::exclude(pattern)?;
        Ok(self.push(rule))
    }

    /// Returns true if `identifier` is a member after replaying every rule.
    pub fn matches(&self, identifier: &str) -> bool {
        self.filter_match(identifier).is_match()
    }

    /// Returns what decided the membership of `identifier`.
    pub fn filter_match(&self, identifier: &str) -> FilterMatch {
        self.rules
            .iter()
            .enumerate()
            .fold(FilterMatch::Seed(self.seed), |decided, (index, rule)| {
                if rule.is_match(identifier) {
                    FilterMatch::Rule {
                        index,
                        kind: rule.kind,
                    }
                } else {
                    decided
                }
            })
    }
}
