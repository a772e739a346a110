// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered include/exclude rules used to decide which packages belong to a test plan.
//!
//! A [`PatternFilter`] starts from a [`PlanSeed`] and replays its [`FilterRule`]s in insertion
//! order. Every rule whose pattern fully matches an identifier overwrites the membership
//! decided so far, so the last matching rule wins.

pub mod errors;
mod filter;

pub use filter::{FilterMatch, FilterRule, PatternFilter, PlanSeed, RuleKind, matches};
