// Copyright (c) The ctsplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for `ctsplan`: generating package descriptions, discovering the
//! package pool and building the named test plans from it.
//!
//! The flow is strictly sequential:
//!
//! 1. [`generator::DescriptionGenerator`] runs every [`description::DescriptionTask`] and
//!    waits for all of them.
//! 2. [`discovery::discover_packages`] reads the descriptions back into a
//!    [`plan::PackagePool`].
//! 3. [`policy::PlanPolicy::build`] builds and verifies every plan, and
//!    [`policy::BuiltPlans::write_all`] writes them out.

pub mod catalog;
pub mod config;
pub mod description;
pub mod discovery;
pub mod errors;
pub mod generator;
pub mod makefile;
pub mod plan;
pub mod policy;
pub mod repository;

pub use ctsplan_filtering::{FilterRule, PatternFilter, PlanSeed, RuleKind};
