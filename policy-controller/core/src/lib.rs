//! Mesh policy engine
//!
//! Policies select groups of mesh participants with tag predicates. Because selectors overlap, a
//! single proxy may be selected by many policies at once; the engine resolves that overlap ahead of
//! time by partitioning the tag-predicate space into mutually exclusive cells, each carrying the
//! configuration that applies to any participant falling into it:
//!
//! ```text
//! [ PolicyItem ]* -> [ SubsetIter cells ] -> [ merge_confs per cell ] -> [ Rules ] -> compute(tags)
//! ```
//!
//! Rules are ordered by specificity (the number of positive tags in the cell), so a lookup is a
//! linear scan returning the first cell that matches the observed tags.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod attachment;
pub mod merge;
pub mod policy;
pub mod rules;
pub mod subset;

pub use self::{
    merge::{merge_confs, Conf},
    policy::{
        sort_by_target_ref, Direction, Policy, PolicyEntry, PolicyItem, ResourceId, SelectorError,
        TargetKind, TargetRef,
    },
    rules::{BuildReport, BuiltRules, Rule, Rules},
    subset::{Element, Subset, SubsetIter, Tag},
};

/// The tag carrying a participant's service name.
pub const SERVICE_TAG: &str = "mesh.io/service";
