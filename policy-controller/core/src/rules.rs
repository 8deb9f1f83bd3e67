use crate::{
    merge::{self, merge_confs, Conf},
    policy::{PolicyItem, ResourceId},
    subset::{Element, Subset, SubsetIter, Tag},
};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::{debug, trace, warn};


/// The configuration resolved for one cell of the tag-predicate space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule<C> {
    pub subset: Subset,
    pub conf: C,

    /// Policies that contributed to `conf`, in merge order.
    pub origin: Vec<ResourceId>,
}

/// Rules ordered from the most to the least specific cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rules<C>(Vec<Rule<C>>);

#[derive(Clone, Debug, PartialEq)]
pub struct BuiltRules<C> {
    pub rules: Rules<C>,
    pub report: BuildReport,
}

/// Describes what was dropped while building rules.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Cells enumerated over the candidate tags.
    pub cells: usize,

    /// Sign combinations skipped because they pinned a key to several values.
    pub contradictions: usize,

    /// Cells that no item selects.
    pub unmatched: usize,

    /// Items whose selector can't be expressed as tags.
    pub rejected: usize,
}

/// Builds rules from policy items, given in increasing order of precedence.
///
/// Items whose selectors can't be expressed as tags are skipped and counted in the report. A
/// failure to merge configurations fails the whole build.
pub fn build<C: Conf>(items: &[PolicyItem<C>]) -> Result<BuiltRules<C>, merge::Error> {
    let mut report = BuildReport::default();

    let mut selected = Vec::with_capacity(items.len());
    for item in items {
        match item.target_ref.as_subset() {
            Ok(subset) => selected.push((subset, item)),
            Err(error) => {
                warn!(%error, policy = %item.origin, "Skipping policy item");
                report.rejected += 1;
            }
        }
    }

    let mut tags = selected
        .iter()
        .flat_map(|(subset, _)| subset.iter().cloned())
        .collect::<Vec<Tag>>();
    tags.sort();
    tags.dedup();

    let mut rules = Vec::new();
    if !selected.is_empty() {
        let mut cells = SubsetIter::new(tags);
        for cell in cells.by_ref() {
            report.cells += 1;

            let matched = selected
                .iter()
                .filter(|(subset, _)| subset.is_subset(&cell))
                .map(|(_, item)| *item)
                .collect::<Vec<_>>();
            if matched.is_empty() {
                trace!(%cell, "No items select cell");
                report.unmatched += 1;
                continue;
            }

            let conf = merge_confs(matched.iter().copied().map(|item| &item.conf))?;
            let mut origin = Vec::<ResourceId>::with_capacity(matched.len());
            for item in &matched {
                if !origin.contains(&item.origin) {
                    origin.push(item.origin.clone());
                }
            }
            trace!(%cell, items = matched.len(), "Merged cell");
            rules.push(Rule {
                subset: cell,
                conf,
                origin,
            });
        }
        report.contradictions = cells.contradictions();
    }

    // Stable, so equally specific cells keep their enumeration order.
    rules.sort_by_key(|rule| Reverse(rule.subset.num_positive()));

    debug!(
        rules = rules.len(),
        cells = report.cells,
        contradictions = report.contradictions,
        unmatched = report.unmatched,
        rejected = report.rejected,
        "Built rules"
    );
    Ok(BuiltRules {
        rules: Rules(rules),
        report,
    })
}

// === impl Rules ===

impl<C> Default for Rules<C> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<C> Rules<C> {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule<C>> {
        self.0.iter()
    }

    /// Returns the first rule whose cell `assignment` falls in.
    ///
    /// Keys the assignment doesn't mention satisfy only negated tags, so built rules always end
    /// with a cell that matches any assignment. `None` means no policy applies to it at all.
    pub fn compute(&self, assignment: &Subset) -> Option<&Rule<C>> {
        self.iter().find(|rule| rule.subset.matches_assignment(assignment))
    }

    pub fn compute_conf(&self, assignment: &Subset) -> Option<&C> {
        self.compute(assignment).map(|rule| &rule.conf)
    }

    /// Returns the first rule whose cell contains the concrete `element`.
    pub fn compute_element(&self, element: &Element) -> Option<&Rule<C>> {
        self.iter().find(|rule| rule.subset.contains_element(element))
    }
}

impl<C> From<Vec<Rule<C>>> for Rules<C> {
    /// Wraps rules that are already ordered by precedence.
    fn from(rules: Vec<Rule<C>>) -> Self {
        Self(rules)
    }
}

impl<'r, C> IntoIterator for &'r Rules<C> {
    type Item = &'r Rule<C>;
    type IntoIter = std::slice::Iter<'r, Rule<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
