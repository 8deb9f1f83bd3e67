//! Mesh Policy CLI
//!
//! Loads policy and dataplane documents, indexes the policies of each kind and prints the rules
//! resolved from them. Every command works on the same pipeline:
//!
//! ```text
//! [ files ] -> [ Documents ] -> [ Index<C> per kind ] -> [ PolicyRules<C> ] -> stdout
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;
mod kind;

pub use self::{
    args::{Args, Command, DirectionArg, LogFormat},
    kind::{visit_kind, KindVisitor},
};
use anyhow::{Context, Result};
use mesh_policy_api::{parse_documents, Document, Documents, PolicyConf};
use mesh_policy_core::{
    attachment::{self, Dataplane},
    Direction, Element, Subset,
};
use mesh_policy_index::{Index, IndexMetrics};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

/// Reads and converts every document in `paths`, in order.
pub fn load_documents(paths: &[impl AsRef<Path>]) -> Result<Documents> {
    let mut docs = Vec::<Document>::new();
    for path in paths {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let parsed = parse_documents(&input)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(path = %path.display(), documents = parsed.len(), "Loaded");
        docs.extend(parsed);
    }
    Documents::load(docs).context("invalid documents")
}

/// Indexes the policies of kind `C` and returns the index once its rules are built.
pub fn index<C: PolicyConf>(docs: &Documents, metrics: &IndexMetrics) -> Result<Index<C>> {
    let mut index = Index::new(C::KIND.as_str(), metrics.clone());
    index
        .reset(C::policies(docs).to_vec())
        .with_context(|| format!("failed to index {} policies", C::KIND))?;
    Ok(index)
}

/// Renders the rules of every direction for a policy kind. Kinds without policies render as
/// `None`.
pub struct RenderRules<'a> {
    pub docs: &'a Documents,
    pub metrics: &'a IndexMetrics,
}

/// Resolves the configuration a kind of policy gives to an assignment of tags.
pub struct ComputeRule<'a> {
    pub docs: &'a Documents,
    pub metrics: &'a IndexMetrics,
    pub direction: Direction,
    pub assignment: &'a Subset,

    /// Matches `assignment` as a concrete workload's tags, so that negated tags match workloads
    /// that don't carry the key at all.
    pub element: bool,
}

/// Groups a dataplane's attachment points by the policy of a kind that governs them.
pub struct InspectDataplane<'a> {
    pub docs: &'a Documents,
    pub metrics: &'a IndexMetrics,
    pub dataplane: &'a Dataplane,
}

// === impl RenderRules ===

impl KindVisitor for RenderRules<'_> {
    type Output = Result<Option<Value>>;

    fn visit<C: PolicyConf>(self) -> Self::Output {
        if C::policies(self.docs).is_empty() {
            return Ok(None);
        }
        let index = index::<C>(self.docs, self.metrics)?;
        let rules = index.rules_rx().borrow().clone();
        Ok(Some(json!({
            "generation": rules.generation,
            "from": &rules.from,
            "to": &rules.to,
        })))
    }
}

// === impl ComputeRule ===

impl KindVisitor for ComputeRule<'_> {
    type Output = Result<Value>;

    fn visit<C: PolicyConf>(self) -> Self::Output {
        let index = index::<C>(self.docs, self.metrics)?;
        let rules = index.rules();
        let rules = rules.rules(self.direction);

        let rule = if self.element {
            let element = element(self.assignment)?;
            rules.compute_element(&element)
        } else {
            rules.compute(self.assignment)
        };

        match rule {
            Some(rule) => {
                info!(cell = %rule.subset, "Resolved");
                Ok(serde_json::to_value(rule)?)
            }
            None => {
                info!(kind = %C::KIND, assignment = %self.assignment, "No rule applies");
                Ok(Value::Null)
            }
        }
    }
}

fn element(assignment: &Subset) -> Result<Element> {
    assignment
        .iter()
        .map(|tag| -> Result<(String, String)> {
            if tag.not {
                anyhow::bail!("concrete tags can't be negated: {tag}");
            }
            Ok((tag.key.clone(), tag.value.clone()))
        })
        .collect()
}

// === impl InspectDataplane ===

impl KindVisitor for InspectDataplane<'_> {
    type Output = Result<Value>;

    fn visit<C: PolicyConf>(self) -> Self::Output {
        let index = index::<C>(self.docs, self.metrics)?;
        let rules = index.rules();
        let grouped = attachment::group_by_policy(self.dataplane, &index.policies(), &rules.to);
        Ok(serde_json::to_value(grouped)?)
    }
}
