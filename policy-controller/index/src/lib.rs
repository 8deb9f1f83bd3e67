//! Mesh Policy Index
//!
//! An index holds every policy resource of a single kind. Whenever a policy is applied or
//! deleted, the index rebuilds the rules for both traffic directions and publishes them on a watch
//! channel:
//!
//! ```text
//! [ Policy ] -> [ PolicyItem (from) ] -> [ Rules (from) ] \
//!            \                                             -> watch::Receiver<PolicyRules>
//!             -> [ PolicyItem (to) ]   -> [ Rules (to) ]   /
//! ```
//!
//! Policies are ordered from the least to the most specific top-level selector before their items
//! are merged, so a policy's position in the index never depends on the order of updates.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod metrics;

#[cfg(test)]
mod tests;

pub use self::metrics::IndexMetrics;
use ahash::AHashMap as HashMap;
use mesh_policy_core::{
    merge, rules, sort_by_target_ref, BuiltRules, Conf, Direction, Policy, ResourceId, Rules,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

pub type SharedIndex<C> = Arc<RwLock<Index<C>>>;

/// Watches the rules built from an index.
pub type RulesRx<C> = watch::Receiver<Arc<PolicyRules<C>>>;

type RulesTx<C> = watch::Sender<Arc<PolicyRules<C>>>;

/// Rules built from every policy in an index.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyRules<C> {
    /// Incremented each time a changed set of rules is published.
    pub generation: u64,
    pub from: Rules<C>,
    pub to: Rules<C>,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to build {direction} rules")]
pub struct BuildError {
    pub direction: Direction,
    #[source]
    pub source: merge::Error,
}

/// Holds the policies of one kind. Owned by a single writer; readers watch the published rules.
pub struct Index<C> {
    kind: &'static str,
    policies: HashMap<ResourceId, Policy<C>>,
    rules_tx: RulesTx<C>,
    rules_rx: RulesRx<C>,
    metrics: IndexMetrics,
}

// === impl PolicyRules ===

impl<C> PolicyRules<C> {
    pub fn rules(&self, direction: Direction) -> &Rules<C> {
        match direction {
            Direction::From => &self.from,
            Direction::To => &self.to,
        }
    }
}

impl<C> Default for PolicyRules<C> {
    fn default() -> Self {
        Self {
            generation: 0,
            from: Rules::default(),
            to: Rules::default(),
        }
    }
}

// === impl Index ===

impl<C> Index<C>
where
    C: Conf + Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(kind: &'static str, metrics: IndexMetrics) -> Self {
        let (rules_tx, rules_rx) = watch::channel(Arc::new(PolicyRules::default()));
        Self {
            kind,
            policies: HashMap::default(),
            rules_tx,
            rules_rx,
            metrics,
        }
    }

    pub fn shared(kind: &'static str, metrics: IndexMetrics) -> SharedIndex<C> {
        Arc::new(RwLock::new(Self::new(kind, metrics)))
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Policy<C>> {
        self.policies.get(id)
    }

    /// Returns the indexed policies from the least to the most specific.
    pub fn policies(&self) -> Vec<Policy<C>> {
        let mut policies = self.policies.values().cloned().collect::<Vec<_>>();
        sort_by_target_ref(&mut policies);
        policies
    }

    pub fn rules_rx(&self) -> RulesRx<C> {
        self.rules_rx.clone()
    }

    /// The most recently published rules.
    pub fn rules(&self) -> Arc<PolicyRules<C>> {
        self.rules_rx.borrow().clone()
    }

    /// Adds or replaces a policy.
    ///
    /// If rules can't be built, the previously published rules are kept and the error is
    /// returned. The policy stays in the index.
    #[instrument(skip_all, fields(kind = %self.kind, policy = %policy.id))]
    pub fn apply(&mut self, policy: Policy<C>) -> Result<(), BuildError> {
        if self.policies.get(&policy.id) == Some(&policy) {
            self.metrics.applied(self.kind, self.policies.len());
            debug!("Policy unchanged");
            return Ok(());
        }

        self.policies.insert(policy.id.clone(), policy);
        self.metrics.applied(self.kind, self.policies.len());
        self.rebuild()
    }

    #[instrument(skip_all, fields(kind = %self.kind, policy = %id))]
    pub fn delete(&mut self, id: &ResourceId) -> Result<(), BuildError> {
        let removed = self.policies.remove(id);
        self.metrics.deleted(self.kind, self.policies.len());
        if removed.is_none() {
            debug!("Policy not indexed");
            return Ok(());
        }
        self.rebuild()
    }

    /// Replaces the contents of the index.
    #[instrument(skip_all, fields(kind = %self.kind))]
    pub fn reset(&mut self, policies: Vec<Policy<C>>) -> Result<(), BuildError> {
        self.policies = policies
            .into_iter()
            .map(|policy| (policy.id.clone(), policy))
            .collect();
        self.metrics.reset(self.kind, self.policies.len());
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<(), BuildError> {
        self.metrics.rebuilt(self.kind);

        let policies = self.policies();
        let built = Self::build(&policies, Direction::From)
            .and_then(|from| Ok((from, Self::build(&policies, Direction::To)?)));
        let (from, to) = match built {
            Ok(rules) => rules,
            Err(error) => {
                warn!(%error, "Keeping previously built rules");
                self.metrics.rebuild_failed(self.kind);
                return Err(error);
            }
        };

        // Gauges describe the last complete build, never a half-built one.
        for (direction, built) in [(Direction::From, &from), (Direction::To, &to)] {
            self.metrics
                .built(self.kind, direction, built.rules.len(), &built.report);
        }
        let (from, to) = (from.rules, to.rules);

        let published = self.rules_tx.send_if_modified(|current| {
            if current.from == from && current.to == to {
                return false;
            }
            *current = Arc::new(PolicyRules {
                generation: current.generation + 1,
                from,
                to,
            });
            true
        });
        if published {
            let rules = self.rules_rx.borrow();
            info!(
                generation = rules.generation,
                from = rules.from.len(),
                to = rules.to.len(),
                "Published rules"
            );
        } else {
            debug!("Rules unchanged");
        }
        Ok(())
    }

    fn build(
        policies: &[Policy<C>],
        direction: Direction,
    ) -> Result<BuiltRules<C>, BuildError> {
        let items = policies
            .iter()
            .flat_map(|policy| policy.items(direction))
            .collect::<Vec<_>>();
        rules::build(&items).map_err(|source| BuildError { direction, source })
    }
}
