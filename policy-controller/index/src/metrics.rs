use mesh_policy_core::{BuildReport, Direction};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Metrics shared by all policy indexes. Each index reports under its own `kind` label.
#[derive(Clone, Default)]
pub struct IndexMetrics {
    index_size: Family<IndexLabels, Gauge>,
    index_applies: Family<IndexLabels, Counter>,
    index_deletes: Family<IndexLabels, Counter>,
    index_resets: Family<IndexLabels, Counter>,

    rebuilds: Family<IndexLabels, Counter>,
    rebuild_errors: Family<IndexLabels, Counter>,

    rules: Family<RulesLabels, Gauge>,
    contradictions: Family<RulesLabels, Gauge>,
    unmatched: Family<RulesLabels, Gauge>,
    rejected: Family<RulesLabels, Gauge>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RulesLabels {
    kind: String,
    direction: String,
}

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of policies in the index",
            index_size.clone(),
        );

        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        let rebuilds = Family::default();
        prom.register(
            "rules_rebuilds",
            "Count of rule sets built from the index",
            rebuilds.clone(),
        );

        let rebuild_errors = Family::default();
        prom.register(
            "rules_rebuild_errors",
            "Count of rule builds that failed and kept the previous rules",
            rebuild_errors.clone(),
        );

        let rules = Family::default();
        prom.register("rules", "Gauge of the number of built rules", rules.clone());

        let contradictions = Family::default();
        prom.register(
            "rules_contradictions",
            "Gauge of contradictory cells skipped by the last build",
            contradictions.clone(),
        );

        let unmatched = Family::default();
        prom.register(
            "rules_unmatched_cells",
            "Gauge of cells selected by no policy item in the last build",
            unmatched.clone(),
        );

        let rejected = Family::default();
        prom.register(
            "rules_rejected_items",
            "Gauge of policy items whose selector can't be expressed as tags",
            rejected.clone(),
        );

        Self {
            index_size,
            index_applies,
            index_deletes,
            index_resets,
            rebuilds,
            rebuild_errors,
            rules,
            contradictions,
            unmatched,
            rejected,
        }
    }

    pub(crate) fn applied(&self, kind: &str, size: usize) {
        self.index_applies
            .get_or_create(&IndexLabels::new(kind))
            .inc();
        self.set_size(kind, size);
    }

    pub(crate) fn deleted(&self, kind: &str, size: usize) {
        self.index_deletes
            .get_or_create(&IndexLabels::new(kind))
            .inc();
        self.set_size(kind, size);
    }

    pub(crate) fn reset(&self, kind: &str, size: usize) {
        self.index_resets
            .get_or_create(&IndexLabels::new(kind))
            .inc();
        self.set_size(kind, size);
    }

    pub(crate) fn rebuilt(&self, kind: &str) {
        self.rebuilds.get_or_create(&IndexLabels::new(kind)).inc();
    }

    pub(crate) fn rebuild_failed(&self, kind: &str) {
        self.rebuild_errors
            .get_or_create(&IndexLabels::new(kind))
            .inc();
    }

    pub(crate) fn built(
        &self,
        kind: &str,
        direction: Direction,
        rules: usize,
        report: &BuildReport,
    ) {
        let labels = RulesLabels {
            kind: kind.to_string(),
            direction: direction.to_string(),
        };
        self.rules.get_or_create(&labels).set(rules as i64);
        self.contradictions
            .get_or_create(&labels)
            .set(report.contradictions as i64);
        self.unmatched
            .get_or_create(&labels)
            .set(report.unmatched as i64);
        self.rejected
            .get_or_create(&labels)
            .set(report.rejected as i64);
    }

    fn set_size(&self, kind: &str, size: usize) {
        self.index_size
            .get_or_create(&IndexLabels::new(kind))
            .set(size as i64);
    }
}

impl IndexLabels {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
        }
    }
}
